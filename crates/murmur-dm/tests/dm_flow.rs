mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use common::{net, peer, peer_with, peer_with_cipher, wait_for, Event, MAX_CONTENTS};
use murmur_dm::{
    make_notification_fp, notification_reports_for_me, DmError, NotificationFilter,
    NotificationRecord, NotificationState, NotificationUpdate,
};
use murmur_net::{MixNetwork, Round, RoundOutcome, SendParams, TargetedMessage};
use murmur_shared::framing::{pack_frame, payload_capacity};
use murmur_shared::protocol::{DirectMessage, Text};
use murmur_shared::timestamp::now_unix_nanos;
use murmur_shared::types::{MessageType, PublicKey, Status};
use murmur_shared::error::CipherError;
use murmur_shared::{Cipher, DmCipher, Identity};
use murmur_store::MemoryKv;
use rand::rngs::OsRng;
use rand::RngCore;

#[tokio::test]
async fn test_text_reply_reaction_round_trip() {
    let net = net();
    let a = peer(&net);
    let b = peer(&net);

    let hello = a.client.send_text(&b.public_key(), b.token(), "Hi").unwrap();
    assert_eq!(net.deliver_all(), 2);

    let received = b.model.received();
    assert_eq!(received.len(), 1);
    match &received[0] {
        Event::Text(info, text) => {
            assert_eq!(text, "Hi");
            assert_eq!(info.message_id, hello.message_id);
            assert_eq!(info.sender_key, a.public_key());
            assert_eq!(info.partner_key, a.public_key());
            assert_eq!(info.dm_token, a.token());
            assert_eq!(info.round.map(|r| r.id), Some(hello.round.id));
        }
        other => panic!("unexpected event {other:?}"),
    }

    // The self copy came back to A: sent, then delivered, and no longer tracked.
    assert!(wait_for(|| a.model.statuses() == vec![Status::Sent, Status::Received]).await);
    assert!(!a.client.send_tracker().check_if_sent(&hello.message_id));
    assert!(a.model.received().is_empty());

    let reply = b
        .client
        .send_reply(&a.public_key(), a.token(), "whatup?", &hello.message_id)
        .unwrap();
    net.deliver_all();
    match a.model.received().as_slice() {
        [Event::Reply(info, reply_to, text)] => {
            assert_eq!(*reply_to, hello.message_id);
            assert_eq!(text, "whatup?");
            assert_eq!(info.message_id, reply.message_id);
        }
        other => panic!("unexpected events {other:?}"),
    }

    a.client
        .send_reaction(&b.public_key(), b.token(), "😀", &reply.message_id)
        .unwrap();
    net.deliver_all();
    let reactions: Vec<Event> = b
        .model
        .received()
        .into_iter()
        .filter(|e| matches!(e, Event::Reaction(..)))
        .collect();
    match reactions.as_slice() {
        [Event::Reaction(_, target, emoji)] => {
            assert_eq!(*target, reply.message_id);
            assert_eq!(emoji, "😀");
        }
        other => panic!("unexpected events {other:?}"),
    }
}

#[tokio::test]
async fn test_pending_send_is_surfaced_before_the_network() {
    let net = net();
    let a = peer(&net);
    let b = peer(&net);

    a.client.send_text(&b.public_key(), b.token(), "queued").unwrap();
    match a.model.events().first() {
        Some(Event::Text(info, text)) => {
            assert_eq!(text, "queued");
            assert_eq!(info.status, Status::Unsent);
            assert_eq!(info.partner_key, b.public_key());
            assert_eq!(info.sender_key, a.public_key());
            assert_eq!(info.dm_token, b.token());
            assert!(info.round.is_none());
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_invalid_reaction_transmits_nothing() {
    let net = net();
    let a = peer(&net);
    let b = peer(&net);
    let target = a.client.send_text(&b.public_key(), b.token(), "x").unwrap().message_id;
    let frames = net.sent_frames();
    let events = a.model.events().len();

    for bad in ["ab", "", "😀😀"] {
        let err = a
            .client
            .send_reaction(&b.public_key(), b.token(), bad, &target)
            .unwrap_err();
        assert!(matches!(err, DmError::Reaction(_)), "{bad:?} accepted");
    }
    assert_eq!(net.sent_frames(), frames);
    assert_eq!(a.model.events().len(), events);
}

#[tokio::test]
async fn test_other_device_sees_own_sent_message() {
    let net = net();
    let me = Identity::generate();
    let a1 = peer_with(&net, me.clone(), Arc::new(MemoryKv::new()), None);
    let b = peer(&net);
    // Registered last, so it owns the shared reception IDs on the loopback.
    let a2 = peer_with(&net, me, Arc::new(MemoryKv::new()), None);

    let sent = a1.client.send_text(&b.public_key(), b.token(), "from phone").unwrap();
    net.deliver_all();

    match a2.model.received().as_slice() {
        [Event::Text(info, text)] => {
            assert_eq!(text, "from phone");
            assert_eq!(info.message_id, sent.message_id);
            assert_eq!(info.partner_key, b.public_key());
            assert_eq!(info.sender_key, a2.public_key());
            assert_eq!(info.dm_token, b.token());
        }
        other => panic!("unexpected events {other:?}"),
    }
    assert_eq!(b.model.received().len(), 1);
    assert!(a1.client.send_tracker().check_if_sent(&sent.message_id));
}

#[tokio::test]
async fn test_delivery_confirmed_after_restart() {
    let net = net();
    let me = Identity::generate();
    let kv: Arc<dyn murmur_store::KeyValue> = Arc::new(MemoryKv::new());
    let b = peer(&net);

    let first = peer_with(&net, me.clone(), kv.clone(), None);
    let sent = first.client.send_text(&b.public_key(), b.token(), "before restart").unwrap();
    drop(first);

    let second = peer_with(&net, me, kv, None);
    assert!(second.client.send_tracker().check_if_sent(&sent.message_id));
    net.deliver_all();

    assert!(wait_for(|| second.model.statuses() == vec![Status::Received]).await);
    assert!(second.model.received().is_empty());
    assert!(!second.client.send_tracker().check_if_sent(&sent.message_id));
}

#[tokio::test]
async fn test_pending_sends_survive_sqlite_restart() {
    let dir = tempfile::tempdir().unwrap();
    let net = net();
    let me = Identity::generate();
    let b = peer(&net);

    let open = || -> Arc<dyn murmur_store::KeyValue> {
        Arc::new(murmur_store::Database::open_in_dir(dir.path()).unwrap())
    };
    let first = peer_with(&net, me.clone(), open(), None);
    let sent = first.client.send_text(&b.public_key(), b.token(), "on disk").unwrap();
    drop(first);

    let second = peer_with(&net, me, open(), None);
    assert!(second.client.send_tracker().check_if_sent(&sent.message_id));
    assert_eq!(second.client.send_tracker().pending_count(), 0);
}

#[tokio::test]
async fn test_failed_round_marks_message_failed() {
    let net = net();
    let a = peer(&net);
    let b = peer(&net);

    net.script_round(net.next_round_id(), [RoundOutcome::Failed]);
    a.client.send_text(&b.public_key(), b.token(), "lost").unwrap();
    net.resolve_round_watches();

    assert!(wait_for(|| a.model.statuses() == vec![Status::Sent, Status::Failed]).await);
}

#[tokio::test]
async fn test_unhealthy_network_fails_the_send() {
    let net = net();
    let a = peer(&net);
    let b = peer(&net);

    net.set_healthy(false);
    let err = a
        .client
        .send_text(&b.public_key(), b.token(), "offline")
        .unwrap_err();
    assert!(matches!(err, DmError::Network(_)));
    assert!(wait_for(|| a.model.statuses() == vec![Status::Failed]).await);
    assert_eq!(a.client.send_tracker().pending_count(), 0);
}

#[tokio::test]
async fn test_oversized_message_fails_partner_copy() {
    let net = net();
    let a = peer(&net);
    let b = peer(&net);

    let text = "x".repeat(MAX_CONTENTS * 2);
    let err = a.client.send_text(&b.public_key(), b.token(), &text).unwrap_err();
    assert!(matches!(err, DmError::PartnerSend(_)));
    assert_eq!(net.sent_frames(), 0);
    assert!(wait_for(|| a.model.statuses() == vec![Status::Failed]).await);
}

#[tokio::test]
async fn test_blocked_partner_is_dropped() {
    let net = net();
    let a = peer(&net);
    let b = peer(&net);

    b.client.block_partner(&a.public_key()).unwrap();
    assert!(b.client.is_blocked(&a.public_key()));
    assert_eq!(b.client.blocked_partners(), vec![a.public_key()]);

    a.client.send_text(&b.public_key(), b.token(), "spam").unwrap();
    net.deliver_all();
    assert!(b.model.received().is_empty());
    assert!(b.model.events().contains(&Event::Blocked(a.public_key())));

    b.client.unblock_partner(&a.public_key()).unwrap();
    a.client.send_text(&b.public_key(), b.token(), "sorry").unwrap();
    net.deliver_all();
    assert_eq!(b.model.received().len(), 1);
}

#[tokio::test]
async fn test_nickname_travels_with_message() {
    let net = net();
    let a = peer(&net);
    let b = peer(&net);

    assert_eq!(a.client.get_nickname(), None);
    a.client.set_nickname("  alice  ").unwrap();
    assert!(a.client.set_nickname("al").is_err());

    a.client.send_text(&b.public_key(), b.token(), "hey").unwrap();
    net.deliver_all();
    match b.model.received().as_slice() {
        [Event::Text(info, _)] => assert_eq!(info.nickname, "alice"),
        other => panic!("unexpected events {other:?}"),
    }
}

fn forged_frame(from: &Identity, to: &PublicKey, round_id: u64) -> murmur_shared::framing::Frame {
    let dm = DirectMessage {
        round_id,
        self_round_id: round_id,
        payload_type: MessageType::Text.as_u32(),
        payload: Text::new("forged").to_bytes().unwrap(),
        nickname: String::new(),
        dm_token: from.dm_token(),
        nonce: [1, 2, 3, 4],
        local_timestamp: now_unix_nanos(),
    };
    let capacity = payload_capacity(MAX_CONTENTS);
    let ct = DmCipher
        .encrypt(&dm.to_bytes().unwrap(), from, to, &mut OsRng, capacity)
        .unwrap();
    pack_frame(&ct, capacity, &mut OsRng).unwrap()
}

#[tokio::test]
async fn test_round_mismatch_is_dropped() {
    let net = net();
    let sender = Identity::generate();
    let b = peer(&net);
    let target = b.client.reception_id();

    let key = b.public_key();
    let mut replayed = |_: &Round| -> anyhow::Result<Vec<TargetedMessage>> {
        Ok(vec![TargetedMessage {
            recipient: target,
            frame: forged_frame(&sender, &key, 9_999),
        }])
    };
    net.send_many(&mut replayed, &SendParams::default()).unwrap();
    net.deliver_all();
    assert!(b.model.received().is_empty());

    let mut honest = |round: &Round| -> anyhow::Result<Vec<TargetedMessage>> {
        Ok(vec![TargetedMessage {
            recipient: target,
            frame: forged_frame(&sender, &key, round.id.0),
        }])
    };
    net.send_many(&mut honest, &SendParams::default()).unwrap();
    net.deliver_all();
    assert_eq!(b.model.received().len(), 1);
}

#[tokio::test]
async fn test_notification_filter_tracks_new_partner() {
    type Seen = Arc<Mutex<Vec<NotificationFilter>>>;
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let notify: NotificationUpdate = Arc::new(
        move |filter: NotificationFilter, _changed: Vec<NotificationState>, _deleted: Vec<PublicKey>| {
            sink.lock().unwrap().push(filter);
        },
    );

    let net = net();
    let a = peer(&net);
    let b = peer_with(&net, Identity::generate(), Arc::new(MemoryKv::new()), Some(notify));

    a.client.send_text(&b.public_key(), b.token(), "ping").unwrap();
    net.deliver_all();

    let filter = seen.lock().unwrap().last().cloned().unwrap();
    assert_eq!(filter.tags.len(), 1);
    assert_eq!(filter, b.client.notification_filter());

    let fp = make_notification_fp(&a.identity, &b.public_key(), b.token(), b"hash", MessageType::Text)
        .unwrap();
    let reports = notification_reports_for_me(
        &filter,
        &[NotificationRecord {
            message_hash: b"hash".to_vec(),
            identity_fp: fp.to_vec(),
        }],
    );
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].partner, a.public_key());

    b.client
        .set_notification_level(&a.public_key(), murmur_dm::NotificationLevel::NotifyNone)
        .unwrap();
    assert!(b.client.notification_filter().tags.is_empty());
}

/// Delegates to [`DmCipher`], counting every call.
#[derive(Default)]
struct CountingCipher {
    sealed: AtomicUsize,
    self_sealed: AtomicUsize,
    opened: AtomicUsize,
    self_opened: AtomicUsize,
}

impl Cipher for CountingCipher {
    fn encrypt(
        &self,
        plaintext: &[u8],
        me: &Identity,
        partner: &PublicKey,
        rng: &mut dyn RngCore,
        exact_len: usize,
    ) -> Result<Vec<u8>, CipherError> {
        self.sealed.fetch_add(1, Ordering::SeqCst);
        DmCipher.encrypt(plaintext, me, partner, rng, exact_len)
    }

    fn decrypt(&self, ciphertext: &[u8], me: &Identity) -> Result<(PublicKey, Vec<u8>), CipherError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        DmCipher.decrypt(ciphertext, me)
    }

    fn encrypt_self(
        &self,
        plaintext: &[u8],
        me: &Identity,
        partner: &PublicKey,
        rng: &mut dyn RngCore,
        exact_len: usize,
    ) -> Result<Vec<u8>, CipherError> {
        self.self_sealed.fetch_add(1, Ordering::SeqCst);
        DmCipher.encrypt_self(plaintext, me, partner, rng, exact_len)
    }

    fn decrypt_self(&self, ciphertext: &[u8], me: &Identity) -> Result<(PublicKey, Vec<u8>), CipherError> {
        self.self_opened.fetch_add(1, Ordering::SeqCst);
        DmCipher.decrypt_self(ciphertext, me)
    }

    fn is_self_encrypted(&self, ciphertext: &[u8], me: &Identity) -> bool {
        DmCipher.is_self_encrypted(ciphertext, me)
    }
}

#[tokio::test]
async fn test_client_uses_the_supplied_cipher() {
    let net = net();
    let cipher_a = Arc::new(CountingCipher::default());
    let cipher_b = Arc::new(CountingCipher::default());
    let a = peer_with_cipher(&net, Identity::generate(), Arc::new(MemoryKv::new()), None, cipher_a.clone());
    let b = peer_with_cipher(&net, Identity::generate(), Arc::new(MemoryKv::new()), None, cipher_b.clone());

    a.client.send_text(&b.public_key(), b.token(), "sealed").unwrap();
    net.deliver_all();

    assert_eq!(cipher_a.sealed.load(Ordering::SeqCst), 1);
    assert_eq!(cipher_a.self_sealed.load(Ordering::SeqCst), 1);
    assert_eq!(cipher_a.self_opened.load(Ordering::SeqCst), 1);
    assert_eq!(cipher_b.opened.load(Ordering::SeqCst), 1);
    assert_eq!(b.model.received().len(), 1);
}
