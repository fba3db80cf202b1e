#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use murmur_dm::{
    ClientCallbacks, DmClient, DmConfig, EventModel, MessageInfo, NotificationUpdate, StatusUpdate,
};
use murmur_net::LoopbackNet;
use murmur_shared::types::{MessageId, PublicKey, Status};
use murmur_shared::{Cipher, DmCipher, Identity};
use murmur_store::{KeyValue, MemoryKv};

pub const MAX_CONTENTS: usize = 512;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Raw(MessageInfo, Vec<u8>),
    Text(MessageInfo, String),
    Reply(MessageInfo, MessageId, String),
    Reaction(MessageInfo, MessageId, String),
    Status(StatusUpdate),
    Blocked(PublicKey),
    Unblocked(PublicKey),
}

#[derive(Default)]
pub struct RecordingModel {
    events: Mutex<Vec<Event>>,
    next_uuid: AtomicU64,
}

impl RecordingModel {
    fn record(&self, event: Event) -> u64 {
        self.events.lock().unwrap().push(event);
        self.next_uuid.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Received (not pending) messages.
    pub fn received(&self) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| match e {
                Event::Raw(i, _) | Event::Text(i, _) | Event::Reply(i, _, _) | Event::Reaction(i, _, _) => {
                    i.status == Status::Received
                }
                _ => false,
            })
            .collect()
    }

    pub fn statuses(&self) -> Vec<Status> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Status(u) => Some(u.status),
                _ => None,
            })
            .collect()
    }
}

impl EventModel for RecordingModel {
    fn receive(&self, info: &MessageInfo, payload: &[u8]) -> u64 {
        self.record(Event::Raw(info.clone(), payload.to_vec()))
    }

    fn receive_text(&self, info: &MessageInfo, text: &str) -> u64 {
        self.record(Event::Text(info.clone(), text.to_string()))
    }

    fn receive_reply(&self, info: &MessageInfo, reply_to: &MessageId, text: &str) -> u64 {
        self.record(Event::Reply(info.clone(), *reply_to, text.to_string()))
    }

    fn receive_reaction(&self, info: &MessageInfo, react_to: &MessageId, reaction: &str) -> u64 {
        self.record(Event::Reaction(info.clone(), *react_to, reaction.to_string()))
    }

    fn update_sent_status(&self, update: &StatusUpdate) {
        self.record(Event::Status(update.clone()));
    }

    fn block_sender(&self, sender: &PublicKey) {
        self.record(Event::Blocked(*sender));
    }

    fn unblock_sender(&self, sender: &PublicKey) {
        self.record(Event::Unblocked(*sender));
    }
}

pub struct Peer {
    pub identity: Identity,
    pub client: DmClient,
    pub model: Arc<RecordingModel>,
    pub kv: Arc<dyn KeyValue>,
}

impl Peer {
    pub fn public_key(&self) -> PublicKey {
        self.client.public_key()
    }

    pub fn token(&self) -> u32 {
        self.client.token()
    }
}

pub fn net() -> Arc<LoopbackNet> {
    Arc::new(LoopbackNet::new(MAX_CONTENTS))
}

pub fn peer(net: &Arc<LoopbackNet>) -> Peer {
    peer_with(net, Identity::generate(), Arc::new(MemoryKv::new()), None)
}

pub fn peer_with(
    net: &Arc<LoopbackNet>,
    identity: Identity,
    kv: Arc<dyn KeyValue>,
    notify: Option<NotificationUpdate>,
) -> Peer {
    peer_with_cipher(net, identity, kv, notify, Arc::new(DmCipher))
}

pub fn peer_with_cipher(
    net: &Arc<LoopbackNet>,
    identity: Identity,
    kv: Arc<dyn KeyValue>,
    notify: Option<NotificationUpdate>,
    cipher: Arc<dyn Cipher>,
) -> Peer {
    let model = Arc::new(RecordingModel::default());
    let client = DmClient::new(
        identity.clone(),
        cipher,
        model.clone(),
        net.clone(),
        kv.clone(),
        DmConfig::default(),
        ClientCallbacks {
            notify,
            backup: None,
        },
    )
    .unwrap();
    Peer {
        identity,
        client,
        model,
        kv,
    }
}

/// Yield to the runtime until `cond` holds or a second has passed.
pub async fn wait_for<F: Fn() -> bool>(cond: F) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}
