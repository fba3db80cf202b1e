//! The DM client: dual-send, conversation settings and wiring.
//!
//! Every send submits two frames in one round: the partner-addressed copy
//! and a self-addressed copy only this identity can read. The self copy lets
//! other instances of the same identity see the conversation, and its
//! arrival back at this instance marks the message delivered.

use std::sync::Arc;

use rand::rngs::OsRng;
use rand::RngCore;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use murmur_net::{MixNetwork, Round, SendParams, TargetedMessage};
use murmur_shared::constants::MESSAGE_NONCE_LEN;
use murmur_shared::emoji::validate_reaction;
use murmur_shared::framing::{pack_frame, payload_capacity, Frame};
use murmur_shared::identity::partner_reception_id;
use murmur_shared::protocol::{
    make_debug_tag, DirectMessage, Reaction, Text, SEND_MESSAGE_TAG, SEND_REACTION_TAG,
    SEND_REPLY_TAG,
};
use murmur_shared::timestamp::now_unix_nanos;
use murmur_shared::types::{EphemeralId, MessageId, MessageType, PublicKey, ReceptionId};
use murmur_shared::{Cipher, Identity};
use murmur_store::KeyValue;

use crate::config::DmConfig;
use crate::error::DmError;
use crate::event_model::{EventModel, MessageInfo, StatusUpdate};
use crate::nickname::NicknameManager;
use crate::notifications::{NotificationFilter, NotificationLevel, NotificationUpdate, Notifications};
use crate::partners::{BackupTrigger, PartnerStatus, PartnerStore};
use crate::receiver::{Dispatcher, Receiver};
use crate::send_tracker::{SendTracker, TriggerFn};

/// Outcome of a successful send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendReport {
    pub message_id: MessageId,
    pub round: Round,
    /// Ephemeral ID the partner-addressed copy went out under
    pub ephemeral_id: EphemeralId,
}

/// Optional hooks a client reports to.
#[derive(Clone, Default)]
pub struct ClientCallbacks {
    /// Called whenever the notification filter changes.
    pub notify: Option<NotificationUpdate>,
    /// Called after every persisted partner change.
    pub backup: Option<BackupTrigger>,
}

pub struct DmClient {
    me: Arc<Identity>,
    cipher: Arc<dyn Cipher>,
    net: Arc<dyn MixNetwork>,
    partners: Arc<PartnerStore>,
    nicknames: NicknameManager,
    notifications: Arc<Notifications>,
    tracker: Arc<SendTracker>,
    dispatcher: Arc<Dispatcher>,
    status_task: JoinHandle<()>,
}

impl DmClient {
    /// Build a client for `identity` and start listening on its reception
    /// IDs. Every frame is sealed and opened with `cipher`, usually
    /// [`DmCipher`](murmur_shared::DmCipher). Must be called from within a Tokio runtime.
    pub fn new(
        identity: Identity,
        cipher: Arc<dyn Cipher>,
        event_model: Arc<dyn EventModel>,
        net: Arc<dyn MixNetwork>,
        kv: Arc<dyn KeyValue>,
        config: DmConfig,
        callbacks: ClientCallbacks,
    ) -> Result<Self, DmError> {
        let me = Arc::new(identity);
        let partners = Arc::new(PartnerStore::new(kv.clone(), callbacks.backup)?);
        let nicknames = NicknameManager::new(&me.reception_id(), kv.clone())?;
        let notifications = Notifications::new(me.clone(), partners.clone(), callbacks.notify);

        let (updates_tx, mut updates_rx) = mpsc::unbounded_channel::<StatusUpdate>();
        let model = event_model.clone();
        let status_task = tokio::spawn(async move {
            while let Some(update) = updates_rx.recv().await {
                model.update_sent_status(&update);
            }
            debug!("status dispatcher stopped");
        });

        let dispatcher = Arc::new(Dispatcher::new(event_model));
        let pending = dispatcher.clone();
        let trigger: TriggerFn =
            Arc::new(move |info: &MessageInfo, payload: &[u8]| pending.dispatch(info, payload));
        let tracker = SendTracker::load(kv, net.clone(), trigger, updates_tx, config)?;

        let receiver = Arc::new(Receiver::new(
            me.clone(),
            cipher.clone(),
            partners.clone(),
            tracker.clone(),
            dispatcher.clone(),
        ));
        net.add_identity(me.reception_id(), receiver.clone());
        net.add_identity(me.self_reception_id(), receiver);

        info!(
            public_key = %me.public_key().short(),
            reception_id = %me.reception_id(),
            "DM client started"
        );

        Ok(Self {
            me,
            cipher,
            net,
            partners,
            nicknames,
            notifications,
            tracker,
            dispatcher,
            status_task,
        })
    }

    pub fn public_key(&self) -> PublicKey {
        self.me.public_key()
    }

    pub fn token(&self) -> u32 {
        self.me.dm_token()
    }

    pub fn reception_id(&self) -> ReceptionId {
        self.me.reception_id()
    }

    pub fn send_tracker(&self) -> &Arc<SendTracker> {
        &self.tracker
    }

    /// Send a message of any type to `partner`.
    ///
    /// The partner copy and the self copy go out in the same round. The send
    /// is surfaced to the event model as `Unsent` before it is handed to the
    /// network and as `Sent` or `Failed` afterwards.
    pub fn send(
        &self,
        partner: &PublicKey,
        partner_token: u32,
        message_type: MessageType,
        payload: Vec<u8>,
        debug_tag: &str,
    ) -> Result<SendReport, DmError> {
        let partner_rid = partner_reception_id(partner, partner_token)?;
        let self_rid = self.me.self_reception_id();

        let mut nonce = [0u8; MESSAGE_NONCE_LEN];
        OsRng
            .try_fill_bytes(&mut nonce)
            .map_err(|e| DmError::Rng(e.to_string()))?;

        let dm = DirectMessage {
            round_id: 0,
            self_round_id: 0,
            payload_type: message_type.as_u32(),
            payload,
            nickname: self.nicknames.get_nickname().unwrap_or_default(),
            dm_token: self.me.dm_token(),
            nonce,
            local_timestamp: now_unix_nanos(),
        };
        let message_id = dm.derive_message_id();

        let uuid = self.tracker.denote_pending_send(
            *partner,
            self.me.public_key(),
            partner_token,
            message_type,
            &dm,
        )?;

        let me = self.me.as_ref();
        let cipher = self.cipher.as_ref();
        let capacity = payload_capacity(self.net.max_message_length());
        let mut assembler = |round: &Round| -> anyhow::Result<Vec<TargetedMessage>> {
            let mut rng = OsRng;

            let mut partner_copy = dm.clone();
            partner_copy.round_id = round.id.0;
            partner_copy.self_round_id = round.id.0;
            let partner_frame = seal_for_partner(cipher, me, partner, &partner_copy, capacity, &mut rng)
                .map_err(|e| DmError::PartnerSend(Box::new(e)))?;

            let mut self_copy = partner_copy;
            self_copy.dm_token = partner_token;
            let self_frame = seal_for_self(cipher, me, partner, &self_copy, capacity, &mut rng)
                .map_err(|e| DmError::SelfSend(Box::new(e)))?;

            Ok(vec![
                TargetedMessage {
                    recipient: partner_rid,
                    frame: partner_frame,
                },
                TargetedMessage {
                    recipient: self_rid,
                    frame: self_frame,
                },
            ])
        };

        let params = SendParams {
            debug_tag: debug_tag.to_string(),
        };
        let (round, ephemeral_ids) = match self.net.send_many(&mut assembler, &params) {
            Ok(sent) => sent,
            Err(e) => {
                let err = DmError::from_network(e);
                error!(tag = %debug_tag, msg_id = %message_id, error = %err, "DM send failed");
                if let Err(e) = self.tracker.failed_send(uuid) {
                    warn!(uuid, error = %e, "could not mark send as failed");
                }
                return Err(err);
            }
        };

        self.tracker.sent(uuid, message_id, &round)?;
        let ephemeral_id = ephemeral_ids.first().copied().unwrap_or_default();

        info!(
            tag = %debug_tag,
            msg_id = %message_id,
            round = %round.id,
            partner = %partner.short(),
            "DM sent"
        );
        Ok(SendReport {
            message_id,
            round,
            ephemeral_id,
        })
    }

    pub fn send_text(
        &self,
        partner: &PublicKey,
        partner_token: u32,
        text: &str,
    ) -> Result<SendReport, DmError> {
        let payload = Text::new(text).to_bytes()?;
        let tag = make_debug_tag(partner, &payload, SEND_MESSAGE_TAG);
        self.send(partner, partner_token, MessageType::Text, payload, &tag)
    }

    pub fn send_reply(
        &self,
        partner: &PublicKey,
        partner_token: u32,
        text: &str,
        reply_to: &MessageId,
    ) -> Result<SendReport, DmError> {
        let payload = Text::reply(text, reply_to).to_bytes()?;
        let tag = make_debug_tag(partner, &payload, SEND_REPLY_TAG);
        self.send(partner, partner_token, MessageType::Reply, payload, &tag)
    }

    /// Send an emoji reaction. Invalid reactions are rejected before
    /// anything reaches the network.
    pub fn send_reaction(
        &self,
        partner: &PublicKey,
        partner_token: u32,
        reaction: &str,
        react_to: &MessageId,
    ) -> Result<SendReport, DmError> {
        validate_reaction(reaction)?;
        let payload = Reaction::new(reaction, react_to).to_bytes()?;
        let tag = make_debug_tag(partner, &payload, SEND_REACTION_TAG);
        self.send(partner, partner_token, MessageType::Reaction, payload, &tag)
    }

    pub fn get_nickname(&self) -> Option<String> {
        self.nicknames.get_nickname()
    }

    pub fn set_nickname(&self, nick: &str) -> Result<(), DmError> {
        self.nicknames.set_nickname(nick)
    }

    /// Drop every future message from `partner`.
    pub fn block_partner(&self, partner: &PublicKey) -> Result<(), DmError> {
        self.partners.set(partner, PartnerStatus::Blocked)?;
        self.dispatcher.model().block_sender(partner);
        Ok(())
    }

    pub fn unblock_partner(&self, partner: &PublicKey) -> Result<(), DmError> {
        self.partners.set(partner, PartnerStatus::NotifyAll)?;
        self.dispatcher.model().unblock_sender(partner);
        Ok(())
    }

    pub fn is_blocked(&self, partner: &PublicKey) -> bool {
        self.partners
            .get(partner)
            .is_some_and(|p| p.status == PartnerStatus::Blocked)
    }

    pub fn blocked_partners(&self) -> Vec<PublicKey> {
        self.partners
            .all()
            .into_iter()
            .filter(|p| p.status == PartnerStatus::Blocked)
            .map(|p| p.public_key)
            .collect()
    }

    pub fn get_notification_level(&self, partner: &PublicKey) -> Result<NotificationLevel, DmError> {
        self.notifications.get_notification_level(partner)
    }

    pub fn set_notification_level(
        &self,
        partner: &PublicKey,
        level: NotificationLevel,
    ) -> Result<(), DmError> {
        self.notifications.set_notification_level(partner, level)
    }

    pub fn notification_filter(&self) -> NotificationFilter {
        self.notifications.filter()
    }
}

impl Drop for DmClient {
    fn drop(&mut self) {
        self.net.remove_identity(&self.me.reception_id());
        self.net.remove_identity(&self.me.self_reception_id());
        self.status_task.abort();
    }
}

fn seal_for_partner(
    cipher: &dyn Cipher,
    me: &Identity,
    partner: &PublicKey,
    dm: &DirectMessage,
    capacity: usize,
    rng: &mut OsRng,
) -> Result<Frame, DmError> {
    let plaintext = dm.to_bytes()?;
    let ciphertext = cipher.encrypt(&plaintext, me, partner, &mut *rng, capacity)?;
    Ok(pack_frame(&ciphertext, capacity, &mut *rng)?)
}

fn seal_for_self(
    cipher: &dyn Cipher,
    me: &Identity,
    partner: &PublicKey,
    dm: &DirectMessage,
    capacity: usize,
    rng: &mut OsRng,
) -> Result<Frame, DmError> {
    let plaintext = dm.to_bytes()?;
    let ciphertext = cipher.encrypt_self(&plaintext, me, partner, &mut *rng, capacity)?;
    Ok(pack_frame(&ciphertext, capacity, &mut *rng)?)
}
