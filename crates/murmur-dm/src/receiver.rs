//! Inbound pipeline: frame -> ciphertext -> direct message -> event model.
//!
//! One [`Receiver`] serves both of this client's reception IDs. Partner
//! messages and self-addressed copies are told apart by the cipher, not by
//! the ID they arrived on.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use murmur_net::{MessageProcessor, Round};
use murmur_shared::emoji::validate_reaction;
use murmur_shared::framing::{unpack_frame, Frame};
use murmur_shared::protocol::{DirectMessage, Reaction, Text};
use murmur_shared::timestamp::{from_unix_nanos, vet_timestamp};
use murmur_shared::types::{MessageId, MessageType, ReceptionId, Status};
use murmur_shared::{Cipher, Identity};

use crate::error::DmError;
use crate::event_model::{EventModel, MessageInfo};
use crate::partners::{PartnerStatus, PartnerStore};
use crate::send_tracker::SendTracker;

/// Routes decoded messages to the matching [`EventModel`] method.
pub struct Dispatcher {
    model: Arc<dyn EventModel>,
}

impl Dispatcher {
    pub fn new(model: Arc<dyn EventModel>) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &Arc<dyn EventModel> {
        &self.model
    }

    /// Decode `payload` per `info.message_type` and hand it to the model.
    /// Returns the model's handle for the stored message.
    pub fn dispatch(&self, info: &MessageInfo, payload: &[u8]) -> Result<u64, DmError> {
        match info.message_type {
            MessageType::Text | MessageType::Reply => {
                let text = Text::from_bytes(payload)?;
                if text.has_reply_target() {
                    let reply_to = MessageId::from_slice(&text.reply_message_id)
                        .map_err(|_| DmError::MalformedReplyId(text.reply_message_id.len()))?;
                    Ok(self.model.receive_reply(info, &reply_to, &text.text))
                } else {
                    Ok(self.model.receive_text(info, &text.text))
                }
            }
            MessageType::Reaction => {
                let reaction = Reaction::from_bytes(payload)?;
                validate_reaction(&reaction.reaction)?;
                let react_to = MessageId::from_slice(&reaction.reaction_message_id).map_err(|_| {
                    DmError::MalformedReactionTarget(reaction.reaction_message_id.len())
                })?;
                Ok(self.model.receive_reaction(info, &react_to, &reaction.reaction))
            }
            MessageType::Invitation
            | MessageType::Silent
            | MessageType::Delete
            | MessageType::Unknown(_) => Ok(self.model.receive(info, payload)),
        }
    }
}

pub struct Receiver {
    me: Arc<Identity>,
    cipher: Arc<dyn Cipher>,
    partners: Arc<PartnerStore>,
    tracker: Arc<SendTracker>,
    dispatcher: Arc<Dispatcher>,
}

impl Receiver {
    pub fn new(
        me: Arc<Identity>,
        cipher: Arc<dyn Cipher>,
        partners: Arc<PartnerStore>,
        tracker: Arc<SendTracker>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            me,
            cipher,
            partners,
            tracker,
            dispatcher,
        }
    }

    fn handle(&self, frame: &Frame, round: &Round) -> Result<(), DmError> {
        let ciphertext = unpack_frame(frame);
        if self.cipher.is_self_encrypted(&ciphertext, &self.me) {
            self.handle_self_copy(&ciphertext, round)
        } else {
            self.handle_partner_message(&ciphertext, round)
        }
    }

    fn handle_self_copy(&self, ciphertext: &[u8], round: &Round) -> Result<(), DmError> {
        let (partner_key, plaintext) = self.cipher.decrypt_self(ciphertext, &self.me)?;
        let dm = DirectMessage::from_bytes(&plaintext)?;
        let message_id = dm.derive_message_id();

        if self.tracker.check_if_sent(&message_id) {
            self.tracker.delivered(&message_id, round);
            self.tracker.stop_tracking(&message_id)?;
            debug!(msg_id = %message_id, round = %round.id, "self copy confirmed delivery");
            return Ok(());
        }

        if dm.self_round_id != round.id.0 {
            warn!(
                msg_id = %message_id,
                expected = dm.self_round_id,
                actual = %round.id,
                "self copy arrived on unexpected round, dropping"
            );
            return Ok(());
        }

        let info = MessageInfo {
            message_id,
            message_type: dm.message_type(),
            nickname: dm.nickname.clone(),
            partner_key,
            sender_key: self.me.public_key(),
            dm_token: dm.dm_token,
            timestamp: vet_timestamp(from_unix_nanos(dm.local_timestamp), round.queued_at, &message_id),
            round: Some(*round),
            status: Status::Received,
        };
        let uuid = self.dispatcher.dispatch(&info, &dm.payload)?;
        debug!(msg_id = %message_id, uuid, "stored message sent from another device");
        Ok(())
    }

    fn handle_partner_message(&self, ciphertext: &[u8], round: &Round) -> Result<(), DmError> {
        let (sender, plaintext) = self.cipher.decrypt(ciphertext, &self.me)?;
        let dm = DirectMessage::from_bytes(&plaintext)?;
        let message_id = dm.derive_message_id();

        if self.tracker.check_if_sent(&message_id) {
            debug!(msg_id = %message_id, "ignoring echo of own message");
            return Ok(());
        }

        if dm.round_id != round.id.0 && dm.self_round_id != round.id.0 {
            warn!(
                msg_id = %message_id,
                claimed = dm.round_id,
                actual = %round.id,
                "message arrived on a round it does not claim, dropping"
            );
            return Ok(());
        }

        let partner = self.partners.get_or_set(&sender)?;
        if partner.status == PartnerStatus::Blocked {
            info!(partner = %sender.short(), "dropping message from blocked partner");
            return Ok(());
        }

        let info = MessageInfo {
            message_id,
            message_type: dm.message_type(),
            nickname: dm.nickname.clone(),
            partner_key: sender,
            sender_key: sender,
            dm_token: dm.dm_token,
            timestamp: vet_timestamp(from_unix_nanos(dm.local_timestamp), round.queued_at, &message_id),
            round: Some(*round),
            status: Status::Received,
        };
        let uuid = self.dispatcher.dispatch(&info, &dm.payload)?;
        debug!(msg_id = %message_id, uuid, partner = %sender.short(), "received direct message");
        Ok(())
    }
}

impl MessageProcessor for Receiver {
    fn process(&self, frame: &Frame, receiving: &ReceptionId, round: &Round) {
        match self.handle(frame, round) {
            Ok(()) => {}
            Err(e @ (DmError::Cipher(_) | DmError::Encoding(_))) => {
                error!(reception_id = %receiving, round = %round.id, error = %e, "could not decode direct message");
            }
            Err(e) => {
                warn!(reception_id = %receiving, round = %round.id, error = %e, "dropping direct message");
            }
        }
    }
}
