//! The narrow contract the DM layer needs from a mix network.
//!
//! Round selection happens inside the network, so senders hand over a
//! [`MessageAssembler`] that is called once the round is known and returns
//! the finished frames. Delivery outcomes arrive later through round-result
//! watches.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use murmur_shared::framing::Frame;
use murmur_shared::types::{EphemeralId, ReceptionId, RoundId};

use crate::error::NetError;

/// A batch-processing cycle of the mix network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Round {
    pub id: RoundId,
    /// When the round was queued for processing
    pub queued_at: DateTime<Utc>,
}

/// Result of a single round as reported by a round-result watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    Succeeded,
    Failed,
    TimedOut,
}

/// Aggregate result delivered to a round-result watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundEvent {
    pub all_succeeded: bool,
    pub timed_out: bool,
    pub results: HashMap<RoundId, RoundOutcome>,
}

impl RoundEvent {
    pub fn from_results(results: HashMap<RoundId, RoundOutcome>) -> Self {
        Self {
            all_succeeded: results.values().all(|o| *o == RoundOutcome::Succeeded),
            timed_out: results.values().any(|o| *o == RoundOutcome::TimedOut),
            results,
        }
    }
}

/// One-shot callback for [`MixNetwork::get_round_results`].
pub type RoundEventCallback = Box<dyn FnOnce(RoundEvent) + Send>;

/// Called with the new health state whenever it changes.
pub type HealthCallback = Arc<dyn Fn(bool) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HealthCallbackId(pub u64);

/// A finished frame and the reception ID it is addressed to.
#[derive(Debug, Clone)]
pub struct TargetedMessage {
    pub recipient: ReceptionId,
    pub frame: Frame,
}

#[derive(Debug, Clone, Default)]
pub struct SendParams {
    /// Free-form label carried into the network's logs
    pub debug_tag: String,
}

/// Builds the frames of a send once the network has picked a round.
pub trait MessageAssembler: Send {
    fn assemble(&mut self, round: &Round) -> anyhow::Result<Vec<TargetedMessage>>;
}

impl<F> MessageAssembler for F
where
    F: FnMut(&Round) -> anyhow::Result<Vec<TargetedMessage>> + Send,
{
    fn assemble(&mut self, round: &Round) -> anyhow::Result<Vec<TargetedMessage>> {
        self(round)
    }
}

/// Handles frames delivered to a registered reception ID.
pub trait MessageProcessor: Send + Sync {
    fn process(&self, frame: &Frame, receiving: &ReceptionId, round: &Round);
}

/// Transmission capability of a mix network.
pub trait MixNetwork: Send + Sync {
    /// Size of the contents field of a transport frame.
    fn max_message_length(&self) -> usize;

    /// Pick a round, call `assembler` for it and submit every returned frame
    /// in that round. Returns the round and one ephemeral ID per frame, in
    /// assembler order.
    fn send_many(
        &self,
        assembler: &mut dyn MessageAssembler,
        params: &SendParams,
    ) -> Result<(Round, Vec<EphemeralId>), NetError>;

    /// Register a one-shot watch on `rounds`. `callback` fires once, either
    /// with the results or with `timed_out` set after `timeout`.
    fn get_round_results(&self, timeout: Duration, callback: RoundEventCallback, rounds: &[RoundId]);

    fn add_health_callback(&self, callback: HealthCallback) -> HealthCallbackId;

    fn remove_health_callback(&self, id: HealthCallbackId);

    fn is_healthy(&self) -> bool;

    /// Route frames addressed to `id` to `processor`.
    fn add_identity(&self, id: ReceptionId, processor: Arc<dyn MessageProcessor>);

    fn remove_identity(&self, id: &ReceptionId);
}
