//! In-process [`MixNetwork`] that delivers frames between identities
//! registered on the same instance.
//!
//! Nothing happens on its own: sends are queued until [`LoopbackNet::deliver_all`]
//! and round-result watches wait for [`LoopbackNet::resolve_round_watches`].
//! Round outcomes default to success and can be scripted per round, which
//! makes delivery, failure and timeout paths reproducible in tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use murmur_shared::framing::Frame;
use murmur_shared::types::{EphemeralId, ReceptionId, RoundId};

use crate::error::NetError;
use crate::network::{
    HealthCallback, HealthCallbackId, MessageAssembler, MessageProcessor, MixNetwork, Round,
    RoundEvent, RoundEventCallback, RoundOutcome, SendParams,
};

struct Delivery {
    recipient: ReceptionId,
    frame: Frame,
    round: Round,
}

struct Watch {
    rounds: Vec<RoundId>,
    callback: RoundEventCallback,
}

struct Inner {
    next_round: u64,
    next_ephemeral: i64,
    healthy: bool,
    identities: HashMap<ReceptionId, Arc<dyn MessageProcessor>>,
    pending: Vec<Delivery>,
    scripted: HashMap<RoundId, VecDeque<RoundOutcome>>,
    watches: Vec<Watch>,
    health_callbacks: HashMap<HealthCallbackId, HealthCallback>,
    next_health_id: u64,
    sent_frames: usize,
}

/// Loopback transport shared by every client in a test or demo process.
pub struct LoopbackNet {
    max_contents: usize,
    inner: Mutex<Inner>,
}

impl LoopbackNet {
    pub fn new(max_contents: usize) -> Self {
        Self {
            max_contents,
            inner: Mutex::new(Inner {
                next_round: 1,
                next_ephemeral: 1,
                healthy: true,
                identities: HashMap::new(),
                pending: Vec::new(),
                scripted: HashMap::new(),
                watches: Vec::new(),
                health_callbacks: HashMap::new(),
                next_health_id: 0,
                sent_frames: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Loopback state stays consistent across a panicking callback since
        // callbacks never run under the lock.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// ID the next send will be assigned.
    pub fn next_round_id(&self) -> RoundId {
        RoundId(self.lock().next_round)
    }

    /// Outcomes reported for `round` by successive watches. Once the script
    /// is exhausted the round reports success.
    pub fn script_round(&self, round: RoundId, outcomes: impl IntoIterator<Item = RoundOutcome>) {
        self.lock()
            .scripted
            .entry(round)
            .or_default()
            .extend(outcomes);
    }

    /// Total frames accepted by `send_many` so far.
    pub fn sent_frames(&self) -> usize {
        self.lock().sent_frames
    }

    pub fn pending_deliveries(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn pending_watches(&self) -> usize {
        self.lock().watches.len()
    }

    pub fn health_callback_count(&self) -> usize {
        self.lock().health_callbacks.len()
    }

    /// Hand every queued frame to the processor registered for its
    /// recipient. Frames for unknown recipients are dropped. Returns the
    /// number of frames processed.
    pub fn deliver_all(&self) -> usize {
        let batch: Vec<(Delivery, Option<Arc<dyn MessageProcessor>>)> = {
            let mut inner = self.lock();
            let pending = std::mem::take(&mut inner.pending);
            pending
                .into_iter()
                .map(|d| {
                    let processor = inner.identities.get(&d.recipient).cloned();
                    (d, processor)
                })
                .collect()
        };

        let mut delivered = 0;
        for (delivery, processor) in batch {
            match processor {
                Some(p) => {
                    p.process(&delivery.frame, &delivery.recipient, &delivery.round);
                    delivered += 1;
                }
                None => {
                    debug!(recipient = %delivery.recipient, "dropping frame for unregistered identity");
                }
            }
        }
        delivered
    }

    /// Fire every registered round-result watch once. Watches registered by
    /// the callbacks themselves wait for the next call. Returns the number of
    /// watches fired.
    pub fn resolve_round_watches(&self) -> usize {
        let fired: Vec<(RoundEventCallback, RoundEvent)> = {
            let mut inner = self.lock();
            let watches = std::mem::take(&mut inner.watches);
            watches
                .into_iter()
                .map(|w| {
                    let results = w
                        .rounds
                        .iter()
                        .map(|r| {
                            let outcome = inner
                                .scripted
                                .get_mut(r)
                                .and_then(|q| q.pop_front())
                                .unwrap_or(RoundOutcome::Succeeded);
                            (*r, outcome)
                        })
                        .collect();
                    (w.callback, RoundEvent::from_results(results))
                })
                .collect()
        };

        let count = fired.len();
        for (callback, event) in fired {
            callback(event);
        }
        count
    }

    /// Deliver queued frames, then resolve round watches.
    pub fn flush(&self) {
        self.deliver_all();
        self.resolve_round_watches();
    }

    /// Change the health state and notify every health callback.
    pub fn set_healthy(&self, healthy: bool) {
        let callbacks: Vec<HealthCallback> = {
            let mut inner = self.lock();
            inner.healthy = healthy;
            inner.health_callbacks.values().cloned().collect()
        };
        info!(healthy, "loopback network health changed");
        for cb in callbacks {
            cb(healthy);
        }
    }
}

impl MixNetwork for LoopbackNet {
    fn max_message_length(&self) -> usize {
        self.max_contents
    }

    fn send_many(
        &self,
        assembler: &mut dyn MessageAssembler,
        params: &SendParams,
    ) -> Result<(Round, Vec<EphemeralId>), NetError> {
        let round = {
            let mut inner = self.lock();
            if !inner.healthy {
                return Err(NetError::Unhealthy);
            }
            let id = RoundId(inner.next_round);
            inner.next_round += 1;
            Round {
                id,
                queued_at: Utc::now(),
            }
        };

        let messages = assembler.assemble(&round).map_err(NetError::Assembly)?;
        for msg in &messages {
            if msg.frame.contents.len() > self.max_contents {
                warn!(tag = %params.debug_tag, len = msg.frame.contents.len(), "rejecting oversized frame");
                return Err(NetError::MessageTooLong {
                    len: msg.frame.contents.len(),
                    max: self.max_contents,
                });
            }
        }

        let mut inner = self.lock();
        let mut ephemeral_ids = Vec::with_capacity(messages.len());
        for msg in messages {
            ephemeral_ids.push(EphemeralId(inner.next_ephemeral));
            inner.next_ephemeral += 1;
            inner.sent_frames += 1;
            inner.pending.push(Delivery {
                recipient: msg.recipient,
                frame: msg.frame,
                round,
            });
        }

        debug!(tag = %params.debug_tag, round = %round.id, frames = ephemeral_ids.len(), "queued send");
        Ok((round, ephemeral_ids))
    }

    fn get_round_results(&self, timeout: Duration, callback: RoundEventCallback, rounds: &[RoundId]) {
        debug!(?rounds, timeout_secs = timeout.as_secs(), "registering round watch");
        self.lock().watches.push(Watch {
            rounds: rounds.to_vec(),
            callback,
        });
    }

    fn add_health_callback(&self, callback: HealthCallback) -> HealthCallbackId {
        let mut inner = self.lock();
        let id = HealthCallbackId(inner.next_health_id);
        inner.next_health_id += 1;
        inner.health_callbacks.insert(id, callback);
        id
    }

    fn remove_health_callback(&self, id: HealthCallbackId) {
        self.lock().health_callbacks.remove(&id);
    }

    fn is_healthy(&self) -> bool {
        self.lock().healthy
    }

    fn add_identity(&self, id: ReceptionId, processor: Arc<dyn MessageProcessor>) {
        self.lock().identities.insert(id, processor);
    }

    fn remove_identity(&self, id: &ReceptionId) {
        self.lock().identities.remove(id);
    }
}
