//! Durable tracking of sent direct messages.
//!
//! A send moves through `Unsent` (surfaced in the UI, not yet on the network)
//! to `Sent` once the network accepted it, or to `Failed`. Round-result
//! watches reconcile the network's verdict for every round a tracked message
//! went out on, and the arrival of the self-addressed copy marks it
//! delivered.
//!
//! All state lives behind one lock. Each mutation persists the affected
//! table before the lock is released, so the stored state never lags the
//! in-memory state. Status changes are pushed over a channel and applied to
//! the event model by a separate task.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard};

use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use murmur_net::{HealthCallbackId, MixNetwork, Round, RoundEvent};
use murmur_shared::protocol::DirectMessage;
use murmur_shared::timestamp::mutate_timestamp;
use murmur_shared::types::{MessageId, MessageType, PublicKey, RoundId, Status};
use murmur_store::{load_json, save_json, KeyValue};

use crate::config::DmConfig;
use crate::error::DmError;
use crate::event_model::{MessageInfo, StatusUpdate};

pub const SENT_STORAGE_KEY: &str = "dm_send_tracker_sent";
pub const SENT_STORAGE_VERSION: u64 = 0;
pub const UNSENT_STORAGE_KEY: &str = "dm_send_tracker_unsent";
pub const UNSENT_STORAGE_VERSION: u64 = 0;

/// Surfaces a pending send to the event model and returns its handle.
pub type TriggerFn = Arc<dyn Fn(&MessageInfo, &[u8]) -> Result<u64, DmError> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tracked {
    pub message_id: MessageId,
    pub round_id: RoundId,
    pub uuid: u64,
    pub partner_key: PublicKey,
    pub sender_key: PublicKey,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TrackedList {
    list: Vec<Tracked>,
    round_completed: bool,
}

#[derive(Default)]
struct TrackerState {
    by_round: HashMap<RoundId, TrackedList>,
    by_message_id: HashMap<MessageId, Tracked>,
    unsent: HashMap<u64, Tracked>,
}

/// Snapshot of one tracked round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundTracking {
    pub messages: Vec<MessageId>,
    pub completed: bool,
}

pub struct SendTracker {
    state: RwLock<TrackerState>,
    kv: Arc<dyn KeyValue>,
    net: Arc<dyn MixNetwork>,
    trigger: TriggerFn,
    updates: mpsc::UnboundedSender<StatusUpdate>,
    config: DmConfig,
}

impl SendTracker {
    /// Restore tracker state from `kv`.
    ///
    /// Sends left pending by a previous run are reported `Failed` and purged.
    /// Rounds whose outcome was never learned are watched again the first
    /// time the network reports healthy.
    pub fn load(
        kv: Arc<dyn KeyValue>,
        net: Arc<dyn MixNetwork>,
        trigger: TriggerFn,
        updates: mpsc::UnboundedSender<StatusUpdate>,
        config: DmConfig,
    ) -> Result<Arc<Self>, DmError> {
        let by_round: HashMap<RoundId, TrackedList> =
            load_json(kv.as_ref(), SENT_STORAGE_KEY, SENT_STORAGE_VERSION)?.unwrap_or_default();
        let unsent: HashMap<u64, Tracked> =
            load_json(kv.as_ref(), UNSENT_STORAGE_KEY, UNSENT_STORAGE_VERSION)?
                .unwrap_or_default();

        let by_message_id = by_round
            .values()
            .flat_map(|l| l.list.iter())
            .map(|t| (t.message_id, t.clone()))
            .collect();

        let tracker = Arc::new(Self {
            state: RwLock::new(TrackerState {
                by_round,
                by_message_id,
                unsent: HashMap::new(),
            }),
            kv,
            net,
            trigger,
            updates,
            config,
        });

        if !unsent.is_empty() {
            warn!(count = unsent.len(), "failing sends left pending by previous run");
            for (uuid, t) in &unsent {
                tracker.push_update(StatusUpdate {
                    uuid: *uuid,
                    message_id: t.message_id,
                    timestamp: None,
                    round: None,
                    status: Status::Failed,
                });
            }
            let state = tracker.state.read().map_err(|_| DmError::LockPoisoned)?;
            tracker.persist_unsent(&state)?;
        }

        tracker.register_health_rearm();
        Ok(tracker)
    }

    /// Surface a send in the UI before it reaches the network.
    ///
    /// The event model sees a random placeholder message ID since the real
    /// one is only known once the network picks a round.
    pub fn denote_pending_send(
        &self,
        partner_key: PublicKey,
        sender_key: PublicKey,
        partner_token: u32,
        message_type: MessageType,
        dm: &DirectMessage,
    ) -> Result<u64, DmError> {
        let mut placeholder = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut placeholder)
            .map_err(|e| DmError::Rng(e.to_string()))?;
        let message_id = MessageId(placeholder);

        let lead = chrono::Duration::from_std(self.config.pending_timestamp_lead)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let info = MessageInfo {
            message_id,
            message_type,
            nickname: dm.nickname.clone(),
            partner_key,
            sender_key,
            dm_token: partner_token,
            timestamp: Utc::now() + lead,
            round: None,
            status: Status::Unsent,
        };
        let uuid = (self.trigger)(&info, &dm.payload)?;

        let mut state = self.state.write().map_err(|_| DmError::LockPoisoned)?;
        if state.unsent.contains_key(&uuid) {
            return Ok(uuid);
        }
        state.unsent.insert(
            uuid,
            Tracked {
                message_id,
                round_id: RoundId::default(),
                uuid,
                partner_key,
                sender_key,
            },
        );
        self.persist_unsent(&state)?;
        Ok(uuid)
    }

    /// Record that the pending send `uuid` went out as `message_id` on `round`.
    pub fn sent(self: &Arc<Self>, uuid: u64, message_id: MessageId, round: &Round) -> Result<(), DmError> {
        let first_in_round = {
            let mut state = self.state.write().map_err(|_| DmError::LockPoisoned)?;
            let mut t = state
                .unsent
                .get(&uuid)
                .cloned()
                .ok_or(DmError::UnknownPendingSend(uuid))?;
            if state.by_message_id.contains_key(&message_id) {
                return Err(DmError::AlreadySent(message_id));
            }

            t.message_id = message_id;
            t.round_id = round.id;

            let first_in_round = !state.by_round.contains_key(&round.id);
            state
                .by_round
                .entry(round.id)
                .or_default()
                .list
                .push(t.clone());
            state.by_message_id.insert(message_id, t);
            state.unsent.remove(&uuid);

            self.persist_sent(&state)?;
            self.persist_unsent(&state)?;
            first_in_round
        };

        if first_in_round {
            self.watch_round(round.id, 0);
        }

        self.push_update(StatusUpdate {
            uuid,
            message_id,
            timestamp: Some(mutate_timestamp(round.queued_at, &message_id)),
            round: Some(*round),
            status: Status::Sent,
        });
        Ok(())
    }

    /// Record that the pending send `uuid` never reached the network.
    pub fn failed_send(&self, uuid: u64) -> Result<(), DmError> {
        {
            let mut state = self.state.write().map_err(|_| DmError::LockPoisoned)?;
            state
                .unsent
                .remove(&uuid)
                .ok_or(DmError::UnknownPendingSend(uuid))?;
            self.persist_unsent(&state)?;
        }

        self.push_update(StatusUpdate {
            uuid,
            message_id: MessageId::default(),
            timestamp: None,
            round: None,
            status: Status::Failed,
        });
        Ok(())
    }

    /// True if `message_id` was sent by this client and is still tracked.
    pub fn check_if_sent(&self, message_id: &MessageId) -> bool {
        self.read_state().by_message_id.contains_key(message_id)
    }

    /// Report a tracked message as received. The entry stays tracked.
    pub fn delivered(&self, message_id: &MessageId, round: &Round) -> bool {
        let uuid = match self.read_state().by_message_id.get(message_id) {
            Some(t) => t.uuid,
            None => return false,
        };

        self.push_update(StatusUpdate {
            uuid,
            message_id: *message_id,
            timestamp: Some(mutate_timestamp(round.queued_at, message_id)),
            round: Some(*round),
            status: Status::Received,
        });
        true
    }

    /// Forget a tracked message. Returns false if it was not tracked.
    pub fn stop_tracking(&self, message_id: &MessageId) -> Result<bool, DmError> {
        let mut state = self.state.write().map_err(|_| DmError::LockPoisoned)?;
        let Some(t) = state.by_message_id.remove(message_id) else {
            return Ok(false);
        };

        let now_empty = match state.by_round.get_mut(&t.round_id) {
            Some(tracked) => {
                tracked.list.retain(|e| e.message_id != *message_id);
                tracked.list.is_empty()
            }
            None => false,
        };
        if now_empty {
            state.by_round.remove(&t.round_id);
        }

        self.persist_sent(&state)?;
        debug!(msg_id = %message_id, round = %t.round_id, "stopped tracking message");
        Ok(true)
    }

    /// Number of sends still waiting for the network.
    pub fn pending_count(&self) -> usize {
        self.read_state().unsent.len()
    }

    pub fn round_status(&self, round: RoundId) -> Option<RoundTracking> {
        self.read_state().by_round.get(&round).map(|l| RoundTracking {
            messages: l.list.iter().map(|t| t.message_id).collect(),
            completed: l.round_completed,
        })
    }

    fn read_state(&self) -> RwLockReadGuard<'_, TrackerState> {
        self.state.read().unwrap_or_else(|p| p.into_inner())
    }

    fn watch_round(self: &Arc<Self>, round: RoundId, checks: u32) {
        let tracker = Arc::clone(self);
        self.net.get_round_results(
            self.config.round_results_timeout,
            Box::new(move |event| tracker.handle_round_event(round, checks, event)),
            &[round],
        );
    }

    fn handle_round_event(self: &Arc<Self>, round: RoundId, checks: u32, event: RoundEvent) {
        let failed = {
            let mut state = match self.state.write() {
                Ok(s) => s,
                Err(_) => {
                    error!(%round, "send tracker lock poisoned, dropping round result");
                    return;
                }
            };
            if !state.by_round.contains_key(&round) {
                return;
            }

            let mut failed = !event.all_succeeded;
            if event.timed_out {
                let checks = checks + 1;
                if checks >= self.config.max_round_checks {
                    warn!(
                        %round,
                        checks,
                        "round result unknown after maximum checks, assuming failure"
                    );
                    failed = true;
                } else {
                    drop(state);
                    debug!(%round, checks, "round result timed out, checking again");
                    self.watch_round(round, checks);
                    return;
                }
            }

            // Failed rounds are forgotten once reported; their self copies never arrive.
            let list = if failed {
                let list = state
                    .by_round
                    .remove(&round)
                    .map(|l| l.list)
                    .unwrap_or_default();
                for t in &list {
                    state.by_message_id.remove(&t.message_id);
                }
                list
            } else {
                if let Some(registered) = state.by_round.get_mut(&round) {
                    registered.round_completed = true;
                }
                Vec::new()
            };

            if let Err(e) = self.persist_sent(&state) {
                error!(%round, error = %e, "failed to persist completed round");
            }
            list
        };

        if failed.is_empty() {
            debug!(%round, "round completed");
            return;
        }
        info!(%round, count = failed.len(), "round failed, marking messages failed");
        for t in failed {
            self.push_update(StatusUpdate {
                uuid: t.uuid,
                message_id: t.message_id,
                timestamp: None,
                round: None,
                status: Status::Failed,
            });
        }
    }

    fn register_health_rearm(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let slot: Arc<Mutex<Option<HealthCallbackId>>> = Arc::new(Mutex::new(None));
        let fired = Arc::new(AtomicBool::new(false));

        let cb_slot = slot.clone();
        let cb_fired = fired.clone();
        let id = self.net.add_health_callback(Arc::new(move |healthy| {
            if !healthy || cb_fired.swap(true, Ordering::SeqCst) {
                return;
            }
            let Some(tracker) = weak.upgrade() else {
                return;
            };
            if let Some(id) = cb_slot.lock().ok().and_then(|mut s| s.take()) {
                tracker.net.remove_health_callback(id);
            }
            tracker.rearm_incomplete_rounds();
        }));

        if fired.load(Ordering::SeqCst) {
            self.net.remove_health_callback(id);
        } else if let Ok(mut s) = slot.lock() {
            *s = Some(id);
        }
    }

    fn rearm_incomplete_rounds(self: &Arc<Self>) {
        let rounds: Vec<RoundId> = self
            .read_state()
            .by_round
            .iter()
            .filter(|(_, l)| !l.round_completed)
            .map(|(r, _)| *r)
            .collect();

        info!(count = rounds.len(), "network healthy, re-checking incomplete rounds");
        for round in rounds {
            self.watch_round(round, 0);
        }
    }

    fn persist_sent(&self, state: &TrackerState) -> Result<(), DmError> {
        save_json(
            self.kv.as_ref(),
            SENT_STORAGE_KEY,
            SENT_STORAGE_VERSION,
            &state.by_round,
        )
        .map_err(|e| {
            error!(error = %e, "failed to persist sent messages");
            DmError::from(e)
        })
    }

    fn persist_unsent(&self, state: &TrackerState) -> Result<(), DmError> {
        save_json(
            self.kv.as_ref(),
            UNSENT_STORAGE_KEY,
            UNSENT_STORAGE_VERSION,
            &state.unsent,
        )
        .map_err(|e| {
            error!(error = %e, "failed to persist unsent messages");
            DmError::from(e)
        })
    }

    fn push_update(&self, update: StatusUpdate) {
        if self.updates.send(update).is_err() {
            warn!("status dispatcher has shut down, dropping status update");
        }
    }
}
