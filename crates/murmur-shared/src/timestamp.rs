use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::constants::KDF_CONTEXT_TIMESTAMP;
use crate::types::MessageId;

/// How far (ms) a sender's local clock may lag behind the round's queue time.
pub const TIMESTAMP_BEHIND_WINDOW_MS: i64 = 5_000;

/// How far (ms) a sender's local clock may run ahead of the round's queue time.
pub const TIMESTAMP_AHEAD_WINDOW_MS: i64 = 2_500;

/// Half-width of the deterministic offset applied by [`mutate_timestamp`].
const MUTATION_RANGE_NANOS: i64 = 500_000_000;

/// Convert wire nanoseconds into a UTC timestamp.
pub fn from_unix_nanos(nanos: i64) -> DateTime<Utc> {
    Utc.timestamp_nanos(nanos)
}

/// Current time as wire nanoseconds.
pub fn now_unix_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

/// Shift a round timestamp by a message-specific offset so messages sharing a
/// round keep a stable, distinct order.
pub fn mutate_timestamp(ts: DateTime<Utc>, msg_id: &MessageId) -> DateTime<Utc> {
    let hash = blake3::derive_key(KDF_CONTEXT_TIMESTAMP, msg_id.as_bytes());
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&hash[..8]);
    let offset =
        i64::from_le_bytes(raw).rem_euclid(2 * MUTATION_RANGE_NANOS) - MUTATION_RANGE_NANOS;
    ts + Duration::nanoseconds(offset)
}

/// Keep the sender's timestamp if it is plausible for the round the message
/// arrived on, otherwise fall back to the mutated round timestamp.
pub fn vet_timestamp(
    local: DateTime<Utc>,
    round_queued: DateTime<Utc>,
    msg_id: &MessageId,
) -> DateTime<Utc> {
    let earliest = round_queued - Duration::milliseconds(TIMESTAMP_BEHIND_WINDOW_MS);
    let latest = round_queued + Duration::milliseconds(TIMESTAMP_AHEAD_WINDOW_MS);
    if local < earliest || local > latest {
        mutate_timestamp(round_queued, msg_id)
    } else {
        local
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutation_is_deterministic_and_bounded() {
        let ts = Utc::now();
        let id = MessageId([3u8; 32]);
        let a = mutate_timestamp(ts, &id);
        let b = mutate_timestamp(ts, &id);
        assert_eq!(a, b);
        assert!((a - ts).num_milliseconds().abs() <= 500);
    }

    #[test]
    fn test_mutation_differs_per_message() {
        let ts = Utc::now();
        let a = mutate_timestamp(ts, &MessageId([1u8; 32]));
        let b = mutate_timestamp(ts, &MessageId([2u8; 32]));
        assert_ne!(a, b);
    }

    #[test]
    fn test_vet_keeps_plausible_timestamp() {
        let queued = Utc::now();
        let local = queued - Duration::seconds(1);
        assert_eq!(vet_timestamp(local, queued, &MessageId::default()), local);
    }

    #[test]
    fn test_vet_replaces_skewed_timestamp() {
        let queued = Utc::now();
        let id = MessageId([9u8; 32]);
        let far_past = queued - Duration::hours(3);
        let far_future = queued + Duration::seconds(30);
        assert_eq!(vet_timestamp(far_past, queued, &id), mutate_timestamp(queued, &id));
        assert_eq!(vet_timestamp(far_future, queued, &id), mutate_timestamp(queued, &id));
    }

    #[test]
    fn test_nanos_roundtrip() {
        let nanos = now_unix_nanos();
        assert_eq!(from_unix_nanos(nanos).timestamp_nanos_opt(), Some(nanos));
    }
}
