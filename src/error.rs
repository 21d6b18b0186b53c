use chrono::{DateTime, NaiveTime, Utc};
use thiserror::Error;

use crate::model::ReservationStatus;

/// Broken business rules on slots and reservations. Not retryable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("invalid slot: start {start} must be before end {end}")]
    InvalidSlot { start: NaiveTime, end: NaiveTime },

    #[error("party of {party_size} exceeds table capacity {capacity}")]
    CapacityExceeded { party_size: u32, capacity: u32 },

    #[error("party size must be positive")]
    InvalidPartySize,

    #[error("cannot {action} a {from} reservation")]
    InvalidTransition {
        from: ReservationStatus,
        action: &'static str,
    },

    #[error("timestamp {at} is before the last status change at {last}")]
    OutOfOrderTimestamp {
        at: DateTime<Utc>,
        last: DateTime<Utc>,
    },
}
