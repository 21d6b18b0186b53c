//! Seams between the booking core and whatever stores and dispatches its data.

use chrono::Weekday;

use crate::model::*;

/// Tables of one branch, with their current capacity and service flags.
pub trait TableLookup {
    fn tables(&self) -> Vec<Table>;

    fn table(&self, id: TableId) -> Option<Table> {
        self.tables().into_iter().find(|t| t.id == id)
    }
}

/// Existing reservations of one branch, projected for conflict checks.
pub trait ReservationLookup {
    fn booked_on(&self, day: Weekday) -> Vec<BookedSlot>;
}

/// Receives lifecycle events after the change that raised them is durable.
pub trait EventSink {
    fn publish(&self, event: &ReservationEvent);
}
