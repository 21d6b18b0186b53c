use chrono::Weekday;

use crate::model::*;
use crate::policy;
use crate::ports::ReservationLookup;
use crate::reservation::Reservation;

use super::{Engine, EngineError, SharedBranchState};

impl Engine {
    pub async fn get_reservation(&self, id: ReservationId) -> Option<Reservation> {
        let branch_id = self.branch_for_reservation(&id)?;
        let shared = self.get_branch(&branch_id)?;
        let guard = shared.read().await;
        guard.reservations.get(&id).cloned()
    }

    /// Reservations of a branch, optionally for one weekday, ordered by day then start.
    pub async fn list_reservations(
        &self,
        branch_id: BranchId,
        day: Option<Weekday>,
    ) -> Result<Vec<Reservation>, EngineError> {
        let shared = self.require_branch(&branch_id)?;
        let guard = shared.read().await;
        let mut out: Vec<Reservation> = guard
            .reservations
            .values()
            .filter(|r| day.is_none_or(|d| r.slot().day() == d))
            .cloned()
            .collect();
        out.sort_by_key(|r| (r.slot().day().num_days_from_monday(), r.slot().start(), r.id()));
        Ok(out)
    }

    /// Tables of a branch ordered by label.
    pub async fn list_tables(&self, branch_id: BranchId) -> Result<Vec<Table>, EngineError> {
        let shared = self.require_branch(&branch_id)?;
        let guard = shared.read().await;
        let mut out = guard.tables.clone();
        out.sort_by_key(|t| t.label.to_uppercase());
        Ok(out)
    }

    /// Every table that could take the request right now, best choice first.
    pub async fn available_tables(
        &self,
        branch_id: BranchId,
        slot: ScheduleSlot,
        party_size: u32,
        prefers_outdoor: bool,
    ) -> Result<Vec<Table>, EngineError> {
        let shared = self.require_branch(&branch_id)?;
        let guard = shared.read().await;
        if !guard.is_open(&slot) {
            return Ok(Vec::new());
        }
        let existing = guard.booked_on(slot.day());
        Ok(
            policy::candidates(&guard.tables, &existing, &slot, party_size, prefers_outdoor)
                .into_iter()
                .cloned()
                .collect(),
        )
    }

    pub async fn list_branches(&self) -> Vec<BranchInfo> {
        let shared: Vec<SharedBranchState> =
            self.branches.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(shared.len());
        for state in shared {
            out.push(state.read().await.info());
        }
        out.sort_by_key(|b| b.id);
        out
    }
}
