use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::DomainError;
use crate::limits::*;
use crate::model::*;
use crate::policy;
use crate::ports::{ReservationLookup, TableLookup};
use crate::reservation::{GuestDetails, NewReservation, Reservation};

use super::{BranchState, Engine, EngineError};

pub const OUTSIDE_OPENING_HOURS: &str = "outside opening hours";

#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub slot: ScheduleSlot,
    pub party_size: u32,
    pub prefers_outdoor: bool,
    pub guest: GuestDetails,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingOutcome {
    Booked(Reservation),
    /// No table could take the request. Expected, not an error.
    Unavailable(String),
}

impl BookingOutcome {
    pub fn reservation(&self) -> Option<&Reservation> {
        match self {
            BookingOutcome::Booked(r) => Some(r),
            BookingOutcome::Unavailable(_) => None,
        }
    }
}

/// New values for a table's editable fields. The out-of-service flag has its
/// own operation.
#[derive(Debug, Clone)]
pub struct TableUpdate {
    pub label: String,
    pub capacity: u32,
    pub is_outdoor: bool,
}

fn validate_label(label: &str) -> Result<(), EngineError> {
    if label.trim().is_empty() {
        return Err(EngineError::InvalidInput("table label must not be empty"));
    }
    if label.len() > MAX_LABEL_LEN {
        return Err(EngineError::LimitExceeded("table label too long"));
    }
    Ok(())
}

fn validate_capacity(capacity: u32) -> Result<(), EngineError> {
    if capacity == 0 {
        return Err(EngineError::InvalidInput("table capacity must be positive"));
    }
    if capacity > MAX_PARTY_SIZE {
        return Err(EngineError::LimitExceeded("table capacity too large"));
    }
    Ok(())
}

fn validate_note(note: Option<&str>) -> Result<(), EngineError> {
    if note.is_some_and(|n| n.len() > MAX_NOTE_LEN) {
        return Err(EngineError::LimitExceeded("note too long"));
    }
    Ok(())
}

impl Engine {
    // ── Branch and table management ──────────────────────────

    pub async fn create_branch(&self, id: BranchId, name: Option<String>) -> Result<(), EngineError> {
        let _gate = self.write_gate.read().await;
        if self.branches.len() >= MAX_BRANCHES_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many branches"));
        }
        if name.as_ref().is_some_and(|n| n.len() > MAX_NAME_LEN) {
            return Err(EngineError::LimitExceeded("branch name too long"));
        }

        // Claim the id before the WAL write. The new state stays write-locked
        // until the record is durable, so nothing can touch a branch that may
        // still be rolled back.
        let shared = Arc::new(RwLock::new(BranchState::new(id, name.clone())));
        let _pending = shared.write().await;
        match self.branches.entry(id) {
            Entry::Occupied(_) => return Err(EngineError::AlreadyExists(format!("branch {id}"))),
            Entry::Vacant(slot) => {
                slot.insert(shared.clone());
            }
        }

        let record = Record::BranchCreated { id, name };
        if let Err(e) = self.wal_append(&record).await {
            self.branches.remove(&id);
            return Err(e);
        }
        info!("tenant {}: created branch {id}", self.tenant_id);
        Ok(())
    }

    pub async fn set_opening_hours(
        &self,
        branch_id: BranchId,
        hours: Vec<ScheduleSlot>,
    ) -> Result<(), EngineError> {
        if hours.len() > MAX_OPENING_SLOTS {
            return Err(EngineError::LimitExceeded("too many opening slots"));
        }
        let _gate = self.write_gate.read().await;
        let shared = self.require_branch(&branch_id)?;
        let mut guard = shared.write().await;
        let record = Record::OpeningHoursSet { branch_id, hours };
        self.persist_and_apply(&mut guard, &record, &[]).await
    }

    pub async fn add_table(&self, branch_id: BranchId, table: Table) -> Result<(), EngineError> {
        validate_label(&table.label)?;
        validate_capacity(table.capacity)?;
        let _gate = self.write_gate.read().await;
        let shared = self.require_branch(&branch_id)?;
        let mut guard = shared.write().await;
        if guard.tables.len() >= MAX_TABLES_PER_BRANCH {
            return Err(EngineError::LimitExceeded("too many tables in branch"));
        }
        if guard.find_table(table.id).is_some() {
            return Err(EngineError::AlreadyExists(format!("table {}", table.id)));
        }
        if guard.label_taken(&table.label, None) {
            return Err(EngineError::DuplicateLabel(table.label));
        }

        debug!("branch {branch_id}: adding table {} ({})", table.label, table.id);
        let record = Record::TableUpserted { branch_id, table };
        self.persist_and_apply(&mut guard, &record, &[]).await
    }

    /// Capacity may not drop below the largest party still holding the table.
    pub async fn update_table(
        &self,
        branch_id: BranchId,
        table_id: TableId,
        update: TableUpdate,
    ) -> Result<(), EngineError> {
        validate_label(&update.label)?;
        validate_capacity(update.capacity)?;
        let _gate = self.write_gate.read().await;
        let shared = self.require_branch(&branch_id)?;
        let mut guard = shared.write().await;
        let mut table = guard
            .find_table(table_id)
            .cloned()
            .ok_or(EngineError::TableNotFound(table_id))?;
        if guard.label_taken(&update.label, Some(table_id)) {
            return Err(EngineError::DuplicateLabel(update.label));
        }
        if let Some(party_size) = guard.largest_blocking_party(table_id)
            && party_size > update.capacity
        {
            return Err(DomainError::CapacityExceeded {
                party_size,
                capacity: update.capacity,
            }
            .into());
        }

        table.label = update.label;
        table.capacity = update.capacity;
        table.is_outdoor = update.is_outdoor;
        let record = Record::TableUpserted { branch_id, table };
        self.persist_and_apply(&mut guard, &record, &[]).await
    }

    /// Existing reservations on the table are kept; it just stops being offered.
    pub async fn set_table_out_of_service(
        &self,
        branch_id: BranchId,
        table_id: TableId,
        out_of_service: bool,
    ) -> Result<(), EngineError> {
        let _gate = self.write_gate.read().await;
        let shared = self.require_branch(&branch_id)?;
        let mut guard = shared.write().await;
        let mut table = guard
            .find_table(table_id)
            .cloned()
            .ok_or(EngineError::TableNotFound(table_id))?;
        if table.is_out_of_service == out_of_service {
            return Ok(());
        }
        table.is_out_of_service = out_of_service;
        info!(
            "branch {branch_id}: table {} {}",
            table.label,
            if out_of_service { "out of service" } else { "back in service" }
        );
        let record = Record::TableUpserted { branch_id, table };
        self.persist_and_apply(&mut guard, &record, &[]).await
    }

    pub async fn remove_table(&self, branch_id: BranchId, table_id: TableId) -> Result<(), EngineError> {
        let _gate = self.write_gate.read().await;
        let shared = self.require_branch(&branch_id)?;
        let mut guard = shared.write().await;
        if guard.find_table(table_id).is_none() {
            return Err(EngineError::TableNotFound(table_id));
        }
        if guard.has_blocking_reservations(table_id) {
            return Err(EngineError::TableInUse(table_id));
        }
        let record = Record::TableRemoved {
            branch_id,
            table_id,
        };
        self.persist_and_apply(&mut guard, &record, &[]).await
    }

    // ── Reservations ─────────────────────────────────────────

    /// Find a table and create a pending reservation on it.
    ///
    /// Lookup, allocation and write happen under the branch write lock.
    pub async fn book(
        &self,
        branch_id: BranchId,
        request: BookingRequest,
    ) -> Result<BookingOutcome, EngineError> {
        if request.party_size > MAX_PARTY_SIZE {
            return Err(EngineError::LimitExceeded("party too large"));
        }
        validate_note(request.guest.special_request.as_deref())?;
        let too_long = |f: &Option<String>| f.as_ref().is_some_and(|v| v.len() > MAX_NAME_LEN);
        if too_long(&request.guest.name) || too_long(&request.guest.phone) {
            return Err(EngineError::LimitExceeded("guest details too long"));
        }

        let _gate = self.write_gate.read().await;
        let shared = self.require_branch(&branch_id)?;
        let mut guard = shared.write().await;
        if guard.active_reservations() >= MAX_RESERVATIONS_PER_BRANCH {
            return Err(EngineError::LimitExceeded("too many active reservations in branch"));
        }

        if !guard.is_open(&request.slot) {
            metrics::counter!(crate::observability::BOOKINGS_TOTAL, "outcome" => "unavailable")
                .increment(1);
            return Ok(BookingOutcome::Unavailable(OUTSIDE_OPENING_HOURS.to_string()));
        }

        let tables = guard.tables();
        let existing = guard.booked_on(request.slot.day());
        let started = Instant::now();
        let allocation = policy::allocate(
            &tables,
            &existing,
            &request.slot,
            request.party_size,
            request.prefers_outdoor,
        );
        metrics::histogram!(crate::observability::ALLOCATION_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        let table_id = match allocation {
            AllocationResult::Success { table_id } => table_id,
            AllocationResult::Failure { reason } => {
                debug!("branch {branch_id}: no table for {}: {reason}", request.slot);
                metrics::counter!(crate::observability::BOOKINGS_TOTAL, "outcome" => "unavailable")
                    .increment(1);
                return Ok(BookingOutcome::Unavailable(reason));
            }
        };
        let table = guard
            .table(table_id)
            .ok_or(EngineError::TableNotFound(table_id))?;

        let (reservation, event) = Reservation::schedule(NewReservation {
            id: ReservationId::new(),
            tenant_id: self.tenant_id,
            branch_id,
            table_id,
            slot: request.slot,
            party_size: request.party_size,
            table_capacity: table.capacity,
            guest: request.guest,
            created_at: Utc::now(),
        })?;

        let record = Record::ReservationSaved {
            reservation: reservation.clone(),
        };
        self.persist_and_apply(&mut guard, &record, &[event]).await?;
        metrics::counter!(crate::observability::BOOKINGS_TOTAL, "outcome" => "booked").increment(1);
        info!(
            "branch {branch_id}: reservation {} on table {} for {} ({} guests)",
            reservation.id(),
            table.label,
            reservation.slot(),
            reservation.party_size()
        );
        Ok(BookingOutcome::Booked(reservation))
    }

    pub async fn confirm(
        &self,
        id: ReservationId,
        note: Option<String>,
    ) -> Result<Reservation, EngineError> {
        validate_note(note.as_deref())?;
        self.modify_reservation(id, |r, _| Ok(Some(r.confirm(Utc::now(), note)?)))
            .await
    }

    pub async fn check_in(
        &self,
        id: ReservationId,
        note: Option<String>,
    ) -> Result<Reservation, EngineError> {
        validate_note(note.as_deref())?;
        self.modify_reservation(id, |r, _| Ok(Some(r.mark_as_checked_in(Utc::now(), note)?)))
            .await
    }

    pub async fn cancel(&self, id: ReservationId, reason: String) -> Result<Reservation, EngineError> {
        validate_note(Some(reason.as_str()))?;
        self.modify_reservation(id, |r, _| Ok(Some(r.cancel(Utc::now(), reason)?)))
            .await
    }

    pub async fn mark_no_show(
        &self,
        id: ReservationId,
        note: Option<String>,
    ) -> Result<Reservation, EngineError> {
        validate_note(note.as_deref())?;
        self.modify_reservation(id, |r, _| Ok(Some(r.mark_as_no_show(Utc::now(), note)?)))
            .await
    }

    /// Checked against the table's current capacity.
    pub async fn update_party_size(
        &self,
        id: ReservationId,
        party_size: u32,
    ) -> Result<Reservation, EngineError> {
        self.modify_reservation(id, |r, branch| {
            let table = branch
                .find_table(r.table_id())
                .ok_or(EngineError::TableNotFound(r.table_id()))?;
            r.update_party_size(party_size, table.capacity, Utc::now())?;
            Ok(None)
        })
        .await
    }

    /// Run `change` on a copy of the reservation and persist it if it succeeds.
    /// A failed change leaves the stored reservation untouched.
    async fn modify_reservation<F>(&self, id: ReservationId, change: F) -> Result<Reservation, EngineError>
    where
        F: FnOnce(&mut Reservation, &BranchState) -> Result<Option<ReservationEvent>, EngineError>,
    {
        let _gate = self.write_gate.read().await;
        let branch_id = self
            .branch_for_reservation(&id)
            .ok_or(EngineError::ReservationNotFound(id))?;
        let shared = self.require_branch(&branch_id)?;
        let mut guard = shared.write().await;
        let mut reservation = guard
            .reservations
            .get(&id)
            .cloned()
            .ok_or(EngineError::ReservationNotFound(id))?;

        let event = change(&mut reservation, &*guard)?;

        let record = Record::ReservationSaved {
            reservation: reservation.clone(),
        };
        let events: Vec<ReservationEvent> = event.into_iter().collect();
        self.persist_and_apply(&mut guard, &record, &events).await?;
        debug!("reservation {id} is now {}", reservation.status());
        Ok(reservation)
    }
}
