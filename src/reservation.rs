use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::model::*;

/// Contact details and wishes captured at booking time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestDetails {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub special_request: Option<String>,
}

/// Input to [`Reservation::schedule`]. `table_capacity` comes from the caller,
/// the aggregate never holds table data.
#[derive(Debug, Clone)]
pub struct NewReservation {
    pub id: ReservationId,
    pub tenant_id: TenantId,
    pub branch_id: BranchId,
    pub table_id: TableId,
    pub slot: ScheduleSlot,
    pub party_size: u32,
    pub table_capacity: u32,
    pub guest: GuestDetails,
    pub created_at: DateTime<Utc>,
}

/// Reservation aggregate root.
///
/// State machine:
///
/// ```text
/// Pending ──confirm──▶ Confirmed ──check in──▶ CheckedIn
///    │                    │ │
///    └──cancel──▶ Cancelled ◀┘ └──no show──▶ NoShow
/// ```
///
/// Every transition appends to `status_history` and returns the one
/// [`ReservationEvent`] it raised; the caller dispatches it after persisting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    id: ReservationId,
    tenant_id: TenantId,
    branch_id: BranchId,
    table_id: TableId,
    slot: ScheduleSlot,
    party_size: u32,
    status: ReservationStatus,
    status_history: Vec<StatusChange>,
    guest: GuestDetails,
    updated_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    checked_in_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    cancellation_reason: Option<String>,
    no_show_recorded_at: Option<DateTime<Utc>>,
}

fn check_party_size(party_size: u32, capacity: u32) -> Result<(), DomainError> {
    if party_size == 0 {
        return Err(DomainError::InvalidPartySize);
    }
    if party_size > capacity {
        return Err(DomainError::CapacityExceeded {
            party_size,
            capacity,
        });
    }
    Ok(())
}

impl Reservation {
    pub fn schedule(new: NewReservation) -> Result<(Self, ReservationEvent), DomainError> {
        check_party_size(new.party_size, new.table_capacity)?;

        let reservation = Self {
            id: new.id,
            tenant_id: new.tenant_id,
            branch_id: new.branch_id,
            table_id: new.table_id,
            slot: new.slot,
            party_size: new.party_size,
            status: ReservationStatus::Pending,
            status_history: vec![StatusChange {
                status: ReservationStatus::Pending,
                changed_at: new.created_at,
                note: None,
            }],
            guest: new.guest,
            updated_at: new.created_at,
            confirmed_at: None,
            checked_in_at: None,
            cancelled_at: None,
            cancellation_reason: None,
            no_show_recorded_at: None,
        };
        let event = reservation.event(
            new.created_at,
            ReservationEventKind::Created {
                slot: new.slot,
                party_size: new.party_size,
            },
        );
        Ok((reservation, event))
    }

    pub fn confirm(
        &mut self,
        at: DateTime<Utc>,
        note: Option<String>,
    ) -> Result<ReservationEvent, DomainError> {
        self.transition(
            &[ReservationStatus::Pending],
            ReservationStatus::Confirmed,
            "confirm",
            at,
            note,
        )?;
        self.confirmed_at = Some(at);
        Ok(self.event(at, ReservationEventKind::Confirmed))
    }

    pub fn mark_as_checked_in(
        &mut self,
        at: DateTime<Utc>,
        note: Option<String>,
    ) -> Result<ReservationEvent, DomainError> {
        self.transition(
            &[ReservationStatus::Confirmed],
            ReservationStatus::CheckedIn,
            "check in",
            at,
            note,
        )?;
        self.checked_in_at = Some(at);
        Ok(self.event(at, ReservationEventKind::CheckedIn))
    }

    /// Re-cancelling is an invalid transition, not a no-op.
    pub fn cancel(
        &mut self,
        at: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Result<ReservationEvent, DomainError> {
        let reason = reason.into();
        self.transition(
            &[ReservationStatus::Pending, ReservationStatus::Confirmed],
            ReservationStatus::Cancelled,
            "cancel",
            at,
            Some(reason.clone()),
        )?;
        self.cancelled_at = Some(at);
        self.cancellation_reason = Some(reason.clone());
        Ok(self.event(at, ReservationEventKind::Cancelled { reason }))
    }

    pub fn mark_as_no_show(
        &mut self,
        at: DateTime<Utc>,
        note: Option<String>,
    ) -> Result<ReservationEvent, DomainError> {
        self.transition(
            &[ReservationStatus::Confirmed],
            ReservationStatus::NoShow,
            "mark as no-show",
            at,
            note,
        )?;
        self.no_show_recorded_at = Some(at);
        Ok(self.event(at, ReservationEventKind::NoShowRecorded))
    }

    /// Not a status transition: no history entry, no event.
    pub fn update_party_size(
        &mut self,
        party_size: u32,
        table_capacity: u32,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                action: "resize",
            });
        }
        check_party_size(party_size, table_capacity)?;
        self.party_size = party_size;
        self.updated_at = self.updated_at.max(at);
        Ok(())
    }

    fn transition(
        &mut self,
        allowed: &[ReservationStatus],
        to: ReservationStatus,
        action: &'static str,
        at: DateTime<Utc>,
        note: Option<String>,
    ) -> Result<(), DomainError> {
        if !allowed.contains(&self.status) {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                action,
            });
        }
        if let Some(last) = self.status_history.last()
            && at < last.changed_at
        {
            return Err(DomainError::OutOfOrderTimestamp {
                at,
                last: last.changed_at,
            });
        }
        self.status = to;
        self.status_history.push(StatusChange {
            status: to,
            changed_at: at,
            note,
        });
        self.updated_at = at;
        Ok(())
    }

    fn event(&self, at: DateTime<Utc>, kind: ReservationEventKind) -> ReservationEvent {
        ReservationEvent {
            reservation_id: self.id,
            tenant_id: self.tenant_id,
            branch_id: self.branch_id,
            table_id: self.table_id,
            occurred_at: at,
            kind,
        }
    }

    // ── Accessors ────────────────────────────────────────────

    pub fn id(&self) -> ReservationId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn branch_id(&self) -> BranchId {
        self.branch_id
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn slot(&self) -> ScheduleSlot {
        self.slot
    }

    pub fn party_size(&self) -> u32 {
        self.party_size
    }

    pub fn status(&self) -> ReservationStatus {
        self.status
    }

    pub fn status_history(&self) -> &[StatusChange] {
        &self.status_history
    }

    pub fn guest(&self) -> &GuestDetails {
        &self.guest
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn confirmed_at(&self) -> Option<DateTime<Utc>> {
        self.confirmed_at
    }

    pub fn checked_in_at(&self) -> Option<DateTime<Utc>> {
        self.checked_in_at
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    pub fn cancellation_reason(&self) -> Option<&str> {
        self.cancellation_reason.as_deref()
    }

    pub fn no_show_recorded_at(&self) -> Option<DateTime<Utc>> {
        self.no_show_recorded_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeDelta, TimeZone, Weekday};

    fn ts(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 6, 9, 0, 0).unwrap() + TimeDelta::minutes(minute)
    }

    fn friday_evening() -> ScheduleSlot {
        ScheduleSlot::new(
            Weekday::Fri,
            NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
        )
        .unwrap()
    }

    fn request(party_size: u32, table_capacity: u32) -> NewReservation {
        NewReservation {
            id: ReservationId::new(),
            tenant_id: TenantId::new(),
            branch_id: BranchId::new(),
            table_id: TableId::new(),
            slot: friday_evening(),
            party_size,
            table_capacity,
            guest: GuestDetails {
                name: Some("Ada".into()),
                ..Default::default()
            },
            created_at: ts(0),
        }
    }

    fn pending() -> Reservation {
        Reservation::schedule(request(2, 4)).unwrap().0
    }

    fn confirmed() -> Reservation {
        let mut r = pending();
        r.confirm(ts(1), None).unwrap();
        r
    }

    fn assert_invalid_transition(result: Result<ReservationEvent, DomainError>) {
        assert!(
            matches!(result, Err(DomainError::InvalidTransition { .. })),
            "expected InvalidTransition, got {result:?}"
        );
    }

    #[test]
    fn schedule_starts_pending_with_one_entry() {
        let req = request(2, 4);
        let (r, event) = Reservation::schedule(req.clone()).unwrap();
        assert_eq!(r.status(), ReservationStatus::Pending);
        assert_eq!(r.status_history().len(), 1);
        assert_eq!(r.status_history()[0].status, ReservationStatus::Pending);
        assert_eq!(r.party_size(), 2);
        assert_eq!(r.guest().name.as_deref(), Some("Ada"));

        assert_eq!(event.name(), "ReservationCreated");
        assert_eq!(event.reservation_id, req.id);
        assert_eq!(event.tenant_id, req.tenant_id);
        assert_eq!(event.branch_id, req.branch_id);
        assert_eq!(event.table_id, req.table_id);
        assert_eq!(event.occurred_at, ts(0));
    }

    #[test]
    fn schedule_over_capacity_fails() {
        let result = Reservation::schedule(request(6, 4));
        assert_eq!(
            result.err(),
            Some(DomainError::CapacityExceeded {
                party_size: 6,
                capacity: 4
            })
        );
    }

    #[test]
    fn schedule_exactly_at_capacity() {
        assert!(Reservation::schedule(request(4, 4)).is_ok());
    }

    #[test]
    fn schedule_empty_party_fails() {
        let result = Reservation::schedule(request(0, 4));
        assert_eq!(result.err(), Some(DomainError::InvalidPartySize));
    }

    #[test]
    fn confirm_from_pending() {
        let mut r = pending();
        let event = r.confirm(ts(5), Some("phoned".into())).unwrap();
        assert_eq!(r.status(), ReservationStatus::Confirmed);
        assert_eq!(r.confirmed_at(), Some(ts(5)));
        assert_eq!(r.status_history().len(), 2);
        assert_eq!(r.status_history()[1].note.as_deref(), Some("phoned"));
        assert_eq!(event.kind, ReservationEventKind::Confirmed);
    }

    #[test]
    fn confirm_twice_fails() {
        let mut r = confirmed();
        assert_invalid_transition(r.confirm(ts(2), None));
        assert_eq!(r.status_history().len(), 2);
    }

    #[test]
    fn check_in_requires_confirmed() {
        let mut r = pending();
        assert_invalid_transition(r.mark_as_checked_in(ts(2), None));

        let mut r = confirmed();
        let event = r.mark_as_checked_in(ts(2), None).unwrap();
        assert_eq!(r.status(), ReservationStatus::CheckedIn);
        assert_eq!(r.checked_in_at(), Some(ts(2)));
        assert_eq!(event.name(), "ReservationCheckedIn");
    }

    #[test]
    fn no_show_requires_confirmed() {
        let mut r = pending();
        assert_invalid_transition(r.mark_as_no_show(ts(2), None));
        assert_eq!(r.status(), ReservationStatus::Pending);

        r.confirm(ts(3), None).unwrap();
        let event = r.mark_as_no_show(ts(4), None).unwrap();
        assert_eq!(r.status(), ReservationStatus::NoShow);
        assert_eq!(r.no_show_recorded_at(), Some(ts(4)));
        assert_eq!(event.name(), "ReservationNoShowRecorded");
    }

    #[test]
    fn cancel_from_pending_and_confirmed() {
        let mut r = pending();
        let event = r.cancel(ts(2), "changed plans").unwrap();
        assert_eq!(r.status(), ReservationStatus::Cancelled);
        assert_eq!(r.cancelled_at(), Some(ts(2)));
        assert_eq!(r.cancellation_reason(), Some("changed plans"));
        assert_eq!(
            event.kind,
            ReservationEventKind::Cancelled {
                reason: "changed plans".into()
            }
        );

        let mut r = confirmed();
        assert!(r.cancel(ts(2), "ill").is_ok());
    }

    #[test]
    fn cancel_is_not_idempotent() {
        let mut r = pending();
        r.cancel(ts(2), "first").unwrap();
        assert_invalid_transition(r.cancel(ts(3), "second"));
        assert_eq!(r.cancellation_reason(), Some("first"));
        assert_eq!(r.status_history().len(), 2);
    }

    #[test]
    fn terminal_states_are_final() {
        let mut checked_in = confirmed();
        checked_in.mark_as_checked_in(ts(2), None).unwrap();
        let mut no_show = confirmed();
        no_show.mark_as_no_show(ts(2), None).unwrap();
        let mut cancelled = pending();
        cancelled.cancel(ts(2), "x").unwrap();

        for mut r in [checked_in, no_show, cancelled] {
            assert_invalid_transition(r.confirm(ts(9), None));
            assert_invalid_transition(r.mark_as_checked_in(ts(9), None));
            assert_invalid_transition(r.mark_as_no_show(ts(9), None));
            assert_invalid_transition(r.cancel(ts(9), "late"));
            assert!(matches!(
                r.update_party_size(1, 4, ts(9)),
                Err(DomainError::InvalidTransition { .. })
            ));
        }
    }

    #[test]
    fn history_is_time_ordered() {
        let mut r = pending();
        let result = r.confirm(ts(-1), None);
        assert!(matches!(result, Err(DomainError::OutOfOrderTimestamp { .. })));
        assert_eq!(r.status(), ReservationStatus::Pending);

        // Same instant is fine.
        r.confirm(ts(0), None).unwrap();
        r.mark_as_checked_in(ts(30), None).unwrap();
        let times: Vec<_> = r.status_history().iter().map(|c| c.changed_at).collect();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(
            r.status_history().iter().map(|c| c.status).collect::<Vec<_>>(),
            vec![
                ReservationStatus::Pending,
                ReservationStatus::Confirmed,
                ReservationStatus::CheckedIn
            ]
        );
    }

    #[test]
    fn update_party_size_checks_capacity() {
        let mut r = confirmed();
        r.update_party_size(4, 4, ts(2)).unwrap();
        assert_eq!(r.party_size(), 4);
        assert_eq!(r.status_history().len(), 2);

        assert_eq!(
            r.update_party_size(5, 4, ts(3)),
            Err(DomainError::CapacityExceeded {
                party_size: 5,
                capacity: 4
            })
        );
        assert_eq!(r.party_size(), 4);
        assert_eq!(
            r.update_party_size(0, 4, ts(3)),
            Err(DomainError::InvalidPartySize)
        );
    }

    #[test]
    fn serde_roundtrip_keeps_history() {
        let mut r = confirmed();
        r.cancel(ts(3), "rain").unwrap();
        let bytes = bincode::serialize(&r).unwrap();
        let decoded: Reservation = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, r);
    }
}
