use std::collections::BTreeMap;

use chrono::Weekday;

use crate::model::*;
use crate::ports::{ReservationLookup, TableLookup};
use crate::reservation::Reservation;

/// In-memory state of one branch: its tables and every reservation ever made there.
#[derive(Debug, Clone)]
pub struct BranchState {
    pub id: BranchId,
    pub name: Option<String>,
    /// Empty means no restriction.
    pub opening_hours: Vec<ScheduleSlot>,
    pub tables: Vec<Table>,
    pub reservations: BTreeMap<ReservationId, Reservation>,
}

pub(crate) fn same_label(a: &str, b: &str) -> bool {
    a.to_uppercase() == b.to_uppercase()
}

impl BranchState {
    pub fn new(id: BranchId, name: Option<String>) -> Self {
        Self {
            id,
            name,
            opening_hours: Vec::new(),
            tables: Vec::new(),
            reservations: BTreeMap::new(),
        }
    }

    pub fn find_table(&self, id: TableId) -> Option<&Table> {
        self.tables.iter().find(|t| t.id == id)
    }

    /// Is `label` used by a table other than `except`?
    pub fn label_taken(&self, label: &str, except: Option<TableId>) -> bool {
        self.tables
            .iter()
            .any(|t| Some(t.id) != except && same_label(&t.label, label))
    }

    fn blocking_on(&self, table_id: TableId) -> impl Iterator<Item = &Reservation> {
        self.reservations
            .values()
            .filter(move |r| r.table_id() == table_id && r.status().is_blocking())
    }

    pub fn has_blocking_reservations(&self, table_id: TableId) -> bool {
        self.blocking_on(table_id).next().is_some()
    }

    /// Reservations still holding a table. Cancelled and no-show ones are kept
    /// for history but do not count.
    pub fn active_reservations(&self) -> usize {
        self.reservations
            .values()
            .filter(|r| r.status().is_blocking())
            .count()
    }

    /// Largest party currently holding `table_id`.
    pub fn largest_blocking_party(&self, table_id: TableId) -> Option<u32> {
        self.blocking_on(table_id).map(Reservation::party_size).max()
    }

    pub fn is_open(&self, slot: &ScheduleSlot) -> bool {
        self.opening_hours.is_empty() || self.opening_hours.iter().any(|h| h.contains(slot))
    }

    /// Apply a record to this branch. `BranchCreated` is handled by the engine.
    pub fn apply(&mut self, record: &Record) {
        match record {
            Record::OpeningHoursSet { hours, .. } => {
                self.opening_hours = hours.clone();
            }
            Record::TableUpserted { table, .. } => {
                match self.tables.iter_mut().find(|t| t.id == table.id) {
                    Some(existing) => *existing = table.clone(),
                    None => self.tables.push(table.clone()),
                }
            }
            Record::TableRemoved { table_id, .. } => {
                self.tables.retain(|t| t.id != *table_id);
            }
            Record::ReservationSaved { reservation } => {
                self.reservations
                    .insert(reservation.id(), reservation.clone());
            }
            Record::BranchCreated { .. } => {}
        }
    }

    /// The minimal records that rebuild this branch.
    pub fn snapshot(&self) -> Vec<Record> {
        let mut records = Vec::with_capacity(2 + self.tables.len() + self.reservations.len());
        records.push(Record::BranchCreated {
            id: self.id,
            name: self.name.clone(),
        });
        if !self.opening_hours.is_empty() {
            records.push(Record::OpeningHoursSet {
                branch_id: self.id,
                hours: self.opening_hours.clone(),
            });
        }
        records.extend(self.tables.iter().map(|t| Record::TableUpserted {
            branch_id: self.id,
            table: t.clone(),
        }));
        records.extend(
            self.reservations
                .values()
                .map(|r| Record::ReservationSaved {
                    reservation: r.clone(),
                }),
        );
        records
    }

    pub fn info(&self) -> BranchInfo {
        BranchInfo {
            id: self.id,
            name: self.name.clone(),
            opening_hours: self.opening_hours.clone(),
            table_count: self.tables.len(),
            reservation_count: self.reservations.len(),
        }
    }
}

impl TableLookup for BranchState {
    fn tables(&self) -> Vec<Table> {
        self.tables.clone()
    }

    fn table(&self, id: TableId) -> Option<Table> {
        self.find_table(id).cloned()
    }
}

impl ReservationLookup for BranchState {
    fn booked_on(&self, day: Weekday) -> Vec<BookedSlot> {
        self.reservations
            .values()
            .filter(|r| r.slot().day() == day)
            .map(BookedSlot::from)
            .collect()
    }
}
