//! Table allocation.
//!
//! Best-fit: the smallest table that seats the party wins, so large tables stay
//! free for large parties. Ties break on label (case-insensitive), then id, so
//! identical inputs always pick the identical table.

use std::cmp::Ordering;

use crate::model::*;

pub const NO_TABLES: &str = "no tables configured";
pub const NO_CAPACITY: &str = "no capacity for requested time";
pub const EMPTY_PARTY: &str = "party size must be positive";

/// Pick a table for `party_size` guests during `desired`.
///
/// `existing` is the caller's snapshot of the branch's reservations; only
/// blocking ones on the same table with an overlapping slot conflict.
pub fn allocate(
    tables: &[Table],
    existing: &[BookedSlot],
    desired: &ScheduleSlot,
    party_size: u32,
    prefers_outdoor: bool,
) -> AllocationResult {
    if tables.is_empty() {
        return AllocationResult::failure(NO_TABLES);
    }
    if party_size == 0 {
        return AllocationResult::failure(EMPTY_PARTY);
    }
    match candidates(tables, existing, desired, party_size, prefers_outdoor).first() {
        Some(table) => AllocationResult::success(table.id),
        None => AllocationResult::failure(NO_CAPACITY),
    }
}

/// Every table that could take the request, in the order [`allocate`] tries them.
pub fn candidates<'a>(
    tables: &'a [Table],
    existing: &[BookedSlot],
    desired: &ScheduleSlot,
    party_size: u32,
    prefers_outdoor: bool,
) -> Vec<&'a Table> {
    let mut fitting: Vec<&Table> = tables.iter().filter(|t| t.seats(party_size)).collect();
    fitting.sort_by(|a, b| {
        let group = if prefers_outdoor {
            b.is_outdoor.cmp(&a.is_outdoor)
        } else {
            Ordering::Equal
        };
        group.then_with(|| best_fit(a, b))
    });
    fitting.retain(|t| !existing.iter().any(|r| r.blocks(t.id, desired)));
    fitting
}

fn best_fit(a: &Table, b: &Table) -> Ordering {
    a.capacity
        .cmp(&b.capacity)
        .then_with(|| cmp_ignore_case(&a.label, &b.label))
        .then_with(|| a.id.cmp(&b.id))
}

fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_uppercase)
        .cmp(b.chars().flat_map(char::to_uppercase))
}
