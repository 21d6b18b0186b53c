//! Table reservations for multi-branch restaurants.
//!
//! The core is pure: [`model::ScheduleSlot`] and [`model::Table`] values, the
//! [`reservation::Reservation`] aggregate and the [`policy::allocate`] search.
//! [`engine::Engine`] is one way to drive it: per-tenant state, a WAL, and a
//! per-branch write lock around every allocate-then-write.

pub mod compactor;
pub mod config;
pub mod engine;
pub mod error;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod policy;
pub mod ports;
pub mod reservation;
pub mod tenant;
pub mod wal;
