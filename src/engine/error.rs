use thiserror::Error;

use crate::error::DomainError;
use crate::model::{BranchId, ReservationId, TableId};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("branch not found: {0}")]
    BranchNotFound(BranchId),
    #[error("table not found: {0}")]
    TableNotFound(TableId),
    #[error("reservation not found: {0}")]
    ReservationNotFound(ReservationId),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("table label already in use: {0}")]
    DuplicateLabel(String),
    #[error("table {0} has active reservations")]
    TableInUse(TableId),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("WAL error: {0}")]
    WalError(String),
}
