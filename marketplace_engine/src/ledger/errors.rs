use thiserror::Error;

use crate::db_types::{ReservationId, VariantKey};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Insufficient stock for {}", display_keys(.0))]
    InsufficientStock(Vec<VariantKey>),
    #[error("Variant {0} is not known to the ledger")]
    UnknownVariant(VariantKey),
    #[error("Variant {0} is already registered")]
    DuplicateVariant(VariantKey),
    #[error("Reservation {0} does not exist")]
    UnknownReservation(ReservationId),
    #[error("Reservation {0} has already been released and cannot be committed")]
    ReservationReleased(ReservationId),
    #[error("Reservation {0} has already been committed and cannot be released")]
    ReservationCommitted(ReservationId),
    #[error("A stock batch must contain at least one item")]
    EmptyBatch,
    #[error("Quantity for {0} must be at least 1")]
    ZeroQuantity(VariantKey),
    #[error("Stock counter overflow for {0}")]
    Overflow(VariantKey),
    #[error("Stock levels for {0} are inconsistent: reserved exceeds stock")]
    InconsistentLevels(VariantKey),
}

fn display_keys(keys: &[VariantKey]) -> String {
    keys.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}
