use thiserror::Error;

use crate::{
    db_types::{ComplaintStatus, OrderId, OrderStatusType, ProductId, VariantKey},
    ledger::LedgerError,
    traits::StorageError,
    validation::ValidationErrors,
};

/// Errors returned by the marketplace engine APIs.
#[derive(Debug, Clone, Error)]
pub enum MarketplaceError {
    #[error("The request is invalid. {0}")]
    Validation(ValidationErrors),
    #[error("There is not enough stock to fill the order")]
    InsufficientStock(Vec<VariantKey>),
    #[error("An order cannot move from {from} to {to}")]
    InvalidTransition { from: OrderStatusType, to: OrderStatusType },
    #[error("Complaint #{id} cannot be changed while it is {status}")]
    InvalidComplaintTransition { id: i64, status: ComplaintStatus },
    #[error("Not authorized. {0}")]
    NotAuthorized(String),
    #[error("A payment has already been submitted for order {0}")]
    DuplicateSubmission(OrderId),
    #[error("The payment for order {0} has already been confirmed")]
    PaymentAlreadyConfirmed(OrderId),
    #[error("No payment proof has been submitted for order {0}")]
    NoProofSubmitted(OrderId),
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Complaint #{0} does not exist")]
    ComplaintNotFound(i64),
    #[error("Product {0} does not exist")]
    ProductNotFound(ProductId),
    #[error("Stock ledger error. {0}")]
    Ledger(LedgerError),
    #[error("Storage error. {0}")]
    Storage(StorageError),
}

impl MarketplaceError {
    pub fn not_authorized<S: Into<String>>(reason: S) -> Self {
        Self::NotAuthorized(reason.into())
    }

    pub fn validation<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::Validation(ValidationErrors::single(field, message))
    }
}

impl From<ValidationErrors> for MarketplaceError {
    fn from(e: ValidationErrors) -> Self {
        Self::Validation(e)
    }
}

impl From<LedgerError> for MarketplaceError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientStock(keys) => Self::InsufficientStock(keys),
            e => Self::Ledger(e),
        }
    }
}

impl From<StorageError> for MarketplaceError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::DuplicatePayment(id) => Self::DuplicateSubmission(id),
            StorageError::PaymentAlreadyConfirmed(id) => Self::PaymentAlreadyConfirmed(id),
            StorageError::PaymentNotFound(id) => Self::NoProofSubmitted(id),
            StorageError::OrderNotFound(id) => Self::OrderNotFound(id),
            StorageError::ComplaintNotFound(id) => Self::ComplaintNotFound(id),
            StorageError::ProductNotFound(id) => Self::ProductNotFound(id),
            e => Self::Storage(e),
        }
    }
}
