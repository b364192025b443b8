use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use log::error;
use marketplace_engine::{
    db_types::VariantKey,
    validation::ValidationErrors,
    LedgerError,
    MarketplaceError,
    SqliteDatabaseError,
    StorageError,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("Missing or invalid identity. {0}")]
    Unauthenticated(String),
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    ValidationFailed(ValidationErrors),
    #[error("There is not enough stock to fill the order")]
    InsufficientStock(Vec<VariantKey>),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            Self::InsufficientStock(_) => StatusCode::CONFLICT,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            Self::ValidationFailed(errors) => json!({ "errors": errors.errors() }),
            Self::InsufficientStock(keys) => json!({ "error": self.to_string(), "insufficientStock": keys }),
            _ => json!({ "error": self.to_string() }),
        };
        HttpResponse::build(self.status_code()).insert_header(ContentType::json()).body(body.to_string())
    }
}

impl From<MarketplaceError> for ServerError {
    fn from(e: MarketplaceError) -> Self {
        match e {
            MarketplaceError::Validation(errors) => Self::ValidationFailed(errors),
            MarketplaceError::InsufficientStock(keys) => Self::InsufficientStock(keys),
            MarketplaceError::InvalidTransition { .. } |
            MarketplaceError::InvalidComplaintTransition { .. } |
            MarketplaceError::DuplicateSubmission(_) |
            MarketplaceError::PaymentAlreadyConfirmed(_) => Self::Conflict(e.to_string()),
            MarketplaceError::NotAuthorized(_) => Self::InsufficientPermissions(e.to_string()),
            MarketplaceError::NoProofSubmitted(_) |
            MarketplaceError::OrderNotFound(_) |
            MarketplaceError::ComplaintNotFound(_) |
            MarketplaceError::ProductNotFound(_) => Self::NoRecordFound(e.to_string()),
            MarketplaceError::Ledger(e) => e.into(),
            MarketplaceError::Storage(e) => e.into(),
        }
    }
}

impl From<StorageError> for ServerError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::OrderNotFound(_) | StorageError::ComplaintNotFound(_) | StorageError::ProductNotFound(_) => {
                Self::NoRecordFound(e.to_string())
            },
            e => {
                error!("💻️ Storage failure. {e}");
                Self::BackendError(e.to_string())
            },
        }
    }
}

impl From<LedgerError> for ServerError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientStock(keys) => Self::InsufficientStock(keys),
            e => {
                error!("💻️ Stock ledger failure. {e}");
                Self::BackendError(e.to_string())
            },
        }
    }
}

impl From<SqliteDatabaseError> for ServerError {
    fn from(e: SqliteDatabaseError) -> Self {
        Self::InitializeError(e.to_string())
    }
}
