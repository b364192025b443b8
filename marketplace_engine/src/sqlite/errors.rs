use sqlx::migrate::MigrateError;
use thiserror::Error;

use crate::traits::StorageError;

#[derive(Debug, Error)]
pub enum SqliteDatabaseError {
    #[error("Database connection error: {0}")]
    DriverError(#[from] sqlx::Error),
    #[error("Could not run database migrations: {0}")]
    MigrationError(#[from] MigrateError),
}

impl From<SqliteDatabaseError> for StorageError {
    fn from(e: SqliteDatabaseError) -> Self {
        StorageError::DatabaseError(e.to_string())
    }
}

/// Whether the error was raised by a `UNIQUE` (or primary key) constraint.
pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error().map(|e| e.is_unique_violation()).unwrap_or(false)
}
