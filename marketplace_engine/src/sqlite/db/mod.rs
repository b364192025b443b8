//! # SQLite Database methods
//!
//! This module contains "low-level" SQLite database interactions.
//!
//! All these interactions are simple functions (rather than stateful structs) that accept a `&mut SqliteConnection`
//! argument. Callers can obtain a connection from a pool, or open an atomic transaction and pass `&mut tx` through to
//! the functions without any other changes.
//!
//! SQLite only allows one writer at a time. A transaction that *reads* first and then writes has to upgrade its lock,
//! which fails immediately with `SQLITE_BUSY` if another writer got there first. Every write transaction in this
//! backend therefore starts with a write statement, so that competing writers queue up on the busy timeout instead.
//!
//! Every statement is read to the end with `fetch_all`, including single-row lookups and `RETURNING` writes. A
//! statement that is only partly stepped keeps its WAL read snapshot alive on the pooled connection, and the next
//! query on that connection would not see rows committed since.
use std::{str::FromStr, time::Duration};

use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Error as SqlxError,
    SqlitePool,
};

pub mod complaints;
pub mod orders;
pub mod payments;
pub mod products;
pub mod variants;

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// The only row of a result set that was read to the end.
pub(crate) fn single_row<T>(rows: Vec<T>) -> Result<T, SqlxError> {
    rows.into_iter().next().ok_or(SqlxError::RowNotFound)
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    info!("🗃️ Connected to {url} with up to {max_connections} connections");
    Ok(pool)
}
