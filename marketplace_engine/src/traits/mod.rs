//! # Storage backends
//!
//! This module defines the behaviour a storage backend must expose to be used by the marketplace engine.
//!
//! * [`MarketplaceDatabase`] covers every write the engine performs. Writes that belong to a stock movement take the
//!   new variant levels as an argument, so that the backend can store them in the same transaction as the order,
//!   payment or complaint change. The variant ledger decides those levels; backends only record them.
//! * [`OrderManagement`] provides read-only queries over orders, payments and complaints.
//!
//! Status updates are *guarded*: backends apply them only if the record is still in the expected state and report
//! a conflict otherwise. This turns a race between two writers into a clean error for the loser.
mod marketplace_database;
mod order_management;

pub use marketplace_database::{MarketplaceDatabase, StorageError};
pub use order_management::OrderManagement;
