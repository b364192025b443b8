//! Marketplace Engine
//!
//! The marketplace engine keeps orders, inventory and payments consistent with each other while buyers, sellers and
//! background jobs act on them concurrently. It is storage-agnostic; the SQLite backend is provided behind the
//! `sqlite` feature.
//!
//! The library is divided into these sections:
//! 1. The variant ledger ([`mod@ledger`]). The only component that mutates per-variant `stock` and `reserved`
//!    counters. It reserves stock for whole orders atomically and commits or releases those reservations exactly once.
//! 2. The order validator ([`mod@validation`]). A pure, staged check of an incoming order payload against the catalog.
//! 3. Storage ([`mod@traits`] and the SQLite implementation). Backends implement [`MarketplaceDatabase`] and
//!    [`OrderManagement`]. You should never need to access the database directly; use the public APIs instead.
//! 4. The public API ([`mod@mkp_api`]). Order flow, payment reconciliation, complaint resolution, catalog and
//!    read-only queries. Each API object wraps a storage backend and, where stock is involved, the shared ledger.
//!
//! The engine also emits events (order created, confirmed or cancelled and complaint closed) that can be subscribed
//! to through [`events::EventHooks`].
pub mod db_types;
pub mod events;
pub mod ledger;
mod mkp_api;
pub mod traits;
pub mod validation;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use ledger::{LedgerError, Settlement, VariantLedger};
pub use mkp_api::{
    catalog_api::CatalogApi,
    complaint_api::ComplaintApi,
    errors::MarketplaceError,
    order_flow_api::OrderFlowApi,
    order_objects,
    order_query_api::OrderQueryApi,
    payment_api::PaymentApi,
};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteDatabase, SqliteDatabaseError};
pub use traits::{MarketplaceDatabase, OrderManagement, StorageError};
