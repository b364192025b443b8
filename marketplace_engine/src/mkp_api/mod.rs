//! # Marketplace engine public API
//!
//! The `mkp_api` module exposes the programmatic API for the marketplace engine. The API is modular, so that clients
//! can pick the parts they need.
//!
//! * [`order_flow_api`] places orders and drives them through the order state machine: cancellation, shipping,
//!   delivery, reservation expiry and card gateway results.
//! * [`payment_api`] reconciles out-of-band payments: proof submission and seller confirmation or rejection.
//! * [`complaint_api`] files and resolves complaints on delivered orders, including returns to stock.
//! * [`catalog_api`] lets sellers list products, registering their variants with the ledger.
//! * [`order_query_api`] provides read-only access to orders, payments and complaints.
//!
//! # API usage
//!
//! Every API instance is created from a storage backend. APIs that move stock also take the shared
//! [`VariantLedger`](crate::VariantLedger), and APIs that emit events take a set of
//! [`EventProducers`](crate::events::EventProducers).
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use marketplace_engine::{OrderFlowApi, SqliteDatabase, VariantLedger};
//! let db = SqliteDatabase::new_with_url("sqlite://data/marketplace.db", 25).await?;
//! let ledger = Arc::new(VariantLedger::restore(db.fetch_all_variants().await?, db.fetch_held_reservations().await?, window)?);
//! let api = OrderFlowApi::new(db, ledger, EventProducers::default());
//! let order = api.place_order("buyer-1", &request).await?;
//! ```
pub mod catalog_api;
pub mod complaint_api;
pub mod errors;
pub mod order_flow_api;
pub mod order_objects;
pub mod order_query_api;
pub mod payment_api;
