//! # Marketplace server
//!
//! The HTTP front end for the marketplace engine. It is responsible for:
//! * Identifying the caller from the `x-user-id` and `x-user-role` headers. Identity is supplied by a trusted proxy;
//!   the server does not authenticate users itself.
//! * Translating requests into calls on the engine APIs and engine errors into HTTP status codes.
//! * Running the reservation expiry worker and the event hooks.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! See [routes](routes/index.html) for the full list. `/health` returns a 200 OK response and needs no identity.

pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod expiry_worker;
pub mod identity;
pub mod middleware;
pub mod notifications;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
