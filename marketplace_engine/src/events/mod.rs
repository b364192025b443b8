//! # Marketplace events
//!
//! State transitions emit events so that collaborators outside the engine (email, refunds, analytics) can react to
//! them. Delivery is fire-and-forget: a failing or slow subscriber never affects the transition that produced the
//! event.
mod channel;
mod event_types;
mod hooks;

pub use channel::{EventHandler, EventProducer, Handler};
pub use event_types::*;
pub use hooks::{EventHandlers, EventHooks, EventProducers};
