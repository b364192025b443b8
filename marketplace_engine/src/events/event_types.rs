use serde::{Deserialize, Serialize};

use crate::db_types::{CancelReason, Complaint, Order, Payment};

/// A new order has been stored and its stock is reserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    pub order: Order,
}

impl OrderCreatedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Payment for an order was confirmed, either by the seller or by the card gateway. The reservation is committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderConfirmedEvent {
    pub order: Order,
    pub payment: Payment,
}

impl OrderConfirmedEvent {
    pub fn new(order: Order, payment: Payment) -> Self {
        Self { order, payment }
    }
}

/// An order was cancelled. If `refund_flagged` is set, the buyer had already paid and the payment collaborator must
/// issue a refund.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelledEvent {
    pub order: Order,
    pub reason: Option<CancelReason>,
    pub refund_flagged: bool,
}

impl OrderCancelledEvent {
    pub fn new(order: Order) -> Self {
        let reason = order.cancel_reason;
        let refund_flagged = order.refund_flagged;
        Self { order, reason, refund_flagged }
    }
}

/// A complaint was resolved or rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplaintClosedEvent {
    pub complaint: Complaint,
}

impl ComplaintClosedEvent {
    pub fn new(complaint: Complaint) -> Self {
        Self { complaint }
    }
}
