//! Event hooks installed by the server.
//!
//! The marketplace does not send email or move money itself. These hooks record what happened so that operators (and
//! whatever tails the logs) can follow up, e.g. on refunds flagged by cancelling a confirmed order.
use log::*;
use marketplace_engine::events::{
    ComplaintClosedEvent,
    EventHooks,
    OrderCancelledEvent,
    OrderConfirmedEvent,
    OrderCreatedEvent,
};

pub fn logging_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks
        .on_order_created(|ev: OrderCreatedEvent| {
            Box::pin(async move {
                info!(
                    "📬️ Order {} placed by {} with {} for {}",
                    ev.order.order_id, ev.order.buyer_id, ev.order.seller_id, ev.order.total_price
                );
            })
        })
        .on_order_confirmed(|ev: OrderConfirmedEvent| {
            Box::pin(async move {
                info!("📬️ Order {} confirmed. Proof of payment: {}", ev.order.order_id, ev.payment.proof_ref);
            })
        })
        .on_order_cancelled(|ev: OrderCancelledEvent| {
            Box::pin(async move {
                let reason = ev.reason.map(|r| r.to_string()).unwrap_or_else(|| "unknown".into());
                info!("📬️ Order {} cancelled. Reason: {reason}", ev.order.order_id);
                if ev.refund_flagged {
                    warn!(
                        "📬️ Order {} was paid before it was cancelled. {} must be refunded to {}",
                        ev.order.order_id, ev.order.total_price, ev.order.buyer_id
                    );
                }
            })
        })
        .on_complaint_closed(|ev: ComplaintClosedEvent| {
            Box::pin(async move {
                let c = &ev.complaint;
                info!("📬️ Complaint #{} on order {} is {}", c.id, c.order_id, c.status);
                if let Some(restock) = &c.restock {
                    info!(
                        "📬️ {} x {}/{} of {} returned to stock",
                        restock.quantity, restock.color, restock.size, c.product_id
                    );
                }
            })
        });
    hooks
}
