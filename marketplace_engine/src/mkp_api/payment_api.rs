//! Reconciles out-of-band payments with orders.
//!
//! Buyers pay outside the marketplace and submit a reference to their proof of payment. The seller then either
//! confirms the payment, which commits the order's reservation, or rejects it, which cancels the order and releases
//! the stock.
use std::{fmt::Debug, sync::Arc};

use log::*;

use crate::{
    db_types::{CancelReason, NewPayment, Order, OrderId, OrderStatusType, Payment, Role},
    events::{EventProducers, OrderCancelledEvent, OrderConfirmedEvent},
    ledger::{Settlement, VariantLedger},
    mkp_api::order_flow_api::{already_settled, authorize, explain_conflict, release_pending},
    traits::MarketplaceDatabase,
    MarketplaceError,
};

pub struct PaymentApi<B> {
    db: B,
    ledger: Arc<VariantLedger>,
    producers: EventProducers,
}

impl<B> Debug for PaymentApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentApi")
    }
}

impl<B> PaymentApi<B> {
    pub fn new(db: B, ledger: Arc<VariantLedger>, producers: EventProducers) -> Self {
        Self { db, ledger, producers }
    }
}

impl<B> PaymentApi<B>
where B: MarketplaceDatabase
{
    /// Records the buyer's proof of payment for a `pending_payment` order.
    ///
    /// An order has at most one payment record. A second submission fails with
    /// [`MarketplaceError::DuplicateSubmission`]; use [`Self::update_proof`] to replace the proof.
    pub async fn submit_proof(
        &self,
        order_id: &OrderId,
        buyer_id: &str,
        proof_ref: &str,
        destination: Option<String>,
    ) -> Result<Payment, MarketplaceError> {
        let order = self.payable_order(order_id, buyer_id, proof_ref).await?;
        let payment = NewPayment::for_order(&order, proof_ref.trim().to_string(), clean(destination));
        let payment = self.db.insert_payment(payment).await?;
        info!("💳️ Proof of payment submitted for order {order_id} by {buyer_id}");
        Ok(payment)
    }

    /// Replaces the proof of payment for an order, as long as the seller has not confirmed it yet.
    pub async fn update_proof(
        &self,
        order_id: &OrderId,
        buyer_id: &str,
        proof_ref: &str,
        destination: Option<String>,
    ) -> Result<Payment, MarketplaceError> {
        self.payable_order(order_id, buyer_id, proof_ref).await?;
        let destination = clean(destination);
        let payment = self.db.update_payment_proof(order_id, proof_ref.trim(), destination.as_deref()).await?;
        info!("💳️ Proof of payment for order {order_id} updated by {buyer_id}");
        Ok(payment)
    }

    /// The seller confirms that the payment arrived.
    ///
    /// The payment is marked confirmed, the order moves to `confirmed`, and the reservation is committed, as one
    /// unit. If any of these fails, none of them happen.
    pub async fn confirm(&self, order_id: &OrderId, seller_id: &str) -> Result<Order, MarketplaceError> {
        let (order, payment) = self.proven_order(order_id, seller_id, OrderStatusType::Confirmed).await?;
        if payment.confirmed {
            return Err(MarketplaceError::PaymentAlreadyConfirmed(order_id.clone()));
        }
        let db = &self.db;
        let settlement = self
            .ledger
            .commit_with(&order.reservation_id, |levels| async move {
                db.confirm_payment(order_id, &levels).await.map_err(MarketplaceError::from)
            })
            .await;
        let (payment, confirmed) = match settlement {
            Ok(Settlement::Applied(v)) => v,
            Ok(Settlement::AlreadySettled) => {
                let err = already_settled(order_id);
                return Err(explain_conflict(&self.db, order_id, OrderStatusType::Confirmed, err).await);
            },
            Err(e @ MarketplaceError::PaymentAlreadyConfirmed(_)) => return Err(e),
            Err(e) => return Err(explain_conflict(&self.db, order_id, OrderStatusType::Confirmed, e).await),
        };
        info!("💳️ Payment for order {order_id} confirmed by {seller_id}");
        self.producers.publish_order_confirmed(OrderConfirmedEvent::new(confirmed.clone(), payment)).await;
        Ok(confirmed)
    }

    /// The seller disputes the proof of payment. The order is cancelled and its stock released. The payment record
    /// is kept, unconfirmed.
    pub async fn reject(&self, order_id: &OrderId, seller_id: &str) -> Result<Order, MarketplaceError> {
        let (order, payment) = self.proven_order(order_id, seller_id, OrderStatusType::Cancelled).await?;
        if payment.confirmed {
            return Err(MarketplaceError::PaymentAlreadyConfirmed(order_id.clone()));
        }
        let cancelled = match release_pending(&self.db, &self.ledger, &order, CancelReason::PaymentRejected).await {
            Ok(o) => o,
            Err(e) => return Err(explain_conflict(&self.db, order_id, OrderStatusType::Cancelled, e).await),
        };
        info!("💳️ Payment for order {order_id} rejected by {seller_id}. The order is cancelled.");
        self.producers.publish_order_cancelled(OrderCancelledEvent::new(cancelled.clone())).await;
        Ok(cancelled)
    }

    pub async fn fetch_payment(&self, order_id: &OrderId) -> Result<Option<Payment>, MarketplaceError> {
        Ok(self.db.fetch_payment(order_id).await?)
    }

    /// Checks that a buyer may attach proof of payment to the order.
    async fn payable_order(&self, order_id: &OrderId, buyer_id: &str, proof_ref: &str) -> Result<Order, MarketplaceError> {
        let order =
            self.db.fetch_order(order_id).await?.ok_or_else(|| MarketplaceError::OrderNotFound(order_id.clone()))?;
        authorize(&order, buyer_id, Role::Buyer, &[Role::Buyer])?;
        if order.status != OrderStatusType::PendingPayment {
            return Err(MarketplaceError::InvalidTransition { from: order.status, to: OrderStatusType::Confirmed });
        }
        if proof_ref.trim().is_empty() {
            return Err(MarketplaceError::validation("proofRef", "is required"));
        }
        Ok(order)
    }

    /// Fetches a `pending_payment` order owned by the seller, along with its payment proof.
    async fn proven_order(
        &self,
        order_id: &OrderId,
        seller_id: &str,
        to: OrderStatusType,
    ) -> Result<(Order, Payment), MarketplaceError> {
        let order =
            self.db.fetch_order(order_id).await?.ok_or_else(|| MarketplaceError::OrderNotFound(order_id.clone()))?;
        authorize(&order, seller_id, Role::Seller, &[Role::Seller])?;
        let Some(payment) = self.db.fetch_payment(order_id).await? else {
            debug!("💳️ Seller {seller_id} acted on order {order_id} before any proof of payment was submitted");
            return Err(MarketplaceError::NoProofSubmitted(order_id.clone()));
        };
        if order.status != OrderStatusType::PendingPayment {
            if payment.confirmed {
                return Err(MarketplaceError::PaymentAlreadyConfirmed(order_id.clone()));
            }
            return Err(MarketplaceError::InvalidTransition { from: order.status, to });
        }
        Ok((order, payment))
    }
}

fn clean(destination: Option<String>) -> Option<String> {
    destination.map(|d| d.trim().to_string()).filter(|d| !d.is_empty())
}
