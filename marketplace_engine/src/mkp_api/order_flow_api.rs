use std::{fmt::Debug, sync::Arc};

use chrono::Utc;
use log::*;

use crate::{
    db_types::{
        CancelReason,
        GatewayReport,
        NewPayment,
        Order,
        OrderId,
        OrderStatusType,
        PaymentMethod,
        ProductId,
        Role,
        StatusChange,
    },
    events::{EventProducers, OrderCancelledEvent, OrderConfirmedEvent, OrderCreatedEvent},
    ledger::{LedgerError, ReservationItem, Settlement, VariantLedger},
    order_objects::OrderRequest,
    traits::{MarketplaceDatabase, OrderManagement, StorageError},
    validation::{CatalogSnapshot, OrderValidator},
    MarketplaceError,
};

/// `OrderFlowApi` drives orders through their life cycle and keeps the variant ledger in step with every transition.
///
/// | From \ To        | Confirmed | Shipped | Delivered | Cancelled |
/// |------------------|-----------|---------|-----------|-----------|
/// | PendingPayment   | commit    |         |           | release   |
/// | Confirmed        |           | ✓       |           | restock   |
/// | Shipped          |           |         | ✓         |           |
///
/// Every other transition fails with [`MarketplaceError::InvalidTransition`] and has no side effects. Confirmation by
/// the seller lives in [`PaymentApi`](crate::PaymentApi); card payments are confirmed here, through
/// [`Self::apply_gateway_report`].
pub struct OrderFlowApi<B> {
    db: B,
    ledger: Arc<VariantLedger>,
    validator: OrderValidator,
    producers: EventProducers,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi ({:?})", self.ledger)
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, ledger: Arc<VariantLedger>, producers: EventProducers) -> Self {
        Self { db, ledger, validator: OrderValidator::default(), producers }
    }

    pub fn with_validator(mut self, validator: OrderValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn ledger(&self) -> &Arc<VariantLedger> {
        &self.ledger
    }
}

impl<B> OrderFlowApi<B>
where B: MarketplaceDatabase
{
    /// Validates a new order, reserves its stock and stores it as `pending_payment`.
    ///
    /// Nothing is written unless validation passes and every item can be reserved. The order and the new variant
    /// levels are stored in one transaction while the ledger holds the affected variants, so a failed write leaves
    /// neither a dangling reservation nor an orphaned order.
    pub async fn place_order(&self, buyer_id: &str, request: &OrderRequest) -> Result<Order, MarketplaceError> {
        let mut product_ids = request
            .order_items
            .iter()
            .map(|i| i.product.trim())
            .filter(|p| !p.is_empty())
            .map(ProductId::from)
            .collect::<Vec<_>>();
        product_ids.sort();
        product_ids.dedup();
        let catalog = CatalogSnapshot::new(self.db.fetch_products(&product_ids).await?);
        let draft = self.validator.validate(buyer_id, request, &catalog)?;
        trace!("🔄️ Order {} passed validation", draft.order_id);
        let items = draft.items.iter().map(|i| ReservationItem::new(i.key.clone(), i.quantity)).collect::<Vec<_>>();
        let db = &self.db;
        let order = self
            .ledger
            .reserve_with(&items, |reservation, levels| async move {
                db.insert_order(draft, &reservation, &levels).await.map_err(MarketplaceError::from)
            })
            .await?;
        info!("🔄️ Order {} placed by {buyer_id} for {}", order.order_id, order.total_price);
        self.producers.publish_order_created(OrderCreatedEvent::new(order.clone())).await;
        Ok(order)
    }

    /// Cancels an order on behalf of its buyer, its seller or an administrator.
    ///
    /// A `pending_payment` order releases its reservation. A `confirmed` order returns its items to stock and is
    /// flagged for a refund. Any other status fails with [`MarketplaceError::InvalidTransition`].
    pub async fn cancel_order(&self, order_id: &OrderId, actor: &str, role: Role) -> Result<Order, MarketplaceError> {
        let order = self.fetch_existing(order_id).await?;
        authorize(&order, actor, role, &[Role::Buyer, Role::Seller, Role::Admin])?;
        let reason = match role {
            Role::Buyer => CancelReason::Buyer,
            Role::Seller => CancelReason::Seller,
            _ => CancelReason::Admin,
        };
        let result = match order.status {
            OrderStatusType::PendingPayment => match self.release_pending(&order, reason).await {
                Err(MarketplaceError::Ledger(LedgerError::ReservationCommitted(_))) => {
                    debug!("🔄️ Order {order_id} was confirmed while it was being cancelled. Restocking instead.");
                    self.restock_confirmed(&order, reason).await
                },
                r => r,
            },
            OrderStatusType::Confirmed => self.restock_confirmed(&order, reason).await,
            from => return Err(MarketplaceError::InvalidTransition { from, to: OrderStatusType::Cancelled }),
        };
        let cancelled = match result {
            Ok(o) => o,
            Err(e) => return Err(explain_conflict(&self.db, order_id, OrderStatusType::Cancelled, e).await),
        };
        info!("🔄️ Order {order_id} cancelled ({reason}) by {role} {actor}");
        if cancelled.refund_flagged {
            info!("🔄️ Order {order_id} had been paid. It is flagged for a refund.");
        }
        self.producers.publish_order_cancelled(OrderCancelledEvent::new(cancelled.clone())).await;
        Ok(cancelled)
    }

    pub async fn mark_shipped(&self, order_id: &OrderId, actor: &str, role: Role) -> Result<Order, MarketplaceError> {
        self.advance(order_id, actor, role, OrderStatusType::Confirmed, OrderStatusType::Shipped).await
    }

    pub async fn mark_delivered(&self, order_id: &OrderId, actor: &str, role: Role) -> Result<Order, MarketplaceError> {
        self.advance(order_id, actor, role, OrderStatusType::Shipped, OrderStatusType::Delivered).await
    }

    /// Cancels every `pending_payment` order whose reservation has outlived the hold window, releasing its stock.
    ///
    /// Uses the same idempotent release as a manual cancellation, so a sweep racing a buyer's cancel is harmless.
    /// Settled reservations older than the hold window are forgotten first.
    /// Failures on individual orders are logged and do not stop the sweep. Returns the orders that were cancelled.
    pub async fn expire_stale_reservations(&self) -> Result<Vec<Order>, MarketplaceError> {
        let now = Utc::now();
        self.ledger.prune_settled(now).await;
        let expired = self.ledger.expired_reservations(now).await;
        if expired.is_empty() {
            trace!("🔄️ No stale reservations");
            return Ok(Vec::new());
        }
        debug!("🔄️ {} reservation(s) have expired", expired.len());
        let mut cancelled = Vec::with_capacity(expired.len());
        for reservation in expired {
            let order = match self.db.fetch_order_by_reservation(&reservation.id).await? {
                Some(o) if o.status == OrderStatusType::PendingPayment => o,
                Some(o) => {
                    trace!("🔄️ Order {} is already {}. Skipping expiry.", o.order_id, o.status);
                    continue;
                },
                None => {
                    warn!("🔄️ Reservation {} has no order. It will be left as is.", reservation.id);
                    continue;
                },
            };
            match self.release_pending(&order, CancelReason::Expired).await {
                Ok(order) => {
                    info!("🔄️ Order {} expired after {} minutes", order.order_id, self.ledger.hold_window().num_minutes());
                    self.producers.publish_order_cancelled(OrderCancelledEvent::new(order.clone())).await;
                    cancelled.push(order);
                },
                Err(e) => warn!("🔄️ Could not expire order {}. {e}", order.order_id),
            }
        }
        Ok(cancelled)
    }

    /// Applies the outcome of a card payment reported by the payment gateway.
    ///
    /// On success, a confirmed payment (`proof_ref = gateway:<txid>`) is recorded and the order is confirmed, in one
    /// unit with the ledger commit. On failure, the order is cancelled and its stock released.
    pub async fn apply_gateway_report(
        &self,
        order_id: &OrderId,
        report: GatewayReport,
    ) -> Result<Order, MarketplaceError> {
        let order = self.fetch_existing(order_id).await?;
        if order.payment_method != PaymentMethod::CreditCard {
            return Err(MarketplaceError::validation(
                "paymentMethod",
                format!("gateway results only apply to credit-card orders, not {}", order.payment_method),
            ));
        }
        let to = if report.succeeded { OrderStatusType::Confirmed } else { OrderStatusType::Cancelled };
        if order.status != OrderStatusType::PendingPayment {
            return Err(MarketplaceError::InvalidTransition { from: order.status, to });
        }
        if !report.succeeded {
            let reason = report.message.as_deref().unwrap_or("no reason given");
            info!("💳️ Card payment for order {order_id} failed: {reason}");
            let cancelled = match self.release_pending(&order, CancelReason::GatewayFailure).await {
                Ok(o) => o,
                Err(e) => return Err(explain_conflict(&self.db, order_id, to, e).await),
            };
            self.producers.publish_order_cancelled(OrderCancelledEvent::new(cancelled.clone())).await;
            return Ok(cancelled);
        }
        let txid = match report.transaction_id.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => return Err(MarketplaceError::validation("transactionId", "is required for a successful payment")),
        };
        let payment = NewPayment::for_order(&order, format!("gateway:{txid}"), None);
        let db = &self.db;
        let settlement = self
            .ledger
            .commit_with(&order.reservation_id, |levels| async move {
                db.record_gateway_payment(payment, &txid, &levels).await.map_err(MarketplaceError::from)
            })
            .await;
        let (payment, confirmed) = match settlement {
            Ok(Settlement::Applied(v)) => v,
            Ok(Settlement::AlreadySettled) => {
                return Err(explain_conflict(&self.db, order_id, to, already_settled(order_id)).await)
            },
            Err(e) => return Err(explain_conflict(&self.db, order_id, to, e).await),
        };
        info!("💳️ Card payment {} confirmed order {order_id}", payment.proof_ref);
        self.producers.publish_order_confirmed(OrderConfirmedEvent::new(confirmed.clone(), payment)).await;
        Ok(confirmed)
    }

    pub async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, MarketplaceError> {
        Ok(self.db.fetch_order(order_id).await?)
    }

    async fn fetch_existing(&self, order_id: &OrderId) -> Result<Order, MarketplaceError> {
        self.db.fetch_order(order_id).await?.ok_or_else(|| MarketplaceError::OrderNotFound(order_id.clone()))
    }

    async fn advance(
        &self,
        order_id: &OrderId,
        actor: &str,
        role: Role,
        from: OrderStatusType,
        to: OrderStatusType,
    ) -> Result<Order, MarketplaceError> {
        let order = self.fetch_existing(order_id).await?;
        authorize(&order, actor, role, &[Role::Seller, Role::Admin])?;
        if order.status != from {
            return Err(MarketplaceError::InvalidTransition { from: order.status, to });
        }
        match self.db.transition_order(order_id, StatusChange::new(from, to), &[]).await {
            Ok(order) => {
                info!("🔄️ Order {order_id} is now {to}");
                Ok(order)
            },
            Err(e) => Err(explain_conflict(&self.db, order_id, to, e.into()).await),
        }
    }

    async fn release_pending(&self, order: &Order, reason: CancelReason) -> Result<Order, MarketplaceError> {
        release_pending(&self.db, &self.ledger, order, reason).await
    }

    /// Returns the items of a `confirmed` order to stock and cancels it, as one unit. The order is flagged for a
    /// refund.
    async fn restock_confirmed(&self, order: &Order, reason: CancelReason) -> Result<Order, MarketplaceError> {
        let change = StatusChange::cancellation(OrderStatusType::Confirmed, reason);
        let items = order.items.iter().map(|i| ReservationItem::new(i.key.clone(), i.quantity)).collect::<Vec<_>>();
        let order_id = &order.order_id;
        let db = &self.db;
        self.ledger
            .restock_with(&items, |levels| async move {
                db.transition_order(order_id, change, &levels).await.map_err(MarketplaceError::from)
            })
            .await
    }
}

/// Checks that `actor`, acting as `role`, may act on `order`. Administrators may act on any order; buyers and
/// sellers only on their own.
pub(crate) fn authorize(order: &Order, actor: &str, role: Role, allowed: &[Role]) -> Result<(), MarketplaceError> {
    if !allowed.contains(&role) {
        return Err(MarketplaceError::not_authorized(format!("The {role} role cannot perform this action")));
    }
    let permitted = match role {
        Role::Admin => true,
        Role::Buyer => order.buyer_id == actor,
        Role::Seller => order.seller_id == actor,
        Role::Gateway => false,
    };
    if permitted {
        Ok(())
    } else {
        Err(MarketplaceError::not_authorized(format!("{actor} is not the {role} of order {}", order.order_id)))
    }
}

/// Releases the reservation of a `pending_payment` order and cancels it, as one unit.
pub(crate) async fn release_pending<B: MarketplaceDatabase>(
    db: &B,
    ledger: &VariantLedger,
    order: &Order,
    reason: CancelReason,
) -> Result<Order, MarketplaceError> {
    let change = StatusChange::cancellation(OrderStatusType::PendingPayment, reason);
    let order_id = &order.order_id;
    let settlement = ledger
        .release_with(&order.reservation_id, |levels| async move {
            db.transition_order(order_id, change, &levels).await.map_err(MarketplaceError::from)
        })
        .await?;
    match settlement {
        Settlement::Applied(order) => Ok(order),
        Settlement::AlreadySettled => Err(already_settled(order_id)),
    }
}

pub(crate) fn already_settled(order_id: &OrderId) -> MarketplaceError {
    StorageError::StatusConflict { order_id: order_id.clone(), expected: OrderStatusType::PendingPayment }.into()
}

/// Turns a lost race into an [`MarketplaceError::InvalidTransition`] that names the order's current status.
///
/// A guarded write that found the order in an unexpected state, or a reservation that another caller already
/// settled, both mean someone else moved the order first. Other errors pass through unchanged.
pub(crate) async fn explain_conflict<B: OrderManagement>(
    db: &B,
    order_id: &OrderId,
    to: OrderStatusType,
    err: MarketplaceError,
) -> MarketplaceError {
    let lost_race = matches!(
        err,
        MarketplaceError::Storage(StorageError::StatusConflict { .. }) |
            MarketplaceError::Ledger(
                LedgerError::ReservationReleased(_) |
                    LedgerError::ReservationCommitted(_) |
                    LedgerError::UnknownReservation(_)
            )
    );
    if !lost_race {
        return err;
    }
    match db.fetch_order(order_id).await {
        Ok(Some(order)) => {
            debug!("🔄️ Order {order_id} moved to {} before it could move to {to}", order.status);
            MarketplaceError::InvalidTransition { from: order.status, to }
        },
        Ok(None) => MarketplaceError::OrderNotFound(order_id.clone()),
        Err(e) => e.into(),
    }
}
