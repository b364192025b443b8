use std::{fmt::Debug, sync::Arc};

use log::*;

use crate::{
    db_types::{
        Complaint,
        ComplaintStatus,
        ComplaintUpdate,
        NewComplaint,
        OrderId,
        OrderStatusType,
        Restock,
        Role,
        VariantKey,
    },
    events::{ComplaintClosedEvent, EventProducers},
    ledger::{ReservationItem, VariantLedger},
    mkp_api::order_flow_api::authorize,
    traits::{MarketplaceDatabase, StorageError},
    MarketplaceError,
};

pub const MIN_DESCRIPTION_LENGTH: usize = 10;
pub const MAX_DESCRIPTION_LENGTH: usize = 1000;

/// `ComplaintApi` handles complaints filed against delivered orders.
///
/// A complaint moves from `pending` through an optional `in_review` to either `resolved` or `rejected`, both of which
/// are final. Resolving a complaint may return goods to stock, which goes through the variant ledger in one unit
/// with the complaint update.
pub struct ComplaintApi<B> {
    db: B,
    ledger: Arc<VariantLedger>,
    producers: EventProducers,
}

impl<B> Debug for ComplaintApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ComplaintApi")
    }
}

impl<B> ComplaintApi<B> {
    pub fn new(db: B, ledger: Arc<VariantLedger>, producers: EventProducers) -> Self {
        Self { db, ledger, producers }
    }
}

impl<B> ComplaintApi<B>
where B: MarketplaceDatabase
{
    /// Files a new complaint. The complainant must be the order's buyer, the order must have been delivered, and the
    /// product must be part of the order.
    pub async fn file(&self, complaint: NewComplaint) -> Result<Complaint, MarketplaceError> {
        let order_id = &complaint.order_id;
        let order =
            self.db.fetch_order(order_id).await?.ok_or_else(|| MarketplaceError::OrderNotFound(order_id.clone()))?;
        authorize(&order, &complaint.user_id, Role::Buyer, &[Role::Buyer])?;
        if order.status != OrderStatusType::Delivered {
            return Err(MarketplaceError::validation(
                "orderId",
                format!("complaints can only be filed on delivered orders. This order is {}", order.status),
            ));
        }
        if !order.contains_product(&complaint.product_id) {
            return Err(MarketplaceError::validation(
                "productId",
                format!("product {} is not part of order {order_id}", complaint.product_id),
            ));
        }
        let length = complaint.description.trim().chars().count();
        if !(MIN_DESCRIPTION_LENGTH..=MAX_DESCRIPTION_LENGTH).contains(&length) {
            return Err(MarketplaceError::validation(
                "description",
                format!("must be between {MIN_DESCRIPTION_LENGTH} and {MAX_DESCRIPTION_LENGTH} characters"),
            ));
        }
        let complaint = NewComplaint { description: complaint.description.trim().to_string(), ..complaint };
        let complaint = self.db.insert_complaint(complaint).await?;
        info!("📣️ Complaint #{} filed on order {} ({:?})", complaint.id, complaint.order_id, complaint.complaint_type);
        Ok(complaint)
    }

    /// Moves a pending complaint into review.
    pub async fn review(&self, id: i64) -> Result<Complaint, MarketplaceError> {
        self.existing(id, ComplaintStatus::InReview).await?;
        let update = ComplaintUpdate {
            from: vec![ComplaintStatus::Pending],
            to: ComplaintStatus::InReview,
            resolution: None,
            resolved_by: None,
            restock: None,
        };
        let complaint = match self.db.update_complaint(id, update, &[]).await {
            Ok(c) => c,
            Err(e) => return Err(self.explain_conflict(id, e).await),
        };
        debug!("📣️ Complaint #{id} is in review");
        Ok(complaint)
    }

    /// Resolves a complaint, optionally returning goods to stock.
    ///
    /// A restock must name a variant of the complaint's product that is part of the order. The quantity returned
    /// through all resolved complaints on the order may not exceed the quantity ordered. The stock increase and the
    /// complaint update are applied together or not at all.
    pub async fn resolve(
        &self,
        id: i64,
        resolution: &str,
        resolved_by: &str,
        restock: Option<Restock>,
    ) -> Result<Complaint, MarketplaceError> {
        let complaint = self.existing(id, ComplaintStatus::Resolved).await?;
        let resolution = required_resolution(resolution)?;
        let update = ComplaintUpdate {
            from: vec![ComplaintStatus::Pending, ComplaintStatus::InReview],
            to: ComplaintStatus::Resolved,
            resolution: Some(resolution),
            resolved_by: Some(resolved_by.to_string()),
            restock: restock.clone(),
        };
        let result = match restock {
            Some(restock) => self.resolve_with_restock(&complaint, restock, update).await,
            None => self.db.update_complaint(id, update, &[]).await.map_err(MarketplaceError::from),
        };
        let resolved = match result {
            Ok(c) => c,
            Err(MarketplaceError::Storage(e)) => return Err(self.explain_conflict(id, e).await),
            Err(e) => return Err(e),
        };
        info!("📣️ Complaint #{id} resolved by {resolved_by}");
        self.producers.publish_complaint_closed(ComplaintClosedEvent::new(resolved.clone())).await;
        Ok(resolved)
    }

    /// Rejects a complaint. There is no stock effect.
    pub async fn reject(&self, id: i64, resolution: &str, resolved_by: &str) -> Result<Complaint, MarketplaceError> {
        self.existing(id, ComplaintStatus::Rejected).await?;
        let update = ComplaintUpdate {
            from: vec![ComplaintStatus::Pending, ComplaintStatus::InReview],
            to: ComplaintStatus::Rejected,
            resolution: Some(required_resolution(resolution)?),
            resolved_by: Some(resolved_by.to_string()),
            restock: None,
        };
        let rejected = match self.db.update_complaint(id, update, &[]).await {
            Ok(c) => c,
            Err(e) => return Err(self.explain_conflict(id, e).await),
        };
        info!("📣️ Complaint #{id} rejected by {resolved_by}");
        self.producers.publish_complaint_closed(ComplaintClosedEvent::new(rejected.clone())).await;
        Ok(rejected)
    }

    pub async fn fetch_complaint(&self, id: i64) -> Result<Option<Complaint>, MarketplaceError> {
        Ok(self.db.fetch_complaint(id).await?)
    }

    pub async fn complaints_for_order(&self, order_id: &OrderId) -> Result<Vec<Complaint>, MarketplaceError> {
        Ok(self.db.fetch_complaints_for_order(order_id).await?)
    }

    async fn resolve_with_restock(
        &self,
        complaint: &Complaint,
        restock: Restock,
        update: ComplaintUpdate,
    ) -> Result<Complaint, MarketplaceError> {
        if restock.quantity == 0 {
            return Err(MarketplaceError::validation("restock.quantity", "must be at least 1"));
        }
        let order_id = &complaint.order_id;
        let order =
            self.db.fetch_order(order_id).await?.ok_or_else(|| MarketplaceError::OrderNotFound(order_id.clone()))?;
        let key = VariantKey::new(complaint.product_id.clone(), restock.color.as_str(), restock.size.as_str());
        let ordered = order.item_for(&key).map(|i| i.quantity).ok_or_else(|| {
            MarketplaceError::validation("restock", format!("variant {key} is not part of order {order_id}"))
        })?;
        let items = [ReservationItem::new(key.clone(), restock.quantity)];
        let db = &self.db;
        let id = complaint.id;
        let key = &key;
        // Runs under the variant's ledger lock, so concurrent returns of the same variant are checked one at a time.
        self.ledger
            .restock_with(&items, |levels| async move {
                let returned = db.returned_quantity(order_id, key).await?;
                if returned.saturating_add(restock.quantity) > ordered {
                    return Err(MarketplaceError::validation(
                        "restock.quantity",
                        format!("{ordered} ordered, {returned} already returned. Cannot return {} more", restock.quantity),
                    ));
                }
                Ok(db.update_complaint(id, update, &levels).await?)
            })
            .await
    }

    /// Fails if the complaint is missing or cannot move to `to` from its current status.
    async fn existing(&self, id: i64, to: ComplaintStatus) -> Result<Complaint, MarketplaceError> {
        let complaint = self.db.fetch_complaint(id).await?.ok_or(MarketplaceError::ComplaintNotFound(id))?;
        if !complaint.status.can_transition_to(to) {
            return Err(MarketplaceError::InvalidComplaintTransition { id, status: complaint.status });
        }
        Ok(complaint)
    }

    /// A guarded complaint update that lost a race is reported with the complaint's current status.
    async fn explain_conflict(&self, id: i64, err: StorageError) -> MarketplaceError {
        if !matches!(err, StorageError::ComplaintStatusConflict(_)) {
            return err.into();
        }
        match self.db.fetch_complaint(id).await {
            Ok(Some(c)) => MarketplaceError::InvalidComplaintTransition { id, status: c.status },
            Ok(None) => MarketplaceError::ComplaintNotFound(id),
            Err(e) => e.into(),
        }
    }
}

fn required_resolution(resolution: &str) -> Result<String, MarketplaceError> {
    let resolution = resolution.trim();
    if resolution.is_empty() {
        return Err(MarketplaceError::validation("resolution", "is required"));
    }
    Ok(resolution.to_string())
}
