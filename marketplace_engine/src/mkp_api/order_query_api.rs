//! Read-only access to orders and the records attached to them.

use std::fmt::Debug;

use log::trace;

use crate::{
    db_types::{Complaint, Order, OrderId, Payment},
    order_objects::OrderQueryFilter,
    traits::{OrderManagement, StorageError},
};

pub struct OrderQueryApi<B> {
    db: B,
}

impl<B: Debug> Debug for OrderQueryApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderQueryApi ({:?})", self.db)
    }
}

impl<B> OrderQueryApi<B>
where B: OrderManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, StorageError> {
        self.db.fetch_order(order_id).await
    }

    pub async fn orders_for_buyer(&self, buyer_id: &str) -> Result<Vec<Order>, StorageError> {
        self.search_orders(OrderQueryFilter::default().with_buyer_id(buyer_id)).await
    }

    pub async fn orders_for_seller(&self, seller_id: &str) -> Result<Vec<Order>, StorageError> {
        self.search_orders(OrderQueryFilter::default().with_seller_id(seller_id)).await
    }

    pub async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, StorageError> {
        trace!("🔄️ Searching orders: {query:?}");
        self.db.search_orders(query).await
    }

    pub async fn fetch_payment(&self, order_id: &OrderId) -> Result<Option<Payment>, StorageError> {
        self.db.fetch_payment(order_id).await
    }

    pub async fn fetch_complaint(&self, id: i64) -> Result<Option<Complaint>, StorageError> {
        self.db.fetch_complaint(id).await
    }

    pub async fn complaints_for_order(&self, order_id: &OrderId) -> Result<Vec<Complaint>, StorageError> {
        self.db.fetch_complaints_for_order(order_id).await
    }
}
