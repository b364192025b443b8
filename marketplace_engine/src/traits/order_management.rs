use crate::{
    db_types::{Complaint, Order, OrderId, Payment},
    order_objects::OrderQueryFilter,
    traits::StorageError,
};

/// Read-only queries over orders and the records attached to them.
#[allow(async_fn_in_trait)]
pub trait OrderManagement {
    /// Fetches the order with the given `order_id`. If no order exists, `None` is returned.
    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, StorageError>;

    /// Fetches orders matching the filter, oldest first.
    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, StorageError>;

    /// Fetches the payment record for an order, if the buyer has submitted one.
    async fn fetch_payment(&self, order_id: &OrderId) -> Result<Option<Payment>, StorageError>;

    async fn fetch_complaint(&self, id: i64) -> Result<Option<Complaint>, StorageError>;

    async fn fetch_complaints_for_order(&self, order_id: &OrderId) -> Result<Vec<Complaint>, StorageError>;
}
