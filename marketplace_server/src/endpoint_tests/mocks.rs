use mockall::mock;
use marketplace_engine::{
    db_types::{Complaint, Order, OrderId, Payment},
    order_objects::OrderQueryFilter,
    traits::{OrderManagement, StorageError},
};

mock! {
    pub OrderStore {}
    impl OrderManagement for OrderStore {
        async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, StorageError>;
        async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, StorageError>;
        async fn fetch_payment(&self, order_id: &OrderId) -> Result<Option<Payment>, StorageError>;
        async fn fetch_complaint(&self, id: i64) -> Result<Option<Complaint>, StorageError>;
        async fn fetch_complaints_for_order(&self, order_id: &OrderId) -> Result<Vec<Complaint>, StorageError>;
    }
}
