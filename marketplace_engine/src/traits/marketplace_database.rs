use thiserror::Error;

use crate::{
    db_types::{
        Complaint,
        ComplaintUpdate,
        NewComplaint,
        NewOrder,
        NewPayment,
        NewProduct,
        Order,
        OrderId,
        OrderStatusType,
        Payment,
        Product,
        ProductId,
        ReservationId,
        StatusChange,
        Variant,
        VariantKey,
    },
    ledger::Reservation,
    traits::OrderManagement,
};

/// This trait defines every write the marketplace engine makes to its storage backend.
///
/// Methods that take a `levels` argument are called by the variant ledger while it holds the locks for those
/// variants. Implementations must store the given `stock` and `reserved` values in the *same* atomic transaction as
/// the rest of the change, and must not apply anything if any part of it fails.
#[allow(async_fn_in_trait)]
pub trait MarketplaceDatabase: Clone + OrderManagement {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores a new product and its variants. Every variant starts with `reserved = 0`.
    async fn insert_product(
        &self,
        product_id: ProductId,
        seller_id: &str,
        product: NewProduct,
    ) -> Result<Product, StorageError>;

    async fn fetch_product(&self, product_id: &ProductId) -> Result<Option<Product>, StorageError>;

    /// Fetches the given products. Unknown ids are skipped.
    async fn fetch_products(&self, product_ids: &[ProductId]) -> Result<Vec<Product>, StorageError>;

    /// Fetches the persisted stock levels of every variant. Used to rebuild the ledger on start-up.
    async fn fetch_all_variants(&self) -> Result<Vec<Variant>, StorageError>;

    /// Rebuilds the reservations of every order that is still `pending_payment`.
    async fn fetch_held_reservations(&self) -> Result<Vec<Reservation>, StorageError>;

    /// Stores a validated order in `pending_payment` along with its reservation id, and the variant levels after
    /// the reservation, in a single transaction.
    ///
    /// The order's `created_at` is the reservation's creation time, so the hold window survives a restart.
    async fn insert_order(
        &self,
        order: NewOrder,
        reservation: &Reservation,
        levels: &[Variant],
    ) -> Result<Order, StorageError>;

    async fn fetch_order_by_reservation(&self, reservation_id: &ReservationId) -> Result<Option<Order>, StorageError>;

    /// Applies a guarded status change and stores `levels` in one transaction.
    ///
    /// ## Failure modes:
    /// * If the order does not exist, [`StorageError::OrderNotFound`].
    /// * If the order is no longer in `change.from`, [`StorageError::StatusConflict`]. Nothing is written.
    async fn transition_order(
        &self,
        order_id: &OrderId,
        change: StatusChange,
        levels: &[Variant],
    ) -> Result<Order, StorageError>;

    /// Stores an unconfirmed payment proof. There is at most one payment per order.
    ///
    /// Returns [`StorageError::DuplicatePayment`] if a payment already exists for the order.
    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, StorageError>;

    /// Overwrites the proof reference and destination of an unconfirmed payment.
    ///
    /// ## Failure modes:
    /// * No payment for the order: [`StorageError::PaymentNotFound`].
    /// * The payment is already confirmed: [`StorageError::PaymentAlreadyConfirmed`].
    async fn update_payment_proof(
        &self,
        order_id: &OrderId,
        proof_ref: &str,
        destination: Option<&str>,
    ) -> Result<Payment, StorageError>;

    /// In a single transaction,
    /// * marks the payment for the order as confirmed,
    /// * moves the order from `pending_payment` to `confirmed`,
    /// * stores the committed variant levels.
    async fn confirm_payment(&self, order_id: &OrderId, levels: &[Variant]) -> Result<(Payment, Order), StorageError>;

    /// Records a successful card payment reported by the payment gateway. The payment is stored already confirmed,
    /// replacing any unconfirmed proof the buyer submitted, and the order moves to `confirmed` together with the
    /// committed variant levels, in one transaction.
    async fn record_gateway_payment(
        &self,
        payment: NewPayment,
        transaction_id: &str,
        levels: &[Variant],
    ) -> Result<(Payment, Order), StorageError>;

    async fn insert_complaint(&self, complaint: NewComplaint) -> Result<Complaint, StorageError>;

    /// Applies a guarded complaint update and stores `levels` (possibly empty) in one transaction.
    ///
    /// Returns [`StorageError::ComplaintStatusConflict`] if the complaint is not in one of `update.from`.
    async fn update_complaint(
        &self,
        id: i64,
        update: ComplaintUpdate,
        levels: &[Variant],
    ) -> Result<Complaint, StorageError>;

    /// The total quantity of `key` already returned to stock through resolved complaints on the order.
    async fn returned_quantity(&self, order_id: &OrderId, key: &VariantKey) -> Result<u32, StorageError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("We have an internal database engine (configuration/uptime etc.) : {0}")]
    DatabaseError(String),
    #[error("Cannot insert order, since it already exists with id {0}")]
    DuplicateOrder(OrderId),
    #[error("A payment has already been submitted for order {0}")]
    DuplicatePayment(OrderId),
    #[error("Order {order_id} is no longer in the {expected} state")]
    StatusConflict { order_id: OrderId, expected: OrderStatusType },
    #[error("The payment for order {0} has already been confirmed")]
    PaymentAlreadyConfirmed(OrderId),
    #[error("No payment exists for order {0}")]
    PaymentNotFound(OrderId),
    #[error("Complaint #{0} is not in a state that allows this change")]
    ComplaintStatusConflict(i64),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("The requested complaint #{0} does not exist")]
    ComplaintNotFound(i64),
    #[error("The requested product {0} does not exist")]
    ProductNotFound(ProductId),
    #[error("Variant {0} does not exist in the database")]
    VariantNotFound(VariantKey),
    #[error("Stored data could not be decoded: {0}")]
    InvalidData(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        StorageError::DatabaseError(e.to_string())
    }
}
