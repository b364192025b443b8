//! `SqliteDatabase` is a concrete implementation of a marketplace engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module.
use std::fmt::Debug;

use log::*;
use sqlx::SqlitePool;

use super::{
    db::{complaints, new_pool, orders, payments, products, variants},
    SqliteDatabaseError,
};
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
    order_objects::OrderQueryFilter,
    traits::{MarketplaceDatabase, OrderManagement, StorageError},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Brings the schema up to date with the migrations embedded in this crate.
    pub async fn run_migrations(&self) -> Result<(), SqliteDatabaseError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl OrderManagement for SqliteDatabase {
    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::search_orders(query, &mut conn).await?;
        Ok(orders)
    }

    async fn fetch_payment(&self, order_id: &OrderId) -> Result<Option<Payment>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let payment = payments::fetch_payment(order_id, &mut conn).await?;
        Ok(payment)
    }

    async fn fetch_complaint(&self, id: i64) -> Result<Option<Complaint>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let complaint = complaints::fetch_complaint(id, &mut conn).await?;
        Ok(complaint)
    }

    async fn fetch_complaints_for_order(&self, order_id: &OrderId) -> Result<Vec<Complaint>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let result = complaints::fetch_complaints_for_order(order_id, &mut conn).await?;
        Ok(result)
    }
}

impl MarketplaceDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_product(
        &self,
        product_id: ProductId,
        seller_id: &str,
        product: NewProduct,
    ) -> Result<Product, StorageError> {
        let mut tx = self.pool.begin().await?;
        let product = products::insert_product(product_id, seller_id, product, &mut tx).await?;
        tx.commit().await?;
        Ok(product)
    }

    async fn fetch_product(&self, product_id: &ProductId) -> Result<Option<Product>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let product = products::fetch_product(product_id, &mut conn).await?;
        Ok(product)
    }

    async fn fetch_products(&self, product_ids: &[ProductId]) -> Result<Vec<Product>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let mut result = Vec::with_capacity(product_ids.len());
        for id in product_ids {
            if let Some(product) = products::fetch_product(id, &mut conn).await? {
                result.push(product);
            }
        }
        Ok(result)
    }

    async fn fetch_all_variants(&self) -> Result<Vec<Variant>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let result = variants::fetch_all_variants(&mut conn).await?;
        Ok(result)
    }

    async fn fetch_held_reservations(&self) -> Result<Vec<Reservation>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_held_reservations(&mut conn).await
    }

    async fn insert_order(
        &self,
        order: NewOrder,
        reservation: &Reservation,
        levels: &[Variant],
    ) -> Result<Order, StorageError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::insert_order(order, reservation, &mut tx).await?;
        variants::store_levels(levels, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn fetch_order_by_reservation(&self, reservation_id: &ReservationId) -> Result<Option<Order>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_reservation(reservation_id, &mut conn).await?;
        Ok(order)
    }

    async fn transition_order(
        &self,
        order_id: &OrderId,
        change: StatusChange,
        levels: &[Variant],
    ) -> Result<Order, StorageError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::update_status(order_id, &change, &mut tx).await?;
        variants::store_levels(levels, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, StorageError> {
        let mut tx = self.pool.begin().await?;
        let payment = payments::insert_payment(payment, &mut tx).await?;
        tx.commit().await?;
        Ok(payment)
    }

    async fn update_payment_proof(
        &self,
        order_id: &OrderId,
        proof_ref: &str,
        destination: Option<&str>,
    ) -> Result<Payment, StorageError> {
        let mut tx = self.pool.begin().await?;
        let payment = payments::update_proof(order_id, proof_ref, destination, &mut tx).await?;
        tx.commit().await?;
        Ok(payment)
    }

    async fn confirm_payment(&self, order_id: &OrderId, levels: &[Variant]) -> Result<(Payment, Order), StorageError> {
        let mut tx = self.pool.begin().await?;
        let payment = payments::confirm(order_id, &mut tx).await?;
        let change = StatusChange::new(OrderStatusType::PendingPayment, OrderStatusType::Confirmed);
        let order = orders::update_status(order_id, &change, &mut tx).await?;
        variants::store_levels(levels, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Payment for order [{order_id}] confirmed");
        Ok((payment, order))
    }

    async fn record_gateway_payment(
        &self,
        payment: NewPayment,
        transaction_id: &str,
        levels: &[Variant],
    ) -> Result<(Payment, Order), StorageError> {
        let order_id = payment.order_id.clone();
        let mut tx = self.pool.begin().await?;
        let payment = payments::upsert_confirmed(payment, &mut tx).await?;
        let change = StatusChange::new(OrderStatusType::PendingPayment, OrderStatusType::Confirmed)
            .with_gateway_txid(Some(transaction_id.to_string()));
        let order = orders::update_status(&order_id, &change, &mut tx).await?;
        variants::store_levels(levels, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Gateway payment {transaction_id} recorded for order [{order_id}]");
        Ok((payment, order))
    }

    async fn insert_complaint(&self, complaint: NewComplaint) -> Result<Complaint, StorageError> {
        let mut tx = self.pool.begin().await?;
        let complaint = complaints::insert_complaint(complaint, &mut tx).await?;
        tx.commit().await?;
        Ok(complaint)
    }

    async fn update_complaint(
        &self,
        id: i64,
        update: ComplaintUpdate,
        levels: &[Variant],
    ) -> Result<Complaint, StorageError> {
        let mut tx = self.pool.begin().await?;
        let complaint = complaints::update_complaint(id, update, &mut tx).await?;
        variants::store_levels(levels, &mut tx).await?;
        tx.commit().await?;
        Ok(complaint)
    }

    async fn returned_quantity(&self, order_id: &OrderId, key: &VariantKey) -> Result<u32, StorageError> {
        let mut conn = self.pool.acquire().await?;
        complaints::returned_quantity(order_id, key, &mut conn).await
    }

    async fn close(&mut self) -> Result<(), StorageError> {
        self.pool.close().await;
        Ok(())
    }
}
