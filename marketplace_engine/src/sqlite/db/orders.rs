use chrono::{DateTime, Utc};
use log::{debug, trace};
use mkp_common::Money;
use sqlx::{FromRow, QueryBuilder, SqliteConnection};

use super::single_row;
use crate::{
    db_types::{
        CancelReason,
        NewOrder,
        Order,
        OrderId,
        OrderItem,
        OrderStatusType,
        PaymentMethod,
        ProductId,
        ReservationId,
        ShippingAddress,
        ShippingMethod,
        StatusChange,
        VariantKey,
    },
    ledger::{Reservation, ReservationItem},
    order_objects::OrderQueryFilter,
    sqlite::errors::is_unique_violation,
    traits::StorageError,
};

#[derive(Debug, FromRow)]
struct OrderRow {
    id: i64,
    order_id: OrderId,
    buyer_id: String,
    seller_id: String,
    #[sqlx(flatten)]
    shipping_address: ShippingAddress,
    payment_method: PaymentMethod,
    shipping_method: ShippingMethod,
    items_price: Money,
    shipping_price: Money,
    tax_price: Money,
    total_price: Money,
    status: OrderStatusType,
    reservation_id: ReservationId,
    cancel_reason: Option<CancelReason>,
    refund_flagged: bool,
    gateway_txid: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn with_items(self, items: Vec<OrderItem>) -> Order {
        Order {
            id: self.id,
            order_id: self.order_id,
            buyer_id: self.buyer_id,
            seller_id: self.seller_id,
            items,
            shipping_address: self.shipping_address,
            payment_method: self.payment_method,
            shipping_method: self.shipping_method,
            items_price: self.items_price,
            shipping_price: self.shipping_price,
            tax_price: self.tax_price,
            total_price: self.total_price,
            status: self.status,
            reservation_id: self.reservation_id,
            cancel_reason: self.cancel_reason,
            refund_flagged: self.refund_flagged,
            gateway_txid: self.gateway_txid,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct ItemRow {
    product_id: ProductId,
    color: String,
    size: String,
    quantity: u32,
    unit_price: Money,
}

impl From<ItemRow> for OrderItem {
    fn from(row: ItemRow) -> Self {
        OrderItem {
            key: VariantKey::new(row.product_id, row.color, row.size),
            quantity: row.quantity,
            unit_price: row.unit_price,
        }
    }
}

/// Inserts a new order and its items in `pending_payment`. This is not atomic. Embed the call inside a transaction
/// and pass `&mut tx` as the connection argument.
pub async fn insert_order(
    order: NewOrder,
    reservation: &Reservation,
    conn: &mut SqliteConnection,
) -> Result<Order, StorageError> {
    let row: OrderRow = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_id,
                buyer_id,
                seller_id,
                address,
                city,
                postal_code,
                country,
                payment_method,
                shipping_method,
                items_price,
                shipping_price,
                tax_price,
                total_price,
                reservation_id,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $15)
            RETURNING *;
        "#,
    )
    .bind(order.order_id.as_str())
    .bind(&order.buyer_id)
    .bind(&order.seller_id)
    .bind(&order.shipping_address.address)
    .bind(&order.shipping_address.city)
    .bind(&order.shipping_address.postal_code)
    .bind(&order.shipping_address.country)
    .bind(order.payment_method)
    .bind(order.shipping_method)
    .bind(order.items_price)
    .bind(order.shipping_price)
    .bind(order.tax_price)
    .bind(order.total_price)
    .bind(reservation.id.as_str())
    .bind(reservation.created_at)
    .fetch_all(&mut *conn)
    .await
    .and_then(single_row)
    .map_err(|e| {
        if is_unique_violation(&e) {
            StorageError::DuplicateOrder(order.order_id.clone())
        } else {
            StorageError::from(e)
        }
    })?;
    for (position, item) in order.items.iter().enumerate() {
        #[allow(clippy::cast_possible_wrap)]
        let position = position as i64;
        sqlx::query(
            "INSERT INTO order_items (order_id, position, product_id, color, size, quantity, unit_price) VALUES ($1, \
             $2, $3, $4, $5, $6, $7)",
        )
        .bind(order.order_id.as_str())
        .bind(position)
        .bind(item.key.product_id.as_str())
        .bind(&item.key.color)
        .bind(&item.key.size)
        .bind(item.quantity)
        .bind(item.unit_price)
        .execute(&mut *conn)
        .await?;
    }
    debug!("🗃️ Order [{}] inserted with id {}", row.order_id, row.id);
    Ok(row.with_items(order.items))
}

async fn fetch_items(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Vec<OrderItem>, sqlx::Error> {
    let rows: Vec<ItemRow> = sqlx::query_as(
        "SELECT product_id, color, size, quantity, unit_price FROM order_items WHERE order_id = $1 ORDER BY position",
    )
    .bind(order_id.as_str())
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(OrderItem::from).collect())
}

async fn attach_items(row: Option<OrderRow>, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    match row {
        Some(row) => {
            let items = fetch_items(&row.order_id, conn).await?;
            Ok(Some(row.with_items(items)))
        },
        None => Ok(None),
    }
}

pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let row: Option<OrderRow> = sqlx::query_as("SELECT * FROM orders WHERE order_id = $1")
        .bind(order_id.as_str())
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .next();
    attach_items(row, conn).await
}

pub async fn fetch_order_by_reservation(
    reservation_id: &ReservationId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let row: Option<OrderRow> = sqlx::query_as("SELECT * FROM orders WHERE reservation_id = $1")
        .bind(reservation_id.as_str())
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .next();
    attach_items(row, conn).await
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`
///
/// Resulting orders are ordered by `created_at` in ascending order
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM orders ");
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(buyer_id) = query.buyer_id {
        where_clause.push("buyer_id = ");
        where_clause.push_bind_unseparated(buyer_id);
    }
    if let Some(seller_id) = query.seller_id {
        where_clause.push("seller_id = ");
        where_clause.push_bind_unseparated(seller_id);
    }
    if let Some(since) = query.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    if let Some(statuses) = query.status.filter(|s| !s.is_empty()) {
        where_clause.push("status IN (");
        let mut first = true;
        for status in statuses {
            if !first {
                where_clause.push_unseparated(", ");
            }
            where_clause.push_bind_unseparated(status);
            first = false;
        }
        where_clause.push_unseparated(")");
    }
    builder.push(" ORDER BY created_at ASC, id ASC");
    trace!("🗃️ Executing query: {}", builder.sql());
    let rows: Vec<OrderRow> = builder.build_query_as().fetch_all(&mut *conn).await?;
    let mut orders = Vec::with_capacity(rows.len());
    for row in rows {
        let items = fetch_items(&row.order_id, conn).await?;
        orders.push(row.with_items(items));
    }
    trace!("🗃️ search_orders returned {} orders", orders.len());
    Ok(orders)
}

/// Applies a guarded status change. The update only succeeds if the order is still in `change.from`.
///
/// The guarded `UPDATE` is the first statement, so this is safe to call first thing in a write transaction.
pub async fn update_status(
    order_id: &OrderId,
    change: &StatusChange,
    conn: &mut SqliteConnection,
) -> Result<Order, StorageError> {
    let row: Option<OrderRow> = sqlx::query_as(
        r#"
            UPDATE orders SET
                status = $1,
                cancel_reason = COALESCE($2, cancel_reason),
                refund_flagged = (refund_flagged OR $3),
                gateway_txid = COALESCE($4, gateway_txid),
                updated_at = $5
            WHERE order_id = $6 AND status = $7
            RETURNING *;
        "#,
    )
    .bind(change.to)
    .bind(change.cancel_reason)
    .bind(change.refund_flagged)
    .bind(change.gateway_txid.as_deref())
    .bind(Utc::now())
    .bind(order_id.as_str())
    .bind(change.from)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .next();
    match attach_items(row, conn).await? {
        Some(order) => {
            debug!("🗃️ Order [{order_id}] moved from {} to {}", change.from, change.to);
            Ok(order)
        },
        None => match fetch_order_by_order_id(order_id, conn).await? {
            Some(_) => Err(StorageError::StatusConflict { order_id: order_id.clone(), expected: change.from }),
            None => Err(StorageError::OrderNotFound(order_id.clone())),
        },
    }
}

/// Rebuilds the reservations of every order that is still awaiting payment.
pub async fn fetch_held_reservations(conn: &mut SqliteConnection) -> Result<Vec<Reservation>, StorageError> {
    let rows: Vec<(OrderId, ReservationId, DateTime<Utc>)> = sqlx::query_as(
        "SELECT order_id, reservation_id, created_at FROM orders WHERE status = 'pending_payment' ORDER BY created_at",
    )
    .fetch_all(&mut *conn)
    .await?;
    let mut reservations = Vec::with_capacity(rows.len());
    for (order_id, reservation_id, created_at) in rows {
        let items = fetch_items(&order_id, conn)
            .await?
            .into_iter()
            .map(|item| ReservationItem::new(item.key, item.quantity))
            .collect::<Vec<_>>();
        let reservation = Reservation::restored(reservation_id, &items, created_at)
            .map_err(|e| StorageError::InvalidData(format!("Order {order_id} cannot be restored: {e}")))?;
        reservations.push(reservation);
    }
    Ok(reservations)
}
