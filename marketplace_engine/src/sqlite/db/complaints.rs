use chrono::{DateTime, Utc};
use log::debug;
use sqlx::{FromRow, QueryBuilder, SqliteConnection};

use super::single_row;
use crate::{
    db_types::{
        Complaint,
        ComplaintStatus,
        ComplaintType,
        ComplaintUpdate,
        NewComplaint,
        OrderId,
        ProductId,
        Restock,
        VariantKey,
    },
    traits::StorageError,
};

#[derive(Debug, FromRow)]
struct ComplaintRow {
    id: i64,
    user_id: String,
    product_id: ProductId,
    order_id: OrderId,
    complaint_type: ComplaintType,
    description: String,
    status: ComplaintStatus,
    resolution: Option<String>,
    resolved_by: Option<String>,
    resolved_at: Option<DateTime<Utc>>,
    restock_color: Option<String>,
    restock_size: Option<String>,
    restock_quantity: Option<u32>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ComplaintRow> for Complaint {
    fn from(row: ComplaintRow) -> Self {
        let restock = match (row.restock_color, row.restock_size, row.restock_quantity) {
            (Some(color), Some(size), Some(quantity)) => Some(Restock { color, size, quantity }),
            _ => None,
        };
        Complaint {
            id: row.id,
            user_id: row.user_id,
            product_id: row.product_id,
            order_id: row.order_id,
            complaint_type: row.complaint_type,
            description: row.description,
            status: row.status,
            resolution: row.resolution,
            resolved_by: row.resolved_by,
            resolved_at: row.resolved_at,
            restock,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub async fn insert_complaint(complaint: NewComplaint, conn: &mut SqliteConnection) -> Result<Complaint, sqlx::Error> {
    let now = Utc::now();
    let row: ComplaintRow = sqlx::query_as(
        r#"
            INSERT INTO complaints (
                user_id,
                product_id,
                order_id,
                complaint_type,
                description,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING *;
        "#,
    )
    .bind(&complaint.user_id)
    .bind(complaint.product_id.as_str())
    .bind(complaint.order_id.as_str())
    .bind(complaint.complaint_type)
    .bind(&complaint.description)
    .bind(now)
    .fetch_all(conn)
    .await
    .and_then(single_row)?;
    debug!("🗃️ Complaint #{} filed against order [{}]", row.id, row.order_id);
    Ok(row.into())
}

pub async fn fetch_complaint(id: i64, conn: &mut SqliteConnection) -> Result<Option<Complaint>, sqlx::Error> {
    let rows: Vec<ComplaintRow> =
        sqlx::query_as("SELECT * FROM complaints WHERE id = $1").bind(id).fetch_all(conn).await?;
    Ok(rows.into_iter().next().map(Complaint::from))
}

pub async fn fetch_complaints_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<Complaint>, sqlx::Error> {
    let rows: Vec<ComplaintRow> = sqlx::query_as("SELECT * FROM complaints WHERE order_id = $1 ORDER BY id")
        .bind(order_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(rows.into_iter().map(Complaint::from).collect())
}

/// Applies a guarded complaint update. The update only succeeds if the complaint is in one of `update.from`.
///
/// The guarded `UPDATE` is the first statement, so this is safe to call first thing in a write transaction.
pub async fn update_complaint(
    id: i64,
    update: ComplaintUpdate,
    conn: &mut SqliteConnection,
) -> Result<Complaint, StorageError> {
    let now = Utc::now();
    let resolved_at = update.to.is_closed().then_some(now);
    let (restock_color, restock_size, restock_quantity) = match update.restock {
        Some(r) => (Some(r.color), Some(r.size), Some(r.quantity)),
        None => (None, None, None),
    };
    let mut builder = QueryBuilder::new("UPDATE complaints SET status = ");
    builder.push_bind(update.to);
    builder.push(", resolution = COALESCE(").push_bind(update.resolution).push(", resolution)");
    builder.push(", resolved_by = COALESCE(").push_bind(update.resolved_by).push(", resolved_by)");
    builder.push(", resolved_at = ").push_bind(resolved_at);
    builder.push(", restock_color = ").push_bind(restock_color);
    builder.push(", restock_size = ").push_bind(restock_size);
    builder.push(", restock_quantity = ").push_bind(restock_quantity);
    builder.push(", updated_at = ").push_bind(now);
    builder.push(" WHERE id = ").push_bind(id);
    builder.push(" AND status IN (");
    let mut statuses = builder.separated(", ");
    for status in update.from {
        statuses.push_bind(status);
    }
    builder.push(") RETURNING *");
    let rows: Vec<ComplaintRow> = builder.build_query_as().fetch_all(&mut *conn).await?;
    let row = rows.into_iter().next();
    match row {
        Some(row) => {
            debug!("🗃️ Complaint #{id} is now {}", row.status);
            Ok(row.into())
        },
        None => match fetch_complaint(id, conn).await? {
            Some(_) => Err(StorageError::ComplaintStatusConflict(id)),
            None => Err(StorageError::ComplaintNotFound(id)),
        },
    }
}

/// The total quantity of a variant already returned to stock through resolved complaints on an order.
pub async fn returned_quantity(
    order_id: &OrderId,
    key: &VariantKey,
    conn: &mut SqliteConnection,
) -> Result<u32, StorageError> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(restock_quantity), 0) FROM complaints WHERE order_id = $1 AND product_id = $2 AND \
         restock_color = $3 AND restock_size = $4 AND status = 'resolved'",
    )
    .bind(order_id.as_str())
    .bind(key.product_id.as_str())
    .bind(&key.color)
    .bind(&key.size)
    .fetch_all(conn)
    .await
    .and_then(single_row)?;
    u32::try_from(total).map_err(|_| StorageError::InvalidData(format!("Returned quantity {total} is out of range")))
}
