use chrono::Utc;
use log::trace;
use sqlx::{FromRow, SqliteConnection};

use crate::{
    db_types::{NewVariant, ProductId, Variant, VariantKey},
    traits::StorageError,
};

#[derive(Debug, FromRow)]
struct VariantRow {
    product_id: ProductId,
    color: String,
    size: String,
    stock: u32,
    reserved: u32,
}

impl From<VariantRow> for Variant {
    fn from(row: VariantRow) -> Self {
        Variant::new(VariantKey::new(row.product_id, row.color, row.size), row.stock, row.reserved)
    }
}

pub async fn insert_variants(
    product_id: &ProductId,
    variants: &[NewVariant],
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    let now = Utc::now();
    for v in variants {
        sqlx::query(
            "INSERT INTO variants (product_id, color, size, stock, reserved, updated_at) VALUES ($1, $2, $3, $4, 0, $5)",
        )
        .bind(product_id.as_str())
        .bind(&v.color)
        .bind(&v.size)
        .bind(v.stock)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub async fn fetch_variants_for_product(
    product_id: &ProductId,
    conn: &mut SqliteConnection,
) -> Result<Vec<Variant>, sqlx::Error> {
    let rows: Vec<VariantRow> = sqlx::query_as(
        "SELECT product_id, color, size, stock, reserved FROM variants WHERE product_id = $1 ORDER BY color, size",
    )
    .bind(product_id.as_str())
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(Variant::from).collect())
}

pub async fn fetch_all_variants(conn: &mut SqliteConnection) -> Result<Vec<Variant>, sqlx::Error> {
    let rows: Vec<VariantRow> =
        sqlx::query_as("SELECT product_id, color, size, stock, reserved FROM variants ORDER BY product_id, color, size")
            .fetch_all(conn)
            .await?;
    Ok(rows.into_iter().map(Variant::from).collect())
}

/// Writes the given stock levels. The levels are decided by the variant ledger; this function only records them.
pub async fn store_levels(levels: &[Variant], conn: &mut SqliteConnection) -> Result<(), StorageError> {
    let now = Utc::now();
    for v in levels {
        let result = sqlx::query(
            "UPDATE variants SET stock = $1, reserved = $2, updated_at = $3 WHERE product_id = $4 AND color = $5 AND \
             size = $6",
        )
        .bind(v.stock)
        .bind(v.reserved)
        .bind(now)
        .bind(v.key.product_id.as_str())
        .bind(&v.key.color)
        .bind(&v.key.size)
        .execute(&mut *conn)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::VariantNotFound(v.key.clone()));
        }
        trace!("🗃️ {} now has stock {} and {} reserved", v.key, v.stock, v.reserved);
    }
    Ok(())
}
