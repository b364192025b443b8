use chrono::{DateTime, Utc};
use log::debug;
use mkp_common::Money;
use sqlx::{FromRow, SqliteConnection};

use super::variants;
use crate::{
    db_types::{NewProduct, Product, ProductId},
    traits::StorageError,
};

#[derive(Debug, FromRow)]
struct ProductRow {
    product_id: ProductId,
    seller_id: String,
    name: String,
    price: Money,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Inserts a product and its variants. This is not atomic; wrap it in a transaction.
pub async fn insert_product(
    product_id: ProductId,
    seller_id: &str,
    product: NewProduct,
    conn: &mut SqliteConnection,
) -> Result<Product, StorageError> {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO products (product_id, seller_id, name, price, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, \
         $5)",
    )
    .bind(product_id.as_str())
    .bind(seller_id)
    .bind(&product.name)
    .bind(product.price)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    variants::insert_variants(&product_id, &product.variants, conn).await?;
    debug!("🗃️ Product {product_id} stored with {} variants", product.variants.len());
    fetch_product(&product_id, conn).await?.ok_or(StorageError::ProductNotFound(product_id))
}

pub async fn fetch_product(product_id: &ProductId, conn: &mut SqliteConnection) -> Result<Option<Product>, sqlx::Error> {
    let row: Option<ProductRow> = sqlx::query_as(
        "SELECT product_id, seller_id, name, price, created_at, updated_at FROM products WHERE product_id = $1",
    )
    .bind(product_id.as_str())
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .next();
    let Some(row) = row else {
        return Ok(None);
    };
    let variants = variants::fetch_variants_for_product(&row.product_id, conn).await?;
    Ok(Some(Product {
        id: row.product_id,
        seller_id: row.seller_id,
        name: row.name,
        price: row.price,
        variants,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }))
}
