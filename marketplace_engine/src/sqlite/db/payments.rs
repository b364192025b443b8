use chrono::Utc;
use log::debug;
use sqlx::SqliteConnection;

use super::single_row;
use crate::{
    db_types::{NewPayment, OrderId, Payment},
    sqlite::errors::is_unique_violation,
    traits::StorageError,
};

/// Inserts an unconfirmed payment record submitted by the buyer. At most one payment can exist per order.
pub async fn insert_payment(payment: NewPayment, conn: &mut SqliteConnection) -> Result<Payment, StorageError> {
    let now = Utc::now();
    let payment: Payment = sqlx::query_as(
        r#"
            INSERT INTO payments (
                order_id,
                buyer_id,
                seller_id,
                proof_ref,
                destination,
                confirmed,
                created_at,
                updated_at,
                confirmed_at
            ) VALUES ($1, $2, $3, $4, $5, FALSE, $6, $6, NULL)
            RETURNING *;
        "#,
    )
    .bind(payment.order_id.as_str())
    .bind(&payment.buyer_id)
    .bind(&payment.seller_id)
    .bind(&payment.proof_ref)
    .bind(payment.destination.as_deref())
    .bind(now)
    .fetch_all(conn)
    .await
    .and_then(single_row)
    .map_err(|e| {
        if is_unique_violation(&e) {
            StorageError::DuplicatePayment(payment.order_id.clone())
        } else {
            StorageError::from(e)
        }
    })?;
    debug!("🗃️ Payment #{} stored for order [{}]", payment.id, payment.order_id);
    Ok(payment)
}

/// Records a payment that is already confirmed, as reported by the payment gateway. An unconfirmed proof the buyer
/// submitted for the same order is replaced by the gateway record. A confirmed payment is left alone and
/// [`StorageError::PaymentAlreadyConfirmed`] is returned.
///
/// The upsert is the first statement, so this is safe to call first thing in a write transaction.
pub async fn upsert_confirmed(payment: NewPayment, conn: &mut SqliteConnection) -> Result<Payment, StorageError> {
    let now = Utc::now();
    let rows: Vec<Payment> = sqlx::query_as(
        r#"
            INSERT INTO payments (
                order_id,
                buyer_id,
                seller_id,
                proof_ref,
                destination,
                confirmed,
                created_at,
                updated_at,
                confirmed_at
            ) VALUES ($1, $2, $3, $4, $5, TRUE, $6, $6, $6)
            ON CONFLICT (order_id) DO UPDATE SET
                proof_ref = excluded.proof_ref,
                destination = excluded.destination,
                confirmed = TRUE,
                updated_at = excluded.updated_at,
                confirmed_at = excluded.confirmed_at
            WHERE payments.confirmed = FALSE
            RETURNING *;
        "#,
    )
    .bind(payment.order_id.as_str())
    .bind(&payment.buyer_id)
    .bind(&payment.seller_id)
    .bind(&payment.proof_ref)
    .bind(payment.destination.as_deref())
    .bind(now)
    .fetch_all(&mut *conn)
    .await?;
    match rows.into_iter().next() {
        Some(p) => {
            debug!("🗃️ Confirmed payment #{} recorded for order [{}]", p.id, p.order_id);
            Ok(p)
        },
        None => Err(StorageError::PaymentAlreadyConfirmed(payment.order_id)),
    }
}

pub async fn fetch_payment(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<Payment>, sqlx::Error> {
    let rows: Vec<Payment> =
        sqlx::query_as("SELECT * FROM payments WHERE order_id = $1").bind(order_id.as_str()).fetch_all(conn).await?;
    Ok(rows.into_iter().next())
}

/// Overwrites the proof of an unconfirmed payment.
pub async fn update_proof(
    order_id: &OrderId,
    proof_ref: &str,
    destination: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Payment, StorageError> {
    let payment: Option<Payment> = sqlx::query_as(
        "UPDATE payments SET proof_ref = $1, destination = $2, updated_at = $3 WHERE order_id = $4 AND confirmed = \
         FALSE RETURNING *",
    )
    .bind(proof_ref)
    .bind(destination)
    .bind(Utc::now())
    .bind(order_id.as_str())
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .next();
    match payment {
        Some(p) => Ok(p),
        None => Err(unconfirmed_payment_missing(order_id, conn).await?),
    }
}

/// Marks the payment for the order as confirmed. Only an unconfirmed payment can be confirmed.
///
/// The guarded `UPDATE` is the first statement, so this is safe to call first thing in a write transaction.
pub async fn confirm(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Payment, StorageError> {
    let now = Utc::now();
    let payment: Option<Payment> = sqlx::query_as(
        "UPDATE payments SET confirmed = TRUE, confirmed_at = $1, updated_at = $1 WHERE order_id = $2 AND confirmed \
         = FALSE RETURNING *",
    )
    .bind(now)
    .bind(order_id.as_str())
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .next();
    match payment {
        Some(p) => Ok(p),
        None => Err(unconfirmed_payment_missing(order_id, conn).await?),
    }
}

/// Works out why a guarded payment update matched no rows.
async fn unconfirmed_payment_missing(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<StorageError, sqlx::Error> {
    let err = match fetch_payment(order_id, conn).await? {
        Some(_) => StorageError::PaymentAlreadyConfirmed(order_id.clone()),
        None => StorageError::PaymentNotFound(order_id.clone()),
    };
    Ok(err)
}
