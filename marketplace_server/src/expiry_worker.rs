use std::{sync::Arc, time::Duration};

use log::*;
use marketplace_engine::{db_types::Order, events::EventProducers, OrderFlowApi, SqliteDatabase, VariantLedger};
use tokio::task::JoinHandle;

/// Starts the reservation expiry worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Every `interval`, reservations that have been held for longer than the ledger's hold window are released and their
/// unpaid orders cancelled. The first sweep runs immediately, which picks up anything that went stale while the
/// server was down.
pub fn start_expiry_worker(
    db: SqliteDatabase,
    ledger: Arc<VariantLedger>,
    producers: EventProducers,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        let api = OrderFlowApi::new(db, ledger, producers);
        info!("🕰️ Reservation expiry worker started. Sweeping every {}s", interval.as_secs());
        loop {
            timer.tick().await;
            trace!("🕰️ Running reservation expiry job");
            match api.expire_stale_reservations().await {
                Ok(expired) if expired.is_empty() => trace!("🕰️ No stale reservations"),
                Ok(expired) => {
                    info!("🕰️ {} unpaid orders expired", expired.len());
                    debug!("🕰️ Expired orders: {}", order_list(&expired));
                },
                Err(e) => {
                    error!("🕰️ Error running reservation expiry job: {e}");
                },
            }
        }
    })
}

fn order_list(orders: &[Order]) -> String {
    orders
        .iter()
        .map(|o| format!("[{}] order_id: {} buyer: {}", o.id, o.order_id, o.buyer_id))
        .collect::<Vec<String>>()
        .join(", ")
}
