use std::{sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;
use marketplace_engine::{
    events::{EventHandlers, EventProducers},
    CatalogApi,
    ComplaintApi,
    MarketplaceDatabase,
    OrderFlowApi,
    OrderQueryApi,
    PaymentApi,
    SqliteDatabase,
    VariantLedger,
};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    expiry_worker::start_expiry_worker,
    notifications::logging_hooks,
    routes::{
        health,
        AddProductRoute,
        CancelOrderRoute,
        ComplaintByIdRoute,
        ConfirmPaymentRoute,
        DeliverOrderRoute,
        FileComplaintRoute,
        GatewayResultRoute,
        MyOrdersRoute,
        OrderByIdRoute,
        PlaceOrderRoute,
        ProductByIdRoute,
        RejectComplaintRoute,
        RejectPaymentRoute,
        ResolveComplaintRoute,
        ReviewComplaintRoute,
        ShipOrderRoute,
        SubmitPaymentProofRoute,
        UpdatePaymentProofRoute,
    },
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, config.db_max_connections).await?;
    if config.run_migrations {
        db.run_migrations().await?;
    }
    let ledger = Arc::new(restore_ledger(&db, config.hold_window).await?);
    let handlers = EventHandlers::new(config.event_buffer_size, logging_hooks());
    let producers = handlers.producers();
    handlers.start_handlers();
    // The worker runs for the lifetime of the process
    let _worker = start_expiry_worker(db.clone(), Arc::clone(&ledger), producers.clone(), config.sweep_interval);
    let srv = create_server_instance(config, db, ledger, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

/// Rebuilds the in-memory stock ledger from the variant levels and held reservations in the database.
pub async fn restore_ledger<B: MarketplaceDatabase>(
    db: &B,
    hold_window: chrono::Duration,
) -> Result<VariantLedger, ServerError> {
    let variants = db.fetch_all_variants().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let held = db.fetch_held_reservations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    VariantLedger::restore(variants, held, hold_window).map_err(|e| {
        error!("🚀️ Stored stock levels are inconsistent. {e}");
        ServerError::InitializeError(e.to_string())
    })
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    ledger: Arc<VariantLedger>,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let srv = HttpServer::new(move || {
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("mkp::access_log"))
            .configure(|cfg| register_apis(cfg, db.clone(), Arc::clone(&ledger), producers.clone()))
            .configure(register_routes::<SqliteDatabase>)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

/// Makes the engine APIs available to the route handlers. Every API shares the same ledger.
pub fn register_apis<B>(cfg: &mut web::ServiceConfig, db: B, ledger: Arc<VariantLedger>, producers: EventProducers)
where B: MarketplaceDatabase + 'static {
    let catalog_api = CatalogApi::new(db.clone(), Arc::clone(&ledger));
    let orders_api = OrderFlowApi::new(db.clone(), Arc::clone(&ledger), producers.clone());
    let payments_api = PaymentApi::new(db.clone(), Arc::clone(&ledger), producers.clone());
    let complaints_api = ComplaintApi::new(db.clone(), ledger, producers);
    let query_api = OrderQueryApi::new(db);
    cfg.app_data(web::Data::new(catalog_api))
        .app_data(web::Data::new(orders_api))
        .app_data(web::Data::new(payments_api))
        .app_data(web::Data::new(complaints_api))
        .app_data(web::Data::new(query_api));
}

pub fn register_routes<B>(cfg: &mut web::ServiceConfig)
where B: MarketplaceDatabase + 'static {
    cfg.service(health)
        .service(AddProductRoute::<B>::new())
        .service(ProductByIdRoute::<B>::new())
        .service(PlaceOrderRoute::<B>::new())
        .service(OrderByIdRoute::<B>::new())
        .service(MyOrdersRoute::<B>::new())
        .service(CancelOrderRoute::<B>::new())
        .service(ShipOrderRoute::<B>::new())
        .service(DeliverOrderRoute::<B>::new())
        .service(GatewayResultRoute::<B>::new())
        .service(SubmitPaymentProofRoute::<B>::new())
        .service(UpdatePaymentProofRoute::<B>::new())
        .service(ConfirmPaymentRoute::<B>::new())
        .service(RejectPaymentRoute::<B>::new())
        .service(FileComplaintRoute::<B>::new())
        .service(ComplaintByIdRoute::<B>::new())
        .service(ReviewComplaintRoute::<B>::new())
        .service(ResolveComplaintRoute::<B>::new())
        .service(RejectComplaintRoute::<B>::new());
}
