#![allow(dead_code)]

use std::sync::Arc;

use chrono::Duration;
use log::*;
use marketplace_engine::{
    db_types::{NewProduct, NewVariant, Order, OrderId, Product, ShippingAddress, VariantKey},
    events::EventProducers,
    order_objects::{OrderItemRequest, OrderRequest},
    test_utils::prepare_env::{drop_database, prepare_test_env, random_db_path},
    CatalogApi,
    ComplaintApi,
    MarketplaceDatabase,
    OrderFlowApi,
    OrderQueryApi,
    PaymentApi,
    SqliteDatabase,
    VariantLedger,
};
use mkp_common::Money;

pub const SELLER: &str = "seller-bob";
pub const BUYER: &str = "buyer-alice";
pub const OTHER_BUYER: &str = "buyer-carol";

/// A freshly migrated database, a ledger and every API, wired up the way the server does it.
pub struct Harness {
    pub url: String,
    pub db: SqliteDatabase,
    pub ledger: Arc<VariantLedger>,
    pub catalog: CatalogApi<SqliteDatabase>,
    pub orders: OrderFlowApi<SqliteDatabase>,
    pub payments: PaymentApi<SqliteDatabase>,
    pub complaints: ComplaintApi<SqliteDatabase>,
    pub queries: OrderQueryApi<SqliteDatabase>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_options(Duration::minutes(30), EventProducers::default()).await
    }

    pub async fn with_options(hold_window: Duration, producers: EventProducers) -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 10).await.expect("Error creating database");
        let ledger = Arc::new(VariantLedger::new(hold_window));
        Self::assemble(url, db, ledger, producers)
    }

    /// Reconnects to an existing database and rebuilds the ledger from it, as a restarted server would.
    pub async fn reopen(url: &str, hold_window: Duration) -> Self {
        let db = SqliteDatabase::new_with_url(url, 10).await.expect("Error reconnecting to database");
        let variants = db.fetch_all_variants().await.expect("Error fetching variants");
        let held = db.fetch_held_reservations().await.expect("Error fetching reservations");
        let ledger = Arc::new(VariantLedger::restore(variants, held, hold_window).expect("Error restoring ledger"));
        Self::assemble(url.to_string(), db, ledger, EventProducers::default())
    }

    fn assemble(url: String, db: SqliteDatabase, ledger: Arc<VariantLedger>, producers: EventProducers) -> Self {
        Self {
            catalog: CatalogApi::new(db.clone(), Arc::clone(&ledger)),
            orders: OrderFlowApi::new(db.clone(), Arc::clone(&ledger), producers.clone()),
            payments: PaymentApi::new(db.clone(), Arc::clone(&ledger), producers.clone()),
            complaints: ComplaintApi::new(db.clone(), Arc::clone(&ledger), producers),
            queries: OrderQueryApi::new(db.clone()),
            url,
            db,
            ledger,
        }
    }

    /// Lists a product with a single Black/M variant.
    pub async fn hoodie(&self, stock: u32) -> Product {
        self.product("Hoodie", 2999, &[("Black", "M", stock)]).await
    }

    pub async fn product(&self, name: &str, price_cents: i64, variants: &[(&str, &str, u32)]) -> Product {
        let product = NewProduct {
            name: name.to_string(),
            price: Money::from_cents(price_cents),
            variants: variants
                .iter()
                .map(|(color, size, stock)| NewVariant { color: color.to_string(), size: size.to_string(), stock: *stock })
                .collect(),
        };
        self.catalog.add_product(SELLER, product).await.expect("Error adding product")
    }

    pub async fn place(&self, buyer: &str, product: &Product, quantity: i64) -> Order {
        let request = order_request(buyer, product, quantity);
        self.orders.place_order(buyer, &request).await.expect("Error placing order")
    }

    /// Places, pays for and confirms an order.
    pub async fn confirmed_order(&self, product: &Product, quantity: i64) -> Order {
        let order = self.place(BUYER, product, quantity).await;
        self.payments.submit_proof(&order.order_id, BUYER, "receipt-001.png", None).await.expect("Error submitting proof");
        self.payments.confirm(&order.order_id, SELLER).await.expect("Error confirming payment")
    }

    pub async fn delivered_order(&self, product: &Product, quantity: i64) -> Order {
        let order = self.confirmed_order(product, quantity).await;
        let id = &order.order_id;
        self.orders.mark_shipped(id, SELLER, marketplace_engine::db_types::Role::Seller).await.expect("Error shipping");
        self.orders.mark_delivered(id, SELLER, marketplace_engine::db_types::Role::Seller).await.expect("Error delivering")
    }

    /// `(stock, reserved)` for the product's first variant, from the ledger.
    pub async fn level(&self, product: &Product) -> (u32, u32) {
        let key = &product.variants[0].key;
        let v = self.ledger.level(key).await.expect("Variant missing from ledger");
        (v.stock, v.reserved)
    }

    /// `(stock, reserved)` for the variant, as persisted in the database.
    pub async fn stored_level(&self, key: &VariantKey) -> (u32, u32) {
        let variants = self.db.fetch_all_variants().await.expect("Error fetching variants");
        let v = variants.into_iter().find(|v| &v.key == key).expect("Variant missing from database");
        (v.stock, v.reserved)
    }

    pub async fn order(&self, id: &OrderId) -> Order {
        self.queries.fetch_order(id).await.expect("Error fetching order").expect("Order does not exist")
    }

    pub async fn tear_down(mut self) {
        if let Err(e) = self.db.close().await {
            error!("🚀️ Failed to close database: {e}");
        }
        drop_database(&self.url).await;
    }
}

/// A well-formed order for `quantity` units of the product's first variant, with correct arithmetic.
pub fn order_request(buyer: &str, product: &Product, quantity: i64) -> OrderRequest {
    let variant = &product.variants[0].key;
    let items_price = Money::from_cents(product.price.cents() * quantity);
    let shipping = Money::from_cents(500);
    let tax = Money::from_cents(150);
    OrderRequest {
        customer: buyer.to_string(),
        shipping_address: ShippingAddress {
            address: "1 Main St".into(),
            city: "Springfield".into(),
            postal_code: "12345".into(),
            country: "US".into(),
        },
        order_items: vec![OrderItemRequest::new(
            product.id.as_str(),
            &variant.color,
            &variant.size,
            quantity,
            product.price,
        )],
        payment_method: "paypal".into(),
        shipping_method: "standard".into(),
        items_price: Some(items_price),
        shipping_price: Some(shipping),
        tax_price: Some(tax),
        total_price: Some(Money::from_cents(items_price.cents() + shipping.cents() + tax.cents())),
    }
}
