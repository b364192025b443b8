use std::sync::Arc;

use actix_http::Request;
use actix_web::{
    body::{to_bytes, MessageBody},
    dev::{Service, ServiceResponse},
    http::StatusCode,
    test,
    test::TestRequest,
    App,
};
use log::*;
use marketplace_engine::{
    events::EventProducers,
    test_utils::prepare_env::{drop_database, prepare_test_env, random_db_path},
    MarketplaceDatabase,
    SqliteDatabase,
    VariantLedger,
};
use serde_json::{json, Value};

use crate::server::{register_apis, register_routes};

pub const SELLER: &str = "seller-bob";
pub const BUYER: &str = "buyer-alice";
pub const OTHER_BUYER: &str = "buyer-carol";
pub const ADMIN: &str = "admin-dave";
pub const GATEWAY: &str = "card-gateway";

/// Adds the identity headers for `user` acting as `role`.
pub fn as_user(req: TestRequest, user: &str, role: &str) -> TestRequest {
    req.insert_header(("x-user-id", user)).insert_header(("x-user-role", role))
}

/// Sends a request and returns the status with the body parsed as JSON. Bodies that are not JSON are returned as a
/// JSON string.
///
/// Middleware errors are returned as `Err` by the test service rather than as a response, so they are rendered here
/// the same way the server would render them.
pub async fn send<S, B>(app: &S, req: Request) -> (StatusCode, Value)
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let (status, bytes) = match test::try_call_service(app, req).await {
        Ok(res) => {
            let status = res.status();
            (status, test::read_body(res).await)
        },
        Err(e) => {
            let res = e.error_response();
            let status = res.status();
            (status, to_bytes(res.into_body()).await.unwrap_or_default())
        },
    };
    let body = serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()));
    debug!("🚀️ Response: {status} {body}");
    (status, body)
}

/// A throw-away SQLite database with a ledger, for endpoint tests that exercise the full engine.
pub struct TestStore {
    pub url: String,
    pub db: SqliteDatabase,
    pub ledger: Arc<VariantLedger>,
}

impl TestStore {
    pub async fn new() -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 10).await.expect("Error creating database");
        Self { url, db, ledger: Arc::new(VariantLedger::default()) }
    }

    pub async fn tear_down(mut self) {
        if let Err(e) = self.db.close().await {
            error!("🚀️ Failed to close database: {e}");
        }
        drop_database(&self.url).await;
    }
}

/// Builds the full application on top of `db` and `ledger`, with no event hooks.
pub async fn test_app(
    db: SqliteDatabase,
    ledger: Arc<VariantLedger>,
) -> impl Service<Request, Response = ServiceResponse<impl MessageBody>, Error = actix_web::Error> {
    let app = App::new()
        .configure(move |cfg| register_apis(cfg, db, ledger, EventProducers::default()))
        .configure(register_routes::<SqliteDatabase>);
    test::init_service(app).await
}

/// The JSON body for a product with a single Black/M variant.
pub fn hoodie_json(stock: u32) -> Value {
    json!({
        "name": "Hoodie",
        "price": 29.99,
        "variants": [{ "color": "Black", "size": "M", "stock": stock }]
    })
}

/// The JSON body for a well-formed order of `quantity` Black/M hoodies at 29.99 each.
pub fn order_json(buyer: &str, product_id: &str, quantity: i64, payment_method: &str) -> Value {
    let items_cents = 2999 * quantity;
    let total_cents = items_cents + 500 + 150;
    json!({
        "customer": buyer,
        "shippingAddress": {
            "address": "1 Main Road",
            "city": "Cape Town",
            "postalCode": "8001",
            "country": "South Africa"
        },
        "orderItems": [{
            "product": product_id,
            "color": "Black",
            "size": "M",
            "quantity": quantity,
            "price": 29.99
        }],
        "paymentMethod": payment_method,
        "shippingMethod": "standard",
        "itemsPrice": cents(items_cents),
        "shippingPrice": 5.00,
        "taxPrice": 1.50,
        "totalPrice": cents(total_cents)
    })
}

fn cents(c: i64) -> f64 {
    c as f64 / 100.0
}

/// Lists a hoodie as [`SELLER`] and returns its product id.
pub async fn list_hoodie<S, B>(app: &S, stock: u32) -> String
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let req = as_user(TestRequest::post().uri("/product"), SELLER, "seller").set_json(hoodie_json(stock));
    let (status, body) = send(app, req.to_request()).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().expect("Product has no id").to_string()
}

/// Places an order as `buyer` and returns its order id.
pub async fn place_order<S, B>(app: &S, buyer: &str, product_id: &str, quantity: i64, payment_method: &str) -> String
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let req = as_user(TestRequest::post().uri("/order"), buyer, "buyer")
        .set_json(order_json(buyer, product_id, quantity, payment_method));
    let (status, body) = send(app, req.to_request()).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["orderId"].as_str().expect("Response has no orderId").to_string()
}

/// Sends a body-less POST to `path` as `user`.
pub async fn post_as<S, B>(app: &S, path: &str, user: &str, role: &str) -> (StatusCode, Value)
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    send(app, as_user(TestRequest::post().uri(path), user, role).to_request()).await
}

pub async fn get_as<S, B>(app: &S, path: &str, user: &str, role: &str) -> (StatusCode, Value)
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    send(app, as_user(TestRequest::get().uri(path), user, role).to_request()).await
}

/// Places an order and takes it through payment, shipping and delivery.
pub async fn delivered_order<S, B>(app: &S, product_id: &str, quantity: i64) -> String
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let order_id = place_order(app, BUYER, product_id, quantity, "paypal").await;
    let proof = json!({ "proofRef": "receipt-001.png" });
    let req = as_user(TestRequest::post().uri(&format!("/order/{order_id}/payment-proof")), BUYER, "buyer")
        .set_json(proof);
    let (status, _) = send(app, req.to_request()).await;
    assert_eq!(status, StatusCode::OK);
    for step in ["confirm-payment", "ship", "deliver"] {
        let (status, body) = post_as(app, &format!("/order/{order_id}/{step}"), SELLER, "seller").await;
        assert_eq!(status, StatusCode::OK, "{step}: {body}");
    }
    order_id
}
