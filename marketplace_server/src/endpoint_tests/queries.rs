use actix_http::Request;
use actix_web::{
    body::MessageBody,
    dev::{Service, ServiceResponse},
    http::StatusCode,
    test,
    test::TestRequest,
    web,
    App,
};
use chrono::{TimeZone, Utc};
use marketplace_engine::{
    db_types::{
        Complaint,
        ComplaintStatus,
        ComplaintType,
        Order,
        OrderId,
        OrderItem,
        OrderStatusType,
        PaymentMethod,
        ProductId,
        ReservationId,
        ShippingAddress,
        ShippingMethod,
        VariantKey,
    },
    traits::StorageError,
    OrderQueryApi,
};
use mkp_common::Money;

use super::{
    helpers::{get_as, send, ADMIN, BUYER, GATEWAY, OTHER_BUYER, SELLER},
    mocks::MockOrderStore,
};
use crate::routes::{ComplaintByIdRoute, MyOrdersRoute, OrderByIdRoute};

async fn query_app(
    store: MockOrderStore,
) -> impl Service<Request, Response = ServiceResponse<impl MessageBody>, Error = actix_web::Error> {
    let _ = env_logger::try_init();
    let app = App::new()
        .app_data(web::Data::new(OrderQueryApi::new(store)))
        .service(OrderByIdRoute::<MockOrderStore>::new())
        .service(MyOrdersRoute::<MockOrderStore>::new())
        .service(ComplaintByIdRoute::<MockOrderStore>::new());
    test::init_service(app).await
}

fn store_with_order() -> MockOrderStore {
    let mut store = MockOrderStore::new();
    store.expect_fetch_order().returning(|id| Ok((id.as_str() == "ord-0001").then(order)));
    store
}

#[actix_web::test]
async fn fetch_order_without_identity() {
    let app = query_app(MockOrderStore::new()).await;
    let (status, body) = send(&app, TestRequest::get().uri("/order/ord-0001").to_request()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().contains("x-user-id"));
}

#[actix_web::test]
async fn fetch_order_with_unknown_role() {
    let app = query_app(MockOrderStore::new()).await;
    let (status, _) = get_as(&app, "/order/ord-0001", BUYER, "owner").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn order_parties_can_view_order() {
    let app = query_app(store_with_order()).await;
    let (status, body) = get_as(&app, "/order/ord-0001", BUYER, "buyer").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["orderId"], "ord-0001");
    assert_eq!(body["status"], "pending_payment");
    assert_eq!(body["totalPrice"], 66.48);
    assert_eq!(body["items"][0]["color"], "Black");
    let (status, _) = get_as(&app, "/order/ord-0001", SELLER, "seller").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = get_as(&app, "/order/ord-0001", ADMIN, "admin").await;
    assert_eq!(status, StatusCode::OK);
}

#[actix_web::test]
async fn strangers_cannot_view_order() {
    let app = query_app(store_with_order()).await;
    let (status, _) = get_as(&app, "/order/ord-0001", OTHER_BUYER, "buyer").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    // The buyer's id, but acting as a seller
    let (status, _) = get_as(&app, "/order/ord-0001", BUYER, "seller").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = get_as(&app, "/order/ord-0001", GATEWAY, "gateway").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn unknown_order() {
    let app = query_app(store_with_order()).await;
    let (status, body) = get_as(&app, "/order/ord-9999", ADMIN, "admin").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("ord-9999"));
}

#[actix_web::test]
async fn storage_failure_is_a_server_error() {
    let mut store = MockOrderStore::new();
    store.expect_fetch_order().returning(|_| Err(StorageError::DatabaseError("database is locked".into())));
    let app = query_app(store).await;
    let (status, _) = get_as(&app, "/order/ord-0001", BUYER, "buyer").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[actix_web::test]
async fn orders_are_listed_by_role() {
    let mut store = MockOrderStore::new();
    store
        .expect_search_orders()
        .withf(|q| q.buyer_id.as_deref() == Some(BUYER) && q.seller_id.is_none())
        .times(1)
        .returning(|_| Ok(vec![order()]));
    store
        .expect_search_orders()
        .withf(|q| q.seller_id.as_deref() == Some(SELLER) && q.buyer_id.is_none())
        .times(1)
        .returning(|_| Ok(vec![order(), order()]));
    store.expect_search_orders().withf(|q| q.is_empty()).times(1).returning(|_| Ok(vec![order(), order(), order()]));
    let app = query_app(store).await;

    let (status, body) = get_as(&app, "/orders", BUYER, "buyer").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    let (_, body) = get_as(&app, "/orders", SELLER, "seller").await;
    assert_eq!(body.as_array().unwrap().len(), 2);
    let (_, body) = get_as(&app, "/orders", ADMIN, "admin").await;
    assert_eq!(body.as_array().unwrap().len(), 3);
    let (status, _) = get_as(&app, "/orders", GATEWAY, "gateway").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn complaint_visibility() {
    let mut store = MockOrderStore::new();
    store.expect_fetch_complaint().returning(|id| Ok((id == 7).then(complaint)));
    let app = query_app(store).await;

    let (status, body) = get_as(&app, "/complaint/7", BUYER, "buyer").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["complaintType"], "defective");
    assert_eq!(body["status"], "pending");
    let (status, _) = get_as(&app, "/complaint/7", ADMIN, "admin").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = get_as(&app, "/complaint/7", OTHER_BUYER, "buyer").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = get_as(&app, "/complaint/8", ADMIN, "admin").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

fn order() -> Order {
    let created = Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap();
    Order {
        id: 1,
        order_id: OrderId::from("ord-0001"),
        buyer_id: BUYER.to_string(),
        seller_id: SELLER.to_string(),
        items: vec![OrderItem {
            key: VariantKey::new("prd-hoodie", "Black", "M"),
            quantity: 2,
            unit_price: Money::from_cents(2999),
        }],
        shipping_address: ShippingAddress {
            address: "1 Main Road".into(),
            city: "Cape Town".into(),
            postal_code: "8001".into(),
            country: "South Africa".into(),
        },
        payment_method: PaymentMethod::Paypal,
        shipping_method: ShippingMethod::Standard,
        items_price: Money::from_cents(5998),
        shipping_price: Money::from_cents(500),
        tax_price: Money::from_cents(150),
        total_price: Money::from_cents(6648),
        status: OrderStatusType::PendingPayment,
        reservation_id: ReservationId::from("rsv-0001"),
        cancel_reason: None,
        refund_flagged: false,
        gateway_txid: None,
        created_at: created,
        updated_at: created,
    }
}

fn complaint() -> Complaint {
    let created = Utc.with_ymd_and_hms(2024, 5, 9, 8, 0, 0).unwrap();
    Complaint {
        id: 7,
        user_id: BUYER.to_string(),
        product_id: ProductId::from("prd-hoodie"),
        order_id: OrderId::from("ord-0001"),
        complaint_type: ComplaintType::Defective,
        description: "The zip came off on the first day".into(),
        status: ComplaintStatus::Pending,
        resolution: None,
        resolved_by: None,
        resolved_at: None,
        restock: None,
        created_at: created,
        updated_at: created,
    }
}
