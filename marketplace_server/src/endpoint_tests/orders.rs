use std::sync::Arc;

use actix_web::{http::StatusCode, test::TestRequest};
use futures::future::join;
use marketplace_engine::db_types::{ProductId, VariantKey};
use serde_json::json;

use super::helpers::{
    as_user,
    get_as,
    list_hoodie,
    order_json,
    place_order,
    post_as,
    send,
    test_app,
    TestStore,
    ADMIN,
    BUYER,
    OTHER_BUYER,
    SELLER,
};

#[actix_web::test]
async fn health_needs_no_identity() {
    let store = TestStore::new().await;
    let app = test_app(store.db.clone(), Arc::clone(&store.ledger)).await;
    let (status, body) = send(&app, TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "👍️\n");
    store.tear_down().await;
}

#[actix_web::test]
async fn place_order_and_view_it() {
    let store = TestStore::new().await;
    let app = test_app(store.db.clone(), Arc::clone(&store.ledger)).await;
    let product_id = list_hoodie(&app, 5).await;

    let req = as_user(TestRequest::post().uri("/order"), BUYER, "buyer").set_json(order_json(BUYER, &product_id, 2, "paypal"));
    let (status, body) = send(&app, req.to_request()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "pending_payment");
    let order_id = body["orderId"].as_str().unwrap().to_string();

    let (status, body) = get_as(&app, &format!("/order/{order_id}"), BUYER, "buyer").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["buyerId"], BUYER);
    assert_eq!(body["sellerId"], SELLER);
    assert_eq!(body["totalPrice"], 66.48);
    let (status, _) = get_as(&app, &format!("/order/{order_id}"), OTHER_BUYER, "buyer").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The product shows the live reservation
    let (status, body) = get_as(&app, &format!("/product/{product_id}"), OTHER_BUYER, "buyer").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["variants"][0]["stock"], 5);
    assert_eq!(body["variants"][0]["reserved"], 2);

    let (status, body) = get_as(&app, "/orders", BUYER, "buyer").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    let (_, body) = get_as(&app, "/orders", OTHER_BUYER, "buyer").await;
    assert!(body.as_array().unwrap().is_empty());
    store.tear_down().await;
}

#[actix_web::test]
async fn only_buyers_place_orders() {
    let store = TestStore::new().await;
    let app = test_app(store.db.clone(), Arc::clone(&store.ledger)).await;
    let product_id = list_hoodie(&app, 5).await;
    let body = order_json(SELLER, &product_id, 1, "paypal");
    let req = as_user(TestRequest::post().uri("/order"), SELLER, "seller").set_json(body.clone());
    let (status, _) = send(&app, req.to_request()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let req = TestRequest::post().uri("/order").set_json(body);
    let (status, _) = send(&app, req.to_request()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    store.tear_down().await;
}

#[actix_web::test]
async fn tampered_total_is_rejected() {
    let store = TestStore::new().await;
    let app = test_app(store.db.clone(), Arc::clone(&store.ledger)).await;
    let product_id = list_hoodie(&app, 5).await;
    let mut body = order_json(BUYER, &product_id, 2, "paypal");
    body["totalPrice"] = json!(1.00);
    let req = as_user(TestRequest::post().uri("/order"), BUYER, "buyer").set_json(body);
    let (status, body) = send(&app, req.to_request()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let errors = body["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["field"], "totalPrice");

    // Nothing was reserved
    let key = VariantKey::new(ProductId::from(product_id.as_str()), "Black", "M");
    let level = store.ledger.level(&key).await.unwrap();
    assert_eq!((level.stock, level.reserved), (5, 0));
    let (_, body) = get_as(&app, "/orders", BUYER, "buyer").await;
    assert!(body.as_array().unwrap().is_empty());
    store.tear_down().await;
}

#[actix_web::test]
async fn unit_price_must_match_the_listing() {
    let store = TestStore::new().await;
    let app = test_app(store.db.clone(), Arc::clone(&store.ledger)).await;
    let product_id = list_hoodie(&app, 5).await;
    let mut body = order_json(BUYER, &product_id, 2, "paypal");
    body["orderItems"][0]["price"] = json!(0.01);
    body["itemsPrice"] = json!(0.02);
    body["totalPrice"] = json!(6.52);
    let req = as_user(TestRequest::post().uri("/order"), BUYER, "buyer").set_json(body);
    let (status, body) = send(&app, req.to_request()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "orderItems[0].price");
    let (_, body) = get_as(&app, &format!("/product/{product_id}"), BUYER, "buyer").await;
    assert_eq!(body["variants"][0]["reserved"], 0);
    store.tear_down().await;
}

#[actix_web::test]
async fn every_missing_field_is_reported() {
    let store = TestStore::new().await;
    let app = test_app(store.db.clone(), Arc::clone(&store.ledger)).await;
    let req = as_user(TestRequest::post().uri("/order"), BUYER, "buyer").set_json(json!({ "customer": BUYER }));
    let (status, body) = send(&app, req.to_request()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let fields = body["errors"].as_array().unwrap().iter().map(|e| e["field"].as_str().unwrap()).collect::<Vec<_>>();
    for field in ["shippingAddress.address", "shippingAddress.city", "orderItems", "totalPrice"] {
        assert!(fields.contains(&field), "{field} missing from {fields:?}");
    }
    store.tear_down().await;
}

#[actix_web::test]
async fn insufficient_stock_lists_the_variant() {
    let store = TestStore::new().await;
    let app = test_app(store.db.clone(), Arc::clone(&store.ledger)).await;
    let product_id = list_hoodie(&app, 1).await;
    let req = as_user(TestRequest::post().uri("/order"), BUYER, "buyer").set_json(order_json(BUYER, &product_id, 2, "paypal"));
    let (status, body) = send(&app, req.to_request()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let short = body["insufficientStock"].as_array().unwrap();
    assert_eq!(short.len(), 1);
    assert_eq!(short[0]["productId"], product_id.as_str());
    assert_eq!(short[0]["color"], "Black");
    assert_eq!(short[0]["size"], "M");
    store.tear_down().await;
}

#[actix_web::test]
async fn concurrent_orders_for_the_last_units() {
    let store = TestStore::new().await;
    let app = test_app(store.db.clone(), Arc::clone(&store.ledger)).await;
    let product_id = list_hoodie(&app, 2).await;
    let first = as_user(TestRequest::post().uri("/order"), BUYER, "buyer")
        .set_json(order_json(BUYER, &product_id, 2, "paypal"))
        .to_request();
    let second = as_user(TestRequest::post().uri("/order"), OTHER_BUYER, "buyer")
        .set_json(order_json(OTHER_BUYER, &product_id, 2, "paypal"))
        .to_request();
    let ((a, _), (b, _)) = join(send(&app, first), send(&app, second)).await;
    let mut statuses = [a, b];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::CREATED, StatusCode::CONFLICT]);

    let key = VariantKey::new(ProductId::from(product_id.as_str()), "Black", "M");
    let level = store.ledger.level(&key).await.unwrap();
    assert_eq!((level.stock, level.reserved), (2, 2));
    store.tear_down().await;
}

#[actix_web::test]
async fn cancel_releases_stock() {
    let store = TestStore::new().await;
    let app = test_app(store.db.clone(), Arc::clone(&store.ledger)).await;
    let product_id = list_hoodie(&app, 3).await;
    let order_id = place_order(&app, BUYER, &product_id, 2, "paypal").await;

    let (status, _) = post_as(&app, &format!("/order/{order_id}/cancel"), OTHER_BUYER, "buyer").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = post_as(&app, &format!("/order/{order_id}/cancel"), BUYER, "buyer").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");
    let (status, _) = post_as(&app, &format!("/order/{order_id}/cancel"), ADMIN, "admin").await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = get_as(&app, &format!("/order/{order_id}"), BUYER, "buyer").await;
    assert_eq!(body["cancelReason"], "buyer");
    let (_, body) = get_as(&app, &format!("/product/{product_id}"), BUYER, "buyer").await;
    assert_eq!(body["variants"][0]["reserved"], 0);
    assert_eq!(body["variants"][0]["stock"], 3);
    store.tear_down().await;
}

#[actix_web::test]
async fn shipping_needs_a_confirmed_order() {
    let store = TestStore::new().await;
    let app = test_app(store.db.clone(), Arc::clone(&store.ledger)).await;
    let product_id = list_hoodie(&app, 3).await;
    let order_id = place_order(&app, BUYER, &product_id, 1, "paypal").await;

    let (status, _) = post_as(&app, &format!("/order/{order_id}/ship"), BUYER, "buyer").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = post_as(&app, &format!("/order/{order_id}/ship"), SELLER, "seller").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("pending_payment"));
    let (status, _) = post_as(&app, "/order/ord-missing/ship", ADMIN, "admin").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    store.tear_down().await;
}

#[actix_web::test]
async fn only_sellers_list_products() {
    let store = TestStore::new().await;
    let app = test_app(store.db.clone(), Arc::clone(&store.ledger)).await;
    let req = as_user(TestRequest::post().uri("/product"), BUYER, "buyer").set_json(super::helpers::hoodie_json(3));
    let (status, _) = send(&app, req.to_request()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let req = as_user(TestRequest::post().uri("/product"), SELLER, "seller")
        .set_json(json!({ "name": "", "price": 0, "variants": [] }));
    let (status, body) = send(&app, req.to_request()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"].as_array().unwrap().len(), 3);
    let (status, _) = get_as(&app, "/product/prd-missing", BUYER, "buyer").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    store.tear_down().await;
}
