use std::sync::Arc;

use actix_web::{http::StatusCode, test::TestRequest};
use serde_json::json;

use super::helpers::{
    as_user,
    get_as,
    list_hoodie,
    place_order,
    post_as,
    send,
    test_app,
    TestStore,
    ADMIN,
    BUYER,
    GATEWAY,
    OTHER_BUYER,
    SELLER,
};

fn proof_request(method: TestRequest, order_id: &str, user: &str, proof_ref: &str) -> actix_http::Request {
    as_user(method.uri(&format!("/order/{order_id}/payment-proof")), user, "buyer")
        .set_json(json!({ "proofRef": proof_ref, "destination": "FNB 62000000001" }))
        .to_request()
}

#[actix_web::test]
async fn confirm_before_proof_is_not_found() {
    let store = TestStore::new().await;
    let app = test_app(store.db.clone(), Arc::clone(&store.ledger)).await;
    let product_id = list_hoodie(&app, 3).await;
    let order_id = place_order(&app, BUYER, &product_id, 1, "paypal").await;

    let (status, body) = post_as(&app, &format!("/order/{order_id}/confirm-payment"), SELLER, "seller").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("No payment proof"));
    let (_, body) = get_as(&app, &format!("/order/{order_id}"), SELLER, "seller").await;
    assert_eq!(body["status"], "pending_payment");
    store.tear_down().await;
}

#[actix_web::test]
async fn proof_then_confirm() {
    let store = TestStore::new().await;
    let app = test_app(store.db.clone(), Arc::clone(&store.ledger)).await;
    let product_id = list_hoodie(&app, 3).await;
    let order_id = place_order(&app, BUYER, &product_id, 2, "paypal").await;

    let (status, body) = send(&app, proof_request(TestRequest::post(), &order_id, BUYER, "receipt-001.png")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["proofRef"], "receipt-001.png");
    assert_eq!(body["confirmed"], false);
    // A second submission must go through the update route
    let (status, _) = send(&app, proof_request(TestRequest::post(), &order_id, BUYER, "receipt-002.png")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, body) = send(&app, proof_request(TestRequest::put(), &order_id, BUYER, "receipt-002.png")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["proofRef"], "receipt-002.png");

    let (status, _) = post_as(&app, &format!("/order/{order_id}/confirm-payment"), BUYER, "buyer").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = post_as(&app, &format!("/order/{order_id}/confirm-payment"), SELLER, "seller").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "confirmed");
    let (status, _) = post_as(&app, &format!("/order/{order_id}/confirm-payment"), SELLER, "seller").await;
    assert_eq!(status, StatusCode::CONFLICT);
    // Confirmed proofs cannot be replaced
    let (status, _) = send(&app, proof_request(TestRequest::put(), &order_id, BUYER, "receipt-003.png")).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Committed: stock is sold, nothing is reserved
    let (_, body) = get_as(&app, &format!("/product/{product_id}"), BUYER, "buyer").await;
    assert_eq!(body["variants"][0]["stock"], 1);
    assert_eq!(body["variants"][0]["reserved"], 0);
    store.tear_down().await;
}

#[actix_web::test]
async fn only_the_buyer_submits_proof() {
    let store = TestStore::new().await;
    let app = test_app(store.db.clone(), Arc::clone(&store.ledger)).await;
    let product_id = list_hoodie(&app, 3).await;
    let order_id = place_order(&app, BUYER, &product_id, 1, "paypal").await;
    let (status, _) = send(&app, proof_request(TestRequest::post(), &order_id, OTHER_BUYER, "receipt-001.png")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = send(&app, proof_request(TestRequest::post(), &order_id, BUYER, "  ")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "proofRef");
    store.tear_down().await;
}

#[actix_web::test]
async fn rejected_payment_cancels_the_order() {
    let store = TestStore::new().await;
    let app = test_app(store.db.clone(), Arc::clone(&store.ledger)).await;
    let product_id = list_hoodie(&app, 3).await;
    let order_id = place_order(&app, BUYER, &product_id, 3, "paypal").await;
    let (status, _) = send(&app, proof_request(TestRequest::post(), &order_id, BUYER, "receipt-001.png")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post_as(&app, &format!("/order/{order_id}/reject-payment"), SELLER, "seller").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");
    let (_, body) = get_as(&app, &format!("/order/{order_id}"), ADMIN, "admin").await;
    assert_eq!(body["cancelReason"], "payment_rejected");
    let (_, body) = get_as(&app, &format!("/product/{product_id}"), BUYER, "buyer").await;
    assert_eq!(body["variants"][0]["reserved"], 0);
    assert_eq!(body["variants"][0]["stock"], 3);
    // The stock is available again
    place_order(&app, OTHER_BUYER, &product_id, 3, "paypal").await;
    store.tear_down().await;
}

#[actix_web::test]
async fn gateway_reports() {
    let store = TestStore::new().await;
    let app = test_app(store.db.clone(), Arc::clone(&store.ledger)).await;
    let product_id = list_hoodie(&app, 4).await;
    let paid = place_order(&app, BUYER, &product_id, 1, "credit-card").await;
    let failed = place_order(&app, BUYER, &product_id, 1, "credit-card").await;
    let paypal = place_order(&app, BUYER, &product_id, 1, "paypal").await;

    let report = |order_id: &str, user: &str, role: &str, body: serde_json::Value| {
        as_user(TestRequest::post().uri(&format!("/order/{order_id}/gateway-result")), user, role)
            .set_json(body)
            .to_request()
    };
    let success = json!({ "succeeded": true, "transactionId": "ch_3PAbc" });

    let (status, _) = send(&app, report(&paid, BUYER, "buyer", success.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = send(&app, report(&paid, GATEWAY, "gateway", success.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "confirmed");
    let (_, body) = get_as(&app, &format!("/order/{paid}"), BUYER, "buyer").await;
    assert_eq!(body["gatewayTxid"], "ch_3PAbc");

    let failure = json!({ "succeeded": false, "message": "card declined" });
    let (status, body) = send(&app, report(&failed, GATEWAY, "gateway", failure)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");

    let (status, body) = send(&app, report(&paypal, GATEWAY, "gateway", success)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "paymentMethod");

    let (_, body) = get_as(&app, &format!("/product/{product_id}"), BUYER, "buyer").await;
    assert_eq!(body["variants"][0]["stock"], 3);
    assert_eq!(body["variants"][0]["reserved"], 1);
    store.tear_down().await;
}

#[actix_web::test]
async fn gateway_success_replaces_a_buyer_proof() {
    let store = TestStore::new().await;
    let app = test_app(store.db.clone(), Arc::clone(&store.ledger)).await;
    let product_id = list_hoodie(&app, 4).await;
    let order_id = place_order(&app, BUYER, &product_id, 1, "credit-card").await;
    let (status, _) = send(&app, proof_request(TestRequest::post(), &order_id, BUYER, "screenshot.png")).await;
    assert_eq!(status, StatusCode::OK);

    let req = as_user(TestRequest::post().uri(&format!("/order/{order_id}/gateway-result")), GATEWAY, "gateway")
        .set_json(json!({ "succeeded": true, "transactionId": "ch_9Zx" }));
    let (status, body) = send(&app, req.to_request()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "confirmed");
    let (_, body) = get_as(&app, &format!("/product/{product_id}"), BUYER, "buyer").await;
    assert_eq!(body["variants"][0]["stock"], 3);
    assert_eq!(body["variants"][0]["reserved"], 0);
    store.tear_down().await;
}
