use std::sync::Arc;

use actix_web::{http::StatusCode, test::TestRequest};
use serde_json::{json, Value};

use super::helpers::{
    as_user,
    delivered_order,
    get_as,
    list_hoodie,
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

fn complaint_json(order_id: &str, product_id: &str) -> Value {
    json!({
        "orderId": order_id,
        "productId": product_id,
        "complaintType": "defective",
        "description": "The zip broke the first time I used it."
    })
}

#[actix_web::test]
async fn resolved_return_goes_back_on_sale() {
    let store = TestStore::new().await;
    let app = test_app(store.db.clone(), Arc::clone(&store.ledger)).await;
    let product_id = list_hoodie(&app, 5).await;
    let order_id = delivered_order(&app, &product_id, 2).await;

    let req = as_user(TestRequest::post().uri("/complaint"), BUYER, "buyer").set_json(complaint_json(&order_id, &product_id));
    let (status, body) = send(&app, req.to_request()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["userId"], BUYER);
    let id = body["id"].as_i64().unwrap();

    let (status, body) = post_as(&app, &format!("/complaint/{id}/review"), ADMIN, "admin").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "in_review");

    let resolve = json!({
        "resolution": "Refunded one unit, returned to stock",
        "restock": { "color": "Black", "size": "M", "quantity": 1 }
    });
    let req = as_user(TestRequest::post().uri(&format!("/complaint/{id}/resolve")), ADMIN, "admin").set_json(resolve);
    let (status, body) = send(&app, req.to_request()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "resolved");
    assert_eq!(body["resolvedBy"], ADMIN);
    assert_eq!(body["restock"]["quantity"], 1);

    let (_, body) = get_as(&app, &format!("/product/{product_id}"), BUYER, "buyer").await;
    assert_eq!(body["variants"][0]["stock"], 4);
    assert_eq!(body["variants"][0]["reserved"], 0);
    // The order itself is unaffected
    let (_, body) = get_as(&app, &format!("/order/{order_id}"), BUYER, "buyer").await;
    assert_eq!(body["status"], "delivered");

    let (status, body) = get_as(&app, &format!("/complaint/{id}"), BUYER, "buyer").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resolution"], "Refunded one unit, returned to stock");
    let (status, _) = get_as(&app, &format!("/complaint/{id}"), OTHER_BUYER, "buyer").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    store.tear_down().await;
}

#[actix_web::test]
async fn complaints_need_a_delivered_order() {
    let store = TestStore::new().await;
    let app = test_app(store.db.clone(), Arc::clone(&store.ledger)).await;
    let product_id = list_hoodie(&app, 5).await;
    let order_id = place_order(&app, BUYER, &product_id, 1, "paypal").await;

    let req = as_user(TestRequest::post().uri("/complaint"), BUYER, "buyer").set_json(complaint_json(&order_id, &product_id));
    let (status, body) = send(&app, req.to_request()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "orderId");

    let req = as_user(TestRequest::post().uri("/complaint"), SELLER, "seller").set_json(complaint_json(&order_id, &product_id));
    let (status, _) = send(&app, req.to_request()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    store.tear_down().await;
}

#[actix_web::test]
async fn short_descriptions_are_rejected() {
    let store = TestStore::new().await;
    let app = test_app(store.db.clone(), Arc::clone(&store.ledger)).await;
    let product_id = list_hoodie(&app, 5).await;
    let order_id = delivered_order(&app, &product_id, 1).await;
    let mut body = complaint_json(&order_id, &product_id);
    body["description"] = json!("Broken");
    let req = as_user(TestRequest::post().uri("/complaint"), BUYER, "buyer").set_json(body);
    let (status, body) = send(&app, req.to_request()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "description");
    store.tear_down().await;
}

#[actix_web::test]
async fn rejected_complaints_are_final() {
    let store = TestStore::new().await;
    let app = test_app(store.db.clone(), Arc::clone(&store.ledger)).await;
    let product_id = list_hoodie(&app, 5).await;
    let order_id = delivered_order(&app, &product_id, 1).await;
    let req = as_user(TestRequest::post().uri("/complaint"), BUYER, "buyer").set_json(complaint_json(&order_id, &product_id));
    let (_, body) = send(&app, req.to_request()).await;
    let id = body["id"].as_i64().unwrap();

    let reject = json!({ "resolution": "The item was damaged by the buyer" });
    let req = as_user(TestRequest::post().uri(&format!("/complaint/{id}/reject")), BUYER, "buyer").set_json(reject.clone());
    let (status, _) = send(&app, req.to_request()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let req = as_user(TestRequest::post().uri(&format!("/complaint/{id}/reject")), ADMIN, "admin").set_json(reject);
    let (status, body) = send(&app, req.to_request()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "rejected");

    let resolve = json!({ "resolution": "Changed my mind", "restock": { "color": "Black", "size": "M", "quantity": 1 } });
    let req = as_user(TestRequest::post().uri(&format!("/complaint/{id}/resolve")), ADMIN, "admin").set_json(resolve);
    let (status, _) = send(&app, req.to_request()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = post_as(&app, &format!("/complaint/{id}/review"), ADMIN, "admin").await;
    assert_eq!(status, StatusCode::CONFLICT);

    // No stock came back
    let (_, body) = get_as(&app, &format!("/product/{product_id}"), BUYER, "buyer").await;
    assert_eq!(body["variants"][0]["stock"], 4);
    let (status, _) = post_as(&app, "/complaint/999/review", ADMIN, "admin").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    store.tear_down().await;
}
