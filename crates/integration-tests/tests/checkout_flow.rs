//! End-to-end checkout flows against the sandbox backends.
//!
//! Run with: cargo test -p veloura-integration-tests

#![allow(clippy::unwrap_used)]

use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde_json::json;
use veloura_core::ProductId;
use veloura_integration_tests::{TestServer, amount, json_body, shipping_address};

fn dollars(value: i64) -> Decimal {
    Decimal::new(value, 0)
}

// ============================================================================
// Health & middleware
// ============================================================================

#[tokio::test]
async fn test_health_echoes_request_id() {
    let server = TestServer::spawn().await;
    let response = server
        .client
        .get(server.url("/health"))
        .header("x-request-id", "it-req-42")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "it-req-42");
    assert_eq!(response.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn test_request_id_generated_when_missing() {
    let server = TestServer::spawn().await;
    let response = server.get("/health").await;
    assert!(response.headers().contains_key("x-request-id"));
}

// ============================================================================
// Pricing
// ============================================================================

#[tokio::test]
async fn test_free_shipping_untaxed_total() {
    let server = TestServer::spawn().await;
    let cart_id = server
        .cart_with(&[("ruby-velvet", 2, "28.00"), ("golden-hour", 1, "28.00")])
        .await;
    let session_id = server.checkout_to_review(&cart_id, "pm_card_visa").await;

    let session = json_body(server.get(&format!("/checkout/{session_id}")).await).await;
    let pricing = &session["pricing"];
    assert_eq!(amount(&pricing["subtotal"]), dollars(84));
    assert_eq!(amount(&pricing["shippingCost"]), Decimal::ZERO);
    assert_eq!(amount(&pricing["tax"]), Decimal::ZERO);
    assert_eq!(amount(&pricing["total"]), dollars(84));
    assert!(session["paymentIntent"].is_string());
}

#[tokio::test]
async fn test_shipping_rates_listed() {
    let server = TestServer::spawn().await;
    let cart_id = server.cart_with(&[("ruby-velvet", 1, "28.00")]).await;
    let session = json_body(server.post("/checkout", &json!({ "cartId": cart_id })).await).await;
    let id = session["id"].as_str().unwrap();

    server
        .put(
            &format!("/checkout/{id}/customer"),
            &json!({ "email": "glow@veloura.com", "firstName": "Ada", "lastName": "Lovelace" }),
        )
        .await;
    server.expect_step(id, "shipping").await;
    server
        .put(
            &format!("/checkout/{id}/shipping"),
            &json!({ "address": shipping_address() }),
        )
        .await;

    let response = server.get(&format!("/checkout/{id}/shipping-rates")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let ids: Vec<&str> = body["shippingRates"]
        .as_array()
        .unwrap()
        .iter()
        .map(|rate| rate["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["standard", "express", "overnight"]);
}

#[tokio::test]
async fn test_unknown_rate_rejected_on_advance() {
    let server = TestServer::spawn().await;
    let cart_id = server.cart_with(&[("ruby-velvet", 1, "28.00")]).await;
    let session = json_body(server.post("/checkout", &json!({ "cartId": cart_id })).await).await;
    let id = session["id"].as_str().unwrap();

    server
        .put(
            &format!("/checkout/{id}/customer"),
            &json!({ "email": "glow@veloura.com", "firstName": "Ada", "lastName": "Lovelace" }),
        )
        .await;
    server.expect_step(id, "shipping").await;
    server
        .put(
            &format!("/checkout/{id}/shipping"),
            &json!({ "address": shipping_address(), "rateId": "teleport" }),
        )
        .await;

    let body = server.expect_step(id, "shipping").await;
    assert!(body["errors"]["shipping"].is_string());
}

// ============================================================================
// Step validation
// ============================================================================

#[tokio::test]
async fn test_invalid_customer_keeps_step() {
    let server = TestServer::spawn().await;
    let cart_id = server.cart_with(&[("ruby-velvet", 1, "28.00")]).await;
    let session = json_body(server.post("/checkout", &json!({ "cartId": cart_id })).await).await;
    let id = session["id"].as_str().unwrap();

    server
        .put(&format!("/checkout/{id}/customer"), &json!({ "email": "not-an-email" }))
        .await;
    let body = server.expect_step(id, "customer_info").await;
    assert!(body["errors"]["email"].is_string());
    assert!(body["errors"]["firstName"].is_string());
}

#[tokio::test]
async fn test_wrong_step_conflict() {
    let server = TestServer::spawn().await;
    let cart_id = server.cart_with(&[("ruby-velvet", 1, "28.00")]).await;
    let session = json_body(server.post("/checkout", &json!({ "cartId": cart_id })).await).await;
    let id = session["id"].as_str().unwrap();

    let response = server
        .put(&format!("/checkout/{id}/payment"), &json!({ "method": "pm_card_visa" }))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(response).await["code"], "wrong_step");
}

#[tokio::test]
async fn test_empty_cart_cannot_start_checkout() {
    let server = TestServer::spawn().await;
    let cart_id = server.cart_with(&[]).await;
    let response = server.post("/checkout", &json!({ "cartId": cart_id })).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "cart_empty");
}

// ============================================================================
// Placement
// ============================================================================

#[tokio::test]
async fn test_successful_order_clears_cart() {
    let server = TestServer::spawn().await;
    let cart_id = server
        .cart_with(&[("ruby-velvet", 2, "28.00"), ("golden-hour", 1, "28.00")])
        .await;
    let session_id = server.checkout_to_review(&cart_id, "pm_card_visa").await;

    let response = server
        .post(&format!("/checkout/{session_id}/place-order"), &json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    let order = &body["order"];
    assert!(order["id"].as_str().unwrap().starts_with("VL-"));
    assert_eq!(amount(&order["pricing"]["total"]), dollars(84));

    let inventory = server.state.sandbox_inventory().unwrap();
    assert_eq!(inventory.sold(&ProductId::new("ruby-velvet"), None), 2);
    assert_eq!(inventory.sold(&ProductId::new("golden-hour"), None), 1);
    assert_eq!(inventory.outstanding_holds(), 0);

    let cart = json_body(server.get(&format!("/cart/{cart_id}")).await).await;
    assert_eq!(cart["items"].as_array().unwrap().len(), 0);

    let response = server.get(&format!("/checkout/{session_id}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // A repeated request returns the same order without charging again.
    let again = server
        .post(&format!("/checkout/{session_id}/place-order"), &json!({}))
        .await;
    assert_eq!(again.status(), StatusCode::CREATED);
    assert_eq!(json_body(again).await["order"]["id"], order["id"]);
    assert_eq!(inventory.sold(&ProductId::new("ruby-velvet"), None), 2);
}

#[tokio::test]
async fn test_out_of_stock_aborts_and_keeps_cart() {
    let server = TestServer::spawn().await;
    let cart_id = server
        .cart_with(&[("ruby-velvet", 2, "28.00"), ("golden-hour", 1, "28.00")])
        .await;
    let session_id = server.checkout_to_review(&cart_id, "pm_card_visa").await;

    let inventory = server.state.sandbox_inventory().unwrap();
    inventory.set_stock(&ProductId::new("golden-hour"), None, 0);

    let response = server
        .post(&format!("/checkout/{session_id}/place-order"), &json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_body(response).await;
    assert_eq!(body["code"], "inventory_unavailable");
    assert_eq!(body["unavailable"][0]["productId"], "golden-hour");

    let session = json_body(server.get(&format!("/checkout/{session_id}")).await).await;
    assert_eq!(session["status"], "aborted");
    assert!(session["notice"].is_string());

    assert_eq!(inventory.outstanding_holds(), 0);
    assert_eq!(inventory.sold(&ProductId::new("ruby-velvet"), None), 0);

    let cart = json_body(server.get(&format!("/cart/{cart_id}")).await).await;
    assert_eq!(cart["items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_declined_payment_then_retry() {
    let server = TestServer::spawn().await;
    let cart_id = server.cart_with(&[("ruby-velvet", 1, "28.00")]).await;
    let session_id = server
        .checkout_to_review(&cart_id, "pm_card_chargeDeclined")
        .await;

    let response = server
        .post(&format!("/checkout/{session_id}/place-order"), &json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let body = json_body(response).await;
    assert_eq!(body["code"], "payment_declined");
    assert!(!body["error"].as_str().unwrap().contains("pm_card"));

    let inventory = server.state.sandbox_inventory().unwrap();
    assert_eq!(inventory.outstanding_holds(), 0);
    assert_eq!(inventory.sold(&ProductId::new("ruby-velvet"), None), 0);

    let session = json_body(server.get(&format!("/checkout/{session_id}")).await).await;
    assert_eq!(session["step"], "failed");
    assert_eq!(session["status"], "failed");
    assert!(session["paymentIntent"].is_null());

    let response = server
        .post(&format!("/checkout/{session_id}/retry"), &json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["step"], "payment");

    server
        .put(
            &format!("/checkout/{session_id}/payment"),
            &json!({ "method": "pm_card_visa" }),
        )
        .await;
    server.expect_step(&session_id, "review").await;

    let response = server
        .post(&format!("/checkout/{session_id}/place-order"), &json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(inventory.sold(&ProductId::new("ruby-velvet"), None), 1);
}

#[tokio::test]
async fn test_concurrent_place_order_commits_once() {
    let server = TestServer::spawn().await;
    let cart_id = server.cart_with(&[("ruby-velvet", 3, "28.00")]).await;
    let session_id = server.checkout_to_review(&cart_id, "pm_card_visa").await;
    let path = format!("/checkout/{session_id}/place-order");

    let body = json!({});
    let (first, second) = tokio::join!(server.post(&path, &body), server.post(&path, &body));
    let statuses = [first.status(), second.status()];

    assert!(statuses.contains(&StatusCode::CREATED));
    assert!(
        statuses
            .iter()
            .all(|s| *s == StatusCode::CREATED || *s == StatusCode::CONFLICT)
    );
    let inventory = server.state.sandbox_inventory().unwrap();
    assert_eq!(inventory.sold(&ProductId::new("ruby-velvet"), None), 3);
}

#[tokio::test]
async fn test_limited_stock_one_of_two_sessions_wins() {
    let server = TestServer::spawn().await;
    let inventory = server.state.sandbox_inventory().unwrap();
    inventory.set_stock(&ProductId::new("golden-hour"), None, 1);

    let first_cart = server.cart_with(&[("golden-hour", 1, "28.00")]).await;
    let second_cart = server.cart_with(&[("golden-hour", 1, "28.00")]).await;
    let first = server.checkout_to_review(&first_cart, "pm_card_visa").await;
    let second = server.checkout_to_review(&second_cart, "pm_card_visa").await;

    let body = json!({});
    let first_path = format!("/checkout/{first}/place-order");
    let second_path = format!("/checkout/{second}/place-order");
    let (a, b) = tokio::join!(
        server.post(&first_path, &body),
        server.post(&second_path, &body),
    );
    let mut statuses = [a.status(), b.status()];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::CREATED, StatusCode::CONFLICT]);
    assert_eq!(inventory.sold(&ProductId::new("golden-hour"), None), 1);
    assert_eq!(inventory.available(&ProductId::new("golden-hour"), None), 0);
}

#[tokio::test]
async fn test_cancel_removes_session() {
    let server = TestServer::spawn().await;
    let cart_id = server.cart_with(&[("ruby-velvet", 1, "28.00")]).await;
    let session = json_body(server.post("/checkout", &json!({ "cartId": cart_id })).await).await;
    let id = session["id"].as_str().unwrap();

    let response = server
        .client
        .delete(server.url(&format!("/checkout/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = server.get(&format!("/checkout/{id}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["code"], "session_not_found");
}
