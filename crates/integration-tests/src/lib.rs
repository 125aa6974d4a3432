//! Integration tests for the Veloura checkout.
//!
//! Each test boots the storefront on an ephemeral port with the sandbox
//! backends and drives it over HTTP.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p veloura-integration-tests
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

use reqwest::{Client, Response, StatusCode};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use veloura_core::CurrencyCode;
use veloura_storefront::config::{BackendConfig, CheckoutConfig, SentryConfig, StorefrontConfig};
use veloura_storefront::state::AppState;

/// A storefront running in the background for the lifetime of a test.
pub struct TestServer {
    pub base_url: String,
    pub state: AppState,
    pub client: Client,
}

impl TestServer {
    /// Boot a sandbox storefront on `127.0.0.1:0`.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound.
    pub async fn spawn() -> Self {
        let config = StorefrontConfig {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            backend: BackendConfig::Sandbox,
            checkout: CheckoutConfig {
                currency: CurrencyCode::USD,
                ..CheckoutConfig::default()
            },
            sentry: SentryConfig::default(),
        };
        let state = AppState::new(config).expect("sandbox state");
        let listener = tokio::net::TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener address");

        let app = veloura_storefront::app(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("test server");
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
            client: Client::new(),
        }
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// POST a JSON body and return the response.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be sent.
    pub async fn post(&self, path: &str, body: &Value) -> Response {
        self.client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("POST request")
    }

    /// PUT a JSON body and return the response.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be sent.
    pub async fn put(&self, path: &str, body: &Value) -> Response {
        self.client
            .put(self.url(path))
            .json(body)
            .send()
            .await
            .expect("PUT request")
    }

    /// GET a path and return the response.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be sent.
    pub async fn get(&self, path: &str) -> Response {
        self.client.get(self.url(path)).send().await.expect("GET request")
    }

    /// Create a cart holding `lines` of `(product, quantity, unit price)`.
    ///
    /// # Panics
    ///
    /// Panics if the storefront rejects the cart.
    pub async fn cart_with(&self, lines: &[(&str, u32, &str)]) -> String {
        let response = self.post("/cart", &json!({})).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let cart = json_body(response).await;
        let cart_id = cart["id"].as_str().expect("cart id").to_string();

        for (product, quantity, price) in lines {
            let response = self
                .post(
                    &format!("/cart/{cart_id}/items"),
                    &json!({
                        "productId": product,
                        "quantity": quantity,
                        "unitPrice": { "amount": price, "currencyCode": "USD" },
                    }),
                )
                .await;
            assert!(response.status().is_success(), "add {product}: {}", response.status());
        }
        cart_id
    }

    /// Start a session and fill every step up to Review.
    ///
    /// # Panics
    ///
    /// Panics if any step is rejected.
    pub async fn checkout_to_review(&self, cart_id: &str, payment_method: &str) -> String {
        let response = self.post("/checkout", &json!({ "cartId": cart_id })).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let session = json_body(response).await;
        let id = session["id"].as_str().expect("session id").to_string();

        self.put(
            &format!("/checkout/{id}/customer"),
            &json!({ "email": "glow@veloura.com", "firstName": "Ada", "lastName": "Lovelace" }),
        )
        .await;
        self.expect_step(&id, "shipping").await;

        self.put(
            &format!("/checkout/{id}/shipping"),
            &json!({ "address": shipping_address(), "rateId": "standard" }),
        )
        .await;
        self.expect_step(&id, "payment").await;

        self.put(&format!("/checkout/{id}/payment"), &json!({ "method": payment_method }))
            .await;
        self.expect_step(&id, "review").await;
        id
    }

    /// Advance and assert the step landed on.
    ///
    /// # Panics
    ///
    /// Panics if the step differs.
    pub async fn expect_step(&self, session_id: &str, step: &str) -> Value {
        let response = self.post(&format!("/checkout/{session_id}/advance"), &json!({})).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["nextStep"], step, "advance errors: {}", body["errors"]);
        body
    }
}

/// An Oregon address; the sandbox charges no sales tax there.
#[must_use]
pub fn shipping_address() -> Value {
    json!({
        "firstName": "Ada",
        "lastName": "Lovelace",
        "address1": "1 Rose Way",
        "city": "Portland",
        "state": "OR",
        "zipCode": "97201",
        "country": "US",
    })
}

/// Decode a JSON response body.
///
/// # Panics
///
/// Panics if the body is not JSON.
pub async fn json_body(response: Response) -> Value {
    response.json().await.expect("JSON body")
}

/// Read a serialized price amount.
///
/// # Panics
///
/// Panics if `price` is not a price object.
#[must_use]
pub fn amount(price: &Value) -> Decimal {
    let raw = price["amount"]
        .as_str()
        .map_or_else(|| price["amount"].to_string(), str::to_string);
    Decimal::from_str(&raw).expect("decimal amount")
}
