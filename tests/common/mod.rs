#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;
use tower::ServiceExt;
use storefront_settlement::api::{self, AppState, Settings};
use storefront_settlement::domain::aggregates::{Coupon, DiscountType, Product, ProviderStatus};
use storefront_settlement::domain::value_objects::{CouponCode, Money};
use storefront_settlement::messaging::EventBus;
use storefront_settlement::payments::{ChargeRequest, GatewayError, PaymentDetails, PaymentGateway};
use storefront_settlement::persistence::MemoryStore;

pub const WEBHOOK_SECRET: &str = "hook-secret";
pub const ADMIN_TOKEN: &str = "admin-token";

/// Processor double with per-key idempotent charges.
pub struct FakeGateway {
    pub status: Mutex<ProviderStatus>,
    payments: Mutex<HashMap<String, PaymentDetails>>,
    keys: Mutex<HashMap<String, String>>,
    charges: Mutex<u32>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self { status: Mutex::new(ProviderStatus::Approved), payments: Mutex::default(), keys: Mutex::default(), charges: Mutex::default() }
    }
    pub fn seed(&self, details: PaymentDetails) { self.payments.lock().unwrap().insert(details.id.clone(), details); }
    pub fn charges(&self) -> u32 { *self.charges.lock().unwrap() }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_charge(&self, request: &ChargeRequest, key: &str) -> Result<PaymentDetails, GatewayError> {
        if let Some(id) = self.keys.lock().unwrap().get(key) {
            return Ok(self.payments.lock().unwrap()[id].clone());
        }
        let mut charges = self.charges.lock().unwrap();
        *charges += 1;
        let details = PaymentDetails {
            id: format!("{}", 5000 + *charges), status: self.status.lock().unwrap().clone(),
            status_detail: Some("accredited".into()), order_id: Some(request.order_id),
        };
        self.keys.lock().unwrap().insert(key.to_string(), details.id.clone());
        self.payments.lock().unwrap().insert(details.id.clone(), details.clone());
        Ok(details)
    }

    async fn get_payment(&self, payment_id: &str) -> Result<PaymentDetails, GatewayError> {
        self.payments.lock().unwrap().get(payment_id).cloned()
            .ok_or_else(|| GatewayError::Api { status: 404, body: "not found".into() })
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<FakeGateway>,
    /// In stock, 50.00.
    pub widget: Product,
}

impl TestApp {
    pub async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let widget = Product::create("Widget", Money::from_minor(5000)).with_stock(20).with_category("tools");
        store.add_product(widget.clone()).await;
        store.add_product(Product::create("Whey Protein", Money::from_minor(3000)).with_stock(5).with_category("protein")).await;
        store.add_product(Product::create("Protein Bar", Money::from_minor(250)).with_category("protein")
            .with_compare_at_price(Money::from_minor(300))).await;
        let mut retired = Product::create("Retired", Money::from_minor(100)).with_stock(1);
        retired.is_active = false;
        store.add_product(retired).await;
        store.add_coupon(Coupon::create(CouponCode::new("SAVE10").unwrap(), DiscountType::Percentage, dec!(10)).unwrap()).await;

        let gateway = Arc::new(FakeGateway::new());
        let settings = Settings {
            webhook_secret: Some(WEBHOOK_SECRET.into()),
            admin_token: Some(ADMIN_TOKEN.into()),
            ..Default::default()
        };
        let state = AppState::new(store.clone(), gateway.clone(), EventBus::disabled(), settings);
        Self { router: api::router(state), store, gateway, widget }
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>, headers: &[(&str, &str)]) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers { builder = builder.header(*name, *value); }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).unwrap())
            }
            None => Body::empty(),
        };
        self.router.clone().oneshot(builder.body(body).unwrap()).await.unwrap()
    }

    pub async fn admin(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let bearer = format!("Bearer {}", ADMIN_TOKEN);
        self.request(method, uri, body, &[("authorization", bearer.as_str())]).await
    }

    pub fn order_body(&self, quantity: u32, coupon: Option<&str>) -> Value {
        serde_json::json!({
            "firstName": "Ana", "lastName": "Pérez", "email": "ana@example.com", "phone": "1122334455",
            "address": "Av. Siempreviva 742", "city": "Springfield", "state": "BA", "zipCode": "1000",
            "items": [{ "productId": self.widget.id, "quantity": quantity }],
            "couponCode": coupon,
            "paymentMethod": "card",
        })
    }
}

pub async fn json_body(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

/// Money fields serialize as decimal strings.
pub fn money(v: &Value) -> Decimal {
    match v {
        Value::String(s) => s.parse().unwrap(),
        Value::Number(n) => n.to_string().parse().unwrap(),
        other => panic!("not a money value: {}", other),
    }
}
