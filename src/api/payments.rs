use axum::{body::Bytes, extract::{Query, State}, http::HeaderMap, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;
use crate::services::{PaymentForm, PaymentResult, WebhookNotification, WebhookOutcome};
use crate::{Result, StorefrontError};
use super::AppState;

pub const IDEMPOTENCY_HEADER: &str = "x-idempotency-key";

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub order_id: Option<Uuid>,
    pub form_data: Option<PaymentForm>,
}

pub async fn create_payment(State(s): State<AppState>, headers: HeaderMap, Json(req): Json<CreatePaymentRequest>) -> Result<Json<PaymentResult>> {
    let (Some(order_id), Some(form)) = (req.order_id, req.form_data) else {
        return Err(StorefrontError::Validation("body requires orderId and formData".into()));
    };
    let idempotency_key = headers.get(IDEMPOTENCY_HEADER).and_then(|v| v.to_str().ok()).map(str::to_string);
    Ok(Json(s.payments.create_payment(order_id, form, idempotency_key).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookQuery {
    pub secret: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(rename = "data.id")]
    pub data_id: Option<String>,
}

/// Always answers 200; the body tells what happened.
pub async fn webhook(State(s): State<AppState>, query: Option<Query<WebhookQuery>>, body: Bytes) -> Json<Value> {
    let query = query.map(|Query(q)| q).unwrap_or_default();
    let notification = WebhookNotification::parse(&body, query.kind.as_deref(), query.data_id.as_deref());
    let outcome = s.payments.handle_webhook(query.secret.as_deref(), notification).await;
    Json(outcome_body(outcome))
}

fn outcome_body(outcome: WebhookOutcome) -> Value {
    match outcome {
        WebhookOutcome::Unauthenticated => json!({ "ok": true }),
        WebhookOutcome::Ignored => json!({ "ignored": true }),
        WebhookOutcome::MissingPaymentId => json!({ "missing": "paymentId" }),
        WebhookOutcome::NoOrder => json!({ "noOrder": true }),
        WebhookOutcome::Received => json!({ "received": true }),
        WebhookOutcome::Failed => json!({ "received": false }),
    }
}
