//! Payment settlement.
//!
//! Two paths report on the same payment: the synchronous charge made while the buyer
//! waits, and the processor's webhook. Both end in [`PaymentService::settle`], which
//! writes through [`OrderRepository::record_settlement`], so whichever arrives second
//! converges on the same order state and the coupon is counted once.

use std::sync::Arc;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;
use crate::domain::aggregates::{OrderStatus, PaymentStatus, SettlementEffect};
use crate::messaging::EventBus;
use crate::payments::{is_payment_id, ChargeRequest, Identification, Payer, PaymentDetails, PaymentGateway};
use crate::persistence::{OrderRepository, SettlementRecord};
use crate::{Result, StorefrontError};
use super::secrets_match;

/// Card form as produced by the processor's checkout widget.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PaymentForm {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub payment_method_id: Option<String>,
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub issuer_id: Option<String>,
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub installments: Option<String>,
    #[serde(default)]
    pub payer: Option<FormPayer>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct FormPayer {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub identification: Option<Identification>,
}

fn scalar_as_string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<String>, D::Error> {
    Ok(Option::<Value>::deserialize(d)?.as_ref().and_then(scalar_text))
}

fn scalar_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Outcome of a charge attempt as returned to the buyer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PaymentResult {
    pub id: String,
    pub status: String,
    pub status_detail: Option<String>,
}

impl From<&PaymentDetails> for PaymentResult {
    fn from(d: &PaymentDetails) -> Self {
        Self { id: d.id.clone(), status: d.status.as_str().to_string(), status_detail: d.status_detail.clone() }
    }
}

/// Fields of a processor notification that matter here.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WebhookNotification {
    pub kind: Option<String>,
    pub action: Option<String>,
    pub payment_id: Option<String>,
}

impl WebhookNotification {
    /// Reads `{type, action, data: {id}}` from the body. `type` and `data.id` fall back
    /// to the query string. A body that is not JSON counts as empty.
    pub fn parse(body: &[u8], query_type: Option<&str>, query_data_id: Option<&str>) -> Self {
        let value: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
        let query = |q: Option<&str>| q.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
        Self {
            kind: value.get("type").and_then(scalar_text).or_else(|| query(query_type)),
            action: value.get("action").and_then(scalar_text),
            payment_id: value.get("data").and_then(|d| d.get("id")).and_then(scalar_text).or_else(|| query(query_data_id))
                .filter(|id| is_payment_id(id)),
        }
    }

    pub fn is_payment_event(&self) -> bool {
        self.kind.as_deref() == Some("payment")
            || matches!(self.action.as_deref(), Some("payment.created" | "payment.updated"))
            || self.payment_id.is_some()
    }
}

/// Webhook results. Every variant is acknowledged with 200 so the processor stops
/// retrying; the variant only selects the response body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Missing or wrong secret. Answered like a success to reveal nothing.
    Unauthenticated,
    Ignored,
    MissingPaymentId,
    NoOrder,
    Received,
    Failed,
}

pub struct PaymentService {
    orders: Arc<dyn OrderRepository>,
    gateway: Arc<dyn PaymentGateway>,
    events: EventBus,
    webhook_secret: Option<String>,
}

impl PaymentService {
    pub fn new(orders: Arc<dyn OrderRepository>, gateway: Arc<dyn PaymentGateway>, events: EventBus, webhook_secret: Option<String>) -> Self {
        Self { orders, gateway, events, webhook_secret }
    }

    /// Charges the order's stored total and records the result.
    ///
    /// An order that is already paid is answered from its recorded payment without
    /// contacting the processor. Once the processor has answered, the result is
    /// returned even if recording it fails; the webhook settles it later.
    #[instrument(skip(self, form, idempotency_key))]
    pub async fn create_payment(&self, order_id: Uuid, form: PaymentForm, idempotency_key: Option<String>) -> Result<PaymentResult> {
        let idempotency_key = idempotency_key.filter(|k| !k.trim().is_empty()).unwrap_or_else(|| {
            let generated = Uuid::new_v4().to_string();
            warn!(%order_id, idempotency_key = %generated, "no idempotency key supplied; retries of this request may charge again");
            generated
        });

        let order = self.orders.find_order(order_id).await?
            .ok_or_else(|| StorefrontError::NotFound(format!("order {}", order_id)))?;
        if order.payment_status() == PaymentStatus::Paid {
            info!(%order_id, "order already paid, returning recorded payment");
            return Ok(PaymentResult {
                id: order.mp_payment_id().unwrap_or_default().to_string(),
                status: order.mp_status().map_or("approved", |s| s.as_str()).to_string(),
                status_detail: order.mp_status_detail().map(str::to_string),
            });
        }
        if order.status() == OrderStatus::Cancelled {
            return Err(StorefrontError::Conflict(format!("order {} is cancelled", order_id)));
        }
        if !order.total().is_positive() {
            return Err(StorefrontError::Validation("order total must be greater than zero".into()));
        }
        let token = form.token.as_deref().map(str::trim).filter(|t| !t.is_empty())
            .ok_or_else(|| StorefrontError::Validation("card token is missing".into()))?;
        let installments = match form.installments.as_deref() {
            None => 1,
            Some(raw) => raw.parse::<u32>().ok().filter(|n| *n >= 1)
                .ok_or_else(|| StorefrontError::Validation(format!("invalid installments '{}'", raw)))?,
        };
        let form_payer = form.payer.unwrap_or_default();
        let email = Some(order.customer().email.clone()).filter(|e| !e.is_empty())
            .or(form_payer.email)
            .ok_or_else(|| StorefrontError::Validation("payer email is missing".into()))?;

        let request = ChargeRequest {
            order_id,
            amount: order.total().amount(),
            token: token.to_string(),
            installments,
            payment_method_id: form.payment_method_id,
            issuer_id: form.issuer_id,
            payer: Payer { email, identification: form_payer.identification },
            description: format!("Order {}", order.order_number()),
        };
        let details = self.gateway.create_charge(&request, &idempotency_key).await.map_err(|e| {
            error!(%order_id, error = %e, "charge failed");
            e
        })?;
        info!(%order_id, payment_id = %details.id, status = details.status.as_str(), "charge created");

        if let Err(e) = self.settle(order_id, &details).await {
            error!(%order_id, payment_id = %details.id, error = %e, "charge created but recording it failed; awaiting webhook");
        }
        Ok(PaymentResult::from(&details))
    }

    /// Handles one processor notification. Never fails: errors are logged and
    /// reported as [`WebhookOutcome::Failed`].
    #[instrument(skip_all, fields(payment_id = tracing::field::Empty))]
    pub async fn handle_webhook(&self, secret: Option<&str>, notification: WebhookNotification) -> WebhookOutcome {
        if !self.authenticate(secret) {
            warn!("webhook rejected: bad or missing secret");
            return WebhookOutcome::Unauthenticated;
        }
        if !notification.is_payment_event() {
            debug!(kind = ?notification.kind, action = ?notification.action, "ignoring non-payment notification");
            return WebhookOutcome::Ignored;
        }
        let Some(payment_id) = notification.payment_id else {
            warn!("payment notification without payment id");
            return WebhookOutcome::MissingPaymentId;
        };
        tracing::Span::current().record("payment_id", payment_id.as_str());

        match self.reconcile(&payment_id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "webhook reconciliation failed");
                WebhookOutcome::Failed
            }
        }
    }

    fn authenticate(&self, provided: Option<&str>) -> bool {
        match (self.webhook_secret.as_deref(), provided) {
            (Some(expected), Some(provided)) => secrets_match(expected, provided),
            _ => false,
        }
    }

    async fn reconcile(&self, payment_id: &str) -> Result<WebhookOutcome> {
        let details = self.gateway.get_payment(payment_id).await?;
        let Some(order_id) = details.order_id else {
            warn!("payment carries no order reference");
            return Ok(WebhookOutcome::NoOrder);
        };
        match self.settle(order_id, &details).await? {
            Some(_) => Ok(WebhookOutcome::Received),
            None => {
                warn!(%order_id, "payment references an unknown order");
                Ok(WebhookOutcome::NoOrder)
            }
        }
    }

    async fn settle(&self, order_id: Uuid, details: &PaymentDetails) -> Result<Option<SettlementRecord>> {
        let Some(mut record) = self.orders.record_settlement(order_id, &details.settlement()).await? else {
            return Ok(None);
        };
        match record.effect {
            SettlementEffect::IgnoredStale => {
                info!(%order_id, payment_id = %details.id, status = details.status.as_str(), "stale report for paid order ignored");
            }
            SettlementEffect::Applied { became_paid } => {
                info!(%order_id, payment_id = %details.id, payment_status = %record.order.payment_status(), became_paid, "settlement recorded");
            }
        }
        if let Some(code) = &record.redeemed_coupon {
            info!(%order_id, coupon = %code, "coupon redeemed");
        }
        self.events.publish_all(record.order.take_events()).await;
        Ok(Some(record))
    }
}
