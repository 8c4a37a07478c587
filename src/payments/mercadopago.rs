//! Mercado Pago `/v1/payments` client.

use async_trait::async_trait;
use reqwest::{header, Client, Response};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use crate::config::MercadoPagoConfig;
use super::{is_payment_id, ChargeRequest, GatewayError, Payer, PaymentDetails, PaymentGateway};

const IDEMPOTENCY_HEADER: &str = "X-Idempotency-Key";

#[derive(Clone, Debug)]
pub struct MercadoPago {
    http: Client,
    base_url: String,
    access_token: String,
}

#[derive(Serialize)]
struct CreatePaymentBody<'a> {
    #[serde(with = "rust_decimal::serde::float")]
    transaction_amount: Decimal,
    token: &'a str,
    installments: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    payment_method_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    issuer_id: Option<&'a str>,
    payer: &'a Payer,
    description: &'a str,
    external_reference: String,
    metadata: Metadata,
}

#[derive(Serialize, Deserialize, Default)]
struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    order_id: Option<String>,
}

#[derive(Deserialize)]
struct PaymentResponse {
    id: Value,
    status: Option<String>,
    status_detail: Option<String>,
    #[serde(default)]
    metadata: Option<Metadata>,
    #[serde(default)]
    external_reference: Option<String>,
}

impl MercadoPago {
    pub fn new(config: &MercadoPagoConfig) -> Result<Self, GatewayError> {
        let http = Client::builder().timeout(config.timeout).build().map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self { http, base_url: config.base_url.trim_end_matches('/').to_string(), access_token: config.access_token.clone() })
    }

    async fn decode(response: Response) -> Result<PaymentDetails, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api { status: status.as_u16(), body });
        }
        let payment: PaymentResponse = response.json().await.map_err(|e| GatewayError::Decode(e.to_string()))?;
        payment.into_details()
    }
}

impl PaymentResponse {
    fn into_details(self) -> Result<PaymentDetails, GatewayError> {
        let id = match self.id {
            Value::Number(n) => n.to_string(),
            Value::String(s) if !s.is_empty() => s,
            other => return Err(GatewayError::Decode(format!("payment id {}", other))),
        };
        // metadata is authoritative; external_reference covers payments created without it
        let order_id = self.metadata.and_then(|m| m.order_id).or(self.external_reference)
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok());
        Ok(PaymentDetails {
            id,
            status: self.status.unwrap_or_else(|| "unknown".to_string()).into(),
            status_detail: self.status_detail,
            order_id,
        })
    }
}

#[async_trait]
impl PaymentGateway for MercadoPago {
    async fn create_charge(&self, request: &ChargeRequest, idempotency_key: &str) -> Result<PaymentDetails, GatewayError> {
        let body = CreatePaymentBody {
            transaction_amount: request.amount,
            token: &request.token,
            installments: request.installments.max(1),
            payment_method_id: request.payment_method_id.as_deref(),
            issuer_id: request.issuer_id.as_deref(),
            payer: &request.payer,
            description: &request.description,
            external_reference: request.order_id.to_string(),
            metadata: Metadata { order_id: Some(request.order_id.to_string()) },
        };
        let response = self.http.post(format!("{}/v1/payments", self.base_url))
            .bearer_auth(&self.access_token)
            .header(IDEMPOTENCY_HEADER, idempotency_key)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&body)
            .send().await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Self::decode(response).await
    }

    async fn get_payment(&self, payment_id: &str) -> Result<PaymentDetails, GatewayError> {
        if !is_payment_id(payment_id) {
            return Err(GatewayError::InvalidPaymentId(payment_id.to_string()));
        }
        let response = self.http.get(format!("{}/v1/payments/{}", self.base_url, payment_id))
            .bearer_auth(&self.access_token)
            .send().await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Self::decode(response).await
    }
}
