//! Card-payment processor port.
//!
//! The processor tokenizes cards and decides approvals on its own. The service only
//! asks it to create a charge and to report on an existing payment.

pub mod mercadopago;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use crate::domain::aggregates::{ProviderStatus, Settlement};

pub use mercadopago::MercadoPago;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("processor unreachable: {0}")]
    Transport(String),
    #[error("processor answered {status}: {body}")]
    Api { status: u16, body: String },
    #[error("unexpected processor response: {0}")]
    Decode(String),
    #[error("invalid payment id '{0}'")]
    InvalidPaymentId(String),
}

/// Payer identity forwarded to the processor.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payer {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identification: Option<Identification>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identification {
    #[serde(rename = "type")]
    pub kind: String,
    pub number: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChargeRequest {
    pub order_id: Uuid,
    pub amount: Decimal,
    pub token: String,
    pub installments: u32,
    pub payment_method_id: Option<String>,
    pub issuer_id: Option<String>,
    pub payer: Payer,
    pub description: String,
}

/// Processor view of one payment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentDetails {
    pub id: String,
    pub status: ProviderStatus,
    pub status_detail: Option<String>,
    /// Order correlation attached when the charge was created.
    pub order_id: Option<Uuid>,
}

impl PaymentDetails {
    pub fn settlement(&self) -> Settlement {
        Settlement { payment_id: self.id.clone(), status: self.status.clone(), status_detail: self.status_detail.clone() }
    }
}

/// Processor payment ids are numeric. Anything else must never reach a request path.
pub fn is_payment_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a charge. Repeating a call with the same `idempotency_key` must not
    /// charge twice; the processor returns the original payment instead.
    async fn create_charge(&self, request: &ChargeRequest, idempotency_key: &str) -> Result<PaymentDetails, GatewayError>;

    async fn get_payment(&self, payment_id: &str) -> Result<PaymentDetails, GatewayError>;
}
