//! Service configuration, read from the environment (after `.env` is loaded).

use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use rust_decimal::Decimal;
use thiserror::Error;
use crate::domain::pricing::PricingConfig;
use crate::domain::value_objects::Money;

pub const DEFAULT_MP_API_BASE_URL: &str = "https://api.mercadopago.com";

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub nats_url: Option<String>,
    pub mercadopago: MercadoPagoConfig,
    /// Shared secret the processor sends back as `?secret=` on webhook calls.
    pub webhook_secret: Option<String>,
    /// Bearer token for `/api/v1/admin`. Admin routes reject everything when unset.
    pub admin_token: Option<String>,
    pub pricing: PricingConfig,
}

#[derive(Clone)]
pub struct MercadoPagoConfig {
    pub access_token: String,
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> { Self::from_lookup(|key| std::env::var(key).ok()) }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let defaults = PricingConfig::default();
        let pricing = PricingConfig {
            free_shipping_threshold: parse_or(&get, "FREE_SHIPPING_THRESHOLD", defaults.free_shipping_threshold.amount())?.into(),
            shipping_fee: parse_or(&get, "SHIPPING_FEE", defaults.shipping_fee.amount())?.into(),
            tax_rate: parse_or(&get, "TAX_RATE", defaults.tax_rate)?,
        };
        if pricing.tax_rate < Decimal::ZERO || pricing.tax_rate >= Decimal::ONE {
            return Err(ConfigError::Invalid { key: "TAX_RATE", reason: "must be a fraction in [0, 1)".into() });
        }
        if pricing.shipping_fee < Money::ZERO {
            return Err(ConfigError::Invalid { key: "SHIPPING_FEE", reason: "must not be negative".into() });
        }

        Ok(Self {
            database_url: require("DATABASE_URL")?,
            port: parse_or(&get, "PORT", 8083u16)?,
            nats_url: get("NATS_URL"),
            mercadopago: MercadoPagoConfig {
                access_token: require("MP_ACCESS_TOKEN")?,
                base_url: get("MP_API_BASE_URL").unwrap_or_else(|| DEFAULT_MP_API_BASE_URL.to_string()),
                timeout: Duration::from_secs(parse_or(&get, "MP_TIMEOUT_SECS", 15u64)?),
            },
            webhook_secret: get("MP_WEBHOOK_SECRET"),
            admin_token: get("ADMIN_API_TOKEN"),
            pricing,
        })
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match get(key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid { key, reason: e.to_string() }),
        None => Ok(default),
    }
}

fn redacted(secret: &Option<String>) -> &'static str {
    if secret.is_some() { "<set>" } else { "<unset>" }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("nats_url", &self.nats_url)
            .field("mercadopago", &self.mercadopago)
            .field("webhook_secret", &redacted(&self.webhook_secret))
            .field("admin_token", &redacted(&self.admin_token))
            .field("pricing", &self.pricing)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for MercadoPagoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MercadoPagoConfig").field("base_url", &self.base_url).field("timeout", &self.timeout).finish_non_exhaustive()
    }
}
