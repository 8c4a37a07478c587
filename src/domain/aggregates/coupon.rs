//! Coupon Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::{CouponCode, Money};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub id: Uuid,
    pub code: CouponCode,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub min_purchase: Option<Money>,
    pub max_uses: Option<u32>,
    pub times_used: u32,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType { Percentage, Fixed }

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Percentage => "percentage", Self::Fixed => "fixed" }
    }
}

impl std::str::FromStr for DiscountType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percentage" => Ok(Self::Percentage),
            "fixed" => Ok(Self::Fixed),
            other => Err(format!("unknown discount type '{}'", other)),
        }
    }
}

/// Why a coupon cannot be applied. Each reason is shown to the buyer as is.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CouponRejection {
    NotFound { code: String },
    Inactive { code: String },
    Expired { code: String },
    Exhausted { code: String },
    BelowMinimum { code: String, min_purchase: Money },
}

impl CouponRejection {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "coupon_not_found",
            Self::Inactive { .. } => "coupon_inactive",
            Self::Expired { .. } => "coupon_expired",
            Self::Exhausted { .. } => "coupon_exhausted",
            Self::BelowMinimum { .. } => "coupon_below_minimum",
        }
    }
}

impl std::error::Error for CouponRejection {}
impl std::fmt::Display for CouponRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { code } => write!(f, "coupon {} does not exist", code),
            Self::Inactive { code } => write!(f, "coupon {} is not active", code),
            Self::Expired { code } => write!(f, "coupon {} has expired", code),
            Self::Exhausted { code } => write!(f, "coupon {} has reached its usage limit", code),
            Self::BelowMinimum { code, min_purchase } => write!(f, "coupon {} requires a minimum purchase of {}", code, min_purchase),
        }
    }
}

impl Coupon {
    pub fn create(code: CouponCode, discount_type: DiscountType, discount_value: Decimal) -> Result<Self, CouponError> {
        if discount_value <= Decimal::ZERO { return Err(CouponError::NonPositiveValue); }
        if discount_type == DiscountType::Percentage && discount_value > Decimal::ONE_HUNDRED { return Err(CouponError::PercentageOverHundred); }
        Ok(Self {
            id: Uuid::now_v7(), code, discount_type, discount_value,
            min_purchase: None, max_uses: None, times_used: 0, expires_at: None,
            is_active: true, created_at: Utc::now(),
        })
    }

    pub fn with_min_purchase(mut self, min: Money) -> Self { self.min_purchase = Some(min); self }
    pub fn with_max_uses(mut self, max: u32) -> Self { self.max_uses = Some(max); self }
    pub fn with_expiry(mut self, at: DateTime<Utc>) -> Self { self.expires_at = Some(at); self }

    pub fn is_exhausted(&self) -> bool { self.max_uses.is_some_and(|max| self.times_used >= max) }

    /// Checks every redeemability rule against `subtotal`, reporting the first that fails.
    pub fn check_redeemable(&self, subtotal: Money, now: DateTime<Utc>) -> Result<(), CouponRejection> {
        let code = self.code.to_string();
        if !self.is_active { return Err(CouponRejection::Inactive { code }); }
        if self.expires_at.is_some_and(|at| at <= now) { return Err(CouponRejection::Expired { code }); }
        if self.is_exhausted() { return Err(CouponRejection::Exhausted { code }); }
        if let Some(min_purchase) = self.min_purchase {
            if subtotal < min_purchase { return Err(CouponRejection::BelowMinimum { code, min_purchase }); }
        }
        Ok(())
    }

    /// Unrounded discount for `subtotal`, capped so the net never goes below zero.
    pub fn discount_for(&self, subtotal: Money) -> Money {
        let raw = match self.discount_type {
            DiscountType::Percentage => subtotal.percent(self.discount_value),
            DiscountType::Fixed => Money::new(self.discount_value),
        };
        raw.min(subtotal).max(Money::ZERO)
    }

    pub fn record_use(&mut self) { self.times_used = self.times_used.saturating_add(1); }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CouponError { NonPositiveValue, PercentageOverHundred }
impl std::error::Error for CouponError {}
impl std::fmt::Display for CouponError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonPositiveValue => write!(f, "discount value must be greater than zero"),
            Self::PercentageOverHundred => write!(f, "percentage discount cannot exceed 100"),
        }
    }
}
