//! Checkout pricing: subtotal, coupon discount, shipping, tax and total.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use crate::domain::aggregates::{Coupon, CouponRejection, LineItem};
use crate::domain::value_objects::Money;

/// Deployment-specific pricing rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PricingConfig {
    /// Orders with a subtotal strictly above this ship for free.
    pub free_shipping_threshold: Money,
    pub shipping_fee: Money,
    /// Fraction, e.g. `0.16` for 16%.
    pub tax_rate: Decimal,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self { free_shipping_threshold: Money::from_minor(5000), shipping_fee: Money::from_minor(500), tax_rate: Decimal::new(16, 2) }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub subtotal: Money,
    pub discount: Money,
    pub shipping: Money,
    pub tax: Money,
    pub total: Money,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PricingError { EmptyCart, Coupon(CouponRejection) }
impl std::error::Error for PricingError {}
impl std::fmt::Display for PricingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self { Self::EmptyCart => write!(f, "cart is empty"), Self::Coupon(r) => write!(f, "{}", r) }
    }
}

impl From<CouponRejection> for PricingError {
    fn from(r: CouponRejection) -> Self { Self::Coupon(r) }
}

#[derive(Clone, Debug, Default)]
pub struct PricingEngine { config: PricingConfig }

impl PricingEngine {
    pub fn new(config: PricingConfig) -> Self { Self { config } }

    /// Prices `lines` with an optional coupon.
    ///
    /// A supplied coupon that is not redeemable rejects the whole computation.
    /// Everything is computed on exact amounts and the total is rounded once at the
    /// end. `discount` and `tax` are rounded for display only.
    pub fn compute_totals(&self, lines: &[LineItem], coupon: Option<&Coupon>, now: DateTime<Utc>) -> Result<Totals, PricingError> {
        if lines.is_empty() { return Err(PricingError::EmptyCart); }

        let subtotal: Money = lines.iter().map(LineItem::line_total).sum();
        let discount = match coupon {
            Some(coupon) => {
                coupon.check_redeemable(subtotal, now)?;
                coupon.discount_for(subtotal)
            }
            None => Money::ZERO,
        };
        let shipping = if subtotal > self.config.free_shipping_threshold { Money::ZERO } else { self.config.shipping_fee };
        let tax = (subtotal - discount).scale(self.config.tax_rate);
        let total = (subtotal - discount + shipping + tax).round();

        Ok(Totals { subtotal, discount: discount.round(), shipping, tax: tax.round(), total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::DiscountType;
    use crate::domain::value_objects::{CouponCode, Quantity};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn line(cents: i64, qty: u32) -> LineItem {
        LineItem { product_id: Uuid::new_v4(), variant: None, name: "Item".into(), unit_price: Money::from_minor(cents), quantity: Quantity::new(qty).unwrap() }
    }

    fn coupon(code: &str, kind: DiscountType, value: Decimal) -> Coupon {
        Coupon::create(CouponCode::new(code).unwrap(), kind, value).unwrap()
    }

    #[test]
    fn test_save10_scenario() {
        let engine = PricingEngine::default();
        let save10 = coupon("SAVE10", DiscountType::Percentage, dec!(10)).with_min_purchase(Money::from_minor(5000));
        let totals = engine.compute_totals(&[line(5000, 2)], Some(&save10), Utc::now()).unwrap();
        assert_eq!(totals.subtotal.amount(), dec!(100.00));
        assert_eq!(totals.discount.amount(), dec!(10.00));
        assert_eq!(totals.shipping, Money::ZERO);
        assert_eq!(totals.tax.amount(), dec!(14.40));
        assert_eq!(totals.total.amount(), dec!(104.40));
    }

    #[test]
    fn test_shipping_charged_at_threshold() {
        let engine = PricingEngine::default();
        let totals = engine.compute_totals(&[line(5000, 1)], None, Utc::now()).unwrap();
        assert_eq!(totals.shipping, Money::from_minor(500));
        assert_eq!(totals.total.amount(), dec!(63.00));
    }

    #[test]
    fn test_fixed_discount_never_exceeds_subtotal() {
        let engine = PricingEngine::new(PricingConfig { tax_rate: dec!(0.21), ..PricingConfig::default() });
        let big = coupon("BIG", DiscountType::Fixed, dec!(500));
        let totals = engine.compute_totals(&[line(1999, 1)], Some(&big), Utc::now()).unwrap();
        assert_eq!(totals.discount, totals.subtotal);
        assert_eq!(totals.tax, Money::ZERO);
        assert_eq!(totals.total, totals.shipping);
    }

    #[test]
    fn test_totals_have_two_decimals_and_are_non_negative() {
        let engine = PricingEngine::new(PricingConfig { tax_rate: dec!(0.21), ..PricingConfig::default() });
        let odd = coupon("ODD", DiscountType::Percentage, dec!(33));
        for (cents, qty) in [(1, 1), (333, 3), (1999, 7), (4999, 1), (12345, 2)] {
            let totals = engine.compute_totals(&[line(cents, qty)], Some(&odd), Utc::now()).unwrap();
            assert!(!totals.total.is_negative());
            assert_eq!(totals.total.amount(), totals.total.amount().round_dp(2));
            let parts = totals.subtotal - totals.discount + totals.shipping + totals.tax;
            assert!((totals.total - parts).amount().abs() <= dec!(0.01));
        }
    }

    #[test]
    fn test_total_rounded_once_from_exact_parts() {
        let engine = PricingEngine::default();
        let half = coupon("HALF", DiscountType::Percentage, dec!(50));
        // discount 0.015, tax 0.0024: exact total 5.0174
        let totals = engine.compute_totals(&[line(3, 1)], Some(&half), Utc::now()).unwrap();
        assert_eq!(totals.total.amount(), dec!(5.02));
        assert_eq!(totals.discount.amount(), dec!(0.02));
        assert_eq!(totals.tax.amount(), dec!(0.00));
    }

    #[test]
    fn test_empty_cart_rejected() {
        assert_eq!(PricingEngine::default().compute_totals(&[], None, Utc::now()), Err(PricingError::EmptyCart));
    }

    #[test]
    fn test_unredeemable_coupon_rejected() {
        let mut spent = coupon("SPENT", DiscountType::Fixed, dec!(5)).with_max_uses(5);
        spent.times_used = 5;
        let err = PricingEngine::default().compute_totals(&[line(1000, 1)], Some(&spent), Utc::now()).unwrap_err();
        assert_eq!(err, PricingError::Coupon(CouponRejection::Exhausted { code: "SPENT".into() }));
    }
}
