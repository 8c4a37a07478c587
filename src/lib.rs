//! Storefront Settlement
//!
//! Checkout and payment settlement service for a direct-to-consumer storefront.
//!
//! ## Features
//! - Checkout pricing with coupons, shipping and tax
//! - Idempotent order creation keyed by a client-generated id
//! - Payment reconciliation from synchronous charges and processor webhooks
//! - Admin order transitions, coupon management and sales analytics

pub mod api;
pub mod config;
pub mod domain;
pub mod messaging;
pub mod payments;
pub mod persistence;
pub mod services;

use domain::aggregates::{CartError, CouponError, CouponRejection, OrderError, ProductError};
use domain::pricing::PricingError;
use domain::value_objects::CouponCodeError;
use payments::GatewayError;
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum StorefrontError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Cart is empty")]
    EmptyCart,

    #[error(transparent)]
    Coupon(#[from] CouponRejection),

    #[error(transparent)]
    Product(#[from] ProductError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Payment processor error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<PricingError> for StorefrontError {
    fn from(e: PricingError) -> Self {
        match e {
            PricingError::EmptyCart => Self::EmptyCart,
            PricingError::Coupon(r) => Self::Coupon(r),
        }
    }
}

impl From<CartError> for StorefrontError {
    fn from(e: CartError) -> Self { Self::Validation(e.to_string()) }
}

impl From<CouponError> for StorefrontError {
    fn from(e: CouponError) -> Self { Self::Validation(e.to_string()) }
}

impl From<CouponCodeError> for StorefrontError {
    fn from(e: CouponCodeError) -> Self { Self::Validation(e.to_string()) }
}

impl From<validator::ValidationErrors> for StorefrontError {
    fn from(e: validator::ValidationErrors) -> Self { Self::Validation(e.to_string()) }
}

pub type Result<T> = std::result::Result<T, StorefrontError>;
