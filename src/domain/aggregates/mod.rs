//! Aggregates module
pub mod cart;
pub mod coupon;
pub mod order;
pub mod product;

pub use cart::{Cart, CartError, CartItem};
pub use coupon::{Coupon, CouponError, CouponRejection, DiscountType};
pub use order::{
    Customer, LineItem, Order, OrderDraft, OrderError, OrderStatus, PaymentStatus, ProviderStatus,
    Settlement, SettlementEffect, ShippingAddress,
};
pub use product::{slugify, Product, ProductError};
