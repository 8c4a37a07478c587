//! Domain events
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;
use crate::domain::aggregates::OrderStatus;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DomainEvent {
    Order(OrderEvent),
    Coupon(CouponEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Created { order_id: Uuid, order_number: String, total: Decimal },
    PaymentApproved { order_id: Uuid, payment_id: String },
    PaymentRejected { order_id: Uuid, payment_id: String, detail: Option<String> },
    StatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus },
    Cancelled { order_id: Uuid },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CouponEvent {
    Redeemed { code: String, order_id: Uuid },
}

impl DomainEvent {
    /// NATS subject the event is published under.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Order(OrderEvent::Created { .. }) => "storefront.orders.created",
            Self::Order(OrderEvent::PaymentApproved { .. }) => "storefront.orders.payment_approved",
            Self::Order(OrderEvent::PaymentRejected { .. }) => "storefront.orders.payment_rejected",
            Self::Order(OrderEvent::StatusChanged { .. }) => "storefront.orders.status_changed",
            Self::Order(OrderEvent::Cancelled { .. }) => "storefront.orders.cancelled",
            Self::Coupon(CouponEvent::Redeemed { .. }) => "storefront.coupons.redeemed",
        }
    }
}
