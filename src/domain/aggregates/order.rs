//! Order Aggregate
//!
//! An order is created once from an [`OrderDraft`]. After that only two things change it:
//! processor settlements ([`Order::apply_settlement`]) and admin status transitions
//! ([`Order::transition_to`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::aggregates::cart::Cart;
use crate::domain::events::{CouponEvent, DomainEvent, OrderEvent};
use crate::domain::pricing::Totals;
use crate::domain::value_objects::{CouponCode, Money, Quantity};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub(crate) id: Uuid,
    pub(crate) order_number: String,
    pub(crate) user_id: Option<Uuid>,
    pub(crate) customer: Customer,
    pub(crate) shipping_address: ShippingAddress,
    pub(crate) items: Vec<LineItem>,
    #[serde(flatten)]
    pub(crate) totals: Totals,
    pub(crate) coupon_code: Option<CouponCode>,
    pub(crate) payment_method: String,
    pub(crate) payment_status: PaymentStatus,
    pub(crate) status: OrderStatus,
    pub(crate) mp_payment_id: Option<String>,
    pub(crate) mp_status: Option<ProviderStatus>,
    pub(crate) mp_status_detail: Option<String>,
    pub(crate) coupon_redeemed: bool,
    pub(crate) notes: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) events: Vec<DomainEvent>,
}

/// Line frozen at order-creation time; later catalog edits never reach it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: Uuid,
    pub variant: Option<String>,
    pub name: String,
    pub unit_price: Money,
    pub quantity: Quantity,
}

impl LineItem {
    pub fn line_total(&self) -> Money { self.unit_price.multiply(self.quantity.value()) }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer { pub name: String, pub email: String, pub phone: String }

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress { pub address: String, pub city: String, pub state: String, pub zip: String }

/// Everything the buyer submits for an order. Two submissions are the same order
/// exactly when their drafts are equal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderDraft {
    pub user_id: Option<Uuid>,
    pub customer: Customer,
    pub shipping_address: ShippingAddress,
    pub cart: Cart,
    pub coupon_code: Option<CouponCode>,
    pub payment_method: String,
    pub notes: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus { #[default] Pending, Paid, Processing, Shipped, Delivered, Cancelled }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus { #[default] Pending, Paid, Rejected }

/// Payment status as reported by the processor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProviderStatus { Approved, Rejected, InProcess, Pending, Other(String) }

macro_rules! string_enum {
    ($ty:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str { match self { $(Self::$variant => $s),+ } }
        }
        impl std::str::FromStr for $ty {
            type Err = String;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s { $($s => Ok(Self::$variant),)+ other => Err(format!("unknown {} '{}'", stringify!($ty), other)) }
            }
        }
        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
        }
    };
}

string_enum!(OrderStatus { Pending => "pending", Paid => "paid", Processing => "processing", Shipped => "shipped", Delivered => "delivered", Cancelled => "cancelled" });
string_enum!(PaymentStatus { Pending => "pending", Paid => "paid", Rejected => "rejected" });

impl ProviderStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::InProcess => "in_process",
            Self::Pending => "pending",
            Self::Other(s) => s,
        }
    }
    pub fn is_in_flight(&self) -> bool { matches!(self, Self::InProcess | Self::Pending) }
}

impl From<String> for ProviderStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "approved" => Self::Approved,
            "rejected" => Self::Rejected,
            "in_process" => Self::InProcess,
            "pending" => Self::Pending,
            _ => Self::Other(s),
        }
    }
}

impl From<ProviderStatus> for String {
    fn from(s: ProviderStatus) -> Self { s.as_str().to_string() }
}

impl From<&ProviderStatus> for PaymentStatus {
    fn from(s: &ProviderStatus) -> Self {
        match s {
            ProviderStatus::Approved => PaymentStatus::Paid,
            ProviderStatus::Rejected => PaymentStatus::Rejected,
            _ => PaymentStatus::Pending,
        }
    }
}

/// One processor report about one payment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settlement {
    pub payment_id: String,
    pub status: ProviderStatus,
    pub status_detail: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettlementEffect {
    Applied { became_paid: bool },
    /// A non-approved report arrived for an order that is already paid.
    IgnoredStale,
}

impl Order {
    pub fn place(id: Uuid, draft: OrderDraft, items: Vec<LineItem>, totals: Totals) -> Self {
        let now = Utc::now();
        let mut order = Self {
            id, order_number: format!("ORD-{:08}", rand::random::<u32>() % 100_000_000),
            user_id: draft.user_id, customer: draft.customer, shipping_address: draft.shipping_address,
            items, totals, coupon_code: draft.coupon_code, payment_method: draft.payment_method,
            payment_status: PaymentStatus::Pending, status: OrderStatus::Pending,
            mp_payment_id: None, mp_status: None, mp_status_detail: None, coupon_redeemed: false,
            notes: draft.notes, created_at: now, updated_at: now, events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Created { order_id: id, order_number: order.order_number.clone(), total: totals.total.amount() }));
        order
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn order_number(&self) -> &str { &self.order_number }
    pub fn user_id(&self) -> Option<Uuid> { self.user_id }
    pub fn customer(&self) -> &Customer { &self.customer }
    pub fn shipping_address(&self) -> &ShippingAddress { &self.shipping_address }
    pub fn items(&self) -> &[LineItem] { &self.items }
    pub fn totals(&self) -> &Totals { &self.totals }
    pub fn total(&self) -> Money { self.totals.total }
    pub fn coupon_code(&self) -> Option<&CouponCode> { self.coupon_code.as_ref() }
    pub fn payment_method(&self) -> &str { &self.payment_method }
    pub fn payment_status(&self) -> PaymentStatus { self.payment_status }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn mp_payment_id(&self) -> Option<&str> { self.mp_payment_id.as_deref() }
    pub fn mp_status(&self) -> Option<&ProviderStatus> { self.mp_status.as_ref() }
    pub fn mp_status_detail(&self) -> Option<&str> { self.mp_status_detail.as_deref() }
    pub fn coupon_redeemed(&self) -> bool { self.coupon_redeemed }
    pub fn notes(&self) -> Option<&str> { self.notes.as_deref() }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    /// True when `draft` describes exactly this order.
    pub fn matches(&self, draft: &OrderDraft) -> bool {
        self.user_id == draft.user_id
            && self.customer == draft.customer
            && self.shipping_address == draft.shipping_address
            && self.coupon_code == draft.coupon_code
            && self.payment_method == draft.payment_method
            && self.notes == draft.notes
            && self.items.len() == draft.cart.item_count()
            && self.items.iter().zip(draft.cart.items()).all(|(line, item)| {
                line.product_id == item.product_id && line.variant == item.variant && line.quantity == item.quantity
            })
    }

    /// A locked order can no longer be replaced by a different draft: it is paid, has
    /// left `pending`, or has a processor payment still in flight.
    pub fn is_locked(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
            || self.status != OrderStatus::Pending
            || self.mp_status.as_ref().is_some_and(ProviderStatus::is_in_flight)
    }

    /// Replaces the contents of an unlocked order, keeping its identity.
    pub fn replace(&mut self, draft: OrderDraft, items: Vec<LineItem>, totals: Totals) -> Result<(), OrderError> {
        if self.is_locked() { return Err(OrderError::Locked { status: self.status, payment_status: self.payment_status }); }
        self.user_id = draft.user_id;
        self.customer = draft.customer;
        self.shipping_address = draft.shipping_address;
        self.items = items;
        self.totals = totals;
        self.coupon_code = draft.coupon_code;
        self.payment_method = draft.payment_method;
        self.notes = draft.notes;
        self.touch();
        Ok(())
    }

    /// Projects a processor report onto the order.
    ///
    /// The result depends only on the current state and the report, so replaying a
    /// report (or applying the same reports in another order) ends in the same state.
    /// `paid` is terminal for the payment status.
    pub fn apply_settlement(&mut self, settlement: &Settlement) -> SettlementEffect {
        let target = PaymentStatus::from(&settlement.status);
        if self.payment_status == PaymentStatus::Paid && target != PaymentStatus::Paid {
            return SettlementEffect::IgnoredStale;
        }
        let previous = self.payment_status;
        let became_paid = target == PaymentStatus::Paid && previous != PaymentStatus::Paid;
        let repeated = self.mp_payment_id.as_deref() == Some(settlement.payment_id.as_str()) && self.mp_status.as_ref() == Some(&settlement.status);

        self.payment_status = target;
        self.mp_payment_id = Some(settlement.payment_id.clone());
        self.mp_status = Some(settlement.status.clone());
        self.mp_status_detail = settlement.status_detail.clone();
        if target == PaymentStatus::Paid && self.status == OrderStatus::Pending {
            self.status = OrderStatus::Paid;
        }
        self.touch();

        if became_paid {
            self.raise_event(DomainEvent::Order(OrderEvent::PaymentApproved { order_id: self.id, payment_id: settlement.payment_id.clone() }));
        } else if target == PaymentStatus::Rejected && !repeated {
            self.raise_event(DomainEvent::Order(OrderEvent::PaymentRejected {
                order_id: self.id, payment_id: settlement.payment_id.clone(), detail: settlement.status_detail.clone(),
            }));
        }
        SettlementEffect::Applied { became_paid }
    }

    /// Marks the coupon as consumed if the order is paid and has not consumed it yet.
    /// Returns the code the caller must count a use against.
    pub fn claim_coupon_redemption(&mut self) -> Option<CouponCode> {
        if self.payment_status != PaymentStatus::Paid || self.coupon_redeemed { return None; }
        let code = self.coupon_code.clone()?;
        self.coupon_redeemed = true;
        self.raise_event(DomainEvent::Coupon(CouponEvent::Redeemed { code: code.to_string(), order_id: self.id }));
        Some(code)
    }

    /// Admin status change. Returns `false` when the order already had `target`.
    pub fn transition_to(&mut self, target: OrderStatus) -> Result<bool, OrderError> {
        if target == OrderStatus::Paid { return Err(OrderError::NotAdminTarget(target)); }
        if self.status == target { return Ok(false); }
        if matches!(self.status, OrderStatus::Cancelled | OrderStatus::Delivered) {
            return Err(OrderError::InvalidTransition { from: self.status, to: target });
        }
        let from = self.status;
        self.status = target;
        self.touch();
        let event = match target {
            OrderStatus::Cancelled => OrderEvent::Cancelled { order_id: self.id },
            to => OrderEvent::StatusChanged { order_id: self.id, from, to },
        };
        self.raise_event(DomainEvent::Order(event));
        Ok(true)
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    Locked { status: OrderStatus, payment_status: PaymentStatus },
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    NotAdminTarget(OrderStatus),
}
impl std::error::Error for OrderError {}
impl std::fmt::Display for OrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Locked { status, payment_status } => write!(f, "order is {} with payment {} and can no longer be changed", status, payment_status),
            Self::InvalidTransition { from, to } => write!(f, "cannot move order from {} to {}", from, to),
            Self::NotAdminTarget(s) => write!(f, "status {} is set by payment settlement only", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::cart::CartItem;

    fn draft(product_id: Uuid, coupon: Option<&str>) -> OrderDraft {
        OrderDraft {
            user_id: None,
            customer: Customer { name: "Ana Pérez".into(), email: "ana@example.com".into(), phone: "1122334455".into() },
            shipping_address: ShippingAddress { address: "Av. Siempreviva 742".into(), city: "Springfield".into(), state: "BA".into(), zip: "1000".into() },
            cart: Cart::from_items([CartItem::new(product_id, None, 2).unwrap()]),
            coupon_code: coupon.map(|c| CouponCode::new(c).unwrap()),
            payment_method: "card".into(),
            notes: None,
        }
    }

    fn order_with_coupon() -> Order {
        let product_id = Uuid::new_v4();
        let items = vec![LineItem { product_id, variant: None, name: "Widget".into(), unit_price: Money::from_minor(5000), quantity: Quantity::new(2).unwrap() }];
        let totals = Totals {
            subtotal: Money::from_minor(10000), discount: Money::from_minor(1000), shipping: Money::ZERO,
            tax: Money::from_minor(1440), total: Money::from_minor(10440),
        };
        Order::place(Uuid::new_v4(), draft(product_id, Some("SAVE10")), items, totals)
    }

    fn settlement(status: &str) -> Settlement {
        Settlement { payment_id: "123".into(), status: ProviderStatus::from(status.to_string()), status_detail: Some("accredited".into()) }
    }

    #[test]
    fn test_place_starts_pending() {
        let mut order = order_with_coupon();
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.payment_status(), PaymentStatus::Pending);
        assert!(order.order_number().starts_with("ORD-"));
        assert!(matches!(order.take_events().as_slice(), [DomainEvent::Order(OrderEvent::Created { .. })]));
    }

    #[test]
    fn test_settlement_converges_in_any_order() {
        let base = order_with_coupon();
        let sync = settlement("approved");
        let webhook = settlement("approved");

        let mut a = base.clone();
        a.apply_settlement(&sync);
        a.apply_settlement(&webhook);
        let mut b = base.clone();
        b.apply_settlement(&webhook);
        b.apply_settlement(&sync);

        for o in [&a, &b] {
            assert_eq!(o.status(), OrderStatus::Paid);
            assert_eq!(o.payment_status(), PaymentStatus::Paid);
            assert_eq!(o.mp_payment_id(), Some("123"));
        }
    }

    #[test]
    fn test_only_first_approval_becomes_paid() {
        let mut order = order_with_coupon();
        assert_eq!(order.apply_settlement(&settlement("approved")), SettlementEffect::Applied { became_paid: true });
        assert_eq!(order.apply_settlement(&settlement("approved")), SettlementEffect::Applied { became_paid: false });
        assert_eq!(order.apply_settlement(&settlement("in_process")), SettlementEffect::IgnoredStale);
        assert_eq!(order.payment_status(), PaymentStatus::Paid);
    }

    #[test]
    fn test_rejected_payment_keeps_order_unpaid() {
        let mut order = order_with_coupon();
        order.apply_settlement(&settlement("rejected"));
        assert_eq!(order.payment_status(), PaymentStatus::Rejected);
        assert_ne!(order.status(), OrderStatus::Paid);
        assert!(order.claim_coupon_redemption().is_none());
        assert!(!order.is_locked());
    }

    #[test]
    fn test_unknown_provider_status_maps_to_pending() {
        let mut order = order_with_coupon();
        order.apply_settlement(&settlement("authorized"));
        assert_eq!(order.payment_status(), PaymentStatus::Pending);
        assert_eq!(order.mp_status(), Some(&ProviderStatus::Other("authorized".into())));
    }

    #[test]
    fn test_coupon_claimed_once() {
        let mut order = order_with_coupon();
        order.apply_settlement(&settlement("approved"));
        assert_eq!(order.claim_coupon_redemption().map(|c| c.to_string()), Some("SAVE10".to_string()));
        assert!(order.claim_coupon_redemption().is_none());
        assert!(order.coupon_redeemed());
    }

    #[test]
    fn test_settlement_preserves_fulfillment_status() {
        let mut order = order_with_coupon();
        order.apply_settlement(&settlement("approved"));
        order.transition_to(OrderStatus::Shipped).unwrap();
        order.apply_settlement(&settlement("approved"));
        assert_eq!(order.status(), OrderStatus::Shipped);
    }

    #[test]
    fn test_admin_transitions() {
        let mut order = order_with_coupon();
        assert_eq!(order.transition_to(OrderStatus::Paid), Err(OrderError::NotAdminTarget(OrderStatus::Paid)));
        assert_eq!(order.transition_to(OrderStatus::Processing), Ok(true));
        assert_eq!(order.transition_to(OrderStatus::Processing), Ok(false));
        assert_eq!(order.transition_to(OrderStatus::Delivered), Ok(true));
        assert_eq!(order.transition_to(OrderStatus::Cancelled), Err(OrderError::InvalidTransition { from: OrderStatus::Delivered, to: OrderStatus::Cancelled }));

        let mut cancelled = order_with_coupon();
        cancelled.transition_to(OrderStatus::Cancelled).unwrap();
        assert!(cancelled.transition_to(OrderStatus::Processing).is_err());
        assert!(cancelled.take_events().iter().any(|e| matches!(e, DomainEvent::Order(OrderEvent::Cancelled { .. }))));
    }

    #[test]
    fn test_matches_and_lock() {
        let mut order = order_with_coupon();
        let product_id = order.items()[0].product_id;
        assert!(order.matches(&draft(product_id, Some("save10"))));
        assert!(!order.matches(&draft(product_id, None)));

        order.apply_settlement(&settlement("in_process"));
        assert!(order.is_locked());
        assert!(order.replace(draft(product_id, None), vec![], *order.totals()).is_err());
    }

    #[test]
    fn test_status_strings_round_trip() {
        for s in ["pending", "paid", "processing", "shipped", "delivered", "cancelled"] {
            assert_eq!(s.parse::<OrderStatus>().unwrap().as_str(), s);
        }
        assert!("refunded".parse::<PaymentStatus>().is_err());
    }
}
