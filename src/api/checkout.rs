use axum::{extract::{Path, State}, http::StatusCode, Json};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;
use crate::domain::aggregates::{Cart, CartItem, Customer, Order, OrderDraft, ShippingAddress};
use crate::domain::value_objects::CouponCode;
use crate::services::Quote;
use crate::{Result, StorefrontError};
use super::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: Uuid,
    #[serde(default)]
    pub variant: Option<String>,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    #[serde(default)]
    pub items: Vec<CartLine>,
    #[serde(default)]
    pub coupon_code: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct OrderRequest {
    pub user_id: Option<Uuid>,
    #[validate(length(min = 1, max = 100, message = "first name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100, message = "last name is required"))]
    pub last_name: String,
    #[validate(email(message = "email is invalid"))]
    pub email: String,
    #[validate(length(min = 6, max = 30, message = "phone is required"))]
    pub phone: String,
    #[validate(length(min = 1, max = 200, message = "address is required"))]
    pub address: String,
    #[validate(length(min = 1, max = 100, message = "city is required"))]
    pub city: String,
    #[validate(length(min = 1, max = 100, message = "state is required"))]
    pub state: String,
    #[validate(length(min = 1, max = 20, message = "zip code is required"))]
    pub zip_code: String,
    pub items: Vec<CartLine>,
    pub coupon_code: Option<String>,
    #[validate(length(min = 1, max = 50, message = "payment method is required"))]
    pub payment_method: String,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

fn build_cart(lines: Vec<CartLine>) -> Result<Cart> {
    let items = lines.into_iter()
        .map(|l| CartItem::new(l.product_id, l.variant.filter(|v| !v.trim().is_empty()), l.quantity))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(Cart::from_items(items))
}

fn parse_coupon(raw: Option<String>) -> Result<Option<CouponCode>> {
    match raw {
        Some(code) if !code.trim().is_empty() => Ok(Some(CouponCode::new(code)?)),
        _ => Ok(None),
    }
}

impl OrderRequest {
    fn normalized(self) -> Self {
        let trim = |s: String| s.trim().to_string();
        Self {
            first_name: trim(self.first_name),
            last_name: trim(self.last_name),
            email: self.email.trim().to_lowercase(),
            phone: trim(self.phone),
            address: trim(self.address),
            city: trim(self.city),
            state: trim(self.state),
            zip_code: trim(self.zip_code),
            payment_method: trim(self.payment_method),
            notes: self.notes.map(trim).filter(|n| !n.is_empty()),
            ..self
        }
    }

    pub fn into_draft(self) -> Result<OrderDraft> {
        let req = self.normalized();
        req.validate()?;
        let cart = build_cart(req.items)?;
        if cart.is_empty() { return Err(StorefrontError::EmptyCart); }
        Ok(OrderDraft {
            user_id: req.user_id,
            customer: Customer { name: format!("{} {}", req.first_name, req.last_name), email: req.email, phone: req.phone },
            shipping_address: ShippingAddress { address: req.address, city: req.city, state: req.state, zip: req.zip_code },
            cart,
            coupon_code: parse_coupon(req.coupon_code)?,
            payment_method: req.payment_method,
            notes: req.notes,
        })
    }
}

pub async fn quote(State(s): State<AppState>, Json(req): Json<QuoteRequest>) -> Result<Json<Quote>> {
    let cart = build_cart(req.items)?;
    let coupon = parse_coupon(req.coupon_code)?;
    Ok(Json(s.orders.quote(&cart, coupon.as_ref()).await?))
}

/// Creates the order under the client's id, or returns it if it already exists.
pub async fn put_order(State(s): State<AppState>, Path(id): Path<Uuid>, Json(req): Json<OrderRequest>) -> Result<(StatusCode, Json<Order>)> {
    let draft = req.into_draft()?;
    let (order, created) = s.orders.place_order(id, draft).await?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(order)))
}

pub async fn get_order(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    Ok(Json(s.orders.get_order(id).await?))
}
