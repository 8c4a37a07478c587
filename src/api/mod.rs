//! HTTP surface.

pub mod admin;
pub mod catalog;
pub mod checkout;
pub mod payments;

use std::sync::Arc;
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, warn};
use crate::config::Config;
use crate::domain::aggregates::{OrderError, ProductError};
use crate::domain::pricing::{PricingConfig, PricingEngine};
use crate::messaging::EventBus;
use crate::payments::PaymentGateway;
use crate::persistence::{CouponRepository, OrderRepository, ProductRepository};
use crate::services::{secrets_match, OrderService, PaymentService};
use crate::StorefrontError;

#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
    pub catalog: Arc<dyn ProductRepository>,
    pub coupons: Arc<dyn CouponRepository>,
    admin_token: Option<Arc<str>>,
}

/// Settings the HTTP layer needs beyond its collaborators.
#[derive(Clone, Debug, Default)]
pub struct Settings {
    pub pricing: PricingConfig,
    pub webhook_secret: Option<String>,
    pub admin_token: Option<String>,
}

impl From<&Config> for Settings {
    fn from(c: &Config) -> Self {
        Self { pricing: c.pricing, webhook_secret: c.webhook_secret.clone(), admin_token: c.admin_token.clone() }
    }
}

impl AppState {
    /// Wires the services over one store implementing every repository.
    pub fn new<S>(store: Arc<S>, gateway: Arc<dyn PaymentGateway>, events: EventBus, settings: Settings) -> Self
    where
        S: OrderRepository + ProductRepository + CouponRepository + 'static,
    {
        let orders = OrderService::new(store.clone(), store.clone(), store.clone(), PricingEngine::new(settings.pricing), events.clone());
        let payments = PaymentService::new(store.clone(), gateway, events, settings.webhook_secret);
        Self {
            orders: Arc::new(orders),
            payments: Arc::new(payments),
            catalog: store.clone(),
            coupons: store,
            admin_token: settings.admin_token.map(Arc::from),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/orders", get(admin::list_orders))
        .route("/orders/:id/status", put(admin::update_order_status))
        .route("/coupons", get(admin::list_coupons).post(admin::create_coupon))
        .route("/coupons/:code", delete(admin::delete_coupon))
        .route("/coupons/:code/active", put(admin::set_coupon_active))
        .route("/products", post(admin::create_product))
        .route("/products/:id", put(admin::update_product).delete(admin::delete_product))
        .route("/analytics", get(admin::analytics))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    let api = Router::new()
        .route("/products", get(catalog::list_products))
        .route("/products/:slug", get(catalog::get_product))
        .route("/checkout/quote", post(checkout::quote))
        .route("/orders/:id", get(checkout::get_order).put(checkout::put_order))
        .route("/payment/create", post(payments::create_payment))
        .route("/payment/webhook", post(payments::webhook))
        .nest("/admin", admin);

    Router::new()
        .route("/health", get(|| async { Json(json!({"status": "healthy", "service": "storefront-settlement"})) }))
        .nest("/api/v1", api)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
        .with_state(state)
}

async fn require_admin(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, StorefrontError> {
    let provided = req.headers().get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match (state.admin_token.as_deref(), provided) {
        (Some(expected), Some(token)) if secrets_match(expected, token.trim()) => Ok(next.run(req).await),
        _ => Err(StorefrontError::Unauthorized),
    }
}

// =============================================================================
// Error responses
// =============================================================================

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl StorefrontError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Order(OrderError::NotAdminTarget(_)) => StatusCode::BAD_REQUEST,
            Self::EmptyCart | Self::Coupon(_) | Self::Product(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) | Self::Order(_) => StatusCode::CONFLICT,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Gateway(_) => StatusCode::BAD_GATEWAY,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::EmptyCart => "empty_cart",
            Self::Coupon(r) => r.code(),
            Self::Product(ProductError::Unavailable { .. }) => "product_unavailable",
            Self::Product(ProductError::InsufficientStock { .. }) => "insufficient_stock",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Order(OrderError::Locked { .. }) => "order_locked",
            Self::Order(OrderError::InvalidTransition { .. }) => "invalid_transition",
            Self::Order(OrderError::NotAdminTarget(_)) => "status_not_settable",
            Self::Unauthorized => "unauthorized",
            Self::Gateway(_) => "payment_processor_error",
            Self::Database(_) | Self::Internal(_) => "internal_error",
        }
    }

    /// Message safe to show to clients. Upstream and internal details stay in the logs.
    fn response_message(&self) -> String {
        match self {
            Self::Gateway(_) => "The payment processor could not complete the request".to_string(),
            Self::Database(_) | Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for StorefrontError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(code = self.code(), error = %self, "request failed");
        } else if status == StatusCode::CONFLICT {
            warn!(code = self.code(), error = %self, "request conflicted");
        }
        let details = match &self {
            Self::Coupon(r) => serde_json::to_value(r).ok(),
            _ => None,
        };
        let body = ErrorBody {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            code: self.code(),
            message: self.response_message(),
            details,
        };
        (status, Json(body)).into_response()
    }
}
