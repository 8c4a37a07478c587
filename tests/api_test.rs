mod common;

use axum::http::{Method, StatusCode};
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;
use storefront_settlement::domain::aggregates::{PaymentStatus, ProviderStatus};
use storefront_settlement::payments::PaymentDetails;
use storefront_settlement::persistence::{CouponRepository, OrderRepository};
use storefront_settlement::domain::value_objects::CouponCode;
use common::{json_body, money, TestApp, WEBHOOK_SECRET};

#[tokio::test]
async fn test_health() {
    let app = TestApp::new().await;
    let response = app.request(Method::GET, "/health", None, &[]).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "healthy");
}

#[tokio::test]
async fn test_product_listing_filters_and_paginates() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/api/v1/products?limit=2", None, &[]).await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = json_body(response).await;
    assert_eq!(page["total"], 3);
    assert_eq!(page["totalPages"], 2);
    assert_eq!(page["hasNextPage"], true);
    assert_eq!(page["hasPreviousPage"], false);
    assert_eq!(page["items"].as_array().unwrap().len(), 2);

    let page = json_body(app.request(Method::GET, "/api/v1/products?categories=protein&inStock=true", None, &[]).await).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["name"], "Whey Protein");

    let page = json_body(app.request(Method::GET, "/api/v1/products?onSale=true&maxPrice=10", None, &[]).await).await;
    assert_eq!(page["items"][0]["slug"], "protein-bar");
}

#[tokio::test]
async fn test_product_by_slug() {
    let app = TestApp::new().await;
    let response = app.request(Method::GET, "/api/v1/products/widget", None, &[]).await;
    assert_eq!(response.status(), StatusCode::OK);
    let missing = app.request(Method::GET, "/api/v1/products/retired", None, &[]).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(missing).await["code"], "not_found");
}

#[tokio::test]
async fn test_quote_save10() {
    let app = TestApp::new().await;
    let body = json!({ "items": [{ "productId": app.widget.id, "quantity": 2 }], "couponCode": "save10" });
    let response = app.request(Method::POST, "/api/v1/checkout/quote", Some(body), &[]).await;
    assert_eq!(response.status(), StatusCode::OK);
    let quote = json_body(response).await;
    assert_eq!(money(&quote["subtotal"]), dec!(100));
    assert_eq!(money(&quote["discount"]), dec!(10));
    assert_eq!(money(&quote["shipping"]), dec!(0));
    assert_eq!(money(&quote["tax"]), dec!(14.40));
    assert_eq!(money(&quote["total"]), dec!(104.40));
}

#[tokio::test]
async fn test_quote_rejections() {
    let app = TestApp::new().await;
    let empty = app.request(Method::POST, "/api/v1/checkout/quote", Some(json!({ "items": [] })), &[]).await;
    assert_eq!(empty.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json_body(empty).await["code"], "empty_cart");

    let body = json!({ "items": [{ "productId": app.widget.id, "quantity": 1 }], "couponCode": "BOGUS" });
    let unknown = app.request(Method::POST, "/api/v1/checkout/quote", Some(body), &[]).await;
    assert_eq!(unknown.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let error = json_body(unknown).await;
    assert_eq!(error["code"], "coupon_not_found");
    assert_eq!(error["details"]["reason"], "not_found");
}

#[tokio::test]
async fn test_put_order_creates_then_retrieves() {
    let app = TestApp::new().await;
    let uri = format!("/api/v1/orders/{}", Uuid::new_v4());

    let created = app.request(Method::PUT, &uri, Some(app.order_body(2, Some("SAVE10"))), &[]).await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let first = json_body(created).await;
    assert_eq!(first["status"], "pending");
    assert_eq!(money(&first["total"]), dec!(104.40));

    let again = app.request(Method::PUT, &uri, Some(app.order_body(2, Some("SAVE10"))), &[]).await;
    assert_eq!(again.status(), StatusCode::OK);
    assert_eq!(json_body(again).await["orderNumber"], first["orderNumber"]);
    assert_eq!(app.store.order_count().await, 1);

    let fetched = app.request(Method::GET, &uri, None, &[]).await;
    assert_eq!(fetched.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_put_order_validation() {
    let app = TestApp::new().await;
    let mut body = app.order_body(1, None);
    body["email"] = json!("not-an-email");
    let response = app.request(Method::PUT, &format!("/api/v1/orders/{}", Uuid::new_v4()), Some(body), &[]).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "validation_error");

    let too_many = app.request(Method::PUT, &format!("/api/v1/orders/{}", Uuid::new_v4()), Some(app.order_body(21, None)), &[]).await;
    assert_eq!(too_many.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json_body(too_many).await["code"], "insufficient_stock");
}

#[tokio::test]
async fn test_payment_flow_settles_order_and_redeems_coupon() {
    let app = TestApp::new().await;
    let order_id = Uuid::new_v4();
    let uri = format!("/api/v1/orders/{}", order_id);
    app.request(Method::PUT, &uri, Some(app.order_body(2, Some("SAVE10"))), &[]).await;

    let body = json!({ "orderId": order_id, "formData": { "token": "card-token", "installments": 1, "payment_method_id": "visa" } });
    let response = app.request(Method::POST, "/api/v1/payment/create", Some(body.clone()), &[("x-idempotency-key", "attempt-1")]).await;
    assert_eq!(response.status(), StatusCode::OK);
    let payment = json_body(response).await;
    assert_eq!(payment["status"], "approved");
    assert_eq!(payment["status_detail"], "accredited");

    let order = json_body(app.request(Method::GET, &uri, None, &[]).await).await;
    assert_eq!(order["paymentStatus"], "paid");
    assert_eq!(order["status"], "paid");
    assert_eq!(order["mpPaymentId"], payment["id"]);

    // webhook for the same payment converges on the same state
    let hook = app.request(
        Method::POST, &format!("/api/v1/payment/webhook?secret={}", WEBHOOK_SECRET),
        Some(json!({ "type": "payment", "data": { "id": payment["id"] } })), &[],
    ).await;
    assert_eq!(json_body(hook).await, json!({ "received": true }));

    // a retry on a paid order answers from the record without charging
    let retry = app.request(Method::POST, "/api/v1/payment/create", Some(body), &[("x-idempotency-key", "attempt-2")]).await;
    assert_eq!(json_body(retry).await["id"], payment["id"]);
    assert_eq!(app.gateway.charges(), 1);

    let coupon = app.store.find_coupon(&CouponCode::new("SAVE10").unwrap()).await.unwrap().unwrap();
    assert_eq!(coupon.times_used, 1);

    // paid orders refuse changed submissions
    let changed = app.request(Method::PUT, &uri, Some(app.order_body(3, None)), &[]).await;
    assert_eq!(changed.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_payment_create_requires_order_and_form() {
    let app = TestApp::new().await;
    let response = app.request(Method::POST, "/api/v1/payment/create", Some(json!({ "orderId": Uuid::new_v4() })), &[]).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json!({ "orderId": Uuid::new_v4(), "formData": { "token": "t" } });
    let response = app.request(Method::POST, "/api/v1/payment/create", Some(body), &[]).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_webhook_without_secret_changes_nothing() {
    let app = TestApp::new().await;
    let order_id = Uuid::new_v4();
    app.request(Method::PUT, &format!("/api/v1/orders/{}", order_id), Some(app.order_body(1, None)), &[]).await;
    app.gateway.seed(PaymentDetails { id: "321".into(), status: ProviderStatus::Approved, status_detail: None, order_id: Some(order_id) });
    let notification = json!({ "type": "payment", "data": { "id": 321 } });

    for uri in ["/api/v1/payment/webhook", "/api/v1/payment/webhook?secret=wrong"] {
        let response = app.request(Method::POST, uri, Some(notification.clone()), &[]).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "ok": true }));
    }
    let order = app.store.find_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.payment_status(), PaymentStatus::Pending);

    let uri = format!("/api/v1/payment/webhook?secret={}", WEBHOOK_SECRET);
    let response = app.request(Method::POST, &uri, Some(notification), &[]).await;
    assert_eq!(json_body(response).await, json!({ "received": true }));
    let order = app.store.find_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.payment_status(), PaymentStatus::Paid);
}

#[tokio::test]
async fn test_webhook_always_acknowledges() {
    let app = TestApp::new().await;
    let uri = format!("/api/v1/payment/webhook?secret={}", WEBHOOK_SECRET);

    let ignored = app.request(Method::POST, &uri, Some(json!({ "type": "plan" })), &[]).await;
    assert_eq!(json_body(ignored).await, json!({ "ignored": true }));
    let missing = app.request(Method::POST, &uri, Some(json!({ "type": "payment" })), &[]).await;
    assert_eq!(json_body(missing).await, json!({ "missing": "paymentId" }));
    let malformed = app.request(Method::POST, &uri, Some(json!({ "type": "payment", "data": { "id": "1/../refunds" } })), &[]).await;
    assert_eq!(json_body(malformed).await, json!({ "missing": "paymentId" }));
    let failed = app.request(Method::POST, &uri, Some(json!({ "type": "payment", "data": { "id": "404404" } })), &[]).await;
    assert_eq!(failed.status(), StatusCode::OK);
    assert_eq!(json_body(failed).await, json!({ "received": false }));
}

#[tokio::test]
async fn test_admin_requires_token() {
    let app = TestApp::new().await;
    let response = app.request(Method::GET, "/api/v1/admin/orders", None, &[]).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let response = app.request(Method::GET, "/api/v1/admin/orders", None, &[("authorization", "Bearer wrong")]).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(app.admin(Method::GET, "/api/v1/admin/orders", None).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_admin_order_transitions() {
    let app = TestApp::new().await;
    let order_id = Uuid::new_v4();
    app.request(Method::PUT, &format!("/api/v1/orders/{}", order_id), Some(app.order_body(1, None)), &[]).await;
    let uri = format!("/api/v1/admin/orders/{}/status", order_id);

    let response = app.admin(Method::PUT, &uri, Some(json!({ "status": "paid" }))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.admin(Method::PUT, &uri, Some(json!({ "status": "cancelled" }))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "cancelled");

    let response = app.admin(Method::PUT, &uri, Some(json!({ "status": "shipped" }))).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(response).await["code"], "invalid_transition");

    let listed = json_body(app.admin(Method::GET, "/api/v1/admin/orders?status=cancelled", None).await).await;
    assert_eq!(listed["total"], 1);
}

#[tokio::test]
async fn test_admin_coupons_and_analytics() {
    let app = TestApp::new().await;
    let body = json!({ "code": "welcome5", "discountType": "fixed", "discountValue": "5", "maxUses": 100 });
    let created = app.admin(Method::POST, "/api/v1/admin/coupons", Some(body.clone())).await;
    assert_eq!(created.status(), StatusCode::CREATED);
    assert_eq!(json_body(created).await["code"], "WELCOME5");
    assert_eq!(app.admin(Method::POST, "/api/v1/admin/coupons", Some(body)).await.status(), StatusCode::CONFLICT);

    let deactivated = app.admin(Method::PUT, "/api/v1/admin/coupons/welcome5/active", Some(json!({ "active": false }))).await;
    assert_eq!(json_body(deactivated).await["isActive"], false);
    assert_eq!(app.admin(Method::DELETE, "/api/v1/admin/coupons/WELCOME5", None).await.status(), StatusCode::NO_CONTENT);
    assert_eq!(app.admin(Method::DELETE, "/api/v1/admin/coupons/WELCOME5", None).await.status(), StatusCode::NOT_FOUND);

    let order_id = Uuid::new_v4();
    app.request(Method::PUT, &format!("/api/v1/orders/{}", order_id), Some(app.order_body(2, Some("SAVE10"))), &[]).await;
    let body = json!({ "orderId": order_id, "formData": { "token": "t" } });
    app.request(Method::POST, "/api/v1/payment/create", Some(body), &[("x-idempotency-key", "k")]).await;

    let summary = json_body(app.admin(Method::GET, "/api/v1/admin/analytics", None).await).await;
    assert_eq!(summary["paidOrders"], 1);
    assert_eq!(money(&summary["revenue"]), dec!(104.40));
    assert_eq!(money(&summary["discounts"]), dec!(10));
}

#[tokio::test]
async fn test_admin_product_create_and_conflict() {
    let app = TestApp::new().await;
    let body = json!({
        "name": "Creatine Monohydrate", "description": "300 g", "price": "42.50",
        "compareAtPrice": "50", "category": "supplements", "stock": 8, "images": ["https://cdn.example.com/c.jpg"],
    });
    let anonymous = app.request(Method::POST, "/api/v1/admin/products", Some(body.clone()), &[]).await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let created = app.admin(Method::POST, "/api/v1/admin/products", Some(body.clone())).await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let product = json_body(created).await;
    assert_eq!(product["slug"], "creatine-monohydrate");
    assert_eq!(money(&product["price"]), dec!(42.50));
    assert_eq!(product["isActive"], true);

    let fetched = json_body(app.request(Method::GET, "/api/v1/products/creatine-monohydrate", None, &[]).await).await;
    assert_eq!(fetched["id"], product["id"]);
    let page = json_body(app.request(Method::GET, "/api/v1/products?categories=supplements", None, &[]).await).await;
    assert_eq!(page["total"], 1);

    let duplicate = app.admin(Method::POST, "/api/v1/admin/products", Some(body)).await;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(duplicate).await["code"], "conflict");

    let negative = json!({ "name": "Broken", "price": "-1" });
    let rejected = app.admin(Method::POST, "/api/v1/admin/products", Some(negative)).await;
    assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
    let unnamed = json!({ "name": "", "price": "1" });
    assert_eq!(app.admin(Method::POST, "/api/v1/admin/products", Some(unnamed)).await.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_product_update_reprices_new_quotes_only() {
    let app = TestApp::new().await;
    let order_id = Uuid::new_v4();
    app.request(Method::PUT, &format!("/api/v1/orders/{}", order_id), Some(app.order_body(2, None)), &[]).await;

    let uri = format!("/api/v1/admin/products/{}", app.widget.id);
    let body = json!({ "name": "Widget", "price": "60", "stock": 20, "category": "tools" });
    let updated = app.admin(Method::PUT, &uri, Some(body)).await;
    assert_eq!(updated.status(), StatusCode::OK);
    let product = json_body(updated).await;
    assert_eq!(money(&product["price"]), dec!(60));
    assert_eq!(product["slug"], "widget");

    let quote = json!({ "items": [{ "productId": app.widget.id, "quantity": 2 }] });
    let quote = json_body(app.request(Method::POST, "/api/v1/checkout/quote", Some(quote), &[]).await).await;
    assert_eq!(money(&quote["subtotal"]), dec!(120));

    let order = json_body(app.request(Method::GET, &format!("/api/v1/orders/{}", order_id), None, &[]).await).await;
    assert_eq!(money(&order["subtotal"]), dec!(100));

    let clash = json!({ "name": "Widget", "slug": "whey-protein", "price": "60" });
    assert_eq!(app.admin(Method::PUT, &uri, Some(clash)).await.status(), StatusCode::CONFLICT);
    let missing = app.admin(Method::PUT, &format!("/api/v1/admin/products/{}", Uuid::new_v4()), Some(json!({ "name": "X", "price": "1" }))).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_product_delete_deactivates() {
    let app = TestApp::new().await;
    let uri = format!("/api/v1/admin/products/{}", app.widget.id);
    assert_eq!(app.request(Method::DELETE, &uri, None, &[]).await.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(app.admin(Method::DELETE, &uri, None).await.status(), StatusCode::NO_CONTENT);

    let missing = app.request(Method::GET, "/api/v1/products/widget", None, &[]).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    let page = json_body(app.request(Method::GET, "/api/v1/products", None, &[]).await).await;
    assert_eq!(page["total"], 2);

    let quote = json!({ "items": [{ "productId": app.widget.id, "quantity": 1 }] });
    let rejected = app.request(Method::POST, "/api/v1/checkout/quote", Some(quote), &[]).await;
    assert_eq!(rejected.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json_body(rejected).await["code"], "product_unavailable");

    let unknown = format!("/api/v1/admin/products/{}", Uuid::new_v4());
    assert_eq!(app.admin(Method::DELETE, &unknown, None).await.status(), StatusCode::NOT_FOUND);
}
