use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use delivery_relay::api::rest::router;
use delivery_relay::config::Config;
use delivery_relay::state::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;

fn setup() -> Router {
    router(Arc::new(AppState::new(&Config::default())))
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn put_request(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Registers a user and returns `(id, token)`.
async fn register(app: &Router, name: &str, email: &str, role: &str) -> (String, String) {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/users",
            None,
            json!({ "name": name, "email": email, "role": role }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    (
        body["user"]["id"].as_str().unwrap().to_string(),
        body["token"].as_str().unwrap().to_string(),
    )
}

async fn create_order(app: &Router, vendor_token: &str) -> String {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/orders",
            Some(vendor_token),
            json!({
                "items": ["2x margherita", "garlic bread"],
                "pickupAddress": "12 Baker Street",
                "dropoffAddress": "221 Elm Road",
                "customerDetails": { "name": "Sam", "phone": "555-0100" }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_returns_ok() {
    let app = setup();
    let response = app.oneshot(get_request("/health", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["users"], 0);
    assert_eq!(body["orders"], 0);
    assert_eq!(body["connections"], 0);
    assert_eq!(body["topics"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let app = setup();
    let response = app.oneshot(get_request("/metrics", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("active_connections"));
}

#[tokio::test]
async fn register_returns_user_and_token() {
    let app = setup();
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/users",
            None,
            json!({ "name": "Rita", "email": "Rita@Example.com", "role": "deliveryPartner" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    assert_eq!(body["user"]["name"], "Rita");
    assert_eq!(body["user"]["email"], "rita@example.com");
    assert_eq!(body["user"]["role"], "deliveryPartner");
    assert!(body["user"]["activeOrderId"].is_null());
    let token = body["token"].as_str().unwrap();

    let response = app
        .oneshot(get_request("/api/auth/me", Some(token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let me = body_json(response).await;
    assert_eq!(me["id"], body["user"]["id"]);
}

#[tokio::test]
async fn refresh_issues_a_working_token() {
    let app = setup();
    let (user_id, token) = register(&app, "Rita", "rita@example.com", "deliveryPartner").await;

    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/auth/refresh", Some(&token), json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let refreshed = body_json(response).await["token"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .clone()
        .oneshot(get_request("/api/auth/me", Some(&refreshed)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["id"], user_id);

    let response = app
        .oneshot(json_request("POST", "/api/auth/refresh", None, json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn register_rejects_duplicate_email() {
    let app = setup();
    register(&app, "Vera", "vera@example.com", "vendor").await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/users",
            None,
            json!({ "name": "Other Vera", "email": "vera@example.com", "role": "vendor" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn register_rejects_blank_name() {
    let app = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/users",
            None,
            json!({ "name": "  ", "email": "blank@example.com", "role": "vendor" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("name"));
}

#[tokio::test]
async fn protected_routes_require_a_valid_token() {
    let app = setup();

    let response = app
        .clone()
        .oneshot(get_request("/api/orders/vendor", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(get_request("/api/orders/vendor", Some("not-a-token")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn partner_cannot_create_orders() {
    let app = setup();
    let (_, partner_token) = register(&app, "Paul", "paul@example.com", "deliveryPartner").await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/orders",
            Some(&partner_token),
            json!({
                "items": ["soup"],
                "pickupAddress": "a",
                "dropoffAddress": "b"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn create_order_rejects_empty_items() {
    let app = setup();
    let (_, vendor_token) = register(&app, "Vik", "vik@example.com", "vendor").await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/orders",
            Some(&vendor_token),
            json!({ "items": [], "pickupAddress": "a", "dropoffAddress": "b" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_order_returns_404() {
    let app = setup();
    let (_, vendor_token) = register(&app, "Vik", "vik@example.com", "vendor").await;
    let fake_id = "00000000-0000-0000-0000-000000000000";

    let response = app
        .clone()
        .oneshot(get_request(&format!("/api/orders/{fake_id}/track"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(get_request(&format!("/api/location/order/{fake_id}"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(put_request(&format!("/api/orders/{fake_id}/cancel"), &vendor_token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn partner_without_order_gets_404_for_active_order() {
    let app = setup();
    let (_, partner_token) = register(&app, "Paul", "paul@example.com", "deliveryPartner").await;

    let response = app
        .oneshot(get_request("/api/orders/delivery", Some(&partner_token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn full_delivery_flow() {
    let app = setup();
    let (vendor_id, vendor_token) = register(&app, "Vendor V", "v@example.com", "vendor").await;
    let (partner_id, partner_token) =
        register(&app, "Partner P", "p@example.com", "deliveryPartner").await;
    let order_id = create_order(&app, &vendor_token).await;

    let res = app
        .clone()
        .oneshot(get_request(
            "/api/orders/delivery-partners/available",
            Some(&vendor_token),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let available = body_json(res).await;
    assert_eq!(available.as_array().unwrap().len(), 1);
    assert_eq!(available[0]["id"], partner_id);

    let res = app
        .clone()
        .oneshot(get_request(&format!("/api/orders/{order_id}/track"), None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/orders/{order_id}/assign"),
            Some(&vendor_token),
            json!({ "deliveryPartnerId": partner_id }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let assigned = body_json(res).await;
    assert_eq!(assigned["status"], "assigned");
    assert_eq!(assigned["deliveryPartnerId"], partner_id);

    let res = app
        .clone()
        .oneshot(get_request(
            "/api/orders/delivery-partners/available",
            Some(&vendor_token),
        ))
        .await
        .unwrap();
    assert!(body_json(res).await.as_array().unwrap().is_empty());

    let res = app
        .clone()
        .oneshot(get_request("/api/orders/delivery", Some(&partner_token)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["id"], order_id);

    // Partner moves before pickup: only their own position changes.
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/location/update",
            Some(&partner_token),
            json!({ "lat": 51.5, "lng": -0.12 }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["orderLocationUpdated"], false);

    let res = app
        .clone()
        .oneshot(put_request(&format!("/api/orders/{order_id}/start"), &partner_token))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["status"], "in_transit");

    // No order location yet, so the partner's last position is served.
    let res = app
        .clone()
        .oneshot(get_request(&format!("/api/location/order/{order_id}"), None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["lat"], 51.5);
    assert_eq!(body["lng"], -0.12);
    assert!(body.get("timestamp").is_none());

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/location/update",
            Some(&partner_token),
            json!({ "orderId": order_id, "lat": 51.51, "lng": -0.13 }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["orderLocationUpdated"], true);
    assert_eq!(body["location"]["lat"], 51.51);

    let res = app
        .clone()
        .oneshot(get_request(&format!("/api/location/order/{order_id}"), None))
        .await
        .unwrap();
    let body = body_json(res).await;
    assert_eq!(body["lat"], 51.51);
    assert!(body["timestamp"].is_string());

    let res = app
        .clone()
        .oneshot(get_request(&format!("/api/orders/{order_id}/track"), None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let view = body_json(res).await;
    assert_eq!(view["vendorName"], "Vendor V");
    assert_eq!(view["deliveryPartner"]["id"], partner_id);
    assert_eq!(view["deliveryPartner"]["currentLocation"]["lat"], 51.51);
    assert_eq!(view["order"]["currentDeliveryLocation"]["lng"], -0.13);

    let res = app
        .clone()
        .oneshot(put_request(&format!("/api/orders/{order_id}/deliver"), &partner_token))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["status"], "delivered");

    let res = app
        .clone()
        .oneshot(get_request("/api/orders/vendor", Some(&vendor_token)))
        .await
        .unwrap();
    let orders = body_json(res).await;
    assert_eq!(orders.as_array().unwrap().len(), 1);
    assert_eq!(orders[0]["vendorId"], vendor_id);
    assert_eq!(orders[0]["status"], "delivered");

    let res = app
        .oneshot(get_request("/api/auth/me", Some(&partner_token)))
        .await
        .unwrap();
    assert!(body_json(res).await["activeOrderId"].is_null());
}

#[tokio::test]
async fn other_partner_cannot_report_location_for_order() {
    let app = setup();
    let (_, vendor_token) = register(&app, "Vendor V", "v@example.com", "vendor").await;
    let (partner_id, partner_token) =
        register(&app, "Partner P", "p@example.com", "deliveryPartner").await;
    let (_, intruder_token) =
        register(&app, "Partner Q", "q@example.com", "deliveryPartner").await;
    let order_id = create_order(&app, &vendor_token).await;

    let res = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/orders/{order_id}/assign"),
            Some(&vendor_token),
            json!({ "deliveryPartnerId": partner_id }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .clone()
        .oneshot(put_request(&format!("/api/orders/{order_id}/start"), &partner_token))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/location/update",
            Some(&intruder_token),
            json!({ "orderId": order_id, "lat": 10.0, "lng": 10.0 }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = app
        .oneshot(get_request(&format!("/api/location/order/{order_id}"), None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancel_assigned_order_frees_partner() {
    let app = setup();
    let (_, vendor_token) = register(&app, "Vendor V", "v@example.com", "vendor").await;
    let (partner_id, partner_token) =
        register(&app, "Partner P", "p@example.com", "deliveryPartner").await;
    let order_id = create_order(&app, &vendor_token).await;

    let res = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/orders/{order_id}/assign"),
            Some(&vendor_token),
            json!({ "deliveryPartnerId": partner_id }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .clone()
        .oneshot(put_request(&format!("/api/orders/{order_id}/cancel"), &vendor_token))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let cancelled = body_json(res).await;
    assert_eq!(cancelled["status"], "cancelled");
    assert!(cancelled["deliveryPartnerId"].is_null());

    let res = app
        .clone()
        .oneshot(put_request(&format!("/api/orders/{order_id}/start"), &partner_token))
        .await
        .unwrap();
    assert!(matches!(
        res.status(),
        StatusCode::FORBIDDEN | StatusCode::CONFLICT
    ));

    let res = app
        .oneshot(get_request(
            "/api/orders/delivery-partners/available",
            Some(&vendor_token),
        ))
        .await
        .unwrap();
    let available = body_json(res).await;
    assert_eq!(available.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn assigning_a_busy_partner_conflicts() {
    let app = setup();
    let (_, vendor_token) = register(&app, "Vendor V", "v@example.com", "vendor").await;
    let (partner_id, _) = register(&app, "Partner P", "p@example.com", "deliveryPartner").await;
    let first = create_order(&app, &vendor_token).await;
    let second = create_order(&app, &vendor_token).await;

    let res = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/orders/{first}/assign"),
            Some(&vendor_token),
            json!({ "deliveryPartnerId": partner_id }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .oneshot(json_request(
            "PUT",
            &format!("/api/orders/{second}/assign"),
            Some(&vendor_token),
            json!({ "deliveryPartnerId": partner_id }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}
