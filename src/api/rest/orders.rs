use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::identity::AuthUser;
use crate::models::event::{AssignOrder, StartDelivery};
use crate::models::location::GeoPoint;
use crate::models::order::{CustomerDetails, Order};
use crate::models::user::Role;
use crate::state::AppState;
use crate::store::StoreError;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/orders", post(create_order))
        .route("/api/orders/vendor", get(vendor_orders))
        .route("/api/orders/delivery", get(partner_active_order))
        .route(
            "/api/orders/delivery-partners/available",
            get(available_partners),
        )
        .route("/api/orders/:id/assign", put(assign_order))
        .route("/api/orders/:id/start", put(start_delivery))
        .route("/api/orders/:id/deliver", put(complete_delivery))
        .route("/api/orders/:id/cancel", put(cancel_order))
        .route("/api/orders/:id/track", get(track_order))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub items: Vec<String>,
    pub pickup_address: String,
    pub dropoff_address: String,
    pub customer_details: Option<CustomerDetails>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    pub delivery_partner_id: Uuid,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedPartner {
    pub id: Uuid,
    pub name: String,
    pub current_location: Option<GeoPoint>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingView {
    pub order: Order,
    pub vendor_name: Option<String>,
    pub delivery_partner: Option<TrackedPartner>,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    identity.require_role(Role::Vendor)?;

    let items: Vec<String> = payload
        .items
        .into_iter()
        .map(|item| item.trim().to_string())
        .collect();
    if items.is_empty() || items.iter().any(|item| item.is_empty()) {
        return Err(AppError::Validation(
            "items must be a non-empty list of descriptions".to_string(),
        ));
    }
    if payload.pickup_address.trim().is_empty() || payload.dropoff_address.trim().is_empty() {
        return Err(AppError::Validation(
            "pickup and dropoff addresses are required".to_string(),
        ));
    }

    let order = Order::new(
        identity.user_id,
        items,
        payload.pickup_address.trim().to_string(),
        payload.dropoff_address.trim().to_string(),
        payload.customer_details,
    );
    let order = state.store.insert_order(order).await?;

    info!(order_id = %order.id, vendor_id = %order.vendor_id, "order created");
    Ok((StatusCode::CREATED, Json(order)))
}

async fn vendor_orders(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
) -> Result<Json<Vec<Order>>, AppError> {
    identity.require_role(Role::Vendor)?;
    let orders = state.store.orders_for_vendor(identity.user_id).await?;
    Ok(Json(orders))
}

async fn partner_active_order(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
) -> Result<Json<Order>, AppError> {
    identity.require_role(Role::DeliveryPartner)?;

    state
        .store
        .active_order_for_partner(identity.user_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("no active order assigned".to_string()))
}

async fn available_partners(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
) -> Result<Json<Vec<PartnerSummary>>, AppError> {
    identity.require_role(Role::Vendor)?;

    let partners = state
        .store
        .available_partners()
        .await?
        .into_iter()
        .map(|user| PartnerSummary {
            id: user.id,
            name: user.name,
            email: user.email,
        })
        .collect();

    Ok(Json(partners))
}

async fn assign_order(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<AssignRequest>,
) -> Result<Json<Order>, AppError> {
    let command = AssignOrder {
        order_id,
        partner_id: payload.delivery_partner_id,
    };
    let order = state.relay.assign_order(&identity, command).await?;
    Ok(Json(order))
}

async fn start_delivery(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let command = StartDelivery {
        order_id,
        user_id: identity.user_id,
    };
    let order = state.relay.start_delivery(&identity, command).await?;
    Ok(Json(order))
}

async fn complete_delivery(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = state.relay.complete_delivery(&identity, order_id).await?;
    Ok(Json(order))
}

async fn cancel_order(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = state.relay.cancel_order(&identity, order_id).await?;
    Ok(Json(order))
}

async fn track_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<TrackingView>, AppError> {
    let order = state.store.get_order(order_id).await?;
    let Some(partner_id) = order.delivery_partner_id.filter(|_| order.status.is_active()) else {
        return Err(AppError::Validation(
            "order is not yet out for delivery".to_string(),
        ));
    };

    let vendor_name = match state.store.get_user(order.vendor_id).await {
        Ok(vendor) => Some(vendor.name),
        Err(StoreError::NotFound(_)) => None,
        Err(err) => return Err(err.into()),
    };
    let delivery_partner = match state.store.get_user(partner_id).await {
        Ok(partner) => Some(TrackedPartner {
            id: partner.id,
            name: partner.name,
            current_location: partner.current_location,
        }),
        Err(StoreError::NotFound(_)) => None,
        Err(err) => return Err(err.into()),
    };

    Ok(Json(TrackingView {
        order,
        vendor_name,
        delivery_partner,
    }))
}
