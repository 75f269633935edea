use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::identity::AuthUser;
use crate::models::event::LocationUpdate;
use crate::models::location::GeoPoint;
use crate::models::order::OrderStatus;
use crate::state::AppState;
use crate::store::StoreError;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/location/update", post(update_location))
        .route("/api/location/order/:id", get(order_location))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLocationRequest {
    pub order_id: Option<Uuid>,
    pub lat: f64,
    pub lng: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLocationResponse {
    pub location: GeoPoint,
    pub order_location_updated: bool,
}

#[derive(Debug, Serialize)]
pub struct OrderLocationResponse {
    pub lat: f64,
    pub lng: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<UpdateLocationResponse>, AppError> {
    let response = match payload.order_id {
        Some(order_id) => {
            let update = LocationUpdate {
                order_id,
                user_id: identity.user_id,
                lat: payload.lat,
                lng: payload.lng,
            };
            let outcome = state.relay.update_location(&identity, update).await?;
            UpdateLocationResponse {
                location: outcome.location,
                order_location_updated: outcome.order_location_updated,
            }
        }
        None => {
            let point = GeoPoint {
                lat: payload.lat,
                lng: payload.lng,
            };
            let user = state.relay.update_partner_location(&identity, point).await?;
            UpdateLocationResponse {
                location: user.current_location.unwrap_or(point),
                order_location_updated: false,
            }
        }
    };

    Ok(Json(response))
}

async fn order_location(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderLocationResponse>, AppError> {
    let order = state.store.get_order(order_id).await?;
    if order.status != OrderStatus::InTransit {
        return Err(AppError::NotFound(format!(
            "no active delivery for order {order_id}"
        )));
    }

    if let Some(location) = order.current_delivery_location {
        return Ok(Json(OrderLocationResponse {
            lat: location.lat,
            lng: location.lng,
            timestamp: Some(location.timestamp),
        }));
    }

    let partner_location = match order.delivery_partner_id {
        Some(partner_id) => match state.store.get_user(partner_id).await {
            Ok(partner) => partner.current_location,
            Err(StoreError::NotFound(_)) => None,
            Err(err) => return Err(err.into()),
        },
        None => None,
    };

    partner_location
        .map(|point| {
            Json(OrderLocationResponse {
                lat: point.lat,
                lng: point.lng,
                timestamp: None,
            })
        })
        .ok_or_else(|| AppError::NotFound(format!("location not available for order {order_id}")))
}
