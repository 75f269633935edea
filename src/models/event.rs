// Frames are JSON objects of the form {"event": "<name>", "data": ...}.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::{Order, OrderStatus};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdate {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartDelivery {
    pub order_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignOrder {
    pub order_id: Uuid,
    pub partner_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    JoinOrderRoom(Uuid),
    JoinUserRoom(Uuid),
    LeaveOrderRoom(Uuid),
    LeaveUserRoom(Uuid),
    UpdateLocation(LocationUpdate),
    StartDelivery(StartDelivery),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    LocationUpdated { order_id: Uuid, lat: f64, lng: f64 },
    #[serde(rename_all = "camelCase")]
    OrderStatusChanged {
        order_id: Uuid,
        status: OrderStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        delivery_partner_id: Option<Uuid>,
    },
    NewOrderAssigned { order: Box<Order> },
    Error { message: String },
}

impl ServerEvent {
    pub fn error(err: &AppError) -> Self {
        ServerEvent::Error {
            message: err.client_message(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::LocationUpdated { .. } => "locationUpdated",
            ServerEvent::OrderStatusChanged { .. } => "orderStatusChanged",
            ServerEvent::NewOrderAssigned { .. } => "newOrderAssigned",
            ServerEvent::Error { .. } => "error",
        }
    }
}
