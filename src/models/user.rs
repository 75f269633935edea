use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::location::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Vendor,
    DeliveryPartner,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Vendor => f.write_str("vendor"),
            Role::DeliveryPartner => f.write_str("deliveryPartner"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub current_location: Option<GeoPoint>,
    pub is_online: bool,
    pub active_order_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: String, email: String, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            email,
            role,
            current_location: None,
            is_online: false,
            active_order_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_available_partner(&self) -> bool {
        self.role == Role::DeliveryPartner && self.active_order_id.is_none()
    }
}
