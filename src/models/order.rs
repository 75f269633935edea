use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::location::TimedLocation;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Assigned,
    InTransit,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Assigned)
                | (OrderStatus::Assigned, OrderStatus::InTransit)
                | (OrderStatus::InTransit, OrderStatus::Delivered)
                | (OrderStatus::Pending, OrderStatus::Cancelled)
                | (OrderStatus::Assigned, OrderStatus::Cancelled)
        )
    }

    pub fn is_active(self) -> bool {
        matches!(self, OrderStatus::Assigned | OrderStatus::InTransit)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Assigned => "assigned",
            OrderStatus::InTransit => "in_transit",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("order cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomerDetails {
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub items: Vec<String>,
    pub pickup_address: String,
    pub dropoff_address: String,
    pub customer_details: Option<CustomerDetails>,
    pub status: OrderStatus,
    pub delivery_partner_id: Option<Uuid>,
    pub current_delivery_location: Option<TimedLocation>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        vendor_id: Uuid,
        items: Vec<String>,
        pickup_address: String,
        dropoff_address: String,
        customer_details: Option<CustomerDetails>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            vendor_id,
            items,
            pickup_address,
            dropoff_address,
            customer_details,
            status: OrderStatus::Pending,
            delivery_partner_id: None,
            current_delivery_location: None,
            created_at: now,
            updated_at: now,
        }
    }

    // The partner reference is only ever written on the pending -> assigned edge.
    pub fn assign_to(&mut self, partner_id: Uuid) -> Result<(), InvalidTransition> {
        self.ensure_transition(OrderStatus::Assigned)?;
        self.status = OrderStatus::Assigned;
        self.delivery_partner_id = Some(partner_id);
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn advance(&mut self, next: OrderStatus) -> Result<(), InvalidTransition> {
        self.ensure_transition(next)?;
        self.status = next;
        if next == OrderStatus::Cancelled {
            self.delivery_partner_id = None;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn is_assigned_to(&self, partner_id: Uuid) -> bool {
        self.delivery_partner_id == Some(partner_id)
    }

    fn ensure_transition(&self, next: OrderStatus) -> Result<(), InvalidTransition> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(InvalidTransition {
                from: self.status,
                to: next,
            })
        }
    }
}
