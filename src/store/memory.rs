use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::location::{GeoPoint, TimedLocation};
use crate::models::order::{Order, OrderStatus};
use crate::models::user::{Role, User};
use crate::store::{AssignmentStore, StoreCounts, StoreError};

// Multi-record writes hold the order entry and then the user entry for the
// whole write; nothing takes them in the opposite order.
#[derive(Default)]
pub struct InMemoryStore {
    users: DashMap<Uuid, User>,
    orders: DashMap<Uuid, Order>,
    emails: DashMap<String, Uuid>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn order_not_found(order_id: Uuid) -> StoreError {
    StoreError::NotFound(format!("order {order_id}"))
}

fn user_not_found(user_id: Uuid) -> StoreError {
    StoreError::NotFound(format!("user {user_id}"))
}

fn not_assigned(order_id: Uuid, partner_id: Uuid) -> StoreError {
    StoreError::InvalidTransition(format!(
        "order {order_id} is not assigned to delivery partner {partner_id}"
    ))
}

#[async_trait]
impl AssignmentStore for InMemoryStore {
    async fn insert_user(&self, user: User) -> Result<User, StoreError> {
        match self.emails.entry(user.email.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(format!(
                "user with email {}",
                user.email
            ))),
            Entry::Vacant(slot) => {
                slot.insert(user.id);
                self.users.insert(user.id, user.clone());
                Ok(user)
            }
        }
    }

    async fn insert_order(&self, order: Order) -> Result<Order, StoreError> {
        self.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, order_id: Uuid) -> Result<Order, StoreError> {
        self.orders
            .get(&order_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| order_not_found(order_id))
    }

    async fn get_user(&self, user_id: Uuid) -> Result<User, StoreError> {
        self.users
            .get(&user_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| user_not_found(user_id))
    }

    async fn orders_for_vendor(&self, vendor_id: Uuid) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| entry.vendor_id == vendor_id)
            .map(|entry| entry.value().clone())
            .collect();

        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn active_order_for_partner(
        &self,
        partner_id: Uuid,
    ) -> Result<Option<Order>, StoreError> {
        Ok(self
            .orders
            .iter()
            .find(|entry| entry.is_assigned_to(partner_id) && entry.status.is_active())
            .map(|entry| entry.value().clone()))
    }

    async fn available_partners(&self) -> Result<Vec<User>, StoreError> {
        let mut partners: Vec<User> = self
            .users
            .iter()
            .filter(|entry| entry.is_available_partner())
            .map(|entry| entry.value().clone())
            .collect();

        partners.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(partners)
    }

    async fn update_order_location(
        &self,
        order_id: Uuid,
        point: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<Order, StoreError> {
        let mut order = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| order_not_found(order_id))?;

        order.current_delivery_location = Some(TimedLocation::at(point, at));
        order.updated_at = at;
        Ok(order.clone())
    }

    async fn update_user_location(
        &self,
        user_id: Uuid,
        point: GeoPoint,
    ) -> Result<User, StoreError> {
        let mut user = self
            .users
            .get_mut(&user_id)
            .ok_or_else(|| user_not_found(user_id))?;

        user.current_location = Some(point);
        Ok(user.clone())
    }

    async fn assign(&self, order_id: Uuid, partner_id: Uuid) -> Result<Order, StoreError> {
        let mut order = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| order_not_found(order_id))?;
        let mut partner = self
            .users
            .get_mut(&partner_id)
            .filter(|user| user.role == Role::DeliveryPartner)
            .ok_or_else(|| StoreError::NotFound(format!("delivery partner {partner_id}")))?;

        if order.status != OrderStatus::Pending {
            return Err(StoreError::InvalidTransition(format!(
                "order {order_id} cannot be assigned while {}",
                order.status
            )));
        }
        if let Some(active) = partner.active_order_id {
            return Err(StoreError::InvalidTransition(format!(
                "delivery partner {partner_id} is already on order {active}"
            )));
        }

        order.assign_to(partner_id)?;
        partner.active_order_id = Some(order_id);

        Ok(order.clone())
    }

    async fn start(&self, order_id: Uuid, partner_id: Uuid) -> Result<Order, StoreError> {
        let mut order = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| order_not_found(order_id))?;
        if !order.is_assigned_to(partner_id) {
            return Err(not_assigned(order_id, partner_id));
        }
        let mut partner = self
            .users
            .get_mut(&partner_id)
            .ok_or_else(|| user_not_found(partner_id))?;

        order.advance(OrderStatus::InTransit)?;
        partner.is_online = true;

        Ok(order.clone())
    }

    async fn complete(&self, order_id: Uuid, partner_id: Uuid) -> Result<Order, StoreError> {
        let mut order = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| order_not_found(order_id))?;
        if !order.is_assigned_to(partner_id) {
            return Err(not_assigned(order_id, partner_id));
        }
        let mut partner = self
            .users
            .get_mut(&partner_id)
            .ok_or_else(|| user_not_found(partner_id))?;

        order.advance(OrderStatus::Delivered)?;
        if partner.active_order_id == Some(order_id) {
            partner.active_order_id = None;
        }

        Ok(order.clone())
    }

    async fn cancel(&self, order_id: Uuid) -> Result<Order, StoreError> {
        let mut order = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| order_not_found(order_id))?;
        let previous_partner = order.delivery_partner_id;

        order.advance(OrderStatus::Cancelled)?;

        if let Some(partner_id) = previous_partner {
            match self.users.get_mut(&partner_id) {
                Some(mut partner) if partner.active_order_id == Some(order_id) => {
                    partner.active_order_id = None;
                }
                Some(_) => {}
                None => {
                    tracing::warn!(%order_id, %partner_id, "cancelled order referenced a missing partner");
                }
            }
        }

        Ok(order.clone())
    }

    async fn counts(&self) -> StoreCounts {
        StoreCounts {
            users: self.users.len(),
            orders: self.orders.len(),
        }
    }
}
