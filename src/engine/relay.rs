// Every mutation takes the order lock before the user lock and publishes
// while both are still held. Rejections are never published.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::engine::locks::KeyedLocks;
use crate::error::AppError;
use crate::identity::Identity;
use crate::models::event::{AssignOrder, LocationUpdate, ServerEvent, StartDelivery};
use crate::models::location::GeoPoint;
use crate::models::order::{Order, OrderStatus};
use crate::models::user::{Role, User};
use crate::observability::metrics::Metrics;
use crate::registry::{SubscriptionRegistry, Topic};
use crate::store::AssignmentStore;

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationOutcome {
    pub order_id: Uuid,
    pub location: GeoPoint,
    pub order_location_updated: bool,
}

pub struct EventRelay {
    store: Arc<dyn AssignmentStore>,
    registry: Arc<SubscriptionRegistry>,
    order_locks: KeyedLocks,
    user_locks: KeyedLocks,
    metrics: Metrics,
}

impl EventRelay {
    pub fn new(
        store: Arc<dyn AssignmentStore>,
        registry: Arc<SubscriptionRegistry>,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            registry,
            order_locks: KeyedLocks::new(),
            user_locks: KeyedLocks::new(),
            metrics,
        }
    }

    pub async fn update_location(
        &self,
        identity: &Identity,
        update: LocationUpdate,
    ) -> Result<LocationOutcome, AppError> {
        self.observe("location_update", self.apply_location(identity, update))
            .await
    }

    pub async fn update_partner_location(
        &self,
        identity: &Identity,
        point: GeoPoint,
    ) -> Result<User, AppError> {
        self.observe("partner_location", self.apply_partner_location(identity, point))
            .await
    }

    pub async fn assign_order(
        &self,
        identity: &Identity,
        command: AssignOrder,
    ) -> Result<Order, AppError> {
        self.observe("assign_order", self.apply_assign(identity, command))
            .await
    }

    pub async fn start_delivery(
        &self,
        identity: &Identity,
        command: StartDelivery,
    ) -> Result<Order, AppError> {
        self.observe("start_delivery", self.apply_start(identity, command))
            .await
    }

    pub async fn complete_delivery(
        &self,
        identity: &Identity,
        order_id: Uuid,
    ) -> Result<Order, AppError> {
        self.observe("complete_delivery", self.apply_complete(identity, order_id))
            .await
    }

    pub async fn cancel_order(&self, identity: &Identity, order_id: Uuid) -> Result<Order, AppError> {
        self.observe("cancel_order", self.apply_cancel(identity, order_id))
            .await
    }

    pub async fn authorize_join(
        &self,
        identity: Option<&Identity>,
        topic: Topic,
    ) -> Result<(), AppError> {
        match topic {
            Topic::Order(order_id) => {
                self.store.get_order(order_id).await?;
                Ok(())
            }
            Topic::User(user_id) => {
                let identity = identity.ok_or(AppError::Unauthenticated)?;
                if identity.user_id != user_id {
                    return Err(AppError::Forbidden(
                        "cannot subscribe to another user's topic".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }

    async fn apply_location(
        &self,
        identity: &Identity,
        update: LocationUpdate,
    ) -> Result<LocationOutcome, AppError> {
        identity.require_role(Role::DeliveryPartner)?;
        ensure_self(identity, update.user_id)?;
        let point = GeoPoint::new(update.lat, update.lng)?;

        let _order_guard = self.order_locks.lock(update.order_id).await;
        let _user_guard = self.user_locks.lock(identity.user_id).await;

        let order = self.store.get_order(update.order_id).await?;
        if !order.is_assigned_to(identity.user_id) {
            return Err(AppError::Forbidden(format!(
                "order {} is not assigned to you",
                order.id
            )));
        }

        let in_transit = order.status == OrderStatus::InTransit;
        if !in_transit {
            debug!(
                order_id = %order.id,
                status = %order.status,
                "order not in transit; recording partner position only"
            );
        }

        self.store
            .update_user_location(identity.user_id, point)
            .await?;

        if in_transit {
            self.store
                .update_order_location(order.id, point, Utc::now())
                .await?;
            self.registry.publish(
                &Topic::Order(order.id),
                ServerEvent::LocationUpdated {
                    order_id: order.id,
                    lat: point.lat,
                    lng: point.lng,
                },
            );
        }

        Ok(LocationOutcome {
            order_id: order.id,
            location: point,
            order_location_updated: in_transit,
        })
    }

    async fn apply_partner_location(
        &self,
        identity: &Identity,
        point: GeoPoint,
    ) -> Result<User, AppError> {
        identity.require_role(Role::DeliveryPartner)?;
        let point = GeoPoint::new(point.lat, point.lng)?;

        let _user_guard = self.user_locks.lock(identity.user_id).await;
        let user = self
            .store
            .update_user_location(identity.user_id, point)
            .await?;
        Ok(user)
    }

    async fn apply_assign(&self, identity: &Identity, command: AssignOrder) -> Result<Order, AppError> {
        identity.require_role(Role::Vendor)?;

        let _order_guard = self.order_locks.lock(command.order_id).await;
        let _partner_guard = self.user_locks.lock(command.partner_id).await;

        let order = self.store.get_order(command.order_id).await?;
        ensure_vendor_owns(identity, &order)?;

        let order = self.store.assign(order.id, command.partner_id).await?;
        info!(order_id = %order.id, partner_id = %command.partner_id, "order assigned");

        self.registry.publish(
            &Topic::Order(order.id),
            ServerEvent::OrderStatusChanged {
                order_id: order.id,
                status: order.status,
                delivery_partner_id: Some(command.partner_id),
            },
        );
        self.registry.publish(
            &Topic::User(command.partner_id),
            ServerEvent::NewOrderAssigned {
                order: Box::new(order.clone()),
            },
        );

        Ok(order)
    }

    async fn apply_start(&self, identity: &Identity, command: StartDelivery) -> Result<Order, AppError> {
        identity.require_role(Role::DeliveryPartner)?;
        ensure_self(identity, command.user_id)?;

        let _order_guard = self.order_locks.lock(command.order_id).await;
        let _user_guard = self.user_locks.lock(identity.user_id).await;

        let order = self.store.get_order(command.order_id).await?;
        ensure_assigned_partner(identity, &order)?;

        let order = self.store.start(order.id, identity.user_id).await?;
        info!(order_id = %order.id, partner_id = %identity.user_id, "delivery started");

        self.publish_status(&order);
        Ok(order)
    }

    async fn apply_complete(&self, identity: &Identity, order_id: Uuid) -> Result<Order, AppError> {
        identity.require_role(Role::DeliveryPartner)?;

        let _order_guard = self.order_locks.lock(order_id).await;
        let _user_guard = self.user_locks.lock(identity.user_id).await;

        let order = self.store.get_order(order_id).await?;
        ensure_assigned_partner(identity, &order)?;

        let order = self.store.complete(order.id, identity.user_id).await?;
        info!(order_id = %order.id, partner_id = %identity.user_id, "order delivered");

        self.publish_status(&order);
        Ok(order)
    }

    async fn apply_cancel(&self, identity: &Identity, order_id: Uuid) -> Result<Order, AppError> {
        identity.require_role(Role::Vendor)?;

        let _order_guard = self.order_locks.lock(order_id).await;
        let order = self.store.get_order(order_id).await?;
        ensure_vendor_owns(identity, &order)?;

        let previous_partner = order.delivery_partner_id;
        let _partner_guard = match previous_partner {
            Some(partner_id) => Some(self.user_locks.lock(partner_id).await),
            None => None,
        };

        let order = self.store.cancel(order.id).await?;
        info!(order_id = %order.id, partner_id = ?previous_partner, "order cancelled");

        self.publish_status(&order);
        if let Some(partner_id) = previous_partner {
            self.registry.publish(
                &Topic::User(partner_id),
                ServerEvent::OrderStatusChanged {
                    order_id: order.id,
                    status: order.status,
                    delivery_partner_id: None,
                },
            );
        }

        Ok(order)
    }

    fn publish_status(&self, order: &Order) {
        self.registry.publish(
            &Topic::Order(order.id),
            ServerEvent::OrderStatusChanged {
                order_id: order.id,
                status: order.status,
                delivery_partner_id: None,
            },
        );
    }

    async fn observe<T, F>(&self, kind: &'static str, handling: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        let start = Instant::now();
        let result = handling.await;
        let elapsed = start.elapsed().as_secs_f64();

        match &result {
            Ok(_) => self.metrics.record_event(kind, "success", elapsed),
            Err(err) => {
                self.metrics.record_event(kind, err.kind(), elapsed);
                match err {
                    AppError::Internal(detail) => {
                        error!(event = kind, error = %detail, "relay event failed")
                    }
                    rejected => warn!(event = kind, error = %rejected, "relay event rejected"),
                }
            }
        }

        result
    }
}

fn ensure_self(identity: &Identity, claimed_user_id: Uuid) -> Result<(), AppError> {
    if identity.user_id == claimed_user_id {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "cannot act on behalf of another user".to_string(),
        ))
    }
}

fn ensure_vendor_owns(identity: &Identity, order: &Order) -> Result<(), AppError> {
    if order.vendor_id == identity.user_id {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "order {} does not belong to this vendor",
            order.id
        )))
    }
}

fn ensure_assigned_partner(identity: &Identity, order: &Order) -> Result<(), AppError> {
    if order.is_assigned_to(identity.user_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "order {} is not assigned to you",
            order.id
        )))
    }
}
