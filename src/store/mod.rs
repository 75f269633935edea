pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::location::GeoPoint;
use crate::models::order::{InvalidTransition, Order};
use crate::models::user::User;

pub use memory::InMemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    InvalidTransition(String),

    #[error("{0} already exists")]
    Duplicate(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<InvalidTransition> for StoreError {
    fn from(err: InvalidTransition) -> Self {
        StoreError::InvalidTransition(err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => AppError::NotFound(format!("{what} not found")),
            StoreError::InvalidTransition(msg) => AppError::InvalidTransition(msg),
            StoreError::Duplicate(what) => AppError::Conflict(format!("{what} already exists")),
            StoreError::Unavailable(msg) => AppError::Internal(format!("store unavailable: {msg}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StoreCounts {
    pub users: usize,
    pub orders: usize,
}

#[async_trait]
pub trait AssignmentStore: Send + Sync + 'static {
    async fn insert_user(&self, user: User) -> Result<User, StoreError>;

    async fn insert_order(&self, order: Order) -> Result<Order, StoreError>;

    async fn get_order(&self, order_id: Uuid) -> Result<Order, StoreError>;

    async fn get_user(&self, user_id: Uuid) -> Result<User, StoreError>;

    async fn orders_for_vendor(&self, vendor_id: Uuid) -> Result<Vec<Order>, StoreError>;

    async fn active_order_for_partner(&self, partner_id: Uuid)
        -> Result<Option<Order>, StoreError>;

    async fn available_partners(&self) -> Result<Vec<User>, StoreError>;

    async fn update_order_location(
        &self,
        order_id: Uuid,
        point: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<Order, StoreError>;

    async fn update_user_location(&self, user_id: Uuid, point: GeoPoint)
        -> Result<User, StoreError>;

    // Writes the order and the partner as one unit.
    async fn assign(&self, order_id: Uuid, partner_id: Uuid) -> Result<Order, StoreError>;

    async fn start(&self, order_id: Uuid, partner_id: Uuid) -> Result<Order, StoreError>;

    async fn complete(&self, order_id: Uuid, partner_id: Uuid) -> Result<Order, StoreError>;

    async fn cancel(&self, order_id: Uuid) -> Result<Order, StoreError>;

    async fn counts(&self) -> StoreCounts;
}
