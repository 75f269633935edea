use std::sync::Arc;

use crate::config::Config;
use crate::engine::EventRelay;
use crate::identity::TokenAuthority;
use crate::observability::metrics::Metrics;
use crate::registry::SubscriptionRegistry;
use crate::store::{AssignmentStore, InMemoryStore};

pub struct AppState {
    pub store: Arc<dyn AssignmentStore>,
    pub registry: Arc<SubscriptionRegistry>,
    pub relay: Arc<EventRelay>,
    pub identity: TokenAuthority,
    pub metrics: Metrics,
    pub event_buffer_size: usize,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self::with_store(config, Arc::new(InMemoryStore::new()))
    }

    pub fn with_store(config: &Config, store: Arc<dyn AssignmentStore>) -> Self {
        let metrics = Metrics::new();
        let registry = Arc::new(SubscriptionRegistry::new(metrics.clone()));
        let relay = Arc::new(EventRelay::new(
            store.clone(),
            registry.clone(),
            metrics.clone(),
        ));

        Self {
            store,
            registry,
            relay,
            identity: TokenAuthority::new(&config.jwt_secret, config.token_ttl_secs),
            metrics,
            event_buffer_size: config.event_buffer_size,
        }
    }
}
