// Lock order is always connection entry, then topic entry. A publish holds
// its topic entry for the whole fan-out.

pub mod topic;

use std::collections::{HashMap, HashSet};

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::models::event::ServerEvent;
use crate::observability::metrics::Metrics;

pub use topic::{ConnectionId, Topic};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("connection {0} is not registered")]
    UnknownConnection(ConnectionId),
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        AppError::Internal(err.to_string())
    }
}

struct Connection {
    sender: mpsc::Sender<ServerEvent>,
    topics: HashSet<Topic>,
}

pub struct SubscriptionRegistry {
    topics: DashMap<Topic, HashMap<ConnectionId, mpsc::Sender<ServerEvent>>>,
    connections: DashMap<ConnectionId, Connection>,
    metrics: Metrics,
}

impl SubscriptionRegistry {
    pub fn new(metrics: Metrics) -> Self {
        Self {
            topics: DashMap::new(),
            connections: DashMap::new(),
            metrics,
        }
    }

    pub fn connect(&self, sender: mpsc::Sender<ServerEvent>) -> ConnectionId {
        let connection_id = ConnectionId::new();
        self.connections.insert(
            connection_id,
            Connection {
                sender,
                topics: HashSet::new(),
            },
        );
        self.metrics.active_connections.inc();
        connection_id
    }

    pub fn join(&self, topic: Topic, connection_id: ConnectionId) -> Result<bool, RegistryError> {
        let mut connection = self
            .connections
            .get_mut(&connection_id)
            .ok_or(RegistryError::UnknownConnection(connection_id))?;

        if !connection.topics.insert(topic) {
            return Ok(false);
        }

        self.topics
            .entry(topic)
            .or_default()
            .insert(connection_id, connection.sender.clone());

        debug!(%connection_id, %topic, "joined topic");
        Ok(true)
    }

    pub fn leave(&self, topic: &Topic, connection_id: ConnectionId) -> bool {
        let Some(mut connection) = self.connections.get_mut(&connection_id) else {
            return false;
        };

        if !connection.topics.remove(topic) {
            return false;
        }

        self.remove_member(topic, connection_id);
        debug!(%connection_id, %topic, "left topic");
        true
    }

    pub fn leave_all(&self, connection_id: ConnectionId) -> usize {
        let Some((_, connection)) = self.connections.remove(&connection_id) else {
            return 0;
        };

        for topic in &connection.topics {
            self.remove_member(topic, connection_id);
        }
        self.metrics.active_connections.dec();

        connection.topics.len()
    }

    pub fn publish(&self, topic: &Topic, event: ServerEvent) -> usize {
        let mut delivered: u64 = 0;

        let now_empty = {
            let Some(mut members) = self.topics.get_mut(topic) else {
                debug!(%topic, event = event.kind(), "no subscribers");
                return 0;
            };

            members.retain(|connection_id, sender| match sender.try_send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    warn!(%connection_id, %topic, event = event.kind(), "outbound queue full; dropping message");
                    self.metrics.dropped_messages_total.inc();
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(%connection_id, %topic, "pruning closed subscriber");
                    false
                }
            });

            members.is_empty()
        };

        if now_empty {
            self.topics.remove_if(topic, |_, members| members.is_empty());
        }

        self.metrics
            .published_messages_total
            .with_label_values(&[topic.kind()])
            .inc_by(delivered);

        usize::try_from(delivered).unwrap_or(usize::MAX)
    }

    #[cfg(test)]
    pub(crate) fn member_count(&self, topic: &Topic) -> usize {
        self.topics.get(topic).map_or(0, |members| members.len())
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn remove_member(&self, topic: &Topic, connection_id: ConnectionId) {
        let now_empty = match self.topics.get_mut(topic) {
            Some(mut members) => {
                members.remove(&connection_id);
                members.is_empty()
            }
            None => false,
        };

        if now_empty {
            self.topics.remove_if(topic, |_, members| members.is_empty());
        }
    }
}
