use std::future::Future;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::identity::{bearer_token, Identity};
use crate::models::event::{ClientEvent, ServerEvent};
use crate::registry::{ConnectionId, Topic};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let credential = params
        .token
        .as_deref()
        .or_else(|| bearer_token(&headers));
    let identity = credential
        .map(|token| state.identity.resolve(token))
        .transpose()?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, identity)))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, identity: Option<Identity>) {
    let (sender, mut receiver) = socket.split();
    let (tx, rx) = mpsc::channel::<ServerEvent>(state.event_buffer_size);
    let connection_id = state.registry.connect(tx.clone());

    info!(
        %connection_id,
        user_id = ?identity.map(|identity| identity.user_id),
        "websocket client connected"
    );

    let mut send_task = tokio::spawn(async move {
        let outbound = ReceiverStream::new(rx).filter_map(|event| async move {
            match serde_json::to_string(&event) {
                Ok(json) => Some(Ok::<_, axum::Error>(Message::Text(json))),
                Err(err) => {
                    warn!(error = %err, event = event.kind(), "failed to serialize event for ws");
                    None
                }
            }
        });

        if let Err(err) = outbound.forward(sender).await {
            debug!(error = %err, "websocket send stopped");
        }
    });

    let session = Session {
        state: state.clone(),
        connection_id,
        identity,
        replies: tx,
    };
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => session.handle_text(&text).await,
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    let topics_left = state.registry.leave_all(connection_id);
    info!(%connection_id, topics_left, "websocket client disconnected");
}

struct Session {
    state: Arc<AppState>,
    connection_id: ConnectionId,
    identity: Option<Identity>,
    replies: mpsc::Sender<ServerEvent>,
}

impl Session {
    async fn handle_text(&self, text: &str) {
        let event = match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => event,
            Err(err) => {
                warn!(connection_id = %self.connection_id, error = %err, "rejected malformed channel frame");
                self.reply_error(&AppError::Validation("malformed event".to_string()));
                return;
            }
        };

        if let Err(err) = self.dispatch(event).await {
            self.reply_error(&err);
        }
    }

    async fn dispatch(&self, event: ClientEvent) -> Result<(), AppError> {
        match event {
            ClientEvent::JoinOrderRoom(order_id) => self.join(Topic::Order(order_id)).await,
            ClientEvent::JoinUserRoom(user_id) => self.join(Topic::User(user_id)).await,
            ClientEvent::LeaveOrderRoom(order_id) => {
                self.leave(Topic::Order(order_id));
                Ok(())
            }
            ClientEvent::LeaveUserRoom(user_id) => {
                self.leave(Topic::User(user_id));
                Ok(())
            }
            ClientEvent::UpdateLocation(update) => {
                let identity = self.require_identity()?;
                let relay = self.state.relay.clone();
                run_detached(async move {
                    relay.update_location(&identity, update).await.map(|_| ())
                })
                .await
            }
            ClientEvent::StartDelivery(command) => {
                let identity = self.require_identity()?;
                let relay = self.state.relay.clone();
                run_detached(async move {
                    relay.start_delivery(&identity, command).await.map(|_| ())
                })
                .await
            }
        }
    }

    async fn join(&self, topic: Topic) -> Result<(), AppError> {
        self.state
            .relay
            .authorize_join(self.identity.as_ref(), topic)
            .await?;
        self.state.registry.join(topic, self.connection_id)?;
        Ok(())
    }

    fn leave(&self, topic: Topic) {
        if !self.state.registry.leave(&topic, self.connection_id) {
            debug!(connection_id = %self.connection_id, %topic, "leave for a topic never joined");
        }
    }

    fn require_identity(&self) -> Result<Identity, AppError> {
        self.identity.ok_or(AppError::Unauthenticated)
    }

    fn reply_error(&self, err: &AppError) {
        if let AppError::Internal(detail) = err {
            error!(connection_id = %self.connection_id, error = %detail, "channel event failed");
        }
        if self.replies.try_send(ServerEvent::error(err)).is_err() {
            debug!(connection_id = %self.connection_id, "could not queue error reply");
        }
    }
}

async fn run_detached<F>(handling: F) -> Result<(), AppError>
where
    F: Future<Output = Result<(), AppError>> + Send + 'static,
{
    tokio::spawn(handling)
        .await
        .map_err(|err| AppError::Internal(format!("event handler failed: {err}")))?
}
