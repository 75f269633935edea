use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::identity::AuthUser;
use crate::models::user::{Role, User};
use crate::state::AppState;
use crate::store::StoreError;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/users", post(register_user))
        .route("/api/auth/me", get(me))
        .route("/api/auth/refresh", post(refresh_token))
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub user: User,
    pub token: String,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub token: String,
}

async fn register_user(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("name cannot be empty".to_string()));
    }

    let email = payload.email.trim().to_lowercase();
    if !is_plausible_email(&email) {
        return Err(AppError::Validation(format!("invalid email {email:?}")));
    }

    let user = state
        .store
        .insert_user(User::new(name.to_string(), email, payload.role))
        .await?;
    let token = state.identity.issue(user.id, user.role)?;

    info!(user_id = %user.id, role = %user.role, "user registered");
    Ok((StatusCode::CREATED, Json(RegisterResponse { user, token })))
}

async fn me(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
) -> Result<Json<User>, AppError> {
    let user = current_user(&state, identity.user_id).await?;
    Ok(Json(user))
}

// Re-issues from a still-valid token; there is no credential login.
async fn refresh_token(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
) -> Result<Json<TokenResponse>, AppError> {
    let user = current_user(&state, identity.user_id).await?;
    let token = state.identity.issue(user.id, user.role)?;

    info!(user_id = %user.id, "token refreshed");
    Ok(Json(TokenResponse { token }))
}

async fn current_user(state: &AppState, user_id: Uuid) -> Result<User, AppError> {
    match state.store.get_user(user_id).await {
        Ok(user) => Ok(user),
        Err(StoreError::NotFound(_)) => Err(AppError::Unauthenticated),
        Err(err) => Err(err.into()),
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.contains('@'),
        None => false,
    }
}
