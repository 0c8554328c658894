//! Session handlers: login, token refresh and the caller's own account

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;

use crate::AppState;
use shorthub_common::{
    auth::{AuthContext, LoginResult},
    db::models::User,
    errors::Result,
    users::ChangePasswordRequest,
};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResult>> {
    let result = state
        .services
        .auth
        .login(request.username.trim(), &request.password)
        .await?;
    Ok(Json(result))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<LoginResult>> {
    Ok(Json(state.services.auth.refresh(&request.refresh_token).await?))
}

pub async fn me(State(state): State<AppState>, auth: AuthContext) -> Result<Json<User>> {
    Ok(Json(state.services.users.me(&auth).await?))
}

pub async fn change_password(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<StatusCode> {
    state.services.users.change_password(&auth, request).await?;
    Ok(StatusCode::NO_CONTENT)
}
