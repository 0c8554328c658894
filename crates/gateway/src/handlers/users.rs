//! User directory handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::AppState;
use shorthub_common::{
    auth::AuthContext,
    db::models::{ActivityLog, User, UserStatus},
    db::{ActivityFilter, DEFAULT_ACTIVITY_LIMIT},
    errors::Result,
    users::{
        ConnectEmailRequest, ConnectWhatsAppRequest, CreateUserRequest, ProfileImageRequest, SetPasswordRequest,
        UpdateUserRequest, UserFilter,
    },
};

const MAX_ACTIVITY_PAGE: u64 = 200;

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: UserStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantRequest {
    pub assistant_id: Uuid,
}

pub async fn list_users(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(filter): Query<UserFilter>,
) -> Result<Json<Vec<User>>> {
    Ok(Json(state.services.users.list(&auth, &filter).await?))
}

pub async fn create_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>)> {
    let user = state.services.users.create(&auth, request).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn get_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<User>> {
    auth.require_self_or_admin(id)?;
    Ok(Json(state.services.users.get(id).await?))
}

pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<User>> {
    Ok(Json(state.services.users.update(&auth, id, request).await?))
}

pub async fn delete_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state.services.users.delete(&auth, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Block or unblock an account
pub async fn update_status(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<User>> {
    Ok(Json(state.services.users.update_status(&auth, id, request.status).await?))
}

/// Admin password reset
pub async fn set_password(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(request): Json<SetPasswordRequest>,
) -> Result<StatusCode> {
    state.services.users.admin_change_password(&auth, id, request).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn assign_assistant(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(producer_id): Path<Uuid>,
    Json(request): Json<AssistantRequest>,
) -> Result<Json<User>> {
    let producer = state
        .services
        .users
        .assign_assistant(&auth, producer_id, request.assistant_id)
        .await?;
    Ok(Json(producer))
}

pub async fn connect_whatsapp(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<ConnectWhatsAppRequest>,
) -> Result<Json<User>> {
    Ok(Json(state.services.users.connect_whatsapp(&auth, request).await?))
}

pub async fn disconnect_whatsapp(State(state): State<AppState>, auth: AuthContext) -> Result<Json<User>> {
    Ok(Json(state.services.users.disconnect_whatsapp(&auth).await?))
}

pub async fn connect_email(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<ConnectEmailRequest>,
) -> Result<Json<User>> {
    Ok(Json(state.services.users.connect_email(&auth, request).await?))
}

pub async fn disconnect_email(State(state): State<AppState>, auth: AuthContext) -> Result<Json<User>> {
    Ok(Json(state.services.users.disconnect_email(&auth).await?))
}

pub async fn upload_profile_image(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<ProfileImageRequest>,
) -> Result<Json<User>> {
    Ok(Json(state.services.users.upload_profile_image(&auth, request).await?))
}

pub async fn remove_profile_image(State(state): State<AppState>, auth: AuthContext) -> Result<Json<User>> {
    Ok(Json(state.services.users.remove_profile_image(&auth).await?))
}

pub async fn activity_logs(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(mut filter): Query<ActivityFilter>,
) -> Result<Json<Vec<ActivityLog>>> {
    filter.limit = Some(filter.limit.unwrap_or(DEFAULT_ACTIVITY_LIMIT).clamp(1, MAX_ACTIVITY_PAGE));
    Ok(Json(state.services.users.activity_logs(&auth, &filter).await?))
}
