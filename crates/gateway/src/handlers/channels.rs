//! Channel registry handlers

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
    channels::{CreateChannelRequest, UpdateChannelRequest},
    db::models::{Channel, ChannelRole, SubscriberSnapshot},
    errors::Result,
};

#[derive(Debug, Default, Deserialize)]
pub struct ChannelQuery {
    pub role: Option<ChannelRole>,
}

pub async fn list_channels(
    State(state): State<AppState>,
    _auth: AuthContext,
    Query(query): Query<ChannelQuery>,
) -> Result<Json<Vec<Channel>>> {
    Ok(Json(state.services.channels.list(query.role).await?))
}

pub async fn create_channel(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<CreateChannelRequest>,
) -> Result<(StatusCode, Json<Channel>)> {
    let channel = state.services.channels.create(&auth, request).await?;
    Ok((StatusCode::CREATED, Json(channel)))
}

pub async fn get_channel(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Channel>> {
    Ok(Json(state.services.channels.get(id).await?))
}

pub async fn update_channel(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateChannelRequest>,
) -> Result<Json<Channel>> {
    Ok(Json(state.services.channels.update(&auth, id, request).await?))
}

pub async fn delete_channel(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state.services.channels.delete(&auth, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Pull the live subscriber count and append a snapshot
pub async fn refresh_subscribers(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Channel>> {
    Ok(Json(state.services.channels.refresh_subscribers(&auth, id).await?))
}

pub async fn subscriber_history(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<SubscriberSnapshot>>> {
    Ok(Json(state.services.channels.subscriber_history(id).await?))
}
