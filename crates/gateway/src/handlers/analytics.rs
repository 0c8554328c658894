//! Analytics handlers

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::AppState;
use shorthub_common::{
    analytics::{ChannelStats, Dashboard, DestinationStats, UserStats},
    auth::AuthContext,
    errors::Result,
};

pub async fn dashboard(State(state): State<AppState>, auth: AuthContext) -> Result<Json<Dashboard>> {
    auth.require_admin()?;
    Ok(Json(state.services.analytics.dashboard().await?))
}

/// Producers may read their own numbers
pub async fn user_stats(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<UserStats>> {
    auth.require_self_or_admin(id)?;
    Ok(Json(state.services.analytics.user_stats(id).await?))
}

pub async fn channel_stats(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ChannelStats>> {
    auth.require_admin()?;
    Ok(Json(state.services.analytics.channel_stats(id).await?))
}

pub async fn destination_stats(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<DestinationStats>> {
    auth.require_admin()?;
    Ok(Json(state.services.analytics.destination_stats(id).await?))
}
