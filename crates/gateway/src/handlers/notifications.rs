//! Notification inbox handlers, the live event stream and global settings

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::AppState;
use shorthub_common::{
    auth::AuthContext,
    db::models::{Notification, NotificationSettings},
    errors::Result,
    events::{notifications_for, DomainEvent},
    notifications::SettingsUpdate,
};

const DEFAULT_PAGE_SIZE: u64 = 50;
const MAX_PAGE_SIZE: u64 = 200;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: u64,
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub token: String,
}

#[derive(Serialize)]
pub struct CountResponse {
    pub count: u64,
}

#[derive(Serialize)]
pub struct UpdatedResponse {
    pub updated: u64,
}

pub async fn list(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Notification>>> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let notifications = state
        .services
        .notifier
        .list(auth.user_id, query.unread_only, limit, query.offset)
        .await?;
    Ok(Json(notifications))
}

pub async fn unread_count(State(state): State<AppState>, auth: AuthContext) -> Result<Json<CountResponse>> {
    let count = state.services.notifier.unread_count(auth.user_id).await?;
    Ok(Json(CountResponse { count }))
}

pub async fn mark_as_read(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>> {
    Ok(Json(state.services.notifier.mark_as_read(auth.user_id, id).await?))
}

pub async fn mark_all_as_read(State(state): State<AppState>, auth: AuthContext) -> Result<Json<UpdatedResponse>> {
    let updated = state.services.notifier.mark_all_as_read(auth.user_id).await?;
    Ok(Json(UpdatedResponse { updated }))
}

/// Server-sent events for the caller's new notifications
///
/// Browsers cannot set headers on an EventSource, so the access token
/// travels in the query string.
pub async fn stream(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let auth = state.services.auth.authenticate(&query.token).await?;
    tracing::debug!(user_id = %auth.user_id, "Notification stream opened");

    let events = notifications_for(state.services.bus.as_ref(), auth.user_id).filter_map(|event| {
        let DomainEvent::NotificationReceived { notification, .. } = event else {
            return None;
        };
        match Event::default().event("notification").json_data(&notification) {
            Ok(event) => Some(Ok(event)),
            Err(e) => {
                tracing::warn!(notification_id = %notification.id, error = %e, "Failed to encode notification event");
                None
            }
        }
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

pub async fn get_settings(State(state): State<AppState>, auth: AuthContext) -> Result<Json<NotificationSettings>> {
    auth.require_admin()?;
    Ok(Json(state.services.notifier.settings().await?))
}

pub async fn update_settings(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<NotificationSettings>> {
    auth.require_admin()?;
    let settings = state.services.notifier.update_settings(update).await?;
    tracing::info!(updated_by = %auth.user_id, "Notification settings updated");
    Ok(Json(settings))
}
