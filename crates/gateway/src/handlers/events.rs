//! Live workflow feeds over server-sent events
//!
//! Each route authenticates with `?token=` like the notification stream and
//! narrows one bus topic with optional ids from the query string.

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, KeepAliveStream, Sse},
};
use futures::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::pin::Pin;
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::AppState;
use shorthub_common::{
    auth::AuthContext,
    db::models::UserRole,
    errors::Result,
    events::{self, EventStream},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedQuery {
    pub token: String,
    pub item_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub channel_id: Option<Uuid>,
}

type Frames = Pin<Box<dyn Stream<Item = std::result::Result<Event, Infallible>> + Send>>;
type Feed = Sse<KeepAliveStream<Frames>>;

fn into_sse(events: EventStream, name: &'static str) -> Feed {
    let frames = events.filter_map(move |event| match Event::default().event(name).json_data(&event) {
        Ok(frame) => Some(Ok(frame)),
        Err(e) => {
            tracing::warn!(feed = name, error = %e, "Failed to encode event");
            None
        }
    });
    let frames: Frames = Box::pin(frames);
    Sse::new(frames).keep_alive(KeepAlive::default())
}

async fn authenticate(state: &AppState, query: &FeedQuery) -> Result<AuthContext> {
    let auth = state.services.auth.authenticate(&query.token).await?;
    tracing::debug!(user_id = %auth.user_id, "Event feed opened");
    Ok(auth)
}

/// Status changes; producers only hear about their own items
pub async fn item_status(State(state): State<AppState>, Query(query): Query<FeedQuery>) -> Result<Feed> {
    let auth = authenticate(&state, &query).await?;
    let assignee = (auth.role == UserRole::Producer).then_some(auth.user_id);
    let stream = events::status_changes(state.services.bus.as_ref(), query.item_id, assignee);
    Ok(into_sse(stream, "status_changed"))
}

pub async fn assignments(State(state): State<AppState>, Query(query): Query<FeedQuery>) -> Result<Feed> {
    let auth = authenticate(&state, &query).await?;
    let producer = query.user_id.unwrap_or(auth.user_id);
    auth.require_self_or_admin(producer)?;
    Ok(into_sse(events::assignments_for(state.services.bus.as_ref(), producer), "assigned"))
}

pub async fn completions(State(state): State<AppState>, Query(query): Query<FeedQuery>) -> Result<Feed> {
    let auth = authenticate(&state, &query).await?;
    auth.require_admin()?;
    Ok(into_sse(events::completions(state.services.bus.as_ref()), "completed"))
}

pub async fn user_status(State(state): State<AppState>, Query(query): Query<FeedQuery>) -> Result<Feed> {
    let auth = authenticate(&state, &query).await?;
    let user = if auth.is_admin() {
        query.user_id
    } else {
        let own = query.user_id.unwrap_or(auth.user_id);
        auth.require_self_or_admin(own)?;
        Some(own)
    };
    Ok(into_sse(events::user_status_changes(state.services.bus.as_ref(), user), "user_status"))
}

pub async fn channel_subscribers(State(state): State<AppState>, Query(query): Query<FeedQuery>) -> Result<Feed> {
    authenticate(&state, &query).await?;
    let stream = events::subscriber_updates(state.services.bus.as_ref(), query.channel_id);
    Ok(into_sse(stream, "subscribers_updated"))
}
