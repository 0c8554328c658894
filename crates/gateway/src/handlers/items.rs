//! Work item handlers: discovery, curation, assignment, status flow and comments

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::AppState;
use shorthub_common::{
    auth::AuthContext,
    db::{
        models::{UserRole, WorkItem, WorkItemStatus},
        WorkItemFilter,
    },
    errors::{AppError, Result},
    lifecycle::{
        AssignManyRequest, AssignRequest, CommentView, StatusStats, WorkItemView, DEFAULT_DISCOVER_COUNT,
    },
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverRequest {
    pub source_channel_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverManyRequest {
    pub channel_ids: Vec<Uuid>,
    #[serde(default = "default_discover_count")]
    pub count: usize,
}

fn default_discover_count() -> usize {
    DEFAULT_DISCOVER_COUNT
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReassignRequest {
    pub producer_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: WorkItemStatus,
    #[serde(default)]
    pub feedback: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusManyRequest {
    pub ids: Vec<Uuid>,
    pub status: WorkItemStatus,
    #[serde(default)]
    pub feedback: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarQuery {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub assigned_to: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub body: String,
}

/// Producers only ever see their own assignments
fn scope_to_caller(auth: &AuthContext, requested: Option<Uuid>) -> Option<Uuid> {
    if auth.role == UserRole::Producer {
        Some(auth.user_id)
    } else {
        requested
    }
}

pub async fn list_items(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(mut filter): Query<WorkItemFilter>,
) -> Result<Json<Vec<WorkItemView>>> {
    filter.assigned_to = scope_to_caller(&auth, filter.assigned_to);
    Ok(Json(state.services.lifecycle.query(&filter).await?))
}

pub async fn stats(State(state): State<AppState>, _auth: AuthContext) -> Result<Json<StatusStats>> {
    Ok(Json(state.services.lifecycle.stats().await?))
}

pub async fn calendar(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<Vec<WorkItemView>>> {
    let assigned_to = scope_to_caller(&auth, query.assigned_to);
    let items = state
        .services
        .lifecycle
        .calendar(query.from, query.to, assigned_to)
        .await?;
    Ok(Json(items))
}

pub async fn get_item(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkItemView>> {
    let view = state.services.lifecycle.get(id).await?;
    if auth.role == UserRole::Producer && view.item.assigned_to != Some(auth.user_id) {
        return Err(AppError::not_found("WorkItem", id));
    }
    Ok(Json(view))
}

pub async fn discover(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<DiscoverRequest>,
) -> Result<(StatusCode, Json<WorkItem>)> {
    let item = state
        .services
        .lifecycle
        .discover(&auth, request.source_channel_id)
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn discover_many(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<DiscoverManyRequest>,
) -> Result<(StatusCode, Json<Vec<WorkItem>>)> {
    let items = state
        .services
        .lifecycle
        .discover_many(&auth, &request.channel_ids, request.count)
        .await?;
    Ok((StatusCode::CREATED, Json(items)))
}

pub async fn retain(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkItem>> {
    Ok(Json(state.services.lifecycle.retain(&auth, id).await?))
}

pub async fn reject(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkItem>> {
    Ok(Json(state.services.lifecycle.reject(&auth, id).await?))
}

pub async fn assign(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(request): Json<AssignRequest>,
) -> Result<Json<WorkItem>> {
    Ok(Json(state.services.lifecycle.assign(&auth, id, request).await?))
}

pub async fn assign_many(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<AssignManyRequest>,
) -> Result<Json<Vec<WorkItem>>> {
    Ok(Json(state.services.lifecycle.assign_multiple(&auth, request).await?))
}

pub async fn reassign(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(request): Json<ReassignRequest>,
) -> Result<Json<WorkItem>> {
    Ok(Json(
        state.services.lifecycle.reassign(&auth, id, request.producer_id).await?,
    ))
}

pub async fn update_status(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<WorkItem>> {
    let item = state
        .services
        .lifecycle
        .update_status(&auth, id, request.status, request.feedback)
        .await?;
    Ok(Json(item))
}

/// Items that could not move are left out of the response
pub async fn update_many_status(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<StatusManyRequest>,
) -> Result<Json<Vec<WorkItem>>> {
    let items = state
        .services
        .lifecycle
        .update_multiple_status(&auth, &request.ids, request.status, request.feedback)
        .await?;
    Ok(Json(items))
}

pub async fn delete_item(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state.services.lifecycle.delete(&auth, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_comments(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<CommentView>>> {
    Ok(Json(state.services.lifecycle.list_comments(id).await?))
}

pub async fn add_comment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(request): Json<CommentRequest>,
) -> Result<(StatusCode, Json<CommentView>)> {
    let comment = state
        .services
        .lifecycle
        .add_comment(&auth, id, &request.body)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state.services.lifecycle.delete_comment(&auth, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
