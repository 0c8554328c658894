//! Drive storage handlers: OAuth connection and deliverable transfer

use axum::{
    body::Body,
    extract::{multipart::Field, Multipart, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use shorthub_common::{
    auth::AuthContext,
    db::models::WorkItem,
    errors::{AppError, Result},
    storage::ConnectionInfo,
};

/// Multipart field carrying the video
const UPLOAD_FIELD: &str = "video";

/// Headroom for multipart boundaries and the other form fields
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

pub fn body_limit(max_upload_bytes: usize) -> usize {
    max_upload_bytes.saturating_add(MULTIPART_OVERHEAD)
}

#[derive(Serialize)]
pub struct AuthUrlResponse {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub error: Option<String>,
}

pub async fn auth_url(State(state): State<AppState>, auth: AuthContext) -> Result<Json<AuthUrlResponse>> {
    auth.require_admin()?;
    Ok(Json(AuthUrlResponse {
        url: state.services.storage.auth_url()?,
    }))
}

/// Provider redirect target; always bounces back to the frontend settings page
pub async fn oauth_callback(State(state): State<AppState>, Query(query): Query<CallbackQuery>) -> Redirect {
    let frontend = state.services.config.server.frontend_url.trim_end_matches('/');

    let outcome = match (query.code, query.error) {
        (Some(code), None) => match state.services.storage.handle_callback(&code).await {
            Ok(_) => "connected",
            Err(e) => {
                tracing::error!(error = %e, "Drive OAuth callback failed");
                "error"
            }
        },
        (_, error) => {
            tracing::warn!(error = ?error, "Drive OAuth consent was not granted");
            "error"
        }
    };

    Redirect::to(&format!("{}/settings?drive={}", frontend, outcome))
}

pub async fn connection_info(State(state): State<AppState>, _auth: AuthContext) -> Result<Json<ConnectionInfo>> {
    Ok(Json(state.services.storage.connection_info().await?))
}

pub async fn disconnect(State(state): State<AppState>, auth: AuthContext) -> Result<StatusCode> {
    auth.require_admin()?;
    state.services.storage.disconnect().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn read_field(field: Field<'_>, limit: usize, declared: usize) -> Result<Bytes> {
    let data = field.bytes().await.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge { size: declared, limit }
        } else {
            AppError::validation(format!("Malformed upload: {}", e.body_text()))
        }
    })?;
    if data.len() > limit {
        return Err(AppError::PayloadTooLarge {
            size: data.len(),
            limit,
        });
    }
    Ok(data)
}

/// Store the assignee's finished short and complete the item
pub async fn upload(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(item_id): Path<Uuid>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<WorkItem>> {
    let limit = state.services.config.storage.max_upload_bytes;
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::validation(format!("Malformed upload: {}", e.body_text())))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or("short.mp4").to_string();
        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = read_field(field, limit, declared).await?;

        tracing::info!(
            item_id = %item_id,
            user_id = %auth.user_id,
            size = data.len(),
            mime_type = %mime_type,
            "Receiving deliverable"
        );
        let item = state
            .services
            .lifecycle
            .upload_deliverable(&auth, item_id, &file_name, &mime_type, data)
            .await?;
        return Ok(Json(item));
    }

    Err(AppError::Validation {
        message: "No video file provided".to_string(),
        field: Some(UPLOAD_FIELD.to_string()),
    })
}

fn attachment_header(file_name: &str) -> HeaderValue {
    let safe: String = file_name
        .chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_control() && *c != '"' && *c != '\\')
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{}\"", safe))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

pub async fn download(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(item_id): Path<Uuid>,
) -> Result<Response> {
    let file = state
        .services
        .lifecycle
        .download_deliverable(&auth, item_id)
        .await?;

    let content_type = HeaderValue::from_str(&file.mime_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    let mut response = (
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, attachment_header(&file.file_name)),
        ],
        Body::from_stream(file.body),
    )
        .into_response();
    if let Some(size) = file.size {
        response.headers_mut().insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_header_strips_quotes() {
        let value = attachment_header("my \"best\" short.mp4");
        assert_eq!(value.to_str().unwrap(), "attachment; filename=\"my best short.mp4\"");
    }

    #[test]
    fn test_attachment_header_drops_non_ascii() {
        let value = attachment_header("clip\u{e9}.mp4");
        assert_eq!(value.to_str().unwrap(), "attachment; filename=\"clip.mp4\"");
    }

    #[test]
    fn test_body_limit_adds_headroom() {
        assert_eq!(body_limit(10), 10 + MULTIPART_OVERHEAD);
        assert_eq!(body_limit(usize::MAX), usize::MAX);
    }
}
