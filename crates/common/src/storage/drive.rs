//! Google Drive v3 REST provider

use super::{DownloadedFile, StorageProvider, TokenGrant, UploadedFile};
use crate::config::StorageConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration as ChronoDuration, Utc};
use futures::TryStreamExt;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

const SERVICE: &str = "google-drive";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/drive.file",
    "https://www.googleapis.com/auth/drive",
];
/// Lifetime assumed when the token endpoint omits `expires_in`
const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

impl From<TokenResponse> for TokenGrant {
    fn from(t: TokenResponse) -> Self {
        let ttl = t.expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECS);
        TokenGrant {
            access_token: t.access_token,
            refresh_token: t.refresh_token,
            expires_at: Utc::now() + ChronoDuration::seconds(ttl),
            scope: t.scope.unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<FileRef>,
}

#[derive(Deserialize)]
struct FileRef {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileResource {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    web_view_link: Option<String>,
}

/// Drive client speaking the OAuth, files and permissions endpoints
pub struct GoogleDriveProvider {
    client: reqwest::Client,
    /// No overall deadline; media bodies stream for as long as they take
    media_client: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    auth_url: String,
    token_url: String,
    revoke_url: String,
    api_base: String,
    upload_base: String,
}

async fn ensure_success(response: Response, action: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AppError::external(SERVICE, format!("{} failed ({}): {}", action, status, body)))
}

fn request_error(action: &str, e: reqwest::Error) -> AppError {
    AppError::external(SERVICE, format!("{} request failed: {}", action, e))
}

fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

impl GoogleDriveProvider {
    /// Build a provider; `None` when OAuth client credentials are not configured
    pub fn from_config(config: &StorageConfig) -> Result<Option<Self>> {
        let (Some(client_id), Some(client_secret)) = (&config.client_id, &config.client_secret) else {
            return Ok(None);
        };

        let timeout = Duration::from_secs(config.timeout_secs);
        let build_error = |e: reqwest::Error| AppError::Configuration {
            message: format!("Failed to create HTTP client: {}", e),
        };
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(build_error)?;
        let media_client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(build_error)?;

        Ok(Some(Self {
            client,
            media_client,
            client_id: client_id.clone(),
            client_secret: client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            auth_url: config.auth_url.clone(),
            token_url: config.token_url.clone(),
            revoke_url: config.revoke_url.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            upload_base: config.upload_base.trim_end_matches('/').to_string(),
        }))
    }

    async fn token_request(&self, form: &[(&str, &str)], action: &str) -> Result<TokenGrant> {
        let response = self
            .client
            .post(&self.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| request_error(action, e))?;
        let token: TokenResponse = ensure_success(response, action)
            .await?
            .json()
            .await
            .map_err(|e| request_error(action, e))?;
        Ok(token.into())
    }
}

#[async_trait]
impl StorageProvider for GoogleDriveProvider {
    fn authorization_url(&self, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent&state={}",
            self.auth_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&SCOPES.join(" ")),
            urlencoding::encode(state),
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant> {
        self.token_request(
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", &self.client_id),
                ("client_secret", &self.client_secret),
                ("redirect_uri", &self.redirect_uri),
            ],
            "code exchange",
        )
        .await
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenGrant> {
        self.token_request(
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", &self.client_id),
                ("client_secret", &self.client_secret),
            ],
            "token refresh",
        )
        .await
    }

    async fn revoke_token(&self, token: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.revoke_url)
            .form(&[("token", token)])
            .send()
            .await
            .map_err(|e| request_error("revoke", e))?;
        ensure_success(response, "revoke").await?;
        Ok(())
    }

    async fn find_folder(&self, access_token: &str, name: &str, parent: Option<&str>) -> Result<Option<String>> {
        let mut query = format!(
            "name='{}' and mimeType='{}' and trashed=false",
            escape_query(name),
            FOLDER_MIME
        );
        if let Some(parent) = parent {
            query.push_str(&format!(" and '{}' in parents", escape_query(parent)));
        }

        let response = self
            .client
            .get(format!("{}/files", self.api_base))
            .bearer_auth(access_token)
            .query(&[("q", query.as_str()), ("fields", "files(id,name)"), ("spaces", "drive")])
            .send()
            .await
            .map_err(|e| request_error("folder search", e))?;
        let list: FileList = ensure_success(response, "folder search")
            .await?
            .json()
            .await
            .map_err(|e| request_error("folder search", e))?;
        Ok(list.files.into_iter().next().map(|f| f.id))
    }

    async fn create_folder(&self, access_token: &str, name: &str, parent: Option<&str>) -> Result<String> {
        let mut metadata = serde_json::json!({ "name": name, "mimeType": FOLDER_MIME });
        if let Some(parent) = parent {
            metadata["parents"] = serde_json::json!([parent]);
        }

        let response = self
            .client
            .post(format!("{}/files", self.api_base))
            .bearer_auth(access_token)
            .query(&[("fields", "id")])
            .json(&metadata)
            .send()
            .await
            .map_err(|e| request_error("folder create", e))?;
        let folder: FileRef = ensure_success(response, "folder create")
            .await?
            .json()
            .await
            .map_err(|e| request_error("folder create", e))?;

        debug!(folder_id = %folder.id, name = %name, "Created Drive folder");
        Ok(folder.id)
    }

    async fn upload_file(
        &self,
        access_token: &str,
        folder_id: &str,
        file_name: &str,
        mime_type: &str,
        data: Bytes,
    ) -> Result<UploadedFile> {
        let size = data.len();

        // Resumable session: metadata first, then the bytes to the session URI
        let session = self
            .client
            .post(format!("{}/files", self.upload_base))
            .bearer_auth(access_token)
            .query(&[
                ("uploadType", "resumable"),
                ("fields", "id,name,size,mimeType,webViewLink"),
            ])
            .header("X-Upload-Content-Type", mime_type)
            .header("X-Upload-Content-Length", size.to_string())
            .json(&serde_json::json!({ "name": file_name, "parents": [folder_id] }))
            .send()
            .await
            .map_err(|e| request_error("upload session", e))?;
        let session = ensure_success(session, "upload session").await?;
        let location = session
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| AppError::external(SERVICE, "upload session returned no location"))?;

        let response = self
            .client
            .put(&location)
            .bearer_auth(access_token)
            .header(CONTENT_TYPE, mime_type)
            .body(data)
            .send()
            .await
            .map_err(|e| request_error("upload", e))?;
        let file: FileResource = ensure_success(response, "upload")
            .await?
            .json()
            .await
            .map_err(|e| request_error("upload", e))?;

        let permission = self
            .client
            .post(format!("{}/files/{}/permissions", self.api_base, file.id))
            .bearer_auth(access_token)
            .json(&serde_json::json!({ "role": "reader", "type": "anyone" }))
            .send()
            .await
            .map_err(|e| request_error("permission grant", e))?;
        ensure_success(permission, "permission grant").await?;

        info!(file_id = %file.id, bytes = size, "Uploaded file to Drive");
        Ok(UploadedFile {
            file_url: file
                .web_view_link
                .unwrap_or_else(|| format!("https://drive.google.com/file/d/{}/view", file.id)),
            file_name: file.name.unwrap_or_else(|| file_name.to_string()),
            file_size: file
                .size
                .and_then(|s| s.parse::<i64>().ok())
                .unwrap_or(size as i64),
            mime_type: file.mime_type.unwrap_or_else(|| mime_type.to_string()),
            folder_id: folder_id.to_string(),
            file_id: file.id,
        })
    }

    async fn delete_file(&self, access_token: &str, file_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/files/{}", self.api_base, file_id))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| request_error("delete", e))?;
        // Already gone is as good as deleted
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        ensure_success(response, "delete").await?;
        Ok(())
    }

    async fn download_file(&self, access_token: &str, file_id: &str) -> Result<DownloadedFile> {
        let url = format!("{}/files/{}", self.api_base, file_id);

        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("fields", "id,name,size,mimeType")])
            .send()
            .await
            .map_err(|e| request_error("metadata", e))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(AppError::not_found("Drive file", file_id));
        }
        let meta: FileResource = ensure_success(response, "metadata")
            .await?
            .json()
            .await
            .map_err(|e| request_error("metadata", e))?;

        let response = self
            .media_client
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(|e| request_error("download", e))?;
        let body = ensure_success(response, "download")
            .await?
            .bytes_stream()
            .map_err(|e| request_error("download", e));
        debug!(file_id = %file_id, "Streaming Drive file");

        Ok(DownloadedFile {
            file_name: meta.name.unwrap_or_else(|| file_id.to_string()),
            mime_type: meta
                .mime_type
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            size: meta.size.and_then(|size| size.parse().ok()),
            body: Box::pin(body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &str) -> GoogleDriveProvider {
        GoogleDriveProvider::from_config(&StorageConfig {
            client_id: Some("cid".to_string()),
            client_secret: Some("secret".to_string()),
            token_url: format!("{}/token", server),
            revoke_url: format!("{}/revoke", server),
            api_base: format!("{}/drive/v3", server),
            upload_base: format!("{}/upload/drive/v3", server),
            ..Default::default()
        })
        .unwrap()
        .unwrap()
    }

    #[test]
    fn test_unconfigured_provider_is_none() {
        assert!(GoogleDriveProvider::from_config(&StorageConfig::default())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_authorization_url_requests_offline_consent() {
        let url = provider("http://localhost").authorization_url("abc");
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?client_id=cid"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
        assert!(url.contains("state=abc"));
        assert!(url.contains("drive.file"));
    }

    #[tokio::test]
    async fn test_exchange_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=the-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at",
                "refresh_token": "rt",
                "expires_in": 3599,
                "scope": "https://www.googleapis.com/auth/drive"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let grant = provider(&server.uri()).exchange_code("the-code").await.unwrap();
        assert_eq!(grant.access_token, "at");
        assert_eq!(grant.refresh_token.as_deref(), Some("rt"));
        assert!(grant.expires_at > Utc::now());
    }

    #[tokio::test]
    async fn test_resumable_upload_grants_read_access() {
        let server = MockServer::start().await;
        let session_uri = format!("{}/session/1", server.uri());

        Mock::given(method("POST"))
            .and(path("/upload/drive/v3/files"))
            .and(query_param("uploadType", "resumable"))
            .and(header("x-upload-content-type", "video/mp4"))
            .respond_with(ResponseTemplate::new(200).insert_header("location", session_uri.as_str()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/session/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "file-1",
                "name": "cut.mp4",
                "size": "4",
                "mimeType": "video/mp4",
                "webViewLink": "https://drive.google.com/file/d/file-1/view"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/drive/v3/files/file-1/permissions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "p" })))
            .expect(1)
            .mount(&server)
            .await;

        let uploaded = provider(&server.uri())
            .upload_file("at", "folder-9", "cut.mp4", "video/mp4", Bytes::from_static(b"abcd"))
            .await
            .unwrap();
        assert_eq!(uploaded.file_id, "file-1");
        assert_eq!(uploaded.file_size, 4);
        assert_eq!(uploaded.folder_id, "folder-9");
    }

    #[tokio::test]
    async fn test_download_streams_media() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/file-9"))
            .and(query_param("fields", "id,name,size,mimeType"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "file-9",
                "name": "final.mp4",
                "size": "5",
                "mimeType": "video/mp4"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/file-9"))
            .and(query_param("alt", "media"))
            .and(header("authorization", "Bearer at"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let file = provider(&server.uri()).download_file("at", "file-9").await.unwrap();
        assert_eq!(file.file_name, "final.mp4");
        assert_eq!(file.mime_type, "video/mp4");
        assert_eq!(file.size, Some(5));
        assert_eq!(file.into_bytes().await.unwrap(), Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn test_delete_missing_file_is_ok() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(provider(&server.uri()).delete_file("at", "gone").await.is_ok());
    }

    #[tokio::test]
    async fn test_token_errors_are_external() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        assert!(matches!(
            provider(&server.uri()).refresh_access_token("rt").await,
            Err(AppError::ExternalDependency { .. })
        ));
    }
}
