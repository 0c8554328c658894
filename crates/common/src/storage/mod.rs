//! External storage connector
//!
//! Owns the singleton OAuth credential and the folder convention
//! `{root}/{producer}/Short-{item}`. Access-token refresh is a critical
//! section: concurrent operations wait on one refresh instead of racing.

mod drive;

pub use drive::GoogleDriveProvider;

use crate::crypto::TokenCipher;
use crate::db::models::{StorageCredential, StorageCredentialActiveModel};
use crate::db::Repository;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{self, Stream, TryStreamExt};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sea_orm::{ActiveValue::Unchanged, Set};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// Video containers accepted for upload
pub const ALLOWED_MIME_TYPES: [&str; 5] = [
    "video/mp4",
    "video/mpeg",
    "video/quicktime",
    "video/x-msvideo",
    "video/x-matroska",
];

pub fn is_allowed_mime_type(mime_type: &str) -> bool {
    ALLOWED_MIME_TYPES.contains(&mime_type)
}

/// Folder holding the deliverable of one work item
pub fn item_folder_name(item_id: Uuid) -> String {
    format!("Short-{}", item_id)
}

/// Tokens returned by the provider's token endpoint
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    /// Providers only return a refresh token on consent or rotation
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub scope: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub file_id: String,
    pub file_url: String,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: String,
    pub folder_id: String,
}

/// File body as it arrives from the provider
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

pub struct DownloadedFile {
    pub file_name: String,
    pub mime_type: String,
    /// Byte length when the provider reports it
    pub size: Option<u64>,
    pub body: ByteStream,
}

impl DownloadedFile {
    /// Wrap a body that is already in memory
    pub fn from_bytes(file_name: impl Into<String>, mime_type: impl Into<String>, data: Bytes) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            size: Some(data.len() as u64),
            body: Box::pin(stream::once(async move { Ok(data) })),
        }
    }

    /// Drain the body into one buffer
    pub async fn into_bytes(self) -> Result<Bytes> {
        let chunks: Vec<Bytes> = self.body.try_collect().await?;
        Ok(Bytes::from(chunks.concat()))
    }
}

impl std::fmt::Debug for DownloadedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadedFile")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub is_connected: bool,
    pub root_folder_id: Option<String>,
    pub root_folder_name: Option<String>,
    pub last_sync: Option<DateTime<Utc>>,
}

impl ConnectionInfo {
    fn disconnected() -> Self {
        Self {
            is_connected: false,
            root_folder_id: None,
            root_folder_name: None,
            last_sync: None,
        }
    }
}

impl From<&StorageCredential> for ConnectionInfo {
    fn from(c: &StorageCredential) -> Self {
        Self {
            is_connected: c.is_connected,
            root_folder_id: c.root_folder_id.clone(),
            root_folder_name: c.root_folder_name.clone(),
            last_sync: c.last_sync,
        }
    }
}

/// Remote file storage with OAuth authorization
#[async_trait]
pub trait StorageProvider: Send + Sync {
    fn authorization_url(&self, state: &str) -> String;

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant>;

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenGrant>;

    async fn revoke_token(&self, token: &str) -> Result<()>;

    async fn find_folder(&self, access_token: &str, name: &str, parent: Option<&str>) -> Result<Option<String>>;

    async fn create_folder(&self, access_token: &str, name: &str, parent: Option<&str>) -> Result<String>;

    /// Create the file in `folder_id` and make it readable by link
    async fn upload_file(
        &self,
        access_token: &str,
        folder_id: &str,
        file_name: &str,
        mime_type: &str,
        data: Bytes,
    ) -> Result<UploadedFile>;

    async fn delete_file(&self, access_token: &str, file_id: &str) -> Result<()>;

    async fn download_file(&self, access_token: &str, file_id: &str) -> Result<DownloadedFile>;
}

/// Random OAuth `state` parameter
fn oauth_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

pub struct StorageConnector {
    repo: Repository,
    provider: Option<Arc<dyn StorageProvider>>,
    cipher: TokenCipher,
    root_folder_name: String,
    refresh_lock: Mutex<()>,
}

impl StorageConnector {
    pub fn new(
        repo: Repository,
        provider: Option<Arc<dyn StorageProvider>>,
        cipher: TokenCipher,
        root_folder_name: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            provider,
            cipher,
            root_folder_name: root_folder_name.into(),
            refresh_lock: Mutex::new(()),
        }
    }

    fn provider(&self) -> Result<&Arc<dyn StorageProvider>> {
        self.provider.as_ref().ok_or_else(|| AppError::Configuration {
            message: "Storage OAuth client is not configured".to_string(),
        })
    }

    /// Consent URL the admin is redirected to
    pub fn auth_url(&self) -> Result<String> {
        Ok(self.provider()?.authorization_url(&oauth_state()))
    }

    /// Complete the OAuth flow: store encrypted tokens, create the root folder once
    pub async fn handle_callback(&self, code: &str) -> Result<ConnectionInfo> {
        let provider = self.provider()?;
        let grant = provider.exchange_code(code).await?;
        let refresh_token = grant
            .refresh_token
            .as_deref()
            .ok_or_else(|| AppError::external("google-drive", "token response carried no refresh token"))?;

        let now = Utc::now();
        let existing = self.repo.find_storage_credential().await?;

        let root_folder_id = match existing.as_ref().and_then(|c| c.root_folder_id.clone()) {
            Some(id) => id,
            None => {
                provider
                    .create_folder(&grant.access_token, &self.root_folder_name, None)
                    .await?
            }
        };

        let saved = self
            .repo
            .save_storage_credential(StorageCredentialActiveModel {
                encrypted_access_token: Set(self.cipher.encrypt(&grant.access_token)?),
                encrypted_refresh_token: Set(self.cipher.encrypt(refresh_token)?),
                token_expires_at: Set(grant.expires_at),
                scope: Set(grant.scope.clone()),
                root_folder_id: Set(Some(root_folder_id)),
                root_folder_name: Set(Some(self.root_folder_name.clone())),
                is_connected: Set(true),
                last_sync: Set(Some(now)),
                ..Default::default()
            })
            .await?;

        info!(root_folder = ?saved.root_folder_id, "Storage connected");
        Ok(ConnectionInfo::from(&saved))
    }

    pub async fn connection_info(&self) -> Result<ConnectionInfo> {
        Ok(self
            .repo
            .find_storage_credential()
            .await?
            .as_ref()
            .map(ConnectionInfo::from)
            .unwrap_or_else(ConnectionInfo::disconnected))
    }

    /// Revoke with the provider, then forget the credential entirely
    pub async fn disconnect(&self) -> Result<()> {
        let Some(credential) = self.repo.find_storage_credential().await? else {
            return Ok(());
        };

        if let Some(provider) = &self.provider {
            let token = self.cipher.decrypt(&credential.encrypted_access_token)?;
            if let Err(e) = provider.revoke_token(&token).await {
                // A revoked or expired token must not keep the record alive
                warn!(error = %e, "Token revocation failed, removing credential anyway");
            }
        }

        self.repo.delete_storage_credential().await?;
        info!("Storage disconnected");
        Ok(())
    }

    /// Valid access token plus the credential it came from, refreshing at most once
    pub async fn access_token(&self) -> Result<(String, StorageCredential)> {
        let _guard = self.refresh_lock.lock().await;

        let credential = self
            .repo
            .find_storage_credential()
            .await?
            .filter(|c| c.is_connected)
            .ok_or(AppError::StorageNotConnected)?;

        if !credential.is_expired(Utc::now()) {
            let token = self.cipher.decrypt(&credential.encrypted_access_token)?;
            return Ok((token, credential));
        }

        let refresh_token = self.cipher.decrypt(&credential.encrypted_refresh_token)?;
        let grant = self.provider()?.refresh_access_token(&refresh_token).await?;

        let mut update = StorageCredentialActiveModel {
            id: Unchanged(credential.id),
            encrypted_access_token: Set(self.cipher.encrypt(&grant.access_token)?),
            token_expires_at: Set(grant.expires_at),
            ..Default::default()
        };
        if let Some(rotated) = grant.refresh_token.as_deref() {
            update.encrypted_refresh_token = Set(self.cipher.encrypt(rotated)?);
        }
        let saved = self.repo.save_storage_credential(update).await?;

        info!(expires_at = %saved.token_expires_at, "Storage access token refreshed");
        Ok((grant.access_token, saved))
    }

    async fn touch_last_sync(&self) -> Result<()> {
        self.repo
            .save_storage_credential(StorageCredentialActiveModel {
                id: Unchanged(crate::db::models::CREDENTIAL_ID),
                last_sync: Set(Some(Utc::now())),
                ..Default::default()
            })
            .await?;
        Ok(())
    }

    /// Run a provider call with timing, metrics and the lastSync refresh
    async fn instrumented<T, Fut>(&self, operation: &str, fut: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let start = Instant::now();
        let result = fut.await;
        metrics::record_storage(operation, start.elapsed().as_secs_f64(), result.is_ok());
        if result.is_ok() {
            if let Err(e) = self.touch_last_sync().await {
                warn!(error = %e, "Failed to update storage lastSync");
            }
        }
        result
    }

    async fn find_or_create_folder(
        &self,
        provider: &dyn StorageProvider,
        token: &str,
        name: &str,
        parent: Option<&str>,
    ) -> Result<String> {
        match provider.find_folder(token, name, parent).await? {
            Some(id) => Ok(id),
            None => provider.create_folder(token, name, parent).await,
        }
    }

    async fn root_folder(&self, provider: &dyn StorageProvider, token: &str, credential: &StorageCredential) -> Result<String> {
        if let Some(id) = &credential.root_folder_id {
            return Ok(id.clone());
        }
        let id = self
            .find_or_create_folder(provider, token, &self.root_folder_name, None)
            .await?;
        self.repo
            .save_storage_credential(StorageCredentialActiveModel {
                id: Unchanged(credential.id),
                root_folder_id: Set(Some(id.clone())),
                root_folder_name: Set(Some(self.root_folder_name.clone())),
                ..Default::default()
            })
            .await?;
        Ok(id)
    }

    /// Upload into `{root}/{producer_folder}/Short-{item_id}`
    pub async fn upload(
        &self,
        producer_folder: &str,
        item_id: Uuid,
        file_name: &str,
        mime_type: &str,
        data: Bytes,
    ) -> Result<UploadedFile> {
        let provider = self.provider()?.clone();
        let (token, credential) = self.access_token().await?;

        self.instrumented("upload", async {
            let root = self.root_folder(provider.as_ref(), &token, &credential).await?;
            let producer = self
                .find_or_create_folder(provider.as_ref(), &token, producer_folder, Some(&root))
                .await?;
            let item = self
                .find_or_create_folder(provider.as_ref(), &token, &item_folder_name(item_id), Some(&producer))
                .await?;
            provider.upload_file(&token, &item, file_name, mime_type, data).await
        })
        .await
    }

    pub async fn download(&self, file_id: &str) -> Result<DownloadedFile> {
        let provider = self.provider()?.clone();
        let (token, _) = self.access_token().await?;
        self.instrumented("download", provider.download_file(&token, file_id))
            .await
    }

    pub async fn delete_file(&self, file_id: &str) -> Result<()> {
        let provider = self.provider()?.clone();
        let (token, _) = self.access_token().await?;
        self.instrumented("delete", provider.delete_file(&token, file_id))
            .await
    }
}
