//! Configuration management for ShortHub services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    /// Video metadata provider (YouTube Data API)
    #[serde(default)]
    pub youtube: YoutubeConfig,

    #[serde(default)]
    pub email: EmailConfig,

    #[serde(default)]
    pub whatsapp: WhatsAppConfig,

    /// External file storage (Google Drive)
    #[serde(default)]
    pub storage: StorageConfig,

    /// Profile image hosting (ImageKit)
    #[serde(default)]
    pub images: ImageHostConfig,

    #[serde(default)]
    pub jobs: JobsConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Allowed CORS origins; empty means any
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Public URL of the web client, used in emails and OAuth redirects
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes)
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Create missing tables from entity definitions at startup
    #[serde(default = "default_true")]
    pub auto_create_schema: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Secret for access token signing
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,

    /// Secret for refresh token signing
    #[serde(default = "default_refresh_secret")]
    pub refresh_secret: String,

    /// Access token lifetime in seconds (7 days)
    #[serde(default = "default_access_expiration")]
    pub access_expiration_secs: u64,

    /// Refresh token lifetime in seconds (30 days)
    #[serde(default = "default_refresh_expiration")]
    pub refresh_expiration_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct YoutubeConfig {
    pub api_key: Option<String>,

    #[serde(default = "default_youtube_base")]
    pub api_base: String,

    /// Videos fetched per discovery request
    #[serde(default = "default_youtube_max_results")]
    pub max_results: u32,

    #[serde(default = "default_external_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmailConfig {
    #[serde(default = "default_email_host")]
    pub host: String,

    #[serde(default = "default_email_port")]
    pub port: u16,

    /// Implicit TLS when true, STARTTLS otherwise
    #[serde(default)]
    pub secure: bool,

    pub user: Option<String>,

    pub password: Option<String>,

    #[serde(default = "default_email_from")]
    pub from: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WhatsAppConfig {
    pub access_token: Option<String>,

    pub phone_number_id: Option<String>,

    #[serde(default = "default_whatsapp_version")]
    pub api_version: String,

    #[serde(default = "default_whatsapp_base")]
    pub api_base: String,

    #[serde(default = "default_external_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub client_id: Option<String>,

    pub client_secret: Option<String>,

    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,

    /// Key material for credential encryption at rest
    #[serde(default = "default_encryption_key")]
    pub encryption_key: String,

    #[serde(default = "default_root_folder_name")]
    pub root_folder_name: String,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    #[serde(default = "default_oauth_auth_url")]
    pub auth_url: String,

    #[serde(default = "default_oauth_token_url")]
    pub token_url: String,

    #[serde(default = "default_oauth_revoke_url")]
    pub revoke_url: String,

    #[serde(default = "default_drive_api_base")]
    pub api_base: String,

    #[serde(default = "default_drive_upload_base")]
    pub upload_base: String,

    #[serde(default = "default_storage_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImageHostConfig {
    pub private_key: Option<String>,

    #[serde(default = "default_image_upload_url")]
    pub upload_url: String,

    #[serde(default = "default_image_folder")]
    pub folder: String,

    #[serde(default = "default_external_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobsConfig {
    #[serde(default = "default_deadline_cron")]
    pub deadline_reminder_cron: String,

    #[serde(default = "default_subscriber_cron")]
    pub subscriber_sync_cron: String,

    #[serde(default = "default_cleanup_cron")]
    pub notification_cleanup_cron: String,

    /// Read notifications older than this are purged
    #[serde(default = "default_retention_days")]
    pub notification_retention_days: i64,

    /// Deadlines closer than this trigger a reminder
    #[serde(default = "default_reminder_window")]
    pub reminder_window_hours: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_true")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    #[serde(default = "default_burst")]
    pub burst: u32,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 4000 }
fn default_request_timeout() -> u64 { 120 }
fn default_frontend_url() -> String { "http://localhost:5173".to_string() }
fn default_database_url() -> String { "postgres://localhost/shorthub".to_string() }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_true() -> bool { true }
fn default_jwt_secret() -> String { "change-me-access".to_string() }
fn default_refresh_secret() -> String { "change-me-refresh".to_string() }
fn default_access_expiration() -> u64 { 7 * 24 * 3600 }
fn default_refresh_expiration() -> u64 { 30 * 24 * 3600 }
fn default_youtube_base() -> String { "https://www.googleapis.com/youtube/v3".to_string() }
fn default_youtube_max_results() -> u32 { 50 }
fn default_external_timeout() -> u64 { 15 }
fn default_email_host() -> String { "smtp.gmail.com".to_string() }
fn default_email_port() -> u16 { 587 }
fn default_email_from() -> String { "ShortHub <noreply@shorthub.app>".to_string() }
fn default_whatsapp_version() -> String { "v18.0".to_string() }
fn default_whatsapp_base() -> String { "https://graph.facebook.com".to_string() }
fn default_redirect_uri() -> String { "http://localhost:4000/api/drive/oauth-callback".to_string() }
fn default_encryption_key() -> String { "change-me-encryption-key".to_string() }
fn default_root_folder_name() -> String { "ShortHub".to_string() }
fn default_max_upload_bytes() -> usize { 500 * 1024 * 1024 }
fn default_oauth_auth_url() -> String { "https://accounts.google.com/o/oauth2/v2/auth".to_string() }
fn default_oauth_token_url() -> String { "https://oauth2.googleapis.com/token".to_string() }
fn default_oauth_revoke_url() -> String { "https://oauth2.googleapis.com/revoke".to_string() }
fn default_drive_api_base() -> String { "https://www.googleapis.com/drive/v3".to_string() }
fn default_drive_upload_base() -> String { "https://www.googleapis.com/upload/drive/v3".to_string() }
fn default_storage_timeout() -> u64 { 300 }
fn default_image_upload_url() -> String { "https://upload.imagekit.io/api/v1/files/upload".to_string() }
fn default_image_folder() -> String { "profile-images".to_string() }
fn default_deadline_cron() -> String { "0 0 * * * *".to_string() }
fn default_subscriber_cron() -> String { "0 0 2 * * *".to_string() }
fn default_cleanup_cron() -> String { "0 0 3 * * Sun".to_string() }
fn default_retention_days() -> i64 { 30 }
fn default_reminder_window() -> i64 { 24 }
fn default_log_level() -> String { "info".to_string() }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "shorthub".to_string() }
fn default_rate_limit() -> u32 { 50 }
fn default_burst() -> u32 { 100 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            cors_origins: Vec::new(),
            frontend_url: default_frontend_url(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            read_url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            auto_create_schema: true,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            refresh_secret: default_refresh_secret(),
            access_expiration_secs: default_access_expiration(),
            refresh_expiration_secs: default_refresh_expiration(),
        }
    }
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: default_youtube_base(),
            max_results: default_youtube_max_results(),
            timeout_secs: default_external_timeout(),
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            host: default_email_host(),
            port: default_email_port(),
            secure: false,
            user: None,
            password: None,
            from: default_email_from(),
        }
    }
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            phone_number_id: None,
            api_version: default_whatsapp_version(),
            api_base: default_whatsapp_base(),
            timeout_secs: default_external_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: default_redirect_uri(),
            encryption_key: default_encryption_key(),
            root_folder_name: default_root_folder_name(),
            max_upload_bytes: default_max_upload_bytes(),
            auth_url: default_oauth_auth_url(),
            token_url: default_oauth_token_url(),
            revoke_url: default_oauth_revoke_url(),
            api_base: default_drive_api_base(),
            upload_base: default_drive_upload_base(),
            timeout_secs: default_storage_timeout(),
        }
    }
}

impl Default for ImageHostConfig {
    fn default() -> Self {
        Self {
            private_key: None,
            upload_url: default_image_upload_url(),
            folder: default_image_folder(),
            timeout_secs: default_external_timeout(),
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            deadline_reminder_cron: default_deadline_cron(),
            subscriber_sync_cron: default_subscriber_cron(),
            notification_cleanup_cron: default_cleanup_cron(),
            notification_retention_days: default_retention_days(),
            reminder_window_hours: default_reminder_window(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: true,
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // e.g. APP__SERVER__PORT=4000, APP__STORAGE__CLIENT_ID=...
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins"),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific config file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get the read database URL (falls back to primary)
    pub fn read_database_url(&self) -> &str {
        self.database.read_url.as_deref().unwrap_or(&self.database.url)
    }

    /// Whether SMTP credentials are present
    pub fn email_configured(&self) -> bool {
        self.email.user.is_some() && self.email.password.is_some()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            youtube: YoutubeConfig::default(),
            email: EmailConfig::default(),
            whatsapp: WhatsAppConfig::default(),
            storage: StorageConfig::default(),
            images: ImageHostConfig::default(),
            jobs: JobsConfig::default(),
            observability: ObservabilityConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.email.host, "smtp.gmail.com");
        assert_eq!(config.email.port, 587);
        assert_eq!(config.storage.root_folder_name, "ShortHub");
        assert_eq!(config.storage.max_upload_bytes, 500 * 1024 * 1024);
        assert_eq!(config.auth.access_expiration_secs, 604_800);
    }

    #[test]
    fn test_read_database_fallback() {
        let config = AppConfig::default();
        assert_eq!(config.read_database_url(), "postgres://localhost/shorthub");
    }

    #[test]
    fn test_empty_source_uses_defaults() {
        let config: AppConfig = Config::builder()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(config.jobs.notification_retention_days, 30);
        assert_eq!(config.whatsapp.api_version, "v18.0");
        assert!(!config.email_configured());
    }
}
