//! Wiring of every service from configuration

use crate::analytics::Analytics;
use crate::auth::AuthService;
use crate::catalog::{VideoCatalog, YoutubeClient};
use crate::channels::ChannelRegistry;
use crate::config::AppConfig;
use crate::crypto::TokenCipher;
use crate::db::{DbPool, Repository};
use crate::errors::Result;
use crate::events::{BroadcastEventBus, SharedEventBus};
use crate::jobs::JobRunner;
use crate::lifecycle::LifecycleEngine;
use crate::notifications::{
    EmailTransport, MessagingTransport, NotificationDispatcher, SmtpEmailTransport, WhatsAppClient,
};
use crate::storage::{GoogleDriveProvider, StorageConnector, StorageProvider};
use crate::users::{ImageHost, ImageKitHost, UserDirectory};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared handles used by both binaries
#[derive(Clone)]
pub struct AppServices {
    pub config: Arc<AppConfig>,
    pub repo: Repository,
    pub bus: SharedEventBus,
    pub auth: Arc<AuthService>,
    pub notifier: Arc<NotificationDispatcher>,
    pub storage: Arc<StorageConnector>,
    pub lifecycle: Arc<LifecycleEngine>,
    pub channels: Arc<ChannelRegistry>,
    pub users: Arc<UserDirectory>,
    pub analytics: Arc<Analytics>,
    pub jobs: Arc<JobRunner>,
}

impl AppServices {
    /// Connect to the database and build every service
    pub async fn build(config: AppConfig) -> Result<Self> {
        let pool = DbPool::new(&config.database).await?;
        Self::from_pool(config, pool)
    }

    pub fn from_pool(config: AppConfig, pool: DbPool) -> Result<Self> {
        let repo = Repository::new(pool);
        let bus = BroadcastEventBus::shared();

        let email: Option<Arc<dyn EmailTransport>> = match SmtpEmailTransport::from_config(&config.email)? {
            Some(transport) => Some(Arc::new(transport)),
            None => {
                warn!("SMTP credentials not configured, email notifications disabled");
                None
            }
        };
        let messaging: Option<Arc<dyn MessagingTransport>> = match WhatsAppClient::from_config(&config.whatsapp)? {
            Some(client) => Some(Arc::new(client)),
            None => {
                warn!("WhatsApp credentials not configured, WhatsApp notifications disabled");
                None
            }
        };
        let notifier = Arc::new(NotificationDispatcher::new(
            repo.clone(),
            bus.clone(),
            email,
            messaging,
            config.server.frontend_url.clone(),
        ));

        let provider: Option<Arc<dyn StorageProvider>> = match GoogleDriveProvider::from_config(&config.storage)? {
            Some(provider) => Some(Arc::new(provider)),
            None => {
                warn!("Drive OAuth client not configured, uploads disabled");
                None
            }
        };
        let storage = Arc::new(StorageConnector::new(
            repo.clone(),
            provider,
            TokenCipher::new(&config.storage.encryption_key),
            config.storage.root_folder_name.clone(),
        ));

        if config.youtube.api_key.is_none() {
            warn!("YouTube API key not configured, discovery and channel lookups will fail");
        }
        let catalog: Arc<dyn VideoCatalog> = Arc::new(YoutubeClient::new(&config.youtube)?);

        let channels = Arc::new(ChannelRegistry::new(repo.clone(), catalog.clone(), bus.clone()));
        let lifecycle = Arc::new(LifecycleEngine::new(
            repo.clone(),
            catalog,
            notifier.clone(),
            storage.clone(),
            bus.clone(),
        ));
        let images: Option<Arc<dyn ImageHost>> = match ImageKitHost::from_config(&config.images)? {
            Some(host) => Some(Arc::new(host)),
            None => {
                warn!("ImageKit key not configured, profile image upload disabled");
                None
            }
        };
        let users = Arc::new(UserDirectory::new(repo.clone(), notifier.clone(), bus.clone(), images));
        let jobs = Arc::new(JobRunner::new(
            repo.clone(),
            notifier.clone(),
            channels.clone(),
            config.jobs.clone(),
        ));

        info!("Services initialized");
        Ok(Self {
            auth: Arc::new(AuthService::new(repo.clone(), &config.auth)),
            analytics: Arc::new(Analytics::new(repo.clone())),
            config: Arc::new(config),
            repo,
            bus,
            notifier,
            storage,
            lifecycle,
            channels,
            users,
            jobs,
        })
    }
}
