//! Channel registry: source channels feed discovery, destination channels
//! receive finished shorts.

use crate::auth::AuthContext;
use crate::catalog::VideoCatalog;
use crate::db::models::{Channel, ChannelActiveModel, ChannelRole, ContentType, SubscriberSnapshot};
use crate::db::{NewChannel, Repository};
use crate::errors::{AppError, Result};
use crate::events::{DomainEvent, SharedEventBus};
use chrono::Utc;
use sea_orm::Set;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChannelRequest {
    pub role: ChannelRole,
    /// Channel id (`UC...`) or a `/channel/UC...` URL
    pub channel: String,
    pub content_type: ContentType,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateChannelRequest {
    pub display_name: Option<String>,
    pub profile_image_url: Option<String>,
    pub content_type: Option<ContentType>,
}

/// Extract the channel id from a bare id or a channel URL
pub fn parse_channel_reference(input: &str) -> Result<String> {
    let input = input.trim();
    let id = match input.split_once("/channel/") {
        Some((_, rest)) => rest.split(['/', '?', '#']).next().unwrap_or_default(),
        None if !input.contains('/') => input,
        None => "",
    };

    if id.starts_with("UC") && id.len() > 2 {
        Ok(id.to_string())
    } else {
        Err(AppError::Validation {
            message: format!("'{}' is not a YouTube channel id or channel URL", input),
            field: Some("channel".to_string()),
        })
    }
}

pub struct ChannelRegistry {
    repo: Repository,
    catalog: Arc<dyn VideoCatalog>,
    bus: SharedEventBus,
}

impl ChannelRegistry {
    pub fn new(repo: Repository, catalog: Arc<dyn VideoCatalog>, bus: SharedEventBus) -> Self {
        Self { repo, catalog, bus }
    }

    async fn load(&self, id: Uuid) -> Result<Channel> {
        self.repo
            .find_channel_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("Channel", id))
    }

    /// Register a channel resolved through the catalog and record its first snapshot
    pub async fn create(&self, actor: &AuthContext, request: CreateChannelRequest) -> Result<Channel> {
        actor.require_admin()?;
        let external_id = parse_channel_reference(&request.channel)?;

        if self
            .repo
            .find_channel_by_external_id(&external_id, request.role)
            .await?
            .is_some()
        {
            return Err(AppError::conflict(format!(
                "{} channel {} is already registered",
                request.role.as_str().to_lowercase(),
                external_id
            )));
        }

        let details = self.catalog.channel_details(&external_id).await?;
        let channel = self
            .repo
            .create_channel(NewChannel {
                external_channel_id: details.external_channel_id,
                role: request.role,
                display_name: details.display_name,
                profile_image_url: details.profile_image_url,
                content_type: request.content_type,
                subscriber_count: details.subscriber_count,
            })
            .await?;
        self.repo
            .append_subscriber_snapshot(channel.id, channel.subscriber_count, channel.created_at)
            .await?;

        info!(channel_id = %channel.id, external_id = %channel.external_channel_id, role = %channel.role, "Channel registered");
        Ok(channel)
    }

    pub async fn update(&self, actor: &AuthContext, id: Uuid, request: UpdateChannelRequest) -> Result<Channel> {
        actor.require_admin()?;
        let channel = self.load(id).await?;

        let mut active: ChannelActiveModel = channel.into();
        if let Some(name) = request.display_name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(AppError::Validation {
                    message: "Display name cannot be empty".to_string(),
                    field: Some("displayName".to_string()),
                });
            }
            active.display_name = Set(name);
        }
        if let Some(url) = request.profile_image_url {
            active.profile_image_url = Set(Some(url).filter(|u| !u.is_empty()));
        }
        if let Some(content_type) = request.content_type {
            active.content_type = Set(content_type.as_str().to_string());
        }
        self.repo.update_channel(active).await
    }

    /// Refused while any work item points at the channel
    pub async fn delete(&self, actor: &AuthContext, id: Uuid) -> Result<()> {
        actor.require_admin()?;
        self.load(id).await?;

        let referencing = self.repo.count_work_items_referencing_channel(id).await?;
        if referencing > 0 {
            return Err(AppError::conflict(format!(
                "Cannot delete channel: {} work items reference it",
                referencing
            )));
        }

        self.repo.delete_channel(id).await?;
        info!(channel_id = %id, "Channel deleted");
        Ok(())
    }

    pub async fn refresh_subscribers(&self, actor: &AuthContext, id: Uuid) -> Result<Channel> {
        actor.require_admin()?;
        let channel = self.load(id).await?;
        self.sync_subscribers(channel).await
    }

    /// Fetch the live count, append a snapshot and store it as current
    pub async fn sync_subscribers(&self, channel: Channel) -> Result<Channel> {
        let details = self.catalog.channel_details(&channel.external_channel_id).await?;
        let now = Utc::now();
        self.repo
            .append_subscriber_snapshot(channel.id, details.subscriber_count, now)
            .await?;

        let previous = channel.subscriber_count;
        let mut active: ChannelActiveModel = channel.into();
        active.subscriber_count = Set(details.subscriber_count);
        active.last_synced_at = Set(Some(now));
        let updated = self.repo.update_channel(active).await?;

        info!(
            channel_id = %updated.id,
            previous,
            current = updated.subscriber_count,
            "Subscriber count refreshed"
        );
        self.bus.publish(DomainEvent::ChannelSubscribersUpdated {
            channel: updated.clone(),
        });
        Ok(updated)
    }

    pub async fn list(&self, role: Option<ChannelRole>) -> Result<Vec<Channel>> {
        self.repo.list_channels(role).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Channel> {
        self.load(id).await
    }

    /// Oldest first
    pub async fn subscriber_history(&self, id: Uuid) -> Result<Vec<SubscriberSnapshot>> {
        self.load(id).await?;
        self.repo.subscriber_history(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fakes::FakeCatalog;
    use crate::db::models::UserRole;
    use crate::db::NewWorkItem;
    use crate::events::{BroadcastEventBus, EventBus, Topic};
    use crate::testing;
    use futures::StreamExt;

    async fn registry() -> (ChannelRegistry, Arc<FakeCatalog>, Arc<BroadcastEventBus>, Repository, AuthContext) {
        let repo = testing::repo().await;
        let catalog = Arc::new(FakeCatalog::default());
        catalog.set_subscribers("UCdest", 1_000);
        let bus = Arc::new(BroadcastEventBus::default());
        let admin = testing::actor(&testing::user(&repo, UserRole::Admin).await);
        let registry = ChannelRegistry::new(repo.clone(), catalog.clone(), bus.clone());
        (registry, catalog, bus, repo, admin)
    }

    fn destination(channel: &str) -> CreateChannelRequest {
        CreateChannelRequest {
            role: ChannelRole::Destination,
            channel: channel.to_string(),
            content_type: ContentType::VfAvecEdit,
        }
    }

    #[test]
    fn test_parse_channel_reference() {
        assert_eq!(parse_channel_reference("UCabc").unwrap(), "UCabc");
        assert_eq!(
            parse_channel_reference("https://www.youtube.com/channel/UCabc/videos?x=1").unwrap(),
            "UCabc"
        );
        assert!(parse_channel_reference("https://www.youtube.com/@someone").is_err());
        assert!(parse_channel_reference("UC").is_err());
    }

    #[tokio::test]
    async fn test_create_records_first_snapshot_and_rejects_duplicates() {
        let (registry, _, _, repo, admin) = registry().await;

        let channel = registry
            .create(&admin, destination("https://youtube.com/channel/UCdest"))
            .await
            .unwrap();
        assert_eq!(channel.display_name, "@UCdest");
        assert_eq!(channel.subscriber_count, 1_000);
        assert!(channel.is_destination());

        let history = repo.subscriber_history(channel.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].subscriber_count, 1_000);

        assert!(matches!(
            registry.create(&admin, destination("UCdest")).await,
            Err(AppError::Conflict { .. })
        ));

        // Same external id in the other role is a different registration
        let source = registry
            .create(
                &admin,
                CreateChannelRequest {
                    role: ChannelRole::Source,
                    ..destination("UCdest")
                },
            )
            .await
            .unwrap();
        assert!(source.is_source());
    }

    #[tokio::test]
    async fn test_unknown_channel_is_not_registered() {
        let (registry, _, _, repo, admin) = registry().await;

        assert!(registry.create(&admin, destination("UCmissing")).await.is_err());
        assert!(repo.list_channels(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_appends_snapshot_and_publishes() {
        let (registry, catalog, bus, repo, admin) = registry().await;
        let channel = registry.create(&admin, destination("UCdest")).await.unwrap();
        let mut events = bus.subscribe(Topic::ChannelSubscribersUpdated, Box::new(|_| true));

        catalog.set_subscribers("UCdest", 1_250);
        let refreshed = registry.refresh_subscribers(&admin, channel.id).await.unwrap();

        assert_eq!(refreshed.subscriber_count, 1_250);
        let history = repo.subscriber_history(channel.id).await.unwrap();
        let counts: Vec<i64> = history.iter().map(|s| s.subscriber_count).collect();
        assert_eq!(counts, vec![1_000, 1_250]);

        match events.next().await {
            Some(DomainEvent::ChannelSubscribersUpdated { channel: c }) => {
                assert_eq!(c.subscriber_count, 1_250)
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delete_refused_while_referenced() {
        let (registry, _, _, repo, admin) = registry().await;
        let source = testing::channel(&repo, "UCsrc", ChannelRole::Source).await;
        repo.create_work_item(NewWorkItem {
            source_video_id: "v".to_string(),
            source_video_url: "https://youtube.com/shorts/v".to_string(),
            source_channel_id: source.id,
            title: None,
            description: None,
            tags: Vec::new(),
        })
        .await
        .unwrap();

        assert!(matches!(
            registry.delete(&admin, source.id).await,
            Err(AppError::Conflict { .. })
        ));

        let unused = registry.create(&admin, destination("UCdest")).await.unwrap();
        registry.delete(&admin, unused.id).await.unwrap();
        assert!(matches!(
            registry.get(unused.id).await,
            Err(AppError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_requires_admin() {
        let (registry, _, _, repo, admin) = registry().await;
        let channel = registry.create(&admin, destination("UCdest")).await.unwrap();
        let producer = testing::actor(&testing::user(&repo, UserRole::Producer).await);

        let request = UpdateChannelRequest {
            content_type: Some(ContentType::VoSansEdit),
            ..Default::default()
        };
        assert!(matches!(
            registry.update(&producer, channel.id, request.clone()).await,
            Err(AppError::Forbidden { .. })
        ));

        let updated = registry.update(&admin, channel.id, request).await.unwrap();
        assert_eq!(updated.content_type, "VO_SANS_EDIT");
        assert_eq!(updated.display_name, channel.display_name);
    }
}
