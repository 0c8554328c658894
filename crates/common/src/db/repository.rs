//! Repository pattern for database operations
//!
//! Provides typed async access to every ShortHub table. Business rules live in
//! the services; this layer only reads and writes rows.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::Result;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Fields needed to create a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub role: UserRole,
    pub phone: Option<String>,
}

/// Fields needed to register a channel
#[derive(Debug, Clone)]
pub struct NewChannel {
    pub external_channel_id: String,
    pub role: ChannelRole,
    pub display_name: String,
    pub profile_image_url: Option<String>,
    pub content_type: ContentType,
    pub subscriber_count: i64,
}

/// Fields captured when a candidate is discovered
#[derive(Debug, Clone)]
pub struct NewWorkItem {
    pub source_video_id: String,
    pub source_video_url: String,
    pub source_channel_id: Uuid,
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

/// Work item query filter; unset fields match everything
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemFilter {
    pub status: Option<WorkItemStatus>,
    pub assigned_to: Option<Uuid>,
    pub source_channel_id: Option<Uuid>,
    pub target_channel_id: Option<Uuid>,
    pub discovered_from: Option<DateTime<Utc>>,
    pub discovered_to: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// One audit entry to record
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub user_id: Uuid,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Uuid,
    pub details: Option<serde_json::Value>,
    pub ip_address: Option<String>,
}

/// Activity log filter; unset fields match everything
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityFilter {
    pub user_id: Option<Uuid>,
    pub resource_type: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Default page size of the activity log
pub const DEFAULT_ACTIVITY_LIMIT: u64 = 50;

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // User Operations
    // ========================================================================

    /// Create a new active user
    pub async fn create_user(&self, new: NewUser) -> Result<User> {
        let now = Utc::now();

        let user = UserActiveModel {
            id: Set(Uuid::new_v4()),
            username: Set(new.username),
            email: Set(new.email),
            password_hash: Set(new.password_hash),
            role: Set(new.role.as_str().to_string()),
            status: Set(UserStatus::Active.as_str().to_string()),
            phone: Set(new.phone),
            whatsapp_linked: Set(false),
            email_notifications: Set(true),
            whatsapp_notifications: Set(false),
            supervisor_id: Set(None),
            profile_image_url: Set(None),
            last_login_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        user.insert(self.write_conn()).await.map_err(Into::into)
    }

    pub async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        UserEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        UserEntity::find()
            .filter(UserColumn::Username.eq(username))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        UserEntity::find()
            .filter(UserColumn::Email.eq(email))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    pub async fn find_user_by_phone(&self, phone: &str) -> Result<Option<User>> {
        UserEntity::find()
            .filter(UserColumn::Phone.eq(phone))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Batch lookup used by the user loader
    pub async fn find_users_by_ids(&self, ids: &[Uuid]) -> Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        UserEntity::find()
            .filter(UserColumn::Id.is_in(ids.to_vec()))
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// List users, newest first
    pub async fn list_users(
        &self,
        role: Option<UserRole>,
        status: Option<UserStatus>,
    ) -> Result<Vec<User>> {
        let mut query = UserEntity::find();
        if let Some(role) = role {
            query = query.filter(UserColumn::Role.eq(role.as_str()));
        }
        if let Some(status) = status {
            query = query.filter(UserColumn::Status.eq(status.as_str()));
        }
        query
            .order_by_desc(UserColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    pub async fn list_active_admins(&self) -> Result<Vec<User>> {
        self.list_users(Some(UserRole::Admin), Some(UserStatus::Active)).await
    }

    /// Persist changed user fields
    pub async fn update_user(&self, mut user: UserActiveModel) -> Result<User> {
        user.updated_at = Set(Utc::now());
        user.update(self.write_conn()).await.map_err(Into::into)
    }

    pub async fn delete_user(&self, id: Uuid) -> Result<bool> {
        let result = UserEntity::delete_by_id(id).exec(self.write_conn()).await?;
        Ok(result.rows_affected > 0)
    }

    pub async fn count_users(&self) -> Result<u64> {
        UserEntity::find()
            .count(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Channel Operations
    // ========================================================================

    /// Register a channel
    pub async fn create_channel(&self, new: NewChannel) -> Result<Channel> {
        let now = Utc::now();

        let channel = ChannelActiveModel {
            id: Set(Uuid::new_v4()),
            external_channel_id: Set(new.external_channel_id),
            role: Set(new.role.as_str().to_string()),
            display_name: Set(new.display_name),
            profile_image_url: Set(new.profile_image_url),
            content_type: Set(new.content_type.as_str().to_string()),
            subscriber_count: Set(new.subscriber_count),
            last_synced_at: Set(Some(now)),
            created_at: Set(now),
            updated_at: Set(now),
        };

        channel.insert(self.write_conn()).await.map_err(Into::into)
    }

    pub async fn find_channel_by_id(&self, id: Uuid) -> Result<Option<Channel>> {
        ChannelEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Find a channel by its external id within one role
    pub async fn find_channel_by_external_id(
        &self,
        external_channel_id: &str,
        role: ChannelRole,
    ) -> Result<Option<Channel>> {
        ChannelEntity::find()
            .filter(ChannelColumn::ExternalChannelId.eq(external_channel_id))
            .filter(ChannelColumn::Role.eq(role.as_str()))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Batch lookup used by the channel loader
    pub async fn find_channels_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Channel>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        ChannelEntity::find()
            .filter(ChannelColumn::Id.is_in(ids.to_vec()))
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// List channels, newest first
    pub async fn list_channels(&self, role: Option<ChannelRole>) -> Result<Vec<Channel>> {
        let mut query = ChannelEntity::find();
        if let Some(role) = role {
            query = query.filter(ChannelColumn::Role.eq(role.as_str()));
        }
        query
            .order_by_desc(ChannelColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    pub async fn count_channels(&self, role: Option<ChannelRole>) -> Result<u64> {
        let mut query = ChannelEntity::find();
        if let Some(role) = role {
            query = query.filter(ChannelColumn::Role.eq(role.as_str()));
        }
        query.count(self.read_conn()).await.map_err(Into::into)
    }

    pub async fn update_channel(&self, mut channel: ChannelActiveModel) -> Result<Channel> {
        channel.updated_at = Set(Utc::now());
        channel.update(self.write_conn()).await.map_err(Into::into)
    }

    /// Delete a channel and its subscriber history
    pub async fn delete_channel(&self, id: Uuid) -> Result<bool> {
        let txn = self.write_conn().begin().await?;

        SubscriberSnapshotEntity::delete_many()
            .filter(SubscriberSnapshotColumn::ChannelId.eq(id))
            .exec(&txn)
            .await?;
        let result = ChannelEntity::delete_by_id(id).exec(&txn).await?;

        txn.commit().await?;
        Ok(result.rows_affected > 0)
    }

    /// Number of work items whose source or target is the channel
    pub async fn count_work_items_referencing_channel(&self, channel_id: Uuid) -> Result<u64> {
        WorkItemEntity::find()
            .filter(
                Condition::any()
                    .add(WorkItemColumn::SourceChannelId.eq(channel_id))
                    .add(WorkItemColumn::TargetChannelId.eq(channel_id)),
            )
            .count(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Subscriber History Operations
    // ========================================================================

    /// Append a subscriber snapshot
    pub async fn append_subscriber_snapshot(
        &self,
        channel_id: Uuid,
        subscriber_count: i64,
        recorded_at: DateTime<Utc>,
    ) -> Result<SubscriberSnapshot> {
        let snapshot = SubscriberSnapshotActiveModel {
            id: Set(Uuid::new_v4()),
            channel_id: Set(channel_id),
            subscriber_count: Set(subscriber_count),
            recorded_at: Set(recorded_at),
        };

        snapshot.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Full history for a channel, oldest first
    pub async fn subscriber_history(&self, channel_id: Uuid) -> Result<Vec<SubscriberSnapshot>> {
        SubscriberSnapshotEntity::find()
            .filter(SubscriberSnapshotColumn::ChannelId.eq(channel_id))
            .order_by_asc(SubscriberSnapshotColumn::RecordedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Oldest snapshot recorded at or before the threshold
    pub async fn first_snapshot_at_or_before(
        &self,
        channel_id: Uuid,
        threshold: DateTime<Utc>,
    ) -> Result<Option<SubscriberSnapshot>> {
        SubscriberSnapshotEntity::find()
            .filter(SubscriberSnapshotColumn::ChannelId.eq(channel_id))
            .filter(SubscriberSnapshotColumn::RecordedAt.lte(threshold))
            .order_by_asc(SubscriberSnapshotColumn::RecordedAt)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Work Item Operations
    // ========================================================================

    /// Insert a freshly discovered work item
    pub async fn create_work_item(&self, new: NewWorkItem) -> Result<WorkItem> {
        let now = Utc::now();

        let item = WorkItemActiveModel {
            id: Set(Uuid::new_v4()),
            source_video_id: Set(new.source_video_id),
            source_video_url: Set(new.source_video_url),
            source_channel_id: Set(new.source_channel_id),
            status: Set(WorkItemStatus::Discovered.as_str().to_string()),
            title: Set(new.title),
            description: Set(new.description),
            tags: Set(serde_json::json!(new.tags)),
            discovered_at: Set(now),
            retained_at: Set(None),
            rejected_at: Set(None),
            assigned_at: Set(None),
            in_progress_at: Set(None),
            completed_at: Set(None),
            validated_at: Set(None),
            published_at: Set(None),
            assigned_to: Set(None),
            assigned_by: Set(None),
            target_channel_id: Set(None),
            deadline: Set(None),
            notes: Set(None),
            admin_feedback: Set(None),
            external_file_id: Set(None),
            external_file_url: Set(None),
            external_folder_id: Set(None),
            uploaded_at: Set(None),
            file_name: Set(None),
            file_size: Set(None),
            mime_type: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        item.insert(self.write_conn()).await.map_err(Into::into)
    }

    pub async fn find_work_item_by_id(&self, id: Uuid) -> Result<Option<WorkItem>> {
        WorkItemEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Source video ids of a channel that are held by a claimed work item
    pub async fn claimed_source_video_ids(&self, source_channel_id: Uuid) -> Result<HashSet<String>> {
        let claimed: Vec<&str> = WorkItemStatus::CLAIMED.iter().map(|s| s.as_str()).collect();

        let items = WorkItemEntity::find()
            .filter(WorkItemColumn::SourceChannelId.eq(source_channel_id))
            .filter(WorkItemColumn::Status.is_in(claimed))
            .all(self.read_conn())
            .await?;

        Ok(items.into_iter().map(|item| item.source_video_id).collect())
    }

    /// Query work items, most recently discovered first
    pub async fn list_work_items(&self, filter: &WorkItemFilter) -> Result<Vec<WorkItem>> {
        let mut query = WorkItemEntity::find();

        if let Some(status) = filter.status {
            query = query.filter(WorkItemColumn::Status.eq(status.as_str()));
        }
        if let Some(assignee) = filter.assigned_to {
            query = query.filter(WorkItemColumn::AssignedTo.eq(assignee));
        }
        if let Some(source) = filter.source_channel_id {
            query = query.filter(WorkItemColumn::SourceChannelId.eq(source));
        }
        if let Some(target) = filter.target_channel_id {
            query = query.filter(WorkItemColumn::TargetChannelId.eq(target));
        }
        if let Some(from) = filter.discovered_from {
            query = query.filter(WorkItemColumn::DiscoveredAt.gte(from));
        }
        if let Some(to) = filter.discovered_to {
            query = query.filter(WorkItemColumn::DiscoveredAt.lte(to));
        }

        query = query.order_by_desc(WorkItemColumn::DiscoveredAt);
        if let Some(offset) = filter.offset {
            query = query.offset(offset);
        }
        if let Some(limit) = filter.limit {
            query = query.limit(limit);
        }

        query.all(self.read_conn()).await.map_err(Into::into)
    }

    /// Items whose deadline falls inside the range, soonest first
    pub async fn work_items_with_deadline_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        assigned_to: Option<Uuid>,
    ) -> Result<Vec<WorkItem>> {
        let mut query = WorkItemEntity::find()
            .filter(WorkItemColumn::Deadline.gte(from))
            .filter(WorkItemColumn::Deadline.lte(to));
        if let Some(assignee) = assigned_to {
            query = query.filter(WorkItemColumn::AssignedTo.eq(assignee));
        }
        query
            .order_by_asc(WorkItemColumn::Deadline)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Open assignments (ASSIGNED / IN_PROGRESS) due inside the range
    pub async fn open_assignments_due_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<WorkItem>> {
        WorkItemEntity::find()
            .filter(WorkItemColumn::Status.is_in([
                WorkItemStatus::Assigned.as_str(),
                WorkItemStatus::InProgress.as_str(),
            ]))
            .filter(WorkItemColumn::Deadline.gt(from))
            .filter(WorkItemColumn::Deadline.lte(to))
            .filter(WorkItemColumn::AssignedTo.is_not_null())
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Apply changes only if the item is still in the expected status
    ///
    /// Returns `None` when no row matched, i.e. the item is missing or another
    /// writer moved it first.
    pub async fn transition_work_item(
        &self,
        id: Uuid,
        expected: WorkItemStatus,
        mut changes: WorkItemActiveModel,
    ) -> Result<Option<WorkItem>> {
        changes.updated_at = Set(Utc::now());

        let result = WorkItemEntity::update_many()
            .set(changes)
            .filter(WorkItemColumn::Id.eq(id))
            .filter(WorkItemColumn::Status.eq(expected.as_str()))
            .exec(self.write_conn())
            .await?;

        if result.rows_affected == 0 {
            return Ok(None);
        }

        WorkItemEntity::find_by_id(id)
            .one(self.write_conn())
            .await
            .map_err(Into::into)
    }

    /// Persist changed work item fields without a status guard
    pub async fn update_work_item(&self, mut item: WorkItemActiveModel) -> Result<WorkItem> {
        item.updated_at = Set(Utc::now());
        item.update(self.write_conn()).await.map_err(Into::into)
    }

    /// Delete the item's comments, then the item
    pub async fn delete_work_item(&self, id: Uuid) -> Result<bool> {
        let txn = self.write_conn().begin().await?;

        CommentEntity::delete_many()
            .filter(CommentColumn::WorkItemId.eq(id))
            .exec(&txn)
            .await?;
        let result = WorkItemEntity::delete_by_id(id).exec(&txn).await?;

        txn.commit().await?;
        Ok(result.rows_affected > 0)
    }

    pub async fn count_work_items(&self) -> Result<u64> {
        WorkItemEntity::find()
            .count(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Item count for every status, zero included
    pub async fn count_work_items_by_status(&self) -> Result<HashMap<WorkItemStatus, u64>> {
        let mut counts = HashMap::with_capacity(WorkItemStatus::ALL.len());
        for status in WorkItemStatus::ALL {
            let count = WorkItemEntity::find()
                .filter(WorkItemColumn::Status.eq(status.as_str()))
                .count(self.read_conn())
                .await?;
            counts.insert(status, count);
        }
        Ok(counts)
    }

    // ========================================================================
    // Comment Operations
    // ========================================================================

    pub async fn create_comment(&self, work_item_id: Uuid, author_id: Uuid, body: String) -> Result<Comment> {
        let comment = CommentActiveModel {
            id: Set(Uuid::new_v4()),
            work_item_id: Set(work_item_id),
            author_id: Set(author_id),
            body: Set(body),
            created_at: Set(Utc::now()),
        };

        comment.insert(self.write_conn()).await.map_err(Into::into)
    }

    pub async fn find_comment_by_id(&self, id: Uuid) -> Result<Option<Comment>> {
        CommentEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Comments of an item, oldest first
    pub async fn list_comments(&self, work_item_id: Uuid) -> Result<Vec<Comment>> {
        CommentEntity::find()
            .filter(CommentColumn::WorkItemId.eq(work_item_id))
            .order_by_asc(CommentColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    pub async fn delete_comment(&self, id: Uuid) -> Result<bool> {
        let result = CommentEntity::delete_by_id(id).exec(self.write_conn()).await?;
        Ok(result.rows_affected > 0)
    }

    // ========================================================================
    // Notification Operations
    // ========================================================================

    /// Persist a notification delivered on the platform channel
    pub async fn create_notification(
        &self,
        recipient_id: Uuid,
        kind: NotificationKind,
        message: String,
        work_item_id: Option<Uuid>,
    ) -> Result<Notification> {
        let now = Utc::now();

        let notification = NotificationActiveModel {
            id: Set(Uuid::new_v4()),
            recipient_id: Set(recipient_id),
            kind: Set(kind.as_str().to_string()),
            message: Set(message),
            work_item_id: Set(work_item_id),
            sent_via_platform: Set(true),
            platform_sent_at: Set(Some(now)),
            sent_via_email: Set(false),
            email_sent_at: Set(None),
            sent_via_whatsapp: Set(false),
            whatsapp_sent_at: Set(None),
            read: Set(false),
            read_at: Set(None),
            created_at: Set(now),
        };

        notification.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Record delivery flags after the external channels ran
    pub async fn update_notification(&self, notification: NotificationActiveModel) -> Result<Notification> {
        notification.update(self.write_conn()).await.map_err(Into::into)
    }

    /// Recipient's notifications, newest first
    pub async fn list_notifications(
        &self,
        recipient_id: Uuid,
        unread_only: bool,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<Notification>> {
        let mut query = NotificationEntity::find()
            .filter(NotificationColumn::RecipientId.eq(recipient_id));
        if unread_only {
            query = query.filter(NotificationColumn::Read.eq(false));
        }
        query
            .order_by_desc(NotificationColumn::CreatedAt)
            .offset(offset)
            .limit(limit)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    pub async fn count_unread_notifications(&self, recipient_id: Uuid) -> Result<u64> {
        NotificationEntity::find()
            .filter(NotificationColumn::RecipientId.eq(recipient_id))
            .filter(NotificationColumn::Read.eq(false))
            .count(self.read_conn())
            .await
            .map_err(Into::into)
    }

    pub async fn find_notification_by_id(&self, id: Uuid) -> Result<Option<Notification>> {
        NotificationEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Mark every unread notification of the recipient as read
    pub async fn mark_all_notifications_read(&self, recipient_id: Uuid) -> Result<u64> {
        let changes = NotificationActiveModel {
            read: Set(true),
            read_at: Set(Some(Utc::now())),
            ..Default::default()
        };

        let result = NotificationEntity::update_many()
            .set(changes)
            .filter(NotificationColumn::RecipientId.eq(recipient_id))
            .filter(NotificationColumn::Read.eq(false))
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected)
    }

    /// Purge read notifications read before the threshold
    pub async fn delete_read_notifications_before(&self, threshold: DateTime<Utc>) -> Result<u64> {
        let result = NotificationEntity::delete_many()
            .filter(NotificationColumn::Read.eq(true))
            .filter(NotificationColumn::ReadAt.lt(threshold))
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected)
    }

    // ========================================================================
    // Notification Settings Operations
    // ========================================================================

    pub async fn find_notification_settings(&self) -> Result<Option<NotificationSettings>> {
        NotificationSettingsEntity::find_by_id(SETTINGS_ID)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Create or overwrite the settings row; platform delivery stays on
    pub async fn save_notification_settings(
        &self,
        email_enabled: bool,
        whatsapp_enabled: bool,
    ) -> Result<NotificationSettings> {
        let existing = NotificationSettingsEntity::find_by_id(SETTINGS_ID)
            .one(self.write_conn())
            .await?;

        let settings = NotificationSettingsActiveModel {
            id: Set(SETTINGS_ID),
            platform_enabled: Set(true),
            email_enabled: Set(email_enabled),
            whatsapp_enabled: Set(whatsapp_enabled),
            updated_at: Set(Utc::now()),
        };

        let saved = match existing {
            Some(_) => settings.update(self.write_conn()).await?,
            None => settings.insert(self.write_conn()).await?,
        };
        Ok(saved)
    }

    // ========================================================================
    // Storage Credential Operations
    // ========================================================================

    pub async fn find_storage_credential(&self) -> Result<Option<StorageCredential>> {
        StorageCredentialEntity::find_by_id(CREDENTIAL_ID)
            .one(self.write_conn())
            .await
            .map_err(Into::into)
    }

    /// Insert the credential row, or update it when it already exists
    pub async fn save_storage_credential(
        &self,
        mut credential: StorageCredentialActiveModel,
    ) -> Result<StorageCredential> {
        let now = Utc::now();
        credential.id = Set(CREDENTIAL_ID);
        credential.updated_at = Set(now);

        let existing = StorageCredentialEntity::find_by_id(CREDENTIAL_ID)
            .one(self.write_conn())
            .await?;

        let saved = match existing {
            Some(_) => credential.update(self.write_conn()).await?,
            None => {
                credential.created_at = Set(now);
                credential.insert(self.write_conn()).await?
            }
        };
        Ok(saved)
    }

    pub async fn delete_storage_credential(&self) -> Result<bool> {
        let result = StorageCredentialEntity::delete_by_id(CREDENTIAL_ID)
            .exec(self.write_conn())
            .await?;
        Ok(result.rows_affected > 0)
    }

    // ========================================================================
    // Activity Log Operations
    // ========================================================================

    pub async fn record_activity(&self, new: NewActivity) -> Result<ActivityLog> {
        let entry = ActivityLogActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(new.user_id),
            action: Set(new.action),
            resource_type: Set(new.resource_type),
            resource_id: Set(new.resource_id),
            details: Set(new.details),
            ip_address: Set(new.ip_address),
            created_at: Set(Utc::now()),
        };

        entry.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Newest entries first
    pub async fn list_activity_logs(&self, filter: &ActivityFilter) -> Result<Vec<ActivityLog>> {
        let mut query = ActivityLogEntity::find();
        if let Some(user_id) = filter.user_id {
            query = query.filter(ActivityLogColumn::UserId.eq(user_id));
        }
        if let Some(resource_type) = filter.resource_type.as_deref() {
            query = query.filter(ActivityLogColumn::ResourceType.eq(resource_type));
        }
        query
            .order_by_desc(ActivityLogColumn::CreatedAt)
            .offset(filter.offset.unwrap_or(0))
            .limit(filter.limit.unwrap_or(DEFAULT_ACTIVITY_LIMIT))
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn repo() -> Repository {
        Repository::new(DbPool::in_memory().await.unwrap())
    }

    fn new_channel(external: &str, role: ChannelRole) -> NewChannel {
        NewChannel {
            external_channel_id: external.to_string(),
            role,
            display_name: format!("Channel {}", external),
            profile_image_url: None,
            content_type: ContentType::VfSansEdit,
            subscriber_count: 100,
        }
    }

    fn new_item(channel_id: Uuid, video: &str) -> NewWorkItem {
        NewWorkItem {
            source_video_id: video.to_string(),
            source_video_url: format!("https://youtube.com/shorts/{}", video),
            source_channel_id: channel_id,
            title: Some("clip".to_string()),
            description: None,
            tags: vec!["funny".to_string()],
        }
    }

    #[tokio::test]
    async fn test_rejected_items_are_not_claimed() {
        let repo = repo().await;
        let channel = repo.create_channel(new_channel("UC1", ChannelRole::Source)).await.unwrap();

        repo.create_work_item(new_item(channel.id, "keep")).await.unwrap();
        let dropped = repo.create_work_item(new_item(channel.id, "drop")).await.unwrap();
        let changes = WorkItemActiveModel {
            status: Set(WorkItemStatus::Rejected.as_str().to_string()),
            ..Default::default()
        };
        repo.transition_work_item(dropped.id, WorkItemStatus::Discovered, changes)
            .await
            .unwrap()
            .unwrap();

        let claimed = repo.claimed_source_video_ids(channel.id).await.unwrap();
        assert!(claimed.contains("keep"));
        assert!(!claimed.contains("drop"));
    }

    #[tokio::test]
    async fn test_conditional_transition_misses_on_stale_status() {
        let repo = repo().await;
        let channel = repo.create_channel(new_channel("UC1", ChannelRole::Source)).await.unwrap();
        let item = repo.create_work_item(new_item(channel.id, "v1")).await.unwrap();

        let changes = WorkItemActiveModel {
            status: Set(WorkItemStatus::Published.as_str().to_string()),
            ..Default::default()
        };
        let outcome = repo
            .transition_work_item(item.id, WorkItemStatus::Validated, changes)
            .await
            .unwrap();
        assert!(outcome.is_none());

        let unchanged = repo.find_work_item_by_id(item.id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, "DISCOVERED");
        assert_eq!(unchanged.tag_list(), vec!["funny".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_work_item_removes_comments() {
        let repo = repo().await;
        let channel = repo.create_channel(new_channel("UC1", ChannelRole::Source)).await.unwrap();
        let item = repo.create_work_item(new_item(channel.id, "v1")).await.unwrap();
        let comment = repo
            .create_comment(item.id, Uuid::new_v4(), "nice".to_string())
            .await
            .unwrap();

        assert!(repo.delete_work_item(item.id).await.unwrap());
        assert!(repo.find_comment_by_id(comment.id).await.unwrap().is_none());
        assert!(!repo.delete_work_item(item.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_notification_settings_singleton() {
        let repo = repo().await;
        assert!(repo.find_notification_settings().await.unwrap().is_none());

        repo.save_notification_settings(true, false).await.unwrap();
        let saved = repo.save_notification_settings(false, true).await.unwrap();

        assert_eq!(saved.id, SETTINGS_ID);
        assert!(!saved.email_enabled);
        assert!(saved.whatsapp_enabled);
    }

    #[tokio::test]
    async fn test_first_snapshot_at_or_before() {
        let repo = repo().await;
        let channel = repo.create_channel(new_channel("UC9", ChannelRole::Destination)).await.unwrap();
        let now = Utc::now();

        repo.append_subscriber_snapshot(channel.id, 50, now - chrono::Duration::days(40)).await.unwrap();
        repo.append_subscriber_snapshot(channel.id, 80, now - chrono::Duration::days(35)).await.unwrap();
        repo.append_subscriber_snapshot(channel.id, 120, now).await.unwrap();

        let first = repo
            .first_snapshot_at_or_before(channel.id, now - chrono::Duration::days(30))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.subscriber_count, 50);
        assert_eq!(repo.subscriber_history(channel.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_activity_log_filters_newest_first() {
        let repo = repo().await;
        let admin = Uuid::new_v4();
        let entry = |action: &str, resource_type: &str, user_id: Uuid| NewActivity {
            user_id,
            action: action.to_string(),
            resource_type: resource_type.to_string(),
            resource_id: Uuid::new_v4(),
            details: None,
            ip_address: None,
        };

        repo.record_activity(entry("USER_CREATED", "User", admin)).await.unwrap();
        repo.record_activity(entry("CHANNEL_DELETED", "Channel", Uuid::new_v4())).await.unwrap();
        repo.record_activity(entry("USER_BLOCKED", "User", admin)).await.unwrap();

        let users = repo
            .list_activity_logs(&ActivityFilter {
                resource_type: Some("User".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        let actions: Vec<&str> = users.iter().map(|l| l.action.as_str()).collect();
        assert_eq!(actions, ["USER_BLOCKED", "USER_CREATED"]);

        let page = repo
            .list_activity_logs(&ActivityFilter {
                user_id: Some(admin),
                limit: Some(1),
                offset: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].action, "USER_CREATED");
    }
}
