//! SeaORM entity models
//!
//! Database entities for ShortHub

mod activity_log;
mod channel;
mod notification;
mod notification_settings;
mod storage_credential;
mod subscriber_snapshot;
mod user;
mod work_item;
mod work_item_comment;

pub use user::{
    Entity as UserEntity,
    Model as User,
    ActiveModel as UserActiveModel,
    Column as UserColumn,
    UserRole,
    UserStatus,
};

pub use channel::{
    Entity as ChannelEntity,
    Model as Channel,
    ActiveModel as ChannelActiveModel,
    Column as ChannelColumn,
    ChannelRole,
    ContentType,
};

pub use subscriber_snapshot::{
    Entity as SubscriberSnapshotEntity,
    Model as SubscriberSnapshot,
    ActiveModel as SubscriberSnapshotActiveModel,
    Column as SubscriberSnapshotColumn,
};

pub use work_item::{
    Entity as WorkItemEntity,
    Model as WorkItem,
    ActiveModel as WorkItemActiveModel,
    Column as WorkItemColumn,
    WorkItemStatus,
};

pub use work_item_comment::{
    Entity as CommentEntity,
    Model as Comment,
    ActiveModel as CommentActiveModel,
    Column as CommentColumn,
};

pub use notification::{
    Entity as NotificationEntity,
    Model as Notification,
    ActiveModel as NotificationActiveModel,
    Column as NotificationColumn,
    NotificationKind,
};

pub use notification_settings::{
    Entity as NotificationSettingsEntity,
    Model as NotificationSettings,
    ActiveModel as NotificationSettingsActiveModel,
    Column as NotificationSettingsColumn,
    SETTINGS_ID,
};

pub use storage_credential::{
    Entity as StorageCredentialEntity,
    Model as StorageCredential,
    ActiveModel as StorageCredentialActiveModel,
    Column as StorageCredentialColumn,
    CREDENTIAL_ID,
};

pub use activity_log::{
    Entity as ActivityLogEntity,
    Model as ActivityLog,
    ActiveModel as ActivityLogActiveModel,
    Column as ActivityLogColumn,
};
