//! Persisted notification record

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::AppError;

/// Event that produced a notification
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    VideoAssigned,
    DeadlineReminder,
    VideoCompleted,
    VideoValidated,
    VideoRejected,
    AccountBlocked,
    AccountUnblocked,
    ShortCompleted,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::VideoAssigned => "VIDEO_ASSIGNED",
            NotificationKind::DeadlineReminder => "DEADLINE_REMINDER",
            NotificationKind::VideoCompleted => "VIDEO_COMPLETED",
            NotificationKind::VideoValidated => "VIDEO_VALIDATED",
            NotificationKind::VideoRejected => "VIDEO_REJECTED",
            NotificationKind::AccountBlocked => "ACCOUNT_BLOCKED",
            NotificationKind::AccountUnblocked => "ACCOUNT_UNBLOCKED",
            NotificationKind::ShortCompleted => "SHORT_COMPLETED",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "VIDEO_ASSIGNED" => Ok(NotificationKind::VideoAssigned),
            "DEADLINE_REMINDER" => Ok(NotificationKind::DeadlineReminder),
            "VIDEO_COMPLETED" => Ok(NotificationKind::VideoCompleted),
            "VIDEO_VALIDATED" => Ok(NotificationKind::VideoValidated),
            "VIDEO_REJECTED" => Ok(NotificationKind::VideoRejected),
            "ACCOUNT_BLOCKED" => Ok(NotificationKind::AccountBlocked),
            "ACCOUNT_UNBLOCKED" => Ok(NotificationKind::AccountUnblocked),
            "SHORT_COMPLETED" => Ok(NotificationKind::ShortCompleted),
            other => Err(AppError::Validation {
                message: format!("unknown notification type: {}", other),
                field: Some("type".to_string()),
            }),
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[sea_orm(table_name = "notifications")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub recipient_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub kind: String,

    #[sea_orm(column_type = "Text")]
    pub message: String,

    /// Work item the notification is about, if any
    pub work_item_id: Option<Uuid>,

    pub sent_via_platform: bool,
    pub platform_sent_at: Option<DateTimeUtc>,

    pub sent_via_email: bool,
    pub email_sent_at: Option<DateTimeUtc>,

    pub sent_via_whatsapp: bool,
    pub whatsapp_sent_at: Option<DateTimeUtc>,

    pub read: bool,
    pub read_at: Option<DateTimeUtc>,

    pub created_at: DateTimeUtc,
}

impl Model {
    pub fn notification_kind(&self) -> Result<NotificationKind, AppError> {
        self.kind.parse()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
