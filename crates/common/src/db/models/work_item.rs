//! Work item entity: one discovered short moving through the production pipeline

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::AppError;

/// Workflow position of a work item
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkItemStatus {
    Discovered,
    Retained,
    Rejected,
    Assigned,
    InProgress,
    Completed,
    Validated,
    Published,
}

impl WorkItemStatus {
    pub const ALL: [WorkItemStatus; 8] = [
        WorkItemStatus::Discovered,
        WorkItemStatus::Retained,
        WorkItemStatus::Rejected,
        WorkItemStatus::Assigned,
        WorkItemStatus::InProgress,
        WorkItemStatus::Completed,
        WorkItemStatus::Validated,
        WorkItemStatus::Published,
    ];

    /// Statuses that keep the source video out of discovery
    pub const CLAIMED: [WorkItemStatus; 7] = [
        WorkItemStatus::Discovered,
        WorkItemStatus::Retained,
        WorkItemStatus::Assigned,
        WorkItemStatus::InProgress,
        WorkItemStatus::Completed,
        WorkItemStatus::Validated,
        WorkItemStatus::Published,
    ];

    /// Statuses that count as delivered work
    pub const DELIVERED: [WorkItemStatus; 3] = [
        WorkItemStatus::Completed,
        WorkItemStatus::Validated,
        WorkItemStatus::Published,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkItemStatus::Discovered => "DISCOVERED",
            WorkItemStatus::Retained => "RETAINED",
            WorkItemStatus::Rejected => "REJECTED",
            WorkItemStatus::Assigned => "ASSIGNED",
            WorkItemStatus::InProgress => "IN_PROGRESS",
            WorkItemStatus::Completed => "COMPLETED",
            WorkItemStatus::Validated => "VALIDATED",
            WorkItemStatus::Published => "PUBLISHED",
        }
    }

    pub fn is_claimed(&self) -> bool {
        *self != WorkItemStatus::Rejected
    }

    /// Statuses in which a deadline can be missed
    pub fn is_open_assignment(&self) -> bool {
        matches!(self, WorkItemStatus::Assigned | WorkItemStatus::InProgress)
    }

    pub fn is_delivered(&self) -> bool {
        Self::DELIVERED.contains(self)
    }
}

impl FromStr for WorkItemStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            // ROLLED is the historical name of DISCOVERED
            "DISCOVERED" | "ROLLED" => Ok(WorkItemStatus::Discovered),
            "RETAINED" => Ok(WorkItemStatus::Retained),
            "REJECTED" => Ok(WorkItemStatus::Rejected),
            "ASSIGNED" => Ok(WorkItemStatus::Assigned),
            "IN_PROGRESS" => Ok(WorkItemStatus::InProgress),
            "COMPLETED" => Ok(WorkItemStatus::Completed),
            "VALIDATED" => Ok(WorkItemStatus::Validated),
            "PUBLISHED" => Ok(WorkItemStatus::Published),
            other => Err(AppError::Validation {
                message: format!("unknown work item status: {}", other),
                field: Some("status".to_string()),
            }),
        }
    }
}

impl fmt::Display for WorkItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<WorkItemStatus> for String {
    fn from(status: WorkItemStatus) -> Self {
        status.as_str().to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[sea_orm(table_name = "work_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    // Source reference
    #[sea_orm(column_type = "Text")]
    pub source_video_id: String,

    #[sea_orm(column_type = "Text")]
    pub source_video_url: String,

    pub source_channel_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub title: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    /// JSON array of tags captured at discovery
    pub tags: Json,

    // One timestamp per status actually entered
    pub discovered_at: DateTimeUtc,
    pub retained_at: Option<DateTimeUtc>,
    pub rejected_at: Option<DateTimeUtc>,
    pub assigned_at: Option<DateTimeUtc>,
    pub in_progress_at: Option<DateTimeUtc>,
    pub completed_at: Option<DateTimeUtc>,
    pub validated_at: Option<DateTimeUtc>,
    pub published_at: Option<DateTimeUtc>,

    // Assignment
    pub assigned_to: Option<Uuid>,
    pub assigned_by: Option<Uuid>,
    pub target_channel_id: Option<Uuid>,
    pub deadline: Option<DateTimeUtc>,

    // Feedback
    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub admin_feedback: Option<String>,

    // Storage linkage
    #[sea_orm(column_type = "Text", nullable)]
    pub external_file_id: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub external_file_url: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub external_folder_id: Option<String>,

    pub uploaded_at: Option<DateTimeUtc>,

    #[sea_orm(column_type = "Text", nullable)]
    pub file_name: Option<String>,

    pub file_size: Option<i64>,

    #[sea_orm(column_type = "Text", nullable)]
    pub mime_type: Option<String>,

    pub created_at: DateTimeUtc,

    pub updated_at: DateTimeUtc,
}

impl Model {
    /// Status as an enum
    pub fn work_status(&self) -> Result<WorkItemStatus, AppError> {
        self.status.parse()
    }

    /// Whether the item has ever been handed to a producer
    pub fn was_assigned(&self) -> bool {
        self.assigned_to.is_some() && self.assigned_at.is_some()
    }

    /// Tags as strings; malformed JSON yields no tags
    pub fn tag_list(&self) -> Vec<String> {
        serde_json::from_value(self.tags.clone()).unwrap_or_default()
    }

    /// Display title used in messages
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("Untitled")
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::work_item_comment::Entity")]
    Comments,
}

impl Related<super::work_item_comment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Comments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
