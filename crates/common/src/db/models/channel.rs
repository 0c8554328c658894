//! Channel entity (source and destination YouTube channels)

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::errors::AppError;

/// Whether a channel feeds discovery or receives published work
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelRole {
    Source,
    Destination,
}

impl ChannelRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelRole::Source => "SOURCE",
            ChannelRole::Destination => "DESTINATION",
        }
    }
}

impl FromStr for ChannelRole {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SOURCE" => Ok(ChannelRole::Source),
            "DESTINATION" => Ok(ChannelRole::Destination),
            other => Err(AppError::Validation {
                message: format!("unknown channel role: {}", other),
                field: Some("role".to_string()),
            }),
        }
    }
}

/// Editorial classification of a channel's content
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentType {
    VaSansEdit,
    VaAvecEdit,
    VfSansEdit,
    VfAvecEdit,
    VoSansEdit,
    VoAvecEdit,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::VaSansEdit => "VA_SANS_EDIT",
            ContentType::VaAvecEdit => "VA_AVEC_EDIT",
            ContentType::VfSansEdit => "VF_SANS_EDIT",
            ContentType::VfAvecEdit => "VF_AVEC_EDIT",
            ContentType::VoSansEdit => "VO_SANS_EDIT",
            ContentType::VoAvecEdit => "VO_AVEC_EDIT",
        }
    }
}

impl FromStr for ContentType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "VA_SANS_EDIT" => Ok(ContentType::VaSansEdit),
            "VA_AVEC_EDIT" => Ok(ContentType::VaAvecEdit),
            "VF_SANS_EDIT" => Ok(ContentType::VfSansEdit),
            "VF_AVEC_EDIT" => Ok(ContentType::VfAvecEdit),
            "VO_SANS_EDIT" => Ok(ContentType::VoSansEdit),
            "VO_AVEC_EDIT" => Ok(ContentType::VoAvecEdit),
            other => Err(AppError::Validation {
                message: format!("unknown content type: {}", other),
                field: Some("contentType".to_string()),
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[sea_orm(table_name = "channels")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// YouTube channel id (UC...)
    #[sea_orm(column_type = "Text")]
    pub external_channel_id: String,

    #[sea_orm(column_type = "Text")]
    pub role: String,

    #[sea_orm(column_type = "Text")]
    pub display_name: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub profile_image_url: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub content_type: String,

    pub subscriber_count: i64,

    pub last_synced_at: Option<DateTimeUtc>,

    pub created_at: DateTimeUtc,

    pub updated_at: DateTimeUtc,
}

impl Model {
    pub fn channel_role(&self) -> Option<ChannelRole> {
        self.role.parse().ok()
    }

    pub fn is_source(&self) -> bool {
        self.channel_role() == Some(ChannelRole::Source)
    }

    pub fn is_destination(&self) -> bool {
        self.channel_role() == Some(ChannelRole::Destination)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::subscriber_snapshot::Entity")]
    SubscriberSnapshots,
}

impl Related<super::subscriber_snapshot::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SubscriberSnapshots.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
