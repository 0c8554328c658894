//! User (actor) entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::AppError;

/// Actor role
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Admin,
    /// Video editor ("videaste")
    Producer,
    Assistant,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "ADMIN",
            UserRole::Producer => "PRODUCER",
            UserRole::Assistant => "ASSISTANT",
        }
    }
}

impl FromStr for UserRole {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(UserRole::Admin),
            "PRODUCER" | "VIDEASTE" => Ok(UserRole::Producer),
            "ASSISTANT" => Ok(UserRole::Assistant),
            other => Err(AppError::Validation {
                message: format!("unknown role: {}", other),
                field: Some("role".to_string()),
            }),
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Active,
    Blocked,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "ACTIVE",
            UserStatus::Blocked => "BLOCKED",
        }
    }
}

impl FromStr for UserStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(UserStatus::Active),
            "BLOCKED" => Ok(UserStatus::Blocked),
            other => Err(AppError::Validation {
                message: format!("unknown user status: {}", other),
                field: Some("status".to_string()),
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text", unique)]
    pub username: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub email: Option<String>,

    #[serde(skip_serializing)]
    #[sea_orm(column_type = "Text")]
    pub password_hash: String,

    #[sea_orm(column_type = "Text")]
    pub role: String,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub phone: Option<String>,

    pub whatsapp_linked: bool,

    pub email_notifications: bool,

    pub whatsapp_notifications: bool,

    /// Assistant supervising this producer
    pub supervisor_id: Option<Uuid>,

    #[sea_orm(column_type = "Text", nullable)]
    pub profile_image_url: Option<String>,

    pub last_login_at: Option<DateTimeUtc>,

    pub created_at: DateTimeUtc,

    pub updated_at: DateTimeUtc,
}

impl Model {
    /// Role as an enum; unknown values degrade to the least privileged role
    pub fn user_role(&self) -> UserRole {
        self.role.parse().unwrap_or(UserRole::Assistant)
    }

    pub fn user_status(&self) -> UserStatus {
        self.status.parse().unwrap_or(UserStatus::Blocked)
    }

    pub fn is_active(&self) -> bool {
        self.user_status() == UserStatus::Active
    }

    pub fn is_admin(&self) -> bool {
        self.user_role() == UserRole::Admin
    }

    /// Email address usable for notifications
    pub fn notification_email(&self) -> Option<&str> {
        if self.email_notifications {
            self.email.as_deref().filter(|e| !e.is_empty())
        } else {
            None
        }
    }

    /// Phone number usable for WhatsApp notifications
    pub fn notification_phone(&self) -> Option<&str> {
        if self.whatsapp_notifications && self.whatsapp_linked {
            self.phone.as_deref().filter(|p| !p.is_empty())
        } else {
            None
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
