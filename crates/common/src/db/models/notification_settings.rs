//! Deployment-wide notification switches, stored as a single row

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Well-known id of the only settings row
pub const SETTINGS_ID: i32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[sea_orm(table_name = "notification_settings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    #[serde(skip)]
    pub id: i32,

    /// Reported for clients; platform delivery is never switched off
    pub platform_enabled: bool,

    pub email_enabled: bool,

    pub whatsapp_enabled: bool,

    pub updated_at: DateTimeUtc,
}

impl Model {
    /// Defaults used until an admin saves settings
    pub fn defaults(now: DateTimeUtc) -> Self {
        Self {
            id: SETTINGS_ID,
            platform_enabled: true,
            email_enabled: true,
            whatsapp_enabled: false,
            updated_at: now,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
