//! OAuth credential for the external storage provider
//!
//! Tokens are stored encrypted; this record never decrypts them itself.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Well-known id of the only credential row
pub const CREDENTIAL_ID: i32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "storage_credentials")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i32,

    #[sea_orm(column_type = "Text")]
    pub encrypted_access_token: String,

    #[sea_orm(column_type = "Text")]
    pub encrypted_refresh_token: String,

    pub token_expires_at: DateTimeUtc,

    #[sea_orm(column_type = "Text")]
    pub scope: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub root_folder_id: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub root_folder_name: Option<String>,

    pub is_connected: bool,

    pub last_sync: Option<DateTimeUtc>,

    pub created_at: DateTimeUtc,

    pub updated_at: DateTimeUtc,
}

impl Model {
    /// Whether the access token must be refreshed before use
    pub fn is_expired(&self, now: DateTimeUtc) -> bool {
        self.token_expires_at <= now
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
