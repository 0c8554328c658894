//! Audit trail of administrative actions

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[sea_orm(table_name = "activity_logs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Who acted
    #[sea_orm(indexed)]
    pub user_id: Uuid,

    pub action: String,

    #[sea_orm(indexed)]
    pub resource_type: String,

    pub resource_id: Uuid,

    pub details: Option<Json>,

    pub ip_address: Option<String>,

    #[sea_orm(indexed)]
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
