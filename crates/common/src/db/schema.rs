//! Table creation from entity definitions

use crate::db::models::*;
use crate::errors::Result;
use sea_orm::{ConnectionTrait, DatabaseConnection, EntityTrait, Schema};
use tracing::info;

async fn create_table<E: EntityTrait>(conn: &DatabaseConnection, schema: &Schema, entity: E) -> Result<()> {
    let backend = conn.get_database_backend();
    let mut stmt = schema.create_table_from_entity(entity);
    stmt.if_not_exists();
    conn.execute(backend.build(&stmt)).await?;
    Ok(())
}

/// Create every table that does not exist yet
///
/// Parents are created before the tables holding foreign keys to them.
pub async fn create_tables(conn: &DatabaseConnection) -> Result<()> {
    let schema = Schema::new(conn.get_database_backend());

    create_table(conn, &schema, UserEntity).await?;
    create_table(conn, &schema, ChannelEntity).await?;
    create_table(conn, &schema, SubscriberSnapshotEntity).await?;
    create_table(conn, &schema, WorkItemEntity).await?;
    create_table(conn, &schema, CommentEntity).await?;
    create_table(conn, &schema, NotificationEntity).await?;
    create_table(conn, &schema, NotificationSettingsEntity).await?;
    create_table(conn, &schema, StorageCredentialEntity).await?;
    create_table(conn, &schema, ActivityLogEntity).await?;

    info!("Database schema ensured");
    Ok(())
}
