//! Shared fixtures for in-crate tests

use crate::auth::AuthContext;
use crate::db::models::{
    Channel, ChannelRole, ContentType, User, UserActiveModel, UserRole, WorkItem, WorkItemStatus,
};
use chrono::Utc;
use crate::db::{DbPool, NewChannel, NewUser, Repository};
use sea_orm::Set;
use uuid::Uuid;

pub async fn repo() -> Repository {
    Repository::new(DbPool::in_memory().await.unwrap())
}

pub async fn user(repo: &Repository, role: UserRole) -> User {
    repo.create_user(NewUser {
        username: format!("{}-{}", role.as_str().to_lowercase(), &Uuid::new_v4().simple().to_string()[..8]),
        email: None,
        password_hash: "hash".to_string(),
        role,
        phone: None,
    })
    .await
    .unwrap()
}

pub async fn supervised_by(repo: &Repository, producer: &User, assistant: &User) -> User {
    let mut active: UserActiveModel = producer.clone().into();
    active.supervisor_id = Set(Some(assistant.id));
    repo.update_user(active).await.unwrap()
}

pub fn actor(user: &User) -> AuthContext {
    AuthContext {
        user_id: user.id,
        role: user.user_role(),
        username: user.username.clone(),
    }
}

pub async fn channel(repo: &Repository, external_id: &str, role: ChannelRole) -> Channel {
    repo.create_channel(NewChannel {
        external_channel_id: external_id.to_string(),
        role,
        display_name: format!("@{}", external_id),
        profile_image_url: None,
        content_type: ContentType::VfSansEdit,
        subscriber_count: 1000,
    })
    .await
    .unwrap()
}

/// Detached item that was never written to a store
pub fn work_item(status: WorkItemStatus) -> WorkItem {
    let now = Utc::now();
    WorkItem {
        id: Uuid::new_v4(),
        source_video_id: "v".to_string(),
        source_video_url: "https://youtube.com/shorts/v".to_string(),
        source_channel_id: Uuid::new_v4(),
        status: status.as_str().to_string(),
        title: None,
        description: None,
        tags: serde_json::json!([]),
        discovered_at: now,
        retained_at: None,
        rejected_at: None,
        assigned_at: None,
        in_progress_at: None,
        completed_at: None,
        validated_at: None,
        published_at: None,
        assigned_to: None,
        assigned_by: None,
        target_channel_id: None,
        deadline: None,
        notes: None,
        admin_feedback: None,
        external_file_id: None,
        external_file_url: None,
        external_folder_id: None,
        uploaded_at: None,
        file_name: None,
        file_size: None,
        mime_type: None,
        created_at: now,
        updated_at: now,
    }
}
