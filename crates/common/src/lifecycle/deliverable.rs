//! Upload and download of the produced video file

use super::{transitions, LifecycleEngine};
use crate::auth::AuthContext;
use crate::db::models::{NotificationKind, WorkItem, WorkItemActiveModel, WorkItemStatus};
use crate::errors::{AppError, Result};
use crate::events::DomainEvent;
use crate::notifications::run_best_effort;
use crate::storage::{is_allowed_mime_type, DownloadedFile};
use bytes::Bytes;
use chrono::Utc;
use sea_orm::Set;
use tracing::{info, warn};
use uuid::Uuid;

impl LifecycleEngine {
    /// Store the assignee's file and complete the item
    ///
    /// Not atomic: if the item moves between the upload and the status
    /// write, the remote file stays behind and the call fails.
    pub async fn upload_deliverable(
        &self,
        actor: &AuthContext,
        item_id: Uuid,
        file_name: &str,
        mime_type: &str,
        data: Bytes,
    ) -> Result<WorkItem> {
        let item = self.load(item_id).await?;
        if item.assigned_to != Some(actor.user_id) {
            return Err(AppError::forbidden("Only the assigned producer can upload this short"));
        }
        if !is_allowed_mime_type(mime_type) {
            return Err(AppError::UnsupportedMediaType {
                mime_type: mime_type.to_string(),
            });
        }
        if data.is_empty() {
            return Err(AppError::validation("Uploaded file is empty"));
        }

        let from = item.work_status()?;
        if !transitions::is_allowed(from, WorkItemStatus::Completed, item.completed_at.is_some()) {
            return Err(super::invalid_transition(item_id, from, WorkItemStatus::Completed));
        }

        if let Some(previous) = item.external_file_id.as_deref() {
            run_best_effort("delete previous deliverable", self.storage.delete_file(previous)).await;
        }

        let uploaded = self
            .storage
            .upload(&actor.username, item.id, file_name, mime_type, data)
            .await?;

        let changes = WorkItemActiveModel {
            external_file_id: Set(Some(uploaded.file_id.clone())),
            external_file_url: Set(Some(uploaded.file_url)),
            external_folder_id: Set(Some(uploaded.folder_id)),
            uploaded_at: Set(Some(Utc::now())),
            file_name: Set(Some(uploaded.file_name)),
            file_size: Set(Some(uploaded.file_size)),
            mime_type: Set(Some(uploaded.mime_type)),
            ..Default::default()
        };
        let updated = match self.apply(&item, from, WorkItemStatus::Completed, changes).await {
            Ok(updated) => updated,
            Err(e) => {
                warn!(item_id = %item_id, file_id = %uploaded.file_id, "Work item moved during upload, remote file orphaned");
                return Err(e);
            }
        };

        info!(item_id = %item_id, file_id = %uploaded.file_id, "Deliverable uploaded");
        self.bus.publish(DomainEvent::WorkItemCompleted { item: updated.clone() });
        self.notify_admins_of_upload(&updated, &actor.username).await;
        Ok(updated)
    }

    async fn notify_admins_of_upload(&self, item: &WorkItem, producer: &str) {
        let Some(admins) = run_best_effort("list admins", self.repo.list_active_admins()).await else {
            return;
        };
        let message = format!("{} uploaded the short \"{}\"", producer, item.display_title());
        for admin in admins {
            run_best_effort(
                "notify upload",
                self.notifier
                    .send(admin.id, NotificationKind::ShortCompleted, message.clone(), Some(item)),
            )
            .await;
        }
    }

    /// Fetch the stored file for an admin or the assignee
    pub async fn download_deliverable(&self, actor: &AuthContext, item_id: Uuid) -> Result<DownloadedFile> {
        let item = self.load(item_id).await?;
        if !actor.is_admin() && item.assigned_to != Some(actor.user_id) {
            return Err(AppError::forbidden("Only admins and the assigned producer can download this short"));
        }
        let file_id = item
            .external_file_id
            .as_deref()
            .ok_or_else(|| AppError::not_found("Deliverable", item_id))?;

        self.storage.download(file_id).await
    }
}
