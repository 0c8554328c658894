//! Work item lifecycle engine
//!
//! Every mutation checks the actor's role, then the current status, then
//! writes through a conditional update keyed on the status it read. A
//! concurrent writer that got there first turns the write into an
//! `InvalidStateTransition` instead of a silent overwrite.
//!
//! Notifications are side effects: they run through [`run_best_effort`] and
//! never fail the transition that triggered them.

mod deliverable;
pub mod transitions;
mod view;

pub use view::{days_until_deadline, is_late, time_to_complete, CommentView, WorkItemView};

use crate::auth::AuthContext;
use crate::catalog::{pick_candidate, CandidateVideo, VideoCatalog};
use crate::db::models::{
    Channel, NotificationKind, User, UserRole, WorkItem, WorkItemActiveModel, WorkItemStatus,
};
use crate::db::{NewWorkItem, Repository, WorkItemFilter};
use crate::errors::{AppError, Result};
use crate::events::{DomainEvent, SharedEventBus};
use crate::loaders::Loaders;
use crate::metrics;
use crate::notifications::{run_best_effort, NotificationDispatcher};
use crate::storage::StorageConnector;
use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue::Unchanged, Set};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use transitions::TransitionActor;
use uuid::Uuid;

/// Default batch size of a multi-channel discovery
pub const DEFAULT_DISCOVER_COUNT: usize = 5;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    pub producer_id: Uuid,
    pub target_channel_id: Uuid,
    pub deadline: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignManyRequest {
    pub item_ids: Vec<Uuid>,
    pub producer_id: Uuid,
    pub target_channel_id: Uuid,
    /// One deadline per item, same order
    pub deadlines: Vec<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusStats {
    pub total: u64,
    pub by_status: HashMap<WorkItemStatus, u64>,
}

fn invalid_transition(id: Uuid, from: WorkItemStatus, to: WorkItemStatus) -> AppError {
    AppError::InvalidStateTransition {
        resource_type: "WorkItem".to_string(),
        id: id.to_string(),
        from: from.to_string(),
        to: to.to_string(),
    }
}

fn format_deadline(deadline: DateTime<Utc>) -> String {
    deadline.format("%Y-%m-%d %H:%M UTC").to_string()
}

pub struct LifecycleEngine {
    repo: Repository,
    catalog: Arc<dyn VideoCatalog>,
    notifier: Arc<NotificationDispatcher>,
    storage: Arc<StorageConnector>,
    bus: SharedEventBus,
}

impl LifecycleEngine {
    pub fn new(
        repo: Repository,
        catalog: Arc<dyn VideoCatalog>,
        notifier: Arc<NotificationDispatcher>,
        storage: Arc<StorageConnector>,
        bus: SharedEventBus,
    ) -> Self {
        Self {
            repo,
            catalog,
            notifier,
            storage,
            bus,
        }
    }

    async fn load(&self, id: Uuid) -> Result<WorkItem> {
        self.repo
            .find_work_item_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("WorkItem", id))
    }

    /// Stamp and write `to`, provided the item is still in `from`
    async fn apply(
        &self,
        item: &WorkItem,
        from: WorkItemStatus,
        to: WorkItemStatus,
        mut changes: WorkItemActiveModel,
    ) -> Result<WorkItem> {
        transitions::stamp(&mut changes, item, to, Utc::now());

        let updated = self
            .repo
            .transition_work_item(item.id, from, changes)
            .await?
            .ok_or_else(|| invalid_transition(item.id, from, to))?;

        metrics::record_transition(to.as_str());
        info!(item_id = %item.id, from = %from, to = %to, "Work item transitioned");
        self.bus.publish(DomainEvent::WorkItemStatusChanged {
            item: updated.clone(),
            previous: from,
        });
        Ok(updated)
    }

    // ========================================================================
    // Discovery
    // ========================================================================

    async fn source_channel(&self, id: Uuid) -> Result<Channel> {
        let channel = self
            .repo
            .find_channel_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("Channel", id))?;
        if !channel.is_source() {
            return Err(AppError::validation(format!("Channel {} is not a source channel", id)));
        }
        Ok(channel)
    }

    async fn create_from_candidate(&self, channel: &Channel, candidate: CandidateVideo) -> Result<WorkItem> {
        let item = self
            .repo
            .create_work_item(NewWorkItem {
                source_video_id: candidate.video_id,
                source_video_url: candidate.url,
                source_channel_id: channel.id,
                title: Some(candidate.title),
                description: candidate.description,
                tags: candidate.tags,
            })
            .await?;

        metrics::record_transition(WorkItemStatus::Discovered.as_str());
        info!(item_id = %item.id, channel_id = %channel.id, video = %item.source_video_id, "Work item discovered");
        Ok(item)
    }

    /// Roll one unclaimed short from a source channel
    pub async fn discover(&self, actor: &AuthContext, source_channel_id: Uuid) -> Result<WorkItem> {
        actor.require_admin()?;
        let channel = self.source_channel(source_channel_id).await?;

        let exclude = self.repo.claimed_source_video_ids(channel.id).await?;
        let candidate = self
            .catalog
            .random_candidate(&channel.external_channel_id, &exclude)
            .await?
            .ok_or_else(|| AppError::NoCandidateAvailable {
                message: format!("no unclaimed short left on {}", channel.display_name),
            })?;

        self.create_from_candidate(&channel, candidate).await
    }

    /// Roll `count` shorts spread over several channels; failing channels are skipped
    pub async fn discover_many(
        &self,
        actor: &AuthContext,
        channel_ids: &[Uuid],
        count: usize,
    ) -> Result<Vec<WorkItem>> {
        actor.require_admin()?;
        if channel_ids.is_empty() {
            return Err(AppError::validation("At least one source channel is required"));
        }
        if count == 0 {
            return Err(AppError::validation("count must be at least 1"));
        }

        let per_channel = count.div_ceil(channel_ids.len());
        let mut discovered = Vec::new();
        for &channel_id in channel_ids {
            match self.discover_from_channel(channel_id, per_channel).await {
                Ok(items) => discovered.extend(items),
                Err(e) => warn!(channel_id = %channel_id, error = %e, "Skipping channel during batch discovery"),
            }
        }

        info!(requested = count, discovered = discovered.len(), "Batch discovery finished");
        Ok(discovered)
    }

    async fn discover_from_channel(&self, channel_id: Uuid, count: usize) -> Result<Vec<WorkItem>> {
        let channel = self.source_channel(channel_id).await?;
        let mut exclude = self.repo.claimed_source_video_ids(channel.id).await?;
        let candidates = self
            .catalog
            .list_short_candidates(&channel.external_channel_id)
            .await?;

        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            let Some(candidate) = pick_candidate(candidates.clone(), &exclude) else {
                break;
            };
            exclude.insert(candidate.video_id.clone());
            match self.create_from_candidate(&channel, candidate).await {
                Ok(item) => items.push(item),
                Err(e) => {
                    warn!(channel_id = %channel_id, error = %e, "Failed to store discovered short");
                    break;
                }
            }
        }
        Ok(items)
    }

    // ========================================================================
    // Curation
    // ========================================================================

    async fn curate(&self, actor: &AuthContext, id: Uuid, to: WorkItemStatus) -> Result<WorkItem> {
        actor.require_admin()?;
        let item = self.load(id).await?;
        let from = item.work_status()?;
        if from != WorkItemStatus::Discovered {
            return Err(invalid_transition(id, from, to));
        }
        self.apply(&item, from, to, WorkItemActiveModel::default()).await
    }

    pub async fn retain(&self, actor: &AuthContext, id: Uuid) -> Result<WorkItem> {
        self.curate(actor, id, WorkItemStatus::Retained).await
    }

    /// Pre-assignment rejection; frees the source video for rediscovery
    pub async fn reject(&self, actor: &AuthContext, id: Uuid) -> Result<WorkItem> {
        self.curate(actor, id, WorkItemStatus::Rejected).await
    }

    // ========================================================================
    // Assignment
    // ========================================================================

    async fn assignable_producer(&self, id: Uuid) -> Result<User> {
        let producer = self
            .repo
            .find_user_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("User", id))?;
        if producer.user_role() != UserRole::Producer {
            return Err(AppError::validation(format!("User {} is not a producer", producer.username)));
        }
        if !producer.is_active() {
            return Err(AppError::validation(format!(
                "User {} is blocked and cannot receive assignments",
                producer.username
            )));
        }
        Ok(producer)
    }

    async fn destination_channel(&self, id: Uuid) -> Result<Channel> {
        let channel = self
            .repo
            .find_channel_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("Channel", id))?;
        if !channel.is_destination() {
            return Err(AppError::validation(format!("Channel {} is not a destination channel", id)));
        }
        Ok(channel)
    }

    async fn assign_one(
        &self,
        actor: &AuthContext,
        id: Uuid,
        producer: &User,
        target_channel_id: Uuid,
        deadline: DateTime<Utc>,
        notes: Option<String>,
    ) -> Result<WorkItem> {
        let item = self.load(id).await?;
        let from = item.work_status()?;
        if !transitions::is_allowed(from, WorkItemStatus::Assigned, item.completed_at.is_some()) {
            return Err(invalid_transition(id, from, WorkItemStatus::Assigned));
        }

        let changes = WorkItemActiveModel {
            assigned_to: Set(Some(producer.id)),
            assigned_by: Set(Some(actor.user_id)),
            target_channel_id: Set(Some(target_channel_id)),
            deadline: Set(Some(deadline)),
            notes: Set(notes.filter(|n| !n.trim().is_empty())),
            ..Default::default()
        };
        let updated = self.apply(&item, from, WorkItemStatus::Assigned, changes).await?;
        self.bus.publish(DomainEvent::WorkItemAssigned { item: updated.clone() });
        Ok(updated)
    }

    pub async fn assign(&self, actor: &AuthContext, id: Uuid, request: AssignRequest) -> Result<WorkItem> {
        actor.require_admin()?;
        let producer = self.assignable_producer(request.producer_id).await?;
        self.destination_channel(request.target_channel_id).await?;

        let item = self
            .assign_one(
                actor,
                id,
                &producer,
                request.target_channel_id,
                request.deadline,
                request.notes,
            )
            .await?;

        let message = format!(
            "New short assigned: \"{}\", due {}",
            item.display_title(),
            format_deadline(request.deadline)
        );
        run_best_effort(
            "notify assignment",
            self.notifier
                .send(producer.id, NotificationKind::VideoAssigned, message, Some(&item)),
        )
        .await;
        Ok(item)
    }

    /// Assign several items to one producer; items that fail are left out
    pub async fn assign_multiple(&self, actor: &AuthContext, request: AssignManyRequest) -> Result<Vec<WorkItem>> {
        actor.require_admin()?;
        if request.item_ids.len() != request.deadlines.len() {
            return Err(AppError::Validation {
                message: "itemIds and deadlines must have the same length".to_string(),
                field: Some("deadlines".to_string()),
            });
        }
        let producer = self.assignable_producer(request.producer_id).await?;
        self.destination_channel(request.target_channel_id).await?;

        let mut assigned = Vec::with_capacity(request.item_ids.len());
        for (id, deadline) in request.item_ids.iter().zip(request.deadlines) {
            match self
                .assign_one(actor, *id, &producer, request.target_channel_id, deadline, None)
                .await
            {
                Ok(item) => assigned.push(item),
                Err(e) => warn!(item_id = %id, error = %e, "Skipping item during batch assignment"),
            }
        }

        if !assigned.is_empty() {
            let message = format!("{} new shorts have been assigned to you", assigned.len());
            run_best_effort(
                "notify batch assignment",
                self.notifier
                    .send(producer.id, NotificationKind::VideoAssigned, message, None),
            )
            .await;
        }
        Ok(assigned)
    }

    /// Hand an already assigned item to another producer, keeping its status
    ///
    /// Items that never reached ASSIGNED have no production to hand over.
    pub async fn reassign(&self, actor: &AuthContext, id: Uuid, producer_id: Uuid) -> Result<WorkItem> {
        actor.require_admin()?;
        let item = self.load(id).await?;
        let from = item.work_status()?;
        if item.assigned_to.is_none() || item.assigned_at.is_none() {
            return Err(invalid_transition(id, from, WorkItemStatus::Assigned));
        }
        let producer = self.assignable_producer(producer_id).await?;

        let changes = WorkItemActiveModel {
            id: Unchanged(item.id),
            assigned_to: Set(Some(producer.id)),
            assigned_by: Set(Some(actor.user_id)),
            ..Default::default()
        };
        let updated = self.repo.update_work_item(changes).await?;

        info!(item_id = %id, previous = ?item.assigned_to, producer = %producer.id, "Work item reassigned");
        self.bus.publish(DomainEvent::WorkItemAssigned { item: updated.clone() });

        let message = match updated.deadline {
            Some(deadline) => format!(
                "Short reassigned to you: \"{}\", due {}",
                updated.display_title(),
                format_deadline(deadline)
            ),
            None => format!("Short reassigned to you: \"{}\"", updated.display_title()),
        };
        run_best_effort(
            "notify reassignment",
            self.notifier
                .send(producer.id, NotificationKind::VideoAssigned, message, Some(&updated)),
        )
        .await;
        Ok(updated)
    }

    // ========================================================================
    // Production and review
    // ========================================================================

    /// Producer-side moves belong to the assignee, their assistant or an admin
    async fn authorize_transition(&self, actor: &AuthContext, item: &WorkItem, to: WorkItemStatus) -> Result<()> {
        if actor.is_admin() {
            return Ok(());
        }
        match transitions::required_actor(to) {
            TransitionActor::Admin => Err(AppError::forbidden(format!(
                "Only admins can move a work item to {}",
                to
            ))),
            TransitionActor::Producer => {
                let Some(assignee) = item.assigned_to else {
                    return Err(AppError::forbidden("Work item is not assigned"));
                };
                if assignee == actor.user_id {
                    return Ok(());
                }
                if actor.role == UserRole::Assistant {
                    let supervised = self
                        .repo
                        .find_user_by_id(assignee)
                        .await?
                        .is_some_and(|producer| producer.supervisor_id == Some(actor.user_id));
                    if supervised {
                        return Ok(());
                    }
                }
                Err(AppError::forbidden("Only the assigned producer can update this work item"))
            }
        }
    }

    pub async fn update_status(
        &self,
        actor: &AuthContext,
        id: Uuid,
        to: WorkItemStatus,
        feedback: Option<String>,
    ) -> Result<WorkItem> {
        let item = self.load(id).await?;
        self.authorize_transition(actor, &item, to).await?;

        let from = item.work_status()?;
        if !transitions::is_status_update(from, to, item.completed_at.is_some()) {
            return Err(invalid_transition(id, from, to));
        }

        let feedback = feedback
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty());
        if transitions::requires_feedback(from, to) && feedback.is_none() {
            return Err(AppError::Validation {
                message: "A rejection needs a feedback reason".to_string(),
                field: Some("feedback".to_string()),
            });
        }

        let mut changes = WorkItemActiveModel::default();
        if matches!(to, WorkItemStatus::Validated | WorkItemStatus::Rejected) && feedback.is_some() {
            changes.admin_feedback = Set(feedback.clone());
        }
        let updated = self.apply(&item, from, to, changes).await?;

        if to == WorkItemStatus::Completed {
            self.bus.publish(DomainEvent::WorkItemCompleted { item: updated.clone() });
        }
        self.notify_status(&updated, to, feedback.as_deref()).await;
        Ok(updated)
    }

    async fn notify_status(&self, item: &WorkItem, to: WorkItemStatus, feedback: Option<&str>) {
        let title = item.display_title();
        let (recipient, kind, message) = match to {
            WorkItemStatus::Completed => (
                item.assigned_by,
                NotificationKind::VideoCompleted,
                format!("\"{}\" has been marked as completed", title),
            ),
            WorkItemStatus::Validated => (
                item.assigned_to,
                NotificationKind::VideoValidated,
                match feedback {
                    Some(note) => format!("Your short \"{}\" has been validated: {}", title, note),
                    None => format!("Your short \"{}\" has been validated", title),
                },
            ),
            WorkItemStatus::Rejected => (
                item.assigned_to,
                NotificationKind::VideoRejected,
                format!(
                    "Your short \"{}\" has been rejected: {}",
                    title,
                    feedback.unwrap_or("no reason given")
                ),
            ),
            _ => return,
        };

        let Some(recipient) = recipient else {
            return;
        };
        run_best_effort(
            "notify status change",
            self.notifier.send(recipient, kind, message, Some(item)),
        )
        .await;
    }

    /// Per-item guarded transitions; ids that fail are omitted
    pub async fn update_multiple_status(
        &self,
        actor: &AuthContext,
        ids: &[Uuid],
        to: WorkItemStatus,
        feedback: Option<String>,
    ) -> Result<Vec<WorkItem>> {
        let mut updated = Vec::with_capacity(ids.len());
        for &id in ids {
            match self.update_status(actor, id, to, feedback.clone()).await {
                Ok(item) => updated.push(item),
                Err(e) => warn!(item_id = %id, to = %to, error = %e, "Skipping item during batch status update"),
            }
        }
        Ok(updated)
    }

    /// Remove an item and its comments
    pub async fn delete(&self, actor: &AuthContext, id: Uuid) -> Result<()> {
        actor.require_admin()?;
        if !self.repo.delete_work_item(id).await? {
            return Err(AppError::not_found("WorkItem", id));
        }
        info!(item_id = %id, "Work item deleted");
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn query(&self, filter: &WorkItemFilter) -> Result<Vec<WorkItemView>> {
        let items = self.repo.list_work_items(filter).await?;
        WorkItemView::build_many(items, &Loaders::new(&self.repo)).await
    }

    pub async fn get(&self, id: Uuid) -> Result<WorkItemView> {
        let item = self.load(id).await?;
        WorkItemView::build(item, &Loaders::new(&self.repo)).await
    }

    pub async fn stats(&self) -> Result<StatusStats> {
        let by_status = self.repo.count_work_items_by_status().await?;
        Ok(StatusStats {
            total: by_status.values().sum(),
            by_status,
        })
    }

    /// Items due inside a date range, soonest first
    pub async fn calendar(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        assigned_to: Option<Uuid>,
    ) -> Result<Vec<WorkItemView>> {
        if from > to {
            return Err(AppError::validation("Calendar range start is after its end"));
        }
        let items = self
            .repo
            .work_items_with_deadline_between(from, to, assigned_to)
            .await?;
        WorkItemView::build_many(items, &Loaders::new(&self.repo)).await
    }

    // ========================================================================
    // Comments
    // ========================================================================

    pub async fn add_comment(&self, actor: &AuthContext, item_id: Uuid, body: &str) -> Result<CommentView> {
        let body = body.trim();
        if body.is_empty() {
            return Err(AppError::validation("Comment cannot be empty"));
        }
        self.load(item_id).await?;

        let comment = self
            .repo
            .create_comment(item_id, actor.user_id, body.to_string())
            .await?;
        let mut views = CommentView::build_many(vec![comment], &Loaders::new(&self.repo)).await?;
        views.pop().ok_or_else(|| AppError::Internal {
            message: "comment view was not built".to_string(),
        })
    }

    /// Oldest first
    pub async fn list_comments(&self, item_id: Uuid) -> Result<Vec<CommentView>> {
        self.load(item_id).await?;
        let comments = self.repo.list_comments(item_id).await?;
        CommentView::build_many(comments, &Loaders::new(&self.repo)).await
    }

    /// Authors delete their own comments; admins delete any
    pub async fn delete_comment(&self, actor: &AuthContext, comment_id: Uuid) -> Result<()> {
        let comment = self
            .repo
            .find_comment_by_id(comment_id)
            .await?
            .ok_or_else(|| AppError::not_found("Comment", comment_id))?;
        if comment.author_id != actor.user_id && !actor.is_admin() {
            return Err(AppError::forbidden("Only the author or an admin can delete a comment"));
        }
        self.repo.delete_comment(comment_id).await?;
        Ok(())
    }
}
