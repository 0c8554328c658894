//! Read model: a work item with its references resolved and derived fields

use crate::db::models::{Channel, Comment, User, WorkItem};
use crate::errors::{AppError, Result};
use crate::loaders::Loaders;
use chrono::{DateTime, Utc};
use serde::Serialize;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Open assignment past its deadline
pub fn is_late(item: &WorkItem, now: DateTime<Utc>) -> bool {
    let open = item
        .work_status()
        .map(|s| s.is_open_assignment())
        .unwrap_or(false);
    open && item.deadline.is_some_and(|deadline| now > deadline)
}

/// Whole days left before the deadline, rounded up; negative once overdue
pub fn days_until_deadline(item: &WorkItem, now: DateTime<Utc>) -> Option<i64> {
    item.deadline.map(|deadline| {
        let secs = (deadline - now).num_seconds() as f64;
        (secs / SECONDS_PER_DAY).ceil() as i64
    })
}

/// Hours from assignment to completion
pub fn time_to_complete(item: &WorkItem) -> Option<f64> {
    match (item.assigned_at, item.completed_at) {
        (Some(assigned), Some(completed)) => Some((completed - assigned).num_seconds() as f64 / 3600.0),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemView {
    #[serde(flatten)]
    pub item: WorkItem,
    pub source_channel: Option<Channel>,
    pub target_channel: Option<Channel>,
    pub assignee: Option<User>,
    pub assigner: Option<User>,
    pub is_late: bool,
    pub days_until_deadline: Option<i64>,
    pub time_to_complete: Option<f64>,
}

impl WorkItemView {
    /// Resolve the references of many items with one batched query per entity type
    pub async fn build_many(items: Vec<WorkItem>, loaders: &Loaders) -> Result<Vec<WorkItemView>> {
        let channel_ids: Vec<_> = items
            .iter()
            .flat_map(|i| std::iter::once(i.source_channel_id).chain(i.target_channel_id))
            .collect();
        let user_ids: Vec<_> = items
            .iter()
            .flat_map(|i| i.assigned_to.into_iter().chain(i.assigned_by))
            .collect();

        let channels = loaders.channels.load_many(&channel_ids).await?;
        let users = loaders.users.load_many(&user_ids).await?;
        let now = Utc::now();

        Ok(items
            .into_iter()
            .map(|item| WorkItemView {
                source_channel: channels.get(&item.source_channel_id).cloned(),
                target_channel: item.target_channel_id.and_then(|id| channels.get(&id).cloned()),
                assignee: item.assigned_to.and_then(|id| users.get(&id).cloned()),
                assigner: item.assigned_by.and_then(|id| users.get(&id).cloned()),
                is_late: is_late(&item, now),
                days_until_deadline: days_until_deadline(&item, now),
                time_to_complete: time_to_complete(&item),
                item,
            })
            .collect())
    }

    pub async fn build(item: WorkItem, loaders: &Loaders) -> Result<WorkItemView> {
        Self::build_many(vec![item], loaders)
            .await?
            .pop()
            .ok_or_else(|| AppError::Internal {
                message: "work item view was not built".to_string(),
            })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    #[serde(flatten)]
    pub comment: Comment,
    pub author: Option<User>,
}

impl CommentView {
    pub async fn build_many(comments: Vec<Comment>, loaders: &Loaders) -> Result<Vec<CommentView>> {
        let author_ids: Vec<_> = comments.iter().map(|c| c.author_id).collect();
        let authors = loaders.users.load_many(&author_ids).await?;
        Ok(comments
            .into_iter()
            .map(|comment| CommentView {
                author: authors.get(&comment.author_id).cloned(),
                comment,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::WorkItemStatus;
    use chrono::Duration;

    fn item(status: WorkItemStatus, deadline: Option<DateTime<Utc>>) -> WorkItem {
        WorkItem {
            deadline,
            ..crate::testing::work_item(status)
        }
    }

    #[test]
    fn test_is_late_only_for_open_assignments() {
        let now = Utc::now();
        let past = Some(now - Duration::hours(1));

        assert!(is_late(&item(WorkItemStatus::Assigned, past), now));
        assert!(is_late(&item(WorkItemStatus::InProgress, past), now));
        assert!(!is_late(&item(WorkItemStatus::Completed, past), now));
        assert!(!is_late(&item(WorkItemStatus::Published, past), now));
        assert!(!is_late(&item(WorkItemStatus::Assigned, Some(now + Duration::hours(1))), now));
        assert!(!is_late(&item(WorkItemStatus::Assigned, None), now));
    }

    #[test]
    fn test_days_until_deadline_rounds_up() {
        let now = Utc::now();
        assert_eq!(
            days_until_deadline(&item(WorkItemStatus::Assigned, Some(now + Duration::hours(25))), now),
            Some(2)
        );
        assert_eq!(
            days_until_deadline(&item(WorkItemStatus::Assigned, Some(now - Duration::hours(30))), now),
            Some(-1)
        );
        assert_eq!(days_until_deadline(&item(WorkItemStatus::Assigned, None), now), None);
    }

    #[test]
    fn test_time_to_complete_in_hours() {
        let mut done = item(WorkItemStatus::Completed, None);
        assert_eq!(time_to_complete(&done), None);

        let assigned = Utc::now() - Duration::hours(6);
        done.assigned_at = Some(assigned);
        done.completed_at = Some(assigned + Duration::minutes(90));
        assert_eq!(time_to_complete(&done), Some(1.5));
    }
}
