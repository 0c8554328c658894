//! Work item state machine rules
//!
//! Pure functions: which edges exist, who may take them, and which
//! timestamp each destination stamps.

use crate::db::models::{WorkItem, WorkItemActiveModel, WorkItemStatus};
use chrono::{DateTime, Utc};
use sea_orm::Set;

use WorkItemStatus::*;

/// Who may move an item into a status through `update_status`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionActor {
    /// Assigned producer, their assistant, or an admin
    Producer,
    Admin,
}

/// Every edge of the state machine
///
/// `produced` tells whether the item was ever completed; only a rejection
/// after completion may go back to production; an early rejection is final.
pub fn is_allowed(from: WorkItemStatus, to: WorkItemStatus, produced: bool) -> bool {
    match (from, to) {
        (Discovered, Retained) | (Discovered, Rejected) => true,
        (Retained, Assigned) => true,
        (Assigned, InProgress) | (Assigned, Completed) => true,
        (InProgress, Completed) => true,
        (Completed, Validated) | (Completed, Rejected) => true,
        (Validated, Published) | (Validated, Rejected) => true,
        (Rejected, InProgress) | (Rejected, Completed) => produced,
        _ => false,
    }
}

/// Edges reachable through a generic status update
///
/// Curation (retain, pre-assignment reject) and assignment have their own
/// operations with extra inputs.
pub fn is_status_update(from: WorkItemStatus, to: WorkItemStatus, produced: bool) -> bool {
    from != Discovered && !matches!(to, Retained | Assigned) && is_allowed(from, to, produced)
}

pub fn required_actor(to: WorkItemStatus) -> TransitionActor {
    match to {
        InProgress | Completed => TransitionActor::Producer,
        _ => TransitionActor::Admin,
    }
}

/// Rejection after production starts must explain itself
pub fn requires_feedback(from: WorkItemStatus, to: WorkItemStatus) -> bool {
    to == Rejected && from != Discovered
}

/// Stamp the status and its timestamp; timestamps already set are kept
pub fn stamp(changes: &mut WorkItemActiveModel, item: &WorkItem, to: WorkItemStatus, now: DateTime<Utc>) {
    changes.status = Set(to.as_str().to_string());

    let (current, field) = match to {
        Discovered => return,
        Retained => (item.retained_at, &mut changes.retained_at),
        Rejected => (item.rejected_at, &mut changes.rejected_at),
        Assigned => (item.assigned_at, &mut changes.assigned_at),
        InProgress => (item.in_progress_at, &mut changes.in_progress_at),
        Completed => (item.completed_at, &mut changes.completed_at),
        Validated => (item.validated_at, &mut changes.validated_at),
        Published => (item.published_at, &mut changes.published_at),
    };
    if current.is_none() {
        *field = Set(Some(now));
    }
}
