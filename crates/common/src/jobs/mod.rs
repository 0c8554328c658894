//! Periodic job bodies
//!
//! The scheduler binary fires these on cron triggers; each returns a summary
//! so it can also be run by hand and asserted on in tests.

use crate::channels::ChannelRegistry;
use crate::config::JobsConfig;
use crate::db::models::{ChannelRole, NotificationKind};
use crate::db::Repository;
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::notifications::NotificationDispatcher;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    DeadlineReminder,
    SubscriberSync,
    NotificationCleanup,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [
        JobKind::DeadlineReminder,
        JobKind::SubscriberSync,
        JobKind::NotificationCleanup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::DeadlineReminder => "deadline-reminder",
            JobKind::SubscriberSync => "subscriber-sync",
            JobKind::NotificationCleanup => "notification-cleanup",
        }
    }

    /// Cron expression (with seconds) configured for the job
    pub fn schedule<'a>(&self, config: &'a JobsConfig) -> &'a str {
        match self {
            JobKind::DeadlineReminder => &config.deadline_reminder_cron,
            JobKind::SubscriberSync => &config.subscriber_sync_cron,
            JobKind::NotificationCleanup => &config.notification_cleanup_cron,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = AppError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        JobKind::ALL
            .into_iter()
            .find(|job| job.as_str() == s)
            .ok_or_else(|| AppError::validation(format!("unknown job: {}", s)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    /// Rows the job looked at
    pub examined: usize,
    /// Rows it acted on successfully
    pub processed: usize,
    pub failed: usize,
}

/// Hours left before the deadline, rounded up
pub fn hours_remaining(deadline: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let secs = (deadline - now).num_seconds();
    (secs + 3599).div_euclid(3600)
}

pub struct JobRunner {
    repo: Repository,
    notifier: Arc<NotificationDispatcher>,
    channels: Arc<ChannelRegistry>,
    config: JobsConfig,
}

impl JobRunner {
    pub fn new(
        repo: Repository,
        notifier: Arc<NotificationDispatcher>,
        channels: Arc<ChannelRegistry>,
        config: JobsConfig,
    ) -> Self {
        Self {
            repo,
            notifier,
            channels,
            config,
        }
    }

    pub async fn run(&self, job: JobKind) -> Result<JobSummary> {
        info!(job = %job, "Job started");
        let now = Utc::now();
        let result = match job {
            JobKind::DeadlineReminder => self.deadline_reminder(now).await,
            JobKind::SubscriberSync => self.subscriber_sync().await,
            JobKind::NotificationCleanup => self.notification_cleanup(now).await,
        };

        metrics::record_job(job.as_str(), result.is_ok());
        match &result {
            Ok(summary) => info!(
                job = %job,
                examined = summary.examined,
                processed = summary.processed,
                failed = summary.failed,
                "Job finished"
            ),
            Err(e) => warn!(job = %job, error = %e, "Job failed"),
        }
        result
    }

    /// Remind assignees of open items due within the reminder window
    pub async fn deadline_reminder(&self, now: DateTime<Utc>) -> Result<JobSummary> {
        let until = now + Duration::hours(self.config.reminder_window_hours);
        let items = self.repo.open_assignments_due_between(now, until).await?;

        let mut summary = JobSummary {
            examined: items.len(),
            ..Default::default()
        };
        for item in &items {
            let (Some(assignee), Some(deadline)) = (item.assigned_to, item.deadline) else {
                continue;
            };
            let hours = hours_remaining(deadline, now);
            let message = format!(
                "Reminder: \"{}\" is due in {} hour{}",
                item.display_title(),
                hours,
                if hours == 1 { "" } else { "s" }
            );
            match self
                .notifier
                .send(assignee, NotificationKind::DeadlineReminder, message, Some(item))
                .await
            {
                Ok(_) => summary.processed += 1,
                Err(e) => {
                    warn!(item_id = %item.id, error = %e, "Deadline reminder failed");
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    /// Refresh every destination channel; one failing channel does not stop the loop
    pub async fn subscriber_sync(&self) -> Result<JobSummary> {
        let channels = self.repo.list_channels(Some(ChannelRole::Destination)).await?;

        let mut summary = JobSummary {
            examined: channels.len(),
            ..Default::default()
        };
        for channel in channels {
            let id = channel.id;
            match self.channels.sync_subscribers(channel).await {
                Ok(_) => summary.processed += 1,
                Err(e) => {
                    warn!(channel_id = %id, error = %e, "Subscriber sync failed for channel");
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    /// Purge read notifications past the retention period
    pub async fn notification_cleanup(&self, now: DateTime<Utc>) -> Result<JobSummary> {
        let threshold = now - Duration::days(self.config.notification_retention_days);
        let deleted = self.repo.delete_read_notifications_before(threshold).await? as usize;
        Ok(JobSummary {
            examined: deleted,
            processed: deleted,
            failed: 0,
        })
    }
}
