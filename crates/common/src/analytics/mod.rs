//! Reporting over accumulated lifecycle state
//!
//! Every report loads the rows it needs once and aggregates in memory; the
//! aggregation functions take `now` explicitly so windows are testable.

use crate::db::models::{Channel, ChannelRole, User, UserRole, WorkItem, WorkItemStatus};
use crate::db::{Repository, WorkItemFilter};
use crate::errors::{AppError, Result};
use crate::lifecycle::{is_late, time_to_complete};
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

const GROWTH_WINDOW_DAYS: i64 = 30;
const TOP_PRODUCERS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerPerformance {
    pub user: User,
    pub completed: u64,
    pub completion_rate: f64,
    pub average_hours: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelGrowth {
    pub channel: Channel,
    pub subscriber_count: i64,
    pub growth_30_days: i64,
    pub growth_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub total_channels: u64,
    pub total_source_channels: u64,
    pub total_destination_channels: u64,
    pub total_items: u64,
    pub total_users: u64,
    pub by_status: HashMap<WorkItemStatus, u64>,
    pub late: u64,
    pub completed_last_7_days: Vec<DailyCount>,
    pub completed_last_30_days: Vec<DailyCount>,
    pub average_completion_hours: f64,
    pub completion_rate: f64,
    pub top_producers: Vec<ProducerPerformance>,
    pub total_subscribers: i64,
    pub subscriber_growth_30_days: i64,
    pub channels_growth: Vec<ChannelGrowth>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub assigned: u64,
    pub completed: u64,
    pub in_progress: u64,
    pub completion_rate: f64,
    pub average_completion_hours: Option<f64>,
    pub completed_this_month: u64,
    pub late: u64,
    pub on_time: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStats {
    pub discovered: u64,
    pub published: u64,
    pub subscriber_growth_30_days: i64,
    pub subscriber_growth_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationStats {
    pub published: u64,
    pub in_progress: u64,
    pub completed: u64,
    pub published_last_7_days: Vec<DailyCount>,
    pub published_last_30_days: Vec<DailyCount>,
}

/// Per-day counts of the timestamps over the last `days` UTC days, oldest first, zero-filled
pub fn per_day<I>(timestamps: I, days: u32, now: DateTime<Utc>) -> Vec<DailyCount>
where
    I: IntoIterator<Item = DateTime<Utc>>,
{
    let today = now.date_naive();
    let first = today - Duration::days(i64::from(days.saturating_sub(1)));

    let mut counts: HashMap<NaiveDate, u64> = HashMap::new();
    for ts in timestamps {
        let date = ts.date_naive();
        if date >= first && date <= today {
            *counts.entry(date).or_default() += 1;
        }
    }

    first
        .iter_days()
        .take(days as usize)
        .map(|date| DailyCount {
            date,
            count: counts.get(&date).copied().unwrap_or(0),
        })
        .collect()
}

/// Percentage, 0 when the denominator is empty
pub fn rate(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Mean assignment-to-completion time in hours
pub fn average_completion_hours<'a>(items: impl IntoIterator<Item = &'a WorkItem>) -> Option<f64> {
    let hours: Vec<f64> = items.into_iter().filter_map(time_to_complete).collect();
    if hours.is_empty() {
        None
    } else {
        Some(hours.iter().sum::<f64>() / hours.len() as f64)
    }
}

/// Growth since a baseline count and its rate relative to the baseline
pub fn growth(current: i64, baseline: Option<i64>) -> (i64, f64) {
    match baseline {
        Some(base) => {
            let delta = current - base;
            let rate = if base > 0 { delta as f64 / base as f64 * 100.0 } else { 0.0 };
            (delta, rate)
        }
        None => (0, 0.0),
    }
}

fn status_of(item: &WorkItem) -> Option<WorkItemStatus> {
    item.work_status().ok()
}

fn count_where(items: &[WorkItem], pred: impl Fn(&WorkItem) -> bool) -> u64 {
    items.iter().filter(|i| pred(i)).count() as u64
}

fn delivered(item: &WorkItem) -> bool {
    status_of(item).is_some_and(|s| s.is_delivered())
}

fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

pub fn user_stats(items: &[WorkItem], now: DateTime<Utc>) -> UserStats {
    let assigned = items.len() as u64;
    let completed = count_where(items, delivered);
    let late = count_where(items, |i| is_late(i, now));
    let month_start = start_of_month(now);

    UserStats {
        assigned,
        completed,
        in_progress: count_where(items, |i| status_of(i) == Some(WorkItemStatus::InProgress)),
        completion_rate: rate(completed, assigned),
        average_completion_hours: average_completion_hours(items),
        completed_this_month: count_where(items, |i| i.completed_at.is_some_and(|at| at >= month_start)),
        late,
        on_time: completed.saturating_sub(late),
    }
}

pub struct Analytics {
    repo: Repository,
}

impl Analytics {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    async fn all_items(&self, filter: WorkItemFilter) -> Result<Vec<WorkItem>> {
        self.repo.list_work_items(&filter).await
    }

    async fn channel_growth(&self, channel: &Channel, now: DateTime<Utc>) -> Result<(i64, f64)> {
        let threshold = now - Duration::days(GROWTH_WINDOW_DAYS);
        let baseline = self
            .repo
            .first_snapshot_at_or_before(channel.id, threshold)
            .await?
            .map(|s| s.subscriber_count);
        Ok(growth(channel.subscriber_count, baseline))
    }

    async fn load_channel(&self, id: Uuid) -> Result<Channel> {
        self.repo
            .find_channel_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("Channel", id))
    }

    pub async fn dashboard(&self) -> Result<Dashboard> {
        let now = Utc::now();
        let items = self.all_items(WorkItemFilter::default()).await?;

        let mut by_status: HashMap<WorkItemStatus, u64> =
            WorkItemStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for status in items.iter().filter_map(status_of) {
            *by_status.entry(status).or_default() += 1;
        }

        let completed_at: Vec<DateTime<Utc>> = items
            .iter()
            .filter(|i| delivered(i))
            .filter_map(|i| i.completed_at)
            .collect();
        let started = count_where(&items, |i| status_of(i) != Some(WorkItemStatus::Discovered));

        let mut top_producers = Vec::new();
        for user in self.repo.list_users(Some(UserRole::Producer), None).await? {
            let own: Vec<&WorkItem> = items.iter().filter(|i| i.assigned_to == Some(user.id)).collect();
            let completed = own.iter().filter(|i| delivered(i)).count() as u64;
            top_producers.push(ProducerPerformance {
                completion_rate: rate(completed, own.len() as u64),
                average_hours: average_completion_hours(own.iter().copied()).unwrap_or(0.0),
                completed,
                user,
            });
        }
        top_producers.sort_by(|a, b| b.completed.cmp(&a.completed));
        top_producers.truncate(TOP_PRODUCERS);

        let destinations = self.repo.list_channels(Some(ChannelRole::Destination)).await?;
        let mut channels_growth = Vec::with_capacity(destinations.len());
        for channel in destinations {
            let (growth_30_days, growth_rate) = self.channel_growth(&channel, now).await?;
            channels_growth.push(ChannelGrowth {
                subscriber_count: channel.subscriber_count,
                growth_30_days,
                growth_rate,
                channel,
            });
        }
        channels_growth.sort_by(|a, b| b.growth_30_days.cmp(&a.growth_30_days));

        Ok(Dashboard {
            total_channels: self.repo.count_channels(None).await?,
            total_source_channels: self.repo.count_channels(Some(ChannelRole::Source)).await?,
            total_destination_channels: self.repo.count_channels(Some(ChannelRole::Destination)).await?,
            total_items: items.len() as u64,
            total_users: self.repo.count_users().await?,
            late: count_where(&items, |i| is_late(i, now)),
            completed_last_7_days: per_day(completed_at.iter().copied(), 7, now),
            completed_last_30_days: per_day(completed_at, 30, now),
            average_completion_hours: average_completion_hours(&items).unwrap_or(0.0),
            completion_rate: rate(by_status_delivered(&by_status), started),
            top_producers,
            total_subscribers: channels_growth.iter().map(|g| g.subscriber_count).sum(),
            subscriber_growth_30_days: channels_growth.iter().map(|g| g.growth_30_days).sum(),
            channels_growth,
            by_status,
        })
    }

    pub async fn user_stats(&self, user_id: Uuid) -> Result<UserStats> {
        if self.repo.find_user_by_id(user_id).await?.is_none() {
            return Err(AppError::not_found("User", user_id));
        }
        let items = self
            .all_items(WorkItemFilter {
                assigned_to: Some(user_id),
                ..Default::default()
            })
            .await?;
        Ok(user_stats(&items, Utc::now()))
    }

    pub async fn channel_stats(&self, channel_id: Uuid) -> Result<ChannelStats> {
        let channel = self.load_channel(channel_id).await?;
        let discovered = self
            .all_items(WorkItemFilter {
                source_channel_id: Some(channel_id),
                ..Default::default()
            })
            .await?
            .len() as u64;
        let published = self
            .all_items(WorkItemFilter {
                target_channel_id: Some(channel_id),
                status: Some(WorkItemStatus::Published),
                ..Default::default()
            })
            .await?
            .len() as u64;
        let (subscriber_growth_30_days, subscriber_growth_rate) = self.channel_growth(&channel, Utc::now()).await?;

        Ok(ChannelStats {
            discovered,
            published,
            subscriber_growth_30_days,
            subscriber_growth_rate,
        })
    }

    pub async fn destination_stats(&self, channel_id: Uuid) -> Result<DestinationStats> {
        let channel = self.load_channel(channel_id).await?;
        if !channel.is_destination() {
            return Err(AppError::validation(format!("Channel {} is not a destination channel", channel_id)));
        }
        let items = self
            .all_items(WorkItemFilter {
                target_channel_id: Some(channel_id),
                ..Default::default()
            })
            .await?;

        let now = Utc::now();
        let published_at: Vec<DateTime<Utc>> = items
            .iter()
            .filter(|i| status_of(i) == Some(WorkItemStatus::Published))
            .filter_map(|i| i.published_at)
            .collect();

        Ok(DestinationStats {
            published: published_at.len() as u64,
            in_progress: count_where(&items, |i| status_of(i).is_some_and(|s| s.is_open_assignment())),
            completed: count_where(&items, |i| {
                matches!(status_of(i), Some(WorkItemStatus::Completed | WorkItemStatus::Validated))
            }),
            published_last_7_days: per_day(published_at.iter().copied(), 7, now),
            published_last_30_days: per_day(published_at, 30, now),
        })
    }
}

fn by_status_delivered(by_status: &HashMap<WorkItemStatus, u64>) -> u64 {
    WorkItemStatus::DELIVERED
        .iter()
        .map(|s| by_status.get(s).copied().unwrap_or(0))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{WorkItemActiveModel, UserRole};
    use crate::db::NewWorkItem;
    use crate::testing;
    use sea_orm::Set;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).single().unwrap()
    }

    #[test]
    fn test_per_day_zero_fills_oldest_first() {
        let now = at(2024, 3, 10, 12);
        let series = per_day(
            vec![at(2024, 3, 10, 1), at(2024, 3, 10, 23), at(2024, 3, 8, 5), at(2024, 3, 1, 5)],
            3,
            now,
        );

        assert_eq!(
            series,
            vec![
                DailyCount { date: NaiveDate::from_ymd_opt(2024, 3, 8).unwrap(), count: 1 },
                DailyCount { date: NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(), count: 0 },
                DailyCount { date: NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(), count: 2 },
            ]
        );
    }

    #[test]
    fn test_growth_relative_to_baseline() {
        assert_eq!(growth(1_200, Some(1_000)), (200, 20.0));
        assert_eq!(growth(1_200, None), (0, 0.0));
        assert_eq!(growth(50, Some(0)), (50, 0.0));
        assert_eq!(rate(1, 4), 25.0);
        assert_eq!(rate(3, 0), 0.0);
    }

    async fn seeded_item(repo: &Repository, status: WorkItemStatus, assignee: Uuid) -> WorkItem {
        let source = testing::channel(repo, &format!("UC{}", Uuid::new_v4().simple()), ChannelRole::Source).await;
        let item = repo
            .create_work_item(NewWorkItem {
                source_video_id: Uuid::new_v4().to_string(),
                source_video_url: "https://youtube.com/shorts/x".to_string(),
                source_channel_id: source.id,
                title: None,
                description: None,
                tags: Vec::new(),
            })
            .await
            .unwrap();
        let mut active: WorkItemActiveModel = item.into();
        active.status = Set(status.as_str().to_string());
        active.assigned_to = Set(Some(assignee));
        repo.update_work_item(active).await.unwrap()
    }

    #[tokio::test]
    async fn test_user_stats_counts_late_and_on_time() {
        let repo = testing::repo().await;
        let producer = testing::user(&repo, UserRole::Producer).await;
        let now = Utc::now();

        let done = seeded_item(&repo, WorkItemStatus::Published, producer.id).await;
        let mut active: WorkItemActiveModel = done.into();
        active.assigned_at = Set(Some(now - Duration::hours(4)));
        active.completed_at = Set(Some(now - Duration::hours(2)));
        repo.update_work_item(active).await.unwrap();

        let overdue = seeded_item(&repo, WorkItemStatus::InProgress, producer.id).await;
        let mut active: WorkItemActiveModel = overdue.into();
        active.deadline = Set(Some(now - Duration::hours(1)));
        repo.update_work_item(active).await.unwrap();

        let stats = Analytics::new(repo.clone()).user_stats(producer.id).await.unwrap();
        assert_eq!(stats.assigned, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.in_progress, 1);
        assert_eq!(stats.completion_rate, 50.0);
        assert_eq!(stats.average_completion_hours, Some(2.0));
        assert_eq!(stats.late, 1);
        assert_eq!(stats.on_time, 0);
    }

    #[test]
    fn test_user_stats_without_completions() {
        let stats = user_stats(&[], Utc::now());
        assert_eq!(stats.average_completion_hours, None);
        assert_eq!(stats.completion_rate, 0.0);
    }

    #[tokio::test]
    async fn test_dashboard_totals_and_growth() {
        let repo = testing::repo().await;
        let producer = testing::user(&repo, UserRole::Producer).await;
        let dest = testing::channel(&repo, "UCdest", ChannelRole::Destination).await;
        repo.append_subscriber_snapshot(dest.id, 800, Utc::now() - Duration::days(40))
            .await
            .unwrap();

        seeded_item(&repo, WorkItemStatus::Completed, producer.id).await;
        seeded_item(&repo, WorkItemStatus::Assigned, producer.id).await;

        let dashboard = Analytics::new(repo.clone()).dashboard().await.unwrap();
        assert_eq!(dashboard.total_items, 2);
        assert_eq!(dashboard.total_destination_channels, 1);
        assert_eq!(dashboard.by_status[&WorkItemStatus::Completed], 1);
        assert_eq!(dashboard.by_status[&WorkItemStatus::Published], 0);
        assert_eq!(dashboard.completion_rate, 50.0);
        assert_eq!(dashboard.completed_last_7_days.len(), 7);
        assert_eq!(dashboard.completed_last_30_days.len(), 30);
        assert_eq!(dashboard.total_subscribers, 1_000);
        assert_eq!(dashboard.subscriber_growth_30_days, 200);
        assert_eq!(dashboard.channels_growth[0].growth_rate, 25.0);
        assert_eq!(dashboard.top_producers[0].completed, 1);
    }
}
