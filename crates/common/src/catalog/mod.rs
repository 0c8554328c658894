//! Video catalog: source of candidate shorts and channel metadata
//!
//! The production implementation reads the YouTube Data API v3.

use crate::config::YoutubeConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use regex_lite::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info};

/// Longest video still considered a short
pub const MAX_SHORT_SECONDS: u64 = 60;

/// A short that could become a work item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateVideo {
    pub video_id: String,
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

/// Public metadata of a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDetails {
    pub external_channel_id: String,
    pub display_name: String,
    pub subscriber_count: i64,
    pub profile_image_url: Option<String>,
}

#[async_trait]
pub trait VideoCatalog: Send + Sync {
    /// Recent shorts published by a channel
    async fn list_short_candidates(&self, external_channel_id: &str) -> Result<Vec<CandidateVideo>>;

    async fn channel_details(&self, external_channel_id: &str) -> Result<ChannelDetails>;

    /// One random candidate whose video id is not excluded
    async fn random_candidate(
        &self,
        external_channel_id: &str,
        exclude: &HashSet<String>,
    ) -> Result<Option<CandidateVideo>> {
        let candidates = self.list_short_candidates(external_channel_id).await?;
        Ok(pick_candidate(candidates, exclude))
    }
}

/// Uniform random pick among the non-excluded candidates
pub fn pick_candidate(candidates: Vec<CandidateVideo>, exclude: &HashSet<String>) -> Option<CandidateVideo> {
    let available: Vec<CandidateVideo> = candidates
        .into_iter()
        .filter(|c| !exclude.contains(&c.video_id))
        .collect();
    available.choose(&mut rand::thread_rng()).cloned()
}

/// Seconds in an ISO 8601 duration such as `PT1M30S`; 0 when unparseable
pub fn parse_iso8601_duration(duration: &str) -> u64 {
    let Ok(re) = Regex::new(r"^PT(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?$") else {
        return 0;
    };
    let Some(caps) = re.captures(duration) else {
        return 0;
    };
    let part = |i: usize| -> u64 {
        caps.get(i)
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .unwrap_or(0)
    };
    part(1) * 3600 + part(2) * 60 + part(3)
}

pub fn short_url(video_id: &str) -> String {
    format!("https://youtube.com/shorts/{}", video_id)
}

#[derive(Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItem {
    id: SearchId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchId {
    video_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    id: String,
    snippet: VideoSnippet,
    content_details: ContentDetails,
}

#[derive(Deserialize)]
struct VideoSnippet {
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Deserialize)]
struct ContentDetails {
    duration: String,
}

#[derive(Deserialize)]
struct ChannelItem {
    id: String,
    snippet: ChannelSnippet,
    #[serde(default)]
    statistics: Option<ChannelStatistics>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelSnippet {
    title: String,
    #[serde(default)]
    custom_url: Option<String>,
    #[serde(default)]
    thumbnails: Option<Thumbnails>,
}

#[derive(Deserialize)]
struct Thumbnails {
    #[serde(default)]
    default: Option<Thumbnail>,
}

#[derive(Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelStatistics {
    #[serde(default)]
    subscriber_count: Option<String>,
}

/// YouTube Data API client
pub struct YoutubeClient {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    max_results: u32,
}

impl YoutubeClient {
    pub fn new(config: &YoutubeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.api_base.trim_end_matches('/').to_string(),
            max_results: config.max_results,
        })
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| AppError::Configuration {
            message: "YouTube API key not configured".to_string(),
        })
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, endpoint: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .client
            .get(&url)
            .query(query)
            .query(&[("key", self.api_key()?)])
            .send()
            .await
            .map_err(|e| AppError::external("youtube", format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let message = if status == reqwest::StatusCode::FORBIDDEN {
                "quota exceeded or invalid API key".to_string()
            } else {
                format!("API error {}", status)
            };
            return Err(AppError::external("youtube", message));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::external("youtube", format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl VideoCatalog for YoutubeClient {
    async fn list_short_candidates(&self, external_channel_id: &str) -> Result<Vec<CandidateVideo>> {
        let search: ListResponse<SearchItem> = self
            .get(
                "search",
                &[
                    ("part", "snippet".to_string()),
                    ("channelId", external_channel_id.to_string()),
                    ("type", "video".to_string()),
                    ("order", "date".to_string()),
                    ("maxResults", self.max_results.to_string()),
                ],
            )
            .await?;

        let ids: Vec<String> = search.items.into_iter().filter_map(|i| i.id.video_id).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let videos: ListResponse<VideoItem> = self
            .get(
                "videos",
                &[("part", "contentDetails,snippet".to_string()), ("id", ids.join(","))],
            )
            .await?;

        let shorts: Vec<CandidateVideo> = videos
            .items
            .into_iter()
            .filter(|v| {
                let secs = parse_iso8601_duration(&v.content_details.duration);
                secs > 0 && secs <= MAX_SHORT_SECONDS
            })
            .map(|v| CandidateVideo {
                url: short_url(&v.id),
                video_id: v.id,
                title: v.snippet.title,
                description: v.snippet.description.filter(|d| !d.is_empty()),
                tags: v.snippet.tags,
            })
            .collect();

        debug!(channel = %external_channel_id, shorts = shorts.len(), "Fetched short candidates");
        Ok(shorts)
    }

    async fn channel_details(&self, external_channel_id: &str) -> Result<ChannelDetails> {
        let channels: ListResponse<ChannelItem> = self
            .get(
                "channels",
                &[
                    ("part", "snippet,statistics".to_string()),
                    ("id", external_channel_id.to_string()),
                ],
            )
            .await?;

        let channel = channels
            .items
            .into_iter()
            .next()
            .ok_or_else(|| AppError::not_found("YouTube channel", external_channel_id))?;

        let display_name = match channel.snippet.custom_url.filter(|u| !u.is_empty()) {
            Some(handle) if handle.starts_with('@') => handle,
            Some(handle) => format!("@{}", handle),
            None => channel.snippet.title,
        };
        let subscriber_count = channel
            .statistics
            .and_then(|s| s.subscriber_count)
            .and_then(|c| c.parse::<i64>().ok())
            .unwrap_or(0);

        info!(channel = %channel.id, subscribers = subscriber_count, "Fetched channel details");
        Ok(ChannelDetails {
            external_channel_id: channel.id,
            display_name,
            subscriber_count,
            profile_image_url: channel.snippet.thumbnails.and_then(|t| t.default).map(|t| t.url),
        })
    }
}
