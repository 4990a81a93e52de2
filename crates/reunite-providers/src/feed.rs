//! Client for the social-feed search provider.
//!
//! Queries the provider's recent-post search endpoint for posts carrying
//! photo attachments and returns the photo URLs in provider order. Posts
//! without photos are skipped. The provider enforces a request quota;
//! exceeding it surfaces as [`Error::RateLimited`] so the aggregation layer
//! can fall back to registry-only results.

use crate::error::{error_for_response, Error, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Default per-request timeout for feed searches.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Feed client configuration.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub base_url: String,
    pub bearer_token: String,
    pub timeout: Duration,
}

/// One photo-bearing post from the feed. Unscored: the feed performs no
/// face comparison of its own.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedPost {
    pub media_url: String,
    pub posted_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct SearchRecentResponse {
    #[serde(default)]
    data: Vec<Post>,
    #[serde(default)]
    includes: Includes,
}

#[derive(Deserialize)]
struct Post {
    #[serde(default)]
    attachments: Option<Attachments>,
    created_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct Attachments {
    #[serde(default)]
    media_keys: Vec<String>,
}

#[derive(Deserialize, Default)]
struct Includes {
    #[serde(default)]
    media: Vec<Media>,
}

#[derive(Deserialize)]
struct Media {
    media_key: String,
    #[serde(rename = "type")]
    kind: String,
    url: Option<String>,
}

/// Client for the feed search API.
#[derive(Debug)]
pub struct FeedClient {
    http: reqwest::Client,
    config: FeedConfig,
}

impl FeedClient {
    /// Create a client. Fails on an empty bearer token.
    pub fn new(config: FeedConfig) -> Result<Self> {
        if config.bearer_token.is_empty() {
            return Err(Error::Config("feed bearer_token must be non-empty".into()));
        }
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { http, config })
    }

    /// Search recent posts matching `query`, bounded to `page_size` posts,
    /// and return the photo attachments found among them.
    pub async fn search_recent(&self, query: &str, page_size: u32) -> Result<Vec<FeedPost>> {
        let url = format!("{}/2/tweets/search/recent", self.config.base_url);
        let max_results = page_size.to_string();
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.config.bearer_token)
            .query(&[
                ("query", query),
                ("max_results", max_results.as_str()),
                ("tweet.fields", "attachments,created_at"),
                ("expansions", "attachments.media_keys"),
                ("media.fields", "url,type"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }

        let body: SearchRecentResponse = response.json().await?;
        let posts = extract_photo_posts(body);
        tracing::debug!(count = posts.len(), "feed search returned photo posts");
        Ok(posts)
    }
}

/// Join posts to their photo media, preserving provider order.
fn extract_photo_posts(response: SearchRecentResponse) -> Vec<FeedPost> {
    let photo_urls: HashMap<&str, &str> = response
        .includes
        .media
        .iter()
        .filter(|m| m.kind == "photo")
        .filter_map(|m| m.url.as_deref().map(|url| (m.media_key.as_str(), url)))
        .collect();

    let mut posts = Vec::new();
    for post in &response.data {
        let Some(attachments) = &post.attachments else {
            continue;
        };
        for key in &attachments.media_keys {
            if let Some(url) = photo_urls.get(key.as_str()) {
                posts.push(FeedPost {
                    media_url: (*url).to_string(),
                    posted_at: post.created_at,
                });
            }
        }
    }
    posts
}
