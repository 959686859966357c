//! HTTP feed source adapter for the upstream timeline API

use async_trait::async_trait;
use post_archiver_domain::{FeedError, FeedSource, MediaRefs, RawPost, ReferencedPost};
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use time::OffsetDateTime;

/// Feed source backed by the authenticated timeline API.
///
/// Returns the timeline in API order (newest first); the monitor relies on
/// that order for its oldest-first replay.
pub struct HttpFeedSource {
    client: Client,
    bearer_token: SecretString,
    base_url: String,
}

impl HttpFeedSource {
    pub fn new(bearer_token: SecretString) -> Self {
        Self::with_base_url(bearer_token, "https://api.twitter.com".to_string())
    }

    pub fn with_base_url(bearer_token: SecretString, base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            bearer_token,
            base_url,
        }
    }

    async fn get(&self, url: &str) -> Result<Response, FeedError> {
        let response = self
            .client
            .get(url)
            .header(
                "Authorization",
                format!("Bearer {}", self.bearer_token.expose_secret()),
            )
            .send()
            .await
            .map_err(|e| FeedError::Network(e.to_string()))?;

        if response.status() == 401 {
            return Err(FeedError::Auth("Invalid bearer token".to_string()));
        }

        if response.status() == 429 {
            let retry_after = response
                .headers()
                .get("x-rate-limit-reset")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(|ts| {
                    let now = OffsetDateTime::now_utc().unix_timestamp() as u64;
                    Duration::from_secs(ts.saturating_sub(now))
                });
            return Err(FeedError::RateLimited(retry_after));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::Api(format!("{}: {}", status, body)));
        }

        Ok(response)
    }

    /// Look up the feed-side user ID for a username. Used once at startup;
    /// authorship checks inside the monitor use the resolved ID.
    pub async fn lookup_user_id(&self, username: &str) -> Result<String, FeedError> {
        let url = format!("{}/2/users/by/username/{}", self.base_url, username);

        let user_response: UserResponse = self
            .get(&url)
            .await?
            .json()
            .await
            .map_err(|e| FeedError::Api(e.to_string()))?;

        Ok(user_response.data.id)
    }
}

#[derive(Deserialize)]
struct UserResponse {
    data: UserData,
}

#[derive(Deserialize)]
struct UserData {
    id: String,
}

#[derive(Deserialize)]
struct TimelineResponse {
    posts: Option<Vec<WirePost>>,
}

#[derive(Deserialize)]
struct WirePost {
    id: String,
    author_id: String,
    text: String,
    created_at: Option<String>,
    #[serde(default)]
    public_metrics: WireMetrics,
    #[serde(default)]
    media: WireMedia,
    #[serde(default)]
    reposted: Option<WireReference>,
    #[serde(default)]
    quoted: Option<WireReference>,
    #[serde(default)]
    in_reply_to_id: Option<String>,
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    lang: Option<String>,
}

#[derive(Deserialize, Default)]
struct WireMetrics {
    #[serde(default)]
    repost_count: u64,
    #[serde(default)]
    reply_count: u64,
    #[serde(default)]
    like_count: u64,
    #[serde(default)]
    quote_count: u64,
}

#[derive(Deserialize, Default)]
struct WireMedia {
    #[serde(default)]
    photos: Vec<String>,
    #[serde(default)]
    videos: Vec<String>,
}

#[derive(Deserialize)]
struct WireReference {
    id: String,
    author_handle: String,
    text: String,
    #[serde(default)]
    media: WireMedia,
}

impl From<WireMedia> for MediaRefs {
    fn from(media: WireMedia) -> Self {
        Self {
            photos: media.photos,
            videos: media.videos,
        }
    }
}

fn convert_reference(reference: WireReference) -> Option<Box<ReferencedPost>> {
    let id = parse_id(&reference.id)?;
    Some(Box::new(ReferencedPost {
        id,
        author_handle: reference.author_handle,
        text: reference.text,
        media: reference.media.into(),
    }))
}

fn parse_id(id: &str) -> Option<u64> {
    match id.parse::<u64>() {
        Ok(id) => Some(id),
        Err(_) => {
            tracing::warn!(id = %id, "Skipping entry with non-numeric id");
            None
        }
    }
}

fn convert_post(wire: WirePost) -> Option<RawPost> {
    let id = parse_id(&wire.id)?;

    let created_at = wire
        .created_at
        .as_deref()
        .and_then(|s| OffsetDateTime::parse(s, &time::format_description::well_known::Rfc3339).ok())
        .unwrap_or_else(OffsetDateTime::now_utc);

    Some(RawPost {
        id,
        author_id: wire.author_id,
        text: wire.text,
        created_at,
        media: wire.media.into(),
        engagement: post_archiver_domain::Engagement {
            repost_count: wire.public_metrics.repost_count,
            reply_count: wire.public_metrics.reply_count,
            like_count: wire.public_metrics.like_count,
            quote_count: wire.public_metrics.quote_count,
        },
        reposted: wire.reposted.and_then(convert_reference),
        quoted: wire.quoted.and_then(convert_reference),
        in_reply_to_id: wire.in_reply_to_id.as_deref().and_then(|s| s.parse().ok()),
        conversation_id: wire.conversation_id.as_deref().and_then(|s| s.parse().ok()),
        source_html: wire.source,
        language: wire.lang,
    })
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch_timeline(&self, user_id: &str) -> Result<Vec<RawPost>, FeedError> {
        let url = format!(
            "{}/2/users/{}/timeline?max_results=100",
            self.base_url, user_id
        );

        let timeline: TimelineResponse = self
            .get(&url)
            .await?
            .json()
            .await
            .map_err(|e| FeedError::Api(e.to_string()))?;

        let posts: Vec<RawPost> = timeline
            .posts
            .unwrap_or_default()
            .into_iter()
            .filter_map(convert_post)
            .collect();

        tracing::debug!(user_id = %user_id, count = posts.len(), "Fetched timeline");

        Ok(posts)
    }
}
