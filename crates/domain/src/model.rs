//! Domain models and value objects

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A raw post as returned by the feed for one fetch cycle.
///
/// Transient: owned by the cycle that fetched it and discarded after
/// normalization. The feed returns a "posts and replies" style timeline, so
/// a batch may contain items from other authors (reply threads); the monitor
/// filters those out by `author_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPost {
    /// Feed-assigned numeric ID, monotonically increasing within an account
    pub id: u64,
    /// Feed-side ID of the author (not the handle)
    pub author_id: String,
    /// Full text as rendered by the feed
    pub text: String,
    /// When the post was created
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Media attached directly to this post
    #[serde(default)]
    pub media: MediaRefs,
    /// Engagement counters; absent fields default to zero
    #[serde(default)]
    pub engagement: Engagement,
    /// Present when this post is a repost of another post
    #[serde(default)]
    pub reposted: Option<Box<ReferencedPost>>,
    /// Present when this post quotes another post
    #[serde(default)]
    pub quoted: Option<Box<ReferencedPost>>,
    /// ID of the post being replied to, if any
    #[serde(default)]
    pub in_reply_to_id: Option<u64>,
    /// Conversation/thread identifier
    #[serde(default)]
    pub conversation_id: Option<u64>,
    /// Declared client, as an HTML anchor fragment
    #[serde(default)]
    pub source_html: Option<String>,
    /// Language tag reported by the feed
    #[serde(default)]
    pub language: Option<String>,
}

/// A post referenced by another post (repost or quote target).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferencedPost {
    pub id: u64,
    /// Handle of the referenced post's author
    pub author_handle: String,
    pub text: String,
    #[serde(default)]
    pub media: MediaRefs,
}

/// Media attachment URLs grouped by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRefs {
    #[serde(default)]
    pub photos: Vec<String>,
    #[serde(default)]
    pub videos: Vec<String>,
}

impl MediaRefs {
    pub fn is_empty(&self) -> bool {
        self.photos.is_empty() && self.videos.is_empty()
    }
}

/// Engagement counters. Missing counters deserialize as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    #[serde(default)]
    pub repost_count: u64,
    #[serde(default)]
    pub reply_count: u64,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub quote_count: u64,
}

/// The analysis-ready record persisted by a sink.
///
/// Immutable once created; the sink is the system of record, not memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedPost {
    /// Feed-assigned post ID
    pub post_id: u64,
    /// Monitored account's username
    pub account: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Text with URLs and mentions removed and whitespace collapsed
    pub clean_text: String,
    /// Hashtags in order of appearance, duplicates preserved
    pub hashtags: Vec<String>,
    /// Mentions in order of appearance, duplicates preserved
    pub mentions: Vec<String>,
    /// URLs in order of appearance
    pub urls: Vec<String>,
    pub media: ArchivedMedia,
    pub engagement: Engagement,
    pub is_repost: bool,
    pub is_reply: bool,
    pub is_quote: bool,
    pub conversation_id: Option<u64>,
    pub language: Option<String>,
}

/// Media references as stored in the record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedMedia {
    pub photos: Vec<String>,
    pub videos: Vec<String>,
    pub has_media: bool,
}

impl From<MediaRefs> for ArchivedMedia {
    fn from(media: MediaRefs) -> Self {
        let has_media = !media.is_empty();
        Self {
            photos: media.photos,
            videos: media.videos,
            has_media,
        }
    }
}

/// Durable per-account monitor state, flushed on shutdown.
///
/// Written for external resume/observability tooling; watermark bootstrap
/// re-derives its baseline from a fresh fetch and never reads this file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorState {
    /// Largest post ID ever admitted for this account
    #[serde(rename = "last_tweet_id")]
    pub last_post_id: i64,
    /// When the monitor last completed a cycle or shut down
    #[serde(rename = "last_check", with = "time::serde::rfc3339")]
    pub last_check: OffsetDateTime,
}

/// Identity of one monitored account.
#[derive(Debug, Clone)]
pub struct AccountIdentity {
    /// Username/handle as configured
    pub username: String,
    /// Feed-side user ID; authorship checks use this, not the handle
    pub user_id: String,
}
