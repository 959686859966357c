//! SQLite document sink implementation

use async_trait::async_trait;
use post_archiver_domain::{ArchivedPost, ArchiveSink, SinkError};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::path::Path;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// SQLite-backed document sink.
///
/// Writes are plain inserts, never upserts. The unique index on `post_id`
/// makes a crash-replay duplicate surface as a failed insert, which the
/// monitor logs and skips; it never becomes a second document.
pub struct SqliteArchive {
    pool: SqlitePool,
}

impl SqliteArchive {
    /// Open (or create) the archive database at the given path.
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await
            .map_err(|e| SinkError::Database(e.to_string()))?;

        let archive = Self { pool };
        archive.run_migrations().await?;

        Ok(archive)
    }

    /// Create an in-memory archive (for testing)
    pub async fn in_memory() -> Result<Self, SinkError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| SinkError::Database(e.to_string()))?;

        let archive = Self { pool };
        archive.run_migrations().await?;

        Ok(archive)
    }

    async fn run_migrations(&self) -> Result<(), SinkError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                post_id INTEGER NOT NULL,
                account TEXT NOT NULL,
                created_at TEXT NOT NULL,
                saved_at TEXT NOT NULL,
                clean_text TEXT NOT NULL,
                hashtags TEXT NOT NULL,
                mentions TEXT NOT NULL,
                urls TEXT NOT NULL,
                photos TEXT NOT NULL,
                videos TEXT NOT NULL,
                has_media INTEGER NOT NULL,
                repost_count INTEGER NOT NULL,
                reply_count INTEGER NOT NULL,
                like_count INTEGER NOT NULL,
                quote_count INTEGER NOT NULL,
                is_repost INTEGER NOT NULL,
                is_reply INTEGER NOT NULL,
                is_quote INTEGER NOT NULL,
                conversation_id INTEGER,
                language TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SinkError::Database(e.to_string()))?;

        // Same index set as the original collection: post_id unique,
        // created_at descending, account, hashtags (multikey via side table).
        for ddl in [
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_posts_post_id ON posts(post_id)",
            "CREATE INDEX IF NOT EXISTS idx_posts_created_at ON posts(created_at DESC)",
            "CREATE INDEX IF NOT EXISTS idx_posts_account ON posts(account)",
            r#"
            CREATE TABLE IF NOT EXISTS post_hashtags (
                post_id INTEGER NOT NULL,
                hashtag TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_post_hashtags_hashtag ON post_hashtags(hashtag)",
        ] {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .map_err(|e| SinkError::Database(e.to_string()))?;
        }

        Ok(())
    }
}

fn to_json(values: &[String]) -> Result<String, SinkError> {
    serde_json::to_string(values).map_err(|e| SinkError::Serialization(e.to_string()))
}

fn format_ts(ts: OffsetDateTime) -> Result<String, SinkError> {
    ts.format(&Rfc3339)
        .map_err(|e| SinkError::Serialization(e.to_string()))
}

#[async_trait]
impl ArchiveSink for SqliteArchive {
    async fn write(&self, post: &ArchivedPost) -> Result<(), SinkError> {
        let created_at = format_ts(post.created_at)?;
        let saved_at = format_ts(OffsetDateTime::now_utc())?;

        sqlx::query(
            r#"
            INSERT INTO posts (
                post_id, account, created_at, saved_at, clean_text,
                hashtags, mentions, urls, photos, videos, has_media,
                repost_count, reply_count, like_count, quote_count,
                is_repost, is_reply, is_quote, conversation_id, language
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(post.post_id as i64)
        .bind(&post.account)
        .bind(&created_at)
        .bind(&saved_at)
        .bind(&post.clean_text)
        .bind(to_json(&post.hashtags)?)
        .bind(to_json(&post.mentions)?)
        .bind(to_json(&post.urls)?)
        .bind(to_json(&post.media.photos)?)
        .bind(to_json(&post.media.videos)?)
        .bind(post.media.has_media)
        .bind(post.engagement.repost_count as i64)
        .bind(post.engagement.reply_count as i64)
        .bind(post.engagement.like_count as i64)
        .bind(post.engagement.quote_count as i64)
        .bind(post.is_repost)
        .bind(post.is_reply)
        .bind(post.is_quote)
        .bind(post.conversation_id.map(|id| id as i64))
        .bind(post.language.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|e| SinkError::Database(e.to_string()))?;

        for hashtag in &post.hashtags {
            sqlx::query("INSERT INTO post_hashtags (post_id, hashtag) VALUES (?, ?)")
                .bind(post.post_id as i64)
                .bind(hashtag)
                .execute(&self.pool)
                .await
                .map_err(|e| SinkError::Database(e.to_string()))?;
        }

        Ok(())
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}
