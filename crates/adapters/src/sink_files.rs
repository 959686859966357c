//! File sink: one JSON file per archived post

use async_trait::async_trait;
use post_archiver_domain::{ArchivedPost, ArchiveSink, SinkError};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Sink writing each record to `<root>/<account>/<post_id>.json`.
///
/// Naming is deterministic by post id, so replaying a record after a crash
/// rewrites the same file; the file variant is idempotent where the
/// document variant is not.
pub struct FileArchive {
    root: PathBuf,
}

impl FileArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, post: &ArchivedPost) -> PathBuf {
        self.root
            .join(&post.account)
            .join(format!("{}.json", post.post_id))
    }
}

#[async_trait]
impl ArchiveSink for FileArchive {
    async fn write(&self, post: &ArchivedPost) -> Result<(), SinkError> {
        let path = self.record_path(post);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let body = serde_json::to_vec_pretty(post)
            .map_err(|e| SinkError::Serialization(e.to_string()))?;
        fs::write(&path, body).await?;

        Ok(())
    }

    fn backend(&self) -> &'static str {
        "files"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use post_archiver_domain::{ArchivedMedia, Engagement};
    use serde_json::Value;
    use tempfile::TempDir;
    use time::macros::datetime;

    fn record(post_id: u64, clean_text: &str) -> ArchivedPost {
        ArchivedPost {
            post_id,
            account: "alice".to_string(),
            created_at: datetime!(2024-06-01 12:00:00 UTC),
            clean_text: clean_text.to_string(),
            hashtags: vec![],
            mentions: vec![],
            urls: vec![],
            media: ArchivedMedia::default(),
            engagement: Engagement::default(),
            is_repost: false,
            is_reply: false,
            is_quote: false,
            conversation_id: None,
            language: None,
        }
    }

    #[tokio::test]
    async fn test_write_creates_file_named_by_post_id() {
        let dir = TempDir::new().expect("temp dir");
        let archive = FileArchive::new(dir.path());

        archive.write(&record(42, "hello")).await.unwrap();

        let path = dir.path().join("alice").join("42.json");
        let contents = tokio::fs::read_to_string(&path).await.expect("read record");
        let value: Value = serde_json::from_str(&contents).expect("valid json");

        assert_eq!(value["post_id"], 42);
        assert_eq!(value["account"], "alice");
        assert_eq!(value["clean_text"], "hello");
    }

    #[tokio::test]
    async fn test_rewriting_same_post_id_is_idempotent() {
        let dir = TempDir::new().expect("temp dir");
        let archive = FileArchive::new(dir.path());

        archive.write(&record(42, "first")).await.unwrap();
        archive.write(&record(42, "replayed")).await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path().join("alice"))
            .unwrap()
            .collect();
        assert_eq!(entries.len(), 1);

        let contents = tokio::fs::read_to_string(dir.path().join("alice").join("42.json"))
            .await
            .unwrap();
        let value: Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(value["clean_text"], "replayed");
    }
}
