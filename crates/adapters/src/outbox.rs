//! Approval outbox: rendered reposts are queued in a JSON lines file for a
//! moderator instead of going to the destination wall.

use async_trait::async_trait;
use reposter_domain::model::RenderedPost;
use reposter_domain::ports::{DestinationWriter, PublishError, PublishReceipt};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    #[error("Outbox file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Outbox entry encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Append-only handle on the outbox file, shared by concurrent cycles
#[derive(Debug, Clone)]
pub struct OutboxWriter {
    path: PathBuf,
    file: Arc<Mutex<tokio::fs::File>>,
}

impl OutboxWriter {
    /// Open the outbox for appending, creating it and its directory if missing
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, OutboxError> {
        let path = path.into();
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// One entry per line; the lock keeps lines from interleaving
    async fn queue(&self, entry: &OutboxEntry<'_>) -> Result<(), OutboxError> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Appends rendered posts to a JSON lines file instead of publishing them
#[derive(Debug, Clone)]
pub struct OutboxPublisher {
    writer: OutboxWriter,
    platform: &'static str,
}

impl OutboxPublisher {
    pub fn new(writer: OutboxWriter, platform: &'static str) -> Self {
        Self { writer, platform }
    }
}

#[derive(Serialize)]
struct OutboxEntry<'a> {
    id: String,
    platform: &'a str,
    account: &'a str,
    channel_id: i64,
    source_post_key: &'a str,
    source_url: &'a str,
    text: &'a str,
    attachments: Vec<&'a str>,
    #[serde(with = "time::serde::rfc3339")]
    queued_at: OffsetDateTime,
}

#[async_trait]
impl DestinationWriter for OutboxPublisher {
    async fn publish(
        &self,
        account: &str,
        channel_id: i64,
        post: &RenderedPost,
    ) -> Result<PublishReceipt, PublishError> {
        let id = Uuid::new_v4().to_string();
        let entry = OutboxEntry {
            id: id.clone(),
            platform: self.platform,
            account,
            channel_id,
            source_post_key: &post.source_post_key,
            source_url: &post.source_url,
            text: &post.text,
            attachments: post.attachments.iter().map(|a| a.0.as_str()).collect(),
            queued_at: OffsetDateTime::now_utc(),
        };

        self.writer
            .queue(&entry)
            .await
            .map_err(|error| PublishError::Api(format!("Outbox write failed: {}", error)))?;

        tracing::info!(path = %self.writer.path().display(), entry_id = %id, "Queued post in outbox");

        Ok(PublishReceipt { id, url: None })
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn platform(&self) -> &'static str {
        self.platform
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reposter_domain::model::AttachmentRef;
    use serde_json::Value;
    use tempfile::TempDir;

    #[tokio::test]
    async fn outbox_publisher_writes_jsonl_entry() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("outbox.jsonl");

        let writer = OutboxWriter::open(path.clone()).await.expect("writer");
        let publisher = OutboxPublisher::new(writer, "wall");

        let post = RenderedPost {
            text: "Rendered content".to_string(),
            attachments: vec![AttachmentRef("photo-42_7".to_string())],
            source_post_key: "-42_123".to_string(),
            source_url: "https://vk.com/wall-42_123".to_string(),
        };

        let receipt = publisher
            .publish("writer", -900, &post)
            .await
            .expect("publish");
        assert!(!receipt.id.is_empty());

        let contents = tokio::fs::read_to_string(&path).await.expect("read outbox");
        let line = contents.trim();
        let value: Value = serde_json::from_str(line).expect("valid json");

        assert_eq!(value["id"], receipt.id.as_str());
        assert_eq!(value["platform"], "wall");
        assert_eq!(value["account"], "writer");
        assert_eq!(value["channel_id"], -900);
        assert_eq!(value["source_post_key"], "-42_123");
        assert_eq!(value["source_url"], "https://vk.com/wall-42_123");
        assert_eq!(value["text"], "Rendered content");
        assert_eq!(value["attachments"][0], "photo-42_7");
    }

    #[tokio::test]
    async fn outbox_appends_one_line_per_post() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("nested").join("outbox.jsonl");
        let publisher =
            OutboxPublisher::new(OutboxWriter::open(path.clone()).await.expect("writer"), "wall");

        let post = RenderedPost {
            text: "Body".to_string(),
            attachments: vec![],
            source_post_key: "-1_1".to_string(),
            source_url: "https://vk.com/wall-1_1".to_string(),
        };
        publisher.publish("writer", -9, &post).await.expect("first");
        publisher.publish("writer", -9, &post).await.expect("second");

        let contents = tokio::fs::read_to_string(&path).await.expect("read outbox");
        assert_eq!(contents.lines().count(), 2);
    }

    #[tokio::test]
    async fn outbox_open_on_directory_reports_file_error() {
        let dir = TempDir::new().expect("temp dir");

        let error = OutboxWriter::open(dir.path()).await.unwrap_err();

        assert!(error.to_string().starts_with("Outbox file error"));
    }
}
