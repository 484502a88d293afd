//! Port definitions (traits) for external dependencies
//!
//! These traits define the boundaries between the domain and external systems.
//! Adapters implement these traits to connect to real infrastructure.

use async_trait::async_trait;
use rand::Rng;
use thiserror::Error;
use time::OffsetDateTime;

use crate::model::{Post, RenderedPost, TenantThemeConfig, TenantThemeKey, WorkingSet};

/// Error type for source platform reads
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("API error: {0}")]
    Api(String),
    #[error("Rate limited, retry after: {0:?}")]
    RateLimited(Option<std::time::Duration>),
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Network error: {0}")]
    Network(String),
}

/// Port for reading community walls on the source platform
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Fetch a page of posts from a wall, newest first
    async fn fetch_posts(
        &self,
        account: &str,
        group_id: i64,
        offset: u32,
        count: u32,
    ) -> Result<Vec<Post>, SourceError>;

    /// Fetch a single post; `None` when it was removed or is not visible
    async fn fetch_post(
        &self,
        account: &str,
        owner_id: i64,
        post_id: i64,
    ) -> Result<Option<Post>, SourceError>;
}

/// Error type for publisher operations
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("API error: {0}")]
    Api(String),
    #[error("Rate limited")]
    RateLimited,
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Content too long: {len} > {max}")]
    ContentTooLong { len: usize, max: usize },
}

/// Result of a successful publish operation
#[derive(Debug, Clone)]
pub struct PublishReceipt {
    /// Platform-specific post id on the destination wall
    pub id: String,
    /// URL to the published content, if available
    pub url: Option<String>,
}

/// Port for writing to the destination wall
#[async_trait]
pub trait DestinationWriter: Send + Sync {
    /// Publish a rendered post to a channel using the given write account
    async fn publish(
        &self,
        account: &str,
        channel_id: i64,
        post: &RenderedPost,
    ) -> Result<PublishReceipt, PublishError>;

    /// Check if this publisher is enabled
    fn is_enabled(&self) -> bool;

    /// Get the platform name (e.g., "wall", "outbox")
    fn platform(&self) -> &'static str;
}

/// Error type for working set persistence
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Version conflict: expected {expected}, found {found}")]
    VersionConflict { expected: u64, found: u64 },
}

/// Port for persisting per-(tenant, theme) dedup history
#[async_trait]
pub trait WorkingSetStore: Send + Sync {
    /// Load the working set, or an empty one (version 0) when none was saved.
    /// The returned set is trimmed to `history_limit`.
    async fn load(
        &self,
        tenant: &str,
        theme: &str,
        history_limit: usize,
    ) -> Result<WorkingSet, StateError>;

    /// Save if the stored version still equals `working_set.version`.
    /// Returns the new version.
    async fn save(&self, working_set: &WorkingSet) -> Result<u64, StateError>;
}

/// Error type for image downloads
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Empty image body")]
    Empty,
}

/// Port for downloading image bytes for hashing
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, ImageError>;
}

/// Error type for tenant configuration
#[derive(Debug, Error)]
pub enum TenantConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error in {file}: {message}")]
    Parse { file: String, message: String },
    #[error("Validation error in {key}: {message}")]
    Validation { key: String, message: String },
    #[error("Unknown tenant '{0}'")]
    UnknownTenant(String),
    #[error("Unknown theme '{theme}' for tenant '{tenant}'")]
    UnknownTheme { tenant: String, theme: String },
    #[error("Invalid ID '{id}': must match [a-z0-9_]+")]
    InvalidId { id: String },
}

/// Port for loading tenant/theme configuration
#[async_trait]
pub trait TenantConfigSource: Send + Sync {
    /// Load the merged configuration of one theme of a tenant
    async fn load(
        &self,
        tenant: &str,
        theme: &str,
    ) -> Result<TenantThemeConfig, TenantConfigError>;

    /// List every configured (tenant, theme) pair
    async fn list(&self) -> Result<Vec<TenantThemeKey>, TenantConfigError>;
}

/// Port for time/clock operations (enables deterministic testing)
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> OffsetDateTime;
}

/// Real clock implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Port for random choices (enables deterministic testing)
pub trait Chooser: Send + Sync {
    /// Pick an index in `0..len`; `len` is never zero
    fn choose_index(&self, len: usize) -> usize;
}

/// Thread-local RNG backed chooser
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomChooser;

impl Chooser for RandomChooser {
    fn choose_index(&self, len: usize) -> usize {
        rand::rng().random_range(0..len)
    }
}

/// Pick one item with the given chooser
pub fn pick<'a, T, C: Chooser + ?Sized>(chooser: &C, items: &'a [T]) -> Option<&'a T> {
    if items.is_empty() {
        return None;
    }
    let index = chooser.choose_index(items.len()).min(items.len() - 1);
    items.get(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(usize);

    impl Chooser for Fixed {
        fn choose_index(&self, _len: usize) -> usize {
            self.0
        }
    }

    #[test]
    fn test_pick_empty_returns_none() {
        let items: [u8; 0] = [];
        assert_eq!(pick(&RandomChooser, &items), None);
    }

    #[test]
    fn test_pick_clamps_out_of_range_index() {
        let items = ["a", "b"];
        assert_eq!(pick(&Fixed(7), &items), Some(&"b"));
    }

    #[test]
    fn test_random_chooser_stays_in_range() {
        let items = [1, 2, 3];
        for _ in 0..50 {
            assert!(pick(&RandomChooser, &items).is_some());
        }
    }
}
