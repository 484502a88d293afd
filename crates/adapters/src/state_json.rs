//! JSON file working set store, one file per (tenant, theme)

use async_trait::async_trait;
use reposter_domain::{StateError, WorkingSet, WorkingSetStore};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

/// Stores each working set at `<dir>/<tenant>/<theme>.json`
pub struct JsonWorkingSetStore {
    dir: PathBuf,
    // Serializes read-compare-write within this process
    lock: Mutex<()>,
}

impl JsonWorkingSetStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, tenant: &str, theme: &str) -> PathBuf {
        self.dir.join(tenant).join(format!("{}.json", theme))
    }

    async fn read(&self, path: &Path) -> Result<Option<WorkingSet>, StateError> {
        match fs::read_to_string(path).await {
            Ok(contents) => serde_json::from_str(&contents)
                .map(Some)
                .map_err(|e| StateError::Serialization(format!("{}: {}", path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StateError::Database(format!("{}: {}", path.display(), e))),
        }
    }
}

#[async_trait]
impl WorkingSetStore for JsonWorkingSetStore {
    async fn load(
        &self,
        tenant: &str,
        theme: &str,
        history_limit: usize,
    ) -> Result<WorkingSet, StateError> {
        let path = self.path_for(tenant, theme);
        Ok(self
            .read(&path)
            .await?
            .map(|ws| ws.with_limit(history_limit))
            .unwrap_or_else(|| WorkingSet::empty(tenant, theme, history_limit)))
    }

    async fn save(&self, working_set: &WorkingSet) -> Result<u64, StateError> {
        let _guard = self.lock.lock().await;
        let path = self.path_for(&working_set.tenant, &working_set.theme);

        let found = self
            .read(&path)
            .await?
            .map(|ws| ws.version)
            .unwrap_or(0);
        if found != working_set.version {
            return Err(StateError::VersionConflict {
                expected: working_set.version,
                found,
            });
        }

        let mut stored = working_set.clone();
        stored.version = found + 1;
        let json = serde_json::to_string_pretty(&stored)
            .map_err(|e| StateError::Serialization(e.to_string()))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StateError::Database(format!("Failed to create directory: {}", e)))?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .await
            .map_err(|e| StateError::Database(e.to_string()))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| StateError::Database(e.to_string()))?;

        Ok(stored.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reposter_domain::{Fingerprint, ImageHash};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_writes_per_theme_file() {
        let dir = TempDir::new().unwrap();
        let store = JsonWorkingSetStore::new(dir.path());

        let mut ws = store.load("riverside", "news", 10).await.unwrap();
        ws.record(
            Fingerprint("100_1".to_string()),
            Some(ImageHash("h1".to_string())),
        );
        store.save(&ws).await.unwrap();

        let path = dir.path().join("riverside").join("news.json");
        assert!(path.exists());
        assert!(!dir.path().join("riverside").join("news.json.tmp").exists());

        let loaded = store.load("riverside", "news", 10).await.unwrap();
        assert_eq!(loaded.version, 1);
        assert!(loaded.contains_fingerprint(&Fingerprint("100_1".to_string())));
        assert!(loaded.contains_image_hash(&ImageHash("h1".to_string())));
    }

    #[tokio::test]
    async fn test_stale_save_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = JsonWorkingSetStore::new(dir.path());

        let ws = store.load("riverside", "news", 10).await.unwrap();
        store.save(&ws).await.unwrap();

        assert!(matches!(
            store.save(&ws).await,
            Err(StateError::VersionConflict {
                expected: 0,
                found: 1
            })
        ));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_a_serialization_error() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("riverside")).unwrap();
        std::fs::write(dir.path().join("riverside").join("news.json"), "{not json").unwrap();
        let store = JsonWorkingSetStore::new(dir.path());

        assert!(matches!(
            store.load("riverside", "news", 10).await,
            Err(StateError::Serialization(_))
        ));
    }
}
