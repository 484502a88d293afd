//! In-memory working set store for testing and offline mode

use async_trait::async_trait;
use reposter_domain::{StateError, TenantThemeKey, WorkingSet, WorkingSetStore};
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory working set store implementation
pub struct InMemoryWorkingSetStore {
    sets: RwLock<HashMap<TenantThemeKey, WorkingSet>>,
}

impl InMemoryWorkingSetStore {
    pub fn new() -> Self {
        Self {
            sets: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryWorkingSetStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkingSetStore for InMemoryWorkingSetStore {
    async fn load(
        &self,
        tenant: &str,
        theme: &str,
        history_limit: usize,
    ) -> Result<WorkingSet, StateError> {
        let sets = self
            .sets
            .read()
            .map_err(|e| StateError::Database(e.to_string()))?;
        Ok(sets
            .get(&TenantThemeKey::new(tenant, theme))
            .cloned()
            .map(|ws| ws.with_limit(history_limit))
            .unwrap_or_else(|| WorkingSet::empty(tenant, theme, history_limit)))
    }

    async fn save(&self, working_set: &WorkingSet) -> Result<u64, StateError> {
        let mut sets = self
            .sets
            .write()
            .map_err(|e| StateError::Database(e.to_string()))?;
        let key = TenantThemeKey::new(&working_set.tenant, &working_set.theme);

        let found = sets.get(&key).map(|ws| ws.version).unwrap_or(0);
        if found != working_set.version {
            return Err(StateError::VersionConflict {
                expected: working_set.version,
                found,
            });
        }

        let mut stored = working_set.clone();
        stored.version = found + 1;
        sets.insert(key, stored);
        Ok(found + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reposter_domain::Fingerprint;

    #[tokio::test]
    async fn test_save_bumps_version() {
        let store = InMemoryWorkingSetStore::new();

        let mut ws = store.load("riverside", "news", 5).await.unwrap();
        ws.record_fingerprint(Fingerprint("1_1".to_string()));

        assert_eq!(store.save(&ws).await.unwrap(), 1);
        let loaded = store.load("riverside", "news", 5).await.unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.fingerprints.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_writer_conflicts() {
        let store = InMemoryWorkingSetStore::new();
        let a = store.load("riverside", "news", 5).await.unwrap();
        let b = a.clone();

        store.save(&a).await.unwrap();

        assert!(matches!(
            store.save(&b).await,
            Err(StateError::VersionConflict {
                expected: 0,
                found: 1
            })
        ));
    }
}
