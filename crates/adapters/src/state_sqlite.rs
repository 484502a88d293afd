//! SQLite working set store implementation

use async_trait::async_trait;
use reposter_domain::{Fingerprint, ImageHash, StateError, WorkingSet, WorkingSetStore};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::collections::VecDeque;
use std::path::Path;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// SQLite-backed working set store
pub struct SqliteWorkingSetStore {
    pool: SqlitePool,
}

type WorkingSetRow = (String, String, i64, String, String, i64, Option<String>);

impl SqliteWorkingSetStore {
    /// Create a new SQLite store, initializing the database if needed
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, StateError> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StateError::Database(format!("Failed to create directory: {}", e)))?;
        }

        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await
            .map_err(|e| StateError::Database(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing)
    pub async fn in_memory() -> Result<Self, StateError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StateError::Database(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StateError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS working_sets (
                tenant TEXT NOT NULL,
                theme TEXT NOT NULL,
                history_limit INTEGER NOT NULL,
                fingerprints TEXT NOT NULL,
                image_hashes TEXT NOT NULL,
                version INTEGER NOT NULL,
                updated_at TEXT,
                PRIMARY KEY (tenant, theme)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StateError::Database(e.to_string()))?;

        Ok(())
    }

    async fn stored_version(&self, tenant: &str, theme: &str) -> Result<u64, StateError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT version FROM working_sets WHERE tenant = ? AND theme = ?")
                .bind(tenant)
                .bind(theme)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StateError::Database(e.to_string()))?;

        Ok(row.map(|(v,)| v.max(0) as u64).unwrap_or(0))
    }
}

fn decode_row(row: WorkingSetRow) -> Result<WorkingSet, StateError> {
    let (tenant, theme, history_limit, fingerprints, image_hashes, version, updated_at) = row;

    let fingerprints: VecDeque<Fingerprint> = serde_json::from_str(&fingerprints)
        .map_err(|e| StateError::Serialization(e.to_string()))?;
    let image_hashes: VecDeque<ImageHash> = serde_json::from_str(&image_hashes)
        .map_err(|e| StateError::Serialization(e.to_string()))?;
    let updated_at = updated_at
        .map(|s| OffsetDateTime::parse(&s, &Rfc3339))
        .transpose()
        .map_err(|e| StateError::Serialization(e.to_string()))?;

    Ok(WorkingSet {
        tenant,
        theme,
        history_limit: history_limit.max(0) as usize,
        fingerprints,
        image_hashes,
        version: version.max(0) as u64,
        updated_at,
    })
}

#[async_trait]
impl WorkingSetStore for SqliteWorkingSetStore {
    async fn load(
        &self,
        tenant: &str,
        theme: &str,
        history_limit: usize,
    ) -> Result<WorkingSet, StateError> {
        let row: Option<WorkingSetRow> = sqlx::query_as(
            r#"
            SELECT tenant, theme, history_limit, fingerprints, image_hashes, version, updated_at
            FROM working_sets
            WHERE tenant = ? AND theme = ?
            "#,
        )
        .bind(tenant)
        .bind(theme)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StateError::Database(e.to_string()))?;

        match row {
            Some(row) => Ok(decode_row(row)?.with_limit(history_limit)),
            None => Ok(WorkingSet::empty(tenant, theme, history_limit)),
        }
    }

    async fn save(&self, working_set: &WorkingSet) -> Result<u64, StateError> {
        let fingerprints = serde_json::to_string(&working_set.fingerprints)
            .map_err(|e| StateError::Serialization(e.to_string()))?;
        let image_hashes = serde_json::to_string(&working_set.image_hashes)
            .map_err(|e| StateError::Serialization(e.to_string()))?;
        let updated_at = working_set
            .updated_at
            .map(|t| t.format(&Rfc3339))
            .transpose()
            .map_err(|e| StateError::Serialization(e.to_string()))?;
        let expected = working_set.version;
        let next = expected + 1;

        // Compare-and-set on the version column
        let result = if expected == 0 {
            sqlx::query(
                r#"
                INSERT INTO working_sets
                (tenant, theme, history_limit, fingerprints, image_hashes, version, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(tenant, theme) DO NOTHING
                "#,
            )
            .bind(&working_set.tenant)
            .bind(&working_set.theme)
            .bind(working_set.history_limit as i64)
            .bind(&fingerprints)
            .bind(&image_hashes)
            .bind(next as i64)
            .bind(&updated_at)
            .execute(&self.pool)
            .await
        } else {
            sqlx::query(
                r#"
                UPDATE working_sets
                SET history_limit = ?, fingerprints = ?, image_hashes = ?, version = ?, updated_at = ?
                WHERE tenant = ? AND theme = ? AND version = ?
                "#,
            )
            .bind(working_set.history_limit as i64)
            .bind(&fingerprints)
            .bind(&image_hashes)
            .bind(next as i64)
            .bind(&updated_at)
            .bind(&working_set.tenant)
            .bind(&working_set.theme)
            .bind(expected as i64)
            .execute(&self.pool)
            .await
        }
        .map_err(|e| StateError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            let found = self
                .stored_version(&working_set.tenant, &working_set.theme)
                .await?;
            return Err(StateError::VersionConflict { expected, found });
        }

        tracing::debug!(
            tenant = %working_set.tenant,
            theme = %working_set.theme,
            version = next,
            "Saved working set"
        );
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn fp(value: &str) -> Fingerprint {
        Fingerprint(value.to_string())
    }

    #[tokio::test]
    async fn test_missing_working_set_is_empty() {
        let store = SqliteWorkingSetStore::in_memory().await.unwrap();

        let ws = store.load("riverside", "news", 20).await.unwrap();

        assert_eq!(ws.version, 0);
        assert_eq!(ws.history_limit, 20);
        assert!(ws.fingerprints.is_empty());
    }

    #[tokio::test]
    async fn test_working_set_roundtrip() {
        let store = SqliteWorkingSetStore::in_memory().await.unwrap();

        let mut ws = store.load("riverside", "news", 20).await.unwrap();
        ws.record(fp("100_1"), Some(ImageHash("abc".to_string())));
        ws.updated_at = Some(datetime!(2024-05-01 12:00 UTC));
        assert_eq!(store.save(&ws).await.unwrap(), 1);

        let loaded = store.load("riverside", "news", 20).await.unwrap();

        assert_eq!(loaded.version, 1);
        assert!(loaded.contains_fingerprint(&fp("100_1")));
        assert!(loaded.contains_image_hash(&ImageHash("abc".to_string())));
        assert_eq!(loaded.updated_at, ws.updated_at);
    }

    #[tokio::test]
    async fn test_stale_version_is_rejected() {
        let store = SqliteWorkingSetStore::in_memory().await.unwrap();

        let first = store.load("riverside", "news", 20).await.unwrap();
        let mut second = first.clone();

        let mut first = first;
        first.record_fingerprint(fp("a"));
        store.save(&first).await.unwrap();

        second.record_fingerprint(fp("b"));
        let err = store.save(&second).await.unwrap_err();

        assert!(matches!(
            err,
            StateError::VersionConflict {
                expected: 0,
                found: 1
            }
        ));

        let mut reloaded = store.load("riverside", "news", 20).await.unwrap();
        reloaded.record_fingerprint(fp("b"));
        assert_eq!(store.save(&reloaded).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_load_trims_to_smaller_limit() {
        let store = SqliteWorkingSetStore::in_memory().await.unwrap();

        let mut ws = store.load("riverside", "news", 10).await.unwrap();
        for marker in ["m1", "m2", "m3", "m4"] {
            ws.record_fingerprint(fp(marker));
        }
        store.save(&ws).await.unwrap();

        let loaded = store.load("riverside", "news", 2).await.unwrap();

        let remaining: Vec<_> = loaded.fingerprints.iter().map(|f| f.0.as_str()).collect();
        assert_eq!(remaining, vec!["m3", "m4"]);
    }

    #[tokio::test]
    async fn test_pairs_are_isolated() {
        let store = SqliteWorkingSetStore::in_memory().await.unwrap();

        let mut news = store.load("riverside", "news", 10).await.unwrap();
        news.record_fingerprint(fp("shared"));
        store.save(&news).await.unwrap();

        let other = store.load("hillside", "news", 10).await.unwrap();

        assert!(!other.contains_fingerprint(&fp("shared")));
        assert_eq!(other.version, 0);
    }
}
