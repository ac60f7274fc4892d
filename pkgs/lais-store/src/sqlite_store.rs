//! SQLite-backed durable store

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, Database, DatabaseConnection, EntityTrait, QuerySelect, Set,
};
use sea_orm_migration::MigratorTrait;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::entities::kv_entries;
use crate::error::StoreError;
use crate::storage::DurableStore;
use crate::StoreConfig;

/// Durable store persisted in a SQLite database through Sea-ORM
pub struct SqliteStore {
    db: DatabaseConnection,
    max_bytes: Option<usize>,
}

impl SqliteStore {
    /// Open (or create) a store at `db_path` with the default quota
    pub async fn open(db_path: PathBuf) -> Result<Self, StoreError> {
        Self::with_config(StoreConfig {
            db_path,
            ..Default::default()
        })
        .await
    }

    /// Open a store with a custom config
    pub async fn with_config(config: StoreConfig) -> Result<Self, StoreError> {
        let db_path_str = config
            .db_path
            .to_str()
            .ok_or_else(|| StoreError::InvalidPath(config.db_path.display().to_string()))?
            .replace("\\", "/");

        let db_url = format!("sqlite:{}?mode=rwc", db_path_str);
        let db = Database::connect(db_url.as_str()).await?;

        let store = Self::with_connection(db, config.max_bytes).await?;
        info!("Durable store initialized at {}", config.db_path.display());
        Ok(store)
    }

    /// Create a store on an existing connection, running migrations first
    pub async fn with_connection(
        db: DatabaseConnection,
        max_bytes: Option<usize>,
    ) -> Result<Self, StoreError> {
        crate::migration::Migrator::up(&db, None).await?;
        Ok(Self { db, max_bytes })
    }

    async fn bytes_used_excluding(&self, key: &str) -> Result<usize, StoreError> {
        let rows: Vec<(String, String)> = kv_entries::Entity::find()
            .select_only()
            .column(kv_entries::Column::Key)
            .column(kv_entries::Column::Value)
            .into_tuple()
            .all(&self.db)
            .await?;

        Ok(rows
            .iter()
            .filter(|(k, _)| k != key)
            .map(|(k, v)| k.len() + v.len())
            .sum())
    }
}

#[async_trait]
impl DurableStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        debug!("Getting stored value: {}", key);

        let model = kv_entries::Entity::find_by_id(key.to_string())
            .one(&self.db)
            .await?;

        Ok(model.map(|m| m.value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        debug!("Storing value: {}", key);

        if let Some(limit) = self.max_bytes {
            let needed = self.bytes_used_excluding(key).await? + key.len() + value.len();
            if needed > limit {
                return Err(StoreError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    limit,
                });
            }
        }

        let now = chrono::Utc::now().timestamp_millis();
        let existing = kv_entries::Entity::find_by_id(key.to_string())
            .one(&self.db)
            .await?;

        if let Some(model) = existing {
            let mut active: kv_entries::ActiveModel = model.into();
            active.value = Set(value.to_string());
            active.updated_at = Set(now);
            active.update(&self.db).await?;
        } else {
            let entry = kv_entries::ActiveModel {
                key: Set(key.to_string()),
                value: Set(value.to_string()),
                updated_at: Set(now),
            };
            kv_entries::Entity::insert(entry)
                .exec_without_returning(&self.db)
                .await?;
        }

        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, StoreError> {
        debug!("Removing stored value: {}", key);

        let result = kv_entries::Entity::delete_by_id(key.to_string())
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let keys: Vec<String> = kv_entries::Entity::find()
            .select_only()
            .column(kv_entries::Column::Key)
            .into_tuple()
            .all(&self.db)
            .await?;

        Ok(keys)
    }
}
