// SQLite-backed automod config store.
//
// Tables:
// - automod_config: One JSON document per guild

use crate::core::automod::{AutomodConfig, AutomodConfigStore, StoreError};
use async_trait::async_trait;
use sqlx::{Pool, Row, Sqlite};

pub struct SqliteAutomodStore {
    pool: Pool<Sqlite>,
}

impl SqliteAutomodStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Run database migrations to create required tables.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS automod_config (
                guild_id INTEGER PRIMARY KEY,
                config TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl AutomodConfigStore for SqliteAutomodStore {
    async fn load(&self, guild_id: u64) -> Result<AutomodConfig, StoreError> {
        let row = sqlx::query("SELECT config FROM automod_config WHERE guild_id = ?")
            .bind(guild_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::StorageError(e.to_string()))?;

        match row {
            Some(row) => {
                let raw: String = row.get("config");
                Ok(serde_json::from_str(&raw)?)
            }
            None => Ok(AutomodConfig::default()),
        }
    }

    async fn save(&self, guild_id: u64, config: &AutomodConfig) -> Result<(), StoreError> {
        let raw = serde_json::to_string(config)?;

        sqlx::query(
            r#"
            INSERT INTO automod_config (guild_id, config, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(guild_id) DO UPDATE SET
                config = excluded.config,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(guild_id as i64)
        .bind(raw)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::StorageError(e.to_string()))?;

        Ok(())
    }
}
