use super::schema::Database;
use super::types::{DatabaseError, Setting};

impl Database {
    // ========================================================================
    // Scheduler Setting Operations
    // ========================================================================

    /// All settings, ordered by name.
    pub async fn get_all_settings(&self) -> Result<Vec<Setting>, DatabaseError> {
        let rows: Vec<Setting> =
            sqlx::query_as("SELECT name, value FROM scheduler_settings ORDER BY name")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows)
    }

    /// Get a single setting value by name.
    ///
    /// Names are namespaced per job: `FeedRefresh.FastRefreshInterval`,
    /// `ArticlePurging.LastRunDateTime`, etc.
    pub async fn find_setting(&self, name: &str) -> Result<Option<String>, DatabaseError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM scheduler_settings WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(value,)| value))
    }

    /// Set a setting value (UPSERT).
    pub async fn add_or_update_setting(&self, name: &str, value: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO scheduler_settings (name, value, updated_at)
            VALUES (?, ?, datetime('now'))
            ON CONFLICT(name) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
        )
        .bind(name)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
