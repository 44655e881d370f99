use super::schema::Database;
use super::types::DatabaseError;

impl Database {
    // ========================================================================
    // Subscription / Read Marker Operations
    // ========================================================================

    /// Subscribe a user to a feed source. Returns the subscription id.
    pub async fn create_subscription(
        &self,
        user_account_id: i64,
        feed_source_id: i64,
        name: &str,
        group_name: Option<&str>,
    ) -> Result<i64, DatabaseError> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO subscriptions (user_account_id, feed_source_id, name, group_name)
            VALUES (?, ?, ?, ?)
            RETURNING id
        "#,
        )
        .bind(user_account_id)
        .bind(feed_source_id)
        .bind(name)
        .bind(group_name)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    /// Remove a subscription. Returns false when it did not exist.
    ///
    /// The feed source itself stays until the orphan purge runs.
    pub async fn remove_subscription(&self, subscription_id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE id = ?")
            .bind(subscription_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record that a user read an article. Marking twice is a no-op.
    pub async fn mark_article_read(
        &self,
        user_account_id: i64,
        article_id: i64,
    ) -> Result<(), DatabaseError> {
        sqlx::query("INSERT OR IGNORE INTO article_reads (user_account_id, article_id) VALUES (?, ?)")
            .bind(user_account_id)
            .bind(article_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
