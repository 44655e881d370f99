use chrono::{DateTime, Utc};
use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{to_unix, DatabaseError, FeedSource, FeedSourceRow};

const FEED_SOURCE_COLUMNS: &str =
    "id, uri, link, last_updated, last_refresh_success, last_refresh_message, decode_body";

impl Database {
    // ========================================================================
    // Feed Source Operations
    // ========================================================================

    pub async fn get_feed_source_by_id(&self, id: i64) -> Result<Option<FeedSource>, DatabaseError> {
        let row: Option<FeedSourceRow> = sqlx::query_as(&format!(
            "SELECT {} FROM feed_sources WHERE id = ?",
            FEED_SOURCE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(FeedSourceRow::into_feed_source))
    }

    pub async fn get_feed_source_by_uri(
        &self,
        uri: &str,
    ) -> Result<Option<FeedSource>, DatabaseError> {
        let row: Option<FeedSourceRow> = sqlx::query_as(&format!(
            "SELECT {} FROM feed_sources WHERE uri = ?",
            FEED_SOURCE_COLUMNS
        ))
        .bind(uri)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(FeedSourceRow::into_feed_source))
    }

    /// Create a feed source for `uri`.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::FeedSourceExists` if the uri is already stored.
    pub async fn create_feed_source(
        &self,
        uri: &str,
        link: Option<&str>,
    ) -> Result<FeedSource, DatabaseError> {
        let result = sqlx::query_as::<_, FeedSourceRow>(&format!(
            "INSERT INTO feed_sources (uri, link) VALUES (?, ?) RETURNING {}",
            FEED_SOURCE_COLUMNS
        ))
        .bind(uri)
        .bind(link)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => {
                tracing::debug!(feed_source_id = row.id, uri = %uri, "Created feed source");
                Ok(row.into_feed_source())
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(DatabaseError::FeedSourceExists(uri.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch several feed sources at once. Unknown ids are ignored.
    pub async fn get_feed_sources_by_ids(
        &self,
        ids: &[i64],
    ) -> Result<Vec<FeedSource>, DatabaseError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(format!(
            "SELECT {} FROM feed_sources WHERE id IN (",
            FEED_SOURCE_COLUMNS
        ));
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY id");

        let rows: Vec<FeedSourceRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(FeedSourceRow::into_feed_source).collect())
    }

    /// Feed sources whose `last_updated` is at or after `since`.
    ///
    /// `None` selects every feed source, including ones never updated.
    pub async fn find_feed_sources_updated_since(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<FeedSource>, DatabaseError> {
        let rows: Vec<FeedSourceRow> = match to_unix(since) {
            Some(since) => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM feed_sources WHERE last_updated >= ? ORDER BY id",
                    FEED_SOURCE_COLUMNS
                ))
                .bind(since)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM feed_sources ORDER BY id",
                    FEED_SOURCE_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows.into_iter().map(FeedSourceRow::into_feed_source).collect())
    }

    /// Delete feed sources nobody subscribes to. Returns the number removed.
    pub async fn remove_feed_sources_without_subscription(&self) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "DELETE FROM feed_sources WHERE id NOT IN (SELECT feed_source_id FROM subscriptions)",
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Set the decode-body flag, writing only when it changes.
    ///
    /// Returns the feed source after the update, or `None` for an unknown id.
    pub async fn update_decode_body(
        &self,
        id: i64,
        decode_body: bool,
    ) -> Result<Option<FeedSource>, DatabaseError> {
        let Some(mut source) = self.get_feed_source_by_id(id).await? else {
            return Ok(None);
        };

        if source.decode_body != decode_body {
            sqlx::query("UPDATE feed_sources SET decode_body = ? WHERE id = ?")
                .bind(decode_body)
                .bind(id)
                .execute(&self.pool)
                .await?;
            source.decode_body = decode_body;
        }

        Ok(Some(source))
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, DatabaseError, PendingChanges};
    use chrono::{Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get_feed_source() {
        let db = test_db().await;
        let created = db
            .create_feed_source("https://example.com/feed.xml", Some("https://example.com/"))
            .await
            .unwrap();

        assert_eq!(created.uri, "https://example.com/feed.xml");
        assert_eq!(created.link.as_deref(), Some("https://example.com/"));
        assert_eq!(created.last_updated, None);
        assert!(!created.last_refresh_success);
        assert_eq!(created.last_refresh_message, "");
        assert!(!created.decode_body);

        let by_id = db.get_feed_source_by_id(created.id).await.unwrap();
        assert_eq!(by_id.as_ref(), Some(&created));

        let by_uri = db
            .get_feed_source_by_uri("https://example.com/feed.xml")
            .await
            .unwrap();
        assert_eq!(by_uri, Some(created));
    }

    #[tokio::test]
    async fn test_get_missing_feed_source() {
        let db = test_db().await;
        assert_eq!(db.get_feed_source_by_id(42).await.unwrap(), None);
        assert_eq!(db.get_feed_source_by_uri("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_create_duplicate_uri_rejected() {
        let db = test_db().await;
        db.create_feed_source("https://a.example/rss", None)
            .await
            .unwrap();

        let err = db
            .create_feed_source("https://a.example/rss", None)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::FeedSourceExists(uri) if uri == "https://a.example/rss"));
    }

    #[tokio::test]
    async fn test_get_feed_sources_by_ids() {
        let db = test_db().await;
        let a = db.create_feed_source("https://a.example/", None).await.unwrap();
        let _b = db.create_feed_source("https://b.example/", None).await.unwrap();
        let c = db.create_feed_source("https://c.example/", None).await.unwrap();

        let found = db.get_feed_sources_by_ids(&[c.id, a.id, 999]).await.unwrap();
        let uris: Vec<&str> = found.iter().map(|s| s.uri.as_str()).collect();
        assert_eq!(uris, vec!["https://a.example/", "https://c.example/"]);

        assert!(db.get_feed_sources_by_ids(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_find_feed_sources_updated_since() {
        let db = test_db().await;
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

        let mut recent = db.create_feed_source("https://recent.example/", None).await.unwrap();
        let mut stale = db.create_feed_source("https://stale.example/", None).await.unwrap();
        let _never = db.create_feed_source("https://never.example/", None).await.unwrap();

        recent.last_updated = Some(now - Duration::hours(1));
        stale.last_updated = Some(now - Duration::days(5));
        let mut pending = PendingChanges::new();
        pending.feed_source(recent.clone());
        pending.feed_source(stale);
        db.commit_changes(pending).await.unwrap();

        let since_two_hours = db
            .find_feed_sources_updated_since(Some(now - Duration::hours(2)))
            .await
            .unwrap();
        assert_eq!(since_two_hours, vec![recent]);

        // boundary is inclusive
        let at_boundary = db
            .find_feed_sources_updated_since(Some(now - Duration::hours(1)))
            .await
            .unwrap();
        assert_eq!(at_boundary.len(), 1);

        let all = db.find_feed_sources_updated_since(None).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_remove_feed_sources_without_subscription() {
        let db = test_db().await;
        let kept = db.create_feed_source("https://kept.example/", None).await.unwrap();
        let orphan = db.create_feed_source("https://orphan.example/", None).await.unwrap();
        db.create_subscription(1, kept.id, "Kept", None).await.unwrap();

        let removed = db.remove_feed_sources_without_subscription().await.unwrap();
        assert_eq!(removed, 1);
        assert!(db.get_feed_source_by_id(kept.id).await.unwrap().is_some());
        assert!(db.get_feed_source_by_id(orphan.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_decode_body() {
        let db = test_db().await;
        let source = db.create_feed_source("https://a.example/", None).await.unwrap();

        let updated = db.update_decode_body(source.id, true).await.unwrap().unwrap();
        assert!(updated.decode_body);
        let stored = db.get_feed_source_by_id(source.id).await.unwrap().unwrap();
        assert!(stored.decode_body);

        // unchanged flag is returned as-is
        let again = db.update_decode_body(source.id, true).await.unwrap().unwrap();
        assert!(again.decode_body);

        assert_eq!(db.update_decode_body(999, true).await.unwrap(), None);
    }
}
