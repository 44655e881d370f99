use super::schema::Database;
use super::types::{to_unix, Article, ArticleDbRow, DatabaseError, NewArticle, PurgedArticles};

const ARTICLE_COLUMNS: &str = "id, feed_source_id, guid, heading, body, url, author, published";

impl Database {
    // ========================================================================
    // Article Operations
    // ========================================================================

    pub async fn get_article_by_id(&self, article_id: i64) -> Result<Option<Article>, DatabaseError> {
        let row: Option<ArticleDbRow> = sqlx::query_as(&format!(
            "SELECT {} FROM articles WHERE id = ?",
            ARTICLE_COLUMNS
        ))
        .bind(article_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ArticleDbRow::into_article))
    }

    /// All articles of a feed source, newest first.
    ///
    /// With `excluding_read_by`, articles that user has already read are left out.
    pub async fn get_articles_for_feed_source(
        &self,
        feed_source_id: i64,
        excluding_read_by: Option<i64>,
    ) -> Result<Vec<Article>, DatabaseError> {
        let rows: Vec<ArticleDbRow> = match excluding_read_by {
            Some(user_account_id) => {
                sqlx::query_as(&format!(
                    r#"
                    SELECT {} FROM articles
                    WHERE feed_source_id = ?
                      AND id NOT IN (SELECT article_id FROM article_reads WHERE user_account_id = ?)
                    ORDER BY published DESC, id DESC
                "#,
                    ARTICLE_COLUMNS
                ))
                .bind(feed_source_id)
                .bind(user_account_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM articles WHERE feed_source_id = ? ORDER BY published DESC, id DESC",
                    ARTICLE_COLUMNS
                ))
                .bind(feed_source_id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows.into_iter().map(ArticleDbRow::into_article).collect())
    }

    /// Insert a single article outside of a refresh tick.
    pub async fn create_article(&self, article: &NewArticle) -> Result<Article, DatabaseError> {
        let row: ArticleDbRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO articles (feed_source_id, guid, heading, body, url, author, published)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING {}
        "#,
            ARTICLE_COLUMNS
        ))
        .bind(article.feed_source_id)
        .bind(&article.guid)
        .bind(&article.heading)
        .bind(&article.body)
        .bind(&article.url)
        .bind(&article.author)
        .bind(to_unix(article.published))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into_article())
    }

    /// Articles the user has not read in a feed source they subscribe to.
    ///
    /// Empty when the user has no subscription to the feed source.
    pub async fn find_unread_articles_in_feed(
        &self,
        user_account_id: i64,
        feed_source_id: i64,
    ) -> Result<Vec<Article>, DatabaseError> {
        let rows: Vec<ArticleDbRow> = sqlx::query_as(
            r#"
            SELECT a.id, a.feed_source_id, a.guid, a.heading, a.body, a.url, a.author, a.published
            FROM articles a
            WHERE a.feed_source_id = ?
              AND EXISTS (
                  SELECT 1 FROM subscriptions s
                  WHERE s.feed_source_id = a.feed_source_id AND s.user_account_id = ?
              )
              AND NOT EXISTS (
                  SELECT 1 FROM article_reads r
                  WHERE r.article_id = a.id AND r.user_account_id = ?
              )
            ORDER BY a.published DESC, a.id DESC
        "#,
        )
        .bind(feed_source_id)
        .bind(user_account_id)
        .bind(user_account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ArticleDbRow::into_article).collect())
    }

    // ========================================================================
    // Purge Operations
    // ========================================================================

    /// Trim every feed source to its `cap` newest articles.
    ///
    /// Articles are ranked by `published` descending, then `id` descending;
    /// a missing `published` sorts as the oldest. Read markers pointing at
    /// removed articles are deleted in the same transaction.
    pub async fn remove_articles_over_count(
        &self,
        cap: u32,
    ) -> Result<PurgedArticles, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let articles = sqlx::query(
            r#"
            DELETE FROM articles WHERE id IN (
                SELECT id FROM (
                    SELECT id, ROW_NUMBER() OVER (
                        PARTITION BY feed_source_id
                        ORDER BY published DESC, id DESC
                    ) AS position
                    FROM articles
                )
                WHERE position > ?
            )
        "#,
        )
        .bind(i64::from(cap))
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let read_markers = sqlx::query(
            "DELETE FROM article_reads WHERE article_id NOT IN (SELECT id FROM articles)",
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        Ok(PurgedArticles {
            articles,
            read_markers,
        })
    }

    /// Delete articles whose feed source no longer exists.
    pub async fn remove_orphaned_articles(&self) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "DELETE FROM articles WHERE feed_source_id NOT IN (SELECT id FROM feed_sources)",
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, DatabaseError, NewArticle};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn test_article(feed_source_id: i64, guid: &str, hours: i64) -> NewArticle {
        NewArticle {
            feed_source_id,
            guid: guid.to_string(),
            heading: Some(format!("Heading {}", guid)),
            body: Some("Body".to_string()),
            url: Some(format!("https://example.com/{}", guid)),
            author: None,
            published: Some(base_time() + Duration::hours(hours)),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_article() {
        let db = test_db().await;
        let source = db.create_feed_source("https://a.example/", None).await.unwrap();

        let created = db.create_article(&test_article(source.id, "g1", 1)).await.unwrap();
        assert_eq!(created.guid, "g1");
        assert_eq!(created.published, Some(base_time() + Duration::hours(1)));

        let fetched = db.get_article_by_id(created.id).await.unwrap();
        assert_eq!(fetched, Some(created));
        assert_eq!(db.get_article_by_id(999).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_duplicate_identity_rejected() {
        let db = test_db().await;
        let source = db.create_feed_source("https://a.example/", None).await.unwrap();
        db.create_article(&test_article(source.id, "g1", 1)).await.unwrap();

        let err = db
            .create_article(&test_article(source.id, "g1", 2))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Other(_)));
    }

    #[tokio::test]
    async fn test_get_articles_for_feed_source_newest_first() {
        let db = test_db().await;
        let source = db.create_feed_source("https://a.example/", None).await.unwrap();
        let other = db.create_feed_source("https://b.example/", None).await.unwrap();
        for (guid, hours) in [("old", 1), ("new", 3), ("mid", 2)] {
            db.create_article(&test_article(source.id, guid, hours)).await.unwrap();
        }
        db.create_article(&test_article(other.id, "elsewhere", 5)).await.unwrap();

        let articles = db.get_articles_for_feed_source(source.id, None).await.unwrap();
        let guids: Vec<&str> = articles.iter().map(|a| a.guid.as_str()).collect();
        assert_eq!(guids, vec!["new", "mid", "old"]);
    }

    #[tokio::test]
    async fn test_get_articles_excluding_read() {
        let db = test_db().await;
        let source = db.create_feed_source("https://a.example/", None).await.unwrap();
        let read = db.create_article(&test_article(source.id, "read", 1)).await.unwrap();
        db.create_article(&test_article(source.id, "unread", 2)).await.unwrap();
        db.mark_article_read(7, read.id).await.unwrap();

        let for_user = db.get_articles_for_feed_source(source.id, Some(7)).await.unwrap();
        assert_eq!(for_user.len(), 1);
        assert_eq!(for_user[0].guid, "unread");

        // another user's read markers don't apply
        let for_other = db.get_articles_for_feed_source(source.id, Some(8)).await.unwrap();
        assert_eq!(for_other.len(), 2);
    }

    #[tokio::test]
    async fn test_find_unread_articles_requires_subscription() {
        let db = test_db().await;
        let source = db.create_feed_source("https://a.example/", None).await.unwrap();
        let read = db.create_article(&test_article(source.id, "read", 1)).await.unwrap();
        db.create_article(&test_article(source.id, "unread", 2)).await.unwrap();
        db.mark_article_read(7, read.id).await.unwrap();

        assert!(db.find_unread_articles_in_feed(7, source.id).await.unwrap().is_empty());

        db.create_subscription(7, source.id, "A", Some("News")).await.unwrap();
        let unread = db.find_unread_articles_in_feed(7, source.id).await.unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].guid, "unread");
    }

    #[tokio::test]
    async fn test_remove_articles_over_count_keeps_newest() {
        let db = test_db().await;
        let source = db.create_feed_source("https://a.example/", None).await.unwrap();
        let small = db.create_feed_source("https://b.example/", None).await.unwrap();

        for i in 0..7 {
            db.create_article(&test_article(source.id, &format!("g{}", i), i))
                .await
                .unwrap();
        }
        db.create_article(&test_article(small.id, "only", 0)).await.unwrap();

        let purged = db.remove_articles_over_count(4).await.unwrap();
        assert_eq!(purged.articles, 3);

        let remaining = db.get_articles_for_feed_source(source.id, None).await.unwrap();
        let guids: Vec<&str> = remaining.iter().map(|a| a.guid.as_str()).collect();
        assert_eq!(guids, vec!["g6", "g5", "g4", "g3"]);

        // feeds under the cap are untouched
        assert_eq!(db.get_articles_for_feed_source(small.id, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_articles_over_count_ties_broken_by_id() {
        let db = test_db().await;
        let source = db.create_feed_source("https://a.example/", None).await.unwrap();
        let first = db.create_article(&test_article(source.id, "first", 1)).await.unwrap();
        let second = db.create_article(&test_article(source.id, "second", 1)).await.unwrap();
        let mut undated = test_article(source.id, "undated", 0);
        undated.published = None;
        db.create_article(&undated).await.unwrap();

        db.remove_articles_over_count(1).await.unwrap();

        let remaining = db.get_articles_for_feed_source(source.id, None).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, second.id);
        assert!(db.get_article_by_id(first.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_articles_over_count_drops_dangling_read_markers() {
        let db = test_db().await;
        let source = db.create_feed_source("https://a.example/", None).await.unwrap();
        let old = db.create_article(&test_article(source.id, "old", 1)).await.unwrap();
        let new = db.create_article(&test_article(source.id, "new", 2)).await.unwrap();
        db.mark_article_read(1, old.id).await.unwrap();
        db.mark_article_read(1, new.id).await.unwrap();

        let purged = db.remove_articles_over_count(1).await.unwrap();
        assert_eq!(purged.articles, 1);
        assert_eq!(purged.read_markers, 1);

        let (markers,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM article_reads")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(markers, 1);
    }

    #[tokio::test]
    async fn test_remove_orphaned_articles() {
        let db = test_db().await;
        let kept = db.create_feed_source("https://kept.example/", None).await.unwrap();
        let gone = db.create_feed_source("https://gone.example/", None).await.unwrap();
        db.create_article(&test_article(kept.id, "a", 1)).await.unwrap();
        db.create_article(&test_article(gone.id, "b", 1)).await.unwrap();
        db.create_article(&test_article(gone.id, "c", 2)).await.unwrap();

        db.create_subscription(1, kept.id, "Kept", None).await.unwrap();
        db.remove_feed_sources_without_subscription().await.unwrap();

        assert_eq!(db.remove_orphaned_articles().await.unwrap(), 2);
        assert_eq!(db.get_articles_for_feed_source(kept.id, None).await.unwrap().len(), 1);
        assert_eq!(db.remove_orphaned_articles().await.unwrap(), 0);
    }
}
