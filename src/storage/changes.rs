use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{to_unix, CommitSummary, DatabaseError, PendingChanges};

/// 7 columns * 50 rows stays well under SQLite's bind parameter limit.
const INSERT_BATCH_SIZE: usize = 50;

impl Database {
    // ========================================================================
    // Unit of Work
    // ========================================================================

    /// Write everything staged during a refresh tick in one transaction.
    ///
    /// Inserts that collide with an already stored `(feed_source_id, guid)`
    /// are ignored, so replaying a tick after a crash is harmless. If any
    /// statement fails nothing from the tick is kept.
    pub async fn commit_changes(
        &self,
        changes: PendingChanges,
    ) -> Result<CommitSummary, DatabaseError> {
        if changes.is_empty() {
            return Ok(CommitSummary::default());
        }

        let mut summary = CommitSummary::default();
        let mut tx = self.pool.begin().await?;

        for chunk in changes.inserted.chunks(INSERT_BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT OR IGNORE INTO articles (feed_source_id, guid, heading, body, url, author, published) ",
            );
            builder.push_values(chunk, |mut b, article| {
                b.push_bind(article.feed_source_id)
                    .push_bind(&article.guid)
                    .push_bind(&article.heading)
                    .push_bind(&article.body)
                    .push_bind(&article.url)
                    .push_bind(&article.author)
                    .push_bind(to_unix(article.published));
            });
            summary.inserted += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        for article in &changes.updated {
            summary.updated += sqlx::query(
                r#"
                UPDATE articles
                SET heading = ?, body = ?, url = ?, author = ?, published = ?
                WHERE id = ?
            "#,
            )
            .bind(&article.heading)
            .bind(&article.body)
            .bind(&article.url)
            .bind(&article.author)
            .bind(to_unix(article.published))
            .bind(article.id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        for source in &changes.feed_sources {
            summary.feed_sources += sqlx::query(
                r#"
                UPDATE feed_sources
                SET link = ?, last_updated = ?, last_refresh_success = ?, last_refresh_message = ?
                WHERE id = ?
            "#,
            )
            .bind(&source.link)
            .bind(to_unix(source.last_updated))
            .bind(source.last_refresh_success)
            .bind(&source.last_refresh_message)
            .bind(source.id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        tx.commit().await?;

        tracing::debug!(
            inserted = summary.inserted,
            updated = summary.updated,
            feed_sources = summary.feed_sources,
            "Committed refresh changes"
        );

        Ok(summary)
    }
}
