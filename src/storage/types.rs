use chrono::{DateTime, Utc};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process has locked the database
    #[error("Another rssward instance appears to be running. Please stop it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// A feed source with this uri is already stored
    #[error("Feed source already exists: {0}")]
    FeedSourceExists(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }
}

// ============================================================================
// Timestamp Helpers
// ============================================================================

/// Timestamps are stored as whole-second unix time.
pub(crate) fn to_unix(value: Option<DateTime<Utc>>) -> Option<i64> {
    value.map(|dt| dt.timestamp())
}

pub(crate) fn from_unix(value: Option<i64>) -> Option<DateTime<Utc>> {
    value.and_then(|secs| DateTime::from_timestamp(secs, 0))
}

// ============================================================================
// Row Types
// ============================================================================

/// Internal row type for feed source queries (used by sqlx FromRow)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedSourceRow {
    pub id: i64,
    pub uri: String,
    pub link: Option<String>,
    pub last_updated: Option<i64>,
    pub last_refresh_success: bool,
    pub last_refresh_message: String,
    pub decode_body: bool,
}

impl FeedSourceRow {
    pub(crate) fn into_feed_source(self) -> FeedSource {
        FeedSource {
            id: self.id,
            uri: self.uri,
            link: self.link,
            last_updated: from_unix(self.last_updated),
            last_refresh_success: self.last_refresh_success,
            last_refresh_message: self.last_refresh_message,
            decode_body: self.decode_body,
        }
    }
}

/// Internal row type for Article queries
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ArticleDbRow {
    pub id: i64,
    pub feed_source_id: i64,
    pub guid: String,
    pub heading: Option<String>,
    pub body: Option<String>,
    pub url: Option<String>,
    pub author: Option<String>,
    pub published: Option<i64>,
}

impl ArticleDbRow {
    pub(crate) fn into_article(self) -> Article {
        Article {
            id: self.id,
            feed_source_id: self.feed_source_id,
            guid: self.guid,
            heading: self.heading,
            body: self.body,
            url: self.url,
            author: self.author,
            published: from_unix(self.published),
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A subscribed feed endpoint, shared by every user subscribed to it.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSource {
    pub id: i64,
    pub uri: String,
    /// Site link advertised by the feed itself
    pub link: Option<String>,
    /// Newest `lastUpdated` seen in a successfully processed document
    pub last_updated: Option<DateTime<Utc>>,
    pub last_refresh_success: bool,
    /// Empty on success, otherwise the reason the last refresh failed
    pub last_refresh_message: String,
    pub decode_body: bool,
}

/// A stored feed entry. Identity is `(feed_source_id, guid)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    pub id: i64,
    pub feed_source_id: i64,
    pub guid: String,
    pub heading: Option<String>,
    pub body: Option<String>,
    pub url: Option<String>,
    pub author: Option<String>,
    pub published: Option<DateTime<Utc>>,
}

/// An article not yet stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewArticle {
    pub feed_source_id: i64,
    pub guid: String,
    pub heading: Option<String>,
    pub body: Option<String>,
    pub url: Option<String>,
    pub author: Option<String>,
    pub published: Option<DateTime<Utc>>,
}

/// A `(name, value)` pair from the scheduler settings table.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Setting {
    pub name: String,
    pub value: String,
}

/// Rows removed by the article count purge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgedArticles {
    pub articles: u64,
    pub read_markers: u64,
}

// ============================================================================
// Unit of Work
// ============================================================================

/// Changes staged during one refresh tick and written by
/// [`Database::commit_changes`](super::Database::commit_changes) in a single
/// transaction.
#[derive(Debug, Default)]
pub struct PendingChanges {
    pub inserted: Vec<NewArticle>,
    pub updated: Vec<Article>,
    pub feed_sources: Vec<FeedSource>,
}

impl PendingChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.feed_sources.is_empty()
    }

    /// Stages a new article.
    pub fn insert(&mut self, article: NewArticle) {
        self.inserted.push(article);
    }

    /// Stages an article update, replacing an earlier staged copy of the same row.
    pub fn update(&mut self, article: Article) {
        match self.updated.iter_mut().find(|a| a.id == article.id) {
            Some(staged) => *staged = article,
            None => self.updated.push(article),
        }
    }

    /// Stages a feed source's new state, replacing an earlier staged copy.
    pub fn feed_source(&mut self, source: FeedSource) {
        match self.feed_sources.iter_mut().find(|s| s.id == source.id) {
            Some(staged) => *staged = source,
            None => self.feed_sources.push(source),
        }
    }

}

/// Row counts written by one commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub inserted: u64,
    pub updated: u64,
    pub feed_sources: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn article(id: i64, heading: &str) -> Article {
        Article {
            id,
            feed_source_id: 1,
            guid: format!("g{}", id),
            heading: Some(heading.to_string()),
            body: None,
            url: None,
            author: None,
            published: None,
        }
    }

    #[test]
    fn test_unix_round_trip_is_whole_seconds() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 15).unwrap();
        assert_eq!(from_unix(to_unix(Some(dt))), Some(dt));
        assert_eq!(from_unix(None), None);
    }

    #[test]
    fn test_pending_update_replaces_staged_copy() {
        let mut pending = PendingChanges::new();
        assert!(pending.is_empty());

        pending.update(article(1, "first"));
        pending.update(article(2, "other"));
        pending.update(article(1, "second"));

        assert_eq!(pending.updated.len(), 2);
        assert_eq!(pending.updated[0].heading.as_deref(), Some("second"));
        assert!(!pending.is_empty());
    }
}
