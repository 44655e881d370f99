use async_trait::async_trait;
use thiserror::Error;

use super::fetcher::{self, Download, FetchError};
use super::reconcile::reconcile;
use crate::feed;
use crate::storage::{Database, DatabaseError, FeedSource, PendingChanges};

/// Recorded when the download or the article lookup fails outright.
pub const FAILED_MESSAGE: &str = "Failed to download or parse feed";
/// Recorded when the body is neither RSS 2.0 nor Atom.
pub const INVALID_CONTENT_MESSAGE: &str =
    "Feed response could not be parsed - invalid RSS / Atom content";

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("Failed to download feed: {0}")]
    Fetch(#[from] FetchError),
    #[error("Failed to load stored articles: {0}")]
    Storage(#[from] DatabaseError),
}

/// Refreshes a single feed source.
///
/// Implementations record the outcome on `source` and stage article changes
/// into `pending`; nothing is written to storage. `Ok(true)` means the feed
/// had new content and `source` was advanced.
#[async_trait]
pub trait RefreshFeed: Send + Sync {
    async fn refresh(
        &self,
        source: &mut FeedSource,
        pending: &mut PendingChanges,
    ) -> Result<bool, RefreshError>;
}

/// The production refresher: HTTP download, parse, reconcile.
#[derive(Clone)]
pub struct FeedRefresher {
    db: Database,
    client: reqwest::Client,
    max_feed_size: usize,
}

impl FeedRefresher {
    pub fn new(db: Database, client: reqwest::Client, max_feed_size: usize) -> Self {
        Self {
            db,
            client,
            max_feed_size,
        }
    }
}

fn record_failure(source: &mut FeedSource, message: impl Into<String>) {
    source.last_refresh_success = false;
    source.last_refresh_message = message.into();
}

#[async_trait]
impl RefreshFeed for FeedRefresher {
    async fn refresh(
        &self,
        source: &mut FeedSource,
        pending: &mut PendingChanges,
    ) -> Result<bool, RefreshError> {
        let body = match fetcher::download(&self.client, &source.uri, self.max_feed_size).await {
            Ok(Download::Body(body)) => body,
            Ok(Download::Status(status)) => {
                tracing::warn!(
                    feed_source_id = source.id,
                    uri = %source.uri,
                    status = %status,
                    "Could not refresh feed, response status not successful"
                );
                record_failure(source, format!("Feed response: {}", status));
                return Ok(false);
            }
            Err(e) => {
                record_failure(source, FAILED_MESSAGE);
                return Err(e.into());
            }
        };

        tracing::info!(uri = %source.uri, bytes = body.len(), "Successfully downloaded feed");

        let parsed = match feed::parse_feed(&body) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(
                    feed_source_id = source.id,
                    uri = %source.uri,
                    error = %e,
                    "Could not parse feed response"
                );
                record_failure(source, INVALID_CONTENT_MESSAGE);
                return Ok(false);
            }
        };

        source.last_refresh_success = true;
        source.last_refresh_message.clear();

        tracing::debug!(
            uri = %source.uri,
            parsed_last_updated = %parsed.last_updated,
            stored_last_updated = ?source.last_updated,
            "Comparing feed timestamps"
        );
        if source
            .last_updated
            .is_some_and(|stored| parsed.last_updated <= stored)
        {
            return Ok(false);
        }

        let existing = match self.db.get_articles_for_feed_source(source.id, None).await {
            Ok(existing) => existing,
            Err(e) => {
                record_failure(source, FAILED_MESSAGE);
                return Err(e.into());
            }
        };

        tracing::trace!(uri = %source.uri, "Feed has new items, updating articles");
        let outcome = reconcile(source.id, existing, parsed.entries, pending);
        tracing::debug!(
            feed_source_id = source.id,
            inserted = outcome.inserted,
            updated = outcome.updated,
            below_floor = outcome.below_floor,
            "Reconciled feed entries"
        );

        source.last_updated = Some(parsed.last_updated);
        source.link = parsed.link;
        Ok(true)
    }
}
