use super::engine::RefreshFeed;
use crate::jobs::shutdown::Shutdown;
use crate::storage::{FeedSource, PendingChanges};

/// Tally of one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Feeds that had new content
    pub updated: usize,
    /// Feeds whose refresh returned an error
    pub failed: usize,
    /// Feeds attempted before the batch ended
    pub checked: usize,
}

/// Refresh `feeds` one after another, staging everything into `pending`.
///
/// A failing feed is logged and counted; the batch moves on. Shutdown is
/// checked between feeds only. Each feed source is staged only if its state
/// changed. Nothing is committed here.
pub async fn refresh_batch<R>(
    refresher: &R,
    feeds: Vec<FeedSource>,
    shutdown: &Shutdown,
    pending: &mut PendingChanges,
) -> BatchOutcome
where
    R: RefreshFeed + ?Sized,
{
    let total = feeds.len();
    let mut outcome = BatchOutcome::default();
    tracing::info!(feeds = total, "Refreshing feeds");

    for mut source in feeds {
        if shutdown.is_cancelled() {
            tracing::debug!(
                checked = outcome.checked,
                remaining = total - outcome.checked,
                "Shutdown requested, stopping feed refresh batch"
            );
            break;
        }

        let before = source.clone();
        tracing::info!(feed_source_id = source.id, uri = %source.uri, "Refreshing feed");

        match refresher.refresh(&mut source, pending).await {
            Ok(true) => outcome.updated += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::error!(
                    feed_source_id = source.id,
                    uri = %source.uri,
                    error = %e,
                    "Error refreshing feed"
                );
                outcome.failed += 1;
            }
        }
        outcome.checked += 1;

        if source != before {
            pending.feed_source(source);
        }
    }

    tracing::info!(
        updated = outcome.updated,
        failed = outcome.failed,
        checked = outcome.checked,
        "Completed feed refresh. {} updated / {} failed / {} total checked",
        outcome.updated,
        outcome.failed,
        total
    );

    outcome
}
