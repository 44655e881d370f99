//! Deciding what a freshly parsed document changes.
//!
//! Each parsed entry is matched against the feed source's stored articles
//! (and against inserts already staged from the same document) by guid.
//! Matches are updated in place when the entry was republished, new entries
//! are staged for insert unless they fall below the retention floor.

use chrono::{DateTime, Utc};

use crate::feed::ParsedEntry;
use crate::storage::{Article, NewArticle, PendingChanges};

/// Counts of what one reconciliation staged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// New entries older than the oldest retained article
    pub below_floor: usize,
}

/// Two guids identify the same article when they are equal, or equal
/// ignoring case once a trailing `#fragment` is removed from each.
pub fn guids_match(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }

    strip_fragment(a)
        .chars()
        .flat_map(char::to_lowercase)
        .eq(strip_fragment(b).chars().flat_map(char::to_lowercase))
}

/// `https://x/a#comments` → `https://x/a`. A leading `#` is kept.
pub fn strip_fragment(guid: &str) -> &str {
    let guid = guid.trim();
    match guid.rfind('#') {
        Some(idx) if idx > 0 => &guid[..idx],
        _ => guid,
    }
}

/// Oldest `published` among retained articles.
///
/// A missing `published` counts as the minimum, as does having no articles,
/// so neither case blocks anything from being inserted.
pub fn retention_floor(existing: &[Article]) -> Option<DateTime<Utc>> {
    existing.iter().map(|a| a.published).min().flatten()
}

/// Stage the changes `entries` imply for one feed source.
///
/// `existing` must hold every stored article of the feed source.
pub fn reconcile(
    feed_source_id: i64,
    mut existing: Vec<Article>,
    entries: Vec<ParsedEntry>,
    pending: &mut PendingChanges,
) -> ReconcileOutcome {
    let floor = retention_floor(&existing);
    let mut outcome = ReconcileOutcome::default();
    let mut touched: Vec<usize> = Vec::new();

    for entry in entries {
        let published = Some(entry.published);

        if let Some(idx) = existing.iter().position(|a| guids_match(&a.guid, &entry.guid)) {
            let article = &mut existing[idx];
            if published > article.published {
                tracing::info!(
                    feed_source_id,
                    guid = %article.guid,
                    "Article has been republished, updating stored copy"
                );
                article.heading = entry.heading;
                article.body = entry.body;
                article.url = entry.url;
                article.author = entry.author;
                article.published = published;
                if !touched.contains(&idx) {
                    touched.push(idx);
                    outcome.updated += 1;
                }
            } else {
                outcome.unchanged += 1;
            }
            continue;
        }

        // The same guid can appear twice in one document
        if let Some(staged) = pending
            .inserted
            .iter_mut()
            .filter(|a| a.feed_source_id == feed_source_id)
            .find(|a| guids_match(&a.guid, &entry.guid))
        {
            if published > staged.published {
                staged.heading = entry.heading;
                staged.body = entry.body;
                staged.url = entry.url;
                staged.author = entry.author;
                staged.published = published;
            }
            outcome.unchanged += 1;
            continue;
        }

        if published < floor {
            tracing::warn!(
                feed_source_id,
                guid = %entry.guid,
                "Article is older than the oldest stored item, probably already purged, not adding"
            );
            outcome.below_floor += 1;
            continue;
        }

        tracing::info!(
            feed_source_id,
            guid = %entry.guid,
            heading = entry.heading.as_deref().unwrap_or(""),
            "Adding new article"
        );
        pending.insert(NewArticle {
            feed_source_id,
            guid: entry.guid,
            heading: entry.heading,
            body: entry.body,
            url: entry.url,
            author: entry.author,
            published,
        });
        outcome.inserted += 1;
    }

    for idx in touched {
        pending.update(existing[idx].clone());
    }

    outcome
}
