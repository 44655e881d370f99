//! Retention jobs: trimming old articles and removing unsubscribed feeds.
//!
//! Both run on the same due-time pattern. A job is due at
//! `last run + interval`; when due it runs, records `now` as its last run and
//! waits a full interval, otherwise it waits out the remainder.

use async_trait::async_trait;
use std::time::Duration;

use super::intervals::{format_timestamp, time_until_due, DEFAULT_PURGE_INTERVAL};
use super::shutdown::Shutdown;
use super::{read_interval, read_last_run};
use crate::feed::now;
use crate::storage::{Database, DatabaseError};

pub const ARTICLE_PURGE_INTERVAL_KEY: &str = "ArticlePurging.RunInterval";
pub const ARTICLE_PURGE_LAST_RUN_KEY: &str = "ArticlePurging.LastRunDateTime";
pub const ORPHAN_PURGE_INTERVAL_KEY: &str = "RemoveOrphanedRssFeeds.RunInterval";
pub const ORPHAN_PURGE_LAST_RUN_KEY: &str = "RemoveOrphanedRssFeeds.LastRunDateTime";

/// One retention job run by a [`PurgeLoop`].
#[async_trait]
pub trait PurgeJob: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Setting holding the run interval override
    fn interval_key(&self) -> &'static str;

    /// Setting holding the last successful run
    fn last_run_key(&self) -> &'static str;

    async fn purge(&self, db: &Database) -> Result<(), DatabaseError>;
}

/// Keeps each feed source's newest `cap` articles and drops the rest,
/// along with read markers and articles left without a feed source.
pub struct ArticlePurgeJob {
    cap: u32,
}

impl ArticlePurgeJob {
    pub fn new(cap: u32) -> Self {
        Self { cap }
    }
}

#[async_trait]
impl PurgeJob for ArticlePurgeJob {
    fn name(&self) -> &'static str {
        "article purge"
    }

    fn interval_key(&self) -> &'static str {
        ARTICLE_PURGE_INTERVAL_KEY
    }

    fn last_run_key(&self) -> &'static str {
        ARTICLE_PURGE_LAST_RUN_KEY
    }

    async fn purge(&self, db: &Database) -> Result<(), DatabaseError> {
        tracing::info!(cap = self.cap, "Removing old articles");
        let purged = db.remove_articles_over_count(self.cap).await?;
        let orphaned = db.remove_orphaned_articles().await?;
        tracing::info!(
            articles = purged.articles,
            read_markers = purged.read_markers,
            orphaned_articles = orphaned,
            "Article purge complete"
        );
        Ok(())
    }
}

/// Removes feed sources nobody subscribes to, then their articles.
pub struct OrphanPurgeJob;

#[async_trait]
impl PurgeJob for OrphanPurgeJob {
    fn name(&self) -> &'static str {
        "orphan purge"
    }

    fn interval_key(&self) -> &'static str {
        ORPHAN_PURGE_INTERVAL_KEY
    }

    fn last_run_key(&self) -> &'static str {
        ORPHAN_PURGE_LAST_RUN_KEY
    }

    async fn purge(&self, db: &Database) -> Result<(), DatabaseError> {
        tracing::info!("Removing feed sources without subscriptions");
        let feed_sources = db.remove_feed_sources_without_subscription().await?;
        let articles = db.remove_orphaned_articles().await?;
        if feed_sources > 0 || articles > 0 {
            tracing::info!(feed_sources, articles, "Orphan purge complete");
        } else {
            tracing::debug!("Orphan purge complete: nothing to remove");
        }
        Ok(())
    }
}

/// Drives a [`PurgeJob`] on its due-time schedule until shutdown.
pub struct PurgeLoop<J> {
    db: Database,
    job: J,
    startup_delay: Duration,
}

impl<J: PurgeJob> PurgeLoop<J> {
    pub fn new(db: Database, job: J, startup_delay: Duration) -> Self {
        Self {
            db,
            job,
            startup_delay,
        }
    }

    /// Run the job if it is due at `now`. Returns how long to wait before
    /// checking again.
    ///
    /// A failed run is logged and retried after one interval; its last run
    /// is not recorded.
    pub async fn tick(&self, now: chrono::DateTime<chrono::Utc>) -> Duration {
        let name = self.job.name();
        let interval = read_interval(&self.db, self.job.interval_key(), DEFAULT_PURGE_INTERVAL).await;
        let last_run = read_last_run(&self.db, self.job.last_run_key()).await;
        tracing::trace!(job = name, ?interval, ?last_run, "Checking purge schedule");

        let wait = time_until_due(last_run, interval, now);
        if !wait.is_zero() {
            return wait;
        }

        if let Err(e) = self.job.purge(&self.db).await {
            tracing::error!(job = name, error = %e, "Purge run failed");
            return interval;
        }

        if let Err(e) = self
            .db
            .add_or_update_setting(self.job.last_run_key(), &format_timestamp(now))
            .await
        {
            tracing::error!(job = name, error = %e, "Failed to record purge run");
        }
        interval
    }

    pub async fn run(self, shutdown: Shutdown) {
        let name = self.job.name();
        tracing::info!(job = name, "Starting purge job");

        if shutdown.sleep(self.startup_delay).await.is_err() {
            tracing::debug!(job = name, "Purge job stopping before first run");
            return;
        }

        loop {
            let wait = self.tick(now()).await;
            tracing::info!(job = name, wait_secs = wait.as_secs(), "Waiting before running purge job again");
            if shutdown.sleep(wait).await.is_err() {
                tracing::debug!(job = name, "Purge job stopping");
                return;
            }
        }
    }
}
