//! The feed refresh scheduler.
//!
//! Every fast-cycle tick refreshes the feed sources that were updated
//! recently; how far back "recently" reaches depends on how much of the slow
//! cycle remains. When the slow cycle comes due, one tick refreshes every
//! feed source instead.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::time::Duration;

use super::intervals::{
    format_timestamp, parse_interval, parse_timestamp, plan_refresh, RefreshPlan,
    DEFAULT_FAST_REFRESH_INTERVAL, DEFAULT_SLOW_REFRESH_INTERVAL,
};
use super::shutdown::Shutdown;
use crate::feed::now;
use crate::refresh::{refresh_batch, BatchOutcome, RefreshFeed};
use crate::storage::{CommitSummary, Database, PendingChanges, Setting};

pub const FAST_REFRESH_INTERVAL_KEY: &str = "FeedRefresh.FastRefreshInterval";
pub const SLOW_REFRESH_INTERVAL_KEY: &str = "FeedRefresh.SlowRefreshInterval";
pub const LAST_SLOW_REFRESH_KEY: &str = "FeedRefresh.LastSlowRefreshDateTime";

/// The scheduler's settings as read at the start of a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSettings {
    pub fast_interval: Duration,
    pub slow_interval: Duration,
    pub last_slow_refresh: Option<DateTime<Utc>>,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            fast_interval: DEFAULT_FAST_REFRESH_INTERVAL,
            slow_interval: DEFAULT_SLOW_REFRESH_INTERVAL,
            last_slow_refresh: None,
        }
    }
}

impl RefreshSettings {
    /// Pick the scheduler's values out of the full settings list. Missing or
    /// malformed values keep their defaults.
    pub fn from_settings(settings: &[Setting]) -> Self {
        let find = |name: &str| settings.iter().find(|s| s.name == name).map(|s| s.value.as_str());
        let interval = |name: &str, default: Duration| match find(name).map(parse_interval) {
            Some(Ok(interval)) => interval,
            Some(Err(e)) => {
                tracing::warn!(setting = name, error = %e, "Ignoring invalid interval setting");
                default
            }
            None => default,
        };

        Self {
            fast_interval: interval(FAST_REFRESH_INTERVAL_KEY, DEFAULT_FAST_REFRESH_INTERVAL),
            slow_interval: interval(SLOW_REFRESH_INTERVAL_KEY, DEFAULT_SLOW_REFRESH_INTERVAL),
            last_slow_refresh: match find(LAST_SLOW_REFRESH_KEY).map(parse_timestamp) {
                Some(Ok(at)) => Some(at),
                Some(Err(e)) => {
                    tracing::warn!(
                        setting = LAST_SLOW_REFRESH_KEY,
                        error = %e,
                        "Ignoring invalid last run setting"
                    );
                    None
                }
                None => None,
            },
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub plan: RefreshPlan,
    pub batch: BatchOutcome,
    pub committed: CommitSummary,
}

pub struct RefreshScheduler<R> {
    db: Database,
    refresher: R,
    startup_delay: Duration,
}

impl<R: RefreshFeed> RefreshScheduler<R> {
    pub fn new(db: Database, refresher: R, startup_delay: Duration) -> Self {
        Self {
            db,
            refresher,
            startup_delay,
        }
    }

    pub async fn load_settings(&self) -> RefreshSettings {
        match self.db.get_all_settings().await {
            Ok(settings) => RefreshSettings::from_settings(&settings),
            Err(e) => {
                tracing::error!(error = %e, "Failed to read refresh settings, using defaults");
                RefreshSettings::default()
            }
        }
    }

    /// Refresh whatever `settings` say is due at `now` and commit the
    /// results in one transaction.
    pub async fn tick(
        &self,
        settings: &RefreshSettings,
        now: DateTime<Utc>,
        shutdown: &Shutdown,
    ) -> Result<TickReport> {
        tracing::trace!(?settings, "Planning feed refresh");

        let plan = plan_refresh(settings.slow_interval, settings.last_slow_refresh, now);
        let since = match plan {
            RefreshPlan::Full => {
                tracing::info!("Refreshing all feeds");
                self.db
                    .add_or_update_setting(LAST_SLOW_REFRESH_KEY, &format_timestamp(now))
                    .await
                    .context("Failed to record slow refresh time")?;
                None
            }
            RefreshPlan::Partial {
                since,
                remaining_percent,
            } => {
                tracing::info!(%since, remaining_percent, "Getting feeds updated recently");
                Some(since)
            }
        };

        let feeds = self
            .db
            .find_feed_sources_updated_since(since)
            .await
            .context("Failed to load feed sources")?;

        let mut pending = PendingChanges::new();
        let batch = refresh_batch(&self.refresher, feeds, shutdown, &mut pending).await;
        let committed = self
            .db
            .commit_changes(pending)
            .await
            .context("Failed to save refreshed feeds")?;

        Ok(TickReport {
            plan,
            batch,
            committed,
        })
    }

    /// Tick every fast interval until `shutdown` fires.
    pub async fn run(self, shutdown: Shutdown) {
        tracing::info!("Starting feed refresh scheduler");

        if shutdown.sleep(self.startup_delay).await.is_err() {
            tracing::debug!("Feed refresh scheduler stopping before first run");
            return;
        }

        loop {
            let settings = self.load_settings().await;
            if let Err(e) = self.tick(&settings, now(), &shutdown).await {
                tracing::error!("An error occurred refreshing feeds: {:#}", e);
            }

            tracing::info!(
                wait_secs = settings.fast_interval.as_secs(),
                "Refreshed feeds, waiting before running again"
            );
            if shutdown.sleep(settings.fast_interval).await.is_err() {
                tracing::debug!("Feed refresh scheduler stopping");
                return;
            }
        }
    }
}
