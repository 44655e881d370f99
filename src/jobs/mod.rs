//! Long-running background jobs.
//!
//! Each job is a cooperative loop in its own tokio task: sleep, check for
//! shutdown, run one tick, repeat. Intervals and last-run timestamps live in
//! the settings table and are re-read every tick, so they can be retuned
//! without a restart.

pub mod intervals;
pub mod purge;
pub mod refresh;
pub mod shutdown;

pub use purge::{ArticlePurgeJob, OrphanPurgeJob, PurgeJob, PurgeLoop};
pub use refresh::RefreshScheduler;
pub use shutdown::{Cancelled, Shutdown, ShutdownTrigger};

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::storage::Database;

/// Read an interval setting, falling back to `default` when it is missing
/// or unusable.
pub(crate) async fn read_interval(db: &Database, key: &str, default: Duration) -> Duration {
    match db.find_setting(key).await {
        Ok(Some(raw)) => match intervals::parse_interval(&raw) {
            Ok(interval) => interval,
            Err(e) => {
                tracing::warn!(setting = key, error = %e, "Ignoring invalid interval setting");
                default
            }
        },
        Ok(None) => default,
        Err(e) => {
            tracing::error!(setting = key, error = %e, "Failed to read interval setting");
            default
        }
    }
}

/// Read a last-run timestamp. Missing or unreadable values mean "never run".
pub(crate) async fn read_last_run(db: &Database, key: &str) -> Option<DateTime<Utc>> {
    match db.find_setting(key).await {
        Ok(Some(raw)) => match intervals::parse_timestamp(&raw) {
            Ok(at) => Some(at),
            Err(e) => {
                tracing::warn!(setting = key, error = %e, "Ignoring invalid last run setting");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            tracing::error!(setting = key, error = %e, "Failed to read last run setting");
            None
        }
    }
}
