//! Fetching feeds and turning them into staged article changes.
//!
//! - [`fetcher`] - HTTP download with a body size limit
//! - [`reconcile`] - guid matching and the insert/update/skip decision
//! - [`engine`] - [`FeedRefresher`], one feed source per call
//! - [`batch`] - sequential refresh of many feed sources with fault isolation

pub mod batch;
pub mod engine;
pub mod fetcher;
pub mod reconcile;

pub use batch::{refresh_batch, BatchOutcome};
pub use engine::{FeedRefresher, RefreshError, RefreshFeed};
pub use fetcher::{build_client, FetchError};
