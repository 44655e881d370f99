//! RSS/Atom ingestion and refresh engine.
//!
//! Feeds are downloaded and parsed ([`feed`]), reconciled against stored
//! articles ([`refresh`]) and persisted in SQLite ([`storage`]). The
//! long-running [`jobs`] decide which feeds to poll and when, and keep the
//! article store trimmed.

pub mod config;
pub mod feed;
pub mod jobs;
pub mod refresh;
pub mod storage;
