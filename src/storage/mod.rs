mod articles;
mod changes;
mod feed_sources;
mod schema;
mod settings;
mod subscriptions;
mod types;

pub use schema::Database;
pub use types::{
    Article, CommitSummary, DatabaseError, FeedSource, NewArticle, PendingChanges, PurgedArticles,
    Setting,
};
