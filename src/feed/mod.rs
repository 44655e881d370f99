//! Feed document parsing.
//!
//! Converts RSS 2.0 and Atom XML into one canonical shape:
//!
//! - [`xml`] - namespace-aware element tree built on `quick-xml`
//! - [`date`] - RFC 3339 / RFC 2822 date handling shared by both readers
//! - [`rss`] / [`atom`] - the format readers
//!
//! [`parse_feed`] is the dispatcher. It tries each [`FeedFormat`] in order
//! and never panics; a document nobody can read comes back as
//! [`ParseError`], which callers record as an invalid feed.

mod atom;
mod date;
mod rss;
pub mod xml;

use chrono::{DateTime, Utc};
use thiserror::Error;

pub use date::{now, parse_feed_date};
use xml::Element;

/// Atom 1.0 namespace, also used for `atom:link` inside RSS channels.
pub(crate) const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
/// RSS content module (`content:encoded`).
pub(crate) const CONTENT_NS: &str = "http://purl.org/rss/1.0/modules/content/";
/// Dublin Core elements (`dc:creator`, `dc:date`).
pub(crate) const DC_NS: &str = "http://purl.org/dc/elements/1.1/";

/// Reasons a document could not be turned into a [`ParsedFeed`].
#[derive(Debug, Error)]
pub enum ParseError {
    /// The bytes are not well-formed XML.
    #[error("XML parse error: {0}")]
    Xml(String),

    /// The input contained no root element.
    #[error("Document is empty")]
    Empty,

    /// Element nesting exceeds the safety limit.
    #[error("XML nesting depth exceeds maximum of {0} levels")]
    TooDeep(usize),

    /// Well-formed XML, but neither RSS 2.0 nor Atom.
    #[error("No reader can handle documents with root element <{0}>")]
    UnrecognizedFormat(String),
}

/// A successfully read feed document.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFeed {
    pub title: String,
    pub link: Option<String>,
    /// Never older than the newest entry's `published`.
    pub last_updated: DateTime<Utc>,
    /// Entries in document order. Entries without any usable identity are
    /// already dropped.
    pub entries: Vec<ParsedEntry>,
}

/// One feed item in canonical form.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEntry {
    pub guid: String,
    pub heading: Option<String>,
    pub body: Option<String>,
    pub url: Option<String>,
    pub author: Option<String>,
    pub published: DateTime<Utc>,
}

/// The closed set of supported feed formats, in dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    Rss2,
    Atom,
}

impl FeedFormat {
    pub const ALL: [FeedFormat; 2] = [FeedFormat::Rss2, FeedFormat::Atom];

    /// Whether this reader claims the document.
    pub fn can_read(self, doc: &Element) -> bool {
        match self {
            FeedFormat::Rss2 => rss::can_read(doc),
            FeedFormat::Atom => atom::can_read(doc),
        }
    }

    /// Reads a document this format has claimed.
    pub fn read(self, doc: &Element) -> ParsedFeed {
        match self {
            FeedFormat::Rss2 => rss::read(doc),
            FeedFormat::Atom => atom::read(doc),
        }
    }

    /// First format, in dispatch order, that claims the document.
    pub fn detect(doc: &Element) -> Option<FeedFormat> {
        Self::ALL.into_iter().find(|format| format.can_read(doc))
    }
}

/// Parses raw feed bytes into a [`ParsedFeed`].
///
/// Failures are logged at warn level and returned; this function does not
/// panic on any input.
pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed, ParseError> {
    let doc = xml::parse_document(bytes).map_err(|e| {
        tracing::warn!(error = %e, "Error loading feed content");
        e
    })?;

    match FeedFormat::detect(&doc) {
        Some(format) => {
            tracing::trace!(format = ?format, "Reading feed document");
            Ok(format.read(&doc))
        }
        None => {
            tracing::warn!(root = %doc.name, "No reader can handle feed content");
            Err(ParseError::UnrecognizedFormat(doc.name))
        }
    }
}

/// Builds the final feed, promoting `last_updated` to the newest entry.
///
/// Some feeds never touch their channel-level date when items change, so
/// the channel date alone would make new items invisible to the
/// `last_updated` comparison done by the refresh engine.
fn finish(
    title: String,
    link: Option<String>,
    last_updated: DateTime<Utc>,
    entries: Vec<ParsedEntry>,
) -> ParsedFeed {
    let newest = entries.iter().map(|e| e.published).max();
    let last_updated = match newest {
        Some(newest) if newest > last_updated => newest,
        _ => last_updated,
    };

    ParsedFeed {
        title,
        link,
        last_updated,
        entries,
    }
}

/// Resolves an entry guid from its candidates, logging when none is usable.
fn entry_guid(candidates: [Option<String>; 3], entry: &Element) -> Option<String> {
    let guid = candidates.into_iter().flatten().next();
    if guid.is_none() {
        tracing::warn!(
            element = %entry.name,
            "Feed entry has no id, link or title - badly formed feed, skipping entry"
        );
    }
    guid
}
