use super::xml::Element;
use super::{date, entry_guid, finish, ParsedEntry, ParsedFeed, ATOM_NS, CONTENT_NS, DC_NS};

const RSS_ROOT_ELEMENT: &str = "rss";
const RSS_VERSION_ATTRIBUTE: &str = "version";
const RSS_SUPPORTED_VERSION: &str = "2.0";

pub(super) fn can_read(doc: &Element) -> bool {
    doc.name == RSS_ROOT_ELEMENT && doc.attr(RSS_VERSION_ATTRIBUTE) == Some(RSS_SUPPORTED_VERSION)
}

pub(super) fn read(doc: &Element) -> ParsedFeed {
    tracing::trace!("Parsing RSS feed");

    // A version 2.0 root without a channel is still a (empty) feed
    let empty = Element {
        namespace: None,
        name: "channel".to_string(),
        attributes: Vec::new(),
        children: Vec::new(),
    };
    let channel = doc.child(None, "channel").unwrap_or(&empty);

    let title = channel
        .child_text(None, "title")
        .or_else(|| channel.child_text(None, "description"))
        .unwrap_or_default();

    let link = channel
        .child_text(None, "link")
        .or_else(|| alternate_atom_link(channel));

    let last_updated = channel
        .child_text(None, "lastBuildDate")
        .or_else(|| channel.child_text(None, "pubDate"))
        .and_then(|raw| date::parse_feed_date(&raw))
        .unwrap_or_else(date::now);

    let entries = channel
        .children(None, "item")
        .filter_map(read_item)
        .collect();

    finish(title, link, last_updated, entries)
}

fn read_item(item: &Element) -> Option<ParsedEntry> {
    let heading = item.child_text(None, "title");
    let url = item
        .child_text(None, "link")
        .or_else(|| alternate_atom_link(item));

    let guid = entry_guid(
        [item.child_text(None, "guid"), url.clone(), heading.clone()],
        item,
    )?;

    let published = item
        .child_text(None, "pubDate")
        .or_else(|| item.child_text(Some(DC_NS), "date"))
        .and_then(|raw| date::parse_feed_date(&raw))
        .unwrap_or_else(date::now);

    let author = item
        .child_text(None, "author")
        .or_else(|| item.child_text(Some(DC_NS), "creator"));

    let body = item
        .child_text(Some(CONTENT_NS), "encoded")
        .or_else(|| item.child_text(None, "description"));

    tracing::trace!(guid = %guid, "Parsed feed item");

    Some(ParsedEntry {
        guid,
        heading,
        body,
        url,
        author,
        published,
    })
}

/// `<atom:link rel="alternate" href="...">`, common in RSS feeds generated by Atom-first tools.
fn alternate_atom_link(parent: &Element) -> Option<String> {
    parent
        .children(Some(ATOM_NS), "link")
        .find(|l| l.attr("rel") == Some("alternate"))
        .and_then(|l| l.attr("href"))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::xml::parse_document;
    use crate::feed::parse_feed_date;
    use pretty_assertions::assert_eq;

    const SAMPLE_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"
     xmlns:content="http://purl.org/rss/1.0/modules/content/"
     xmlns:dc="http://purl.org/dc/elements/1.1/"
     xmlns:atom="http://www.w3.org/2005/Atom">
  <channel>
    <title>Example Blog</title>
    <link>https://example.com/</link>
    <description>Posts</description>
    <lastBuildDate>Mon, 01 Jan 2024 10:00:00 GMT</lastBuildDate>
    <item>
      <title>First</title>
      <link>https://example.com/first</link>
      <guid isPermaLink="true">https://example.com/first#post</guid>
      <pubDate>Mon, 01 Jan 2024 09:00:00 GMT</pubDate>
      <dc:creator>Ann</dc:creator>
      <description>Short</description>
      <content:encoded><![CDATA[<p>Long</p>]]></content:encoded>
    </item>
    <item>
      <title>Second</title>
      <link>https://example.com/second</link>
      <dc:date>2023-12-31T08:00:00Z</dc:date>
      <author>bob@example.com (Bob)</author>
      <description>Only summary</description>
    </item>
    <item>
      <description>No identity at all</description>
    </item>
  </channel>
</rss>"#;

    fn doc(xml: &str) -> Element {
        parse_document(xml.as_bytes()).unwrap()
    }

    #[test]
    fn test_can_read() {
        assert!(can_read(&doc(SAMPLE_RSS)));
        assert!(can_read(&doc(r#"<rss version="2.0"/>"#)));
    }

    #[test]
    fn test_cannot_read_other_documents() {
        for xml in [
            "<notrssfeed />",
            "<feed />",
            "<rss />",
            r#"<rss version="" />"#,
            r#"<rss version="something" />"#,
            r#"<rss version="1" />"#,
            r#"<rss version="2" />"#,
            r#"<rss version="3" />"#,
        ] {
            assert!(!can_read(&doc(xml)), "should not read {}", xml);
        }
    }

    #[test]
    fn test_read_channel() {
        let feed = read(&doc(SAMPLE_RSS));
        assert_eq!(feed.title, "Example Blog");
        assert_eq!(feed.link.as_deref(), Some("https://example.com/"));
        assert_eq!(
            feed.last_updated,
            parse_feed_date("2024-01-01T10:00:00Z").unwrap()
        );
    }

    #[test]
    fn test_read_items() {
        let feed = read(&doc(SAMPLE_RSS));
        assert_eq!(feed.entries.len(), 2, "identity-less item must be dropped");

        let first = &feed.entries[0];
        assert_eq!(first.guid, "https://example.com/first#post");
        assert_eq!(first.heading.as_deref(), Some("First"));
        assert_eq!(first.url.as_deref(), Some("https://example.com/first"));
        assert_eq!(first.author.as_deref(), Some("Ann"));
        assert_eq!(first.body.as_deref(), Some("<p>Long</p>"));
        assert_eq!(
            first.published,
            parse_feed_date("2024-01-01T09:00:00Z").unwrap()
        );

        let second = &feed.entries[1];
        assert_eq!(second.guid, "https://example.com/second");
        assert_eq!(second.author.as_deref(), Some("bob@example.com (Bob)"));
        assert_eq!(second.body.as_deref(), Some("Only summary"));
        assert_eq!(
            second.published,
            parse_feed_date("2023-12-31T08:00:00Z").unwrap()
        );
    }

    #[test]
    fn test_title_falls_back_to_description_then_empty() {
        let feed = read(&doc(
            r#"<rss version="2.0"><channel><description>Desc</description></channel></rss>"#,
        ));
        assert_eq!(feed.title, "Desc");

        let feed = read(&doc(r#"<rss version="2.0"><channel/></rss>"#));
        assert_eq!(feed.title, "");
        assert!(feed.entries.is_empty());
    }

    #[test]
    fn test_link_falls_back_to_atom_alternate() {
        let feed = read(&doc(
            r#"<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom"><channel>
                <atom:link rel="self" href="https://example.com/feed.xml"/>
                <atom:link rel="alternate" href="https://example.com/"/>
            </channel></rss>"#,
        ));
        assert_eq!(feed.link.as_deref(), Some("https://example.com/"));
    }

    #[test]
    fn test_guid_falls_back_to_title() {
        let feed = read(&doc(
            r#"<rss version="2.0"><channel><item><title>Only a title</title></item></channel></rss>"#,
        ));
        assert_eq!(feed.entries[0].guid, "Only a title");
    }

    #[test]
    fn test_last_updated_falls_back_to_pub_date() {
        let feed = read(&doc(
            r#"<rss version="2.0"><channel><pubDate>2024-02-01T00:00:00Z</pubDate></channel></rss>"#,
        ));
        assert_eq!(
            feed.last_updated,
            parse_feed_date("2024-02-01T00:00:00Z").unwrap()
        );
    }

    #[test]
    fn test_missing_dates_default_to_now() {
        let before = crate::feed::now();
        let feed = read(&doc(
            r#"<rss version="2.0"><channel><item><guid>x</guid></item></channel></rss>"#,
        ));
        assert!(feed.last_updated >= before);
        assert!(feed.entries[0].published >= before);
    }
}
