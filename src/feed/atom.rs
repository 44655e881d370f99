use super::xml::Element;
use super::{date, entry_guid, finish, ParsedEntry, ParsedFeed};

const ATOM_ROOT_ELEMENT: &str = "feed";

pub(super) fn can_read(doc: &Element) -> bool {
    doc.name.eq_ignore_ascii_case(ATOM_ROOT_ELEMENT)
}

pub(super) fn read(doc: &Element) -> ParsedFeed {
    tracing::trace!("Parsing Atom feed");

    // Look children up in whatever namespace the root uses (Atom 1.0, 0.3, or none)
    let ns = doc.namespace.as_deref();

    let title = doc
        .child_text(ns, "title")
        .or_else(|| doc.child_text(ns, "id"))
        .unwrap_or_default();

    let link = preferred_link(doc, ns).or_else(|| {
        doc.child(ns, "author")
            .and_then(|author| author.child_text(ns, "uri"))
    });

    let last_updated = doc
        .child_text(ns, "updated")
        .or_else(|| doc.child_text(ns, "published"))
        .and_then(|raw| date::parse_feed_date(&raw))
        .unwrap_or_else(date::now);

    let entries = doc
        .children(ns, "entry")
        .filter_map(|entry| read_entry(entry, ns))
        .collect();

    finish(title, link, last_updated, entries)
}

fn read_entry(entry: &Element, ns: Option<&str>) -> Option<ParsedEntry> {
    let heading = entry.child_text(ns, "title");
    let url = preferred_link(entry, ns);

    let guid = entry_guid(
        [entry.child_text(ns, "id"), url.clone(), heading.clone()],
        entry,
    )?;

    let published = entry
        .child_text(ns, "updated")
        .or_else(|| entry.child_text(ns, "published"))
        .and_then(|raw| date::parse_feed_date(&raw))
        .unwrap_or_else(date::now);

    let author = entry
        .child(ns, "author")
        .and_then(|author| author.child_text(ns, "name"));

    let body = entry
        .child_text(ns, "content")
        .or_else(|| entry.child_text(ns, "summary"));

    tracing::trace!(guid = %guid, "Parsed feed entry");

    Some(ParsedEntry {
        guid,
        heading,
        body,
        url,
        author,
        published,
    })
}

/// `link[rel=alternate]`, else the first link with an `href`.
fn preferred_link(parent: &Element, ns: Option<&str>) -> Option<String> {
    let alternate = parent
        .children(ns, "link")
        .find(|l| l.attr("rel") == Some("alternate"))
        .and_then(|l| l.attr("href"));

    alternate
        .or_else(|| parent.children(ns, "link").find_map(|l| l.attr("href")))
        .map(str::to_string)
}
