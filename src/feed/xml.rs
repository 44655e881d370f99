//! Minimal namespace-aware element tree for feed documents.
//!
//! Feed readers need random access (root attributes, first matching child,
//! fallback chains), so the `quick-xml` event stream is folded into a small
//! owned tree before dispatch. Only elements and text are kept; comments,
//! processing instructions and the DOCTYPE are dropped.

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;

use super::ParseError;

/// Nesting limit for feed documents. XHTML content bodies nest a few levels
/// below an entry; anything deeper than this is not a feed.
const MAX_XML_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Resolved namespace URI, `None` when the element is unqualified.
    pub namespace: Option<String>,
    /// Local name with any prefix removed.
    pub name: String,
    /// Attributes keyed by local name.
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    /// Returns the value of the attribute with the given local name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Iterates over child elements in the given namespace with the given local name.
    pub fn children<'a>(
        &'a self,
        namespace: Option<&'a str>,
        name: &'a str,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter_map(move |node| match node {
            Node::Element(e) if e.name == name && e.namespace.as_deref() == namespace => Some(e),
            _ => None,
        })
    }

    /// First child element in the given namespace with the given local name.
    pub fn child(&self, namespace: Option<&str>, name: &str) -> Option<&Element> {
        self.children.iter().find_map(|node| match node {
            Node::Element(e) if e.name == name && e.namespace.as_deref() == namespace => Some(e),
            _ => None,
        })
    }

    /// Concatenated text of this element and all descendants, in document order.
    pub fn value(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                Node::Text(t) => out.push_str(t),
                Node::Element(e) => e.collect_text(out),
            }
        }
    }

    /// Trimmed text value, `None` when the element is empty or whitespace only.
    pub fn text(&self) -> Option<String> {
        let value = self.value();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// Shorthand for `child(..).and_then(Element::text)`.
    pub fn child_text(&self, namespace: Option<&str>, name: &str) -> Option<String> {
        self.child(namespace, name).and_then(Element::text)
    }
}

/// Loads a document and returns its root element.
///
/// Fails on malformed XML, mismatched end tags, unclosed elements at end of
/// input, undeclared entity references, and documents without a root.
pub fn parse_document(bytes: &[u8]) -> Result<Element, ParseError> {
    let mut reader = NsReader::from_reader(bytes);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    let mut buf = Vec::new();

    loop {
        let (namespace, event) = reader
            .read_resolved_event_into(&mut buf)
            .map_err(|e| ParseError::Xml(e.to_string()))?;
        let namespace = resolved_namespace(namespace);
        // Switches from UTF-8 once the XML declaration names another encoding
        let decoder = reader.decoder();

        match event {
            Event::Start(e) => {
                if stack.len() >= MAX_XML_DEPTH {
                    return Err(ParseError::TooDeep(MAX_XML_DEPTH));
                }
                stack.push(build_element(&e, namespace, decoder)?);
            }
            Event::Empty(e) => {
                let element = build_element(&e, namespace, decoder)?;
                attach(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                // End names are checked by the reader, so the top is the element being closed
                if let Some(element) = stack.pop() {
                    attach(&mut stack, &mut root, element);
                }
            }
            Event::Text(t) => {
                if let Some(top) = stack.last_mut() {
                    let text = t.unescape().map_err(|e| ParseError::Xml(e.to_string()))?;
                    top.children.push(Node::Text(text.into_owned()));
                }
            }
            Event::CData(c) => {
                if let Some(top) = stack.last_mut() {
                    let text = decoder
                        .decode(&c)
                        .map_err(|e| ParseError::Xml(e.to_string()))?;
                    top.children.push(Node::Text(text.into_owned()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(ParseError::Xml(format!(
            "unexpected end of document inside <{}>",
            open.name
        )));
    }

    root.ok_or(ParseError::Empty)
}

fn resolved_namespace(result: ResolveResult<'_>) -> Option<String> {
    match result {
        ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.as_ref()).into_owned()),
        _ => None,
    }
}

fn build_element(
    start: &BytesStart<'_>,
    namespace: Option<String>,
    decoder: quick_xml::encoding::Decoder,
) -> Result<Element, ParseError> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut attributes = Vec::new();

    for attr_result in start.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(e) => {
                tracing::warn!(element = %name, error = %e, "Skipping malformed attribute");
                continue;
            }
        };
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .decode_and_unescape_value(decoder)
            .map_err(|e| ParseError::Xml(e.to_string()))?;
        attributes.push((key, value.into_owned()));
    }

    Ok(Element {
        namespace,
        name,
        attributes,
        children: Vec::new(),
    })
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None if root.is_none() => *root = Some(element),
        None => tracing::debug!(element = %element.name, "Ignoring element after document root"),
    }
}
