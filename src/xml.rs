//! Minimal XML element trees.
//!
//! Schema and query files are small, so both codecs work on a fully built
//! tree of [`Element`]s instead of a stream of events. Reading is done with
//! `quick-xml`; writing is done by [`Writer`], which produces two-space
//! indented output with one element per line.

use std::borrow::Cow;

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// An XML element with its attributes, text and child elements.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    /// The tag name.
    pub name: String,
    /// Attributes in document order.
    pub attrs: Vec<(String, String)>,
    /// Concatenated, trimmed text content.
    pub text: String,
    /// Child elements in document order.
    pub children: Vec<Element>,
}

/// Error type for reading XML text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum XmlError {
    /// The underlying reader rejected the document.
    #[error("invalid XML: {0}")]
    Syntax(String),
    /// The document has no root element.
    #[error("document has no root element")]
    Empty,
}

impl Element {
    /// Creates an element with no attributes or children.
    pub fn new(name: &str) -> Element {
        Element {
            name: name.to_string(),
            ..Element::default()
        }
    }

    /// Returns the value of the attribute `key`, if present.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the value of the first attribute matching `key` ignoring case.
    pub fn attr_ignore_case(&self, key: &str) -> Option<&str> {
        self.attr(key).or_else(|| {
            self.attrs
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v.as_str())
        })
    }

    /// Returns the first child named `name`.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Returns all children named `name`.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Finds this element or the first descendant named `name`, pre-order.
    pub fn find(&self, name: &str) -> Option<&Element> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }
}

/// Parses `text` into its root element.
pub fn parse(text: &str) -> Result<Element, XmlError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = vec![];
    let mut root = None;
    loop {
        let event = reader
            .read_event()
            .map_err(|e| XmlError::Syntax(e.to_string()))?;
        match event {
            Event::Start(start) => stack.push(start_element(&start)?),
            Event::Empty(start) => {
                let element = start_element(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| XmlError::Syntax("unbalanced end tag".to_string()))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| XmlError::Syntax(e.to_string()))?;
                append_text(&mut stack, &text);
            }
            Event::CData(data) => {
                let data = String::from_utf8_lossy(&data.into_inner()).into_owned();
                append_text(&mut stack, &data);
            }
            Event::Eof => break,
            _ => (),
        }
    }
    if !stack.is_empty() {
        return Err(XmlError::Syntax("unclosed element".to_string()));
    }
    root.ok_or(XmlError::Empty)
}

/// Converts a start tag into an element with its attributes.
fn start_element(start: &BytesStart) -> Result<Element, XmlError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut element = Element::new(&name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlError::Syntax(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| XmlError::Syntax(e.to_string()))?;
        element.attrs.push((key, value.into_owned()));
    }
    Ok(element)
}

/// Adds a completed element to its parent, or makes it the root.
fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => {
            return Err(XmlError::Syntax(format!(
                "second root element <{}>",
                element.name
            )))
        }
    }
    Ok(())
}

fn append_text(stack: &mut [Element], text: &str) {
    if let Some(current) = stack.last_mut() {
        current.text.push_str(text);
    }
}

/// An indenting XML writer.
#[derive(Debug, Default)]
pub struct Writer {
    out: String,
    depth: usize,
}

impl Writer {
    /// Creates an empty writer.
    pub fn new() -> Writer {
        Writer::default()
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
    }

    fn tag(&mut self, name: &str, attrs: &[(&str, Cow<'_, str>)]) {
        self.indent();
        self.out.push('<');
        self.out.push_str(name);
        for (key, value) in attrs {
            self.out.push(' ');
            self.out.push_str(key);
            self.out.push_str("=\"");
            self.out.push_str(&escape(value.as_ref()));
            self.out.push('"');
        }
    }

    /// Writes a start tag and indents what follows.
    pub fn open(&mut self, name: &str, attrs: &[(&str, Cow<'_, str>)]) {
        self.tag(name, attrs);
        self.out.push_str(">\n");
        self.depth += 1;
    }

    /// Writes the end tag matching the last `open`.
    pub fn close(&mut self, name: &str) {
        self.depth = self.depth.saturating_sub(1);
        self.indent();
        self.out.push_str("</");
        self.out.push_str(name);
        self.out.push_str(">\n");
    }

    /// Writes a self-closing element.
    pub fn empty(&mut self, name: &str, attrs: &[(&str, Cow<'_, str>)]) {
        self.tag(name, attrs);
        self.out.push_str("/>\n");
    }

    /// Writes an element containing only text.
    pub fn text(&mut self, name: &str, text: &str) {
        self.tag(name, &[]);
        self.out.push('>');
        self.out.push_str(&escape(text));
        self.out.push_str("</");
        self.out.push_str(name);
        self.out.push_str(">\n");
    }

    /// Returns the written document.
    pub fn finish(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_nested() {
        let root = parse(
            r#"<?xml version="1.0"?>
            <a x="1"><b y="&lt;2&gt;"/><c>hello &amp; bye</c></a>"#,
        )
        .unwrap();
        assert_eq!(root.name, "a");
        assert_eq!(root.attr("x"), Some("1"));
        assert_eq!(root.child("b").unwrap().attr("y"), Some("<2>"));
        assert_eq!(root.child("c").unwrap().text, "hello & bye");
    }

    #[test]
    fn parse_errors() {
        assert!(matches!(parse("<a><b></a>"), Err(XmlError::Syntax(_))));
        assert!(matches!(parse("<a>"), Err(XmlError::Syntax(_))));
        assert_eq!(parse("   "), Err(XmlError::Empty));
        assert!(matches!(parse("<a/><b/>"), Err(XmlError::Syntax(_))));
    }

    #[test]
    fn attr_lookup_ignoring_case() {
        let root = parse(r#"<f datatype="int"/>"#).unwrap();
        assert_eq!(root.attr("dataType"), None);
        assert_eq!(root.attr_ignore_case("dataType"), Some("int"));
    }

    #[test]
    fn find_descendant() {
        let root = parse("<doc><meta/><query advanced=\"true\"/></doc>").unwrap();
        assert_eq!(root.find("query").unwrap().attr("advanced"), Some("true"));
        assert!(root.find("schema").is_none());
    }

    #[test]
    fn write_indented() {
        let mut w = Writer::new();
        w.open("a", &[("k", Cow::Borrowed("v\"1"))]);
        w.empty("b", &[]);
        w.text("c", "x<y");
        w.close("a");
        assert_eq!(
            w.finish(),
            "<a k=\"v&quot;1\">\n  <b/>\n  <c>x&lt;y</c>\n</a>\n"
        );
    }

    #[test]
    fn written_text_parses_back() {
        let mut w = Writer::new();
        w.open("a", &[("name", Cow::Borrowed("R & D"))]);
        w.text("code", "'-9'");
        w.close("a");
        let root = parse(&w.finish()).unwrap();
        assert_eq!(root.attr("name"), Some("R & D"));
        assert_eq!(root.child("code").unwrap().text, "'-9'");
    }
}
