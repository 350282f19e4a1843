/*
 * parser.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Lenient HTML fragment parser on top of quick-xml.
 */

//! Lenient HTML fragment parser on top of quick-xml.
//!
//! quick-xml is an XML tokenizer, so the HTML-specific rules live here:
//! void elements never take children, end tags close the nearest open
//! element with the same name (implicitly closing anything opened after
//! it), stray end tags are dropped and elements still open at end of input
//! are closed there. Text is decoded with the HTML5 entity table; text that
//! fails to decode is kept literally, the same way a browser treats an
//! unknown entity. A `<` that cannot open a tag (`x < 5`) is text, as in
//! HTML5, and is escaped before tokenizing.

use std::borrow::Cow;
use std::ops::Range;

use quick_xml::Reader;
use quick_xml::escape::{resolve_html5_entity, unescape_with};
use quick_xml::events::{BytesEnd, BytesStart, Event};
use tracing::debug;

use super::{Attribute, Element, Fragment, Node};
use crate::{Error, Result};

/// Parse an HTML fragment.
///
/// # Example
///
/// ```rust
/// use smartdocs_core::html::parse_fragment;
///
/// let fragment = parse_fragment("<p>Hello <b>there</b></p>").unwrap();
/// assert_eq!(fragment.text_content(), "Hello there");
/// ```
///
/// # Errors
///
/// Returns [`Error::HtmlSyntax`] when the tokenizer rejects the input.
pub fn parse_fragment(content: &str) -> Result<Fragment> {
    let source = escape_stray_angles(content);
    let mut parser = FragmentParser::new(&source);
    parser.parse()
}

/// Byte ranges of the tags, comments and declarations in `source`, in
/// order. Everything outside them is text.
///
/// Tags are skipped whole, so a `<` or newline inside a quoted attribute
/// value belongs to its tag.
pub(crate) fn markup_spans(source: &str) -> Vec<Range<usize>> {
    let bytes = source.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }
        let end = if source[i..].starts_with("<!--") {
            source[i + 4..]
                .find("-->")
                .map_or(bytes.len(), |end| i + 4 + end + 3)
        } else if opens_markup(&bytes[i + 1..]) {
            tag_end(bytes, i + 1)
        } else {
            i += 1;
            continue;
        };
        spans.push(i..end);
        i = end;
    }

    spans
}

/// Escape every `<` that does not start a tag, comment or declaration.
fn escape_stray_angles(source: &str) -> Cow<'_, str> {
    let spans = markup_spans(source);
    let mut out: Option<String> = None;
    let mut last = 0;

    for (i, _) in source.match_indices('<') {
        let in_markup = spans
            .get(spans.partition_point(|span| span.end <= i))
            .is_some_and(|span| span.contains(&i));
        if in_markup {
            continue;
        }
        let out = out.get_or_insert_with(|| String::with_capacity(source.len() + 8));
        out.push_str(&source[last..i]);
        out.push_str("&lt;");
        last = i + 1;
    }

    match out {
        Some(mut out) => {
            out.push_str(&source[last..]);
            Cow::Owned(out)
        }
        None => Cow::Borrowed(source),
    }
}

fn opens_markup(rest: &[u8]) -> bool {
    match rest {
        [b, ..] if b.is_ascii_alphabetic() => true,
        [b'/', b, ..] if b.is_ascii_alphabetic() => true,
        [b'!' | b'?', ..] => true,
        _ => false,
    }
}

/// Index just past the `>` that ends the tag whose name starts at `from`.
/// Quotes only delimit a value right after `=`.
fn tag_end(bytes: &[u8], from: usize) -> usize {
    let mut quote = None;
    let mut after_equals = false;
    for (offset, &b) in bytes[from..].iter().enumerate() {
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            continue;
        }
        match b {
            b'"' | b'\'' if after_equals => quote = Some(b),
            b'>' => return from + offset + 1,
            _ => {}
        }
        if !b.is_ascii_whitespace() {
            after_equals = b == b'=';
        }
    }
    bytes.len()
}

/// Internal parser state.
struct FragmentParser<'a> {
    reader: Reader<&'a [u8]>,

    /// Top-level nodes parsed so far.
    nodes: Vec<Node>,

    /// Elements whose end tag has not been seen yet.
    stack: Vec<Element>,
}

impl<'a> FragmentParser<'a> {
    fn new(source: &'a str) -> Self {
        let mut reader = Reader::from_str(source);
        let config = reader.config_mut();
        config.trim_text_start = false;
        config.trim_text_end = false;
        config.check_end_names = false;
        config.allow_unmatched_ends = true;
        config.check_comments = false;

        Self {
            reader,
            nodes: Vec::new(),
            stack: Vec::new(),
        }
    }

    fn parse(&mut self) -> Result<Fragment> {
        loop {
            match self.reader.read_event() {
                Ok(Event::Start(e)) => {
                    let element = self.open_element(&e)?;
                    if element.is_void() {
                        self.append(Node::Element(element));
                    } else {
                        self.stack.push(element);
                    }
                }
                Ok(Event::Empty(e)) => {
                    let mut element = self.open_element(&e)?;
                    element.self_closing = true;
                    self.append(Node::Element(element));
                }
                Ok(Event::End(e)) => self.close_element(&e),
                Ok(Event::Text(e)) => {
                    let raw = String::from_utf8_lossy(&e);
                    if raw.is_empty() {
                        continue;
                    }
                    let decoded =
                        unescape_with(&raw, resolve_html5_entity).map(|text| text.into_owned());
                    let text = match decoded {
                        Ok(text) => text,
                        Err(err) => {
                            debug!(error = %err, "Keeping undecodable text literally");
                            raw.into_owned()
                        }
                    };
                    self.append(Node::Text(text));
                }
                Ok(Event::CData(e)) => {
                    let raw = format!("<![CDATA[{}]]>", String::from_utf8_lossy(&e));
                    self.append(Node::Raw(raw));
                }
                Ok(Event::Comment(e)) => {
                    self.append(Node::Comment(String::from_utf8_lossy(&e).into_owned()));
                }
                Ok(Event::DocType(e)) => {
                    let raw = format!("<!DOCTYPE {}>", String::from_utf8_lossy(&e).trim());
                    self.append(Node::Raw(raw));
                }
                Ok(Event::PI(_) | Event::Decl(_)) => {
                    // Processing instructions have no meaning in editor HTML
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::HtmlSyntax {
                        message: e.to_string(),
                        position: Some(self.reader.error_position()),
                    });
                }
            }
        }

        // Close anything left open at end of input
        while let Some(element) = self.stack.pop() {
            self.append(Node::Element(element));
        }

        Ok(Fragment::new(std::mem::take(&mut self.nodes)))
    }

    fn open_element(&self, e: &BytesStart<'_>) -> Result<Element> {
        let mut element = Element::new(String::from_utf8_lossy(e.name().as_ref()));

        let mut attributes = e.html_attributes();
        attributes.with_checks(false);
        for attr in attributes {
            let attr = attr?;
            element.attributes.push(Attribute {
                name: String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
                value: String::from_utf8_lossy(&attr.value).into_owned(),
            });
        }

        Ok(element)
    }

    fn close_element(&mut self, e: &BytesEnd<'_>) {
        let name = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();

        let Some(position) = self.stack.iter().rposition(|el| el.name == name) else {
            if !super::VOID_ELEMENTS.contains(&name.as_str()) {
                debug!(tag = %name, "Dropping end tag with no open element");
            }
            return;
        };

        while self.stack.len() > position {
            if let Some(element) = self.stack.pop() {
                self.append(Node::Element(element));
            }
        }
    }

    fn append(&mut self, node: Node) {
        match self.stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => self.nodes.push(node),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(node: &Node) -> &Element {
        node.as_element().expect("expected element")
    }

    #[test]
    fn test_parse_multiple_top_level_nodes() {
        let fragment = parse_fragment("<p>one</p><p>two</p>tail").unwrap();
        assert_eq!(fragment.nodes.len(), 3);
        assert_eq!(fragment.nodes[2], Node::text("tail"));
    }

    #[test]
    fn test_void_elements_take_no_children() {
        let fragment = parse_fragment("<p>a<br>b<img src=x.png>c</p>").unwrap();
        let p = element(&fragment.nodes[0]);
        assert_eq!(p.children.len(), 5);
        assert!(element(&p.children[1]).children.is_empty());
        assert_eq!(element(&p.children[3]).attribute("src"), Some("x.png"));
    }

    #[test]
    fn test_unclosed_elements_close_at_end() {
        let fragment = parse_fragment("<p>open <em>still open").unwrap();
        assert_eq!(fragment.to_html(), "<p>open <em>still open</em></p>");
    }

    #[test]
    fn test_end_tag_closes_intervening_elements() {
        let fragment = parse_fragment("<p><b>bold</p>after").unwrap();
        assert_eq!(fragment.to_html(), "<p><b>bold</b></p>after");
    }

    #[test]
    fn test_stray_end_tag_is_dropped() {
        let fragment = parse_fragment("text</div> more").unwrap();
        assert_eq!(fragment.to_html(), "text more");
    }

    #[test]
    fn test_tag_names_are_lowercased() {
        let fragment = parse_fragment("<P>Shout</P>").unwrap();
        assert_eq!(fragment.to_html(), "<p>Shout</p>");
    }

    #[test]
    fn test_valueless_and_unquoted_attributes() {
        let fragment = parse_fragment("<input disabled value=plain>").unwrap();
        let input = element(&fragment.nodes[0]);
        assert_eq!(input.attribute("disabled"), Some(""));
        assert_eq!(input.attribute("value"), Some("plain"));
    }

    #[test]
    fn test_bare_less_than_is_text() {
        let fragment = parse_fragment("<p>if x < 5 then <b>stop</b></p>").unwrap();
        assert_eq!(fragment.text_content(), "if x < 5 then stop");
        assert_eq!(fragment.to_html(), "<p>if x &lt; 5 then <b>stop</b></p>");

        let fragment = parse_fragment("a <3 b</ 4 <=c").unwrap();
        assert_eq!(fragment.text_content(), "a <3 b</ 4 <=c");
    }

    #[test]
    fn test_less_than_inside_attribute_and_comment_is_kept() {
        let html = r#"<p title="a < b">x</p><!-- 1 < 2 -->"#;
        let fragment = parse_fragment(html).unwrap();
        assert_eq!(element(&fragment.nodes[0]).attribute("title"), Some("a < b"));
        assert_eq!(fragment.to_html(), html);
    }

    #[test]
    fn test_markup_spans_cover_whole_tags() {
        let source = "a <p\n title=\"x > y\">b</p> < c<!-- d -->";
        let spans: Vec<&str> = markup_spans(source)
            .into_iter()
            .map(|span| &source[span])
            .collect();
        assert_eq!(spans, vec!["<p\n title=\"x > y\">", "</p>", "<!-- d -->"]);
    }

    #[test]
    fn test_unknown_entity_is_kept_literally() {
        let fragment = parse_fragment("<p>a &madeup; b</p>").unwrap();
        assert_eq!(fragment.text_content(), "a &madeup; b");
    }
}
