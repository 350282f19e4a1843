/*
 * mod.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * A small owned HTML fragment tree.
 */

//! A small owned HTML fragment tree.
//!
//! Editor content is an HTML *fragment* (the body of the editing surface),
//! not a document, so the tree here has no single root: a [`Fragment`] is
//! just a list of top-level [`Node`]s. Text nodes hold decoded text, so
//! [`Fragment::text_content`] matches what a browser reports as the
//! element's `textContent`, and serialisation re-escapes it.
//!
//! The parser is deliberately lenient (see [`parse_fragment`]); the only
//! failure surface is input the tokenizer cannot make sense of at all.

mod parser;
mod text;

pub use parser::parse_fragment;
pub(crate) use parser::markup_spans;

use std::fmt;

use crate::grammar::ChangeTag;

/// Elements that never have content or an end tag.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// An attribute as written in the source.
///
/// `value` is kept in its escaped source form; nothing in this crate
/// interprets attribute values beyond class lists and names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Lowercased tag name.
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
    /// Whether the source used `<name/>` syntax.
    pub self_closing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    /// Decoded text.
    Text(String),
    Comment(String),
    /// Markup kept verbatim (doctype, CDATA).
    Raw(String),
}

/// A parsed HTML fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    pub nodes: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_ascii_lowercase(),
            attributes: Vec::new(),
            children: Vec::new(),
            self_closing: false,
        }
    }

    /// Build a `<span class="...">` around `children`.
    pub fn span(class: &str, children: Vec<Node>) -> Self {
        let mut span = Self::new("span");
        span.set_attribute("class", class);
        span.children = children;
        span
    }

    pub fn is_void(&self) -> bool {
        VOID_ELEMENTS.contains(&self.name.as_str())
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .map(|a| a.value.as_str())
    }

    pub fn set_attribute(&mut self, name: &str, value: &str) {
        match self
            .attributes
            .iter_mut()
            .find(|a| a.name.eq_ignore_ascii_case(name))
        {
            Some(attr) => attr.value = value.to_string(),
            None => self.attributes.push(Attribute {
                name: name.to_string(),
                value: value.to_string(),
            }),
        }
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attribute("class")
            .is_some_and(|classes| classes.split_ascii_whitespace().any(|c| c == class))
    }

    /// The change this element marks, if it is an addition or deletion
    /// marker span produced by the display conversion.
    pub fn marker(&self) -> Option<ChangeTag> {
        if self.name != "span" {
            return None;
        }
        [ChangeTag::Addition, ChangeTag::Deletion]
            .into_iter()
            .find(|tag| tag.marker_class().is_some_and(|class| self.has_class(class)))
    }
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(text.into())
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(element) => Some(element),
            _ => None,
        }
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Node::Text(text) => out.push_str(text),
            Node::Element(element) => {
                for child in &element.children {
                    child.collect_text(out);
                }
            }
            Node::Comment(_) | Node::Raw(_) => {}
        }
    }

    /// Plain text of this node and its descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }
}

impl Fragment {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The plain-text projection of the fragment.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            node.collect_text(&mut out);
        }
        out
    }

    /// Count marker spans anywhere in the tree, nested ones included.
    pub fn marker_count(&self) -> usize {
        fn count(nodes: &[Node]) -> usize {
            nodes
                .iter()
                .map(|node| match node {
                    Node::Element(el) => usize::from(el.marker().is_some()) + count(&el.children),
                    _ => 0,
                })
                .sum()
        }
        count(&self.nodes)
    }

    pub fn contains_markers(&self) -> bool {
        self.marker_count() > 0
    }

    /// Visit every element depth-first, parents before children.
    pub fn for_each_element_mut(&mut self, f: &mut impl FnMut(&mut Element)) {
        fn walk(nodes: &mut [Node], f: &mut impl FnMut(&mut Element)) {
            for node in nodes {
                if let Node::Element(el) = node {
                    f(el);
                    walk(&mut el.children, f);
                }
            }
        }
        walk(&mut self.nodes, f);
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        write_nodes(&self.nodes, &mut out);
        out
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_html())
    }
}

/// Serialise nodes the way `innerHTML` would.
pub fn write_nodes(nodes: &[Node], out: &mut String) {
    for node in nodes {
        write_node(node, out);
    }
}

fn write_node(node: &Node, out: &mut String) {
    match node {
        Node::Element(el) => {
            out.push('<');
            out.push_str(&el.name);
            for attr in &el.attributes {
                out.push(' ');
                out.push_str(&attr.name);
                if attr.value.contains('"') {
                    out.push_str("='");
                    out.push_str(&attr.value);
                    out.push('\'');
                } else {
                    out.push_str("=\"");
                    out.push_str(&attr.value);
                    out.push('"');
                }
            }
            if el.self_closing && el.children.is_empty() {
                out.push_str("/>");
                return;
            }
            out.push('>');
            if el.is_void() {
                return;
            }
            write_nodes(&el.children, out);
            out.push_str("</");
            out.push_str(&el.name);
            out.push('>');
        }
        Node::Text(text) => escape_text(text, out),
        Node::Comment(comment) => {
            out.push_str("<!--");
            out.push_str(comment);
            out.push_str("-->");
        }
        Node::Raw(raw) => out.push_str(raw),
    }
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}
