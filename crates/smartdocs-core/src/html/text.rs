/*
 * text.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Plain-text offsets over a fragment tree.
 */

//! Plain-text offsets over a fragment tree.
//!
//! Offsets are counted in chars of [`Fragment::text_content`], the same
//! projection the change-set ranges refer to. Void elements and comments
//! contribute nothing to the projection.

use super::{Fragment, Node};
use crate::change_set::TextRange;

fn byte_index(text: &str, char_index: usize) -> usize {
    text.char_indices()
        .nth(char_index)
        .map_or(text.len(), |(i, _)| i)
}

impl Fragment {
    /// First occurrence of `needle` in the plain-text projection.
    pub fn find_text(&self, needle: &str) -> Option<TextRange> {
        if needle.is_empty() {
            return None;
        }
        let haystack = self.text_content();
        let byte_start = haystack.find(needle)?;
        let start = haystack[..byte_start].chars().count();
        Some(TextRange::new(start, start + needle.chars().count()))
    }

    /// First occurrence of `needle` that does not overlap a marker span.
    ///
    /// Text already proposed for addition or deletion is not a target for
    /// further changes.
    pub fn find_unmarked_text(&self, needle: &str) -> Option<TextRange> {
        if needle.is_empty() {
            return None;
        }
        let marked = self.marked_ranges();
        let haystack = self.text_content();
        let needle_len = needle.chars().count();
        haystack.match_indices(needle).find_map(|(byte_start, _)| {
            let start = haystack[..byte_start].chars().count();
            let range = TextRange::new(start, start + needle_len);
            (!marked
                .iter()
                .any(|m| m.start < range.end && range.start < m.end))
            .then_some(range)
        })
    }

    /// Plain-text ranges covered by marker spans, in document order.
    pub fn marked_ranges(&self) -> Vec<TextRange> {
        fn walk(nodes: &[Node], pos: &mut usize, out: &mut Vec<TextRange>) {
            for node in nodes {
                match node {
                    Node::Text(text) => *pos += text.chars().count(),
                    Node::Element(el) if el.marker().is_some() => {
                        let start = *pos;
                        *pos += node.text_content().chars().count();
                        out.push(TextRange::new(start, *pos));
                    }
                    Node::Element(el) => walk(&el.children, pos, out),
                    Node::Comment(_) | Node::Raw(_) => {}
                }
            }
        }

        let mut ranges = Vec::new();
        walk(&self.nodes, &mut 0, &mut ranges);
        ranges
    }

    /// Total length of the plain-text projection, in chars.
    pub fn text_len(&self) -> usize {
        self.text_content().chars().count()
    }

    /// Replace every piece of text covered by `range` with the nodes `f`
    /// returns for it.
    ///
    /// A range that crosses element boundaries touches several text nodes;
    /// `f` is called once per covered segment, in document order, with the
    /// segment's text and whether it is the last segment of the range.
    /// Returns the number of segments replaced (zero when the range is empty
    /// or lies beyond the text).
    pub fn splice_text(
        &mut self,
        range: TextRange,
        f: &mut dyn FnMut(String, bool) -> Vec<Node>,
    ) -> usize {
        if range.is_empty() {
            return 0;
        }
        let mut pos = 0;
        splice_nodes(&mut self.nodes, &mut pos, range, f)
    }

    /// Insert `new_nodes` at a plain-text offset, splitting the text node
    /// that contains it. Returns false when no text node reaches `offset`.
    ///
    /// Offsets strictly inside a marker span are never insertion points; an
    /// offset on a marker's edge inserts beside the marker.
    pub fn insert_at(&mut self, offset: usize, new_nodes: Vec<Node>) -> bool {
        let mut pos = 0;
        let mut pending = Some(new_nodes);
        insert_nodes(&mut self.nodes, &mut pos, offset, &mut pending)
    }

    /// Child-index path to the first text node with visible content.
    pub fn first_text_path(&self) -> Option<Vec<usize>> {
        fn find(nodes: &[Node], path: &mut Vec<usize>) -> bool {
            for (i, node) in nodes.iter().enumerate() {
                path.push(i);
                let found = match node {
                    Node::Text(text) => !text.trim().is_empty(),
                    Node::Element(el) => find(&el.children, path),
                    Node::Comment(_) | Node::Raw(_) => false,
                };
                if found {
                    return true;
                }
                path.pop();
            }
            false
        }

        let mut path = Vec::new();
        find(&self.nodes, &mut path).then_some(path)
    }

    /// Plain-text offset at which the node at `path` starts.
    pub fn offset_of_path(&self, path: &[usize]) -> Option<usize> {
        let mut offset = 0;
        let mut nodes = &self.nodes;
        for (depth, &index) in path.iter().enumerate() {
            let node = nodes.get(index)?;
            offset += nodes[..index]
                .iter()
                .map(|n| n.text_content().chars().count())
                .sum::<usize>();
            if depth + 1 == path.len() {
                break;
            }
            nodes = &node.as_element()?.children;
        }
        Some(offset)
    }
}

fn splice_nodes(
    nodes: &mut Vec<Node>,
    pos: &mut usize,
    range: TextRange,
    f: &mut dyn FnMut(String, bool) -> Vec<Node>,
) -> usize {
    let mut replaced = 0;
    let mut i = 0;

    while i < nodes.len() && *pos < range.end {
        let split = match &mut nodes[i] {
            Node::Text(text) => {
                let node_start = *pos;
                let node_end = node_start + text.chars().count();
                *pos = node_end;

                let seg_start = range.start.max(node_start);
                let seg_end = range.end.min(node_end);
                if seg_start < seg_end {
                    let a = byte_index(text, seg_start - node_start);
                    let b = byte_index(text, seg_end - node_start);
                    Some((
                        text[..a].to_string(),
                        text[a..b].to_string(),
                        text[b..].to_string(),
                        seg_end == range.end,
                    ))
                } else {
                    None
                }
            }
            Node::Element(el) => {
                replaced += splice_nodes(&mut el.children, pos, range, f);
                None
            }
            Node::Comment(_) | Node::Raw(_) => None,
        };

        let Some((before, middle, after, is_last)) = split else {
            i += 1;
            continue;
        };

        let mut replacement = Vec::new();
        if !before.is_empty() {
            replacement.push(Node::Text(before));
        }
        replacement.extend(f(middle, is_last));
        if !after.is_empty() {
            replacement.push(Node::Text(after));
        }

        let inserted = replacement.len();
        nodes.splice(i..=i, replacement);
        i += inserted;
        replaced += 1;
    }

    replaced
}

enum Placement {
    Split(usize),
    Before,
    After,
}

fn insert_nodes(
    nodes: &mut Vec<Node>,
    pos: &mut usize,
    offset: usize,
    pending: &mut Option<Vec<Node>>,
) -> bool {
    for i in 0..nodes.len() {
        let placement = match &mut nodes[i] {
            Node::Text(text) => {
                let node_start = *pos;
                let len = text.chars().count();
                *pos += len;
                (node_start..=node_start + len)
                    .contains(&offset)
                    .then(|| Placement::Split(byte_index(text, offset - node_start)))
            }
            Node::Element(el) if el.marker().is_some() => {
                let node_start = *pos;
                *pos += el
                    .children
                    .iter()
                    .map(|c| c.text_content().chars().count())
                    .sum::<usize>();
                if offset == node_start {
                    Some(Placement::Before)
                } else if offset == *pos {
                    Some(Placement::After)
                } else {
                    None
                }
            }
            Node::Element(el) => {
                if insert_nodes(&mut el.children, pos, offset, pending) {
                    return true;
                }
                None
            }
            Node::Comment(_) | Node::Raw(_) => None,
        };

        let Some(placement) = placement else {
            continue;
        };
        let Some(new_nodes) = pending.take() else {
            return false;
        };

        match placement {
            Placement::Before => {
                nodes.splice(i..i, new_nodes);
            }
            Placement::After => {
                nodes.splice(i + 1..i + 1, new_nodes);
            }
            Placement::Split(split_at) => {
                let Node::Text(text) = &nodes[i] else {
                    return false;
                };
                let (before, after) = text.split_at(split_at);
                let (before, after) = (before.to_string(), after.to_string());

                let mut replacement = Vec::new();
                if !before.is_empty() {
                    replacement.push(Node::Text(before));
                }
                replacement.extend(new_nodes);
                if !after.is_empty() {
                    replacement.push(Node::Text(after));
                }
                nodes.splice(i..=i, replacement);
            }
        }
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::{Element, parse_fragment};

    fn wrap(class: &'static str) -> impl FnMut(String, bool) -> Vec<Node> {
        move |text, _| vec![Node::Element(Element::span(class, vec![Node::Text(text)]))]
    }

    #[test]
    fn test_find_text_counts_chars() {
        let fragment = parse_fragment("<p>café <b>au</b> lait</p>").unwrap();
        assert_eq!(fragment.find_text("au lait"), Some(TextRange::new(5, 12)));
        assert_eq!(fragment.find_text("missing"), None);
        assert_eq!(fragment.find_text(""), None);
    }

    #[test]
    fn test_find_unmarked_text_skips_marker_spans() {
        let fragment = parse_fragment(
            r#"<p>a <span class="ai-deletion ai-badge strikethrough">quick</span> quick fox</p>"#,
        )
        .unwrap();
        assert_eq!(fragment.marked_ranges(), vec![TextRange::new(2, 7)]);
        assert_eq!(fragment.find_text("quick"), Some(TextRange::new(2, 7)));
        assert_eq!(fragment.find_unmarked_text("quick"), Some(TextRange::new(8, 13)));
        assert_eq!(fragment.find_unmarked_text("ck qu"), None);
    }

    #[test]
    fn test_splice_within_one_text_node() {
        let mut fragment = parse_fragment("<p>the quick fox</p>").unwrap();
        let segments = fragment.splice_text(TextRange::new(4, 9), &mut wrap("x"));
        assert_eq!(segments, 1);
        assert_eq!(
            fragment.to_html(),
            r#"<p>the <span class="x">quick</span> fox</p>"#
        );
    }

    #[test]
    fn test_splice_across_elements() {
        let mut fragment = parse_fragment("<p>one <b>two</b> three</p>").unwrap();
        let range = fragment.find_text("e two th").unwrap();
        let segments = fragment.splice_text(range, &mut wrap("x"));
        assert_eq!(segments, 3);
        assert_eq!(
            fragment.to_html(),
            r#"<p>on<span class="x">e </span><b><span class="x">two</span></b><span class="x"> th</span>ree</p>"#
        );
        assert_eq!(fragment.text_content(), "one two three");
    }

    #[test]
    fn test_splice_reports_last_segment() {
        let mut fragment = parse_fragment("<p>ab<i>cd</i></p>").unwrap();
        let mut flags = Vec::new();
        fragment.splice_text(TextRange::new(1, 3), &mut |text, last| {
            flags.push(last);
            vec![Node::Text(text)]
        });
        assert_eq!(flags, vec![false, true]);
    }

    #[test]
    fn test_insert_at_splits_text() {
        let mut fragment = parse_fragment("<p>hello world</p>").unwrap();
        assert!(fragment.insert_at(5, vec![Node::text(",")]));
        assert_eq!(fragment.to_html(), "<p>hello, world</p>");
    }

    #[test]
    fn test_insert_at_end_of_text() {
        let mut fragment = parse_fragment("<p>end</p>").unwrap();
        assert!(fragment.insert_at(3, vec![Node::text("!")]));
        assert_eq!(fragment.to_html(), "<p>end!</p>");
    }

    #[test]
    fn test_insert_beyond_text_fails() {
        let mut fragment = parse_fragment("<p>short</p>").unwrap();
        assert!(!fragment.insert_at(50, vec![Node::text("x")]));
        assert_eq!(fragment.to_html(), "<p>short</p>");
    }

    #[test]
    fn test_insert_beside_marker() {
        let mut fragment = parse_fragment(
            r#"<p>a<span class="ai-deletion ai-badge strikethrough">bc</span></p>"#,
        )
        .unwrap();
        assert!(!fragment.insert_at(2, vec![Node::text("x")]));
        assert!(fragment.insert_at(3, vec![Node::text("!")]));
        assert_eq!(
            fragment.to_html(),
            r#"<p>a<span class="ai-deletion ai-badge strikethrough">bc</span>!</p>"#
        );
    }

    #[test]
    fn test_first_text_path_skips_whitespace() {
        let fragment = parse_fragment("<div> <p></p><p><em>first</em></p></div>").unwrap();
        assert_eq!(fragment.first_text_path(), Some(vec![0, 2, 0, 0]));
        assert_eq!(parse_fragment("<p> </p>").unwrap().first_text_path(), None);
    }

    #[test]
    fn test_offset_of_path() {
        let fragment = parse_fragment("<p>ab</p><p>c<em>de</em></p>").unwrap();
        assert_eq!(fragment.offset_of_path(&[1, 1, 0]), Some(3));
        assert_eq!(fragment.offset_of_path(&[0]), Some(0));
        assert_eq!(fragment.offset_of_path(&[5]), None);
    }
}
