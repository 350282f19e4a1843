/*
 * markup.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Tagged markup to display HTML and to change-sets.
 */

//! Tagged markup to display HTML and to change-sets.
//!
//! Display conversion pairs each closing change tag with the nearest open
//! tag of the same kind, which is non-greedy matching for flat sequences
//! and correct pairing for nested ones. Each pass rewrites every pair it
//! can; passes repeat until one converts nothing, and whatever change tags
//! are still unpaired at that point are dropped with their content kept.
//! Content inside the tags is copied byte for byte apart from line breaks.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::change_set::{Addition, ChangeSet, Deletion, Replacement};
use crate::grammar::ChangeTag;
use crate::html::{markup_spans, parse_fragment};
use crate::{Error, Result};

/// Upper bound on display passes before falling back.
const MAX_PASSES: usize = 8;

const LINE_BREAK: &str = "<br/>";

static REVIEW_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<(/?)(addition|deletion)(?:\s[^>]*)?>").unwrap());

static ADDITION_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<addition(?:\s[^>]*)?>(.*?)</addition\s*>").unwrap());

static DELETION_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<deletion(?:\s[^>]*)?>(.*?)</deletion\s*>").unwrap());

static REPLACEMENT_PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)<deletion(?:\s[^>]*)?>(.*?)</deletion\s*>\s*<addition(?:\s[^>]*)?>(.*?)</addition\s*>",
    )
    .unwrap()
});

/// Convert tagged markup into HTML the editor can render.
///
/// Never fails: if the full conversion cannot finish, a minimal
/// substitution pass is used instead.
///
/// # Example
///
/// ```rust
/// use smartdocs_core::markup::to_display_html;
///
/// let html = to_display_html("<p>a <addition>b</addition></p>");
/// assert_eq!(
///     html,
///     r#"<p>a <span class="ai-addition ai-badge highlight">b</span></p>"#
/// );
/// ```
pub fn to_display_html(markup: &str) -> String {
    match render_display_html(markup) {
        Ok(html) => html,
        Err(err) => {
            warn!(error = %err, "Falling back to minimal display conversion");
            minimal_display_html(markup)
        }
    }
}

fn render_display_html(markup: &str) -> Result<String> {
    let mut html = normalize_line_breaks(markup);

    for _ in 0..MAX_PASSES {
        let (next, converted) = convert_pass(&html);
        html = next;
        if converted == 0 {
            return Ok(drop_orphan_tags(&html));
        }
        debug!(converted, "Converted change tags");
    }

    Err(Error::UnresolvedNesting { passes: MAX_PASSES })
}

/// Turn escaped `\n` sequences and CRLF in text into plain newlines.
fn normalize_line_breaks(markup: &str) -> String {
    map_text(markup, |text| text.replace("\\n", "\n").replace("\r\n", "\n"))
}

/// Rewrite the text between tags with `f`, copying tags and comments as is.
fn map_text(source: &str, f: impl Fn(&str) -> String) -> String {
    let mut out = String::with_capacity(source.len());
    let mut last = 0;
    for span in markup_spans(source) {
        out.push_str(&f(&source[last..span.start]));
        out.push_str(&source[span.clone()]);
        last = span.end;
    }
    out.push_str(&f(&source[last..]));
    out
}

struct TagToken {
    start: usize,
    end: usize,
    closing: bool,
    tag: ChangeTag,
}

/// One conversion pass. Returns the rewritten text and the number of tag
/// pairs converted.
fn convert_pass(source: &str) -> (String, usize) {
    let tokens: Vec<TagToken> = REVIEW_TAG
        .captures_iter(source)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(TagToken {
                start: whole.start(),
                end: whole.end(),
                closing: !caps[1].is_empty(),
                tag: ChangeTag::from_name(&caps[2])?,
            })
        })
        .collect();

    let mut paired = vec![false; tokens.len()];
    let mut open: Vec<usize> = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        if !token.closing {
            open.push(i);
            continue;
        }
        if let Some(pos) = open.iter().rposition(|&j| tokens[j].tag == token.tag) {
            let j = open.remove(pos);
            paired[i] = true;
            paired[j] = true;
        }
    }

    let spans = markup_spans(source);
    let mut out = String::with_capacity(source.len() + source.len() / 4);
    let mut cursor = 0;
    let mut depth = 0usize;
    for (token, is_paired) in tokens.iter().zip(&paired) {
        push_text(&mut out, source, &spans, cursor..token.start, depth > 0);
        if *is_paired {
            if token.closing {
                out.push_str("</span>");
                depth = depth.saturating_sub(1);
            } else {
                let classes = token.tag.display_classes().unwrap_or_default();
                out.push_str("<span class=\"");
                out.push_str(classes);
                out.push_str("\">");
                depth += 1;
            }
        } else {
            out.push_str(&source[token.start..token.end]);
        }
        cursor = token.end;
    }
    push_text(&mut out, source, &spans, cursor..source.len(), depth > 0);

    (out, paired.iter().filter(|p| **p).count() / 2)
}

/// Copy `source[range]`, rendering newlines in text as line breaks.
///
/// Newlines inside a tag (`spans`) are tag formatting and are kept. Inside
/// a change every other newline is a line break. Outside, a newline that
/// only separates two tags is source formatting and is kept as is.
fn push_text(
    out: &mut String,
    source: &str,
    spans: &[Range<usize>],
    range: Range<usize>,
    inside_change: bool,
) {
    let from = range.start;
    let segment = &source[range];
    let mut last = 0;
    for (i, _) in segment.match_indices('\n') {
        out.push_str(&segment[last..i]);
        let at = from + i;
        let in_tag = spans
            .get(spans.partition_point(|span| span.end <= at))
            .is_some_and(|span| span.contains(&at));
        if in_tag || (!inside_change && is_between_tags(source, at)) {
            out.push('\n');
        } else {
            out.push_str(LINE_BREAK);
        }
        last = i + 1;
    }
    out.push_str(&segment[last..]);
}

fn is_between_tags(source: &str, newline: usize) -> bool {
    let before = source[..newline].trim_end();
    let after = source[newline + 1..].trim_start();
    before.ends_with('>') && after.starts_with('<')
}

fn drop_orphan_tags(html: &str) -> String {
    if !REVIEW_TAG.is_match(html) {
        return html.to_string();
    }
    warn!("Dropping unpaired change tags from markup");
    REVIEW_TAG.replace_all(html, "").into_owned()
}

/// The last-resort conversion: line breaks plus one substitution round.
pub fn minimal_display_html(markup: &str) -> String {
    let html = map_text(&normalize_line_breaks(markup), |text| text.replace('\n', LINE_BREAK));
    let html = ADDITION_BLOCK.replace_all(
        &html,
        format!(
            r#"<span class="{}">$1</span>"#,
            ChangeTag::Addition.display_classes().unwrap_or_default()
        )
        .as_str(),
    );
    DELETION_BLOCK
        .replace_all(
            &html,
            format!(
                r#"<span class="{}">$1</span>"#,
                ChangeTag::Deletion.display_classes().unwrap_or_default()
            )
            .as_str(),
        )
        .into_owned()
}

/// Extract the structured change-set from tagged markup.
///
/// Every addition and deletion is listed on its own, and each deletion
/// immediately followed by an addition (whitespace between them allowed) is
/// also listed as a replacement. Entries hold the plain text of the tag
/// content. If that content cannot be read as HTML the whole change-set is
/// empty.
pub fn to_change_set(markup: &str) -> ChangeSet {
    let markup = normalize_line_breaks(markup);
    match extract_change_set(&markup) {
        Ok(changes) => changes,
        Err(err) => {
            warn!(error = %err, "Could not read change content, returning an empty change-set");
            ChangeSet::default()
        }
    }
}

fn extract_change_set(markup: &str) -> Result<ChangeSet> {
    let mut changes = ChangeSet::default();

    for caps in ADDITION_BLOCK.captures_iter(markup) {
        let text = plain_text(&caps[1])?;
        if !text.is_empty() {
            changes.additions.push(Addition::new(text));
        }
    }

    for caps in DELETION_BLOCK.captures_iter(markup) {
        let text = plain_text(&caps[1])?;
        if !text.is_empty() {
            changes.deletions.push(Deletion::new(text));
        }
    }

    for caps in REPLACEMENT_PAIR.captures_iter(markup) {
        let old_text = plain_text(&caps[1])?;
        let new_text = plain_text(&caps[2])?;
        if !old_text.is_empty() || !new_text.is_empty() {
            changes.replacements.push(Replacement::new(old_text, new_text));
        }
    }

    Ok(changes)
}

fn plain_text(inner_html: &str) -> Result<String> {
    Ok(parse_fragment(inner_html)?.text_content())
}
