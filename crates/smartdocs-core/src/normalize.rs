/*
 * normalize.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Canonical HTML for change detection.
 */

//! Canonical HTML for change detection.
//!
//! [`normalize`] is a comparison key, never display output: it drops the
//! attributes and wrapper elements the editor injects on its own, sorts
//! what is left, and squeezes whitespace, so two strings that render the
//! same content compare equal.
//!
//! Inline formatting tags (`u`, `i`, `b`, `strong`, `em`, `mark`) are swapped
//! for placeholder tokens before the generic pass and restored afterwards,
//! so formatting a user applied by hand always counts as a change.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

const PROTECTED_OPEN: char = '\u{E000}';
const PROTECTED_CLOSE: char = '\u{E001}';

/// Attributes the editor adds or rewrites without any content change.
const NOISE_ATTRIBUTES: &[&str] = &[
    "id",
    "class",
    "style",
    "contenteditable",
    "translate",
    "spellcheck",
];

static PROTECTED_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<(/?)(u|i|b|strong|em|mark)(?:\s[^>]*)?>").unwrap());

static PROTECTED_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new("\u{E000}([0-9]+)\u{E001}").unwrap());

static COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());

static TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<(/?)([A-Za-z][A-Za-z0-9:-]*)((?:\s[^>]*)?)>").unwrap());

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([^\s=/>"']+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#).unwrap()
});

static WRAPPER_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?(?:div|span)>").unwrap());

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

static BETWEEN_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r">\s+<").unwrap());

/// Canonical form of `html` for equality comparison.
///
/// # Example
///
/// ```rust
/// use smartdocs_core::normalize::normalize;
///
/// assert_eq!(
///     normalize(r#"<P id="x1" class="mce">Hello</P>"#),
///     normalize("<p>Hello</p>")
/// );
/// ```
pub fn normalize(html: &str) -> String {
    let mut protected = Vec::new();
    let html = PROTECTED_TAG.replace_all(html, |caps: &Captures<'_>| {
        let canonical = format!("<{}{}>", &caps[1], caps[2].to_ascii_lowercase());
        protected.push(canonical);
        format!("{PROTECTED_OPEN}{}{PROTECTED_CLOSE}", protected.len() - 1)
    });

    let html = COMMENT.replace_all(&html, "");
    let html = TAG.replace_all(&html, |caps: &Captures<'_>| canonical_tag(caps));
    let html = WRAPPER_TAG.replace_all(&html, "");
    let html = html.replace("&nbsp;", " ").replace('\u{a0}', " ");
    let html = WHITESPACE.replace_all(&html, " ");

    // Restored before the inter-tag pass so whitespace beside a protected
    // tag is squeezed like any other.
    let html = PROTECTED_TOKEN.replace_all(&html, |caps: &Captures<'_>| {
        caps[1]
            .parse::<usize>()
            .ok()
            .and_then(|i| protected.get(i))
            .cloned()
            .unwrap_or_default()
    });
    BETWEEN_TAGS.replace_all(&html, "><").trim().to_string()
}

/// True when the two contents differ after normalization.
pub fn content_has_meaningful_changes(before: &str, after: &str) -> bool {
    normalize(before) != normalize(after)
}

fn canonical_tag(caps: &Captures<'_>) -> String {
    let name = caps[2].to_ascii_lowercase();
    if !caps[1].is_empty() {
        return format!("</{name}>");
    }

    let mut attributes: Vec<(String, String)> = ATTRIBUTE
        .captures_iter(&caps[3])
        .filter_map(|attr| {
            let key = attr[1].to_ascii_lowercase();
            if is_noise_attribute(&key) {
                return None;
            }
            let value = attr
                .get(2)
                .or_else(|| attr.get(3))
                .or_else(|| attr.get(4))
                .map_or("", |m| m.as_str());
            Some((key, value.trim().to_string()))
        })
        .collect();
    attributes.sort();

    let mut tag = format!("<{name}");
    for (key, value) in attributes {
        tag.push_str(&format!(" {key}=\"{value}\""));
    }
    tag.push('>');
    tag
}

fn is_noise_attribute(name: &str) -> bool {
    NOISE_ATTRIBUTES.contains(&name) || name.starts_with("data-")
}
