/*
 * grammar.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Change-tag vocabulary and the model response protocol.
 */

//! Change-tag vocabulary and the model response protocol.
//!
//! The model is asked to return the *complete* document with each proposed
//! change wrapped in an inline tag, then the [`RESPONSE_SEPARATOR`], then a
//! short conversational reply. [`interpret_response`] turns whatever came
//! back into a [`ModelResponse`], repairing the usual deviations: missing
//! separator, commentary prepended to the document, Markdown code fences,
//! and placeholder ellipses standing in for unchanged text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Splits a model response into document markup (before) and reply (after).
pub const RESPONSE_SEPARATOR: &str = "---USER_MESSAGE---";

/// Instructions sent with every edit request: the tag grammar, the
/// full-document contract and the separator.
pub const SYSTEM_PROMPT: &str = r#"You are an editing assistant for a rich-text document editor. The user sends the current document as HTML together with an instruction.

When the instruction asks for changes to the document:
- Return the COMPLETE document HTML. Never abbreviate, summarise or elide any part of it, and never write placeholders such as "[... rest of the document ...]".
- Wrap every inserted piece of text in <addition>...</addition> and every removed piece in <deletion>...</deletion>. For a replacement, put the <deletion> immediately before the <addition>.
- You may also use <move>, <format> and <comment> where appropriate.
- Keep all existing HTML tags and attributes that you do not change.
- Do not wrap the document in code fences and do not add any commentary before it.

After the document, write a line containing only ---USER_MESSAGE--- and then a short, friendly message to the user describing what you changed.

When the instruction is only a question and needs no document change, reply with the message alone."#;

/// Reply used when the model returned markup without a separator.
pub const DEFAULT_CONFIRMATION: &str = "I've updated the document with the suggested changes. Review the highlighted edits, then accept or revert them.";

/// Commentary the model sometimes puts in front of the document.
pub const BOILERPLATE_PREFIXES: &[&str] = &[
    "Here is the edited document with the changes marked:",
    "Here is the edited document:",
    "Here's the edited document:",
    "Here is the updated document:",
    "Here's the updated document:",
    "Here is the revised document:",
    "Here's the revised document:",
    "Here is the document with the requested changes:",
    "Here's the document with the requested changes:",
];

/// Inline tags the model may use to mark a proposed change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeTag {
    Addition,
    Deletion,
    Move,
    Format,
    Comment,
}

impl ChangeTag {
    pub const ALL: [ChangeTag; 5] = [
        ChangeTag::Addition,
        ChangeTag::Deletion,
        ChangeTag::Move,
        ChangeTag::Format,
        ChangeTag::Comment,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ChangeTag::Addition => "addition",
            ChangeTag::Deletion => "deletion",
            ChangeTag::Move => "move",
            ChangeTag::Format => "format",
            ChangeTag::Comment => "comment",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|tag| tag.name().eq_ignore_ascii_case(name))
    }

    /// Only additions and deletions take part in preview/accept/revert.
    /// `move`, `format` and `comment` are valid markup but pass through
    /// every stage untouched.
    pub fn participates_in_review(self) -> bool {
        matches!(self, ChangeTag::Addition | ChangeTag::Deletion)
    }

    /// Class identifying the display span for this change.
    pub fn marker_class(self) -> Option<&'static str> {
        match self {
            ChangeTag::Addition => Some("ai-addition"),
            ChangeTag::Deletion => Some("ai-deletion"),
            _ => None,
        }
    }

    /// Full class list of the display span for this change.
    pub fn display_classes(self) -> Option<&'static str> {
        match self {
            ChangeTag::Addition => Some("ai-addition ai-badge highlight"),
            ChangeTag::Deletion => Some("ai-deletion ai-badge strikethrough"),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChangeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

static OPENING_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<(?:addition|deletion|move|format|comment)(?:\s[^>]*)?>").unwrap()
});

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[ \t]*\[\s*(?:\.{3}|…)[^\[\]]*\][ \t]*(?:\r?\n)?").unwrap()
});

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\A```[A-Za-z]*[ \t]*\r?\n(.*?)\r?\n?```\z").unwrap());

/// A model response split into its two parts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelResponse {
    /// Tagged document markup; empty when no document change was proposed.
    pub markup: String,
    /// Conversational reply for the chat sidebar.
    pub reply: String,
    /// The model elided part of the document, so the merge may be incomplete.
    pub contains_placeholders: bool,
}

/// True if `text` contains an opening tag from the change vocabulary.
pub fn contains_change_tags(text: &str) -> bool {
    OPENING_TAG.is_match(text)
}

/// Interpret a raw model response.
///
/// # Example
///
/// ```rust
/// use smartdocs_core::grammar::interpret_response;
///
/// let response = interpret_response(
///     "<p>Hi <addition>there</addition></p>\n---USER_MESSAGE---\nAdded a word.",
/// );
/// assert_eq!(response.markup, "<p>Hi <addition>there</addition></p>");
/// assert_eq!(response.reply, "Added a word.");
/// ```
pub fn interpret_response(raw: &str) -> ModelResponse {
    if let Some((before, after)) = raw.split_once(RESPONSE_SEPARATOR) {
        let (markup, contains_placeholders) = clean_markup(before);
        return ModelResponse {
            markup,
            reply: after.trim().to_string(),
            contains_placeholders,
        };
    }

    if contains_change_tags(raw) {
        debug!("No separator in model response, treating it as markup");
        let (markup, contains_placeholders) = clean_markup(raw);
        return ModelResponse {
            markup,
            reply: DEFAULT_CONFIRMATION.to_string(),
            contains_placeholders,
        };
    }

    ModelResponse {
        markup: String::new(),
        reply: raw.trim().to_string(),
        contains_placeholders: false,
    }
}

/// Strip fences, boilerplate and placeholders from the markup part.
///
/// Returns the cleaned markup and whether placeholders were found.
pub fn clean_markup(markup: &str) -> (String, bool) {
    let mut text = markup.trim();

    if let Some(inner) = CODE_FENCE.captures(text).and_then(|c| c.get(1)) {
        text = inner.as_str().trim();
    }

    if let Some(prefix) = BOILERPLATE_PREFIXES
        .iter()
        .find(|prefix| text.starts_with(*prefix))
    {
        debug!(prefix = %prefix, "Stripping boilerplate prefix from markup");
        text = text[prefix.len()..].trim_start();
    }

    let contains_placeholders = PLACEHOLDER.is_match(text);
    if contains_placeholders {
        warn!("Model response elided part of the document with placeholders");
        let stripped = PLACEHOLDER.replace_all(text, "");
        return (stripped.trim().to_string(), true);
    }

    (text.to_string(), false)
}
