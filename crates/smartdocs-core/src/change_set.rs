/*
 * change_set.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Structured view of a proposed edit.
 */

//! Structured view of a proposed edit.
//!
//! A [`ChangeSet`] is only meaningful against the exact content string it
//! was computed from: ranges are char offsets into that content's plain-text
//! projection, and text without a range is located by first occurrence.
//!
//! Replacements are recorded *in addition to* the flat addition/deletion
//! lists. Summary views read `replacements`. The editor merge path places
//! each replacement as one adjacent pair and skips the flat entries that
//! restate it (see [`ChangeSet::restated_by_replacements`]).

use serde::{Deserialize, Serialize};

/// Half-open `[start, end)` char range into a plain-text projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRange {
    pub start: usize,
    pub end: usize,
}

impl TextRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Addition {
    pub text: String,
    /// Where to insert; `range.start` is the insertion point.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<TextRange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deletion {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<TextRange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Replacement {
    pub old_text: String,
    pub new_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<TextRange>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    #[serde(default)]
    pub additions: Vec<Addition>,
    #[serde(default)]
    pub deletions: Vec<Deletion>,
    #[serde(default)]
    pub replacements: Vec<Replacement>,
}

impl Addition {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            range: None,
        }
    }

    pub fn at(text: impl Into<String>, offset: usize) -> Self {
        Self {
            text: text.into(),
            range: Some(TextRange::new(offset, offset)),
        }
    }
}

impl Deletion {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            range: None,
        }
    }
}

impl Replacement {
    pub fn new(old_text: impl Into<String>, new_text: impl Into<String>) -> Self {
        Self {
            old_text: old_text.into(),
            new_text: new_text.into(),
            range: None,
        }
    }

    /// A replacement of the `old_text` that starts at `offset`.
    pub fn at(old_text: impl Into<String>, new_text: impl Into<String>, offset: usize) -> Self {
        let old_text = old_text.into();
        let end = offset + old_text.chars().count();
        Self {
            old_text,
            new_text: new_text.into(),
            range: Some(TextRange::new(offset, end)),
        }
    }
}

/// Flags over the flat lists, true where an entry restates a replacement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Restated {
    pub additions: Vec<bool>,
    pub deletions: Vec<bool>,
}

impl ChangeSet {
    /// Match every replacement to the first unclaimed flat deletion of its
    /// old text and flat addition of its new text.
    pub fn restated_by_replacements(&self) -> Restated {
        let mut restated = Restated {
            additions: vec![false; self.additions.len()],
            deletions: vec![false; self.deletions.len()],
        };
        for replacement in &self.replacements {
            if let Some(i) = (0..self.deletions.len())
                .find(|&i| !restated.deletions[i] && self.deletions[i].text == replacement.old_text)
            {
                restated.deletions[i] = true;
            }
            if let Some(i) = (0..self.additions.len())
                .find(|&i| !restated.additions[i] && self.additions[i].text == replacement.new_text)
            {
                restated.additions[i] = true;
            }
        }
        restated
    }

    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.deletions.is_empty() && self.replacements.is_empty()
    }

    /// Number of entries across all three lists.
    pub fn len(&self) -> usize {
        self.additions.len() + self.deletions.len() + self.replacements.len()
    }
}
