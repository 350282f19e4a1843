/*
 * reconciler.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Applies proposed changes to the editor and resolves them.
 */

//! Applies proposed changes to the editor and resolves them.
//!
//! The review cycle has two states. [`Reconciler::apply`] moves from
//! [`ReviewState::Clean`] to [`ReviewState::Previewing`], remembering the
//! normalised pre-change content the first time. [`Reconciler::finalize`]
//! keeps additions and drops deletions; [`Reconciler::revert`] does the
//! opposite. Both move children out of the marker spans, so nested markup
//! inside a change survives.
//!
//! Every operation computes the new HTML completely before touching the
//! editor. A failure part way leaves the editor content as it was.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::change_set::{Addition, ChangeSet, Replacement, TextRange};
use crate::editor::{EditorAdapter, EditorSurface};
use crate::grammar::ChangeTag;
use crate::html::{Element, Fragment, Node, parse_fragment};
use crate::markup::to_display_html;
use crate::normalize::normalize;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewState {
    /// No proposal outstanding.
    #[default]
    Clean,
    /// Proposed changes are visible in the editor.
    Previewing,
}

impl ReviewState {
    pub fn name(self) -> &'static str {
        match self {
            ReviewState::Clean => "clean",
            ReviewState::Previewing => "previewing",
        }
    }
}

/// Result of [`Reconciler::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// HTML pushed into the editor; empty when nothing was applied.
    pub display_html: String,
    pub markers: usize,
    pub pending: bool,
    /// This call stored the pre-change snapshot.
    pub snapshot_taken: bool,
}

/// A change-set entry that could not be placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedChange {
    pub kind: &'static str,
    pub text: String,
}

/// Result of [`Reconciler::apply_change_set`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSetReport {
    pub applied: usize,
    pub skipped: Vec<SkippedChange>,
}

#[derive(Debug)]
pub struct Reconciler<S> {
    editor: EditorAdapter<S>,
    snapshot: Option<String>,
    state: ReviewState,
}

impl<S: EditorSurface> Reconciler<S> {
    /// Wrap an editor. Content that already carries markers (a proposal
    /// saved before a reload) starts out previewing.
    pub fn new(editor: EditorAdapter<S>) -> Self {
        let state = if has_markers(&editor.get_content()) {
            ReviewState::Previewing
        } else {
            ReviewState::Clean
        };
        Self {
            editor,
            snapshot: None,
            state,
        }
    }

    pub fn editor(&self) -> &EditorAdapter<S> {
        &self.editor
    }

    pub fn editor_mut(&mut self) -> &mut EditorAdapter<S> {
        &mut self.editor
    }

    pub fn content(&self) -> String {
        self.editor.get_content()
    }

    pub fn state(&self) -> ReviewState {
        self.state
    }

    /// Normalised content from before the outstanding proposal.
    pub fn snapshot(&self) -> Option<&str> {
        self.snapshot.as_deref()
    }

    /// Render tagged markup into the editor.
    pub fn apply(&mut self, markup: &str) -> Result<ApplyOutcome> {
        if markup.trim().is_empty() {
            debug!("No markup to apply");
            return Ok(ApplyOutcome {
                display_html: String::new(),
                markers: 0,
                pending: self.has_pending_changes(),
                snapshot_taken: false,
            });
        }

        let before = self.editor.get_content();
        let display_html = to_display_html(markup);
        self.editor.set_content(&display_html)?;

        let snapshot_taken = self.snapshot.is_none();
        if snapshot_taken {
            self.snapshot = Some(normalize(&before));
        }

        let markers = marker_count(&display_html);
        let pending = markers > 0 || self.has_pending_changes();
        if pending {
            self.state = ReviewState::Previewing;
        } else if snapshot_taken {
            self.snapshot = None;
        }

        info!(markers, pending, "Applied proposed changes");
        Ok(ApplyOutcome {
            display_html,
            markers,
            pending,
            snapshot_taken,
        })
    }

    /// Accept: keep additions, drop deletions.
    pub fn finalize(&mut self) -> Result<String> {
        self.resolve("finalize", ChangeTag::Addition)
    }

    /// Reject: keep deletions, drop additions.
    pub fn revert(&mut self) -> Result<String> {
        self.resolve("revert", ChangeTag::Deletion)
    }

    fn resolve(&mut self, action: &'static str, keep: ChangeTag) -> Result<String> {
        let current = self.editor.get_content();
        let mut fragment = parse_fragment(&current)?;

        if self.state == ReviewState::Clean && !fragment.contains_markers() {
            return Err(Error::InvalidTransition {
                action,
                state: self.state.name(),
            });
        }

        let resolved = resolve_markers(&mut fragment.nodes, keep);
        let html = fragment.to_html();
        self.editor.set_content(&html)?;

        self.snapshot = None;
        self.state = ReviewState::Clean;
        info!(action, resolved, "Resolved proposed changes");
        Ok(html)
    }

    /// Place a structured change-set into the editor, best effort.
    ///
    /// Flat entries that restate a replacement are skipped; the replacement
    /// places the pair. Deletions are wrapped first (wrapping does not move
    /// text offsets). Then replacements and additions that carry a valid
    /// range are placed together from the highest offset down, so no
    /// insertion shifts a range still waiting. Replacements without a range
    /// are located by first match outside existing markers, and last the
    /// additions without a range go to the caret or the end of the
    /// document. Entries whose target cannot be found are logged and listed
    /// in the report.
    pub fn apply_change_set(&mut self, changes: &ChangeSet) -> Result<ChangeSetReport> {
        let before = self.editor.get_content();
        let mut fragment = parse_fragment(&before)?;
        let mut report = ChangeSetReport::default();
        let restated = changes.restated_by_replacements();

        let deletions = changes
            .deletions
            .iter()
            .zip(&restated.deletions)
            .filter_map(|(deletion, restated)| (!restated).then_some(deletion));
        for deletion in deletions {
            let range = deletion
                .range
                .filter(|range| range_matches(&fragment, *range, &deletion.text))
                .or_else(|| fragment.find_unmarked_text(&deletion.text));
            let placed = range.is_some_and(|range| {
                fragment.splice_text(range, &mut |text, _| {
                    vec![marker_span(ChangeTag::Deletion, vec![Node::Text(text)])]
                }) > 0
            });
            report.record(placed, "deletion", &deletion.text);
        }

        let additions: Vec<_> = changes
            .additions
            .iter()
            .zip(&restated.additions)
            .filter_map(|(addition, restated)| (!restated).then_some(addition))
            .collect();

        let mut ranged = Vec::new();
        let mut searched = Vec::new();
        for replacement in &changes.replacements {
            match replacement
                .range
                .filter(|range| range_matches(&fragment, *range, &replacement.old_text))
            {
                Some(range) => ranged.push((range.start, RangedChange::Replacement(replacement, range))),
                None => searched.push(replacement),
            }
        }
        for addition in &additions {
            if let Some(range) = addition.range {
                ranged.push((range.start, RangedChange::Addition(addition)));
            }
        }
        // Stable: at equal offsets a replacement goes before an addition.
        ranged.sort_by(|a, b| b.0.cmp(&a.0));

        for (offset, change) in ranged {
            match change {
                RangedChange::Replacement(replacement, range) => {
                    let placed = place_replacement(&mut fragment, replacement, range);
                    report.record(placed, "replacement", &replacement.old_text);
                }
                RangedChange::Addition(addition) => {
                    let span =
                        marker_span(ChangeTag::Addition, vec![Node::text(addition.text.clone())]);
                    let placed = fragment.insert_at(offset, vec![span]);
                    report.record(placed, "addition", &addition.text);
                }
            }
        }

        for replacement in searched {
            let placed = fragment
                .find_unmarked_text(&replacement.old_text)
                .is_some_and(|range| place_replacement(&mut fragment, replacement, range));
            report.record(placed, "replacement", &replacement.old_text);
        }

        let caret = self.editor.caret_offset();
        for addition in additions.iter().filter(|a| a.range.is_none()) {
            let span = marker_span(ChangeTag::Addition, vec![Node::text(addition.text.clone())]);
            let offset = caret.unwrap_or_else(|| fragment.text_len());
            if !fragment.insert_at(offset, vec![span.clone()]) {
                fragment.nodes.push(span);
            }
            report.record(true, "addition", &addition.text);
        }

        if report.applied == 0 {
            return Ok(report);
        }

        self.editor.set_content(&fragment.to_html())?;
        if self.snapshot.is_none() {
            self.snapshot = Some(normalize(&before));
        }
        self.state = ReviewState::Previewing;
        info!(
            applied = report.applied,
            skipped = report.skipped.len(),
            "Applied change-set"
        );
        Ok(report)
    }

    /// True while markers are present or the content has drifted from the
    /// pre-change snapshot.
    pub fn has_pending_changes(&self) -> bool {
        let current = self.editor.get_content();
        has_markers(&current)
            || self
                .snapshot
                .as_deref()
                .is_some_and(|snapshot| snapshot != normalize(&current))
    }

    /// Recompute the pending flag and settle the state to match it.
    pub fn sync_state(&mut self) -> bool {
        let pending = self.has_pending_changes();
        if pending {
            self.state = ReviewState::Previewing;
        } else {
            self.snapshot = None;
            self.state = ReviewState::Clean;
        }
        pending
    }
}

impl ChangeSetReport {
    fn record(&mut self, placed: bool, kind: &'static str, text: &str) {
        if placed {
            self.applied += 1;
        } else {
            warn!(kind, text = %text, "Change target not found, skipping");
            self.skipped.push(SkippedChange {
                kind,
                text: text.to_string(),
            });
        }
    }
}

enum RangedChange<'a> {
    Replacement(&'a Replacement, TextRange),
    Addition(&'a Addition),
}

/// Wrap the old text in a deletion marker and follow it with the new text.
fn place_replacement(fragment: &mut Fragment, replacement: &Replacement, range: TextRange) -> bool {
    fragment.splice_text(range, &mut |text, is_last| {
        let mut nodes = vec![marker_span(ChangeTag::Deletion, vec![Node::Text(text)])];
        if is_last && !replacement.new_text.is_empty() {
            nodes.push(marker_span(
                ChangeTag::Addition,
                vec![Node::text(replacement.new_text.clone())],
            ));
        }
        nodes
    }) > 0
}

fn marker_span(tag: ChangeTag, children: Vec<Node>) -> Node {
    Node::Element(Element::span(
        tag.display_classes().unwrap_or_default(),
        children,
    ))
}

fn marker_count(html: &str) -> usize {
    parse_fragment(html).map_or(0, |fragment| fragment.marker_count())
}

fn has_markers(html: &str) -> bool {
    match parse_fragment(html) {
        Ok(fragment) => fragment.contains_markers(),
        Err(_) => html.contains("ai-addition") || html.contains("ai-deletion"),
    }
}

/// A supplied range is used only when it still covers the expected text.
fn range_matches(fragment: &Fragment, range: TextRange, expected: &str) -> bool {
    !range.is_empty()
        && fragment
            .text_content()
            .chars()
            .skip(range.start)
            .take(range.len())
            .eq(expected.chars())
}

/// Unwrap markers of kind `keep` and drop the other kind with its content.
/// Returns the number of markers resolved.
fn resolve_markers(nodes: &mut Vec<Node>, keep: ChangeTag) -> usize {
    let mut resolved = 0;
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes.drain(..) {
        let Node::Element(mut el) = node else {
            out.push(node);
            continue;
        };
        match el.marker() {
            Some(tag) if tag == keep => {
                resolved += 1 + resolve_markers(&mut el.children, keep);
                out.append(&mut el.children);
            }
            Some(_) => resolved += 1,
            None => {
                resolved += resolve_markers(&mut el.children, keep);
                out.push(Node::Element(el));
            }
        }
    }
    *nodes = out;
    resolved
}
