/*
 * editor.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * The editor surface contract and the adapter that drives it.
 */

//! The editor surface contract and the adapter that drives it.
//!
//! A concrete rich-text editor plugs in by implementing [`EditorSurface`].
//! [`EditorAdapter`] layers the content rules on top: sanitisation on the
//! way in, last-known content when the surface is not mounted, and the
//! resync steps that bring the host editor's internal state back in line
//! after a programmatic write.
//!
//! Writes are eventually consistent. [`EditorAdapter::set_content`] assigns
//! the body and queues the resync steps; they only take effect once the
//! host calls [`EditorAdapter::run_scheduled`] (typically on its next tick).

use std::collections::VecDeque;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::html::{Fragment, parse_fragment};
use crate::{Error, Result};

/// What any editor integration must provide.
pub trait EditorSurface {
    /// Serialised HTML of the live body, or `None` when not mounted.
    fn body_html(&self) -> Option<String>;

    /// Replace the whole body.
    fn replace_body(&mut self, html: &str) -> Result<()>;

    fn set_editable(&mut self, editable: bool) -> Result<()>;

    /// Put a collapsed caret at the start of the text node at `path`
    /// (child indices from the body down).
    fn place_caret(&mut self, path: &[usize]) -> Result<()>;

    /// Focus the surface so the toolbar re-reads formatting state.
    fn focus(&mut self) -> Result<()>;

    /// Current caret position as a plain-text char offset.
    fn caret_offset(&self) -> Option<usize>;
}

/// Deferred step run after a programmatic write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResyncStep {
    SetEditable(bool),
    PlaceCaret(Vec<usize>),
    Focus,
}

static UNSAFE_ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\s(?:contenteditable|on[a-z]+)(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+))?"#)
        .unwrap()
});

/// Strip `contenteditable` and inline event-handler attributes from every
/// element.
///
/// # Example
///
/// ```rust
/// use smartdocs_core::editor::sanitize;
///
/// assert_eq!(
///     sanitize(r#"<p contenteditable="false" onclick="x()">hi</p>"#),
///     "<p>hi</p>"
/// );
/// ```
pub fn sanitize(html: &str) -> String {
    match parse_fragment(html) {
        Ok(mut fragment) => {
            sanitize_fragment(&mut fragment);
            fragment.to_html()
        }
        Err(err) => {
            debug!(error = %err, "Sanitising unparseable HTML textually");
            UNSAFE_ATTRIBUTE.replace_all(html, "").into_owned()
        }
    }
}

fn sanitize_fragment(fragment: &mut Fragment) {
    fragment.for_each_element_mut(&mut |el| {
        el.attributes.retain(|attr| {
            let name = attr.name.to_ascii_lowercase();
            name != "contenteditable" && !name.starts_with("on")
        });
    });
}

/// Content access on top of an [`EditorSurface`].
#[derive(Debug)]
pub struct EditorAdapter<S> {
    surface: S,
    last_known: String,
    scheduled: VecDeque<ResyncStep>,
}

impl<S: EditorSurface> EditorAdapter<S> {
    pub fn new(surface: S) -> Self {
        let last_known = surface.body_html().unwrap_or_default();
        Self {
            surface,
            last_known,
            scheduled: VecDeque::new(),
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn into_surface(self) -> S {
        self.surface
    }

    /// Live body HTML, or the last content this adapter saw.
    pub fn get_content(&self) -> String {
        self.surface
            .body_html()
            .unwrap_or_else(|| self.last_known.clone())
    }

    /// Sanitise and assign `html`, then queue the resync steps.
    ///
    /// Returns [`Error::EditorUnavailable`] (and changes nothing) when the
    /// surface rejects the assignment; the caller retries on the next user
    /// interaction.
    pub fn set_content(&mut self, html: &str) -> Result<()> {
        let sanitized = sanitize(html);
        self.scheduled.clear();

        if let Err(err) = self.surface.replace_body(&sanitized) {
            warn!(error = %err, "Editor surface rejected content");
            return Err(err);
        }

        let caret = parse_fragment(&sanitized)
            .ok()
            .and_then(|fragment| fragment.first_text_path());
        self.last_known = sanitized;

        self.scheduled.push_back(ResyncStep::SetEditable(false));
        self.scheduled.push_back(ResyncStep::SetEditable(true));
        if let Some(path) = caret {
            self.scheduled.push_back(ResyncStep::PlaceCaret(path));
        }
        self.scheduled.push_back(ResyncStep::Focus);
        Ok(())
    }

    /// Steps queued by the last write and not yet run.
    pub fn pending_steps(&self) -> impl Iterator<Item = &ResyncStep> {
        self.scheduled.iter()
    }

    /// Run the queued resync steps. Returns how many succeeded.
    ///
    /// The first failing step cancels the rest and the content is assigned
    /// again directly, so the body always ends up holding what was written.
    pub fn run_scheduled(&mut self) -> usize {
        let mut ran = 0;
        while let Some(step) = self.scheduled.pop_front() {
            if let Err(err) = self.run_step(&step) {
                warn!(?step, error = %err, "Editor resync failed, assigning content directly");
                self.scheduled.clear();
                if let Err(err) = self.surface.replace_body(&self.last_known) {
                    warn!(error = %err, "Direct content assignment failed");
                }
                break;
            }
            ran += 1;
        }
        ran
    }

    fn run_step(&mut self, step: &ResyncStep) -> Result<()> {
        match step {
            ResyncStep::SetEditable(editable) => self.surface.set_editable(*editable),
            ResyncStep::PlaceCaret(path) => self.surface.place_caret(path),
            ResyncStep::Focus => self.surface.focus(),
        }
    }

    pub fn caret_offset(&self) -> Option<usize> {
        self.surface.caret_offset()
    }
}

/// An in-process editor surface.
///
/// Holds the body as a string and tracks editability, focus and caret the
/// way a browser-hosted editor would. Used on the server, where stored
/// content is reconciled without a browser, and in tests.
#[derive(Debug, Clone)]
pub struct MemoryEditor {
    body: String,
    mounted: bool,
    editable: bool,
    focused: bool,
    caret: Option<usize>,
}

impl Default for MemoryEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEditor {
    pub fn new() -> Self {
        Self::with_content("")
    }

    pub fn with_content(html: impl Into<String>) -> Self {
        Self {
            body: html.into(),
            mounted: true,
            editable: true,
            focused: false,
            caret: None,
        }
    }

    /// A surface that has not been attached yet.
    pub fn unmounted() -> Self {
        Self {
            mounted: false,
            ..Self::new()
        }
    }

    pub fn mount(&mut self) {
        self.mounted = true;
    }

    pub fn unmount(&mut self) {
        self.mounted = false;
        self.focused = false;
    }

    pub fn is_editable(&self) -> bool {
        self.editable
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    /// Move the caret as a user click would.
    pub fn set_caret(&mut self, offset: Option<usize>) {
        self.caret = offset;
    }

    /// Overwrite the body as user typing would, bypassing the adapter.
    pub fn type_content(&mut self, html: impl Into<String>) {
        self.body = html.into();
    }

    fn ensure_mounted(&self) -> Result<()> {
        if self.mounted {
            Ok(())
        } else {
            Err(Error::EditorUnavailable("surface is not mounted".to_string()))
        }
    }
}

impl EditorSurface for MemoryEditor {
    fn body_html(&self) -> Option<String> {
        self.mounted.then(|| self.body.clone())
    }

    fn replace_body(&mut self, html: &str) -> Result<()> {
        self.ensure_mounted()?;
        self.body = html.to_string();
        self.caret = None;
        Ok(())
    }

    fn set_editable(&mut self, editable: bool) -> Result<()> {
        self.ensure_mounted()?;
        self.editable = editable;
        Ok(())
    }

    fn place_caret(&mut self, path: &[usize]) -> Result<()> {
        self.ensure_mounted()?;
        let offset = parse_fragment(&self.body)?
            .offset_of_path(path)
            .ok_or_else(|| Error::EditorUnavailable(format!("no node at {path:?}")))?;
        self.caret = Some(offset);
        Ok(())
    }

    fn focus(&mut self) -> Result<()> {
        self.ensure_mounted()?;
        self.focused = true;
        Ok(())
    }

    fn caret_offset(&self) -> Option<usize> {
        self.caret
    }
}
