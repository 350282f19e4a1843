/*
 * session.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Document session state and its transitions.
 */

//! Document session state and its transitions.
//!
//! All editing-session state lives in one [`SessionState`] value and only
//! changes through [`reduce`], which is pure: it updates the state and
//! returns the [`SessionEffect`]s the caller has to carry out. Editor
//! effects feed their results back in as new actions.
//!
//! [`DocumentSession`] is the usual driver. It owns the [`Reconciler`], runs
//! the editor effects itself, and hands back only the effects that leave the
//! process (the completion request and persistence).

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::editor::EditorSurface;
use crate::grammar::ModelResponse;
use crate::quota::{PromptQuota, QUOTA_EXHAUSTED_MESSAGE};
use crate::reconciler::{Reconciler, ReviewState};

/// The one message shown for any failed completion request.
pub const GENERIC_FAILURE_MESSAGE: &str =
    "Sorry, something went wrong while generating a response. Please try again.";

/// Shown when the model elided part of the document.
pub const INCOMPLETE_RESPONSE_WARNING: &str = "The AI response skipped part of the document, so the suggested changes may be incomplete. Review them carefully before accepting.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    #[default]
    Ready,
    /// A completion request is in flight; new prompts are ignored.
    Loading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    /// Client-side notices such as the quota warning.
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// Current document HTML as last seen by the session.
    pub content: String,
    pub review: ReviewState,
    /// Proposed changes are outstanding.
    pub pending: bool,
    pub request: RequestState,
    pub chat: Vec<ChatMessage>,
    pub quota: PromptQuota,
    /// Notice to show alongside the chat, if any.
    pub warning: Option<String>,
}

impl SessionState {
    pub fn new(content: impl Into<String>, quota: PromptQuota) -> Self {
        Self {
            content: content.into(),
            quota,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    PromptSubmitted { prompt: String },
    CompletionReceived(ModelResponse),
    CompletionFailed { error: String },
    /// Markup from a completion reached the editor.
    MarkupApplied { content: String, pending: bool },
    FinalizeRequested,
    RevertRequested,
    /// A finalize or revert finished with this content.
    ChangesResolved { content: String },
    /// The user changed the document directly.
    ContentEdited { content: String },
    PendingChecked { pending: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEffect {
    RequestCompletion { prompt: String, content: String },
    ApplyMarkup { markup: String },
    Finalize,
    Revert,
    CheckPending,
    PersistContent { content: String },
}

impl SessionEffect {
    /// Effects that need something outside the editor.
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            SessionEffect::RequestCompletion { .. } | SessionEffect::PersistContent { .. }
        )
    }
}

/// Apply `action` to `state`, returning the effects to run.
pub fn reduce(state: &mut SessionState, action: SessionAction) -> Vec<SessionEffect> {
    match action {
        SessionAction::PromptSubmitted { prompt } => {
            if state.request == RequestState::Loading {
                debug!("Prompt ignored, a request is already in flight");
                return vec![];
            }
            let prompt = prompt.trim().to_string();
            if prompt.is_empty() {
                return vec![];
            }
            if !state.quota.can_submit() {
                state.warning = Some(QUOTA_EXHAUSTED_MESSAGE.to_string());
                state
                    .chat
                    .push(ChatMessage::new(ChatRole::System, QUOTA_EXHAUSTED_MESSAGE));
                return vec![];
            }
            state.request = RequestState::Loading;
            state.warning = None;
            state.chat.push(ChatMessage::new(ChatRole::User, prompt.clone()));
            vec![SessionEffect::RequestCompletion {
                prompt,
                content: state.content.clone(),
            }]
        }

        SessionAction::CompletionReceived(response) => {
            if state.request != RequestState::Loading {
                debug!("Dropping completion with no request in flight");
                return vec![];
            }
            state.request = RequestState::Ready;
            state.quota.record_prompt();
            state
                .chat
                .push(ChatMessage::new(ChatRole::Assistant, response.reply));
            state.warning = response
                .contains_placeholders
                .then(|| INCOMPLETE_RESPONSE_WARNING.to_string());

            if response.markup.trim().is_empty() {
                vec![]
            } else {
                vec![SessionEffect::ApplyMarkup {
                    markup: response.markup,
                }]
            }
        }

        SessionAction::CompletionFailed { error } => {
            warn!(error = %error, "Completion request failed");
            state.request = RequestState::Ready;
            state
                .chat
                .push(ChatMessage::new(ChatRole::Assistant, GENERIC_FAILURE_MESSAGE));
            vec![]
        }

        SessionAction::MarkupApplied { content, pending } => {
            state.pending = pending;
            if pending {
                state.review = ReviewState::Previewing;
            }
            state.content = content.clone();
            vec![SessionEffect::PersistContent { content }]
        }

        SessionAction::FinalizeRequested => resolve_if_pending(state, SessionEffect::Finalize),
        SessionAction::RevertRequested => resolve_if_pending(state, SessionEffect::Revert),

        SessionAction::ChangesResolved { content } => {
            state.review = ReviewState::Clean;
            state.pending = false;
            state.warning = None;
            state.content = content.clone();
            vec![SessionEffect::PersistContent { content }]
        }

        SessionAction::ContentEdited { content } => {
            state.content = content;
            vec![SessionEffect::CheckPending]
        }

        SessionAction::PendingChecked { pending } => {
            state.pending = pending;
            state.review = if pending {
                ReviewState::Previewing
            } else {
                ReviewState::Clean
            };
            vec![]
        }
    }
}

fn resolve_if_pending(state: &SessionState, effect: SessionEffect) -> Vec<SessionEffect> {
    if !state.pending && state.review == ReviewState::Clean {
        debug!("Nothing to resolve");
        return vec![];
    }
    vec![effect]
}

/// A [`SessionState`] wired to a live editor.
#[derive(Debug)]
pub struct DocumentSession<S> {
    state: SessionState,
    reconciler: Reconciler<S>,
}

impl<S: EditorSurface> DocumentSession<S> {
    pub fn new(reconciler: Reconciler<S>, quota: PromptQuota) -> Self {
        let mut state = SessionState::new(reconciler.content(), quota);
        state.review = reconciler.state();
        state.pending = reconciler.has_pending_changes();
        Self { state, reconciler }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn reconciler(&self) -> &Reconciler<S> {
        &self.reconciler
    }

    pub fn reconciler_mut(&mut self) -> &mut Reconciler<S> {
        &mut self.reconciler
    }

    /// Reduce `action`, run the resulting editor effects, and return the
    /// external ones in the order they were produced.
    pub fn dispatch(&mut self, action: SessionAction) -> Vec<SessionEffect> {
        let mut external = Vec::new();
        let mut queue: VecDeque<SessionEffect> = reduce(&mut self.state, action).into();

        while let Some(effect) = queue.pop_front() {
            if effect.is_external() {
                external.push(effect);
                continue;
            }
            if let Some(follow_up) = self.run_editor_effect(effect) {
                queue.extend(reduce(&mut self.state, follow_up));
            }
        }
        external
    }

    fn run_editor_effect(&mut self, effect: SessionEffect) -> Option<SessionAction> {
        let result = match effect {
            SessionEffect::ApplyMarkup { markup } => {
                self.reconciler.apply(&markup).map(|outcome| SessionAction::MarkupApplied {
                    content: self.reconciler.content(),
                    pending: outcome.pending,
                })
            }
            SessionEffect::Finalize => self
                .reconciler
                .finalize()
                .map(|content| SessionAction::ChangesResolved { content }),
            SessionEffect::Revert => self
                .reconciler
                .revert()
                .map(|content| SessionAction::ChangesResolved { content }),
            SessionEffect::CheckPending => Ok(SessionAction::PendingChecked {
                pending: self.reconciler.sync_state(),
            }),
            SessionEffect::RequestCompletion { .. } | SessionEffect::PersistContent { .. } => {
                return None;
            }
        };

        match result {
            Ok(action) => Some(action),
            Err(err) => {
                warn!(error = %err, "Editor effect skipped");
                None
            }
        }
    }
}
