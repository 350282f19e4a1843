//! Core of SmartDocs AI-assisted editing.
//!
//! Proposed edits travel as *tagged markup*: the complete document HTML with
//! each change wrapped in an inline `<addition>` or `<deletion>` tag. This
//! crate covers everything between the model's raw text and the editor:
//!
//! - [`grammar`]: the tag vocabulary and how a raw response is split into
//!   markup and a conversational reply.
//! - [`markup`]: tagged markup to display HTML and to a [`ChangeSet`].
//! - [`html`]: the small fragment tree the rest of the crate edits.
//! - [`editor`]: the [`EditorSurface`] contract and its adapter.
//! - [`reconciler`]: apply, finalize and revert against a live editor.
//! - [`normalize`]: canonical HTML for "did anything really change?".
//! - [`session`]: the session state container and its reducer.
//! - [`quota`]: the free-tier prompt allowance.
//!
//! # Example
//!
//! ```rust
//! use smartdocs_core::editor::{EditorAdapter, MemoryEditor};
//! use smartdocs_core::grammar::interpret_response;
//! use smartdocs_core::reconciler::Reconciler;
//!
//! let editor = EditorAdapter::new(MemoryEditor::with_content("<p>Hello world</p>"));
//! let mut reconciler = Reconciler::new(editor);
//!
//! let response = interpret_response(
//!     "<p><deletion>Hello</deletion><addition>Hi</addition> world</p>\n---USER_MESSAGE---\nShortened the greeting.",
//! );
//! reconciler.apply(&response.markup).unwrap();
//! assert!(reconciler.has_pending_changes());
//!
//! assert_eq!(reconciler.finalize().unwrap(), "<p>Hi world</p>");
//! ```

pub mod change_set;
pub mod editor;
pub mod error;
pub mod grammar;
pub mod html;
pub mod markup;
pub mod normalize;
pub mod quota;
pub mod reconciler;
pub mod session;

pub use change_set::{Addition, ChangeSet, Deletion, Replacement, TextRange};
pub use editor::{EditorAdapter, EditorSurface, MemoryEditor};
pub use error::{Error, Result};
pub use grammar::{ChangeTag, ModelResponse, interpret_response};
pub use markup::{to_change_set, to_display_html};
pub use normalize::{content_has_meaningful_changes, normalize};
pub use quota::PromptQuota;
pub use reconciler::{Reconciler, ReviewState};
pub use session::{DocumentSession, SessionAction, SessionEffect, SessionState, reduce};
