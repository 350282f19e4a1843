/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Error types for smartdocs-core.
 */

//! Error types for smartdocs-core.

/// Result type alias for smartdocs-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The HTML fragment could not be tokenized.
    #[error("HTML syntax error: {message}")]
    HtmlSyntax {
        message: String,
        /// Byte offset where the tokenizer gave up.
        position: Option<u64>,
    },

    /// Display conversion did not reach a fixed point.
    #[error("change tags still unresolved after {passes} passes")]
    UnresolvedNesting { passes: usize },

    /// The editor surface rejected an operation (not mounted, detached, ...).
    #[error("editor surface unavailable: {0}")]
    EditorUnavailable(String),

    /// A review transition was requested from the wrong state.
    #[error("cannot {action} while the document is {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },

    /// A non-premium user has used up their prompt allowance.
    #[error("{0}")]
    QuotaExhausted(String),
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::HtmlSyntax {
            message: err.to_string(),
            position: None,
        }
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Error::HtmlSyntax {
            message: format!("invalid attribute: {}", err),
            position: None,
        }
    }
}
