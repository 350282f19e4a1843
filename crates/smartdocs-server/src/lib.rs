//! smartdocs-server: HTTP surface for SmartDocs
//!
//! This crate provides:
//! - Document CRUD scoped to the authenticated user
//! - The completion endpoint that turns a prompt into tagged markup
//! - Server-side apply, finalize and revert over stored documents
//! - Per-user prompt quota accounting

pub mod config;
pub mod context;
pub mod documents;
pub mod error;
pub mod provider;
pub mod server;
pub mod storage;
pub mod usage;

pub use config::{CURRENT_CONFIG_VERSION, ServerConfig};
pub use context::{AppContext, SharedContext};
pub use documents::{Document, DocumentStore, DocumentUpdate, Margins, NewDocument};
pub use error::{Error, Result};
pub use provider::{AnthropicProvider, CompletionProvider};
pub use server::{build_router, run_server};
pub use usage::UsageLedger;
