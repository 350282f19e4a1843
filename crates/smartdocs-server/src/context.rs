//! Server context - shared state for the request handlers
//!
//! Holds the configuration, the document store, the usage ledger and the
//! completion provider.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::documents::DocumentStore;
use crate::error::Result;
use crate::provider::{AnthropicProvider, CompletionProvider, UnconfiguredProvider};
use crate::usage::UsageLedger;

/// Shared context for the server.
///
/// This is wrapped in `Arc` and shared across all request handlers. The
/// stores lock internally; nothing here is held across a completion call.
pub struct AppContext {
    config: ServerConfig,
    documents: DocumentStore,
    usage: UsageLedger,
    provider: Arc<dyn CompletionProvider>,
}

impl AppContext {
    /// Build the context described by `config`, opening persisted stores
    /// when a data directory is set.
    pub fn from_config(config: ServerConfig) -> Result<Self> {
        let provider: Arc<dyn CompletionProvider> = match AnthropicProvider::from_config(&config)? {
            Some(provider) => {
                info!(model = %config.model, "Using Anthropic completion provider");
                Arc::new(provider)
            }
            None => {
                warn!("No API key configured; AI requests will fail");
                Arc::new(UnconfiguredProvider)
            }
        };
        Self::with_provider(config, provider)
    }

    /// Build the context with an explicit completion provider.
    pub fn with_provider(config: ServerConfig, provider: Arc<dyn CompletionProvider>) -> Result<Self> {
        let (documents, usage) = match &config.data_dir {
            Some(dir) => {
                info!(data_dir = %dir.display(), "Persisting to data directory");
                (
                    DocumentStore::open(dir)?,
                    UsageLedger::open(dir, config.prompt_limit, config.premium_users.clone())?,
                )
            }
            None => {
                info!("No data directory; documents are kept in memory only");
                (
                    DocumentStore::in_memory(),
                    UsageLedger::in_memory(config.prompt_limit, config.premium_users.clone()),
                )
            }
        };

        Ok(Self {
            config,
            documents,
            usage,
            provider,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    pub fn usage(&self) -> &UsageLedger {
        &self.usage
    }

    pub fn provider(&self) -> &dyn CompletionProvider {
        self.provider.as_ref()
    }
}

/// Type alias for the shared context used in axum handlers.
pub type SharedContext = Arc<AppContext>;
