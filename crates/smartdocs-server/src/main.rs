//! SmartDocs binary - document editing server with AI-proposed changes

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use smartdocs_server::{AppContext, ServerConfig, server};

/// Config file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "smartdocs.json";

#[derive(Parser, Debug)]
#[command(name = "smartdocs")]
#[command(about = "Document editing server with AI-proposed changes")]
struct Args {
    /// JSON config file (defaults to ./smartdocs.json when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short = 'P', long)]
    port: Option<u16>,

    /// Host to bind to
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Directory for persisted documents and usage
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Completion model name
    #[arg(long)]
    model: Option<String>,

    /// Base URL of the completion API
    #[arg(long)]
    api_base_url: Option<String>,

    /// API key for the completion API
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

impl Args {
    /// Read the config file, then let flags override it.
    fn into_config(self) -> smartdocs_server::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                ServerConfig::load(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => ServerConfig::default(),
        };

        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(data_dir) = self.data_dir {
            config.data_dir = Some(data_dir);
        }
        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(api_base_url) = self.api_base_url {
            config.api_base_url = api_base_url;
        }
        if self.api_key.is_some() {
            config.api_key = self.api_key;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "smartdocs_server=info,smartdocs_core=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Args::parse().into_config()?;
    info!(
        host = %config.host,
        port = config.port,
        model = %config.model,
        "Starting SmartDocs"
    );

    let ctx = Arc::new(AppContext::from_config(config)?);
    server::run_server(ctx).await?;

    Ok(())
}
