//! Command-line surface: argument parsing, config loading, and the
//! interactive REPL.

pub mod repl;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use fathom_domain::config::Config;
use fathom_domain::error::{Error, Result};
use fathom_providers::{BraveSearch, FsDocReader, HttpFetcher, OpenRouterClient};

use crate::orchestrator::Capabilities;

#[derive(Parser, Debug)]
#[command(name = "fathom", about = "Deep-research agent engine", version)]
pub struct Cli {
    /// Path to the TOML config file (missing file means defaults).
    #[arg(long, default_value = "fathom.toml")]
    pub config: PathBuf,

    /// Override the event store root directory.
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Override the report vault directory.
    #[arg(long)]
    pub vault: Option<PathBuf>,
}

/// Load config from the TOML file (defaults if absent), then overlay
/// environment variables and CLI flags.
pub fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = if cli.config.exists() {
        let raw = std::fs::read_to_string(&cli.config).map_err(Error::Io)?;
        toml::from_str(&raw).map_err(|e| Error::Config(format!("{}: {e}", cli.config.display())))?
    } else {
        Config::default()
    };

    config.apply_env();
    if let Some(store) = &cli.store {
        config.engine.store_path = store.clone();
    }
    if let Some(vault) = &cli.vault {
        config.engine.vault_path = vault.clone();
    }
    Ok(config)
}

/// Build the live capability adapters from config.
pub fn build_capabilities(config: &Config) -> Result<Capabilities> {
    let request_timeout = Duration::from_secs(config.engine.request_timeout_secs);
    Ok(Capabilities {
        chat: std::sync::Arc::new(OpenRouterClient::from_config(&config.llm, request_timeout)?),
        searcher: std::sync::Arc::new(BraveSearch::from_config(&config.search, request_timeout)?),
        fetcher: std::sync::Arc::new(HttpFetcher::new(request_timeout)?),
        docs: std::sync::Arc::new(FsDocReader),
    })
}
