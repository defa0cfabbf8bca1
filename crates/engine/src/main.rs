use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use fathom_domain::config::ConfigSeverity;
use fathom_engine::cli::{build_capabilities, load_config, repl, Cli};

/// Exit codes: 0 clean, 1 configuration error, 2 unhandled runtime
/// error.
#[tokio::main]
async fn main() {
    std::process::exit(run().await);
}

async fn run() -> i32 {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("config error: {e}");
            return 1;
        }
    };

    init_tracing(config.engine.verbose);

    let issues = config.validate();
    let mut fatal = false;
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => {
                eprintln!("config: {issue}");
                fatal = true;
            }
        }
    }
    if fatal {
        return 1;
    }

    let caps = match build_capabilities(&config) {
        Ok(caps) => caps,
        Err(e) => {
            eprintln!("config error: {e}");
            return 1;
        }
    };

    match repl::run(Arc::new(config), caps).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("runtime error: {e}");
            2
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "info,fathom_engine=debug,fathom_context=debug,fathom_providers=debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}
