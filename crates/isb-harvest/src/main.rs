//! isb - Main entry point

use clap::Parser;
use isb_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use isb_harvest::{commands, Cli, Commands, HarvestConfig};
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(if cli.verbose {
            LogLevel::Debug
        } else {
            LogLevel::Info
        })
        .output(LogOutput::Console)
        .log_file_prefix("isb")
        .filter_directives("sqlx=warn,hyper=warn,reqwest=warn")
        .build();

    // Environment variables take precedence when set
    let log_config = LogConfig::from_env()
        .ok()
        .filter(|_| std::env::var_os("ISB_LOG_LEVEL").is_some())
        .unwrap_or(log_config);

    let guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {:#}", e);
            None
        },
    };

    if let Err(e) = run(&cli).await {
        error!(error = %format!("{:#}", e), "Command failed");
        // flush file logs before exiting
        drop(guard);
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let mut config = HarvestConfig::from_env()?;
    if let Some(url) = &cli.database_url {
        config.store.url = url.clone();
    }
    if let Some(pool_size) = cli.pool_size {
        config.harvest.pool_size = pool_size;
    }
    config.validate()?;

    match &cli.command {
        Commands::Harvest(args) => commands::harvest(&config, args).await,
        Commands::Sitemap(args) => commands::sitemap(&config, args).await,
        Commands::Export(args) => commands::export(&config, args).await,
        Commands::PublishSitemap(args) => commands::publish_sitemap(&config, args).await,
        Commands::Stats => commands::stats(&config).await,
    }
}
