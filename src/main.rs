mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing::warn;

// mimalloc keeps memory flat under concurrent fetch/parse churn
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use linkscan_core::config::AppConfig;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config_str = std::fs::read_to_string(&cli.config).unwrap_or_else(|_| {
        warn!(path = %cli.config, "config file not found, using defaults");
        include_str!("../config/default.toml").to_string()
    });
    let mut config: AppConfig = toml::from_str(&config_str)?;

    // Environment overrides for deployment tuning
    if let Ok(v) = std::env::var("LINKSCAN_DATABASE_URL") {
        config.database.url = v;
    }
    if let Ok(v) = std::env::var("LINKSCAN_MAX_PAGES") {
        if let Ok(n) = v.parse::<u64>() {
            config.crawler.max_pages = n;
        }
    }
    if let Ok(v) = std::env::var("LINKSCAN_REQUEST_DELAY_MS") {
        if let Ok(n) = v.parse::<u64>() {
            config.crawler.delay_between_requests_ms = n;
        }
    }
    if let Ok(v) = std::env::var("LINKSCAN_USER_AGENT") {
        if !v.trim().is_empty() {
            config.crawler.user_agent = v;
        }
    }

    match cli.command {
        Commands::Crawl {
            url,
            depth,
            external,
            seo,
            timeout,
            no_robots,
        } => {
            commands::crawl::run(
                config,
                cli.memory_store,
                url,
                depth,
                external,
                seo,
                timeout,
                no_robots,
            )
            .await?;
        }
        Commands::Check {
            base,
            urls,
            extract,
            timeout,
        } => {
            commands::check::run(config, cli.memory_store, base, urls, extract, timeout).await?;
        }
        Commands::Status { job_id } => {
            commands::status::run(config, job_id).await?;
        }
        Commands::Export { job_id, output } => {
            commands::export::run(config, job_id, output).await?;
        }
    }

    Ok(())
}
