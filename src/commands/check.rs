use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::signal;
use tracing::info;

use linkscan_core::config::AppConfig;
use linkscan_core::{CrawlMode, PreAnalyzedUrl, Settings};
use linkscan_engine::{CrawlEngine, CrawlRequest};
use linkscan_security::AuditLog;

use crate::commands::{build_store, crawl::print_result};

pub async fn run(
    config: AppConfig,
    memory_store: bool,
    base: String,
    urls: String,
    extract: bool,
    timeout: u64,
) -> Result<()> {
    // a file path with one URL per line, or a comma-separated list
    let url_list: Vec<String> = if std::path::Path::new(&urls).exists() {
        std::fs::read_to_string(&urls)?
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .collect()
    } else {
        urls.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    };
    if url_list.is_empty() {
        bail!("no URLs to check");
    }
    info!(count = url_list.len(), "loaded URL list");

    let store = build_store(&config, memory_store).await?;
    let audit = Arc::new(AuditLog::new());
    let engine = Arc::new(CrawlEngine::new(config.crawler.clone(), store.clone(), audit)?);

    let settings = Settings {
        timeout_ms: timeout,
        crawl_mode: if extract {
            CrawlMode::ContentPages
        } else {
            CrawlMode::DiscoveredLinks
        },
        ..Settings::default()
    };

    let pre_analyzed_urls = url_list
        .into_iter()
        .map(|url| PreAnalyzedUrl {
            url,
            source_url: None,
            category: None,
        })
        .collect();

    let job_id = engine
        .start(CrawlRequest {
            url: base,
            settings,
            pre_analyzed_urls,
        })
        .await?;
    println!("Started targeted job {job_id} (press Ctrl+C to stop)");

    {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                info!(job_id = %job_id, "interrupt received, stopping job");
                let _ = engine.stop(job_id);
            }
        });
    }

    engine.wait(job_id).await?;
    print_result(store.as_ref(), job_id).await
}
