use std::sync::Arc;

use anyhow::Result;
use tokio::signal;
use tracing::info;

use linkscan_core::config::AppConfig;
use linkscan_core::{CrawlMode, JobStatus, Settings};
use linkscan_engine::{CrawlEngine, CrawlRequest};
use linkscan_security::AuditLog;
use linkscan_storage::JobStore;

use crate::commands::build_store;

#[allow(clippy::too_many_arguments)]
pub async fn run(
    config: AppConfig,
    memory_store: bool,
    url: String,
    depth: u32,
    external: bool,
    seo: bool,
    timeout: u64,
    no_robots: bool,
) -> Result<()> {
    let store = build_store(&config, memory_store).await?;
    let audit = Arc::new(AuditLog::new());
    let engine = Arc::new(CrawlEngine::new(config.crawler.clone(), store.clone(), audit)?);

    let settings = Settings {
        max_depth: depth,
        include_external: external,
        timeout_ms: timeout,
        crawl_mode: CrawlMode::Auto,
        enable_seo: seo,
        respect_robots: !no_robots,
        delay_between_requests_ms: config.crawler.delay_between_requests_ms,
    };

    let job_id = engine
        .start(CrawlRequest {
            url: url.clone(),
            settings,
            pre_analyzed_urls: Vec::new(),
        })
        .await?;
    println!("Started job {job_id} for {url} (press Ctrl+C to stop)");

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

pub(crate) async fn print_result(store: &dyn JobStore, job_id: uuid::Uuid) -> Result<()> {
    let Some(job) = store.get_job(job_id).await? else {
        println!("Job {job_id} not found");
        return Ok(());
    };
    let summary = store.get_summary(job_id).await?;

    println!();
    println!("Job:          {job_id}");
    println!("Status:       {}", job.status);
    if let Some(err) = &job.error_message {
        println!("Error:        {err}");
    }
    println!("Progress:     {}/{} ({}%)", job.progress.current, job.progress.total, job.progress.percentage);
    println!("Links found:  {} ({} internal, {} external)", summary.total_links, summary.internal, summary.external);
    println!("Checked:      {}", summary.checked);
    println!("Broken:       {}", summary.broken);
    if let Some(avg) = summary.avg_response_time_ms {
        println!("Avg response: {avg} ms");
    }
    if summary.seo_pages > 0 {
        if let Some(avg) = summary.avg_seo_score {
            println!("SEO pages:    {} (avg score {avg:.1})", summary.seo_pages);
        }
    }

    if job.status == JobStatus::Completed && summary.broken > 0 {
        println!("\nBroken links:");
        for broken in store.list_broken_links(job_id).await? {
            let source = broken.source_url.as_deref().unwrap_or("(seed)");
            println!("  [{}] {} <- {}", broken.error_type, broken.url, source);
        }
    }

    Ok(())
}
