//! Targeted strategy: verify a caller-supplied URL set. Optionally extracts
//! links from pages flagged as content first (phase A), then checks the
//! deduplicated set in batches (phase B).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use linkscan_core::config::CrawlerConfig;
use linkscan_core::{
    CheckResult, CrawlMode, DiscoveredLink, JobStatus, PageFetcher, PreAnalyzedUrl, Settings,
};
use linkscan_parser::ExtractOptions;
use linkscan_storage::JobStore;

use crate::{broken_link, check_update};

pub(crate) struct TargetedContext {
    pub job_id: Uuid,
    pub base: Url,
    pub settings: Settings,
    pub config: CrawlerConfig,
    pub urls: Vec<PreAnalyzedUrl>,
}

#[derive(Debug, Clone)]
struct Candidate {
    url: String,
    source_url: Option<String>,
    link_text: Option<String>,
    depth: u32,
    is_internal: bool,
}

pub(crate) async fn run(
    ctx: TargetedContext,
    store: Arc<dyn JobStore>,
    fetcher: Arc<dyn PageFetcher>,
    cancel: watch::Receiver<bool>,
) -> Result<JobStatus> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut candidates: Vec<Candidate> = Vec::new();
    let mut content_pages: Vec<String> = Vec::new();

    for pre in &ctx.urls {
        let Ok(parsed) = Url::parse(&pre.url) else {
            warn!(job_id = %ctx.job_id, url = %pre.url, "skipping unparsable supplied URL");
            continue;
        };
        let normalized = linkscan_policy::normalize(&parsed);
        if !linkscan_policy::is_safe(&normalized).safe {
            warn!(job_id = %ctx.job_id, url = %normalized, "skipping unsafe supplied URL");
            continue;
        }
        let url = normalized.to_string();
        if !seen.insert(url.clone()) {
            continue;
        }
        if is_content_flagged(&ctx.settings, pre) {
            content_pages.push(url.clone());
        }
        candidates.push(Candidate {
            is_internal: linkscan_policy::is_internal(&normalized, &ctx.base),
            url,
            source_url: pre.source_url.clone(),
            link_text: None,
            depth: 0,
        });
    }

    // Phase A: pull links out of the supplied content pages
    if !content_pages.is_empty() {
        info!(job_id = %ctx.job_id, pages = content_pages.len(), "extracting links from content pages");
        let extract_opts = ExtractOptions {
            include_external: ctx.settings.include_external,
            follow_nofollow: false,
            max_links_per_page: ctx.config.max_links_per_page,
        };

        let mut workers = JoinSet::new();
        for url in content_pages {
            let fetcher = Arc::clone(&fetcher);
            let opts = extract_opts.clone();
            workers.spawn(async move {
                let page = fetcher.fetch(&url).await;
                let extracted = match (&page.body, Url::parse(&url)) {
                    (Some(body), Ok(parsed)) => Some(linkscan_parser::extract(body, &parsed, 0, &opts)),
                    _ => None,
                };
                (url, extracted)
            });
        }

        while let Some(joined) = workers.join_next().await {
            let Ok((source, Some(page))) = joined else {
                continue;
            };
            for link in page.links {
                if !seen.insert(link.url.clone()) {
                    continue;
                }
                candidates.push(Candidate {
                    url: link.url,
                    source_url: Some(source.clone()),
                    link_text: if link.link_text.is_empty() {
                        None
                    } else {
                        Some(link.link_text)
                    },
                    depth: link.depth,
                    is_internal: link.is_internal,
                });
            }
        }
    }

    let total = candidates.len() as u64;
    info!(job_id = %ctx.job_id, total, "targeted set ready");

    let rows: Vec<DiscoveredLink> = candidates
        .iter()
        .map(|c| {
            DiscoveredLink::pending(
                ctx.job_id,
                c.url.clone(),
                c.source_url.clone(),
                c.is_internal,
                c.depth,
            )
        })
        .collect();
    if *cancel.borrow() {
        return Ok(JobStatus::Stopped);
    }
    store.upsert_discovered_links(ctx.job_id, &rows).await?;
    store.set_progress(ctx.job_id, 0, total).await?;

    // Phase B: check in batches
    let delay = Duration::from_millis(ctx.config.targeted_delay_ms);
    let mut checked: u64 = 0;
    let mut broken: u64 = 0;
    let batches: Vec<&[Candidate]> = candidates.chunks(ctx.config.targeted_batch_size.max(1)).collect();
    let batch_count = batches.len();

    for (index, chunk) in batches.into_iter().enumerate() {
        if *cancel.borrow() {
            info!(job_id = %ctx.job_id, checked, "cancelled before batch");
            return Ok(JobStatus::Stopped);
        }

        let mut workers: JoinSet<(Candidate, CheckResult)> = JoinSet::new();
        for candidate in chunk {
            let fetcher = Arc::clone(&fetcher);
            let candidate = candidate.clone();
            workers.spawn(async move {
                let check = fetcher.check(&candidate.url).await;
                (candidate, check)
            });
        }

        while let Some(joined) = workers.join_next().await {
            let (candidate, check) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(job_id = %ctx.job_id, "check worker failed: {e}");
                    continue;
                }
            };
            checked += 1;

            if *cancel.borrow() {
                workers.abort_all();
                return Ok(JobStatus::Stopped);
            }

            store
                .update_link_check(ctx.job_id, &candidate.url, &check_update(&check))
                .await?;
            if !check.is_working {
                broken += 1;
                store
                    .add_broken_link(
                        ctx.job_id,
                        &broken_link(
                            ctx.job_id,
                            &candidate.url,
                            candidate.source_url.clone(),
                            candidate.link_text.clone(),
                            &check,
                        ),
                    )
                    .await?;
            }
        }

        if *cancel.borrow() {
            return Ok(JobStatus::Stopped);
        }
        store.set_progress(ctx.job_id, checked, total).await?;
        debug!(job_id = %ctx.job_id, checked, total, broken, "batch complete");

        if index + 1 < batch_count {
            tokio::time::sleep(delay).await;
        }
    }

    info!(job_id = %ctx.job_id, checked, broken, "targeted check finished");
    Ok(JobStatus::Completed)
}

/// Phase A runs for URLs the caller flagged as content pages, or for every
/// URL when the job-wide crawl mode says the set is content pages.
fn is_content_flagged(settings: &Settings, pre: &PreAnalyzedUrl) -> bool {
    matches!(settings.crawl_mode, CrawlMode::ContentPages)
        || pre
            .category
            .as_deref()
            .map(|c| c.eq_ignore_ascii_case("content") || c.eq_ignore_ascii_case("content_pages"))
            .unwrap_or(false)
}
