//! Discovery strategy: BFS over same-origin pages from a single seed.
//! Pops frontier batches, checks each URL, expands working internal pages
//! under the depth bound, and feeds newly discovered links back in.

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
    CheckResult, DiscoveredLink, ExtractedPage, JobStatus, PageFetcher, SeoRecord, Settings,
};
use linkscan_frontier::{Frontier, FrontierEntry};
use linkscan_parser::ExtractOptions;
use linkscan_policy::RobotsDecision;
use linkscan_storage::JobStore;

use crate::{broken_link, check_update};

pub(crate) struct DiscoveryContext {
    pub job_id: Uuid,
    pub seed: Url,
    pub settings: Settings,
    pub config: CrawlerConfig,
    pub robots: Option<RobotsDecision>,
}

struct PageOutcome {
    url: String,
    entry: FrontierEntry,
    check: CheckResult,
    extracted: Option<ExtractedPage>,
    seo: Option<SeoRecord>,
}

pub(crate) async fn run(
    ctx: DiscoveryContext,
    store: Arc<dyn JobStore>,
    fetcher: Arc<dyn PageFetcher>,
    cancel: watch::Receiver<bool>,
) -> Result<JobStatus> {
    let mut frontier = Frontier::new();
    let seed = linkscan_policy::normalize(&ctx.seed);
    frontier.insert(seed.as_str(), 0, None, None, 10);

    let extract_opts = ExtractOptions {
        include_external: ctx.settings.include_external,
        follow_nofollow: false,
        max_links_per_page: ctx.config.max_links_per_page,
    };

    let polite_delay = Duration::from_millis(
        ctx.settings
            .delay_between_requests_ms
            .max(ctx.robots.as_ref().map(|r| r.crawl_delay_ms).unwrap_or(0))
            .max(100),
    );

    let max_pages = ctx.config.max_pages;
    let mut processed: u64 = 0;
    let mut broken: u64 = 0;

    while !frontier.is_empty() && processed < max_pages {
        if *cancel.borrow() {
            info!(job_id = %ctx.job_id, processed, "cancelled before batch");
            return Ok(JobStatus::Stopped);
        }

        let room = (max_pages - processed) as usize;
        let batch = frontier.pop_batch(ctx.config.batch_size.min(room));

        // the link row exists before its check result lands
        let rows: Vec<DiscoveredLink> = batch
            .iter()
            .map(|(url, entry)| {
                DiscoveredLink::pending(
                    ctx.job_id,
                    url.clone(),
                    entry.source_url.clone(),
                    internal_to_seed(url, &ctx.seed),
                    entry.depth,
                )
            })
            .collect();
        if *cancel.borrow() {
            return Ok(JobStatus::Stopped);
        }
        store.upsert_discovered_links(ctx.job_id, &rows).await?;

        let mut workers: JoinSet<PageOutcome> = JoinSet::new();
        for (url, entry) in batch {
            workers.spawn(process_page(
                ctx.job_id,
                url,
                entry,
                ctx.seed.clone(),
                ctx.settings.clone(),
                extract_opts.clone(),
                Arc::clone(&fetcher),
            ));
        }

        while let Some(joined) = workers.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    // the URL stays visited; its row simply remains pending
                    warn!(job_id = %ctx.job_id, "page worker failed: {e}");
                    continue;
                }
            };
            processed += 1;

            if *cancel.borrow() {
                workers.abort_all();
                info!(job_id = %ctx.job_id, processed, "cancelled mid-batch");
                return Ok(JobStatus::Stopped);
            }

            store
                .update_link_check(ctx.job_id, &outcome.url, &check_update(&outcome.check))
                .await?;

            if !outcome.check.is_working {
                broken += 1;
                store
                    .add_broken_link(
                        ctx.job_id,
                        &broken_link(
                            ctx.job_id,
                            &outcome.url,
                            outcome.entry.source_url.clone(),
                            outcome.entry.link_text.clone(),
                            &outcome.check,
                        ),
                    )
                    .await?;
            }

            if let Some(record) = outcome.seo {
                store.upsert_seo_record(&record).await?;
            }

            if let Some(page) = outcome.extracted {
                enqueue_links(&mut frontier, &ctx, &outcome.url, page);
            }
        }

        let discovered = frontier.discovered_count() as u64;
        if *cancel.borrow() {
            return Ok(JobStatus::Stopped);
        }
        store
            .set_progress(ctx.job_id, processed, processed.max(discovered))
            .await?;
        debug!(
            job_id = %ctx.job_id,
            processed,
            discovered,
            queued = frontier.queued_len(),
            broken,
            "batch complete"
        );

        if !frontier.is_empty() && processed < max_pages {
            tokio::time::sleep(polite_delay).await;
        }
    }

    info!(job_id = %ctx.job_id, processed, broken, "discovery finished");
    Ok(JobStatus::Completed)
}

async fn process_page(
    job_id: Uuid,
    url: String,
    entry: FrontierEntry,
    seed: Url,
    settings: Settings,
    extract_opts: ExtractOptions,
    fetcher: Arc<dyn PageFetcher>,
) -> PageOutcome {
    let check = fetcher.check(&url).await;

    let mut extracted = None;
    let mut seo = None;

    let parsed = Url::parse(&url).ok();
    let expandable = check.is_working
        && entry.depth < settings.max_depth
        && parsed
            .as_ref()
            .map(|u| linkscan_policy::is_internal(u, &seed) && linkscan_policy::should_crawl(u))
            .unwrap_or(false);

    if expandable {
        let page = fetcher.fetch(&url).await;
        if let (Some(body), Some(u)) = (page.body.as_deref(), parsed.as_ref()) {
            extracted = Some(linkscan_parser::extract(body, u, entry.depth, &extract_opts));
            if settings.enable_seo && linkscan_policy::is_content_page(u) {
                seo = Some(linkscan_seo::analyze(
                    job_id,
                    u,
                    body,
                    page.result.response_time_ms,
                ));
            }
        }
    }

    PageOutcome {
        url,
        entry,
        check,
        extracted,
        seo,
    }
}

fn enqueue_links(frontier: &mut Frontier, ctx: &DiscoveryContext, source: &str, page: ExtractedPage) {
    let mut added = 0usize;
    for link in page.links {
        if !(link.is_internal || ctx.settings.include_external) {
            continue;
        }
        if link.depth > ctx.settings.max_depth {
            continue;
        }
        if frontier.contains(&link.url) {
            continue;
        }
        if let Some(robots) = &ctx.robots {
            if link.is_internal {
                if let Ok(u) = Url::parse(&link.url) {
                    if !robots.allows(u.path()) {
                        debug!(url = %link.url, "skipping robots-disallowed path");
                        continue;
                    }
                }
            }
        }
        let text = if link.link_text.is_empty() {
            None
        } else {
            Some(link.link_text)
        };
        frontier.insert(&link.url, link.depth, Some(source.to_string()), text, link.priority);
        added += 1;
    }
    if added > 0 {
        debug!(source, added, "links enqueued");
    }
}

fn internal_to_seed(url: &str, seed: &Url) -> bool {
    Url::parse(url)
        .map(|u| linkscan_policy::is_internal(&u, seed))
        .unwrap_or(false)
}
