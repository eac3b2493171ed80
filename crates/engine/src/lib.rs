//! Crawl orchestrator: one supervising task per job driving a bounded
//! worker pool over the frontier, with explicit cancellation and progress
//! reporting through the job store.

mod discovery;
mod targeted;

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};
use url::Url;
use uuid::Uuid;

use linkscan_core::config::CrawlerConfig;
use linkscan_core::{
    BrokenLink, CheckResult, CrawlError, ErrorType, JobStatus, LinkCheckUpdate, PageFetcher,
    PreAnalyzedUrl, Settings,
};
use linkscan_fetcher::{Fetcher, FetcherConfig};
use linkscan_policy::{RobotsAdvisor, RobotsDecision};
use linkscan_security::{AuditLog, SecurityEvent, SecurityEventType, Severity};
use linkscan_storage::JobStore;

/// One scan request, as validated at the API boundary.
#[derive(Debug, Clone)]
pub struct CrawlRequest {
    pub url: String,
    pub settings: Settings,
    /// Non-empty list switches the job to the targeted strategy.
    pub pre_analyzed_urls: Vec<PreAnalyzedUrl>,
}

struct JobHandle {
    cancel: watch::Sender<bool>,
    /// Taken by the first `wait` call; stop keeps working while someone waits.
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

pub struct CrawlEngine {
    config: CrawlerConfig,
    store: Arc<dyn JobStore>,
    robots: Arc<RobotsAdvisor>,
    audit: Arc<AuditLog>,
    jobs: DashMap<Uuid, Arc<JobHandle>>,
}

impl CrawlEngine {
    pub fn new(
        config: CrawlerConfig,
        store: Arc<dyn JobStore>,
        audit: Arc<AuditLog>,
    ) -> Result<Self, CrawlError> {
        let robots = RobotsAdvisor::new(&config.user_agent, config.robots_timeout_ms)
            .map_err(|e| CrawlError::Config(e.to_string()))?;
        Ok(Self {
            config,
            store,
            robots: Arc::new(robots),
            audit,
            jobs: DashMap::new(),
        })
    }

    /// Validate the request, consult robots.txt for the seed, create the
    /// job record, and hand off to a background supervisor. Returns the job
    /// id as soon as the job is pending.
    pub async fn start(&self, request: CrawlRequest) -> Result<Uuid, CrawlError> {
        let seed = self.validate(&request)?;

        let robots = if request.settings.respect_robots {
            let decision = self.robots.consult(&seed).await;
            if !decision.allowed {
                self.audit.record(
                    SecurityEvent::new(
                        SecurityEventType::RobotsBlocked,
                        Severity::Medium,
                        format!("robots.txt disallows crawling {seed}"),
                    )
                    .blocked(),
                );
                return Err(CrawlError::RobotsBlocked(
                    decision
                        .reason
                        .unwrap_or_else(|| "robots.txt disallows all crawling".to_string()),
                ));
            }
            Some(decision)
        } else {
            None
        };

        let job_id = self
            .store
            .create_job(seed.as_str(), &request.settings)
            .await
            .map_err(|e| CrawlError::Storage(e.to_string()))?;

        let targeted = !request.pre_analyzed_urls.is_empty();
        let max_concurrent = if targeted {
            self.config.max_concurrent_targeted
        } else {
            self.config.max_concurrent_discovery
        };

        let fetcher = Fetcher::new(FetcherConfig {
            timeout: Duration::from_millis(request.settings.timeout_ms),
            max_redirects: self.config.max_redirects,
            max_concurrent,
            retry_attempts: self.config.retry_attempts,
            retry_delay: Duration::from_millis(self.config.retry_delay_ms),
            user_agent: self.config.user_agent.clone(),
            contact: self.config.contact.clone(),
            max_body_size: self.config.max_body_size_mb * 1024 * 1024,
        })
        .map_err(|e| CrawlError::Config(e.to_string()))?;
        let fetcher: Arc<dyn PageFetcher> = Arc::new(fetcher);

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let store = Arc::clone(&self.store);
        let config = self.config.clone();
        let settings = request.settings.clone();
        let pre_analyzed = request.pre_analyzed_urls.clone();

        let task = tokio::spawn(async move {
            run_job(
                job_id, seed, settings, config, pre_analyzed, robots, store, fetcher, cancel_rx,
            )
            .await;
        });

        self.jobs.insert(
            job_id,
            Arc::new(JobHandle {
                cancel: cancel_tx,
                task: tokio::sync::Mutex::new(Some(task)),
            }),
        );
        Ok(job_id)
    }

    fn validate(&self, request: &CrawlRequest) -> Result<Url, CrawlError> {
        if let Err(e) = request.settings.validate() {
            self.audit.record(SecurityEvent::new(
                SecurityEventType::InvalidInput,
                Severity::Low,
                e.to_string(),
            ));
            return Err(e);
        }

        if !linkscan_policy::is_valid(&request.url) {
            self.audit.record(SecurityEvent::new(
                SecurityEventType::InvalidInput,
                Severity::Low,
                format!("seed is not a valid http(s) URL: {}", request.url),
            ));
            return Err(CrawlError::Validation(format!(
                "url must be a parsable http(s) URL, got {:?}",
                request.url
            )));
        }
        let seed = Url::parse(&request.url)
            .map_err(|e| CrawlError::InvalidUrl(format!("{}: {e}", request.url)))?;

        let verdict = linkscan_policy::is_safe(&seed);
        if !verdict.safe {
            let reason = verdict.reason.unwrap_or_else(|| "blocked by safety policy".to_string());
            self.audit.record(
                SecurityEvent::new(
                    SecurityEventType::BlockedUrl,
                    Severity::High,
                    format!("seed {} rejected: {reason}", request.url),
                )
                .blocked(),
            );
            return Err(CrawlError::SecurityBlocked(reason));
        }

        for pre in &request.pre_analyzed_urls {
            if !linkscan_policy::is_valid(&pre.url) {
                return Err(CrawlError::Validation(format!(
                    "pre-analyzed URL is not valid: {:?}",
                    pre.url
                )));
            }
            let parsed = Url::parse(&pre.url)
                .map_err(|e| CrawlError::InvalidUrl(format!("{}: {e}", pre.url)))?;
            let verdict = linkscan_policy::is_safe(&parsed);
            if !verdict.safe {
                let reason = verdict.reason.unwrap_or_else(|| "blocked by safety policy".to_string());
                self.audit.record(
                    SecurityEvent::new(
                        SecurityEventType::BlockedUrl,
                        Severity::High,
                        format!("pre-analyzed URL {} rejected: {reason}", pre.url),
                    )
                    .blocked(),
                );
                return Err(CrawlError::SecurityBlocked(reason));
            }
        }

        Ok(seed)
    }

    /// Flip the job's cancellation flag. The job transitions to `stopped`
    /// at its next quiescent point; in-flight requests may finish.
    pub fn stop(&self, job_id: Uuid) -> Result<(), CrawlError> {
        match self.jobs.get(&job_id) {
            Some(handle) => {
                info!(job_id = %job_id, "stop requested");
                let _ = handle.cancel.send(true);
                Ok(())
            }
            None => Err(CrawlError::NotFound(job_id.to_string())),
        }
    }

    /// Wait for a job started in this process to finish.
    pub async fn wait(&self, job_id: Uuid) -> Result<(), CrawlError> {
        let handle = match self.jobs.get(&job_id) {
            Some(entry) => Arc::clone(&entry),
            None => return Err(CrawlError::NotFound(job_id.to_string())),
        };
        let task = handle.task.lock().await.take();
        let result = match task {
            Some(task) => task
                .await
                .map_err(|e| CrawlError::Other(anyhow::anyhow!("job supervisor panicked: {e}"))),
            // someone else already waited this job out
            None => Ok(()),
        };
        self.jobs.remove(&job_id);
        result
    }

    pub fn is_tracked(&self, job_id: Uuid) -> bool {
        self.jobs.contains_key(&job_id)
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_job(
    job_id: Uuid,
    seed: Url,
    settings: Settings,
    config: CrawlerConfig,
    pre_analyzed: Vec<PreAnalyzedUrl>,
    robots: Option<RobotsDecision>,
    store: Arc<dyn JobStore>,
    fetcher: Arc<dyn PageFetcher>,
    cancel: watch::Receiver<bool>,
) {
    if let Err(e) = store.set_status(job_id, JobStatus::Running, None).await {
        error!(job_id = %job_id, "failed to mark job running: {e:#}");
        return;
    }
    info!(job_id = %job_id, seed = %seed, targeted = !pre_analyzed.is_empty(), "job started");

    let outcome = if pre_analyzed.is_empty() {
        discovery::run(
            discovery::DiscoveryContext { job_id, seed, settings, config, robots },
            store.clone(),
            fetcher,
            cancel,
        )
        .await
    } else {
        targeted::run(
            targeted::TargetedContext {
                job_id,
                base: seed,
                settings,
                config,
                urls: pre_analyzed,
            },
            store.clone(),
            fetcher,
            cancel,
        )
        .await
    };

    match outcome {
        Ok(status) => {
            let _ = store.set_status(job_id, status, None).await;
            info!(job_id = %job_id, status = %status, "job finished");
        }
        Err(e) => {
            error!(job_id = %job_id, "job failed: {e:#}");
            let _ = store
                .set_status(job_id, JobStatus::Failed, Some(&format!("{e:#}")))
                .await;
        }
    }
}

pub(crate) fn check_update(check: &CheckResult) -> LinkCheckUpdate {
    LinkCheckUpdate {
        http_status_code: check.status_code,
        response_time_ms: check.response_time_ms,
        checked_at: check.checked_at,
        is_working: check.is_working,
        error_message: check.error_message.clone(),
    }
}

pub(crate) fn broken_link(
    job_id: Uuid,
    url: &str,
    source_url: Option<String>,
    link_text: Option<String>,
    check: &CheckResult,
) -> BrokenLink {
    BrokenLink {
        job_id,
        url: url.to_string(),
        source_url,
        status_code: check.status_code,
        error_type: check.error_type.clone().unwrap_or(ErrorType::Other),
        link_text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use linkscan_core::{CrawlMode, FetchedPage, LinkFilter};
    use linkscan_storage::{JobStore, MemoryStore};

    /// Canned responses keyed by URL; everything unknown is a 404.
    struct StubFetcher {
        pages: HashMap<String, (u16, Option<String>)>,
        calls: Mutex<Vec<String>>,
        check_delay: Duration,
    }

    impl StubFetcher {
        fn new() -> Self {
            Self {
                pages: HashMap::new(),
                calls: Mutex::new(Vec::new()),
                check_delay: Duration::ZERO,
            }
        }

        fn page(mut self, url: &str, status: u16, body: Option<&str>) -> Self {
            self.pages.insert(url.to_string(), (status, body.map(str::to_string)));
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }

        fn lookup(&self, url: &str) -> (u16, Option<String>) {
            self.pages.get(url).cloned().unwrap_or((404, None))
        }
    }

    #[async_trait]
    impl PageFetcher for StubFetcher {
        async fn check(&self, url: &str) -> CheckResult {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(format!("check {url}"));
            }
            if !self.check_delay.is_zero() {
                tokio::time::sleep(self.check_delay).await;
            }
            let (status, _) = self.lookup(url);
            let is_working = (200..400).contains(&status);
            CheckResult {
                url: url.to_string(),
                status_code: Some(status),
                response_time_ms: 5,
                checked_at: chrono::Utc::now(),
                is_working,
                error_type: if is_working { None } else { Some(ErrorType::Http(status)) },
                error_message: if is_working { None } else { Some(format!("HTTP status {status}")) },
            }
        }

        async fn fetch(&self, url: &str) -> FetchedPage {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(format!("fetch {url}"));
            }
            let (status, body) = self.lookup(url);
            let is_working = (200..400).contains(&status);
            FetchedPage {
                result: CheckResult {
                    url: url.to_string(),
                    status_code: Some(status),
                    response_time_ms: 5,
                    checked_at: chrono::Utc::now(),
                    is_working,
                    error_type: if is_working { None } else { Some(ErrorType::Http(status)) },
                    error_message: None,
                },
                final_url: Some(url.to_string()),
                content_type: body.as_ref().map(|_| "text/html; charset=utf-8".to_string()),
                body,
            }
        }
    }

    fn settings() -> Settings {
        Settings {
            max_depth: 2,
            include_external: false,
            timeout_ms: 5000,
            crawl_mode: CrawlMode::Auto,
            enable_seo: false,
            respect_robots: false,
            delay_between_requests_ms: 0,
        }
    }

    fn config() -> CrawlerConfig {
        CrawlerConfig {
            delay_between_requests_ms: 0,
            targeted_delay_ms: 0,
            ..Default::default()
        }
    }

    async fn run_discovery(
        seed: &str,
        settings: Settings,
        config: CrawlerConfig,
        fetcher: Arc<StubFetcher>,
        store: Arc<MemoryStore>,
    ) -> (Uuid, JobStatus) {
        let job_id = store.create_job(seed, &settings).await.unwrap();
        store.set_status(job_id, JobStatus::Running, None).await.unwrap();
        let (_tx, rx) = watch::channel(false);
        let status = discovery::run(
            discovery::DiscoveryContext {
                job_id,
                seed: Url::parse(seed).unwrap(),
                settings,
                config,
                robots: None,
            },
            store.clone(),
            fetcher,
            rx,
        )
        .await
        .unwrap();
        store.set_status(job_id, status, None).await.unwrap();
        (job_id, status)
    }

    #[tokio::test]
    async fn discovery_seed_with_good_and_broken_link() {
        let fetcher = Arc::new(
            StubFetcher::new()
                .page(
                    "https://site.example/",
                    200,
                    Some(r#"<a href="/good">a good page link</a><a href="/bad">a broken page link</a>"#),
                )
                .page("https://site.example/good", 200, Some("<p>fine</p>")),
        );
        let store = Arc::new(MemoryStore::new());
        let (job_id, status) =
            run_discovery("https://site.example/", settings(), config(), fetcher, store.clone()).await;

        assert_eq!(status, JobStatus::Completed);

        let links = store.list_discovered_links(job_id, LinkFilter::All, 1, 50).await.unwrap();
        assert_eq!(links.len(), 3);
        assert!(links.iter().all(|l| l.checked_at.is_some()));

        let broken = store.list_broken_links(job_id).await.unwrap();
        assert_eq!(broken.len(), 1);
        assert_eq!(broken[0].url, "https://site.example/bad");
        assert_eq!(broken[0].status_code, Some(404));
        assert_eq!(broken[0].error_type.code(), "404");
        assert_eq!(broken[0].source_url.as_deref(), Some("https://site.example/"));
        assert_eq!(broken[0].link_text.as_deref(), Some("a broken page link"));

        let job = store.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress.current, 3);
        assert_eq!(job.progress.percentage, 100);
    }

    #[tokio::test]
    async fn broken_links_match_non_working_discovered_rows() {
        let fetcher = Arc::new(
            StubFetcher::new().page(
                "https://site.example/",
                200,
                Some(r#"<a href="/a">first missing page</a><a href="/b">second missing page</a>"#),
            ),
        );
        let store = Arc::new(MemoryStore::new());
        let (job_id, _) =
            run_discovery("https://site.example/", settings(), config(), fetcher, store.clone()).await;

        let broken = store.list_broken_links(job_id).await.unwrap();
        let not_working = store
            .list_discovered_links(job_id, LinkFilter::Broken, 1, 100)
            .await
            .unwrap();
        assert!(broken.len() <= not_working.len());
        for b in &broken {
            assert!(not_working.iter().any(|l| l.url == b.url));
        }
    }

    #[tokio::test]
    async fn private_address_discovered_mid_crawl_is_never_dialed() {
        let fetcher = Arc::new(StubFetcher::new().page(
            "https://site.example/",
            200,
            Some(r#"<a href="http://10.0.0.5/">an internal admin box</a><a href="/ok">a public page here</a>"#),
        ));
        let store = Arc::new(MemoryStore::new());
        let mut s = settings();
        s.include_external = true;
        let (job_id, status) =
            run_discovery("https://site.example/", s, config(), fetcher.clone(), store.clone()).await;

        assert_eq!(status, JobStatus::Completed);
        let links = store.list_discovered_links(job_id, LinkFilter::All, 1, 50).await.unwrap();
        assert!(links.iter().all(|l| !l.url.contains("10.0.0.5")));
        assert!(fetcher.calls().iter().all(|c| !c.contains("10.0.0.5")));
    }

    #[tokio::test]
    async fn max_depth_one_checks_but_does_not_expand() {
        let fetcher = Arc::new(
            StubFetcher::new()
                .page(
                    "https://site.example/",
                    200,
                    Some(r#"<a href="/a">the first level page</a>"#),
                )
                .page(
                    "https://site.example/a",
                    200,
                    Some(r#"<a href="/deeper">the second level page</a>"#),
                ),
        );
        let store = Arc::new(MemoryStore::new());
        let mut s = settings();
        s.max_depth = 1;
        let (job_id, _) =
            run_discovery("https://site.example/", s, config(), fetcher.clone(), store.clone()).await;

        let links = store.list_discovered_links(job_id, LinkFilter::All, 1, 50).await.unwrap();
        let urls: Vec<&str> = links.iter().map(|l| l.url.as_str()).collect();
        assert!(urls.contains(&"https://site.example/"));
        assert!(urls.contains(&"https://site.example/a"));
        assert!(!urls.iter().any(|u| u.contains("deeper")));
        // depth-1 page was checked, never fetched for links
        assert!(fetcher.calls().contains(&"check https://site.example/a".to_string()));
        assert!(!fetcher.calls().contains(&"fetch https://site.example/a".to_string()));
    }

    #[tokio::test]
    async fn external_links_stay_out_when_disabled() {
        let fetcher = Arc::new(StubFetcher::new().page(
            "https://site.example/",
            200,
            Some(r#"<a href="https://elsewhere.org/x">an external site link</a><a href="/in">an internal page link</a>"#),
        ));
        let store = Arc::new(MemoryStore::new());
        let (job_id, _) =
            run_discovery("https://site.example/", settings(), config(), fetcher, store.clone()).await;

        let links = store.list_discovered_links(job_id, LinkFilter::All, 1, 50).await.unwrap();
        assert!(links.iter().all(|l| l.is_internal));
    }

    #[tokio::test]
    async fn max_pages_caps_processing() {
        let mut body = String::new();
        for i in 0..10 {
            body.push_str(&format!(r#"<a href="/p{i}">numbered page link {i}</a>"#));
        }
        let fetcher = Arc::new(StubFetcher::new().page("https://site.example/", 200, Some(&body)));
        let store = Arc::new(MemoryStore::new());
        let mut cfg = config();
        cfg.max_pages = 3;
        let (job_id, status) =
            run_discovery("https://site.example/", settings(), cfg, fetcher, store.clone()).await;

        assert_eq!(status, JobStatus::Completed);
        let job = store.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.progress.current, 3);
        let checked = store
            .list_discovered_links(job_id, LinkFilter::All, 1, 100)
            .await
            .unwrap()
            .iter()
            .filter(|l| l.checked_at.is_some())
            .count();
        assert_eq!(checked, 3);
    }

    #[tokio::test]
    async fn seo_records_written_for_content_pages() {
        let body = format!(
            "<html><head><title>A page about something specific</title></head><body><h1>hello</h1><p>{}</p></body></html>",
            "word ".repeat(250)
        );
        let fetcher = Arc::new(StubFetcher::new().page("https://site.example/", 200, Some(&body)));
        let store = Arc::new(MemoryStore::new());
        let mut s = settings();
        s.enable_seo = true;
        let (job_id, _) =
            run_discovery("https://site.example/", s, config(), fetcher, store.clone()).await;

        let records = store.list_seo_records(job_id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].url, "https://site.example/");
        assert!(records[0].score > 0);
    }

    #[tokio::test]
    async fn cancellation_stops_the_job() {
        let mut body = String::new();
        for i in 0..50 {
            body.push_str(&format!(r#"<a href="/p{i}">numbered page link {i}</a>"#));
        }
        let mut stub = StubFetcher::new().page("https://site.example/", 200, Some(&body));
        stub.check_delay = Duration::from_millis(20);
        let fetcher = Arc::new(stub);
        let store = Arc::new(MemoryStore::new());

        let job_id = store.create_job("https://site.example/", &settings()).await.unwrap();
        store.set_status(job_id, JobStatus::Running, None).await.unwrap();
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(discovery::run(
            discovery::DiscoveryContext {
                job_id,
                seed: Url::parse("https://site.example/").unwrap(),
                settings: settings(),
                config: config(),
                robots: None,
            },
            store.clone() as Arc<dyn JobStore>,
            fetcher,
            rx,
        ));

        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();
        let status = task.await.unwrap().unwrap();
        assert_eq!(status, JobStatus::Stopped);
    }

    #[tokio::test]
    async fn targeted_checks_supplied_urls() {
        let fetcher = Arc::new(
            StubFetcher::new()
                .page("https://site.example/a", 200, None)
                .page("https://site.example/b", 200, None)
                .page("https://site.example/c", 200, None),
        );
        let store = Arc::new(MemoryStore::new());
        let job_id = store.create_job("https://site.example/", &settings()).await.unwrap();
        store.set_status(job_id, JobStatus::Running, None).await.unwrap();

        let urls = ["a", "b", "c"]
            .iter()
            .map(|p| PreAnalyzedUrl {
                url: format!("https://site.example/{p}"),
                source_url: None,
                category: None,
            })
            .collect();

        let (_tx, rx) = watch::channel(false);
        let status = targeted::run(
            targeted::TargetedContext {
                job_id,
                base: Url::parse("https://site.example/").unwrap(),
                settings: settings(),
                config: config(),
                urls,
            },
            store.clone() as Arc<dyn JobStore>,
            fetcher,
            rx,
        )
        .await
        .unwrap();

        assert_eq!(status, JobStatus::Completed);
        let links = store.list_discovered_links(job_id, LinkFilter::All, 1, 50).await.unwrap();
        assert_eq!(links.len(), 3);
        assert!(store.list_broken_links(job_id).await.unwrap().is_empty());
        store.set_status(job_id, status, None).await.unwrap();
        let job = store.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.progress.total, 3);
        assert_eq!(job.progress.current, 3);
    }

    #[tokio::test]
    async fn targeted_content_pages_extract_then_check() {
        let fetcher = Arc::new(
            StubFetcher::new()
                .page(
                    "https://site.example/article",
                    200,
                    Some(r#"<a href="/linked-from-article">an interesting linked page</a>"#),
                )
                .page("https://site.example/linked-from-article", 200, None),
        );
        let store = Arc::new(MemoryStore::new());
        let mut s = settings();
        s.crawl_mode = CrawlMode::ContentPages;
        let job_id = store.create_job("https://site.example/", &s).await.unwrap();
        store.set_status(job_id, JobStatus::Running, None).await.unwrap();

        let (_tx, rx) = watch::channel(false);
        let status = targeted::run(
            targeted::TargetedContext {
                job_id,
                base: Url::parse("https://site.example/").unwrap(),
                settings: s,
                config: config(),
                urls: vec![PreAnalyzedUrl {
                    url: "https://site.example/article".into(),
                    source_url: None,
                    category: Some("content".into()),
                }],
            },
            store.clone() as Arc<dyn JobStore>,
            fetcher,
            rx,
        )
        .await
        .unwrap();

        assert_eq!(status, JobStatus::Completed);
        let links = store.list_discovered_links(job_id, LinkFilter::All, 1, 50).await.unwrap();
        let urls: Vec<&str> = links.iter().map(|l| l.url.as_str()).collect();
        assert!(urls.contains(&"https://site.example/article"));
        assert!(urls.contains(&"https://site.example/linked-from-article"));
        assert!(links.iter().all(|l| l.checked_at.is_some()));
    }

    #[tokio::test]
    async fn engine_rejects_unsafe_seed_without_creating_a_job() {
        let store = Arc::new(MemoryStore::new());
        let audit = Arc::new(AuditLog::new());
        let engine = CrawlEngine::new(config(), store.clone(), audit.clone()).unwrap();

        let err = engine
            .start(CrawlRequest {
                url: "http://127.0.0.1/".into(),
                settings: settings(),
                pre_analyzed_urls: vec![],
            })
            .await
            .unwrap_err();

        assert!(matches!(err, CrawlError::SecurityBlocked(_)));
        assert_eq!(err.kind().http_status(), 403);
        assert_eq!(audit.len(), 1);
        assert_eq!(audit.recent(1)[0].event_type, SecurityEventType::BlockedUrl);
    }

    #[tokio::test]
    async fn engine_rejects_invalid_settings() {
        let store = Arc::new(MemoryStore::new());
        let engine = CrawlEngine::new(config(), store, Arc::new(AuditLog::new())).unwrap();

        let mut s = settings();
        s.max_depth = 9;
        let err = engine
            .start(CrawlRequest {
                url: "https://site.example/".into(),
                settings: s,
                pre_analyzed_urls: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlError::Validation(_)));
    }

    #[tokio::test]
    async fn engine_rejects_suspicious_tld_and_userinfo() {
        let store = Arc::new(MemoryStore::new());
        let engine = CrawlEngine::new(config(), store, Arc::new(AuditLog::new())).unwrap();

        for url in ["http://phish.tk/", "http://user:pw@site.example/"] {
            let err = engine
                .start(CrawlRequest {
                    url: url.into(),
                    settings: settings(),
                    pre_analyzed_urls: vec![],
                })
                .await
                .unwrap_err();
            assert!(matches!(err, CrawlError::SecurityBlocked(_)), "{url}");
        }
    }

    #[tokio::test]
    async fn engine_rejects_unsafe_pre_analyzed_urls() {
        let store = Arc::new(MemoryStore::new());
        let engine = CrawlEngine::new(config(), store, Arc::new(AuditLog::new())).unwrap();

        let err = engine
            .start(CrawlRequest {
                url: "https://site.example/".into(),
                settings: settings(),
                pre_analyzed_urls: vec![PreAnalyzedUrl {
                    url: "http://169.254.169.254/latest/meta-data/".into(),
                    source_url: None,
                    category: None,
                }],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlError::SecurityBlocked(_)));
    }

    #[tokio::test]
    async fn stop_on_unknown_job_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let engine = CrawlEngine::new(config(), store, Arc::new(AuditLog::new())).unwrap();
        let err = engine.stop(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, CrawlError::NotFound(_)));
    }
}
