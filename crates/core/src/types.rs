use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CrawlError;

/// The fetch seam the orchestrator drives. Implementations must run the
/// URL safety gate before any network I/O and report failures as results,
/// never as errors.
#[async_trait]
pub trait PageFetcher: Send + Sync + 'static {
    /// Liveness check: status only.
    async fn check(&self, url: &str) -> CheckResult;
    /// Full fetch: status plus the HTML body when the response is HTML.
    async fn fetch(&self, url: &str) -> FetchedPage;
}

/// Lifecycle of a scan job. Terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlMode {
    #[default]
    Auto,
    ContentPages,
    DiscoveredLinks,
}

/// Per-job settings, immutable after job creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub max_depth: u32,
    pub include_external: bool,
    /// Per-request upper bound in milliseconds.
    pub timeout_ms: u64,
    pub crawl_mode: CrawlMode,
    pub enable_seo: bool,
    #[serde(default = "default_respect_robots")]
    pub respect_robots: bool,
    #[serde(default = "default_request_delay")]
    pub delay_between_requests_ms: u64,
}

fn default_respect_robots() -> bool {
    true
}

fn default_request_delay() -> u64 {
    200
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_depth: 2,
            include_external: false,
            timeout_ms: 10_000,
            crawl_mode: CrawlMode::Auto,
            enable_seo: false,
            respect_robots: true,
            delay_between_requests_ms: default_request_delay(),
        }
    }
}

impl Settings {
    /// Reject settings outside the accepted ranges before a job is created.
    pub fn validate(&self) -> Result<(), CrawlError> {
        if !(1..=5).contains(&self.max_depth) {
            return Err(CrawlError::Validation(format!(
                "max_depth must be between 1 and 5, got {}",
                self.max_depth
            )));
        }
        if !(1000..=30_000).contains(&self.timeout_ms) {
            return Err(CrawlError::Validation(format!(
                "timeout_ms must be between 1000 and 30000, got {}",
                self.timeout_ms
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub current: u64,
    pub total: u64,
    pub percentage: u8,
}

impl Progress {
    pub fn new(current: u64, total: u64) -> Self {
        let percentage = if total == 0 {
            0
        } else {
            ((100 * current.min(total) + total / 2) / total) as u8
        };
        Self {
            current: current.min(total),
            total,
            percentage,
        }
    }
}

/// One scan invocation. Created pending, mutated only by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub seed_url: String,
    pub settings: Settings,
    pub status: JobStatus,
    pub progress: Progress,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkCheckState {
    Pending,
    Checked,
}

/// A URL found during a scan, unique per (job, url).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredLink {
    pub job_id: Uuid,
    pub url: String,
    /// None for the seed, otherwise a URL already visited in this job.
    pub source_url: Option<String>,
    pub is_internal: bool,
    pub depth: u32,
    pub status: LinkCheckState,
    pub http_status_code: Option<u16>,
    pub response_time_ms: Option<u64>,
    pub checked_at: Option<DateTime<Utc>>,
    pub is_working: Option<bool>,
    pub error_message: Option<String>,
}

impl DiscoveredLink {
    pub fn pending(job_id: Uuid, url: String, source_url: Option<String>, is_internal: bool, depth: u32) -> Self {
        Self {
            job_id,
            url,
            source_url,
            is_internal,
            depth,
            status: LinkCheckState::Pending,
            http_status_code: None,
            response_time_ms: None,
            checked_at: None,
            is_working: None,
            error_message: None,
        }
    }
}

/// Fields written onto a DiscoveredLink once its check concludes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkCheckUpdate {
    pub http_status_code: Option<u16>,
    pub response_time_ms: u64,
    pub checked_at: DateTime<Utc>,
    pub is_working: bool,
    pub error_message: Option<String>,
}

/// Append-only record of a link whose check concluded it is not working.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokenLink {
    pub job_id: Uuid,
    pub url: String,
    pub source_url: Option<String>,
    pub status_code: Option<u16>,
    pub error_type: ErrorType,
    pub link_text: Option<String>,
}

/// Classified failure cause of a link check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// HTTP status outside [200,400); carries the code.
    Http(u16),
    SslError,
    Timeout,
    DnsError,
    ConnectionError,
    InvalidUrl,
    SecurityBlocked,
    Other,
}

impl ErrorType {
    /// Wire form: bare status codes for HTTP failures, snake_case otherwise.
    pub fn code(&self) -> String {
        match self {
            Self::Http(status) => status.to_string(),
            Self::SslError => "ssl_error".into(),
            Self::Timeout => "timeout".into(),
            Self::DnsError => "dns_error".into(),
            Self::ConnectionError => "connection_error".into(),
            Self::InvalidUrl => "invalid_url".into(),
            Self::SecurityBlocked => "security_blocked".into(),
            Self::Other => "other".into(),
        }
    }

    pub fn parse(code: &str) -> Self {
        if let Ok(status) = code.parse::<u16>() {
            return Self::Http(status);
        }
        match code {
            "ssl_error" => Self::SslError,
            "timeout" => Self::Timeout,
            "dns_error" => Self::DnsError,
            "connection_error" => Self::ConnectionError,
            "invalid_url" => Self::InvalidUrl,
            "security_blocked" => Self::SecurityBlocked,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

/// Outcome of a liveness check on one URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub url: String,
    pub status_code: Option<u16>,
    pub response_time_ms: u64,
    pub checked_at: DateTime<Utc>,
    pub is_working: bool,
    pub error_type: Option<ErrorType>,
    pub error_message: Option<String>,
}

/// Full fetch: the check outcome plus the HTML body when the response was HTML.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub result: CheckResult,
    pub final_url: Option<String>,
    pub content_type: Option<String>,
    /// Present only when Content-Type contains text/html.
    pub body: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    Content,
    Navigation,
    Resource,
    Other,
}

/// Where on the page an anchor was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkContext {
    Navigation,
    ContentArea,
    #[default]
    Body,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkAttributes {
    pub rel: Option<String>,
    pub target: Option<String>,
    pub title: Option<String>,
    pub class: Option<String>,
    pub id: Option<String>,
}

/// One outbound link extracted from a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkInfo {
    pub url: String,
    pub source_url: String,
    pub link_text: String,
    pub is_internal: bool,
    pub depth: u32,
    pub should_crawl: bool,
    pub link_type: LinkType,
    /// Advisory scheduling hint in [1,10]; does not affect check correctness.
    pub priority: u8,
    pub context: LinkContext,
    pub attributes: LinkAttributes,
}

/// Lightweight structural counts used by the SEO analyzer and classifiers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageAnalysis {
    pub word_count: usize,
    pub paragraph_count: usize,
    pub heading_count: usize,
    pub link_count: usize,
    pub image_count: usize,
    pub has_nav: bool,
    pub has_main_content: bool,
    pub has_schema_markup: bool,
}

/// Metadata extracted once per parsed page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageInfo {
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub canonical_url: Option<String>,
    pub lang: Option<String>,
    pub robots_meta: Option<String>,
    pub analysis: PageAnalysis,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ExtractStats {
    pub anchors_seen: usize,
    pub emitted: usize,
    pub skipped_unsafe: usize,
    pub skipped_external: usize,
    pub deduplicated: usize,
    pub capped: bool,
}

/// Output of link extraction on one HTML page.
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    pub links: Vec<LinkInfo>,
    pub page_info: PageInfo,
    pub stats: ExtractStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn from_score(score: u8) -> Self {
        match score {
            90..=100 => Self::A,
            80..=89 => Self::B,
            70..=79 => Self::C,
            60..=69 => Self::D,
            _ => Self::F,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Critical,
    Major,
    Warning,
    Minor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeoIssue {
    #[serde(rename = "type")]
    pub severity: IssueSeverity,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeoMetrics {
    pub title: Option<String>,
    pub title_length: usize,
    pub meta_description: Option<String>,
    pub meta_description_length: usize,
    pub h1_count: usize,
    pub h2_count: usize,
    pub h3_count: usize,
    pub word_count: usize,
    pub image_count: usize,
    pub images_missing_alt: usize,
    pub https: bool,
    pub canonical: Option<String>,
    pub response_time_ms: u64,
}

/// One SEO analysis per (job, HTML content page).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeoRecord {
    pub job_id: Uuid,
    pub url: String,
    pub score: u8,
    pub grade: Grade,
    pub issues: Vec<SeoIssue>,
    pub metrics: SeoMetrics,
    /// Set when analysis itself failed; the record is still persisted.
    pub error: Option<String>,
}

/// URL shape categories used by should-crawl and content-page decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlCategory {
    Pages,
    WithParams,
    Pagination,
    Dates,
    Media,
    Admin,
    Api,
    Other,
}

/// Caller-supplied URL for the targeted strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreAnalyzedUrl {
    pub url: String,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

/// Aggregated per-job counters for status/export surfaces.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobSummary {
    pub total_links: u64,
    pub checked: u64,
    pub broken: u64,
    pub internal: u64,
    pub external: u64,
    pub avg_response_time_ms: Option<u64>,
    pub seo_pages: u64,
    pub avg_seo_score: Option<f64>,
}

/// Row filter for paginated link listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkFilter {
    #[default]
    All,
    Broken,
    Working,
    Internal,
    External,
    Pending,
}
