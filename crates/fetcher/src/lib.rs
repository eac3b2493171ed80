//! Safe, retriable HTTP for link checking. Every URL passes the SSRF gate
//! before the network is touched; transport failures are classified, never
//! propagated as errors.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, DNT, FROM, RANGE};
use reqwest::StatusCode;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use url::Url;

use async_trait::async_trait;
use linkscan_core::{CheckResult, ErrorType, FetchedPage, PageFetcher};

/// Statuses worth retrying: request timeout, throttling, transient 5xx.
const RETRIABLE_STATUSES: &[u16] = &[408, 429, 500, 502, 503, 504];

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub timeout: Duration,
    pub max_redirects: usize,
    pub max_concurrent: usize,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub user_agent: String,
    /// Contact address sent in the From header.
    pub contact: String,
    pub max_body_size: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_redirects: 3,
            max_concurrent: 3,
            retry_attempts: 2,
            retry_delay: Duration::from_millis(1000),
            user_agent:
                "Mozilla/5.0 (compatible; Broken Link Checker Bot/1.0; +https://linkscan.dev/bot)"
                    .to_string(),
            contact: "bot@linkscan.dev".to_string(),
            max_body_size: 5 * 1024 * 1024,
        }
    }
}

pub struct Fetcher {
    client: reqwest::Client,
    limiter: Arc<Semaphore>,
    config: FetcherConfig,
}

impl Fetcher {
    pub fn new(config: FetcherConfig) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        headers.insert(DNT, HeaderValue::from_static("1"));
        if let Ok(from) = HeaderValue::from_str(&config.contact) {
            headers.insert(FROM, from);
        }
        headers.insert("Purpose", HeaderValue::from_static("link-validation"));

        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self {
            client,
            limiter: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            config,
        })
    }

    pub fn max_concurrent(&self) -> usize {
        self.config.max_concurrent
    }

    /// Cheap liveness check: HEAD, falling back to a ranged GET when HEAD
    /// fails. Retries transport errors and transient statuses with linear
    /// backoff. Never dials URLs the safety gate rejects.
    pub async fn check(&self, url_str: &str) -> CheckResult {
        let url = match self.gate(url_str) {
            Ok(url) => url,
            Err(result) => return result,
        };

        let _permit = self.limiter.acquire().await;

        let attempts = self.config.retry_attempts.max(1);
        let mut last = self.attempt_check(&url).await;
        let mut attempt = 1;
        while attempt < attempts && self.is_retriable(&last) {
            let delay = self.config.retry_delay * attempt;
            debug!(url = %url, attempt, delay_ms = delay.as_millis() as u64, "retrying check");
            tokio::time::sleep(delay).await;
            last = self.attempt_check(&url).await;
            attempt += 1;
        }
        last
    }

    /// Full GET. The body is returned only when the response is HTML; the
    /// check-shaped result is always populated.
    pub async fn fetch(&self, url_str: &str) -> FetchedPage {
        let url = match self.gate(url_str) {
            Ok(url) => url,
            Err(result) => {
                return FetchedPage {
                    result,
                    final_url: None,
                    content_type: None,
                    body: None,
                }
            }
        };

        let _permit = self.limiter.acquire().await;

        let attempts = self.config.retry_attempts.max(1);
        let mut last = self.attempt_fetch(&url).await;
        let mut attempt = 1;
        while attempt < attempts && self.is_retriable(&last.result) {
            let delay = self.config.retry_delay * attempt;
            debug!(url = %url, attempt, delay_ms = delay.as_millis() as u64, "retrying fetch");
            tokio::time::sleep(delay).await;
            last = self.attempt_fetch(&url).await;
            attempt += 1;
        }
        last
    }

    /// Safety gate + parse. Produces the synthetic failure result when the
    /// URL must not be dialed.
    fn gate(&self, url_str: &str) -> Result<Url, CheckResult> {
        let Ok(url) = Url::parse(url_str) else {
            return Err(synthetic_failure(
                url_str,
                ErrorType::InvalidUrl,
                format!("URL does not parse: {url_str}"),
            ));
        };

        let verdict = linkscan_policy::is_safe(&url);
        if !verdict.safe {
            warn!(url = %url, reason = ?verdict.reason, "blocked by safety policy");
            return Err(synthetic_failure(
                url_str,
                ErrorType::SecurityBlocked,
                verdict.reason.unwrap_or_else(|| "blocked by safety policy".to_string()),
            ));
        }
        Ok(url)
    }

    async fn attempt_check(&self, url: &Url) -> CheckResult {
        let start = Instant::now();

        match self.client.head(url.as_str()).send().await {
            Ok(resp) if resp.status().is_success() || resp.status().is_redirection() => {
                result_from_status(url, resp.status(), start.elapsed())
            }
            // HEAD unsupported or failed outright: fall back to a ranged GET
            other => {
                if let Ok(resp) = &other {
                    debug!(url = %url, status = resp.status().as_u16(), "HEAD failed, falling back to GET");
                }
                let start = Instant::now();
                match self
                    .client
                    .get(url.as_str())
                    .header(RANGE, "bytes=0-1023")
                    .send()
                    .await
                {
                    Ok(resp) => result_from_status(url, resp.status(), start.elapsed()),
                    Err(e) => result_from_error(url, &e, start.elapsed()),
                }
            }
        }
    }

    async fn attempt_fetch(&self, url: &Url) -> FetchedPage {
        let start = Instant::now();

        let resp = match self.client.get(url.as_str()).send().await {
            Ok(resp) => resp,
            Err(e) => {
                return FetchedPage {
                    result: result_from_error(url, &e, start.elapsed()),
                    final_url: None,
                    content_type: None,
                    body: None,
                }
            }
        };

        let status = resp.status();
        let final_url = Some(resp.url().to_string());
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        let is_html = content_type
            .as_deref()
            .map(|ct| ct.contains("text/html"))
            .unwrap_or(false);

        let body = if is_html && status.is_success() {
            match resp.text().await {
                Ok(mut text) => {
                    if text.len() > self.config.max_body_size {
                        let mut cut = self.config.max_body_size;
                        while cut > 0 && !text.is_char_boundary(cut) {
                            cut -= 1;
                        }
                        text.truncate(cut);
                    }
                    Some(text)
                }
                Err(e) => {
                    warn!(url = %url, "failed reading body: {}", e);
                    None
                }
            }
        } else {
            None
        };

        FetchedPage {
            result: result_from_status(url, status, start.elapsed()),
            final_url,
            content_type,
            body,
        }
    }

    fn is_retriable(&self, result: &CheckResult) -> bool {
        match (&result.error_type, result.status_code) {
            // Never re-dial what the safety gate refused
            (Some(ErrorType::SecurityBlocked), _) | (Some(ErrorType::InvalidUrl), _) => false,
            (Some(ErrorType::Timeout), _)
            | (Some(ErrorType::ConnectionError), _)
            | (Some(ErrorType::DnsError), _) => true,
            (_, Some(code)) => RETRIABLE_STATUSES.contains(&code),
            _ => false,
        }
    }
}

#[async_trait]
impl PageFetcher for Fetcher {
    async fn check(&self, url: &str) -> CheckResult {
        Fetcher::check(self, url).await
    }

    async fn fetch(&self, url: &str) -> FetchedPage {
        Fetcher::fetch(self, url).await
    }
}

fn result_from_status(url: &Url, status: StatusCode, elapsed: Duration) -> CheckResult {
    let code = status.as_u16();
    let is_working = (200..400).contains(&code);
    CheckResult {
        url: url.to_string(),
        status_code: Some(code),
        response_time_ms: elapsed.as_millis() as u64,
        checked_at: chrono::Utc::now(),
        is_working,
        error_type: if is_working { None } else { Some(ErrorType::Http(code)) },
        error_message: if is_working {
            None
        } else {
            Some(format!("HTTP status {code}"))
        },
    }
}

fn result_from_error(url: &Url, error: &reqwest::Error, elapsed: Duration) -> CheckResult {
    let (error_type, message) = classify_transport_error(error);
    CheckResult {
        url: url.to_string(),
        status_code: None,
        response_time_ms: elapsed.as_millis() as u64,
        checked_at: chrono::Utc::now(),
        is_working: false,
        error_type: Some(error_type),
        error_message: Some(message),
    }
}

fn synthetic_failure(url: &str, error_type: ErrorType, message: String) -> CheckResult {
    CheckResult {
        url: url.to_string(),
        status_code: None,
        response_time_ms: 0,
        checked_at: chrono::Utc::now(),
        is_working: false,
        error_type: Some(error_type),
        error_message: Some(message),
    }
}

/// Map a transport error to the persisted error taxonomy. reqwest flattens
/// causes into the display chain, so classification falls back to message
/// sniffing for TLS and DNS.
fn classify_transport_error(error: &reqwest::Error) -> (ErrorType, String) {
    let message = full_error_message(error);
    let lower = message.to_lowercase();

    if error.is_timeout() {
        return (ErrorType::Timeout, message);
    }
    if lower.contains("certificate")
        || lower.contains("self-signed")
        || lower.contains("self signed")
        || lower.contains("expired cert")
        || lower.contains("hostname mismatch")
        || lower.contains("invalid peer certificate")
    {
        return (ErrorType::SslError, message);
    }
    if lower.contains("dns") || lower.contains("name resolution") || lower.contains("failed to lookup") {
        return (ErrorType::DnsError, message);
    }
    if lower.contains("connection refused")
        || lower.contains("connection reset")
        || lower.contains("broken pipe")
    {
        return (ErrorType::ConnectionError, message);
    }
    if error.is_builder() || error.is_request() && lower.contains("url") {
        return (ErrorType::InvalidUrl, message);
    }
    if error.is_connect() {
        return (ErrorType::ConnectionError, message);
    }
    (ErrorType::Other, message)
}

/// Join the source chain so sniffable causes (TLS, DNS) are visible.
fn full_error_message(error: &reqwest::Error) -> String {
    use std::error::Error as _;
    let mut parts = vec![error.to_string()];
    let mut source = error.source();
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join(": ")
}
