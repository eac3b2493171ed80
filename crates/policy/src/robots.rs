//! robots.txt advisor. Fetches and parses a site's robots.txt once per
//! origin, then answers path-level allow questions and crawl-delay hints.

use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, warn};
use url::Url;

/// What robots.txt says about crawling an origin.
#[derive(Debug, Clone)]
pub struct RobotsDecision {
    pub allowed: bool,
    pub reason: Option<String>,
    pub crawl_delay_ms: u64,
    pub disallowed_paths: Vec<String>,
}

impl RobotsDecision {
    /// Permissive default, used when robots.txt is absent or unreachable.
    pub fn permissive() -> Self {
        Self {
            allowed: true,
            reason: None,
            crawl_delay_ms: 1000,
            disallowed_paths: Vec::new(),
        }
    }

    /// Whether a specific path may be crawled under this decision.
    pub fn allows(&self, path: &str) -> bool {
        if !self.allowed {
            return false;
        }
        !self
            .disallowed_paths
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

pub struct RobotsAdvisor {
    client: reqwest::Client,
    /// Per-origin cache; consult hits the network once per origin.
    cache: DashMap<String, RobotsDecision>,
}

impl RobotsAdvisor {
    pub fn new(user_agent: &str, timeout_ms: u64) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self {
            client,
            cache: DashMap::new(),
        })
    }

    /// Fetch and parse robots.txt for the URL's origin. Network failure is
    /// non-fatal and yields a permissive decision.
    pub async fn consult(&self, base: &Url) -> RobotsDecision {
        let origin = match base.host_str() {
            Some(host) => format!("{}://{}", base.scheme(), host),
            None => return RobotsDecision::permissive(),
        };

        if let Some(cached) = self.cache.get(&origin) {
            return cached.clone();
        }

        let robots_url = format!("{origin}/robots.txt");
        let decision = match self.client.get(&robots_url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(body) => parse_robots(&body),
                Err(e) => {
                    warn!(url = %robots_url, "failed reading robots.txt body: {}", e);
                    RobotsDecision::permissive()
                }
            },
            Ok(resp) => {
                debug!(url = %robots_url, status = resp.status().as_u16(), "no robots.txt");
                RobotsDecision::permissive()
            }
            Err(e) => {
                debug!(url = %robots_url, "robots.txt fetch failed: {}", e);
                RobotsDecision::permissive()
            }
        };

        self.cache.insert(origin, decision.clone());
        decision
    }
}

/// Whether a User-agent token addresses us: wildcard or anything bot-like.
fn user_agent_applies(token: &str) -> bool {
    let token = token.to_lowercase();
    token == "*" || token.contains("bot")
}

/// Sequential robots.txt parse. Collects Disallow prefixes and Crawl-delay
/// from user-agent blocks that apply to this bot.
pub fn parse_robots(content: &str) -> RobotsDecision {
    let mut decision = RobotsDecision::permissive();
    let mut in_applicable_block = false;
    let mut seen_any_agent = false;

    for line in content.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        let Some((field, value)) = line.split_once(':') else {
            continue;
        };
        let field = field.trim().to_lowercase();
        let value = value.trim();

        match field.as_str() {
            "user-agent" => {
                in_applicable_block = user_agent_applies(value);
                seen_any_agent = true;
            }
            "disallow" if in_applicable_block || !seen_any_agent => {
                if value == "/" {
                    decision.allowed = false;
                    decision.reason = Some("Robots.txt disallows all crawling".to_string());
                } else if !value.is_empty() {
                    decision.disallowed_paths.push(value.to_string());
                }
            }
            "crawl-delay" if in_applicable_block || !seen_any_agent => {
                if let Ok(secs) = value.parse::<f64>() {
                    decision.crawl_delay_ms = ((secs * 1000.0) as u64).max(1000);
                }
            }
            _ => {}
        }
    }

    decision
}
