//! Fixed-window rate limiting per (client IP, endpoint class) with
//! progressive block penalties. One store per process; all mutation goes
//! through the concurrent map.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::warn;

use linkscan_core::config::{LimitsConfig, RateLimitRule};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    Analyze,
    CrawlStart,
    Status,
    Results,
    Health,
    General,
}

impl EndpointClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analyze => "analyze",
            Self::CrawlStart => "crawl_start",
            Self::Status => "status",
            Self::Results => "results",
            Self::Health => "health",
            Self::General => "general",
        }
    }
}

/// Job-size hints that relax the status-endpoint limit for big crawls.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobScale {
    pub estimated_links: u64,
    pub depth: u32,
}

impl JobScale {
    fn multiplier(&self) -> u32 {
        if self.estimated_links > 1000 || self.depth >= 5 {
            6
        } else if self.estimated_links > 500 || self.depth >= 4 {
            4
        } else if self.estimated_links > 200 || self.depth >= 3 {
            2
        } else {
            1
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub retry_after_secs: u64,
    pub blocked_until: Option<DateTime<Utc>>,
}

impl RateLimitDecision {
    fn allowed(remaining: u32) -> Self {
        Self {
            allowed: true,
            remaining,
            retry_after_secs: 0,
            blocked_until: None,
        }
    }
}

struct ClientState {
    window_started: Instant,
    count: u32,
    violations: u32,
    blocked_until: Option<Instant>,
}

pub struct RateLimiter {
    limits: LimitsConfig,
    clients: DashMap<(String, EndpointClass), ClientState>,
}

impl RateLimiter {
    pub fn new(limits: LimitsConfig) -> Self {
        Self {
            limits,
            clients: DashMap::new(),
        }
    }

    fn rule(&self, endpoint: EndpointClass) -> RateLimitRule {
        match endpoint {
            EndpointClass::Analyze => self.limits.analyze,
            EndpointClass::CrawlStart => self.limits.crawl_start,
            EndpointClass::Status => self.limits.status,
            EndpointClass::Results => self.limits.results,
            EndpointClass::Health => self.limits.health,
            EndpointClass::General => self.limits.general,
        }
    }

    /// Record one request and decide whether it passes.
    pub fn check(&self, ip: &str, endpoint: EndpointClass) -> RateLimitDecision {
        self.check_scaled(ip, endpoint, None)
    }

    /// Status-endpoint variant: the limit scales with job size, and the
    /// block shrinks accordingly (never below 60 s).
    pub fn check_status(&self, ip: &str, scale: Option<&JobScale>) -> RateLimitDecision {
        self.check_scaled(ip, EndpointClass::Status, scale)
    }

    fn check_scaled(
        &self,
        ip: &str,
        endpoint: EndpointClass,
        scale: Option<&JobScale>,
    ) -> RateLimitDecision {
        let rule = self.rule(endpoint);
        let multiplier = scale.map(|s| s.multiplier()).unwrap_or(1).max(1);
        let max_requests = rule.max_requests.saturating_mul(multiplier);
        let base_block = if multiplier > 1 {
            (rule.base_block_secs / multiplier as u64).max(60)
        } else {
            rule.base_block_secs
        };

        let now = Instant::now();
        let window = Duration::from_secs(rule.window_secs);
        let key = (ip.to_string(), endpoint);

        let mut state = self.clients.entry(key).or_insert_with(|| ClientState {
            window_started: now,
            count: 0,
            violations: 0,
            blocked_until: None,
        });

        // still serving an earlier block
        if let Some(until) = state.blocked_until {
            if now < until {
                let retry_after = (until - now).as_secs().max(1);
                return RateLimitDecision {
                    allowed: false,
                    remaining: 0,
                    retry_after_secs: retry_after,
                    blocked_until: Some(Utc::now() + chrono::Duration::seconds(retry_after as i64)),
                };
            }
            state.blocked_until = None;
        }

        if now.duration_since(state.window_started) >= window {
            state.window_started = now;
            state.count = 0;
        }

        state.count += 1;
        if state.count <= max_requests {
            return RateLimitDecision::allowed(max_requests - state.count);
        }

        // violation: progressive penalty, capped at 5x the base block
        state.violations += 1;
        let penalty = base_block * (state.violations.min(5) as u64);
        state.blocked_until = Some(now + Duration::from_secs(penalty));
        warn!(
            ip,
            endpoint = endpoint.as_str(),
            violations = state.violations,
            block_secs = penalty,
            "rate limit exceeded"
        );

        RateLimitDecision {
            allowed: false,
            remaining: 0,
            retry_after_secs: penalty,
            blocked_until: Some(Utc::now() + chrono::Duration::seconds(penalty as i64)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(LimitsConfig::default())
    }

    #[test]
    fn allows_up_to_the_limit() {
        let rl = limiter();
        for i in 0..10 {
            let d = rl.check("1.2.3.4", EndpointClass::Analyze);
            assert!(d.allowed, "request {i} should pass");
        }
        let d = rl.check("1.2.3.4", EndpointClass::Analyze);
        assert!(!d.allowed);
        assert!(d.retry_after_secs >= 300);
        assert!(d.blocked_until.is_some());
    }

    #[test]
    fn limits_are_per_ip_and_endpoint() {
        let rl = limiter();
        for _ in 0..10 {
            assert!(rl.check("1.1.1.1", EndpointClass::Analyze).allowed);
        }
        assert!(!rl.check("1.1.1.1", EndpointClass::Analyze).allowed);
        // other ip unaffected
        assert!(rl.check("2.2.2.2", EndpointClass::Analyze).allowed);
        // same ip, other endpoint unaffected
        assert!(rl.check("1.1.1.1", EndpointClass::Health).allowed);
    }

    #[test]
    fn violations_escalate_the_block() {
        let rl = limiter();
        for _ in 0..10 {
            rl.check("9.9.9.9", EndpointClass::Analyze);
        }
        let first = rl.check("9.9.9.9", EndpointClass::Analyze);
        assert_eq!(first.retry_after_secs, 300, "first violation gets the base block");

        // force the block to lapse, then violate again within the same window
        {
            let key = ("9.9.9.9".to_string(), EndpointClass::Analyze);
            let mut state = rl.clients.get_mut(&key).unwrap();
            state.blocked_until = None;
        }
        let second = rl.check("9.9.9.9", EndpointClass::Analyze);
        assert_eq!(second.retry_after_secs, 600, "second violation doubles the block");
    }

    #[test]
    fn status_limit_scales_with_job_size() {
        let rl = limiter();
        let big = JobScale { estimated_links: 1500, depth: 2 };
        assert_eq!(big.multiplier(), 6);
        assert_eq!(JobScale { estimated_links: 600, depth: 1 }.multiplier(), 4);
        assert_eq!(JobScale { estimated_links: 250, depth: 1 }.multiplier(), 2);
        assert_eq!(JobScale { estimated_links: 10, depth: 5 }.multiplier(), 6);
        assert_eq!(JobScale { estimated_links: 10, depth: 3 }.multiplier(), 2);
        assert_eq!(JobScale::default().multiplier(), 1);

        // with x6 multiplier the allowance is 30000 requests
        let d = rl.check_status("3.3.3.3", Some(&big));
        assert!(d.allowed);
        assert_eq!(d.remaining, 5000 * 6 - 1);
    }

    #[test]
    fn scaled_block_never_drops_below_a_minute() {
        // base block 300s / 6 = 50s, floored to 60s
        let rl = limiter();
        let big = JobScale { estimated_links: 1500, depth: 5 };
        for _ in 0..(5000 * 6) {
            rl.check_status("4.4.4.4", Some(&big));
        }
        let d = rl.check_status("4.4.4.4", Some(&big));
        assert!(!d.allowed);
        assert_eq!(d.retry_after_secs, 60);
    }

    #[test]
    fn blocked_client_stays_blocked() {
        let rl = limiter();
        for _ in 0..11 {
            rl.check("5.5.5.5", EndpointClass::Analyze);
        }
        let d = rl.check("5.5.5.5", EndpointClass::Analyze);
        assert!(!d.allowed);
        assert!(d.retry_after_secs > 0);
    }
}
