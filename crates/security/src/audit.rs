//! Append-only security event log. Recording never fails the caller; if
//! the buffer is full the oldest events are dropped and the event still
//! lands in the structured log.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    RateLimitViolation,
    BlockedUrl,
    RobotsBlocked,
    InvalidInput,
    SuspiciousPattern,
}

impl SecurityEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimitViolation => "rate_limit_violation",
            Self::BlockedUrl => "blocked_url",
            Self::RobotsBlocked => "robots_blocked",
            Self::InvalidInput => "invalid_input",
            Self::SuspiciousPattern => "suspicious_pattern",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct SecurityEvent {
    pub event_type: SecurityEventType,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub endpoint: Option<String>,
    pub details: String,
    pub severity: Severity,
    pub blocked: bool,
    pub timestamp: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn new(event_type: SecurityEventType, severity: Severity, details: impl Into<String>) -> Self {
        Self {
            event_type,
            ip: None,
            user_agent: None,
            endpoint: None,
            details: details.into(),
            severity,
            blocked: false,
            timestamp: Utc::now(),
        }
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn blocked(mut self) -> Self {
        self.blocked = true;
        self
    }
}

pub struct AuditLog {
    events: Mutex<VecDeque<SecurityEvent>>,
    capacity: usize,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::with_capacity(10_000)
    }
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    /// Append an event. Infallible by contract: a poisoned buffer only
    /// costs the in-memory copy, the structured log line still goes out.
    pub fn record(&self, event: SecurityEvent) {
        warn!(
            event_type = event.event_type.as_str(),
            ip = event.ip.as_deref().unwrap_or("-"),
            endpoint = event.endpoint.as_deref().unwrap_or("-"),
            severity = ?event.severity,
            blocked = event.blocked,
            "{}",
            event.details
        );

        if let Ok(mut events) = self.events.lock() {
            if events.len() >= self.capacity {
                events.pop_front();
            }
            events.push_back(event);
        }
    }

    /// Most recent events, newest last.
    pub fn recent(&self, n: usize) -> Vec<SecurityEvent> {
        match self.events.lock() {
            Ok(events) => events.iter().rev().take(n).rev().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
