//! Process-wide request policing: the per-client rate-limit store and the
//! append-only security audit log.

pub mod audit;
pub mod rate_limit;

pub use audit::{AuditLog, SecurityEvent, SecurityEventType, Severity};
pub use rate_limit::{EndpointClass, JobScale, RateLimitDecision, RateLimiter};
