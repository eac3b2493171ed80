use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("URL blocked by safety policy: {0}")]
    SecurityBlocked(String),

    #[error("robots.txt disallows crawling: {0}")]
    RobotsBlocked(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("rate limited until {blocked_until}")]
    RateLimited {
        blocked_until: chrono::DateTime<chrono::Utc>,
        retry_after_secs: u64,
    },

    #[error("job not found: {0}")]
    NotFound(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("timeout after {0}ms")]
    Timeout(u64),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Error taxonomy surfaced to clients, with its transport status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    SecurityBlocked,
    RobotsBlocked,
    ValidationError,
    RateLimited,
    NotFound,
    InternalError,
}

impl ApiErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SecurityBlocked => "SECURITY_BLOCKED",
            Self::RobotsBlocked => "ROBOTS_BLOCKED",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::RateLimited => "RATE_LIMITED",
            Self::NotFound => "NOT_FOUND",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::SecurityBlocked | Self::RobotsBlocked => 403,
            Self::ValidationError => 400,
            Self::RateLimited => 429,
            Self::NotFound => 404,
            Self::InternalError => 500,
        }
    }
}

impl CrawlError {
    pub fn kind(&self) -> ApiErrorKind {
        match self {
            Self::SecurityBlocked(_) => ApiErrorKind::SecurityBlocked,
            Self::RobotsBlocked(_) => ApiErrorKind::RobotsBlocked,
            Self::InvalidUrl(_) | Self::Validation(_) => ApiErrorKind::ValidationError,
            Self::RateLimited { .. } => ApiErrorKind::RateLimited,
            Self::NotFound(_) => ApiErrorKind::NotFound,
            _ => ApiErrorKind::InternalError,
        }
    }
}
