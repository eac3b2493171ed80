//! Job store adapter: the only component that mutates persisted rows.
//! All writes are idempotent under retry of the same logical event.

mod memory;
mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use linkscan_core::{
    BrokenLink, DiscoveredLink, Job, JobStatus, JobSummary, LinkCheckUpdate, LinkFilter,
    SeoRecord, Settings,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait JobStore: Send + Sync + 'static {
    /// Create a pending job and return its id.
    async fn create_job(&self, seed_url: &str, settings: &Settings) -> Result<Uuid>;

    /// Transition job status. Terminal states are never left; a transition
    /// out of one is silently ignored. Terminal transitions stamp
    /// `completed_at`.
    async fn set_status(&self, job_id: Uuid, status: JobStatus, error_message: Option<&str>) -> Result<()>;

    async fn set_progress(&self, job_id: Uuid, current: u64, total: u64) -> Result<()>;

    /// Insert rows keyed on (job_id, url); existing rows are kept.
    async fn upsert_discovered_links(&self, job_id: Uuid, links: &[DiscoveredLink]) -> Result<()>;

    /// Write the check outcome onto an existing discovered link.
    async fn update_link_check(&self, job_id: Uuid, url: &str, update: &LinkCheckUpdate) -> Result<()>;

    /// Append-only; re-adding the same (job_id, url) is a no-op.
    async fn add_broken_link(&self, job_id: Uuid, link: &BrokenLink) -> Result<()>;

    /// One record per (job_id, url); later writes replace earlier ones.
    async fn upsert_seo_record(&self, record: &SeoRecord) -> Result<()>;

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>>;

    /// Paginated listing, `page` starting at 1.
    async fn list_discovered_links(
        &self,
        job_id: Uuid,
        filter: LinkFilter,
        page: u32,
        limit: u32,
    ) -> Result<Vec<DiscoveredLink>>;

    async fn list_broken_links(&self, job_id: Uuid) -> Result<Vec<BrokenLink>>;

    async fn list_seo_records(&self, job_id: Uuid) -> Result<Vec<SeoRecord>>;

    async fn get_summary(&self, job_id: Uuid) -> Result<JobSummary>;

    /// Delete jobs (and cascaded rows) created before the cutoff. Called by
    /// the external scheduled sweep; returns the number of jobs removed.
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

pub(crate) fn link_matches(link: &DiscoveredLink, filter: LinkFilter) -> bool {
    use linkscan_core::LinkCheckState;
    match filter {
        LinkFilter::All => true,
        LinkFilter::Broken => link.is_working == Some(false),
        LinkFilter::Working => link.is_working == Some(true),
        LinkFilter::Internal => link.is_internal,
        LinkFilter::External => !link.is_internal,
        LinkFilter::Pending => link.status == LinkCheckState::Pending,
    }
}
