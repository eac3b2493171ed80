//! In-memory store backing tests and dry runs. Follows the same contract
//! as the Postgres store, including terminal-status immutability.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use linkscan_core::{
    BrokenLink, DiscoveredLink, Job, JobStatus, JobSummary, LinkCheckState, LinkCheckUpdate,
    LinkFilter, Progress, SeoRecord, Settings,
};

use crate::{link_matches, JobStore};

#[derive(Default)]
struct JobRecord {
    job: Option<Job>,
    links: Vec<DiscoveredLink>,
    broken: Vec<BrokenLink>,
    seo: HashMap<String, SeoRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    jobs: Mutex<HashMap<Uuid, JobRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create_job(&self, seed_url: &str, settings: &Settings) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let job = Job {
            id,
            seed_url: seed_url.to_string(),
            settings: settings.clone(),
            status: JobStatus::Pending,
            progress: Progress::default(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
        };
        let mut jobs = self.jobs.lock().await;
        jobs.insert(
            id,
            JobRecord {
                job: Some(job),
                ..Default::default()
            },
        );
        Ok(id)
    }

    async fn set_status(&self, job_id: Uuid, status: JobStatus, error_message: Option<&str>) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let record = jobs.get_mut(&job_id).ok_or_else(|| anyhow!("job {job_id} not found"))?;
        let job = record.job.as_mut().ok_or_else(|| anyhow!("job {job_id} missing row"))?;
        if job.status.is_terminal() {
            return Ok(());
        }
        job.status = status;
        if let Some(msg) = error_message {
            job.error_message = Some(msg.to_string());
        }
        match status {
            JobStatus::Running => job.started_at = Some(Utc::now()),
            s if s.is_terminal() => job.completed_at = Some(Utc::now()),
            _ => {}
        }
        Ok(())
    }

    async fn set_progress(&self, job_id: Uuid, current: u64, total: u64) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let record = jobs.get_mut(&job_id).ok_or_else(|| anyhow!("job {job_id} not found"))?;
        if let Some(job) = record.job.as_mut() {
            job.progress = Progress::new(current, total);
        }
        Ok(())
    }

    async fn upsert_discovered_links(&self, job_id: Uuid, links: &[DiscoveredLink]) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let record = jobs.get_mut(&job_id).ok_or_else(|| anyhow!("job {job_id} not found"))?;
        for link in links {
            // conflict key (job_id, url): keep the existing row
            if !record.links.iter().any(|l| l.url == link.url) {
                record.links.push(link.clone());
            }
        }
        Ok(())
    }

    async fn update_link_check(&self, job_id: Uuid, url: &str, update: &LinkCheckUpdate) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let record = jobs.get_mut(&job_id).ok_or_else(|| anyhow!("job {job_id} not found"))?;
        let link = record
            .links
            .iter_mut()
            .find(|l| l.url == url)
            .ok_or_else(|| anyhow!("link {url} not found in job {job_id}"))?;
        link.status = LinkCheckState::Checked;
        link.http_status_code = update.http_status_code;
        link.response_time_ms = Some(update.response_time_ms);
        link.checked_at = Some(update.checked_at);
        link.is_working = Some(update.is_working);
        link.error_message = update.error_message.clone();
        Ok(())
    }

    async fn add_broken_link(&self, job_id: Uuid, link: &BrokenLink) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let record = jobs.get_mut(&job_id).ok_or_else(|| anyhow!("job {job_id} not found"))?;
        if !record.broken.iter().any(|b| b.url == link.url) {
            record.broken.push(link.clone());
        }
        Ok(())
    }

    async fn upsert_seo_record(&self, record: &SeoRecord) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(&record.job_id)
            .ok_or_else(|| anyhow!("job {} not found", record.job_id))?;
        job.seo.insert(record.url.clone(), record.clone());
        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>> {
        let jobs = self.jobs.lock().await;
        Ok(jobs.get(&job_id).and_then(|r| r.job.clone()))
    }

    async fn list_discovered_links(
        &self,
        job_id: Uuid,
        filter: LinkFilter,
        page: u32,
        limit: u32,
    ) -> Result<Vec<DiscoveredLink>> {
        let jobs = self.jobs.lock().await;
        let record = jobs.get(&job_id).ok_or_else(|| anyhow!("job {job_id} not found"))?;
        let offset = (page.max(1) - 1) as usize * limit as usize;
        Ok(record
            .links
            .iter()
            .filter(|l| link_matches(l, filter))
            .skip(offset)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn list_broken_links(&self, job_id: Uuid) -> Result<Vec<BrokenLink>> {
        let jobs = self.jobs.lock().await;
        let record = jobs.get(&job_id).ok_or_else(|| anyhow!("job {job_id} not found"))?;
        Ok(record.broken.clone())
    }

    async fn list_seo_records(&self, job_id: Uuid) -> Result<Vec<SeoRecord>> {
        let jobs = self.jobs.lock().await;
        let record = jobs.get(&job_id).ok_or_else(|| anyhow!("job {job_id} not found"))?;
        let mut records: Vec<SeoRecord> = record.seo.values().cloned().collect();
        records.sort_by(|a, b| a.url.cmp(&b.url));
        Ok(records)
    }

    async fn get_summary(&self, job_id: Uuid) -> Result<JobSummary> {
        let jobs = self.jobs.lock().await;
        let record = jobs.get(&job_id).ok_or_else(|| anyhow!("job {job_id} not found"))?;

        let times: Vec<u64> = record.links.iter().filter_map(|l| l.response_time_ms).collect();
        let avg_response_time_ms = if times.is_empty() {
            None
        } else {
            Some(times.iter().sum::<u64>() / times.len() as u64)
        };
        let scores: Vec<u8> = record.seo.values().map(|r| r.score).collect();
        let avg_seo_score = if scores.is_empty() {
            None
        } else {
            Some(scores.iter().map(|s| *s as f64).sum::<f64>() / scores.len() as f64)
        };

        Ok(JobSummary {
            total_links: record.links.len() as u64,
            checked: record
                .links
                .iter()
                .filter(|l| l.status == LinkCheckState::Checked)
                .count() as u64,
            broken: record
                .links
                .iter()
                .filter(|l| l.is_working == Some(false))
                .count() as u64,
            internal: record.links.iter().filter(|l| l.is_internal).count() as u64,
            external: record.links.iter().filter(|l| !l.is_internal).count() as u64,
            avg_response_time_ms,
            seo_pages: record.seo.len() as u64,
            avg_seo_score,
        })
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut jobs = self.jobs.lock().await;
        let before = jobs.len();
        jobs.retain(|_, r| r.job.as_ref().map(|j| j.created_at >= cutoff).unwrap_or(false));
        Ok((before - jobs.len()) as u64)
    }
}
