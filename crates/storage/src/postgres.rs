//! Postgres-backed job store with embedded migrations and batched inserts.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use linkscan_core::{
    BrokenLink, DiscoveredLink, ErrorType, Grade, Job, JobStatus, JobSummary, LinkCheckState,
    LinkCheckUpdate, LinkFilter, Progress, SeoRecord, Settings,
};

use crate::JobStore;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::with_pool_size(database_url, 10).await
    }

    pub async fn with_pool_size(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("failed to connect to postgres")?;

        info!(max_connections, "connected to postgres");
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::raw_sql(include_str!("../migrations/001_init.sql"))
            .execute(&self.pool)
            .await?;
        info!("migrations complete");
        Ok(())
    }
}

fn parse_status(s: &str) -> JobStatus {
    match s {
        "running" => JobStatus::Running,
        "completed" => JobStatus::Completed,
        "failed" => JobStatus::Failed,
        "stopped" => JobStatus::Stopped,
        _ => JobStatus::Pending,
    }
}

fn parse_grade(s: &str) -> Grade {
    match s {
        "A" => Grade::A,
        "B" => Grade::B,
        "C" => Grade::C,
        "D" => Grade::D,
        _ => Grade::F,
    }
}

fn grade_str(grade: Grade) -> &'static str {
    match grade {
        Grade::A => "A",
        Grade::B => "B",
        Grade::C => "C",
        Grade::D => "D",
        Grade::F => "F",
    }
}

fn link_from_row(row: &sqlx::postgres::PgRow) -> Result<DiscoveredLink> {
    Ok(DiscoveredLink {
        job_id: row.try_get("job_id")?,
        url: row.try_get("url")?,
        source_url: row.try_get("source_url")?,
        is_internal: row.try_get("is_internal")?,
        depth: row.try_get::<i32, _>("depth")? as u32,
        status: match row.try_get::<String, _>("status")?.as_str() {
            "checked" => LinkCheckState::Checked,
            _ => LinkCheckState::Pending,
        },
        http_status_code: row.try_get::<Option<i32>, _>("http_status_code")?.map(|c| c as u16),
        response_time_ms: row.try_get::<Option<i64>, _>("response_time_ms")?.map(|t| t as u64),
        checked_at: row.try_get("checked_at")?,
        is_working: row.try_get("is_working")?,
        error_message: row.try_get("error_message")?,
    })
}

#[async_trait]
impl JobStore for PgStore {
    async fn create_job(&self, seed_url: &str, settings: &Settings) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"INSERT INTO jobs (id, seed_url, settings, status)
               VALUES ($1, $2, $3, 'pending')"#,
        )
        .bind(id)
        .bind(seed_url)
        .bind(serde_json::to_value(settings)?)
        .execute(&self.pool)
        .await
        .context("failed to create job")?;

        info!(job_id = %id, seed = seed_url, "created job");
        Ok(id)
    }

    async fn set_status(&self, job_id: Uuid, status: JobStatus, error_message: Option<&str>) -> Result<()> {
        // the status guard makes terminal states sticky
        sqlx::query(
            r#"UPDATE jobs SET
                 status = $2,
                 error_message = COALESCE($3, error_message),
                 started_at = CASE WHEN $2 = 'running' THEN now() ELSE started_at END,
                 completed_at = CASE WHEN $2 IN ('completed','failed','stopped')
                                     THEN now() ELSE completed_at END
               WHERE id = $1
                 AND status NOT IN ('completed','failed','stopped')"#,
        )
        .bind(job_id)
        .bind(status.as_str())
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_progress(&self, job_id: Uuid, current: u64, total: u64) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET progress_current = $2, progress_total = $3 WHERE id = $1",
        )
        .bind(job_id)
        .bind(current.min(total) as i64)
        .bind(total as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_discovered_links(&self, job_id: Uuid, links: &[DiscoveredLink]) -> Result<()> {
        if links.is_empty() {
            return Ok(());
        }

        let mut urls: Vec<String> = Vec::with_capacity(links.len());
        let mut sources: Vec<Option<String>> = Vec::with_capacity(links.len());
        let mut internals: Vec<bool> = Vec::with_capacity(links.len());
        let mut depths: Vec<i32> = Vec::with_capacity(links.len());
        for link in links {
            urls.push(link.url.clone());
            sources.push(link.source_url.clone());
            internals.push(link.is_internal);
            depths.push(link.depth as i32);
        }

        sqlx::query(
            r#"INSERT INTO discovered_links (job_id, url, source_url, is_internal, depth, status)
               SELECT $1, u, s, i, d, 'pending'
               FROM UNNEST($2::text[], $3::text[], $4::bool[], $5::int[]) AS t(u, s, i, d)
               ON CONFLICT (job_id, url) DO NOTHING"#,
        )
        .bind(job_id)
        .bind(&urls)
        .bind(&sources)
        .bind(&internals)
        .bind(&depths)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_link_check(&self, job_id: Uuid, url: &str, update: &LinkCheckUpdate) -> Result<()> {
        sqlx::query(
            r#"UPDATE discovered_links SET
                 status = 'checked',
                 http_status_code = $3,
                 response_time_ms = $4,
                 checked_at = $5,
                 is_working = $6,
                 error_message = $7
               WHERE job_id = $1 AND url = $2"#,
        )
        .bind(job_id)
        .bind(url)
        .bind(update.http_status_code.map(|c| c as i32))
        .bind(update.response_time_ms as i64)
        .bind(update.checked_at)
        .bind(update.is_working)
        .bind(&update.error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn add_broken_link(&self, job_id: Uuid, link: &BrokenLink) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO broken_links (job_id, url, source_url, status_code, error_type, link_text)
               VALUES ($1, $2, $3, $4, $5, $6)
               ON CONFLICT (job_id, url) DO NOTHING"#,
        )
        .bind(job_id)
        .bind(&link.url)
        .bind(&link.source_url)
        .bind(link.status_code.map(|c| c as i32))
        .bind(link.error_type.code())
        .bind(&link.link_text)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_seo_record(&self, record: &SeoRecord) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO seo_records (job_id, url, score, grade, issues, metrics, error)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               ON CONFLICT (job_id, url) DO UPDATE SET
                 score = EXCLUDED.score,
                 grade = EXCLUDED.grade,
                 issues = EXCLUDED.issues,
                 metrics = EXCLUDED.metrics,
                 error = EXCLUDED.error"#,
        )
        .bind(record.job_id)
        .bind(&record.url)
        .bind(record.score as i32)
        .bind(grade_str(record.grade))
        .bind(serde_json::to_value(&record.issues)?)
        .bind(serde_json::to_value(&record.metrics)?)
        .bind(&record.error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query(
            r#"SELECT id, seed_url, settings, status, progress_current, progress_total,
                      error_message, created_at, started_at, completed_at
               FROM jobs WHERE id = $1"#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let settings: Settings = serde_json::from_value(row.try_get("settings")?)?;
        let current = row.try_get::<i64, _>("progress_current")? as u64;
        let total = row.try_get::<i64, _>("progress_total")? as u64;

        Ok(Some(Job {
            id: row.try_get("id")?,
            seed_url: row.try_get("seed_url")?,
            settings,
            status: parse_status(&row.try_get::<String, _>("status")?),
            progress: Progress::new(current, total),
            created_at: row.try_get("created_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            error_message: row.try_get("error_message")?,
        }))
    }

    async fn list_discovered_links(
        &self,
        job_id: Uuid,
        filter: LinkFilter,
        page: u32,
        limit: u32,
    ) -> Result<Vec<DiscoveredLink>> {
        let clause = match filter {
            LinkFilter::All => "",
            LinkFilter::Broken => " AND is_working = false",
            LinkFilter::Working => " AND is_working = true",
            LinkFilter::Internal => " AND is_internal = true",
            LinkFilter::External => " AND is_internal = false",
            LinkFilter::Pending => " AND status = 'pending'",
        };
        let sql = format!(
            "SELECT * FROM discovered_links WHERE job_id = $1{clause} ORDER BY url LIMIT $2 OFFSET $3"
        );

        let offset = (page.max(1) as i64 - 1) * limit as i64;
        let rows = sqlx::query(&sql)
            .bind(job_id)
            .bind(limit as i64)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(link_from_row).collect()
    }

    async fn list_broken_links(&self, job_id: Uuid) -> Result<Vec<BrokenLink>> {
        let rows = sqlx::query(
            "SELECT job_id, url, source_url, status_code, error_type, link_text
             FROM broken_links WHERE job_id = $1 ORDER BY id",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(BrokenLink {
                    job_id: row.try_get("job_id")?,
                    url: row.try_get("url")?,
                    source_url: row.try_get("source_url")?,
                    status_code: row.try_get::<Option<i32>, _>("status_code")?.map(|c| c as u16),
                    error_type: ErrorType::parse(&row.try_get::<String, _>("error_type")?),
                    link_text: row.try_get("link_text")?,
                })
            })
            .collect()
    }

    async fn list_seo_records(&self, job_id: Uuid) -> Result<Vec<SeoRecord>> {
        let rows = sqlx::query(
            "SELECT job_id, url, score, grade, issues, metrics, error
             FROM seo_records WHERE job_id = $1 ORDER BY url",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(SeoRecord {
                    job_id: row.try_get("job_id")?,
                    url: row.try_get("url")?,
                    score: row.try_get::<i32, _>("score")? as u8,
                    grade: parse_grade(&row.try_get::<String, _>("grade")?),
                    issues: serde_json::from_value(row.try_get("issues")?)?,
                    metrics: serde_json::from_value(row.try_get("metrics")?)?,
                    error: row.try_get("error")?,
                })
            })
            .collect()
    }

    async fn get_summary(&self, job_id: Uuid) -> Result<JobSummary> {
        let row = sqlx::query(
            r#"SELECT
                 count(*) AS total,
                 count(*) FILTER (WHERE status = 'checked') AS checked,
                 count(*) FILTER (WHERE is_working = false) AS broken,
                 count(*) FILTER (WHERE is_internal) AS internal,
                 count(*) FILTER (WHERE NOT is_internal) AS external,
                 avg(response_time_ms)::float8 AS avg_response_time
               FROM discovered_links WHERE job_id = $1"#,
        )
        .bind(job_id)
        .fetch_one(&self.pool)
        .await?;

        let seo_row = sqlx::query(
            "SELECT count(*) AS pages, avg(score)::float8 AS avg_score FROM seo_records WHERE job_id = $1",
        )
        .bind(job_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(JobSummary {
            total_links: row.try_get::<i64, _>("total")? as u64,
            checked: row.try_get::<i64, _>("checked")? as u64,
            broken: row.try_get::<i64, _>("broken")? as u64,
            internal: row.try_get::<i64, _>("internal")? as u64,
            external: row.try_get::<i64, _>("external")? as u64,
            avg_response_time_ms: row
                .try_get::<Option<f64>, _>("avg_response_time")?
                .map(|f| f as u64),
            seo_pages: seo_row.try_get::<i64, _>("pages")? as u64,
            avg_seo_score: seo_row.try_get::<Option<f64>, _>("avg_score")?,
        })
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM jobs WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
