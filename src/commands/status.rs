use anyhow::{Context, Result};
use uuid::Uuid;

use linkscan_core::config::AppConfig;
use linkscan_storage::{JobStore, PgStore};

pub async fn run(config: AppConfig, job_id: String) -> Result<()> {
    let job_id: Uuid = job_id.parse().context("job id must be a UUID")?;
    let store = PgStore::new(&config.database.url).await?;

    let Some(job) = store.get_job(job_id).await? else {
        println!("Job {job_id} not found");
        return Ok(());
    };
    let summary = store.get_summary(job_id).await?;

    println!("Job:          {job_id}");
    println!("Seed:         {}", job.seed_url);
    println!("Status:       {}", job.status);
    println!("Created:      {}", job.created_at);
    if let Some(completed) = job.completed_at {
        println!("Completed:    {completed}");
    }
    if let Some(err) = &job.error_message {
        println!("Error:        {err}");
    }
    println!("Progress:     {}/{} ({}%)", job.progress.current, job.progress.total, job.progress.percentage);
    println!("Links:        {} total, {} checked, {} broken", summary.total_links, summary.checked, summary.broken);
    if summary.seo_pages > 0 {
        if let Some(avg) = summary.avg_seo_score {
            println!("SEO:          {} pages analyzed, avg score {avg:.1}", summary.seo_pages);
        }
    }

    Ok(())
}
