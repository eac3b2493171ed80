use anyhow::{Context, Result};
use serde_json::json;
use uuid::Uuid;

use linkscan_core::config::AppConfig;
use linkscan_core::LinkFilter;
use linkscan_storage::{JobStore, PgStore};

pub async fn run(config: AppConfig, job_id: String, output: Option<String>) -> Result<()> {
    let job_id: Uuid = job_id.parse().context("job id must be a UUID")?;
    let store = PgStore::new(&config.database.url).await?;

    let Some(job) = store.get_job(job_id).await? else {
        println!("Job {job_id} not found");
        return Ok(());
    };

    // page through everything; export is expected to be complete
    let mut links = Vec::new();
    let mut page = 1;
    loop {
        let chunk = store
            .list_discovered_links(job_id, LinkFilter::All, page, 1000)
            .await?;
        let done = chunk.len() < 1000;
        links.extend(chunk);
        if done {
            break;
        }
        page += 1;
    }

    let document = json!({
        "job": job,
        "summary": store.get_summary(job_id).await?,
        "links": links,
        "broken_links": store.list_broken_links(job_id).await?,
        "seo_records": store.list_seo_records(job_id).await?,
    });
    let rendered = serde_json::to_string_pretty(&document)?;

    match output {
        Some(path) => {
            std::fs::write(&path, rendered).with_context(|| format!("failed writing {path}"))?;
            println!("Exported job {job_id} to {path}");
        }
        None => println!("{rendered}"),
    }

    Ok(())
}
