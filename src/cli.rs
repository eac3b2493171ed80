use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "linkscan", about = "Broken-link scanner & on-page SEO analyzer")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    /// Keep results in memory instead of postgres (useful for one-off runs)
    #[arg(long)]
    pub memory_store: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Discover and check every reachable link on a site
    Crawl {
        /// Seed URL
        url: String,

        /// Maximum crawl depth (1-5)
        #[arg(short, long, default_value = "2")]
        depth: u32,

        /// Also check cross-origin links
        #[arg(long)]
        external: bool,

        /// Score fetched HTML pages against SEO heuristics
        #[arg(long)]
        seo: bool,

        /// Per-request timeout in milliseconds (1000-30000)
        #[arg(short, long, default_value = "10000")]
        timeout: u64,

        /// Skip the robots.txt consultation
        #[arg(long)]
        no_robots: bool,
    },
    /// Check a pre-supplied URL list
    Check {
        /// Base site the URLs belong to
        #[arg(short, long)]
        base: String,

        /// URLs to check (comma-separated, or a file path with one per line)
        #[arg(short, long)]
        urls: String,

        /// Treat the URLs as content pages: also extract and check their links
        #[arg(long)]
        extract: bool,

        /// Per-request timeout in milliseconds (1000-30000)
        #[arg(short, long, default_value = "10000")]
        timeout: u64,
    },
    /// Show a job's status and summary
    Status {
        /// Job id (UUID)
        job_id: String,
    },
    /// Export a job's results as JSON
    Export {
        /// Job id (UUID)
        job_id: String,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
}
