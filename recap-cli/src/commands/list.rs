use std::path::PathBuf;

use clap::Args;

use recap_core::job::JobStatus;
use recap_core::store::JobStore;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only show jobs in this status (pending, generating, completed, failed)
    #[arg(long)]
    pub status: Option<String>,

    /// Emit jobs as JSON instead of a table
    #[arg(long)]
    pub json: bool,

    /// Path to recap.toml
    #[arg(long, default_value = "recap.toml")]
    pub config: PathBuf,
}

pub async fn run(args: ListArgs) -> anyhow::Result<()> {
    let config = super::load_config(&args.config)?;
    let store = super::open_store(&config)?;

    let jobs = match &args.status {
        Some(raw) => {
            let status: JobStatus = serde_json::from_str(&format!("\"{raw}\""))
                .map_err(|_| anyhow::anyhow!("unknown status `{raw}`"))?;
            store.list_jobs_by_status(status).await?
        }
        None => store.list_jobs().await?,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
        return Ok(());
    }

    if jobs.is_empty() {
        println!("No report jobs.");
        return Ok(());
    }

    println!("{:<6} {:<11} {:<20} {}", "ID", "STATUS", "CREATED", "TITLE");
    for job in &jobs {
        println!(
            "{:<6} {:<11} {:<20} {}",
            job.id,
            job.status.as_str(),
            job.created_at.format("%Y-%m-%d %H:%M:%S"),
            job.title
        );
    }
    Ok(())
}
