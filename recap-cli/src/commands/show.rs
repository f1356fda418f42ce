use std::path::PathBuf;

use clap::Args;

use recap_core::job::JobId;
use recap_core::store::JobStore;

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// ID of the job to show
    pub job_id: i64,

    /// Emit the job as JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Path to recap.toml
    #[arg(long, default_value = "recap.toml")]
    pub config: PathBuf,
}

pub async fn run(args: ShowArgs) -> anyhow::Result<()> {
    let config = super::load_config(&args.config)?;
    let store = super::open_store(&config)?;

    let job = store.get_job(JobId(args.job_id)).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&job)?);
        return Ok(());
    }

    super::print_job(&job);
    if let Some(summary) = &job.summary_text {
        println!();
        println!("{summary}");
    }
    Ok(())
}
