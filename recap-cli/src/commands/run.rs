use std::path::PathBuf;

use clap::Args;

use recap_core::job::JobId;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// ID of the job to run
    pub job_id: i64,

    /// Provider API key
    #[arg(long, env = "RECAP_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Git credential for private remotes (injected per fetch, never stored)
    #[arg(long, env = "RECAP_GIT_TOKEN", hide_env_values = true)]
    pub git_token: Option<String>,

    /// Path to recap.toml
    #[arg(long, default_value = "recap.toml")]
    pub config: PathBuf,
}

pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = super::load_config(&args.config)?;
    let store = super::open_store(&config)?;
    let runner = super::build_runner(&config, store, &args.api_key, args.git_token)?;

    let job = runner.run(JobId(args.job_id)).await?;
    super::print_job(&job);
    if let Some(summary) = &job.summary_text {
        println!();
        println!("{summary}");
    }
    Ok(())
}
