use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use tracing::info;

use recap_core::job::JobStatus;
use recap_core::store::JobStore;
use recap_core::worker::WorkerPool;

#[derive(Args, Debug)]
pub struct RunPendingArgs {
    /// Number of concurrent workers
    #[arg(long, default_value_t = 2)]
    pub workers: usize,

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

pub async fn run(args: RunPendingArgs) -> anyhow::Result<()> {
    let config = super::load_config(&args.config)?;
    let store = super::open_store(&config)?;
    let runner = Arc::new(super::build_runner(
        &config,
        store.clone(),
        &args.api_key,
        args.git_token,
    )?);

    let pending = store.list_jobs_by_status(JobStatus::Pending).await?;
    if pending.is_empty() {
        println!("No pending jobs.");
        return Ok(());
    }

    info!(jobs = pending.len(), workers = args.workers, "Dispatching pending jobs");
    let pool = WorkerPool::spawn(runner, args.workers, pending.len().max(1));
    let queue = pool.queue();
    for job in &pending {
        if !queue.submit(job.id).await {
            anyhow::bail!("worker pool rejected job {}", job.id);
        }
    }
    pool.shutdown().await;

    let mut completed = 0usize;
    let mut failed = 0usize;
    for job in &pending {
        match store.get_job(job.id).await?.status {
            JobStatus::Completed => completed += 1,
            _ => failed += 1,
        }
    }
    println!("Ran {} jobs: {completed} completed, {failed} failed.", pending.len());
    Ok(())
}
