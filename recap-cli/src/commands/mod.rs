pub mod create;
pub mod list;
pub mod run;
pub mod run_pending;
pub mod show;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Subcommand;

use recap_core::agent::SummarizationAgent;
use recap_core::agent::providers::create_provider;
use recap_core::config::RecapConfig;
use recap_core::job::ReportJob;
use recap_core::mirror::RepositoryMirror;
use recap_core::runner::JobRunner;
use recap_core::store::SqliteJobStore;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a new report job for a repository
    Create(create::CreateArgs),
    /// Run one report job to completion
    Run(run::RunArgs),
    /// Show a report job and its latest summary
    Show(show::ShowArgs),
    /// List report jobs, newest first
    List(list::ListArgs),
    /// Run all pending jobs through a worker pool
    RunPending(run_pending::RunPendingArgs),
}

pub async fn run(cmd: Command) -> anyhow::Result<()> {
    match cmd {
        Command::Create(args) => create::run(args).await,
        Command::Run(args) => run::run(args).await,
        Command::Show(args) => show::run(args).await,
        Command::List(args) => list::run(args).await,
        Command::RunPending(args) => run_pending::run(args).await,
    }
}

/// Load `recap.toml` when present, defaults otherwise. A missing file is
/// fine; a malformed one is not.
pub(crate) fn load_config(path: &Path) -> anyhow::Result<RecapConfig> {
    if !path.exists() {
        let config = RecapConfig::default();
        config.validate().context("Invalid default config")?;
        return Ok(config);
    }
    RecapConfig::load(path).with_context(|| format!("Cannot load config: {}", path.display()))
}

pub(crate) fn open_store(config: &RecapConfig) -> anyhow::Result<Arc<SqliteJobStore>> {
    let db_path = &config.store.db_path;
    let store = SqliteJobStore::open(db_path)
        .with_context(|| format!("Cannot open database: {}", db_path.display()))?;
    Ok(Arc::new(store))
}

/// Assemble a runner from config and environment. The git credential is
/// passed through to sync calls only; it is never logged or stored.
pub(crate) fn build_runner(
    config: &RecapConfig,
    store: Arc<SqliteJobStore>,
    api_key: &str,
    git_token: Option<String>,
) -> anyhow::Result<JobRunner> {
    let provider = create_provider(&config.agent, api_key).context("Cannot build provider")?;
    let agent = SummarizationAgent::new(
        provider,
        config.agent.temperature,
        config.agent.max_tool_turns,
    );
    let mirror = Arc::new(RepositoryMirror::new(config.mirror.clone_root.clone()));
    Ok(JobRunner::new(store, mirror, agent, git_token))
}

pub(crate) fn print_job(job: &ReportJob) {
    println!("Job {}: {}", job.id, job.title);
    println!("  Kind:       {}", job.report_kind);
    println!("  Repository: {}", job.repository_url);
    println!("  Status:     {}", job.status.as_str());
    println!("  Created:    {}", job.created_at.to_rfc3339());
    if let Some(completed) = &job.completed_at {
        println!("  Finished:   {}", completed.to_rfc3339());
    }
    if let Some(checkpoint) = &job.checkpoint_hash {
        println!("  Checkpoint: {checkpoint}");
    }
}
