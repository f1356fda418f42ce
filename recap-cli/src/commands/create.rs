use std::path::PathBuf;

use clap::Args;

use recap_core::job::NewJob;
use recap_core::store::JobStore;

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Report title
    pub title: String,

    /// Remote repository URL (https) or local path
    pub repository_url: String,

    /// Report kind label, stored verbatim
    #[arg(long, default_value = "investor_update")]
    pub kind: String,

    /// Path to recap.toml
    #[arg(long, default_value = "recap.toml")]
    pub config: PathBuf,
}

pub async fn run(args: CreateArgs) -> anyhow::Result<()> {
    let config = super::load_config(&args.config)?;
    let store = super::open_store(&config)?;

    let new = NewJob::new(args.title, args.repository_url).with_kind(args.kind);
    let id = store.create_job(&new).await?;

    let job = store.get_job(id).await?;
    super::print_job(&job);
    Ok(())
}
