use std::sync::Arc;

use tracing::{error, info, warn};

use crate::agent::SummarizationAgent;
use crate::error::RecapError;
use crate::history::CommitHistoryExtractor;
use crate::job::{JobId, ReportJob};
use crate::mirror::RepositoryMirror;
use crate::store::JobStore;

/// Orchestrates one report run end to end: claim the job, sync the
/// mirror, summarize, persist the outcome.
///
/// The head recorded as the new checkpoint is the one observed by this
/// run's sync, captured before the agent starts. Commits landing on the
/// remote mid-generation stay outside this run's window and are picked
/// up by the next one.
pub struct JobRunner {
    store: Arc<dyn JobStore>,
    mirror: Arc<RepositoryMirror>,
    agent: SummarizationAgent,
    credential: Option<String>,
}

impl std::fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRunner")
            .field("mirror", &self.mirror)
            .field("agent", &self.agent)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl JobRunner {
    pub fn new(
        store: Arc<dyn JobStore>,
        mirror: Arc<RepositoryMirror>,
        agent: SummarizationAgent,
        credential: Option<String>,
    ) -> Self {
        Self {
            store,
            mirror,
            agent,
            credential,
        }
    }

    /// Run one job to a terminal status. On success the job carries the
    /// new summary and checkpoint; on any failure past the claim the job
    /// is marked failed with summary and checkpoint untouched, and the
    /// original error propagates.
    pub async fn run(&self, id: JobId) -> crate::error::Result<ReportJob> {
        let job = self.store.claim_for_generation(id).await?;
        info!(job = %id, repo = %job.repository_url, "Starting report run");

        match self.run_claimed(&job).await {
            Ok((summary, head)) => {
                self.store.complete_job(id, &summary, &head).await?;
                info!(job = %id, checkpoint = %head, "Report run completed");
                self.store.get_job(id).await
            }
            Err(run_err) => {
                error!(job = %id, error = %run_err, "Report run failed");
                if let Err(release_err) = self.store.fail_job(id).await {
                    // The run error is the interesting one; the release
                    // failure only gets logged.
                    warn!(job = %id, error = %release_err, "Could not mark job failed");
                }
                Err(run_err)
            }
        }
    }

    /// Run one job, aborting when `cancel` resolves first. A cancelled
    /// run releases the lease and reports [`RecapError::Cancelled`].
    pub async fn run_until_cancelled<F>(
        &self,
        id: JobId,
        cancel: F,
    ) -> crate::error::Result<ReportJob>
    where
        F: std::future::Future<Output = ()>,
    {
        tokio::select! {
            result = self.run(id) => result,
            () = cancel => {
                warn!(job = %id, "Report run cancelled");
                if let Err(release_err) = self.store.fail_job(id).await {
                    warn!(job = %id, error = %release_err, "Could not mark cancelled job failed");
                }
                Err(RecapError::Cancelled(id))
            }
        }
    }

    /// The fallible middle of a run, between claim and terminal write.
    async fn run_claimed(&self, job: &ReportJob) -> crate::error::Result<(String, String)> {
        let handle = self
            .mirror
            .ensure_up_to_date(&job.repository_url, self.credential.as_deref())
            .await?;
        let head = handle.current_head().to_string();

        // Validate the stored checkpoint up front so a stale one surfaces
        // as UnknownCheckpoint instead of a confusing agent answer. An
        // empty window is still summarized — "nothing new" is a report.
        let extractor = CommitHistoryExtractor::new(&handle);
        let window = extractor.commits_since(job.checkpoint_hash.as_deref())?;
        info!(
            job = %job.id,
            head = %head,
            commits = window.len(),
            "Mirror synced, invoking agent"
        );

        let summary = self
            .agent
            .summarize(&extractor, job.checkpoint_hash.as_deref())
            .await?;
        Ok((summary, head))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentReply, ChatProvider, ToolSpec, Turn};
    use crate::error::{ConcurrencyError, GenerationError, HistoryError};
    use crate::job::{JobStatus, NewJob};
    use crate::store::SqliteJobStore;
    use std::process::Command;
    use tempfile::TempDir;

    fn git(dir: &std::path::Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .env("GIT_AUTHOR_NAME", "Test")
            .env("GIT_AUTHOR_EMAIL", "test@example.com")
            .env("GIT_COMMITTER_NAME", "Test")
            .env("GIT_COMMITTER_EMAIL", "test@example.com")
            .status()
            .expect("git must be runnable in tests");
        assert!(status.success(), "git {args:?} failed");
    }

    fn create_remote(dir: &std::path::Path) {
        git(dir, &["init", "--initial-branch=main"]);
        add_commit(dir, "Initial commit");
    }

    fn add_commit(dir: &std::path::Path, message: &str) {
        git(dir, &["commit", "--allow-empty", "-m", message]);
    }

    /// Provider that answers on the first round without touching tools.
    #[derive(Debug)]
    struct OneShotProvider(String);

    #[async_trait::async_trait]
    impl ChatProvider for OneShotProvider {
        fn name(&self) -> &str {
            "one-shot"
        }

        fn model_id(&self) -> &str {
            "one-shot"
        }

        async fn chat(
            &self,
            _instructions: &str,
            _turns: &[Turn],
            _tools: &[ToolSpec],
            _temperature: f64,
        ) -> crate::error::Result<AgentReply> {
            Ok(AgentReply {
                text: Some(self.0.clone()),
                ..AgentReply::default()
            })
        }
    }

    /// Provider that always fails, standing in for an outage.
    #[derive(Debug)]
    struct DownProvider;

    #[async_trait::async_trait]
    impl ChatProvider for DownProvider {
        fn name(&self) -> &str {
            "down"
        }

        fn model_id(&self) -> &str {
            "down"
        }

        async fn chat(
            &self,
            _instructions: &str,
            _turns: &[Turn],
            _tools: &[ToolSpec],
            _temperature: f64,
        ) -> crate::error::Result<AgentReply> {
            Err(GenerationError::ProviderUnavailable("down for maintenance".to_string()).into())
        }
    }

    /// Provider that signals when the run has reached generation, then
    /// stalls forever. Used to cancel a run that is past its claim.
    #[derive(Debug)]
    struct StallProvider(Arc<tokio::sync::Notify>);

    #[async_trait::async_trait]
    impl ChatProvider for StallProvider {
        fn name(&self) -> &str {
            "stall"
        }

        fn model_id(&self) -> &str {
            "stall"
        }

        async fn chat(
            &self,
            _instructions: &str,
            _turns: &[Turn],
            _tools: &[ToolSpec],
            _temperature: f64,
        ) -> crate::error::Result<AgentReply> {
            self.0.notify_one();
            std::future::pending::<()>().await;
            unreachable!("pending future never resolves")
        }
    }

    fn runner(
        clone_root: &std::path::Path,
        provider: Box<dyn ChatProvider>,
    ) -> (Arc<SqliteJobStore>, JobRunner) {
        let store = Arc::new(SqliteJobStore::in_memory().unwrap());
        let runner = JobRunner::new(
            store.clone(),
            Arc::new(RepositoryMirror::new(clone_root)),
            SummarizationAgent::new(provider, 0.3, 8),
            None,
        );
        (store, runner)
    }

    #[tokio::test]
    async fn successful_run_completes_and_advances_the_checkpoint() {
        let remote = TempDir::new().unwrap();
        create_remote(remote.path());
        add_commit(remote.path(), "Add login page");
        let clones = TempDir::new().unwrap();

        let (store, runner) = runner(
            clones.path(),
            Box::new(OneShotProvider("Shipped the login page.".to_string())),
        );
        let id = store
            .create_job(&NewJob::new("update", remote.path().display().to_string()))
            .await
            .unwrap();

        let job = runner.run(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.summary_text.as_deref(), Some("Shipped the login page."));
        let checkpoint = job.checkpoint_hash.expect("checkpoint set on success");
        assert_eq!(checkpoint.len(), 40);
    }

    #[tokio::test]
    async fn failed_generation_marks_failed_and_preserves_prior_results() {
        let remote = TempDir::new().unwrap();
        create_remote(remote.path());
        let clones = TempDir::new().unwrap();
        let remote_url = remote.path().display().to_string();

        // First run succeeds and establishes a checkpoint.
        let (store, runner) = runner(
            clones.path(),
            Box::new(OneShotProvider("First summary.".to_string())),
        );
        let id = store
            .create_job(&NewJob::new("update", remote_url))
            .await
            .unwrap();
        runner.run(id).await.unwrap();
        let before = store.get_job(id).await.unwrap();

        // Second run hits a provider outage.
        let failing = JobRunner::new(
            store.clone(),
            Arc::new(RepositoryMirror::new(clones.path())),
            SummarizationAgent::new(Box::new(DownProvider), 0.3, 8),
            None,
        );
        let err = failing.run(id).await.unwrap_err();
        assert!(matches!(
            err,
            RecapError::Generation(GenerationError::ProviderUnavailable(_))
        ));

        let after = store.get_job(id).await.unwrap();
        assert_eq!(after.status, JobStatus::Failed);
        assert_eq!(after.summary_text, before.summary_text);
        assert_eq!(after.checkpoint_hash, before.checkpoint_hash);
    }

    #[tokio::test]
    async fn unknown_checkpoint_fails_the_run() {
        let remote = TempDir::new().unwrap();
        create_remote(remote.path());
        let clones = TempDir::new().unwrap();

        let (store, runner) = runner(
            clones.path(),
            Box::new(OneShotProvider("never reached".to_string())),
        );
        let id = store
            .create_job(&NewJob::new("update", remote.path().display().to_string()))
            .await
            .unwrap();

        // Simulate a checkpoint from elsewhere: succeed once, then point
        // the checkpoint at a hash the mirror has never seen.
        runner.run(id).await.unwrap();
        store.claim_for_generation(id).await.unwrap();
        store
            .complete_job(id, "stale", &"0".repeat(40))
            .await
            .unwrap();

        let err = runner.run(id).await.unwrap_err();
        assert!(matches!(
            err,
            RecapError::History(HistoryError::UnknownCheckpoint(_))
        ));
        let job = store.get_job(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.checkpoint_hash.as_deref(), Some(&*"0".repeat(40)));
    }

    #[tokio::test]
    async fn claimed_job_cannot_be_run_twice() {
        let remote = TempDir::new().unwrap();
        create_remote(remote.path());
        let clones = TempDir::new().unwrap();

        let (store, runner) = runner(
            clones.path(),
            Box::new(OneShotProvider("ok".to_string())),
        );
        let id = store
            .create_job(&NewJob::new("update", remote.path().display().to_string()))
            .await
            .unwrap();

        store.claim_for_generation(id).await.unwrap();
        let err = runner.run(id).await.unwrap_err();
        assert!(matches!(
            err,
            RecapError::Concurrency(ConcurrencyError::AlreadyGenerating(_))
        ));

        // The contested run must not have released the holder's lease.
        let job = store.get_job(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Generating);
    }

    #[tokio::test]
    async fn empty_window_still_produces_a_report() {
        let remote = TempDir::new().unwrap();
        create_remote(remote.path());
        let clones = TempDir::new().unwrap();
        let remote_url = remote.path().display().to_string();

        let (store, runner) = runner(
            clones.path(),
            Box::new(OneShotProvider("No changes since the last report.".to_string())),
        );
        let id = store
            .create_job(&NewJob::new("update", remote_url))
            .await
            .unwrap();

        // Two runs with no commits in between: checkpoint == head.
        let first = runner.run(id).await.unwrap();
        let second = runner.run(id).await.unwrap();
        assert_eq!(second.status, JobStatus::Completed);
        assert_eq!(second.checkpoint_hash, first.checkpoint_hash);
    }

    #[tokio::test]
    async fn mid_run_cancellation_marks_the_job_failed() {
        let remote = TempDir::new().unwrap();
        create_remote(remote.path());
        let clones = TempDir::new().unwrap();

        let reached_generation = Arc::new(tokio::sync::Notify::new());
        let (store, runner) = runner(
            clones.path(),
            Box::new(StallProvider(reached_generation.clone())),
        );
        let id = store
            .create_job(&NewJob::new("update", remote.path().display().to_string()))
            .await
            .unwrap();

        // Cancel only once the run holds the lease and sits in generation.
        let err = runner
            .run_until_cancelled(id, async { reached_generation.notified().await })
            .await
            .unwrap_err();
        assert!(matches!(err, RecapError::Cancelled(_)));

        let job = store.get_job(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed, "never stuck in generating");
        assert!(job.summary_text.is_none());
        assert!(job.checkpoint_hash.is_none());
    }

    #[tokio::test]
    async fn cancellation_releases_the_lease() {
        let remote = TempDir::new().unwrap();
        create_remote(remote.path());
        let clones = TempDir::new().unwrap();

        let (store, runner) = runner(
            clones.path(),
            Box::new(OneShotProvider("never reached".to_string())),
        );
        let id = store
            .create_job(&NewJob::new("update", remote.path().display().to_string()))
            .await
            .unwrap();

        let err = runner
            .run_until_cancelled(id, std::future::ready(()))
            .await
            .unwrap_err();
        assert!(matches!(err, RecapError::Cancelled(_)));
    }
}
