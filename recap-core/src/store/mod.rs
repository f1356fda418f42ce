pub mod schema;
pub mod sqlite;

pub use sqlite::SqliteJobStore;

use crate::job::{JobId, JobStatus, NewJob, ReportJob};

/// The durable job record. All job lifecycle transitions go through this
/// trait; callers never mutate a [`ReportJob`] directly.
#[async_trait::async_trait]
pub trait JobStore: Send + Sync {
    /// Create a new job in `pending` status. Returns the assigned ID.
    async fn create_job(&self, new: &NewJob) -> crate::error::Result<JobId>;

    /// Get a job by ID. Fails with `NotFoundError::JobMissing` when absent.
    async fn get_job(&self, id: JobId) -> crate::error::Result<ReportJob>;

    /// All jobs, newest-created first.
    async fn list_jobs(&self) -> crate::error::Result<Vec<ReportJob>>;

    /// Jobs currently in the given status, newest-created first.
    async fn list_jobs_by_status(
        &self,
        status: JobStatus,
    ) -> crate::error::Result<Vec<ReportJob>>;

    /// Atomically claim a job for a run: `* → generating` for any
    /// non-`generating` status. Fails with `ConcurrencyError::AlreadyGenerating`
    /// when another run holds the lease, `NotFoundError::JobMissing` when the
    /// job does not exist. Returns the job as it was at claim time, so the
    /// caller sees the pre-run checkpoint.
    async fn claim_for_generation(&self, id: JobId) -> crate::error::Result<ReportJob>;

    /// `generating → completed`: record the summary and advance the
    /// checkpoint in one write. Fails with `ConcurrencyError::NotGenerating`
    /// when the job does not hold the lease.
    async fn complete_job(
        &self,
        id: JobId,
        summary_text: &str,
        checkpoint_hash: &str,
    ) -> crate::error::Result<()>;

    /// `generating → failed`: release the lease, touching nothing else.
    /// The prior `summary_text` and `checkpoint_hash` stay byte-identical.
    async fn fail_job(&self, id: JobId) -> crate::error::Result<()>;
}
