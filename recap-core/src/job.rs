use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier for a [`ReportJob`], assigned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub i64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a report job.
///
/// `pending → generating → {completed, failed}`. The `generating` status
/// doubles as the run lease: at most one run may hold it per job. There
/// is no edge out of the terminal states back to `generating` — re-running
/// a completed or failed job re-enters through a fresh claim, which is
/// legal for every non-`generating` status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    Generating,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Generating => "generating",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether a new run may claim a job in this status.
    pub fn can_start(self) -> bool {
        !matches!(self, Self::Generating)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One summarization request — the durable single source of truth.
///
/// Mutated exclusively through the store's transition operations;
/// `checkpoint_hash` and `summary_text` change only together with a
/// successful `generating → completed` transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportJob {
    pub id: JobId,
    pub title: String,
    /// Opaque classification, not interpreted by the core.
    pub report_kind: String,
    pub repository_url: String,
    /// Commit the last successful summary covered; `None` means the next
    /// run summarizes full history.
    pub checkpoint_hash: Option<String>,
    pub summary_text: Option<String>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Fields supplied when creating a job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub title: String,
    pub report_kind: String,
    pub repository_url: String,
}

impl NewJob {
    pub fn new(title: impl Into<String>, repository_url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            report_kind: "investor_update".to_string(),
            repository_url: repository_url.into(),
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.report_kind = kind.into();
        self
    }
}

/// A commit summary as yielded by the mirror — newest-first within a range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub hash: String,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub time: DateTime<Utc>,
}
