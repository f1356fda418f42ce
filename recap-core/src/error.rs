use crate::job::JobId;

/// Top-level Recap error type.
///
/// All fallible operations in `recap-core` return [`Result<T, RecapError>`](Result).
/// Each variant wraps a domain-specific error enum, allowing callers to
/// match on the error source without losing type information.
#[derive(thiserror::Error, Debug)]
pub enum RecapError {
    /// Error synchronizing the local repository mirror with its remote.
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// Error resolving a commit range against the mirror's history.
    #[error("History error: {0}")]
    History(#[from] HistoryError),

    /// Error from the summarization backend (LLM provider).
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    /// A job run was started against a job in an incompatible state.
    #[error("Concurrency error: {0}")]
    Concurrency(#[from] ConcurrencyError),

    /// A referenced entity does not exist.
    #[error("Not found: {0}")]
    NotFound(#[from] NotFoundError),

    /// Error from the job store layer (`SQLite` operations, migrations).
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Error in configuration parsing or validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A run was cancelled cooperatively before completing.
    #[error("Run cancelled for job {0}")]
    Cancelled(JobId),
}

/// Errors while cloning, fetching, or opening a repository mirror.
///
/// A sync failure is recoverable: prior local mirror state stays intact.
#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    /// Network-level failure reaching the remote (connect, transfer).
    #[error("Network error: {0}")]
    Network(String),

    /// The remote rejected the supplied credentials.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The local mirror is unreadable or its object database is damaged.
    #[error("Corrupt repository: {0}")]
    CorruptRepo(String),
}

/// Errors while resolving a checkpoint against mirror history.
#[derive(thiserror::Error, Debug)]
pub enum HistoryError {
    /// The checkpoint commit is not an ancestor of the mirror's head,
    /// e.g. because upstream history was rewritten. Surfaced rather than
    /// treated as "full history" — a silent reset would duplicate
    /// previously summarized content.
    #[error("Unknown checkpoint: {0} is not in the mirror's history")]
    UnknownCheckpoint(String),
}

/// Errors from the text-generation backend.
#[derive(thiserror::Error, Debug)]
pub enum GenerationError {
    /// The provider could not be reached or returned a server error.
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The provider rejected the request for quota/rate-limit reasons.
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The provider's response could not be used (undecodable body,
    /// empty final answer, or a runaway tool-call loop).
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Job lease violations.
#[derive(thiserror::Error, Debug)]
pub enum ConcurrencyError {
    /// The job is already claimed by an in-flight run; starting a second
    /// concurrent run is a hard precondition failure, not a queue-and-wait.
    #[error("job {0} is already generating")]
    AlreadyGenerating(JobId),

    /// A completion/failure transition was attempted on a job that is not
    /// in the `generating` state (the lease was lost or never held).
    #[error("job {0} is not in the generating state")]
    NotGenerating(JobId),
}

/// Missing-entity errors, short-circuited before any state transition.
#[derive(thiserror::Error, Debug)]
pub enum NotFoundError {
    /// No report job exists with the given id.
    #[error("no report job with id {0}")]
    JobMissing(JobId),
}

/// Errors from the SQLite-backed job store.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Underlying `SQLite` operation failed.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Schema migration failed (version mismatch or DDL error).
    #[error("Migration failed: {0}")]
    Migration(String),

    /// JSON serialization/deserialization of a stored field failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors in Recap configuration parsing and validation.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configuration file does not exist at the expected path.
    #[error("Config file not found: {0}")]
    NotFound(String),

    /// Configuration values are present but semantically invalid.
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// Configuration file syntax could not be parsed (TOML error).
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Convenience alias for `Result<T, RecapError>`.
pub type Result<T> = std::result::Result<T, RecapError>;
