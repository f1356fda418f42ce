/// Current schema version.
pub const SCHEMA_VERSION: &str = "1";

/// Full SQL schema for the job store's `SQLite` database.
pub const SCHEMA_SQL: &str = r"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS recap_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Report jobs: one row per summarization request. `status` doubles as
-- the run lease; `checkpoint_hash` and `summary_text` move together on
-- the generating -> completed transition and at no other time.
CREATE TABLE IF NOT EXISTS report_jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    report_kind TEXT NOT NULL DEFAULT 'investor_update',
    repository_url TEXT NOT NULL,
    checkpoint_hash TEXT,
    summary_text TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL,
    completed_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_jobs_status ON report_jobs(status);
CREATE INDEX IF NOT EXISTS idx_jobs_created ON report_jobs(created_at);
";
