use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{ConcurrencyError, NotFoundError, StoreError};
use crate::job::{JobId, JobStatus, NewJob, ReportJob};

use super::JobStore;
use super::schema;

/// SQLite-backed implementation of [`JobStore`].
#[derive(Debug)]
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl SqliteJobStore {
    /// Open (or create) a store at the given path.
    pub fn open(path: &Path) -> crate::error::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Migration(e.to_string()))?;
            }
        }
        let conn = Connection::open(path).map_err(StoreError::Sqlite)?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(path.to_path_buf()),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> crate::error::Result<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::Sqlite)?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn initialize(&self) -> crate::error::Result<()> {
        let conn = self.conn.lock().expect("job store mutex poisoned");

        conn.execute_batch(
            "PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(StoreError::Sqlite)?;

        // Try WAL mode — silently ignored for in-memory
        let _ = conn.execute_batch("PRAGMA journal_mode = WAL;");

        conn.execute_batch(schema::SCHEMA_SQL)
            .map_err(StoreError::Sqlite)?;

        conn.execute(
            "INSERT OR IGNORE INTO recap_meta (key, value) VALUES ('schema_version', ?1)",
            params![schema::SCHEMA_VERSION],
        )
        .map_err(StoreError::Sqlite)?;

        Ok(())
    }

    fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReportJob> {
        let status_str: String = row.get(6)?;
        let status: JobStatus = serde_json::from_str(&format!("\"{status_str}\"")).map_err(
            |e| rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, e.into()),
        )?;
        let created_at: String = row.get(7)?;
        let completed_at: Option<String> = row.get(8)?;
        Ok(ReportJob {
            id: JobId(row.get(0)?),
            title: row.get(1)?,
            report_kind: row.get(2)?,
            repository_url: row.get(3)?,
            checkpoint_hash: row.get(4)?,
            summary_text: row.get(5)?,
            status,
            created_at: parse_timestamp(&created_at),
            completed_at: completed_at.as_deref().map(parse_timestamp),
        })
    }

    fn get_job_sync(conn: &Connection, id: JobId) -> crate::error::Result<ReportJob> {
        conn.query_row(
            "SELECT id, title, report_kind, repository_url, checkpoint_hash,
                    summary_text, status, created_at, completed_at
             FROM report_jobs WHERE id = ?1",
            params![id.0],
            Self::row_to_job,
        )
        .optional()
        .map_err(StoreError::Sqlite)?
        .ok_or_else(|| NotFoundError::JobMissing(id).into())
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

const SELECT_JOBS: &str = "SELECT id, title, report_kind, repository_url, checkpoint_hash,
        summary_text, status, created_at, completed_at
 FROM report_jobs";

#[async_trait::async_trait]
impl JobStore for SqliteJobStore {
    async fn create_job(&self, new: &NewJob) -> crate::error::Result<JobId> {
        let conn = self.conn.lock().expect("job store mutex poisoned");
        conn.execute(
            "INSERT INTO report_jobs (title, report_kind, repository_url, status, created_at)
             VALUES (?1, ?2, ?3, 'pending', ?4)",
            params![
                new.title,
                new.report_kind,
                new.repository_url,
                Utc::now().to_rfc3339()
            ],
        )
        .map_err(StoreError::Sqlite)?;
        Ok(JobId(conn.last_insert_rowid()))
    }

    async fn get_job(&self, id: JobId) -> crate::error::Result<ReportJob> {
        let conn = self.conn.lock().expect("job store mutex poisoned");
        Self::get_job_sync(&conn, id)
    }

    async fn list_jobs(&self) -> crate::error::Result<Vec<ReportJob>> {
        let conn = self.conn.lock().expect("job store mutex poisoned");
        let mut stmt = conn
            .prepare(&format!("{SELECT_JOBS} ORDER BY created_at DESC, id DESC"))
            .map_err(StoreError::Sqlite)?;
        let jobs = stmt
            .query_map([], Self::row_to_job)
            .map_err(StoreError::Sqlite)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::Sqlite)?;
        Ok(jobs)
    }

    async fn list_jobs_by_status(
        &self,
        status: JobStatus,
    ) -> crate::error::Result<Vec<ReportJob>> {
        let conn = self.conn.lock().expect("job store mutex poisoned");
        let mut stmt = conn
            .prepare(&format!(
                "{SELECT_JOBS} WHERE status = ?1 ORDER BY created_at DESC, id DESC"
            ))
            .map_err(StoreError::Sqlite)?;
        let jobs = stmt
            .query_map(params![status.as_str()], Self::row_to_job)
            .map_err(StoreError::Sqlite)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::Sqlite)?;
        Ok(jobs)
    }

    async fn claim_for_generation(&self, id: JobId) -> crate::error::Result<ReportJob> {
        let conn = self.conn.lock().expect("job store mutex poisoned");
        // The conditional UPDATE is the lease: exactly one concurrent claim
        // can move the row out of a non-generating status.
        let claimed = conn
            .execute(
                "UPDATE report_jobs SET status = 'generating'
                 WHERE id = ?1 AND status != 'generating'",
                params![id.0],
            )
            .map_err(StoreError::Sqlite)?;
        if claimed == 0 {
            // Missing row and held lease both update zero rows; a read
            // distinguishes them.
            let job = Self::get_job_sync(&conn, id)?;
            debug_assert_eq!(job.status, JobStatus::Generating);
            return Err(ConcurrencyError::AlreadyGenerating(id).into());
        }
        Self::get_job_sync(&conn, id)
    }

    async fn complete_job(
        &self,
        id: JobId,
        summary_text: &str,
        checkpoint_hash: &str,
    ) -> crate::error::Result<()> {
        let conn = self.conn.lock().expect("job store mutex poisoned");
        let updated = conn
            .execute(
                "UPDATE report_jobs
                 SET status = 'completed', summary_text = ?2, checkpoint_hash = ?3,
                     completed_at = ?4
                 WHERE id = ?1 AND status = 'generating'",
                params![id.0, summary_text, checkpoint_hash, Utc::now().to_rfc3339()],
            )
            .map_err(StoreError::Sqlite)?;
        if updated == 0 {
            Self::get_job_sync(&conn, id)?;
            return Err(ConcurrencyError::NotGenerating(id).into());
        }
        Ok(())
    }

    async fn fail_job(&self, id: JobId) -> crate::error::Result<()> {
        let conn = self.conn.lock().expect("job store mutex poisoned");
        // Status only. Summary, checkpoint, and completed_at stay exactly
        // as the last successful run left them.
        let updated = conn
            .execute(
                "UPDATE report_jobs SET status = 'failed'
                 WHERE id = ?1 AND status = 'generating'",
                params![id.0],
            )
            .map_err(StoreError::Sqlite)?;
        if updated == 0 {
            Self::get_job_sync(&conn, id)?;
            return Err(ConcurrencyError::NotGenerating(id).into());
        }
        Ok(())
    }
}
