use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use gix::bstr::ByteSlice;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info};

use crate::error::{HistoryError, RecapError, SyncError};
use crate::job::Commit;

/// Refspec mirroring all remote branches into `refs/remotes/origin/*`.
const FETCH_REFSPEC: &str = "+refs/heads/*:refs/remotes/origin/*";

/// Extra fetch ref so the handshake listing includes `HEAD`; the ref
/// mapping is filtered by refspec prefixes, and the branch refspec alone
/// would drop the symref that names the remote's default branch.
const HEAD_REFSPEC: &str = "HEAD";

/// Owns local mirrors of remote repositories under one clone root.
///
/// The local path is a deterministic function of the remote URL, so
/// concurrent jobs against the same repository share one mirror instead
/// of re-cloning, and sync is idempotent. A per-path async mutex
/// serializes sync-then-read sequences: a [`MirrorHandle`] holds the
/// lock for its mirror until dropped, so history reads always observe a
/// fully-synced state.
#[derive(Debug)]
pub struct RepositoryMirror {
    clone_root: PathBuf,
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl RepositoryMirror {
    pub fn new(clone_root: impl Into<PathBuf>) -> Self {
        Self {
            clone_root: clone_root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Derive the mirror path for a remote URL: the last path segment,
    /// with a trailing `.git` stripped, under the clone root.
    pub fn local_path(&self, remote_url: &str) -> PathBuf {
        let trimmed = remote_url.trim_end_matches('/');
        let name = trimmed.rsplit('/').next().unwrap_or(trimmed);
        let name = name.strip_suffix(".git").unwrap_or(name);
        let name = if name.is_empty() { "repository" } else { name };
        self.clone_root.join(name)
    }

    /// Clone the repository if no mirror exists yet, otherwise fetch and
    /// fast-forward to the remote's default branch head.
    ///
    /// The credential, when present, is injected into the fetch URL for
    /// this sync only; the remote is assembled in memory and nothing
    /// credential-bearing is written to disk. On failure the prior local
    /// state is left intact (a failed first clone removes its partial
    /// directory), so sync is safely re-entrant.
    pub async fn ensure_up_to_date(
        &self,
        remote_url: &str,
        credential: Option<&str>,
    ) -> crate::error::Result<MirrorHandle> {
        let path = self.local_path(remote_url);
        let lock = self.lock_for(&path);
        let guard = lock.lock_owned().await;

        let fetch_url = authenticated_url(remote_url, credential);
        let sync_path = path.clone();
        // The guard rides through the blocking task: if this future is
        // dropped mid-sync, the orphaned task still finishes before the
        // lock is released, so nobody observes a half-fetched mirror.
        let (head, guard) = tokio::task::spawn_blocking(move || {
            sync_repository(&sync_path, &fetch_url).map(|head| (head, guard))
        })
        .await
        .map_err(|e| SyncError::Network(format!("sync task failed: {e}")))??;

        debug!(path = %path.display(), head = %head, "Mirror synced");
        Ok(MirrorHandle {
            path,
            head,
            _lock: guard,
        })
    }

    fn lock_for(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().expect("mirror lock registry poisoned");
        locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

/// A synced mirror, exclusive for the lifetime of the handle.
#[derive(Debug)]
pub struct MirrorHandle {
    path: PathBuf,
    head: String,
    _lock: OwnedMutexGuard<()>,
}

impl MirrorHandle {
    /// The remote head hash observed by the sync that produced this handle.
    pub fn current_head(&self) -> &str {
        &self.head
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// List the commits in `(checkpoint, head]`, newest-first; the full
    /// history from head backward when `checkpoint` is `None`.
    ///
    /// Fails with [`HistoryError::UnknownCheckpoint`] if the checkpoint is
    /// not an ancestor of the synced head.
    pub fn commits_since(&self, checkpoint: Option<&str>) -> crate::error::Result<Vec<Commit>> {
        let repo =
            gix::open(&self.path).map_err(|e| SyncError::CorruptRepo(e.to_string()))?;
        let head_id = gix::ObjectId::from_hex(self.head.as_bytes())
            .map_err(|e| SyncError::CorruptRepo(format!("bad head hash: {e}")))?;

        if checkpoint == Some(self.head.as_str()) {
            return Ok(Vec::new());
        }

        let head_commit = repo
            .find_commit(head_id)
            .map_err(|e| SyncError::CorruptRepo(e.to_string()))?;
        let walk = head_commit
            .ancestors()
            .all()
            .map_err(|e| SyncError::CorruptRepo(e.to_string()))?;

        let mut commits = Vec::new();
        let mut checkpoint_seen = checkpoint.is_none();
        for info in walk {
            let info = info.map_err(|e| SyncError::CorruptRepo(e.to_string()))?;
            let sha = info.id().to_string();
            if Some(sha.as_str()) == checkpoint {
                checkpoint_seen = true;
                break;
            }
            commits.push(read_commit(&repo, info.id, sha)?);
        }

        if !checkpoint_seen {
            let missing = checkpoint.unwrap_or_default().to_string();
            return Err(RecapError::History(HistoryError::UnknownCheckpoint(
                missing,
            )));
        }
        Ok(commits)
    }
}

fn read_commit(
    repo: &gix::Repository,
    id: gix::ObjectId,
    sha: String,
) -> crate::error::Result<Commit> {
    let commit = repo
        .find_commit(id)
        .map_err(|e| SyncError::CorruptRepo(e.to_string()))?;
    // The raw message carries a trailing newline; store it trimmed so
    // tool payloads and display output don't.
    let message = commit.message_raw_sloppy().to_string().trim_end().to_string();
    let author = commit
        .author()
        .map_err(|e| SyncError::CorruptRepo(format!("bad author encoding: {e}")))?;
    let time = author
        .time()
        .map_or_else(|_| Utc::now(), |t| gix_time_to_chrono(&t));
    Ok(Commit {
        hash: sha,
        message,
        author_name: author.name.to_string(),
        author_email: author.email.to_string(),
        time,
    })
}

/// Inject a credential into an HTTPS remote URL, the way the upstream
/// forge expects tokens (`https://{token}@host/...`). Used transiently
/// for a single fetch; never stored.
fn authenticated_url(remote_url: &str, credential: Option<&str>) -> String {
    match credential {
        Some(token) if remote_url.starts_with("https://") => {
            remote_url.replacen("https://", &format!("https://{token}@"), 1)
        }
        _ => remote_url.to_string(),
    }
}

/// Blocking sync: open or create the bare mirror, fetch from `url`, and
/// fast-forward local refs to the remote default branch. Returns the
/// remote head hash.
fn sync_repository(path: &Path, url: &str) -> Result<String, SyncError> {
    let fresh_clone = !path.exists();
    let repo = if fresh_clone {
        std::fs::create_dir_all(path).map_err(|e| SyncError::Network(e.to_string()))?;
        gix::init_bare(path).map_err(|e| SyncError::CorruptRepo(e.to_string()))?
    } else {
        gix::open(path).map_err(|e| SyncError::CorruptRepo(e.to_string()))?
    };

    match fetch_and_fast_forward(&repo, url) {
        Ok(head) => {
            if fresh_clone {
                info!(path = %path.display(), "Cloned new mirror");
            }
            Ok(head)
        }
        Err(e) => {
            // A failed first clone must not leave a partial mirror behind.
            if fresh_clone {
                let _ = std::fs::remove_dir_all(path);
            }
            Err(e)
        }
    }
}

fn fetch_and_fast_forward(repo: &gix::Repository, url: &str) -> Result<String, SyncError> {
    let remote = repo
        .remote_at(url)
        .map_err(|e| SyncError::Network(format!("invalid remote url: {e}")))?
        .with_refspecs([FETCH_REFSPEC, HEAD_REFSPEC], gix::remote::Direction::Fetch)
        .map_err(|e| SyncError::Network(format!("bad refspec: {e}")))?;

    let interrupt = AtomicBool::new(false);
    let outcome = remote
        .connect(gix::remote::Direction::Fetch)
        .map_err(classify_transport_error)?
        .prepare_fetch(gix::progress::Discard, Default::default())
        .map_err(classify_transport_error)?
        .receive(gix::progress::Discard, &interrupt)
        .map_err(classify_transport_error)?;

    let (branch, head_id) = remote_head(&outcome.ref_map.remote_refs)
        .ok_or_else(|| SyncError::CorruptRepo("remote has no commits".to_string()))?;

    // Fast-forward the local branch ref to what the remote reports as
    // its default branch head. Object data already arrived with the
    // fetch, so this is the last, atomic step of the sync.
    if let Some(branch) = branch {
        repo.reference(
            branch.as_str(),
            head_id,
            gix::refs::transaction::PreviousValue::Any,
            "recap: fast-forward to remote head",
        )
        .map_err(|e| SyncError::CorruptRepo(e.to_string()))?;
    }

    Ok(head_id.to_string())
}

/// Resolve the remote's default branch and head commit from the
/// handshake ref listing. Prefers the symbolic `HEAD` (which names the
/// default branch), then a direct `HEAD`; when the listing carries no
/// `HEAD` at all (some transports omit it), falls back to conventional
/// default branch names, then the first branch by name.
fn remote_head(
    remote_refs: &[gix::protocol::handshake::Ref],
) -> Option<(Option<String>, gix::ObjectId)> {
    use gix::protocol::handshake::Ref;

    let mut direct_head = None;
    let mut branches: Vec<(String, gix::ObjectId)> = Vec::new();
    for r in remote_refs {
        match r {
            Ref::Symbolic {
                full_ref_name,
                target,
                object,
                ..
            } if full_ref_name.as_slice() == b"HEAD" => {
                return Some((Some(target.to_str_lossy().into_owned()), *object));
            }
            Ref::Direct {
                full_ref_name,
                object,
            } => {
                if full_ref_name.as_slice() == b"HEAD" {
                    direct_head = Some((None, *object));
                } else if full_ref_name.as_slice().starts_with(b"refs/heads/") {
                    branches.push((full_ref_name.to_str_lossy().into_owned(), *object));
                }
            }
            _ => {}
        }
    }
    if direct_head.is_some() {
        return direct_head;
    }

    for name in ["refs/heads/main", "refs/heads/master"] {
        if let Some((branch, id)) = branches.iter().find(|(n, _)| n == name) {
            return Some((Some(branch.clone()), *id));
        }
    }
    branches
        .iter()
        .min_by(|a, b| a.0.cmp(&b.0))
        .map(|(branch, id)| (Some(branch.clone()), *id))
}

/// Split transport failures into auth vs. network by message, since the
/// underlying error chains don't carry a stable auth discriminant.
fn classify_transport_error(e: impl std::fmt::Display) -> SyncError {
    let msg = e.to_string();
    let lower = msg.to_lowercase();
    if lower.contains("401")
        || lower.contains("403")
        || lower.contains("auth")
        || lower.contains("credential")
        || lower.contains("permission denied")
    {
        SyncError::Auth(msg)
    } else {
        SyncError::Network(msg)
    }
}

fn gix_time_to_chrono(time: &gix::date::Time) -> DateTime<Utc> {
    Utc.timestamp_opt(time.seconds, 0)
        .single()
        .unwrap_or_else(Utc::now)
}
