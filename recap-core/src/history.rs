use crate::job::Commit;
use crate::mirror::MirrorHandle;

/// The commit-listing capability handed to the summarization agent as
/// its tool. Implementations only read; they never mutate the mirror.
pub trait CommitLister: Send + Sync {
    /// Commit messages since `since` (exclusive), newest-first; the full
    /// history when `since` is `None`.
    fn list_messages(&self, since: Option<&str>) -> crate::error::Result<Vec<String>>;
}

/// Read-only adapter turning a synced [`MirrorHandle`] into the commit
/// sequence the agent consumes. No failure modes of its own — it only
/// propagates the mirror's.
#[derive(Debug)]
pub struct CommitHistoryExtractor<'a> {
    handle: &'a MirrorHandle,
}

impl<'a> CommitHistoryExtractor<'a> {
    pub fn new(handle: &'a MirrorHandle) -> Self {
        Self { handle }
    }

    /// Full commit records in `(since, head]`, newest-first.
    pub fn commits_since(&self, since: Option<&str>) -> crate::error::Result<Vec<Commit>> {
        self.handle.commits_since(since)
    }
}

impl CommitLister for CommitHistoryExtractor<'_> {
    fn list_messages(&self, since: Option<&str>) -> crate::error::Result<Vec<String>> {
        Ok(self
            .commits_since(since)?
            .into_iter()
            .map(|c| c.message)
            .collect())
    }
}
