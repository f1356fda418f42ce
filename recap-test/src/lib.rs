// Integration test utilities and fixture management for Recap.

use std::path::Path;
use std::process::Command;
use std::sync::{Arc, Mutex};

use recap_core::agent::{AgentReply, ChatProvider, ToolSpec, Turn};
use recap_core::error::GenerationError;

/// A test fixture standing in for a remote repository: a real git repo
/// in a temporary directory, addressed by filesystem path.
#[derive(Debug)]
pub struct RemoteRepo {
    pub dir: tempfile::TempDir,
}

impl RemoteRepo {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// The fixture's URL as jobs reference it.
    pub fn url(&self) -> String {
        self.dir.path().display().to_string()
    }

    /// Create an empty repository on branch `main`.
    pub fn init() -> Self {
        let dir = tempfile::tempdir().expect("create tempdir");
        let root = dir.path();
        git(root, &["init", "--initial-branch=main"]);
        git(root, &["config", "user.email", "test@recap.dev"]);
        git(root, &["config", "user.name", "Test"]);
        Self { dir }
    }

    /// Create a repository with an initial commit.
    pub fn with_initial_commit() -> Self {
        let repo = Self::init();
        repo.add_commit("Initial commit");
        repo
    }

    /// Add one empty commit and return its hash.
    pub fn add_commit(&self, message: &str) -> String {
        git(self.path(), &["commit", "--allow-empty", "-m", message]);
        self.head()
    }

    /// The current head commit hash.
    pub fn head(&self) -> String {
        let output = Command::new("git")
            .args(["rev-parse", "HEAD"])
            .current_dir(self.path())
            .output()
            .expect("git must be runnable in tests");
        assert!(output.status.success(), "git rev-parse failed");
        String::from_utf8(output.stdout)
            .expect("git emits utf-8")
            .trim()
            .to_string()
    }
}

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "Test")
        .env("GIT_AUTHOR_EMAIL", "test@recap.dev")
        .env("GIT_COMMITTER_NAME", "Test")
        .env("GIT_COMMITTER_EMAIL", "test@recap.dev")
        .status()
        .expect("git must be runnable in tests");
    assert!(status.success(), "git {args:?} failed");
}

/// Provider that replays canned replies and records every request.
/// Clones share state, so a test can keep one and hand one to the agent.
#[derive(Debug, Clone, Default)]
pub struct ScriptedProvider {
    pub replies: Arc<Mutex<Vec<AgentReply>>>,
    pub seen_turns: Arc<Mutex<Vec<Vec<Turn>>>>,
}

impl ScriptedProvider {
    pub fn with_replies(replies: Vec<AgentReply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies)),
            seen_turns: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// All tool-result payloads the provider has been shown so far.
    pub fn tool_results(&self) -> Vec<String> {
        self.seen_turns
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .filter_map(|turn| match turn {
                Turn::ToolResult { content, .. } => Some(content.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl ChatProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model_id(&self) -> &str {
        "scripted-model"
    }

    async fn chat(
        &self,
        _instructions: &str,
        turns: &[Turn],
        _tools: &[ToolSpec],
        _temperature: f64,
    ) -> recap_core::error::Result<AgentReply> {
        self.seen_turns.lock().unwrap().push(turns.to_vec());
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            return Err(
                GenerationError::ProviderUnavailable("script exhausted".to_string()).into(),
            );
        }
        Ok(replies.remove(0))
    }
}

/// A reply consisting only of final text.
pub fn text_reply(text: &str) -> AgentReply {
    AgentReply {
        text: Some(text.to_string()),
        ..AgentReply::default()
    }
}

/// A reply requesting one `get_commits` call.
pub fn get_commits_reply(call_id: &str, since: Option<&str>) -> AgentReply {
    let arguments = match since {
        Some(hash) => serde_json::json!({ "since": hash }),
        None => serde_json::json!({}),
    };
    AgentReply {
        text: None,
        tool_calls: vec![recap_core::agent::ToolCall {
            id: call_id.to_string(),
            name: "get_commits".to_string(),
            arguments,
        }],
        ..AgentReply::default()
    }
}
