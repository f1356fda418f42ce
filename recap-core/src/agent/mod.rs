pub mod providers;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::GenerationError;
use crate::history::CommitLister;

/// Token usage from one provider call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// A tool the provider may invoke mid-generation. `parameters` is a JSON
/// schema in the shape both supported APIs accept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// One turn of the agent conversation, provider-agnostic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Turn {
    User(String),
    Assistant {
        text: Option<String>,
        tool_calls: Vec<ToolCall>,
    },
    ToolResult {
        call_id: String,
        content: String,
    },
}

/// What the provider produced for one request: final text, tool calls,
/// or both (some models emit preamble text alongside a call).
#[derive(Debug, Clone, Default)]
pub struct AgentReply {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: TokenUsage,
}

/// Common interface for tool-calling text-generation providers.
///
/// The contract is "given instructions and an available tool, return
/// text or fail" — provider selection is a configuration concern
/// (see [`providers::create_provider`]).
#[async_trait::async_trait]
pub trait ChatProvider: Send + Sync + std::fmt::Debug {
    /// Human-readable provider name.
    fn name(&self) -> &str;

    /// The model ID being used.
    fn model_id(&self) -> &str;

    /// One request against the conversation so far.
    async fn chat(
        &self,
        instructions: &str,
        turns: &[Turn],
        tools: &[ToolSpec],
        temperature: f64,
    ) -> crate::error::Result<AgentReply>;
}

const INSTRUCTIONS: &str = "You summarize recent Git commits into concise progress notes. \
     When needed, call the get_commits tool to retrieve commit messages.";

const GET_COMMITS_TOOL: &str = "get_commits";

/// Tool-calling summarization loop over a single `get_commits` tool.
///
/// The agent decides when and whether to call the tool; the loop only
/// enforces an upper bound on round trips so a run always terminates.
/// Tool output comes straight from the [`CommitLister`] and is the
/// authoritative commit record. No retries happen here — retry policy
/// belongs to the caller.
#[derive(Debug)]
pub struct SummarizationAgent {
    provider: Box<dyn ChatProvider>,
    temperature: f64,
    max_tool_turns: u32,
}

impl SummarizationAgent {
    pub fn new(provider: Box<dyn ChatProvider>, temperature: f64, max_tool_turns: u32) -> Self {
        Self {
            provider,
            temperature,
            max_tool_turns,
        }
    }

    /// Produce a progress summary, optionally anchored to a checkpoint.
    pub async fn summarize(
        &self,
        commits: &dyn CommitLister,
        checkpoint: Option<&str>,
    ) -> crate::error::Result<String> {
        let mut prompt = String::from(
            "Please provide a summary of the git commits. \
             If a commit hash is provided, summarize the commits since that hash.",
        );
        if let Some(hash) = checkpoint {
            prompt.push_str(&format!(" The last commit hash is {hash}."));
        }

        let tools = [ToolSpec {
            name: GET_COMMITS_TOOL.to_string(),
            description: "Return commit messages since a given commit hash (or all commits)."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "since": {
                        "type": "string",
                        "description": "Optional commit hash to filter the log."
                    }
                },
                "required": []
            }),
        }];

        let mut turns = vec![Turn::User(prompt)];
        for round in 0..self.max_tool_turns {
            let reply = self
                .provider
                .chat(INSTRUCTIONS, &turns, &tools, self.temperature)
                .await?;

            if reply.tool_calls.is_empty() {
                return reply.text.filter(|t| !t.trim().is_empty()).ok_or_else(|| {
                    GenerationError::InvalidResponse("model returned an empty summary".to_string())
                        .into()
                });
            }

            debug!(
                round,
                calls = reply.tool_calls.len(),
                provider = self.provider.name(),
                "Agent requested tool calls"
            );
            let calls = reply.tool_calls.clone();
            turns.push(Turn::Assistant {
                text: reply.text,
                tool_calls: reply.tool_calls,
            });
            for call in calls {
                let content = self.execute_tool(&call, commits)?;
                turns.push(Turn::ToolResult {
                    call_id: call.id,
                    content,
                });
            }
        }

        Err(GenerationError::InvalidResponse(format!(
            "tool-call turn limit ({}) exceeded without a final answer",
            self.max_tool_turns
        ))
        .into())
    }

    fn execute_tool(
        &self,
        call: &ToolCall,
        commits: &dyn CommitLister,
    ) -> crate::error::Result<String> {
        if call.name != GET_COMMITS_TOOL {
            return Err(GenerationError::InvalidResponse(format!(
                "model called unknown tool `{}`",
                call.name
            ))
            .into());
        }
        let since = call
            .arguments
            .get("since")
            .and_then(serde_json::Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_owned);
        let messages = commits.list_messages(since.as_deref())?;
        serde_json::to_string(&messages)
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecapError;
    use std::sync::{Arc, Mutex};

    /// Provider that replays canned replies and records what it was sent.
    /// Clones share state, so a test can keep one and hand one to the agent.
    #[derive(Debug, Clone, Default)]
    struct ScriptedProvider {
        replies: Arc<Mutex<Vec<AgentReply>>>,
        seen_turns: Arc<Mutex<Vec<Vec<Turn>>>>,
    }

    impl ScriptedProvider {
        fn with_replies(replies: Vec<AgentReply>) -> Self {
            Self {
                replies: Arc::new(Mutex::new(replies)),
                seen_turns: Arc::new(Mutex::new(Vec::new())),
            }
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
        ) -> crate::error::Result<AgentReply> {
            self.seen_turns.lock().unwrap().push(turns.to_vec());
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                return Err(GenerationError::ProviderUnavailable(
                    "script exhausted".to_string(),
                )
                .into());
            }
            Ok(replies.remove(0))
        }
    }

    #[derive(Debug)]
    struct FixedCommits(Vec<String>);

    impl CommitLister for FixedCommits {
        fn list_messages(&self, _since: Option<&str>) -> crate::error::Result<Vec<String>> {
            Ok(self.0.clone())
        }
    }

    fn tool_call_reply() -> AgentReply {
        AgentReply {
            text: None,
            tool_calls: vec![ToolCall {
                id: "call_1".to_string(),
                name: GET_COMMITS_TOOL.to_string(),
                arguments: serde_json::json!({}),
            }],
            usage: TokenUsage::default(),
        }
    }

    fn text_reply(text: &str) -> AgentReply {
        AgentReply {
            text: Some(text.to_string()),
            tool_calls: Vec::new(),
            usage: TokenUsage::default(),
        }
    }

    #[tokio::test]
    async fn direct_answer_without_tool_calls() {
        let provider = ScriptedProvider::with_replies(vec![text_reply("Nothing new to report.")]);
        let agent = SummarizationAgent::new(Box::new(provider), 0.3, 8);
        let commits = FixedCommits(vec![]);

        let summary = agent.summarize(&commits, None).await.unwrap();
        assert_eq!(summary, "Nothing new to report.");
    }

    #[tokio::test]
    async fn tool_result_reaches_the_next_request() {
        let provider = ScriptedProvider::with_replies(vec![
            tool_call_reply(),
            text_reply("Shipped feature b and fixed a bug."),
        ]);
        let agent = SummarizationAgent::new(Box::new(provider), 0.3, 8);
        let commits = FixedCommits(vec!["Add feature b".to_string(), "Fix bug".to_string()]);

        let summary = agent.summarize(&commits, None).await.unwrap();
        assert_eq!(summary, "Shipped feature b and fixed a bug.");
    }

    #[tokio::test]
    async fn checkpoint_is_included_in_the_prompt() {
        let provider = ScriptedProvider::with_replies(vec![text_reply("ok")]);
        let agent = SummarizationAgent::new(Box::new(provider.clone()), 0.3, 8);
        let commits = FixedCommits(vec![]);

        agent.summarize(&commits, Some("abc123")).await.unwrap();
        let seen = provider.seen_turns.lock().unwrap();
        let Turn::User(prompt) = &seen[0][0] else {
            panic!("first turn should be the user prompt");
        };
        assert!(prompt.contains("abc123"));
    }

    #[tokio::test]
    async fn turn_limit_terminates_a_runaway_loop() {
        let provider = ScriptedProvider::with_replies(vec![
            tool_call_reply(),
            tool_call_reply(),
            tool_call_reply(),
        ]);
        let agent = SummarizationAgent::new(Box::new(provider), 0.3, 2);
        let commits = FixedCommits(vec!["Add feature".to_string()]);

        let result = agent.summarize(&commits, None).await;
        assert!(matches!(
            result,
            Err(RecapError::Generation(GenerationError::InvalidResponse(_)))
        ));
    }

    #[tokio::test]
    async fn empty_final_text_is_invalid() {
        let provider = ScriptedProvider::with_replies(vec![text_reply("   ")]);
        let agent = SummarizationAgent::new(Box::new(provider), 0.3, 8);
        let commits = FixedCommits(vec![]);

        let result = agent.summarize(&commits, None).await;
        assert!(matches!(
            result,
            Err(RecapError::Generation(GenerationError::InvalidResponse(_)))
        ));
    }

    #[tokio::test]
    async fn unknown_tool_name_is_invalid() {
        let provider = ScriptedProvider::with_replies(vec![AgentReply {
            text: None,
            tool_calls: vec![ToolCall {
                id: "call_1".to_string(),
                name: "delete_everything".to_string(),
                arguments: serde_json::json!({}),
            }],
            usage: TokenUsage::default(),
        }]);
        let agent = SummarizationAgent::new(Box::new(provider), 0.3, 8);
        let commits = FixedCommits(vec![]);

        let result = agent.summarize(&commits, None).await;
        assert!(matches!(
            result,
            Err(RecapError::Generation(GenerationError::InvalidResponse(_)))
        ));
    }
}
