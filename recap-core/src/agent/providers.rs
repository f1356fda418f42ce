// Tool-calling provider implementations: Anthropic and OpenAI-compatible
// HTTP endpoints.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{AgentSection, ProviderKind};
use crate::error::{ConfigError, GenerationError};

use super::{AgentReply, ChatProvider, TokenUsage, ToolCall, ToolSpec, Turn};

/// Build an HTTP client, making sure a process-level rustls crypto
/// provider is installed first — the reqwest build ships without one
/// and `Client::new` panics otherwise. Repeat installs are harmless.
fn http_client() -> Client {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    Client::new()
}

/// Map a non-success HTTP status onto the generation error taxonomy.
fn http_error(status: u16, body: String) -> GenerationError {
    if status == 429 {
        GenerationError::QuotaExceeded(format!("HTTP 429: {body}"))
    } else {
        GenerationError::ProviderUnavailable(format!("HTTP {status}: {body}"))
    }
}

// ── Anthropic Provider ──────────────────────────────────────────────

#[derive(Debug)]
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: http_client(),
            api_key,
            model,
            base_url: "https://api.anthropic.com".to_string(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f64,
    system: String,
    tools: Vec<AnthropicTool>,
    messages: Vec<AnthropicMessage>,
}

#[derive(Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct AnthropicMessage {
    role: String,
    content: Vec<AnthropicBlock>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
    usage: AnthropicUsage,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

/// Fold provider-agnostic turns into Anthropic's alternating-role message
/// shape. Consecutive tool results merge into one user message, as the
/// API requires.
fn anthropic_messages(turns: &[Turn]) -> Vec<AnthropicMessage> {
    let mut messages: Vec<AnthropicMessage> = Vec::new();
    for turn in turns {
        match turn {
            Turn::User(text) => messages.push(AnthropicMessage {
                role: "user".to_string(),
                content: vec![AnthropicBlock::Text { text: text.clone() }],
            }),
            Turn::Assistant { text, tool_calls } => {
                let mut content = Vec::new();
                if let Some(text) = text {
                    if !text.is_empty() {
                        content.push(AnthropicBlock::Text { text: text.clone() });
                    }
                }
                for call in tool_calls {
                    content.push(AnthropicBlock::ToolUse {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        input: call.arguments.clone(),
                    });
                }
                messages.push(AnthropicMessage {
                    role: "assistant".to_string(),
                    content,
                });
            }
            Turn::ToolResult { call_id, content } => {
                let block = AnthropicBlock::ToolResult {
                    tool_use_id: call_id.clone(),
                    content: content.clone(),
                };
                match messages.last_mut() {
                    Some(last)
                        if last.role == "user"
                            && matches!(
                                last.content.first(),
                                Some(AnthropicBlock::ToolResult { .. })
                            ) =>
                    {
                        last.content.push(block);
                    }
                    _ => messages.push(AnthropicMessage {
                        role: "user".to_string(),
                        content: vec![block],
                    }),
                }
            }
        }
    }
    messages
}

#[async_trait::async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl ChatProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        instructions: &str,
        turns: &[Turn],
        tools: &[ToolSpec],
        temperature: f64,
    ) -> crate::error::Result<AgentReply> {
        let url = format!("{}/v1/messages", self.base_url);

        let body = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: 1024,
            temperature,
            system: instructions.to_string(),
            tools: tools
                .iter()
                .map(|t| AnthropicTool {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    input_schema: t.parameters.clone(),
                })
                .collect(),
            messages: anthropic_messages(turns),
        };

        debug!(model = %self.model, "Calling Anthropic API");

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::ProviderUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(http_error(status, text).into());
        }

        let result: AnthropicResponse = resp
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        let mut reply = AgentReply {
            usage: TokenUsage {
                input_tokens: result.usage.input_tokens,
                output_tokens: result.usage.output_tokens,
            },
            ..AgentReply::default()
        };
        for block in result.content {
            match block {
                AnthropicBlock::Text { text } => {
                    reply.text = Some(match reply.text.take() {
                        Some(prior) => prior + &text,
                        None => text,
                    });
                }
                AnthropicBlock::ToolUse { id, name, input } => {
                    reply.tool_calls.push(ToolCall {
                        id,
                        name,
                        arguments: input,
                    });
                }
                AnthropicBlock::ToolResult { .. } => {
                    return Err(GenerationError::InvalidResponse(
                        "unexpected tool_result block in model output".to_string(),
                    )
                    .into());
                }
            }
        }
        Ok(reply)
    }
}

// ── OpenAI Provider ─────────────────────────────────────────────────

#[derive(Debug)]
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: http_client(),
            api_key,
            model,
            base_url: "https://api.openai.com".to_string(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }
}

#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    max_tokens: u32,
    temperature: f64,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OpenAiTool>,
}

#[derive(Serialize)]
struct OpenAiTool {
    #[serde(rename = "type")]
    kind: String,
    function: OpenAiFunctionSpec,
}

#[derive(Serialize)]
struct OpenAiFunctionSpec {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct OpenAiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct OpenAiToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: OpenAiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct OpenAiFunctionCall {
    name: String,
    /// JSON-encoded arguments, as the chat completions API ships them.
    arguments: String,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    usage: OpenAiUsage,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Deserialize)]
struct OpenAiChoiceMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

fn openai_messages(instructions: &str, turns: &[Turn]) -> Vec<OpenAiMessage> {
    let mut messages = vec![OpenAiMessage {
        role: "system".to_string(),
        content: Some(instructions.to_string()),
        tool_calls: None,
        tool_call_id: None,
    }];
    for turn in turns {
        match turn {
            Turn::User(text) => messages.push(OpenAiMessage {
                role: "user".to_string(),
                content: Some(text.clone()),
                tool_calls: None,
                tool_call_id: None,
            }),
            Turn::Assistant { text, tool_calls } => messages.push(OpenAiMessage {
                role: "assistant".to_string(),
                content: text.clone(),
                tool_calls: (!tool_calls.is_empty()).then(|| {
                    tool_calls
                        .iter()
                        .map(|call| OpenAiToolCall {
                            id: call.id.clone(),
                            kind: "function".to_string(),
                            function: OpenAiFunctionCall {
                                name: call.name.clone(),
                                arguments: call.arguments.to_string(),
                            },
                        })
                        .collect()
                }),
                tool_call_id: None,
            }),
            Turn::ToolResult { call_id, content } => messages.push(OpenAiMessage {
                role: "tool".to_string(),
                content: Some(content.clone()),
                tool_calls: None,
                tool_call_id: Some(call_id.clone()),
            }),
        }
    }
    messages
}

#[async_trait::async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl ChatProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        instructions: &str,
        turns: &[Turn],
        tools: &[ToolSpec],
        temperature: f64,
    ) -> crate::error::Result<AgentReply> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let body = OpenAiRequest {
            model: self.model.clone(),
            max_tokens: 1024,
            temperature,
            messages: openai_messages(instructions, turns),
            tools: tools
                .iter()
                .map(|t| OpenAiTool {
                    kind: "function".to_string(),
                    function: OpenAiFunctionSpec {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.parameters.clone(),
                    },
                })
                .collect(),
        };

        debug!(model = %self.model, "Calling OpenAI API");

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::ProviderUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(http_error(status, text).into());
        }

        let result: OpenAiResponse = resp
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        let message = result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| {
                GenerationError::InvalidResponse("response contained no choices".to_string())
            })?;

        let mut tool_calls = Vec::new();
        for call in message.tool_calls.unwrap_or_default() {
            let arguments = serde_json::from_str(&call.function.arguments).map_err(|e| {
                GenerationError::InvalidResponse(format!("undecodable tool arguments: {e}"))
            })?;
            tool_calls.push(ToolCall {
                id: call.id,
                name: call.function.name,
                arguments,
            });
        }

        Ok(AgentReply {
            text: message.content,
            tool_calls,
            usage: TokenUsage {
                input_tokens: result.usage.prompt_tokens,
                output_tokens: result.usage.completion_tokens,
            },
        })
    }
}

// ── Provider Factory ────────────────────────────────────────────────

/// Create a chat provider from agent configuration.
pub fn create_provider(
    agent: &AgentSection,
    api_key: &str,
) -> Result<Box<dyn ChatProvider>, ConfigError> {
    match agent.provider {
        ProviderKind::Anthropic => {
            let mut p = AnthropicProvider::new(api_key.to_string(), agent.model.clone());
            if let Some(url) = &agent.base_url {
                p = p.with_base_url(url.clone());
            }
            Ok(Box::new(p))
        }
        ProviderKind::OpenAi => {
            let mut p = OpenAiProvider::new(api_key.to_string(), agent.model.clone());
            if let Some(url) = &agent.base_url {
                p = p.with_base_url(url.clone());
            }
            Ok(Box::new(p))
        }
        ProviderKind::Custom => {
            let url = agent.base_url.clone().ok_or_else(|| {
                ConfigError::Invalid("custom provider requires agent.base_url".to_string())
            })?;
            Ok(Box::new(
                OpenAiProvider::new(api_key.to_string(), agent.model.clone()).with_base_url(url),
            ))
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_taxonomy() {
        assert!(matches!(
            http_error(429, "slow down".into()),
            GenerationError::QuotaExceeded(_)
        ));
        assert!(matches!(
            http_error(500, "oops".into()),
            GenerationError::ProviderUnavailable(_)
        ));
        assert!(matches!(
            http_error(401, "bad key".into()),
            GenerationError::ProviderUnavailable(_)
        ));
    }

    #[test]
    fn anthropic_merges_consecutive_tool_results() {
        let turns = vec![
            Turn::User("summarize".to_string()),
            Turn::Assistant {
                text: None,
                tool_calls: vec![
                    ToolCall {
                        id: "a".to_string(),
                        name: "get_commits".to_string(),
                        arguments: serde_json::json!({}),
                    },
                    ToolCall {
                        id: "b".to_string(),
                        name: "get_commits".to_string(),
                        arguments: serde_json::json!({"since": "abc"}),
                    },
                ],
            },
            Turn::ToolResult {
                call_id: "a".to_string(),
                content: "[]".to_string(),
            },
            Turn::ToolResult {
                call_id: "b".to_string(),
                content: "[\"fix\"]".to_string(),
            },
        ];

        let messages = anthropic_messages(&turns);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].role, "assistant");
        assert_eq!(messages[2].role, "user");
        assert_eq!(messages[2].content.len(), 2, "tool results share one turn");
    }

    #[test]
    fn openai_turn_mapping() {
        let turns = vec![
            Turn::User("summarize".to_string()),
            Turn::Assistant {
                text: None,
                tool_calls: vec![ToolCall {
                    id: "call_1".to_string(),
                    name: "get_commits".to_string(),
                    arguments: serde_json::json!({"since": "abc"}),
                }],
            },
            Turn::ToolResult {
                call_id: "call_1".to_string(),
                content: "[\"fix\"]".to_string(),
            },
        ];

        let messages = openai_messages("be brief", &turns);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[2].role, "assistant");
        let calls = messages[2].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.name, "get_commits");
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&calls[0].function.arguments).unwrap(),
            serde_json::json!({"since": "abc"})
        );
        assert_eq!(messages[3].role, "tool");
        assert_eq!(messages[3].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn create_provider_factory() {
        let mut agent = AgentSection::default();
        let p = create_provider(&agent, "key").unwrap();
        assert_eq!(p.name(), "openai");
        assert_eq!(p.model_id(), "gpt-4o");

        agent.provider = ProviderKind::Anthropic;
        agent.model = "claude-sonnet-4-20250514".to_string();
        let p = create_provider(&agent, "key").unwrap();
        assert_eq!(p.name(), "anthropic");

        agent.provider = ProviderKind::Custom;
        agent.base_url = None;
        assert!(create_provider(&agent, "key").is_err());

        agent.base_url = Some("http://localhost:8080".to_string());
        assert!(create_provider(&agent, "key").is_ok());
    }
}
