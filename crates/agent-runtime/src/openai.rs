//! OpenAI-compatible Chat Completions
//!
//! One client for every backend that speaks the `/chat/completions` wire
//! format with native function calling (OpenAI itself, OpenRouter).

use std::time::{Duration, Instant};

use agent_core::{
    error::{AgentError, Result},
    message::{Message, Role},
    provider::{Completion, FinishReason, Model, ModelRequest, TokenUsage},
    tool::{ToolCall, ToolSchema},
};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::HttpBackendConfig;

/// Connection to one chat-completions endpoint, shared by its models
#[derive(Clone)]
pub struct ChatCompletionsBackend {
    provider: &'static str,
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    default_model: String,
}

impl ChatCompletionsBackend {
    /// Fails with `Config` when the API key is missing.
    pub fn new(
        provider: &'static str,
        config: &HttpBackendConfig,
        timeout: Duration,
    ) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            AgentError::Config(format!("{provider}: API key is not set"))
        })?;

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::Config(format!("{provider}: HTTP client: {e}")))?;

        Ok(Self {
            provider,
            http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_key,
            default_model: config.default_model.clone(),
        })
    }

    pub const fn provider(&self) -> &'static str {
        self.provider
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// A model bound to this backend
    pub fn model(&self, name: &str) -> ChatCompletionsModel {
        ChatCompletionsModel {
            backend: self.clone(),
            model: name.to_owned(),
        }
    }
}

impl std::fmt::Debug for ChatCompletionsBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsBackend")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .finish_non_exhaustive()
    }
}

/// A named model on a chat-completions backend
#[derive(Clone, Debug)]
pub struct ChatCompletionsModel {
    backend: ChatCompletionsBackend,
    model: String,
}

impl ChatCompletionsModel {
    fn request_body(&self, request: &ModelRequest) -> Value {
        let options = &request.options;
        let mut body = json!({
            "model": self.model,
            "messages": messages_to_openai(&request.messages),
            "temperature": options.temperature,
            "top_p": options.top_p,
            "max_tokens": options.max_tokens,
        });

        if !options.stop_sequences.is_empty() {
            body["stop"] = json!(options.stop_sequences);
        }
        if !request.tools.is_empty() {
            body["tools"] = tools_to_openai(&request.tools);
        }
        if let Some(format) = &request.response_format {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": { "name": format.name, "schema": format.schema },
            });
        }

        body
    }
}

#[async_trait]
impl Model for ChatCompletionsModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn respond(&self, request: &ModelRequest) -> Result<Completion> {
        let url = format!("{}/chat/completions", self.backend.base_url);
        let body = self.request_body(request);
        let started = Instant::now();

        tracing::debug!(
            provider = self.backend.provider,
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "sending chat completion"
        );

        let response = self
            .backend
            .http
            .post(&url)
            .bearer_auth(&self.backend.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(provider = self.backend.provider, %status, "chat completion failed");
            return Err(status_error(status, &text, &self.model));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Provider(format!("malformed response: {e}")))?;

        let completion = parse_response(parsed, &self.model)?;
        tracing::debug!(
            model = %completion.model,
            tool_calls = completion.tool_calls.len(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "chat completion received"
        );
        Ok(completion)
    }
}

/// Convert agent messages to the chat-completions format
pub fn messages_to_openai(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| match m.role {
            Role::Assistant if !m.tool_calls.is_empty() => json!({
                "role": "assistant",
                "content": if m.content.is_empty() { Value::Null } else { json!(m.content) },
                "tool_calls": m.tool_calls.iter().map(|call| json!({
                    "id": call.id,
                    "type": "function",
                    "function": {
                        "name": call.name,
                        "arguments": call.arguments.to_string(),
                    },
                })).collect::<Vec<_>>(),
            }),
            Role::Tool => json!({
                "role": "tool",
                "tool_call_id": m.tool_call_id.clone().unwrap_or_default(),
                "content": m.content,
            }),
            role => json!({ "role": role.to_string(), "content": m.content }),
        })
        .collect()
}

/// Convert tool schemas to function definitions
pub fn tools_to_openai(tools: &[ToolSchema]) -> Value {
    tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters,
                },
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ResponseToolCall>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    #[serde(default)]
    id: String,
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// Turn a decoded response into a completion.
///
/// Arguments that are not valid JSON are passed through as a string so the
/// registry's schema check reports them back to the model.
pub fn parse_response(response: ChatResponse, requested_model: &str) -> Result<Completion> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| AgentError::Provider("response has no choices".into()))?;

    let tool_calls = choice
        .message
        .tool_calls
        .into_iter()
        .map(|call| {
            let raw = call.function.arguments.trim();
            let arguments = if raw.is_empty() {
                json!({})
            } else {
                serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()))
            };
            ToolCall {
                id: call.id,
                name: call.function.name,
                arguments,
            }
        })
        .collect();

    Ok(Completion {
        content: choice.message.content.unwrap_or_default(),
        tool_calls,
        model: response.model.unwrap_or_else(|| requested_model.to_owned()),
        usage: response.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }),
        finish_reason: choice.finish_reason.as_deref().and_then(finish_reason),
    })
}

fn finish_reason(raw: &str) -> Option<FinishReason> {
    match raw {
        "stop" => Some(FinishReason::Stop),
        "length" => Some(FinishReason::Length),
        "tool_calls" | "function_call" => Some(FinishReason::ToolUse),
        "content_filter" => Some(FinishReason::ContentFilter),
        "error" => Some(FinishReason::Error),
        _ => None,
    }
}

/// Map a non-success HTTP status to an error
pub fn status_error(status: StatusCode, body: &str, model: &str) -> AgentError {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_owned))
        .unwrap_or_else(|| body.trim().to_owned());
    let message = format!("API returned {status}: {detail}");

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AgentError::Auth(message),
        StatusCode::NOT_FOUND => AgentError::ModelNotFound(model.to_owned()),
        StatusCode::TOO_MANY_REQUESTS => AgentError::RateLimited(message),
        s if s.is_server_error() => AgentError::ProviderUnavailable(message),
        _ => AgentError::Provider(message),
    }
}

fn transport_error(e: reqwest::Error) -> AgentError {
    if e.is_timeout() || e.is_connect() {
        AgentError::ProviderUnavailable(e.to_string())
    } else {
        AgentError::Provider(e.to_string())
    }
}
