//! Model Provider Strategy Pattern
//!
//! Defines the contract every model backend (OpenAI, OpenRouter, Ollama, etc.)
//! implements so the runner can drive any of them without code changes.
//!
//! A [`ModelProvider`] is a stateless selector resolved once per deployment;
//! it hands out [`Model`]s, each of which performs one chat turn.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_core::provider::{ModelProvider, ModelRequest};
//!
//! let model = provider.get_model(None)?;
//! let completion = model.respond(&request).await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::Message;
use crate::tool::{ToolCall, ToolSchema};

/// Sampling parameters for a model turn
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Top-p nucleus sampling
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Stop sequences
    #[serde(default)]
    pub stop_sequences: Vec<String>,
}

const fn default_temperature() -> f32 {
    0.7
}

const fn default_max_tokens() -> u32 {
    2048
}

const fn default_top_p() -> f32 {
    0.9
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
            stop_sequences: Vec::new(),
        }
    }
}

/// JSON schema the final answer must satisfy
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResponseFormat {
    /// Schema name (sent to backends that support named schemas)
    pub name: String,

    /// The JSON schema itself
    pub schema: serde_json::Value,
}

/// One chat turn's worth of input
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelRequest {
    /// Full message history, system prompt first
    pub messages: Vec<Message>,

    /// Tools the model may call this turn
    #[serde(default)]
    pub tools: Vec<ToolSchema>,

    /// Sampling parameters
    #[serde(default)]
    pub options: GenerationOptions,

    /// Structured-output contract, if the agent declares one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

impl ModelRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
            options: GenerationOptions::default(),
            response_format: None,
        }
    }

    /// The system prompt, if the history starts with one
    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .first()
            .filter(|m| m.role == crate::message::Role::System)
            .map(|m| m.content.as_str())
    }
}

/// Response from a model turn
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Completion {
    /// The generated text (may be empty when only tool calls are returned)
    pub content: String,

    /// Tool calls requested by the model, in the order it listed them
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,

    /// Model that generated this response
    pub model: String,

    /// Token usage statistics (if available)
    pub usage: Option<TokenUsage>,

    /// Finish reason
    pub finish_reason: Option<FinishReason>,
}

impl Completion {
    /// A final text answer
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            finish_reason: Some(FinishReason::Stop),
            ..Self::default()
        }
    }

    /// A turn that only requests tool calls
    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: calls,
            finish_reason: Some(FinishReason::ToolUse),
            ..Self::default()
        }
    }

    /// Whether the model asked for tools instead of answering
    pub fn requests_tools(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Token usage statistics
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(rhs.prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(rhs.completion_tokens);
        self.total_tokens = self.total_tokens.saturating_add(rhs.total_tokens);
    }
}

/// Reason for completion finishing
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolUse,
    ContentFilter,
    Error,
}

/// A concrete model that performs one chat turn.
///
/// Implementations are interchangeable; the runner relies on nothing
/// beyond this contract.
#[async_trait]
pub trait Model: Send + Sync {
    /// Model identifier sent to the backend
    fn name(&self) -> &str;

    /// Perform one turn: either a final answer or a list of tool calls
    async fn respond(&self, request: &ModelRequest) -> Result<Completion>;
}

/// Strategy trait for model providers
///
/// Implement this trait to add support for new backends. Providers read
/// their credentials once at construction and must be safe to share
/// across concurrent runs.
pub trait ModelProvider: Send + Sync {
    /// Provider name (e.g., "openai", "openrouter")
    fn name(&self) -> &str;

    /// Resolve a model. A missing or blank hint selects the provider's
    /// default model; it is never an error.
    fn get_model(&self, name_hint: Option<&str>) -> Result<Arc<dyn Model>>;
}

/// Normalize a model-name hint: `None` for missing or blank values.
pub fn model_hint(name_hint: Option<&str>) -> Option<&str> {
    name_hint.map(str::trim).filter(|s| !s.is_empty())
}
