//! Error Types

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::guardrail::GuardrailResult;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// A run that was vetoed by an input guardrail.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GuardrailRejection {
    /// Name of the guardrail whose tripwire fired first
    pub guardrail: String,

    /// Diagnostic info produced by that guardrail
    pub output_info: serde_json::Value,

    /// Every verdict collected before the run was stopped
    pub results: Vec<GuardrailResult>,
}

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// Malformed agent, tool, guardrail or provider definition
    #[error("Configuration error: {0}")]
    Config(String),

    /// An input guardrail tripped
    #[error("Guardrail '{}' rejected the input", .0.guardrail)]
    GuardrailRejected(Box<GuardrailRejection>),

    /// Tool not found in the agent's catalog
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Tool arguments failed schema validation
    #[error("Tool validation error: {0}")]
    ToolValidation(String),

    /// Tool execution failed
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Backend returned an error that retrying will not fix
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Rate limited
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Backend does not know the requested model
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Final answer did not satisfy the agent's output schema
    #[error("Output validation error: {0}")]
    OutputValidation(String),

    /// Tool-call loop hit its bound
    #[error("Maximum turns ({0}) exceeded")]
    MaxTurnsExceeded(usize),

    /// Agent-as-tool nesting went deeper than allowed
    #[error("Maximum agent nesting depth ({0}) exceeded")]
    MaxDepthExceeded(usize),

    /// Run deadline elapsed
    #[error("Run timed out after {0:?}")]
    Timeout(Duration),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

/// Coarse error classes, used for logging and process exit codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    ConfigurationError,
    GuardrailRejected,
    ToolExecutionError,
    ModelBackendError,
    OutputValidationError,
    MaxTurnsExceeded,
    MaxDepthExceeded,
    Timeout,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ConfigurationError => "ConfigurationError",
            Self::GuardrailRejected => "GuardrailRejected",
            Self::ToolExecutionError => "ToolExecutionError",
            Self::ModelBackendError => "ModelBackendError",
            Self::OutputValidationError => "OutputValidationError",
            Self::MaxTurnsExceeded => "MaxTurnsExceeded",
            Self::MaxDepthExceeded => "MaxDepthExceeded",
            Self::Timeout => "Timeout",
            Self::Internal => "Internal",
        };
        f.write_str(name)
    }
}

impl AgentError {
    /// Build a guardrail rejection error
    pub fn guardrail_rejected(
        guardrail: impl Into<String>,
        output_info: serde_json::Value,
        results: Vec<GuardrailResult>,
    ) -> Self {
        Self::GuardrailRejected(Box::new(GuardrailRejection {
            guardrail: guardrail.into(),
            output_info,
            results,
        }))
    }

    /// Classify the error
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::ConfigurationError,
            Self::GuardrailRejected(_) => ErrorKind::GuardrailRejected,
            Self::ToolNotFound(_) | Self::ToolValidation(_) | Self::ToolExecution(_) => {
                ErrorKind::ToolExecutionError
            }
            Self::Provider(_)
            | Self::ProviderUnavailable(_)
            | Self::RateLimited(_)
            | Self::Auth(_)
            | Self::ModelNotFound(_) => ErrorKind::ModelBackendError,
            Self::OutputValidation(_) => ErrorKind::OutputValidationError,
            Self::MaxTurnsExceeded(_) => ErrorKind::MaxTurnsExceeded,
            Self::MaxDepthExceeded(_) => ErrorKind::MaxDepthExceeded,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Other(_) => ErrorKind::Internal,
        }
    }

    /// Check if error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ProviderUnavailable(_) | Self::RateLimited(_))
    }

    /// The rejection details, if a guardrail stopped the run
    pub fn rejection(&self) -> Option<&GuardrailRejection> {
        match self {
            Self::GuardrailRejected(rejection) => Some(rejection),
            _ => None,
        }
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(msg) => format!("The agent is misconfigured: {msg}"),
            Self::GuardrailRejected(_) => {
                "Your message could not be processed because it was flagged by a safety check."
                    .into()
            }
            Self::ToolNotFound(name) => format!("The tool '{name}' is not available."),
            Self::ToolValidation(msg) => format!("Invalid tool input: {msg}"),
            Self::ToolExecution(msg) => format!("Tool error: {msg}"),
            Self::Provider(msg) => format!("The AI service encountered an error: {msg}"),
            Self::ProviderUnavailable(_) => {
                "The AI service is currently unavailable. Please try again.".into()
            }
            Self::RateLimited(_) => "You've made too many requests. Please wait a moment.".into(),
            Self::Auth(_) => "Authentication failed. Please check your credentials.".into(),
            Self::ModelNotFound(model) => format!("The model '{model}' is not available."),
            Self::OutputValidation(_) => "The AI service returned a malformed answer.".into(),
            Self::MaxTurnsExceeded(_) | Self::MaxDepthExceeded(_) | Self::Timeout(_) => {
                "The request took too long to process. Please try a simpler query.".into()
            }
            Self::Other(_) => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
