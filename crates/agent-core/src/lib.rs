//! # agent-core
//!
//! Agent orchestration with a provider-agnostic model abstraction, typed
//! tools, input guardrails and agent-as-tool delegation.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Runner                              │
//! │  ┌─────────────┐  ┌─────────────┐  ┌──────────────────────┐  │
//! │  │ Guardrails  │  │    Tools    │  │   ModelProvider      │  │
//! │  │ (gate)      │──│   Registry  │──│   (Strategy)         │  │
//! │  └─────────────┘  └─────────────┘  └──────────────────────┘  │
//! │         ▲                │ AgentTool                          │
//! │         └── run_nested ◄─┘                                    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! An [`Agent`] is immutable configuration. The [`Runner`] drives it through
//! guardrails, model turns and tool calls, threading one shared context value
//! of type `C` through every tool and nested agent.
//!
//! The [`ModelProvider`] trait enables swapping between OpenAI, OpenRouter,
//! Ollama or any other backend without changing agent logic.

pub mod agent;
pub mod context;
pub mod error;
pub mod guardrail;
pub mod message;
pub mod mock;
pub mod provider;
pub mod runner;
pub mod schema;
pub mod tool;

pub use agent::{Agent, AgentBuilder, AgentTool, OutputSchema, verdict_schema};
pub use context::RunContext;
pub use error::{AgentError, ErrorKind, GuardrailRejection, Result};
pub use guardrail::{AgentGuardrail, Guardrail, GuardrailOutput, GuardrailResult, RunMode};
pub use message::{Conversation, Message, Role};
pub use provider::{Completion, GenerationOptions, Model, ModelProvider, ModelRequest, TokenUsage};
pub use runner::{FinalOutput, RunConfig, RunResult, Runner, ToolCallRecord};
pub use tool::{
    FunctionTool, ParameterSchema, Tool, ToolCall, ToolOutput, ToolRegistry, ToolResult, ToolSchema,
};
