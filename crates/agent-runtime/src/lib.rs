//! # agent-runtime
//!
//! Model backends for agent-core.
//!
//! ## Providers
//!
//! - **OpenRouter** (default): OpenAI-compatible chat completions
//! - **OpenAI**: the official API
//! - **Ollama** (feature `ollama`): local inference
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_core::Runner;
//! use agent_runtime::global_provider;
//!
//! let runner = Runner::new(global_provider()?);
//! let result = runner.run(&agent, "Hello", context).await?;
//! ```

pub mod config;
#[cfg(feature = "ollama")]
pub mod ollama;
pub mod openai;
pub mod provider;

pub use config::{ProviderConfig, ProviderKind};
pub use provider::{Provider, global_provider, resolve};
