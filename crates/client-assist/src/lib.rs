//! # client-assist
//!
//! A client-facing assistant built on agent-core.
//!
//! ## Flow
//!
//! ```text
//! prompt ─► Offensive Language Guardrail (blocking) ─► Client-facing Agent
//!                                                      ├─ get_client_history
//!                                                      └─ greeting_agent
//! ```
//!
//! Every agent, tool and guardrail in a run shares one [`UserContext`].

pub mod agents;
pub mod context;
pub mod error;
pub mod history;
pub mod svckit;

pub use agents::{DEMO_CLIENT_ID, client_facing_agent, open_agent, shared_agent};
pub use context::UserContext;
pub use error::{AssistError, Result};
pub use history::{ClientHistory, ClientSummary, DemoHistory};

/// Re-export tools for easy registration
pub mod tools {
    pub use crate::svckit::ClientHistoryTool;
}
