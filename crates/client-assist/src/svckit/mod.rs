//! Service Kit - Agent Tools
//!
//! Domain tools that implement `agent_core::Tool` for the client assistant.

mod client_history;

pub use client_history::ClientHistoryTool;
