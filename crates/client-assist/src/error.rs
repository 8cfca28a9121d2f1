//! Error Types for Client Assist

use agent_core::AgentError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AssistError>;

#[derive(Error, Debug)]
pub enum AssistError {
    #[error("Unknown client: {0}")]
    UnknownClient(String),
}

impl From<AssistError> for AgentError {
    fn from(err: AssistError) -> Self {
        Self::ToolExecution(err.to_string())
    }
}
