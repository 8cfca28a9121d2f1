//! Client History Tool
//!
//! Returns what is known about the client from previous interactions.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use agent_core::{
    AgentError, Result as CoreResult, RunContext, Tool, ToolOutput, ToolSchema,
    tool::ParameterSchema,
};

use crate::context::UserContext;
use crate::history::ClientHistory;

/// Tool for looking up a client's history
pub struct ClientHistoryTool {
    history: Arc<dyn ClientHistory>,
}

impl ClientHistoryTool {
    pub const NAME: &'static str = "get_client_history";

    pub fn new(history: Arc<dyn ClientHistory>) -> Self {
        Self { history }
    }
}

#[async_trait]
impl Tool<UserContext> for ClientHistoryTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::object(
            Self::NAME,
            "Return any historical data about the client from previous interactions.",
            vec![ParameterSchema::string("clientId", "The client's identifier").required()],
        )
    }

    async fn execute(
        &self,
        arguments: Value,
        ctx: &RunContext<UserContext>,
    ) -> CoreResult<ToolOutput> {
        let client_id = arguments
            .get("clientId")
            .and_then(Value::as_str)
            .ok_or_else(|| AgentError::ToolValidation("Missing clientId".into()))?;

        if client_id != ctx.client_id {
            tracing::debug!(
                requested = %client_id,
                session = %ctx.client_id,
                "history requested for another client"
            );
        }
        tracing::info!(
            source = self.history.name(),
            "> Getting client history for client {client_id}"
        );

        let summary = self.history.summary(client_id).await?;
        Ok(ToolOutput::Text(format!("Client {client_id} summary: {summary}.")))
    }
}
