//! Agent Wiring
//!
//! ```text
//! Client-facing Agent ──┬─ get_client_history
//!   (guardrail:         └─ greeting_agent ──► Greeting Agent
//!    Offensive Language Guardrail ──► Guardrail check)
//! ```

use std::sync::{Arc, OnceLock};

use agent_core::{
    Agent, AgentGuardrail, FinalOutput, Result, RunMode, RunResult, Runner, verdict_schema,
};

use crate::context::UserContext;
use crate::history::{ClientHistory, DemoHistory};
use crate::svckit::ClientHistoryTool;

/// Client used by [`open_agent`]
pub const DEMO_CLIENT_ID: &str = "ABC123";

pub const GREETING_AGENT_NAME: &str = "Greeting Agent";
pub const GUARDRAIL_AGENT_NAME: &str = "Guardrail check";
pub const CLIENT_FACING_AGENT_NAME: &str = "Client-facing Agent";
pub const OFFENSIVE_LANGUAGE_GUARDRAIL: &str = "Offensive Language Guardrail";

pub const GREETING_INSTRUCTIONS: &str = "You respond in a friendly and caring manner and greet \
the client by name and immediately ask them how you can help them today with references to \
previous interactions. Previous interactions available via the get_client_history tool.";

const GREETING_TOOL_DESCRIPTION: &str = "Handles greeting the client and asking how you can \
help them today as a setup to more engaging conversation.";

pub const GUARDRAIL_INSTRUCTIONS: &str =
    "Check if the user is using offensive, harmful or inappropriate language.";

pub const CLIENT_FACING_INSTRUCTIONS: &str = "You respond in a friendly and caring manner. \
Call the get_client_history tool to gather personalisation information and then immediately \
greet them to put them at ease.";

/// Verdict field set by the classifier
const OFFENSIVE_FLAG: &str = "isOffensive";

pub fn greeting_agent() -> Result<Agent<UserContext>> {
    Agent::builder(GREETING_AGENT_NAME)
        .instructions(GREETING_INSTRUCTIONS)
        .build()
}

/// Classifier answering `{isOffensive, reasoning}`
pub fn guardrail_agent() -> Result<Agent<UserContext>> {
    Agent::builder(GUARDRAIL_AGENT_NAME)
        .instructions(GUARDRAIL_INSTRUCTIONS)
        .output_schema("offensive_language_verdict", verdict_schema(OFFENSIVE_FLAG))
        .build()
}

/// Blocks the run when the classifier flags the input as offensive
pub fn offensive_language_guardrail() -> Result<AgentGuardrail<UserContext>> {
    let classifier = Arc::new(guardrail_agent()?);
    Ok(
        AgentGuardrail::new(OFFENSIVE_LANGUAGE_GUARDRAIL, classifier, is_offensive)
            .with_run_mode(RunMode::Blocking),
    )
}

fn is_offensive(output: &FinalOutput) -> bool {
    output
        .as_structured()
        .and_then(|verdict| verdict.get(OFFENSIVE_FLAG))
        .and_then(serde_json::Value::as_bool)
        == Some(true)
}

/// The primary agent
pub fn client_facing_agent(history: Arc<dyn ClientHistory>) -> Result<Agent<UserContext>> {
    let greeting = Arc::new(greeting_agent()?);

    Agent::builder(CLIENT_FACING_AGENT_NAME)
        .instructions(CLIENT_FACING_INSTRUCTIONS)
        .guardrail(offensive_language_guardrail()?)
        .tool(ClientHistoryTool::new(history))
        .agent_tool(
            &greeting,
            "greeting_agent",
            GREETING_TOOL_DESCRIPTION,
        )
        .build()
}

static CLIENT_FACING: OnceLock<Arc<Agent<UserContext>>> = OnceLock::new();

/// The client-facing agent over demo history, built on first use.
///
/// Every run shares the one tree. A failed build is not cached.
pub fn shared_agent() -> Result<Arc<Agent<UserContext>>> {
    if let Some(agent) = CLIENT_FACING.get() {
        return Ok(Arc::clone(agent));
    }

    let agent = Arc::new(client_facing_agent(Arc::new(DemoHistory::new()))?);
    tracing::debug!(agent = %agent.name(), "client-facing agent built");
    Ok(Arc::clone(CLIENT_FACING.get_or_init(|| agent)))
}

/// Run the client-facing agent for the demo client
pub async fn open_agent(runner: &Runner, prompt: &str) -> Result<RunResult> {
    let agent = shared_agent()?;
    let result = runner
        .run(agent.as_ref(), prompt, UserContext::new(DEMO_CLIENT_ID))
        .await?;

    tracing::info!(
        turns = result.turns,
        tool_calls = result.tool_calls.len(),
        "client-facing run complete"
    );
    Ok(result)
}
