//! Runner
//!
//! Drives an [`Agent`] through one run:
//!
//! ```text
//! Init → GuardrailCheck → ModelTurn → (ToolExecution → ModelTurn)*
//!      → Success | Rejected | Error
//! ```
//!
//! 1. Build the history from the agent's instructions and the prompt
//! 2. Evaluate input guardrails (blocking ones before the first model call,
//!    parallel ones racing it)
//! 3. Call the model with the agent's tool catalog
//! 4. Execute requested tools concurrently, append results in request order
//! 5. Loop until the model answers, or `max_turns` is hit
//!
//! Agent-as-tool calls re-enter the runner through [`Runner::run_nested`]
//! with the same shared context, one level deeper.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::agent::{Agent, OutputSchema};
use crate::context::RunContext;
use crate::error::{AgentError, Result};
use crate::guardrail::{self, Guardrail, GuardrailResult, RunMode};
use crate::message::{Conversation, Message};
use crate::provider::{ModelProvider, ModelRequest, TokenUsage};
use crate::tool::{ToolCall, ToolResult, new_call_id};

/// Limits applied to every run started by a [`Runner`]
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// Maximum model turns per run before giving up
    pub max_turns: usize,

    /// Maximum agent-as-tool nesting depth (top-level run is depth 0)
    pub max_depth: usize,

    /// Wall-clock bound for a whole run tree
    pub timeout: Option<Duration>,

    /// Model-name hint for agents that do not name a model
    pub model: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_turns: 10,
            max_depth: 4,
            timeout: None,
            model: None,
        }
    }
}

impl RunConfig {
    #[must_use]
    pub const fn max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    #[must_use]
    pub const fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// The terminal value of a run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FinalOutput {
    Text(String),
    /// Validated against the agent's output schema
    Structured(Value),
}

impl FinalOutput {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Structured(_) => None,
        }
    }

    pub const fn as_structured(&self) -> Option<&Value> {
        match self {
            Self::Structured(value) => Some(value),
            Self::Text(_) => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Text(text) => Value::String(text.clone()),
            Self::Structured(value) => value.clone(),
        }
    }
}

impl std::fmt::Display for FinalOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Structured(value) => write!(f, "{value}"),
        }
    }
}

/// Log entry for one tool invocation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub call: ToolCall,
    pub result: ToolResult,
    pub duration_ms: u64,
}

/// Everything a successful run produced
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunResult {
    pub agent: String,
    pub run_id: Uuid,
    pub final_output: FinalOutput,
    /// Every tool invocation, in the order results entered the history
    pub tool_calls: Vec<ToolCallRecord>,
    pub guardrail_results: Vec<GuardrailResult>,
    /// Full message history, including the final answer
    pub messages: Vec<Message>,
    /// Model turns taken
    pub turns: usize,
    pub usage: TokenUsage,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    /// The final output rendered as text
    pub fn final_text(&self) -> String {
        self.final_output.to_string()
    }
}

/// Holds back model output until parallel guardrails have all passed.
struct GuardrailGate<'g, P> {
    parallel: Pin<&'g mut P>,
    pending: bool,
    results: Vec<GuardrailResult>,
}

impl<P: Future<Output = Vec<GuardrailResult>>> GuardrailGate<'_, P> {
    /// Record verdicts; reject on the first trip
    fn absorb(&mut self, results: Vec<GuardrailResult>) -> Result<()> {
        self.results.extend(results);
        guardrail::verdict(&self.results)
    }

    /// Run `work` alongside pending parallel guardrails.
    ///
    /// Returns as soon as `work` finishes. A trip observed first drops `work`.
    async fn race<T>(&mut self, work: impl Future<Output = T>) -> Result<T> {
        if !self.pending {
            return Ok(work.await);
        }

        tokio::pin!(work);
        tokio::select! {
            biased;
            results = self.parallel.as_mut() => {
                self.pending = false;
                self.absorb(results)?;
                Ok(work.await)
            }
            output = &mut work => Ok(output),
        }
    }

    /// Wait for the parallel verdict if it is still outstanding
    async fn settle(&mut self) -> Result<()> {
        if self.pending {
            let results = self.parallel.as_mut().await;
            self.pending = false;
            self.absorb(results)?;
        }
        Ok(())
    }

    /// Like [`race`](Self::race), but the output is released only after
    /// every parallel verdict is in.
    async fn admit<T>(&mut self, work: impl Future<Output = T>) -> Result<T> {
        let output = self.race(work).await?;
        self.settle().await?;
        Ok(output)
    }
}

/// The execution engine. Cheap to clone; clones share provider and limits.
#[derive(Clone)]
pub struct Runner {
    provider: Arc<dyn ModelProvider>,
    config: Arc<RunConfig>,
}

impl Runner {
    /// Create a runner with default limits
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self::with_config(provider, RunConfig::default())
    }

    pub fn with_config(provider: Arc<dyn ModelProvider>, config: RunConfig) -> Self {
        Self {
            provider,
            config: Arc::new(config),
        }
    }

    /// Get configuration
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<dyn ModelProvider> {
        &self.provider
    }

    /// Run an agent on a prompt with a fresh context value
    pub async fn run<C: Send + Sync + 'static>(
        &self,
        agent: &Agent<C>,
        prompt: &str,
        context: C,
    ) -> Result<RunResult> {
        self.run_shared(agent, prompt, Arc::new(context)).await
    }

    /// Run with a context the caller keeps a handle to
    pub async fn run_shared<C: Send + Sync + 'static>(
        &self,
        agent: &Agent<C>,
        prompt: &str,
        context: Arc<C>,
    ) -> Result<RunResult> {
        let deadline = self.config.timeout.map(|timeout| Instant::now() + timeout);
        let ctx = RunContext::new(context, self.clone(), deadline);
        self.execute(agent, prompt, ctx).await
    }

    /// Run an agent on behalf of a tool or guardrail of an outer run.
    ///
    /// Shares the outer run's context and deadline, one level deeper.
    pub async fn run_nested<C: Send + Sync + 'static>(
        &self,
        agent: &Agent<C>,
        prompt: &str,
        parent: &RunContext<C>,
    ) -> Result<RunResult> {
        let depth = parent.depth() + 1;
        if depth > self.config.max_depth {
            tracing::warn!(agent = %agent.name(), depth, "agent nesting too deep");
            return Err(AgentError::MaxDepthExceeded(self.config.max_depth));
        }

        self.execute(agent, prompt, parent.child(depth)).await
    }

    fn timed_out(&self) -> AgentError {
        AgentError::Timeout(self.config.timeout.unwrap_or_default())
    }

    async fn execute<C: Send + Sync + 'static>(
        &self,
        agent: &Agent<C>,
        prompt: &str,
        ctx: RunContext<C>,
    ) -> Result<RunResult> {
        let span = tracing::info_span!(
            "agent_run",
            agent = %agent.name(),
            run_id = %ctx.run_id(),
            depth = ctx.depth(),
        );
        let deadline = ctx.deadline();
        let run = self.drive(agent, prompt, ctx).instrument(span);

        match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, run).await.map_err(|_| {
                tracing::warn!(agent = %agent.name(), "run timed out");
                self.timed_out()
            })?,
            None => run.await,
        }
    }

    async fn drive<C: Send + Sync + 'static>(
        &self,
        agent: &Agent<C>,
        prompt: &str,
        ctx: RunContext<C>,
    ) -> Result<RunResult> {
        let started_at = Utc::now();
        let model = self
            .provider
            .get_model(agent.model().or(self.config.model.as_deref()))?;

        tracing::info!(agent = %agent.name(), model = %model.name(), "run started");

        let mut conversation = Conversation::start(agent.instructions(), prompt);

        let (parallel, blocking): (Vec<Arc<dyn Guardrail<C>>>, Vec<_>) = agent
            .input_guardrails()
            .iter()
            .cloned()
            .partition(|g| g.run_mode() == RunMode::Parallel);

        let parallel_checks = guardrail::evaluate(&parallel, prompt, &ctx);
        tokio::pin!(parallel_checks);
        let mut gate = GuardrailGate {
            parallel: parallel_checks,
            pending: !parallel.is_empty(),
            results: Vec::new(),
        };

        if !blocking.is_empty() {
            let results = gate
                .race(guardrail::evaluate(&blocking, prompt, &ctx))
                .await?;
            gate.absorb(results)?;
        }

        let tools = agent.tools().schemas();
        let response_format = agent.output_schema().map(OutputSchema::response_format);
        let mut tool_log = Vec::new();
        let mut usage = TokenUsage::default();

        for turn in 1..=self.config.max_turns {
            // A nested run that hit the deadline comes back as a tool failure
            if ctx.remaining() == Some(Duration::ZERO) {
                tracing::warn!(agent = %agent.name(), turn, "deadline passed between turns");
                return Err(self.timed_out());
            }
            tracing::debug!(turn, messages = conversation.len(), "model turn");

            let request = ModelRequest {
                messages: conversation.messages().to_vec(),
                tools: tools.clone(),
                options: agent.generation().clone(),
                response_format: response_format.clone(),
            };

            let completion = gate
                .admit(model.respond(&request))
                .await?
                .inspect_err(|e| tracing::error!(error = %e, turn, "model call failed"))?;

            if let Some(turn_usage) = completion.usage {
                usage += turn_usage;
            }

            if !completion.requests_tools() {
                let final_output = match agent.output_schema() {
                    Some(schema) => FinalOutput::Structured(schema.parse(&completion.content)?),
                    None => FinalOutput::Text(completion.content.clone()),
                };
                conversation.push(Message::assistant(completion.content));

                tracing::info!(turns = turn, tool_calls = tool_log.len(), "run finished");

                return Ok(RunResult {
                    agent: agent.name().to_owned(),
                    run_id: ctx.run_id(),
                    final_output,
                    tool_calls: tool_log,
                    guardrail_results: std::mem::take(&mut gate.results),
                    messages: conversation.into_messages(),
                    turns: turn,
                    usage,
                    started_at,
                    finished_at: Utc::now(),
                });
            }

            let calls: Vec<ToolCall> = completion
                .tool_calls
                .into_iter()
                .map(|call| {
                    if call.id.is_empty() {
                        call.with_id(new_call_id())
                    } else {
                        call
                    }
                })
                .collect();

            conversation.push_tool_calls(completion.content, calls.clone());

            // Concurrent, but join_all yields in request order
            let records = join_all(calls.iter().map(|call| invoke_tool(agent, call, &ctx))).await;

            for record in records {
                conversation.push_tool_result(&record.result);
                tool_log.push(record);
            }
        }

        tracing::error!(max_turns = self.config.max_turns, "max turns exceeded");
        Err(AgentError::MaxTurnsExceeded(self.config.max_turns))
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .finish()
    }
}

/// Execute one call. Failures become error results for the model.
async fn invoke_tool<C: Send + Sync + 'static>(
    agent: &Agent<C>,
    call: &ToolCall,
    ctx: &RunContext<C>,
) -> ToolCallRecord {
    let started = Instant::now();
    tracing::debug!(tool = %call.name, call_id = %call.id, "executing tool");

    let result = match agent.tools().execute(call, ctx).await {
        Ok(output) => ToolResult::from_output(&call.name, output),
        Err(e) => {
            tracing::warn!(tool = %call.name, error = %e, "tool call failed");
            ToolResult::from_error(&call.name, &e)
        }
    }
    .with_id(call.id.clone());

    ToolCallRecord {
        call: call.clone(),
        result,
        duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use crate::error::ErrorKind;
    use crate::guardrail::GuardrailOutput;
    use crate::message::Role;
    use crate::mock::{ScriptedModel, StaticProvider};
    use crate::provider::Completion;
    use crate::tool::{FunctionTool, ParameterSchema, Tool, ToolOutput, ToolSchema};

    fn runner_for(model: &Arc<ScriptedModel>) -> Runner {
        Runner::new(Arc::new(StaticProvider::new(model.clone())))
    }

    fn history_tool(calls: Arc<AtomicUsize>) -> Arc<dyn Tool<()>> {
        Arc::new(FunctionTool::new(
            ToolSchema::object(
                "get_client_history",
                "Return historical data about the client",
                vec![ParameterSchema::string("clientId", "Client identifier").required()],
            ),
            move |args: Value, _ctx: RunContext<()>| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    Ok(ToolOutput::Text(format!(
                        "Client {} summary: Name: Barry Doe",
                        args["clientId"].as_str().unwrap_or_default()
                    )))
                }
            },
        ))
    }

    fn sleepy_tool(name: &'static str, delay_ms: u64) -> Arc<dyn Tool<()>> {
        Arc::new(FunctionTool::new(
            ToolSchema::object(name, "Sleeps then answers", Vec::new()),
            move |_args: Value, _ctx: RunContext<()>| async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok(ToolOutput::from(format!("{name} done")))
            },
        ))
    }

    struct Tripwire {
        name: &'static str,
        mode: RunMode,
        delay: Duration,
        trip: bool,
        finished: Arc<AtomicBool>,
    }

    impl Tripwire {
        fn new(name: &'static str, mode: RunMode, trip: bool) -> Self {
            Self {
                name,
                mode,
                delay: Duration::ZERO,
                trip,
                finished: Arc::new(AtomicBool::new(false)),
            }
        }

        fn delayed(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl Guardrail<()> for Tripwire {
        fn name(&self) -> &str {
            self.name
        }

        fn run_mode(&self) -> RunMode {
            self.mode
        }

        async fn check(&self, input: &str, _ctx: &RunContext<()>) -> Result<GuardrailOutput> {
            tokio::time::sleep(self.delay).await;
            self.finished.store(true, Ordering::SeqCst);
            let info = json!({ "input": input });
            Ok(if self.trip { GuardrailOutput::trip(info) } else { GuardrailOutput::pass(info) })
        }
    }

    struct Failing;

    #[async_trait]
    impl Guardrail<()> for Failing {
        fn name(&self) -> &str {
            "Failing Guardrail"
        }

        fn run_mode(&self) -> RunMode {
            RunMode::Parallel
        }

        async fn check(&self, _input: &str, _ctx: &RunContext<()>) -> Result<GuardrailOutput> {
            Err(AgentError::ProviderUnavailable("classifier down".into()))
        }
    }

    #[tokio::test]
    async fn test_greets_after_fetching_history() {
        let model = Arc::new(ScriptedModel::new(vec![
            Completion::tool_calls(vec![ToolCall::new(
                "get_client_history",
                json!({"clientId": "ABC123"}),
            )]),
            Completion::text("Hello Barry! How can I help you today?"),
        ]));
        let calls = Arc::new(AtomicUsize::new(0));
        let agent = Agent::<()>::builder("Client-facing Agent")
            .instructions("Call get_client_history, then greet.")
            .shared_tool(history_tool(calls.clone()))
            .build()
            .unwrap();

        let result = runner_for(&model)
            .run(&agent, "Hello, clientId is ABC123", ())
            .await
            .unwrap();

        assert!(result.final_text().contains("Hello"));
        assert_eq!(result.turns, 2);
        assert_eq!(result.tool_calls.len(), 1);
        assert_eq!(result.tool_calls[0].call.name, "get_client_history");
        assert_eq!(result.tool_calls[0].call.arguments, json!({"clientId": "ABC123"}));
        assert!(result.tool_calls[0].result.success);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // The second turn saw the tool result
        let requests = model.requests();
        let second = &requests[1];
        let last = second.messages.last().unwrap();
        assert_eq!(last.role, Role::Tool);
        assert!(last.content.contains("Barry Doe"));
        assert_eq!(second.tools.len(), 1);
        assert_eq!(second.system_prompt(), Some("Call get_client_history, then greet."));
    }

    #[tokio::test]
    async fn test_blocking_trip_never_calls_model() {
        let model = Arc::new(ScriptedModel::new(vec![Completion::text("should never be seen")]));
        let agent = Agent::<()>::builder("Guarded")
            .guardrail(Tripwire::new("Always Trips", RunMode::Blocking, true))
            .build()
            .unwrap();

        let err = runner_for(&model).run(&agent, "anything", ()).await.unwrap_err();

        let rejection = err.rejection().expect("rejection");
        assert_eq!(rejection.guardrail, "Always Trips");
        assert_eq!(rejection.output_info, json!({"input": "anything"}));
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_parallel_trip_discards_model_output() {
        // Model answers immediately; the guardrail trips afterwards
        let model = Arc::new(ScriptedModel::new(vec![Completion::text("generated")]));
        let agent = Agent::<()>::builder("Guarded")
            .guardrail(
                Tripwire::new("Slow Parallel", RunMode::Parallel, true)
                    .delayed(Duration::from_millis(30)),
            )
            .build()
            .unwrap();

        let err = runner_for(&model).run(&agent, "hi", ()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::GuardrailRejected);
        assert_eq!(err.rejection().unwrap().guardrail, "Slow Parallel");
        assert!(!err.to_string().contains("generated"));
    }

    #[tokio::test]
    async fn test_parallel_trip_blocks_tool_side_effects() {
        let model = Arc::new(
            ScriptedModel::new(vec![
                Completion::tool_calls(vec![ToolCall::new(
                    "get_client_history",
                    json!({"clientId": "X"}),
                )]),
                Completion::text("done"),
            ])
            .with_delay(Duration::from_millis(5)),
        );
        let calls = Arc::new(AtomicUsize::new(0));
        let agent = Agent::<()>::builder("Guarded")
            .shared_tool(history_tool(calls.clone()))
            .guardrail(
                Tripwire::new("Slow Parallel", RunMode::Parallel, true)
                    .delayed(Duration::from_millis(40)),
            )
            .build()
            .unwrap();

        let err = runner_for(&model).run(&agent, "hi", ()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::GuardrailRejected);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn test_parallel_pass_releases_output() {
        let model = Arc::new(ScriptedModel::new(vec![Completion::text("answer")]));
        let agent = Agent::<()>::builder("Guarded")
            .guardrail(Tripwire::new("Blocking Pass", RunMode::Blocking, false))
            .guardrail(
                Tripwire::new("Parallel Pass", RunMode::Parallel, false)
                    .delayed(Duration::from_millis(10)),
            )
            .build()
            .unwrap();

        let result = runner_for(&model).run(&agent, "hi", ()).await.unwrap();

        assert_eq!(result.final_text(), "answer");
        let mut names: Vec<_> = result
            .guardrail_results
            .iter()
            .map(|r| r.guardrail.as_str())
            .collect();
        names.sort_unstable();
        assert_eq!(names, vec!["Blocking Pass", "Parallel Pass"]);
        assert!(result.guardrail_results.iter().all(|r| !r.tripwire_triggered));
    }

    #[tokio::test]
    async fn test_blocking_trip_cancels_parallel_guardrails() {
        let model = Arc::new(ScriptedModel::new(vec![Completion::text("never")]));
        let slow = Tripwire::new("Slow Parallel", RunMode::Parallel, false)
            .delayed(Duration::from_secs(30));
        let slow_finished = slow.finished.clone();
        let agent = Agent::<()>::builder("Guarded")
            .guardrail(slow)
            .guardrail(Tripwire::new("Fast Blocking", RunMode::Blocking, true))
            .build()
            .unwrap();

        let started = std::time::Instant::now();
        let err = runner_for(&model).run(&agent, "hi", ()).await.unwrap_err();

        assert_eq!(err.rejection().unwrap().guardrail, "Fast Blocking");
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!slow_finished.load(Ordering::SeqCst));
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_failing_guardrail_counts_as_trip() {
        let model = Arc::new(ScriptedModel::new(vec![Completion::text("answer")]));
        let agent = Agent::<()>::builder("Guarded").guardrail(Failing).build().unwrap();

        let err = runner_for(&model).run(&agent, "hi", ()).await.unwrap_err();

        let rejection = err.rejection().unwrap();
        assert_eq!(rejection.guardrail, "Failing Guardrail");
        assert!(rejection.output_info["error"].as_str().unwrap().contains("classifier down"));
        assert!(rejection.results[0].errored);
    }

    #[tokio::test]
    async fn test_tool_results_keep_request_order() {
        let model = Arc::new(ScriptedModel::new(vec![
            Completion::tool_calls(vec![
                ToolCall::new("t1", json!({})).with_id("c1"),
                ToolCall::new("t2", json!({})).with_id("c2"),
                ToolCall::new("t3", json!({})).with_id("c3"),
            ]),
            Completion::text("all done"),
        ]));
        let agent = Agent::<()>::builder("Fan-out")
            .shared_tool(sleepy_tool("t1", 0))
            .shared_tool(sleepy_tool("t2", 50))
            .shared_tool(sleepy_tool("t3", 0))
            .build()
            .unwrap();

        let result = runner_for(&model).run(&agent, "go", ()).await.unwrap();

        let logged: Vec<_> = result.tool_calls.iter().map(|r| r.call.name.as_str()).collect();
        assert_eq!(logged, vec!["t1", "t2", "t3"]);

        let requests = model.requests();
        let second = &requests[1];
        let tail: Vec<_> = second.messages[second.messages.len() - 3..]
            .iter()
            .map(|m| (m.tool_call_id.clone().unwrap(), m.content.clone()))
            .collect();
        assert_eq!(
            tail,
            vec![
                ("c1".to_owned(), "t1 done".to_owned()),
                ("c2".to_owned(), "t2 done".to_owned()),
                ("c3".to_owned(), "t3 done".to_owned()),
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_arguments_fed_back_not_executed() {
        let bad = || ToolCall::new("get_client_history", json!({"clientId": 123}));
        let model = Arc::new(ScriptedModel::new(vec![
            Completion::tool_calls(vec![bad()]),
            Completion::tool_calls(vec![bad()]),
            Completion::text("giving up politely"),
        ]));
        let calls = Arc::new(AtomicUsize::new(0));
        let agent = Agent::<()>::builder("Validator")
            .shared_tool(history_tool(calls.clone()))
            .build()
            .unwrap();

        let result = runner_for(&model).run(&agent, "hi", ()).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.tool_calls.len(), 2);
        let first = &result.tool_calls[0].result;
        let second = &result.tool_calls[1].result;
        assert!(!first.success);
        assert_eq!(first.error_kind, Some(ErrorKind::ToolExecutionError));
        assert_eq!(first.output, second.output);
        assert_eq!(result.final_text(), "giving up politely");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_recoverable() {
        let model = Arc::new(ScriptedModel::new(vec![
            Completion::tool_calls(vec![ToolCall::new("no_such_tool", json!({}))]),
            Completion::text("recovered"),
        ]));
        let agent = Agent::<()>::builder("Plain").build().unwrap();

        let result = runner_for(&model).run(&agent, "hi", ()).await.unwrap();

        assert_eq!(result.final_text(), "recovered");
        assert!(result.tool_calls[0].result.output.contains("no_such_tool"));
    }

    #[tokio::test]
    async fn test_loop_bound() {
        let model = Arc::new(ScriptedModel::from_fn(|_req| {
            Ok(Completion::tool_calls(vec![ToolCall::new("t1", json!({}))]))
        }));
        let agent = Agent::<()>::builder("Runaway")
            .shared_tool(sleepy_tool("t1", 0))
            .build()
            .unwrap();
        let runner = Runner::with_config(
            Arc::new(StaticProvider::new(model.clone())),
            RunConfig::default().max_turns(3),
        );

        let err = runner.run(&agent, "loop", ()).await.unwrap_err();

        assert!(matches!(err, AgentError::MaxTurnsExceeded(3)));
        assert_eq!(model.call_count(), 3);
    }

    /// Answers by agent: calls the agent's first tool once, then reports what it saw.
    fn delegating_model() -> Arc<ScriptedModel> {
        Arc::new(ScriptedModel::from_fn(|req| {
            let system = req.system_prompt().unwrap_or_default().to_owned();
            let last = req.messages.last().unwrap();
            match (last.role, req.tools.first()) {
                (Role::User, Some(tool)) => Ok(Completion::tool_calls(vec![ToolCall::new(
                    tool.name.clone(),
                    json!({"input": last.content}),
                )])),
                (Role::Tool, _) => Ok(Completion::text(format!("{system} saw: {}", last.content))),
                _ => Ok(Completion::text(format!("{system} answered"))),
            }
        }))
    }

    #[tokio::test]
    async fn test_delegation_returns_nested_output() {
        let model = delegating_model();
        let inner = Arc::new(Agent::<()>::builder("Inner").instructions("inner").build().unwrap());
        let outer = Agent::<()>::builder("Outer")
            .instructions("outer")
            .agent_tool(&inner, "inner_agent", "Delegates to inner")
            .build()
            .unwrap();

        let result = runner_for(&model).run(&outer, "hello", ()).await.unwrap();

        assert_eq!(result.tool_calls[0].result.output, "inner answered");
        assert_eq!(result.final_text(), "outer saw: inner answered");
    }

    #[tokio::test]
    async fn test_nested_rejection_propagates_as_tool_failure() {
        let model = delegating_model();
        let inner = Arc::new(
            Agent::<()>::builder("Inner")
                .instructions("inner")
                .guardrail(Tripwire::new("Inner Tripwire", RunMode::Blocking, true))
                .build()
                .unwrap(),
        );
        let outer = Agent::<()>::builder("Outer")
            .instructions("outer")
            .agent_tool(&inner, "inner_agent", "Delegates to inner")
            .build()
            .unwrap();

        let result = runner_for(&model).run(&outer, "hello", ()).await.unwrap();

        let record = &result.tool_calls[0].result;
        assert!(!record.success);
        assert_eq!(record.error_kind, Some(ErrorKind::GuardrailRejected));
        assert!(record.output.contains("Inner Tripwire"));
        assert!(!record.output.is_empty());
        // Only the two outer turns reached the model
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test]
    async fn test_depth_limit_stops_nesting() {
        let model = delegating_model();
        let leaf = Arc::new(Agent::<()>::builder("Leaf").instructions("leaf").build().unwrap());
        let middle = Arc::new(
            Agent::<()>::builder("Middle")
                .instructions("middle")
                .agent_tool(&leaf, "leaf_agent", "Leaf")
                .build()
                .unwrap(),
        );
        let top = Agent::<()>::builder("Top")
            .instructions("top")
            .agent_tool(&middle, "middle_agent", "Middle")
            .build()
            .unwrap();
        let runner = Runner::with_config(
            Arc::new(StaticProvider::new(model.clone())),
            RunConfig::default().max_depth(1),
        );

        let result = runner.run(&top, "hello", ()).await.unwrap();

        let text = result.final_text();
        assert!(text.starts_with("top saw: middle saw: Error: tool 'leaf_agent' failed"));
        assert!(text.contains("nesting depth"));
    }

    #[derive(Default)]
    struct Visits {
        log: Mutex<Vec<String>>,
    }

    fn visiting_tool(name: &'static str) -> Arc<dyn Tool<Visits>> {
        Arc::new(FunctionTool::new(
            ToolSchema::object(
                name,
                "Records a visit",
                vec![ParameterSchema::string("input", "Input")],
            ),
            move |_args: Value, ctx: RunContext<Visits>| async move {
                ctx.log.lock().unwrap().push(format!("{name}@{}", ctx.depth()));
                Ok(ToolOutput::from("visited"))
            },
        ))
    }

    #[tokio::test]
    async fn test_nested_runs_share_context() {
        let model = delegating_model();
        let inner = Arc::new(
            Agent::<Visits>::builder("Inner")
                .instructions("inner")
                .shared_tool(visiting_tool("inner_visit"))
                .build()
                .unwrap(),
        );
        let outer = Agent::<Visits>::builder("Outer")
            .instructions("outer")
            .agent_tool(&inner, "inner_agent", "Delegates")
            .build()
            .unwrap();
        let visits = Arc::new(Visits::default());

        runner_for(&model)
            .run_shared(&outer, "hello", visits.clone())
            .await
            .unwrap();

        assert_eq!(*visits.log.lock().unwrap(), vec!["inner_visit@1".to_owned()]);
    }

    #[tokio::test]
    async fn test_structured_output() {
        let schema = json!({
            "type": "object",
            "properties": { "isOffensive": { "type": "boolean" } },
            "required": ["isOffensive"]
        });
        let model = Arc::new(ScriptedModel::new(vec![Completion::text(
            r#"{"isOffensive": false}"#,
        )]));
        let agent = Agent::<()>::builder("Classifier")
            .output_schema("verdict", schema.clone())
            .build()
            .unwrap();

        let result = runner_for(&model).run(&agent, "hi", ()).await.unwrap();
        assert_eq!(result.final_output.as_structured(), Some(&json!({"isOffensive": false})));
        assert_eq!(model.requests()[0].response_format.as_ref().unwrap().name, "verdict");

        let model = Arc::new(ScriptedModel::new(vec![Completion::text(
            r#"{"isOffensive": "maybe"}"#,
        )]));
        let err = runner_for(&model).run(&agent, "hi", ()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutputValidationError);
    }

    #[tokio::test]
    async fn test_backend_error_propagates() {
        let model = Arc::new(ScriptedModel::from_results(vec![Err(AgentError::RateLimited(
            "429".into(),
        ))]));
        let agent = Agent::<()>::builder("Plain").build().unwrap();

        let err = runner_for(&model).run(&agent, "hi", ()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ModelBackendError);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_timeout_bounds_run() {
        let model = Arc::new(
            ScriptedModel::new(vec![Completion::text("late")]).with_delay(Duration::from_secs(10)),
        );
        let agent = Agent::<()>::builder("Slow").build().unwrap();
        let runner = Runner::with_config(
            Arc::new(StaticProvider::new(model.clone())),
            RunConfig::default().timeout(Duration::from_millis(20)),
        );

        let err = runner.run(&agent, "hi", ()).await.unwrap_err();
        assert!(matches!(err, AgentError::Timeout(d) if d == Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn test_nested_timeout_fails_outer_run() {
        let model = Arc::new(ScriptedModel::from_fn(|req| {
            let last = req.messages.last().unwrap();
            match (req.system_prompt().unwrap_or_default(), last.role) {
                ("outer", Role::User) => Ok(Completion::tool_calls(vec![ToolCall::new(
                    "inner_agent",
                    json!({"input": "go"}),
                )])),
                ("inner", Role::User) => {
                    Ok(Completion::tool_calls(vec![ToolCall::new("slow", json!({}))]))
                }
                (system, _) => Ok(Completion::text(format!("{system} done: {}", last.content))),
            }
        }));
        let inner = Arc::new(
            Agent::<()>::builder("Inner")
                .instructions("inner")
                .shared_tool(sleepy_tool("slow", 200))
                .build()
                .unwrap(),
        );
        let outer = Agent::<()>::builder("Outer")
            .instructions("outer")
            .agent_tool(&inner, "inner_agent", "Delegates to inner")
            .build()
            .unwrap();
        let runner = Runner::with_config(
            Arc::new(StaticProvider::new(model.clone())),
            RunConfig::default().timeout(Duration::from_millis(30)),
        );

        let started = std::time::Instant::now();
        let err = runner.run(&outer, "hello", ()).await.unwrap_err();

        assert!(matches!(err, AgentError::Timeout(d) if d == Duration::from_millis(30)));
        assert!(started.elapsed() < Duration::from_millis(200));
        let outer_turns = model
            .requests()
            .iter()
            .filter(|r| r.system_prompt() == Some("outer"))
            .count();
        assert_eq!(outer_turns, 1);
    }

    #[tokio::test]
    async fn test_model_hint_resolution() {
        let model = Arc::new(ScriptedModel::new(vec![
            Completion::text("a"),
            Completion::text("b"),
        ]));
        let provider = Arc::new(StaticProvider::new(model.clone()));
        let runner =
            Runner::with_config(provider.clone(), RunConfig::default().model("fallback-model"));

        let named = Agent::<()>::builder("Named").model("gpt-4o").build().unwrap();
        let unnamed = Agent::<()>::builder("Unnamed").build().unwrap();
        runner.run(&named, "hi", ()).await.unwrap();
        runner.run(&unnamed, "hi", ()).await.unwrap();

        assert_eq!(
            provider.hints(),
            vec![Some("gpt-4o".to_owned()), Some("fallback-model".to_owned())]
        );
    }
}
