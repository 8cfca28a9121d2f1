//! Input Guardrails
//!
//! Checks run against a run's initial prompt that can veto the run before any
//! model output reaches the caller.
//!
//! A guardrail either blocks the primary model call until its verdict is in
//! ([`RunMode::Blocking`]) or races it ([`RunMode::Parallel`]). In both modes
//! a tripped verdict ends the run with [`AgentError::GuardrailRejected`] and
//! any model output produced in the meantime is discarded.
//!
//! A guardrail that *errors* is recorded as tripped, with the error message
//! as its output info.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::agent::Agent;
use crate::context::RunContext;
use crate::error::{AgentError, Result};
use crate::runner::FinalOutput;

/// When a guardrail runs relative to the primary model call
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Verdict is awaited before the model is called
    #[default]
    Blocking,
    /// Runs alongside the first model turn; joined before that turn is acted on
    Parallel,
}

/// A guardrail's verdict
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GuardrailOutput {
    /// Diagnostic info, surfaced on rejection
    pub output_info: Value,

    /// Whether the run must be stopped
    pub tripwire_triggered: bool,
}

impl GuardrailOutput {
    pub fn pass(output_info: Value) -> Self {
        Self {
            output_info,
            tripwire_triggered: false,
        }
    }

    pub fn trip(output_info: Value) -> Self {
        Self {
            output_info,
            tripwire_triggered: true,
        }
    }
}

/// Log entry for one guardrail evaluation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GuardrailResult {
    pub guardrail: String,
    pub run_mode: RunMode,
    pub output_info: Value,
    pub tripwire_triggered: bool,
    /// The check itself failed; counted as a trip
    #[serde(default)]
    pub errored: bool,
    pub duration_ms: u64,
}

/// Guardrail trait - implement to add input checks
#[async_trait]
pub trait Guardrail<C>: Send + Sync {
    /// Name reported in logs and rejections
    fn name(&self) -> &str;

    fn run_mode(&self) -> RunMode {
        RunMode::Blocking
    }

    /// Inspect the run's initial prompt
    async fn check(&self, input: &str, ctx: &RunContext<C>) -> Result<GuardrailOutput>;
}

type Tripwire = dyn Fn(&FinalOutput) -> bool + Send + Sync;

/// Guardrail that asks a classifier agent about the input.
///
/// The agent runs nested under the same runner and context; its final output
/// becomes the output info and `tripwire` decides the verdict.
pub struct AgentGuardrail<C> {
    name: String,
    run_mode: RunMode,
    agent: Arc<Agent<C>>,
    tripwire: Box<Tripwire>,
}

impl<C> AgentGuardrail<C> {
    pub fn new(
        name: impl Into<String>,
        agent: Arc<Agent<C>>,
        tripwire: impl Fn(&FinalOutput) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            run_mode: RunMode::Blocking,
            agent,
            tripwire: Box::new(tripwire),
        }
    }

    #[must_use]
    pub fn with_run_mode(mut self, run_mode: RunMode) -> Self {
        self.run_mode = run_mode;
        self
    }
}

#[async_trait]
impl<C: Send + Sync + 'static> Guardrail<C> for AgentGuardrail<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn run_mode(&self) -> RunMode {
        self.run_mode
    }

    async fn check(&self, input: &str, ctx: &RunContext<C>) -> Result<GuardrailOutput> {
        let result = ctx.runner().run_nested(&self.agent, input, ctx).await?;
        let tripped = (self.tripwire)(&result.final_output);

        Ok(GuardrailOutput {
            output_info: result.final_output.to_value(),
            tripwire_triggered: tripped,
        })
    }
}

/// Evaluate guardrails concurrently; results keep declaration order.
pub(crate) async fn evaluate<C>(
    guardrails: &[Arc<dyn Guardrail<C>>],
    input: &str,
    ctx: &RunContext<C>,
) -> Vec<GuardrailResult> {
    join_all(guardrails.iter().map(|g| evaluate_one(g.as_ref(), input, ctx))).await
}

async fn evaluate_one<C>(
    guardrail: &dyn Guardrail<C>,
    input: &str,
    ctx: &RunContext<C>,
) -> GuardrailResult {
    let started = Instant::now();
    let outcome = guardrail.check(input, ctx).await;
    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    let (output, errored) = match outcome {
        Ok(output) => (output, false),
        Err(e) => {
            tracing::warn!(
                guardrail = %guardrail.name(),
                error = %e,
                "guardrail failed, treating as tripped"
            );
            (GuardrailOutput::trip(json!({ "error": e.to_string() })), true)
        }
    };

    tracing::debug!(
        guardrail = %guardrail.name(),
        tripped = output.tripwire_triggered,
        duration_ms,
        "guardrail verdict"
    );

    GuardrailResult {
        guardrail: guardrail.name().to_owned(),
        run_mode: guardrail.run_mode(),
        output_info: output.output_info,
        tripwire_triggered: output.tripwire_triggered,
        errored,
        duration_ms,
    }
}

/// The first tripped verdict, in log order
pub fn first_tripped(results: &[GuardrailResult]) -> Option<&GuardrailResult> {
    results.iter().find(|r| r.tripwire_triggered)
}

/// Reject unless every guardrail passed
pub(crate) fn verdict(results: &[GuardrailResult]) -> Result<()> {
    match first_tripped(results) {
        Some(tripped) => Err(AgentError::guardrail_rejected(
            tripped.guardrail.clone(),
            tripped.output_info.clone(),
            results.to_vec(),
        )),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, tripped: bool) -> GuardrailResult {
        GuardrailResult {
            guardrail: name.into(),
            run_mode: RunMode::Blocking,
            output_info: json!({ "name": name }),
            tripwire_triggered: tripped,
            errored: false,
            duration_ms: 0,
        }
    }

    #[test]
    fn test_first_trip_wins_and_log_is_kept() {
        let results = vec![result("a", false), result("b", true), result("c", true)];
        let err = verdict(&results).unwrap_err();
        let rejection = err.rejection().unwrap();
        assert_eq!(rejection.guardrail, "b");
        assert_eq!(rejection.output_info, json!({ "name": "b" }));
        assert_eq!(rejection.results.len(), 3);
    }

    #[test]
    fn test_all_pass() {
        assert!(verdict(&[result("a", false)]).is_ok());
        assert!(verdict(&[]).is_ok());
    }

    #[test]
    fn test_default_mode_is_blocking() {
        assert_eq!(RunMode::default(), RunMode::Blocking);
    }
}
