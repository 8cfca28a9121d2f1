//! Deterministic model doubles for tests and offline runs.
//!
//! [`ScriptedModel`] replays a fixed list of turns or answers through a
//! closure; [`StaticProvider`] hands the same model out for every hint.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AgentError, Result};
use crate::provider::{Completion, Model, ModelProvider, ModelRequest};

type Responder = dyn Fn(&ModelRequest) -> Result<Completion> + Send + Sync;

enum Script {
    Turns(Mutex<VecDeque<Result<Completion>>>),
    Responder(Box<Responder>),
}

/// A model whose answers are fixed in advance
pub struct ScriptedModel {
    name: String,
    script: Script,
    delay: Option<Duration>,
    calls: AtomicUsize,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    /// Replay `turns` in order; an exhausted script is a provider error
    pub fn new(turns: Vec<Completion>) -> Self {
        Self::from_results(turns.into_iter().map(Ok).collect())
    }

    /// Replay turns that may include backend failures
    pub fn from_results(turns: Vec<Result<Completion>>) -> Self {
        Self::with_script(Script::Turns(Mutex::new(turns.into())))
    }

    /// Answer every request with `responder`
    pub fn from_fn(
        responder: impl Fn(&ModelRequest) -> Result<Completion> + Send + Sync + 'static,
    ) -> Self {
        Self::with_script(Script::Responder(Box::new(responder)))
    }

    fn with_script(script: Script) -> Self {
        Self {
            name: "scripted".into(),
            script,
            delay: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sleep before every answer
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of turns requested so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request received, in arrival order
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next_turn(&self, request: &ModelRequest) -> Result<Completion> {
        match &self.script {
            Script::Responder(responder) => responder(request),
            Script::Turns(turns) => turns
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front()
                .unwrap_or_else(|| Err(AgentError::Provider("script exhausted".into()))),
        }
    }
}

#[async_trait]
impl Model for ScriptedModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn respond(&self, request: &ModelRequest) -> Result<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut completion = self.next_turn(request)?;
        if completion.model.is_empty() {
            completion.model.clone_from(&self.name);
        }
        Ok(completion)
    }
}

/// Provider that serves one model regardless of hint, recording the hints
pub struct StaticProvider {
    model: Arc<dyn Model>,
    hints: Mutex<Vec<Option<String>>>,
}

impl StaticProvider {
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self {
            model,
            hints: Mutex::new(Vec::new()),
        }
    }

    /// Hints passed to [`ModelProvider::get_model`], in call order
    pub fn hints(&self) -> Vec<Option<String>> {
        self.hints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ModelProvider for StaticProvider {
    fn name(&self) -> &str {
        "static"
    }

    fn get_model(&self, name_hint: Option<&str>) -> Result<Arc<dyn Model>> {
        self.hints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(name_hint.map(str::to_owned));
        Ok(Arc::clone(&self.model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[tokio::test]
    async fn test_script_replays_then_exhausts() {
        let model = ScriptedModel::new(vec![Completion::text("one")]);
        let request = ModelRequest::new(vec![Message::user("hi")]);

        let first = model.respond(&request).await.unwrap();
        assert_eq!(first.content, "one");
        assert_eq!(first.model, "scripted");

        let err = model.respond(&request).await.unwrap_err();
        assert!(matches!(err, AgentError::Provider(msg) if msg == "script exhausted"));
        assert_eq!(model.call_count(), 2);
        assert_eq!(model.requests().len(), 2);
    }

    #[test]
    fn test_static_provider_records_hints() {
        let provider = StaticProvider::new(Arc::new(ScriptedModel::new(Vec::new())));
        provider.get_model(None).unwrap();
        provider.get_model(Some("gpt-4o")).unwrap();
        assert_eq!(provider.hints(), vec![None, Some("gpt-4o".to_owned())]);
    }
}
