//! Run Context
//!
//! The caller-supplied value shared by every tool call and guardrail check in
//! one run tree. Nested agent runs receive a handle to the *same* value.
//!
//! The runner never locks the context. If tools mutate it concurrently, the
//! caller's type must provide its own synchronization (e.g. a `Mutex` field).

use std::ops::Deref;
use std::sync::Arc;

use tokio::time::Instant;
use uuid::Uuid;

use crate::runner::Runner;

/// Per-run handle to the shared context plus run metadata
pub struct RunContext<C> {
    state: Arc<C>,
    runner: Runner,
    run_id: Uuid,
    depth: usize,
    deadline: Option<Instant>,
}

impl<C> RunContext<C> {
    pub(crate) fn new(state: Arc<C>, runner: Runner, deadline: Option<Instant>) -> Self {
        Self {
            state,
            runner,
            run_id: Uuid::new_v4(),
            depth: 0,
            deadline,
        }
    }

    /// Context for a nested run: same state and deadline, fresh run id
    pub(crate) fn child(&self, depth: usize) -> Self {
        Self {
            state: Arc::clone(&self.state),
            runner: self.runner.clone(),
            run_id: Uuid::new_v4(),
            depth,
            deadline: self.deadline,
        }
    }

    /// The caller's context value
    pub fn state(&self) -> &C {
        &self.state
    }

    /// A shared handle to the caller's context value
    pub fn shared(&self) -> Arc<C> {
        Arc::clone(&self.state)
    }

    /// The runner driving this run; used for nested agent runs
    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Nesting depth; the top-level run is 0
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Deadline shared by the whole run tree, if a timeout was configured
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline
    pub fn remaining(&self) -> Option<std::time::Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

impl<C> Clone for RunContext<C> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            runner: self.runner.clone(),
            run_id: self.run_id,
            depth: self.depth,
            deadline: self.deadline,
        }
    }
}

impl<C> Deref for RunContext<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.state
    }
}

impl<C> std::fmt::Debug for RunContext<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("depth", &self.depth)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}
