//! Driving loop - walks a state graph from an initial state to a terminal
//! condition.

use crate::context::ExecutionContext;
use crate::error::RunError;
use crate::executor::{StateExecutor, StateOutcome, StateStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// One executed state within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub state: String,
    pub next_state: Option<String>,
    #[serde(flatten)]
    pub status: StateStatus,
}

impl From<StateOutcome> for StepRecord {
    fn from(outcome: StateOutcome) -> Self {
        Self {
            state: outcome.state,
            next_state: outcome.next_state,
            status: outcome.status,
        }
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Termination {
    /// A state returned no next state.
    Completed {
        #[serde(rename = "lastState")]
        last_state: String,
    },
    /// The next state is one of the caller's halt labels. It was not executed.
    Halted { state: String },
    /// The caller's step budget ran out.
    StepBudgetExhausted { steps: usize },
}

impl Termination {
    pub fn label(&self) -> &'static str {
        match self {
            Termination::Completed { .. } => "completed",
            Termination::Halted { .. } => "halted",
            Termination::StepBudgetExhausted { .. } => "step_budget_exhausted",
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: String,
    pub catalog_checksum: String,
    pub steps: Vec<StepRecord>,
    pub termination: Termination,
}

/// Drives a workflow from an initial state.
///
/// Each call to [`run`](WorkflowRunner::run) is sequential and works on the
/// caller's context. The runner itself is shareable across threads; separate
/// runs need separate contexts.
#[derive(Debug, Clone)]
pub struct WorkflowRunner {
    executor: StateExecutor,
    halt_states: HashSet<String>,
    max_steps: Option<usize>,
}

impl WorkflowRunner {
    pub fn new(executor: StateExecutor) -> Self {
        Self {
            executor,
            halt_states: HashSet::new(),
            max_steps: None,
        }
    }

    /// Stops the run before entering any of these states.
    pub fn with_halt_states<I, S>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.halt_states.extend(states.into_iter().map(Into::into));
        self
    }

    /// Stops the run after `max` executed states. Without it a cyclic graph
    /// runs until a primitive breaks the cycle.
    pub fn with_max_steps(mut self, max: usize) -> Self {
        self.max_steps = Some(max);
        self
    }

    pub fn executor(&self) -> &StateExecutor {
        &self.executor
    }

    /// Runs the graph from `initial` until a terminal condition.
    pub fn run(&self, initial: &str, ctx: &mut ExecutionContext) -> Result<RunReport, RunError> {
        let run_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("run", run_id = %run_id);
        let _enter = span.enter();

        let catalog_checksum = self.executor.catalog().checksum().to_string();
        tracing::info!("Starting run at '{}' (catalog {})", initial, catalog_checksum);

        let mut steps: Vec<StepRecord> = Vec::new();
        let mut current = initial.to_string();

        let termination = loop {
            if let Some(max) = self.max_steps {
                if steps.len() >= max {
                    tracing::warn!("Step budget of {} exhausted at '{}'", max, current);
                    break Termination::StepBudgetExhausted { steps: steps.len() };
                }
            }

            let outcome = match self.executor.execute_state(&current, ctx) {
                Ok(outcome) => outcome,
                Err(source) => {
                    tracing::error!("Run aborted in state '{}': {}", current, source.source);
                    return Err(RunError {
                        run_id,
                        steps,
                        source,
                    });
                }
            };

            tracing::info!(
                "State '{}' {} -> {}",
                outcome.state,
                outcome.status.label(),
                outcome.next_state.as_deref().unwrap_or("<end>")
            );

            let next = outcome.next_state.clone();
            steps.push(outcome.into());

            match next {
                None => break Termination::Completed { last_state: current },
                Some(next) if self.halt_states.contains(&next) => {
                    break Termination::Halted { state: next };
                }
                Some(next) => current = next,
            }
        };

        tracing::info!("Run finished after {} step(s): {}", steps.len(), termination.label());

        Ok(RunReport {
            run_id,
            catalog_checksum,
            steps,
            termination,
        })
    }
}
