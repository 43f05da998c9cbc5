//! State execution - runs one state and picks its transition.

use crate::chain::{ChainExecutor, ChainOutcome};
use crate::context::ExecutionContext;
use crate::definition::{Catalog, PrimitiveChain, StateDefinition};
use crate::error::{CoreError, StateError};
use crate::primitive::PrimitiveResult;
use crate::registry::PrimitiveRegistry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How a state ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StateStatus {
    /// All preliminary chains and the main action succeeded.
    Succeeded,
    /// A primitive reported failure.
    Failed {
        primitive: String,
        result: PrimitiveResult,
    },
    /// The state is not in the catalog.
    NotFound,
}

impl StateStatus {
    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            StateStatus::Succeeded => "succeeded",
            StateStatus::Failed { .. } => "failed",
            StateStatus::NotFound => "not_found",
        }
    }
}

/// Result of executing one state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateOutcome {
    pub state: String,
    /// Where the graph goes next. `None` is terminal.
    pub next_state: Option<String>,
    #[serde(flatten)]
    pub status: StateStatus,
}

/// Executes states from a catalog.
#[derive(Debug, Clone)]
pub struct StateExecutor {
    catalog: Arc<Catalog>,
    chains: ChainExecutor,
}

impl StateExecutor {
    pub fn new(catalog: Arc<Catalog>, registry: Arc<PrimitiveRegistry>) -> Self {
        Self {
            catalog,
            chains: ChainExecutor::new(registry),
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn registry(&self) -> &Arc<PrimitiveRegistry> {
        self.chains.registry()
    }

    /// Executes the state called `name`.
    ///
    /// Preliminary chains run in ascending `executionOrder`, then the main
    /// action. The first failure selects the failure transition and nothing
    /// after it runs. An unknown name is a terminal no-op, not an error.
    pub fn execute_state(
        &self,
        name: &str,
        ctx: &mut ExecutionContext,
    ) -> Result<StateOutcome, StateError> {
        let Some(state) = self.catalog.get(name) else {
            tracing::warn!("State '{}' is not defined; treating as terminal", name);
            return Ok(StateOutcome {
                state: name.to_string(),
                next_state: None,
                status: StateStatus::NotFound,
            });
        };

        tracing::debug!("Executing state '{}'", name);

        for chain in state.ordered_chains() {
            if let Some(outcome) = self.run_chain(state, chain, ctx)? {
                return Ok(outcome);
            }
        }

        if let Some(main) = state.main_action() {
            let chain = PrimitiveChain::single(main);
            if let Some(outcome) = self.run_chain(state, &chain, ctx)? {
                return Ok(outcome);
            }
        }

        Ok(StateOutcome {
            state: state.name.clone(),
            next_state: state.transitions.on_success().map(str::to_string),
            status: StateStatus::Succeeded,
        })
    }

    /// Runs one chain. Returns the state's final outcome if the chain failed,
    /// `None` if the state should carry on.
    fn run_chain(
        &self,
        state: &StateDefinition,
        chain: &PrimitiveChain,
        ctx: &mut ExecutionContext,
    ) -> Result<Option<StateOutcome>, StateError> {
        let failure = state.transitions.on_failure().map(str::to_string);

        match self.chains.execute(chain, ctx) {
            Ok(ChainOutcome::Completed) => Ok(None),
            Ok(ChainOutcome::Failed { primitive, result }) => Ok(Some(StateOutcome {
                state: state.name.clone(),
                next_state: failure,
                status: StateStatus::Failed { primitive, result },
            })),
            Err(source) => Err(self.abort(state, failure, source)),
        }
    }

    fn abort(&self, state: &StateDefinition, failure: Option<String>, source: CoreError) -> StateError {
        tracing::error!("State '{}' aborted: {}", state.name, source);
        StateError {
            state: state.name.clone(),
            failure_transition: failure,
            source,
        }
    }
}
