//! State graph definition types.
//!
//! Graphs use a JSON document, either a bare list of states or the editor's
//! flow document keyed by name:
//!
//! ```json
//! {
//!   "states": {
//!     "OrderReceived": {
//!       "name": "OrderReceived",
//!       "preliminaryActions": [
//!         {"primitives": ["validateOrder", "checkInventory"], "executionOrder": 1}
//!       ],
//!       "mainAction": "processPayment",
//!       "transitions": {"success": "OrderFulfillment", "failure": "OrderCancelled"}
//!     }
//!   }
//! }
//! ```

use crate::error::CoreError;
use crate::registry::PrimitiveRegistry;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// An ordered list of primitive names run back to back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimitiveChain {
    /// Primitive names, executed strictly in this order.
    #[serde(default)]
    pub primitives: Vec<String>,

    /// Position of this chain among the state's preliminary actions.
    #[serde(default)]
    pub execution_order: i64,
}

impl PrimitiveChain {
    pub fn new<I, S>(primitives: I, execution_order: i64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            primitives: primitives.into_iter().map(Into::into).collect(),
            execution_order,
        }
    }

    /// A chain holding a single primitive.
    pub fn single(primitive: impl Into<String>) -> Self {
        Self {
            primitives: vec![primitive.into()],
            execution_order: 0,
        }
    }
}

/// Outgoing edges of a state. An empty target is terminal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transitions {
    #[serde(default)]
    pub success: String,
    #[serde(default)]
    pub failure: String,
}

impl Transitions {
    pub fn new(success: impl Into<String>, failure: impl Into<String>) -> Self {
        Self {
            success: success.into(),
            failure: failure.into(),
        }
    }

    /// The success target, `None` when terminal.
    pub fn on_success(&self) -> Option<&str> {
        non_empty(&self.success)
    }

    /// The failure target, `None` when terminal.
    pub fn on_failure(&self) -> Option<&str> {
        non_empty(&self.failure)
    }
}

/// A named node of the workflow graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDefinition {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub preliminary_actions: Vec<PrimitiveChain>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_action: Option<String>,

    #[serde(default)]
    pub transitions: Transitions,
}

impl StateDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_chain(mut self, chain: PrimitiveChain) -> Self {
        self.preliminary_actions.push(chain);
        self
    }

    pub fn with_main_action(mut self, primitive: impl Into<String>) -> Self {
        self.main_action = Some(primitive.into());
        self
    }

    pub fn with_transitions(mut self, success: impl Into<String>, failure: impl Into<String>) -> Self {
        self.transitions = Transitions::new(success, failure);
        self
    }

    /// The main action, treating an empty name as absent.
    pub fn main_action(&self) -> Option<&str> {
        self.main_action.as_deref().and_then(non_empty)
    }

    /// Preliminary chains in ascending `execution_order`, ties kept in
    /// declaration order.
    pub fn ordered_chains(&self) -> Vec<&PrimitiveChain> {
        let mut chains: Vec<&PrimitiveChain> = self.preliminary_actions.iter().collect();
        chains.sort_by_key(|c| c.execution_order);
        chains
    }

    /// Every primitive name this state references, in execution order.
    pub fn referenced_primitives(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .ordered_chains()
            .into_iter()
            .flat_map(|c| c.primitives.iter().map(String::as_str))
            .collect();
        if let Some(main) = self.main_action() {
            names.push(main);
        }
        names
    }
}

/// Severity of a catalog validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    /// The run will abort when it reaches this state.
    Error,
    /// The run will end early, silently.
    Warning,
}

/// A problem found by [`Catalog::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogIssue {
    pub severity: IssueSeverity,
    pub state: String,
    pub message: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogDocument {
    List(Vec<StateDefinition>),
    Flow { states: FlowStates },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FlowStates {
    List(Vec<StateDefinition>),
    Keyed(BTreeMap<String, StateDefinition>),
}

/// Immutable, versioned snapshot of state definitions.
///
/// A run holds one catalog for its whole lifetime. Edits happen in the store
/// and produce a new catalog with a new checksum.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    states: HashMap<String, StateDefinition>,
    checksum: String,
}

impl Catalog {
    /// Builds a catalog. Duplicate and empty names are rejected.
    pub fn new(states: impl IntoIterator<Item = StateDefinition>) -> Result<Self, CoreError> {
        let mut by_name = HashMap::new();
        for state in states {
            if state.name.is_empty() {
                return Err(CoreError::InvalidDefinition {
                    reason: "state name must not be empty".to_string(),
                });
            }
            if by_name.contains_key(&state.name) {
                return Err(CoreError::InvalidDefinition {
                    reason: format!("duplicate state '{}'", state.name),
                });
            }
            by_name.insert(state.name.clone(), state);
        }

        let checksum = compute_checksum(&by_name)?;
        Ok(Self {
            states: by_name,
            checksum,
        })
    }

    /// Parses a catalog from any of the supported JSON document shapes.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, CoreError> {
        let doc: CatalogDocument = serde_json::from_value(json.clone())?;
        let states = match doc {
            CatalogDocument::List(states) | CatalogDocument::Flow {
                states: FlowStates::List(states),
            } => states,
            CatalogDocument::Flow {
                states: FlowStates::Keyed(keyed),
            } => {
                let mut states = Vec::with_capacity(keyed.len());
                for (key, mut state) in keyed {
                    if state.name.is_empty() {
                        state.name = key;
                    } else if state.name != key {
                        return Err(CoreError::InvalidDefinition {
                            reason: format!(
                                "state keyed as '{}' is named '{}'",
                                key, state.name
                            ),
                        });
                    }
                    states.push(state);
                }
                states
            }
        };
        Self::new(states)
    }

    pub fn get(&self, name: &str) -> Option<&StateDefinition> {
        self.states.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    /// crc32c over the canonical JSON of the catalog. Independent of the
    /// order states were supplied in.
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// State names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.states.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// States sorted by name.
    pub fn states(&self) -> Vec<&StateDefinition> {
        let mut states: Vec<&StateDefinition> = self.states.values().collect();
        states.sort_by(|a, b| a.name.cmp(&b.name));
        states
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Checks references that the engine itself never enforces.
    ///
    /// Unknown primitives are errors: the run aborts when it gets there.
    /// Transition targets naming no state are warnings: the run just ends,
    /// which is legitimate for terminal labels like `OrderCompleted`.
    pub fn validate(&self, registry: &PrimitiveRegistry) -> Vec<CatalogIssue> {
        let mut issues = Vec::new();

        for state in self.states() {
            for primitive in state.referenced_primitives() {
                if !registry.contains(primitive) {
                    issues.push(CatalogIssue {
                        severity: IssueSeverity::Error,
                        state: state.name.clone(),
                        message: format!("unknown primitive '{}'", primitive),
                    });
                }
            }

            for (label, target) in [
                ("success", state.transitions.on_success()),
                ("failure", state.transitions.on_failure()),
            ] {
                if let Some(target) = target {
                    if !self.contains(target) {
                        issues.push(CatalogIssue {
                            severity: IssueSeverity::Warning,
                            state: state.name.clone(),
                            message: format!(
                                "{} transition targets '{}', which is not a defined state",
                                label, target
                            ),
                        });
                    }
                }
            }
        }

        issues
    }

    /// Returns the catalog as a JSON list of states, sorted by name.
    pub fn to_json(&self) -> Result<serde_json::Value, CoreError> {
        Ok(serde_json::to_value(self.states())?)
    }
}

fn compute_checksum(states: &HashMap<String, StateDefinition>) -> Result<String, CoreError> {
    let sorted: BTreeMap<&String, &StateDefinition> = states.iter().collect();
    let bytes = serde_json::to_vec(&sorted)?;
    Ok(format!("{:08x}", crc32c::crc32c(&bytes)))
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
