//! # primflow-core
//!
//! Workflow execution engine for primflow.
//!
//! This crate provides:
//! - State graph definitions and versioned catalogs
//! - The primitive contract and registry
//! - Chain execution with short-circuit on failure
//! - Per-state execution and transition selection
//! - The driving loop that walks a graph to completion

pub mod chain;
pub mod context;
pub mod definition;
pub mod error;
pub mod executor;
pub mod primitive;
pub mod registry;
pub mod runner;

pub use chain::{ChainExecutor, ChainOutcome};
pub use context::ExecutionContext;
pub use definition::{Catalog, CatalogIssue, IssueSeverity, PrimitiveChain, StateDefinition, Transitions};
pub use error::{CoreError, PrimitiveError, RunError, StateError};
pub use executor::{StateExecutor, StateOutcome, StateStatus};
pub use primitive::{from_fn, FnPrimitive, Primitive, PrimitiveResult};
pub use registry::PrimitiveRegistry;
pub use runner::{RunReport, StepRecord, Termination, WorkflowRunner};
