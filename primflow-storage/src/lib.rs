//! # primflow-storage
//!
//! Storage layer for primflow.
//!
//! This crate provides:
//! - Directory-backed persistence of state definitions
//! - Editor decorations (node position, drawn edges) stored alongside
//! - Checksummed writes that detect corruption on open
//! - Catalog snapshots for the engine

pub mod error;
pub mod store;

pub use error::StorageError;
pub use store::{Edge, GraphStore, Position, StoreMeta, StoredState};
