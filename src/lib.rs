//! # portweave
//!
//! Flowgraph construction over an index-addressed stream engine.
//!
//! Blocks in the graph expose two kinds of ports: real stream ports, which the
//! engine addresses by dense integer index, and message ports, which callers
//! address by name. portweave reconciles the two:
//!
//! - **Stable indices**: every message port name gets an index above the
//!   block's real ports on first use and keeps it
//!   ([`registry::PortIndexRegistry`]).
//! - **Allocate, then connect**: the engine materializes port storage lazily,
//!   so every edge is preceded by a disposable probe connection that forces
//!   allocation ([`orchestrator::ConnectionOrchestrator`], [`probe`]).
//! - **Batch commit**: containers apply mutations immediately and make them
//!   active in one engine commit at `unlock` ([`graph`]).
//!
//! ## Quick Start
//!
//! ```rust
//! use portweave::engine::{BlockSpec, MemoryEngine};
//! use portweave::graph::{FlowGraphContainer, Graph};
//! use portweave::orchestrator::ConnectionOrchestrator;
//! use portweave::endpoints;
//! use std::sync::Arc;
//!
//! let engine = Arc::new(MemoryEngine::new());
//! let src = engine.add_block(BlockSpec::source("src"));
//! let dst = engine.add_block(BlockSpec::sink("dst"));
//!
//! let graph = Graph::new(Arc::new(ConnectionOrchestrator::new(engine)), "top")?;
//! graph.lock();
//! graph.connect(&endpoints![src, dst])?;
//! graph.unlock()?;
//! # Ok::<(), portweave::error::GraphError>(())
//! ```

#![deny(missing_docs)]

/// Block handles, port selectors and edges.
pub mod block;
/// Graph construction configuration.
pub mod config;
/// Execution engine boundary and the in-memory reference engine.
pub mod engine;
/// Error types for graph construction.
pub mod error;
/// Top-level and nested flowgraph containers.
pub mod graph;
/// Macros for endpoint lists.
pub mod graph_macros;
/// Connection orchestration: allocate-then-connect.
pub mod orchestrator;
/// Allocation probe strategies.
pub mod probe;
/// Per-block message port index registries.
pub mod registry;

pub use block::{BlockId, Direction, Edge, Endpoint, PortRef, PortSelector, StreamPort};
pub use config::GraphConfig;
pub use engine::{Engine, EngineError};
pub use error::{GraphError, GraphResult};
pub use graph::{FlowGraphContainer, Graph, Subgraph};
pub use orchestrator::ConnectionOrchestrator;
pub use registry::{ConfigurationError, PortIndexRegistry};

#[cfg(test)]
mod orchestrator_test;
#[cfg(test)]
mod test_support;
