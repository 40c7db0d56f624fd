//! # Graph
//!
//! The top-level container. Besides the shared construction surface of
//! [`FlowGraphContainer`] it forwards the run controls to the engine: how the
//! engine schedules the committed graph is its own business.
//!
//! ## Example
//!
//! ```rust
//! use portweave::engine::{BlockSpec, MemoryEngine};
//! use portweave::graph::{FlowGraphContainer, Graph};
//! use portweave::orchestrator::ConnectionOrchestrator;
//! use portweave::endpoints;
//! use std::sync::Arc;
//!
//! let engine = Arc::new(MemoryEngine::new());
//! let source = engine.add_block(BlockSpec::source("source"));
//! let filter = engine.add_block(BlockSpec::new("filter"));
//! let sink = engine.add_block(BlockSpec::sink("sink"));
//!
//! let orchestrator = Arc::new(ConnectionOrchestrator::new(engine.clone()));
//! let graph = Graph::new(orchestrator, "top")?;
//! graph.connect(&endpoints![source, filter, sink])?;
//! graph.msg_connect(filter, "status", sink, "control")?;
//! graph.unlock()?;
//! assert_eq!(engine.committed_edges(graph.id()).len(), 3);
//! # Ok::<(), portweave::error::GraphError>(())
//! ```

use super::container::{ContainerCore, FlowGraphContainer};
use crate::engine::{Engine, RunConfig};
use crate::error::GraphResult;
use crate::orchestrator::ConnectionOrchestrator;
use std::sync::Arc;
use tracing::info;

/// Top-level flowgraph container.
#[derive(Debug)]
pub struct Graph<E: Engine> {
  core: ContainerCore<E>,
  max_output_items: Option<usize>,
}

impl<E: Engine> Graph<E> {
  /// Creates an empty top-level graph named `name`.
  ///
  /// The initial `max_output_items` comes from the orchestrator configuration.
  pub fn new(orchestrator: Arc<ConnectionOrchestrator<E>>, name: &str) -> GraphResult<Self> {
    let max_output_items = orchestrator.config().maximum_output_items;
    Ok(Self {
      core: ContainerCore::new(orchestrator, name)?,
      max_output_items,
    })
  }

  /// Upper bound on items produced per work call, if one is set.
  pub fn max_output_items(&self) -> Option<usize> {
    self.max_output_items
  }

  /// Sets the per-call output bound and pushes it to the engine.
  pub fn set_max_output_items(&mut self, max_items: usize) -> GraphResult<()> {
    self.max_output_items = Some(max_items);
    self.configure()
  }

  fn configure(&self) -> GraphResult<()> {
    let config = RunConfig {
      maximum_output_items: self.max_output_items,
    };
    self.core.orchestrator().engine().configure(self.core.id(), &config)?;
    Ok(())
  }

  /// Commits pending mutations, applies tuning and starts the engine.
  pub fn start(&mut self, max_items: Option<usize>) -> GraphResult<()> {
    if let Some(max_items) = max_items {
      self.max_output_items = Some(max_items);
    }
    self.unlock()?;
    self.configure()?;
    self.core.orchestrator().engine().start(self.core.id())?;
    info!(
      container = %self.core.id(),
      max_output_items = ?self.max_output_items,
      "graph started"
    );
    Ok(())
  }

  /// [`Self::start`] followed by [`Self::wait`].
  pub fn run(&mut self, max_items: Option<usize>) -> GraphResult<()> {
    self.start(max_items)?;
    self.wait()
  }

  /// Asks the engine to stop the graph.
  pub fn stop(&self) -> GraphResult<()> {
    self.core.orchestrator().engine().stop(self.core.id())?;
    info!(container = %self.core.id(), "graph stopped");
    Ok(())
  }

  /// Blocks until the engine reports the graph finished.
  pub fn wait(&self) -> GraphResult<()> {
    self.core.orchestrator().engine().wait(self.core.id())?;
    Ok(())
  }
}

impl<E: Engine> FlowGraphContainer for Graph<E> {
  type Engine = E;

  fn core(&self) -> &ContainerCore<E> {
    &self.core
  }
}
