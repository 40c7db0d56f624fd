//! # Flowgraph Containers
//!
//! The construction surface shared by top-level graphs and nested subgraphs.
//! Both wrap an engine container and route every mutation through the
//! [`ConnectionOrchestrator`], so the allocate-then-connect protocol and the
//! per-block port registries behave the same at every level of nesting.
//!
//! ## Build State
//!
//! ```text
//! Unbuilt --connect/disconnect--> Mutating --unlock--> Committed
//!                                    ^                     |
//!                                    +--connect/disconnect-+
//! ```
//!
//! Mutations apply to the engine immediately but only become active in the
//! running graph at `unlock`, which issues one engine commit.

use crate::block::{BlockId, Edge, Endpoint};
use crate::engine::Engine;
use crate::error::GraphResult;
use crate::orchestrator::ConnectionOrchestrator;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::{debug, info, trace, warn};

/// Construction state of a container.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildState {
  /// No mutation has been made yet.
  Unbuilt,
  /// Mutations were made since the last commit.
  Mutating,
  /// Every mutation so far has been committed.
  Committed,
}

impl BuildState {
  fn as_u8(self) -> u8 {
    match self {
      BuildState::Unbuilt => 0,
      BuildState::Mutating => 1,
      BuildState::Committed => 2,
    }
  }

  fn from_u8(value: u8) -> Self {
    match value {
      1 => BuildState::Mutating,
      2 => BuildState::Committed,
      _ => BuildState::Unbuilt,
    }
  }
}

/// State shared by every container kind: the engine container it wraps, its
/// name, the orchestrator and the build state.
///
/// Dropping the core releases the engine container.
pub struct ContainerCore<E: Engine> {
  id: BlockId,
  name: String,
  orchestrator: Arc<ConnectionOrchestrator<E>>,
  state: AtomicU8,
}

impl<E: Engine> ContainerCore<E> {
  /// Creates the engine container `name`.
  pub fn new(orchestrator: Arc<ConnectionOrchestrator<E>>, name: &str) -> GraphResult<Self> {
    let id = orchestrator.engine().create_container(name)?;
    debug!(%id, name, "container created");
    Ok(Self {
      id,
      name: name.to_string(),
      orchestrator,
      state: AtomicU8::new(BuildState::Unbuilt.as_u8()),
    })
  }

  /// Handle of the engine container.
  pub fn id(&self) -> BlockId {
    self.id
  }

  /// Container name.
  pub fn name(&self) -> &str {
    &self.name
  }

  /// Orchestrator all mutations go through.
  pub fn orchestrator(&self) -> &Arc<ConnectionOrchestrator<E>> {
    &self.orchestrator
  }

  /// Current build state.
  pub fn state(&self) -> BuildState {
    BuildState::from_u8(self.state.load(Ordering::Acquire))
  }

  fn set_state(&self, state: BuildState) {
    self.state.store(state.as_u8(), Ordering::Release);
  }

  /// Records that a mutation is about to be issued.
  pub fn mark_mutating(&self) {
    self.set_state(BuildState::Mutating);
  }

  /// Commits pending mutations to the engine.
  pub fn commit(&self) -> GraphResult<()> {
    if let Err(err) = self.orchestrator.engine().commit(self.id) {
      warn!(container = %self.id, name = %self.name, error = %err, "commit rejected");
      return Err(err.into());
    }
    self.set_state(BuildState::Committed);
    info!(container = %self.id, name = %self.name, "graph committed");
    Ok(())
  }
}

impl<E: Engine> fmt::Debug for ContainerCore<E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ContainerCore")
      .field("id", &self.id)
      .field("name", &self.name)
      .field("state", &self.state())
      .finish_non_exhaustive()
  }
}

impl<E: Engine> Drop for ContainerCore<E> {
  fn drop(&mut self) {
    trace!(id = %self.id, name = %self.name, "container released");
    self.orchestrator.engine().release_container(self.id);
    self.orchestrator.forget_block(self.id);
  }
}

/// Public graph-construction surface.
///
/// Implementors only provide [`FlowGraphContainer::core`]; every operation is
/// shared.
pub trait FlowGraphContainer {
  /// Engine the container is built on.
  type Engine: Engine;

  /// Shared container state.
  fn core(&self) -> &ContainerCore<Self::Engine>;

  /// Handle of the container; usable as an endpoint inside itself (export
  /// wiring) or inside a parent container.
  fn id(&self) -> BlockId {
    self.core().id()
  }

  /// Container name.
  fn name(&self) -> &str {
    self.core().name()
  }

  /// Current build state.
  fn state(&self) -> BuildState {
    self.core().state()
  }

  /// Wires `endpoints[0] -> endpoints[1] -> …`, probing each edge first.
  ///
  /// A single endpoint adds that block to the container without wiring it.
  fn connect(&self, endpoints: &[Endpoint]) -> GraphResult<Vec<Edge>> {
    let core = self.core();
    core.mark_mutating();
    core.orchestrator().connect_chain(core.id(), endpoints)
  }

  /// Unwires `endpoints[0] -> endpoints[1] -> …`.
  fn disconnect(&self, endpoints: &[Endpoint]) -> GraphResult<Vec<Edge>> {
    let core = self.core();
    core.mark_mutating();
    core.orchestrator().disconnect_chain(core.id(), endpoints)
  }

  /// Connects message port `src_port` of `src` to `dst_port` of `dst`.
  fn msg_connect(
    &self,
    src: BlockId,
    src_port: &str,
    dst: BlockId,
    dst_port: &str,
  ) -> GraphResult<Edge> {
    let core = self.core();
    core.mark_mutating();
    core
      .orchestrator()
      .msg_connect(core.id(), src, src_port, dst, dst_port)
  }

  /// Disconnects a message edge.
  fn msg_disconnect(
    &self,
    src: BlockId,
    src_port: &str,
    dst: BlockId,
    dst_port: &str,
  ) -> GraphResult<Edge> {
    let core = self.core();
    core.mark_mutating();
    core
      .orchestrator()
      .msg_disconnect(core.id(), src, src_port, dst, dst_port)
  }

  /// Removes every edge and block from the container.
  fn disconnect_all(&self) -> GraphResult<()> {
    let core = self.core();
    core.mark_mutating();
    core.orchestrator().engine().disconnect_all(core.id())?;
    Ok(())
  }

  /// Begins a batch of mutations. The engine is never torn down here;
  /// mutations apply as they are made and become active at [`Self::unlock`].
  fn lock(&self) {
    trace!(container = %self.id(), "lock");
  }

  /// Commits every mutation since the previous commit.
  fn unlock(&self) -> GraphResult<()> {
    self.core().commit()
  }
}
