//! # In-Memory Engine
//!
//! A reference [`Engine`] that keeps the graph as plain edge sets. It models
//! the behaviour the orchestrator depends on:
//!
//! - ports are materialized lazily, on the first `connect` that references them
//! - blocks may be one-sided (`max_inputs` or `max_outputs` of `Some(0)`) and
//!   reject the missing direction with [`EngineError::UnsupportedDirection`]
//! - mutations are staged per container and only become active on `commit`
//! - a block's declared capacity counts its real stream ports; indices past
//!   it are message ports, valid at commit only if every index from the
//!   capacity up to them has been materialized
//!
//! Every call is recorded as an [`EngineCall`] so the sequence issued by the
//! orchestrator can be inspected.

use super::{Engine, EngineError, RunConfig};
use crate::block::{BlockId, Direction, Edge, StreamPort};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// Port capacity of a block registered with [`MemoryEngine`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockSpec {
  /// Display name.
  pub name: String,
  /// Number of real input ports; `Some(0)` means the block is a pure source,
  /// `None` means unbounded. Message ports are allocated past it.
  pub max_inputs: Option<usize>,
  /// Number of real output ports; `Some(0)` means the block is a pure sink,
  /// `None` means unbounded. Message ports are allocated past it.
  pub max_outputs: Option<usize>,
}

impl BlockSpec {
  /// A block with unbounded ports on both sides.
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      max_inputs: None,
      max_outputs: None,
    }
  }

  /// A block without inputs.
  pub fn source(name: impl Into<String>) -> Self {
    Self::new(name).with_inputs(0)
  }

  /// A block without outputs.
  pub fn sink(name: impl Into<String>) -> Self {
    Self::new(name).with_outputs(0)
  }

  /// Fixes the number of real input ports.
  pub fn with_inputs(mut self, count: usize) -> Self {
    self.max_inputs = Some(count);
    self
  }

  /// Fixes the number of real output ports.
  pub fn with_outputs(mut self, count: usize) -> Self {
    self.max_outputs = Some(count);
    self
  }

  fn capacity(&self, direction: Direction) -> Option<usize> {
    match direction {
      Direction::Input => self.max_inputs,
      Direction::Output => self.max_outputs,
    }
  }
}

/// One call received by [`MemoryEngine`], in arrival order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineCall {
  /// `create_container`
  CreateContainer {
    /// Handle handed out.
    container: BlockId,
    /// Requested name.
    name: String,
  },
  /// `release_container`
  ReleaseContainer(BlockId),
  /// `connect`
  Connect {
    /// Target container.
    container: BlockId,
    /// Requested edge.
    edge: Edge,
  },
  /// `disconnect`
  Disconnect {
    /// Target container.
    container: BlockId,
    /// Requested edge.
    edge: Edge,
  },
  /// `connect_block`
  ConnectBlock {
    /// Target container.
    container: BlockId,
    /// Lone block.
    block: BlockId,
  },
  /// `disconnect_block`
  DisconnectBlock {
    /// Target container.
    container: BlockId,
    /// Lone block.
    block: BlockId,
  },
  /// `disconnect_all`
  DisconnectAll(BlockId),
  /// `commit`
  Commit(BlockId),
  /// `configure`
  Configure {
    /// Target container.
    container: BlockId,
    /// Applied tuning.
    config: RunConfig,
  },
  /// `start`
  Start(BlockId),
  /// `stop`
  Stop(BlockId),
  /// `wait`
  Wait(BlockId),
}

impl EngineCall {
  /// The edge carried by a `Connect` or `Disconnect` call.
  pub fn edge(&self) -> Option<Edge> {
    match self {
      EngineCall::Connect { edge, .. } | EngineCall::Disconnect { edge, .. } => Some(*edge),
      _ => None,
    }
  }
}

#[derive(Debug, Default)]
struct ContainerState {
  name: String,
  pending_edges: BTreeSet<Edge>,
  pending_blocks: BTreeSet<BlockId>,
  committed_edges: BTreeSet<Edge>,
  committed_blocks: BTreeSet<BlockId>,
  config: RunConfig,
  running: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
  next_id: u64,
  blocks: HashMap<BlockId, BlockSpec>,
  containers: HashMap<BlockId, ContainerState>,
  allocated: HashMap<(BlockId, Direction), BTreeSet<usize>>,
  calls: Vec<EngineCall>,
}

impl MemoryState {
  fn next_block(&mut self, spec: BlockSpec) -> BlockId {
    self.next_id += 1;
    let id = BlockId(self.next_id);
    self.blocks.insert(id, spec);
    id
  }

  fn container_mut(&mut self, container: BlockId) -> Result<&mut ContainerState, EngineError> {
    self
      .containers
      .get_mut(&container)
      .ok_or(EngineError::UnknownContainer(container))
  }

  fn check_side(&self, block: BlockId, direction: Direction) -> Result<(), EngineError> {
    let spec = self
      .blocks
      .get(&block)
      .ok_or(EngineError::UnknownBlock(block))?;
    if spec.capacity(direction) == Some(0) {
      return Err(EngineError::UnsupportedDirection { block, direction });
    }
    Ok(())
  }

  fn check_capacity(&self, block: BlockId, direction: Direction, index: usize) -> Result<(), EngineError> {
    let spec = self
      .blocks
      .get(&block)
      .ok_or(EngineError::UnknownBlock(block))?;
    let ports = self.allocated.get(&(block, direction));
    let materialized = |index: usize| ports.is_some_and(|ports| ports.contains(&index));
    let valid = match spec.capacity(direction) {
      // Past the real ports the table only grows densely, one message port at a time.
      Some(cap) if index >= cap => (cap..=index).all(materialized),
      _ => materialized(index),
    };
    if valid {
      Ok(())
    } else {
      Err(EngineError::UnknownPort {
        block,
        direction,
        index,
      })
    }
  }
}

/// Thread-safe in-memory engine.
#[derive(Debug, Default)]
pub struct MemoryEngine {
  state: Mutex<MemoryState>,
}

impl MemoryEngine {
  /// Creates an engine with no blocks.
  pub fn new() -> Self {
    Self::default()
  }

  fn state(&self) -> MutexGuard<'_, MemoryState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Registers a processing block and returns its handle.
  pub fn add_block(&self, spec: BlockSpec) -> BlockId {
    let mut state = self.state();
    let name = spec.name.clone();
    let id = state.next_block(spec);
    trace!(%id, name = %name, "block registered");
    id
  }

  /// Every call received so far.
  pub fn calls(&self) -> Vec<EngineCall> {
    self.state().calls.clone()
  }

  /// Forgets the recorded calls.
  pub fn clear_calls(&self) {
    self.state().calls.clear();
  }

  /// Edges staged in `container`, committed or not.
  pub fn pending_edges(&self, container: BlockId) -> Vec<Edge> {
    self
      .state()
      .containers
      .get(&container)
      .map(|c| c.pending_edges.iter().copied().collect())
      .unwrap_or_default()
  }

  /// Edges active in `container` as of its last commit.
  pub fn committed_edges(&self, container: BlockId) -> Vec<Edge> {
    self
      .state()
      .containers
      .get(&container)
      .map(|c| c.committed_edges.iter().copied().collect())
      .unwrap_or_default()
  }

  /// Lone blocks active in `container` as of its last commit.
  pub fn committed_blocks(&self, container: BlockId) -> Vec<BlockId> {
    self
      .state()
      .containers
      .get(&container)
      .map(|c| c.committed_blocks.iter().copied().collect())
      .unwrap_or_default()
  }

  /// Port indices materialized on one side of `block`.
  pub fn allocated_ports(&self, block: BlockId, direction: Direction) -> Vec<usize> {
    self
      .state()
      .allocated
      .get(&(block, direction))
      .map(|ports| ports.iter().copied().collect())
      .unwrap_or_default()
  }

  /// Whether `container` currently exists.
  pub fn has_container(&self, container: BlockId) -> bool {
    self.state().containers.contains_key(&container)
  }

  /// Name a container was created with.
  pub fn container_name(&self, container: BlockId) -> Option<String> {
    self.state().containers.get(&container).map(|c| c.name.clone())
  }

  /// Tuning last applied to `container`.
  pub fn run_config(&self, container: BlockId) -> Option<RunConfig> {
    self.state().containers.get(&container).map(|c| c.config.clone())
  }

  /// Whether `container` has been started and not stopped.
  pub fn is_running(&self, container: BlockId) -> bool {
    self
      .state()
      .containers
      .get(&container)
      .is_some_and(|c| c.running)
  }
}

impl Engine for MemoryEngine {
  fn create_container(&self, name: &str) -> Result<BlockId, EngineError> {
    let mut state = self.state();
    let id = state.next_block(BlockSpec::new(name));
    state.containers.insert(
      id,
      ContainerState {
        name: name.to_string(),
        ..ContainerState::default()
      },
    );
    state.calls.push(EngineCall::CreateContainer {
      container: id,
      name: name.to_string(),
    });
    trace!(%id, name, "container created");
    Ok(id)
  }

  fn release_container(&self, container: BlockId) {
    let mut state = self.state();
    state.calls.push(EngineCall::ReleaseContainer(container));
    state.containers.remove(&container);
    state.blocks.remove(&container);
    state.allocated.retain(|(block, _), _| *block != container);
    trace!(%container, "container released");
  }

  fn connect(&self, container: BlockId, src: StreamPort, dst: StreamPort) -> Result<(), EngineError> {
    let mut state = self.state();
    let edge = Edge::new(src, dst);
    state.calls.push(EngineCall::Connect { container, edge });
    state.container_mut(container)?;
    state.check_side(src.block, Direction::Output)?;
    state.check_side(dst.block, Direction::Input)?;
    if state.container_mut(container)?.pending_edges.contains(&edge) {
      return Err(EngineError::AlreadyConnected { src, dst });
    }
    state
      .allocated
      .entry((src.block, Direction::Output))
      .or_default()
      .insert(src.index);
    state
      .allocated
      .entry((dst.block, Direction::Input))
      .or_default()
      .insert(dst.index);
    state.container_mut(container)?.pending_edges.insert(edge);
    debug!(%container, %edge, "edge staged");
    Ok(())
  }

  fn disconnect(
    &self,
    container: BlockId,
    src: StreamPort,
    dst: StreamPort,
  ) -> Result<(), EngineError> {
    let mut state = self.state();
    let edge = Edge::new(src, dst);
    state.calls.push(EngineCall::Disconnect { container, edge });
    if !state.container_mut(container)?.pending_edges.remove(&edge) {
      return Err(EngineError::NotConnected { src, dst });
    }
    debug!(%container, %edge, "edge removed");
    Ok(())
  }

  fn connect_block(&self, container: BlockId, block: BlockId) -> Result<(), EngineError> {
    let mut state = self.state();
    state.calls.push(EngineCall::ConnectBlock { container, block });
    if !state.blocks.contains_key(&block) {
      return Err(EngineError::UnknownBlock(block));
    }
    state.container_mut(container)?.pending_blocks.insert(block);
    Ok(())
  }

  fn disconnect_block(&self, container: BlockId, block: BlockId) -> Result<(), EngineError> {
    let mut state = self.state();
    state.calls.push(EngineCall::DisconnectBlock { container, block });
    if !state.container_mut(container)?.pending_blocks.remove(&block) {
      return Err(EngineError::UnknownBlock(block));
    }
    Ok(())
  }

  fn disconnect_all(&self, container: BlockId) -> Result<(), EngineError> {
    let mut state = self.state();
    state.calls.push(EngineCall::DisconnectAll(container));
    let target = state.container_mut(container)?;
    target.pending_edges.clear();
    target.pending_blocks.clear();
    Ok(())
  }

  fn commit(&self, container: BlockId) -> Result<(), EngineError> {
    let mut state = self.state();
    state.calls.push(EngineCall::Commit(container));
    let edges: Vec<Edge> = state
      .containers
      .get(&container)
      .ok_or(EngineError::UnknownContainer(container))?
      .pending_edges
      .iter()
      .copied()
      .collect();
    for edge in &edges {
      state.check_capacity(edge.src.block, Direction::Output, edge.src.index)?;
      state.check_capacity(edge.dst.block, Direction::Input, edge.dst.index)?;
    }
    let target = state.container_mut(container)?;
    target.committed_edges = target.pending_edges.clone();
    target.committed_blocks = target.pending_blocks.clone();
    debug!(%container, edges = edges.len(), "container committed");
    Ok(())
  }

  fn configure(&self, container: BlockId, config: &RunConfig) -> Result<(), EngineError> {
    let mut state = self.state();
    state.calls.push(EngineCall::Configure {
      container,
      config: config.clone(),
    });
    state.container_mut(container)?.config = config.clone();
    Ok(())
  }

  fn start(&self, container: BlockId) -> Result<(), EngineError> {
    let mut state = self.state();
    state.calls.push(EngineCall::Start(container));
    state.container_mut(container)?.running = true;
    Ok(())
  }

  fn stop(&self, container: BlockId) -> Result<(), EngineError> {
    let mut state = self.state();
    state.calls.push(EngineCall::Stop(container));
    state.container_mut(container)?.running = false;
    Ok(())
  }

  fn wait(&self, container: BlockId) -> Result<(), EngineError> {
    let mut state = self.state();
    state.calls.push(EngineCall::Wait(container));
    // Nothing executes in memory; a waited-on graph has simply finished.
    state.container_mut(container)?.running = false;
    Ok(())
  }
}
