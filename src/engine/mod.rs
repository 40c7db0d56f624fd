//! # Execution Engine Boundary
//!
//! The engine schedules and runs the compiled graph and owns real stream-port
//! storage. This crate never defines how it does that; it only drives the
//! narrow surface below. Ports are allocated lazily by the engine on first
//! reference, which is why the orchestrator probes before connecting.
//!
//! Every method takes `&self`: an engine is shared by every container built
//! on it and is expected to manage its own interior state.

pub mod memory;

pub use memory::{BlockSpec, EngineCall, MemoryEngine};

use crate::block::{BlockId, Direction, StreamPort};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Signals raised by the engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
  /// The block cannot act on this side (e.g. a pure source offered as a
  /// destination). Expected during probing and absorbed there.
  #[error("{block} does not support {direction} connections")]
  UnsupportedDirection {
    /// Offending block.
    block: BlockId,
    /// Side that was requested.
    direction: Direction,
  },
  /// An index does not correspond to any real or allocated port.
  #[error("{block} has no {direction} port {index}")]
  UnknownPort {
    /// Offending block.
    block: BlockId,
    /// Side of the port.
    direction: Direction,
    /// Requested index.
    index: usize,
  },
  /// The block is not known to the engine.
  #[error("unknown block {0}")]
  UnknownBlock(BlockId),
  /// The container is not known to the engine (never created or released).
  #[error("unknown container {0}")]
  UnknownContainer(BlockId),
  /// The edge is already present in the container.
  #[error("edge {src} -> {dst} already connected")]
  AlreadyConnected {
    /// Source port.
    src: StreamPort,
    /// Destination port.
    dst: StreamPort,
  },
  /// The edge to remove is not present in the container.
  #[error("edge {src} -> {dst} is not connected")]
  NotConnected {
    /// Source port.
    src: StreamPort,
    /// Destination port.
    dst: StreamPort,
  },
  /// Any other engine failure.
  #[error("engine error: {0}")]
  Other(String),
}

/// Global tuning applied to a top-level container before it runs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
  /// Upper bound on items produced per work call; `None` leaves the engine default.
  pub maximum_output_items: Option<usize>,
}

/// Raw, index-addressed graph primitives consumed by this crate.
pub trait Engine: Send + Sync {
  /// Creates a new container (top-level or nested) and returns its handle.
  ///
  /// A container is itself a block: its own id may appear as an endpoint
  /// inside it (export wiring) or inside another container.
  fn create_container(&self, name: &str) -> Result<BlockId, EngineError>;

  /// Releases a container and everything it holds.
  fn release_container(&self, container: BlockId);

  /// Registers the edge `src -> dst` in `container`.
  fn connect(&self, container: BlockId, src: StreamPort, dst: StreamPort) -> Result<(), EngineError>;

  /// Removes the edge `src -> dst` from `container`.
  fn disconnect(
    &self,
    container: BlockId,
    src: StreamPort,
    dst: StreamPort,
  ) -> Result<(), EngineError>;

  /// Adds a lone block to `container` without wiring it.
  fn connect_block(&self, container: BlockId, block: BlockId) -> Result<(), EngineError>;

  /// Removes a lone block from `container`.
  fn disconnect_block(&self, container: BlockId, block: BlockId) -> Result<(), EngineError>;

  /// Removes every edge and block from `container`.
  fn disconnect_all(&self, container: BlockId) -> Result<(), EngineError>;

  /// Atomically applies every mutation of `container` since the last commit.
  fn commit(&self, container: BlockId) -> Result<(), EngineError>;

  /// Applies global tuning to `container`.
  fn configure(&self, container: BlockId, config: &RunConfig) -> Result<(), EngineError>;

  /// Starts running `container`.
  fn start(&self, container: BlockId) -> Result<(), EngineError>;

  /// Asks a running `container` to stop.
  fn stop(&self, container: BlockId) -> Result<(), EngineError>;

  /// Blocks until `container` has finished running.
  fn wait(&self, container: BlockId) -> Result<(), EngineError>;
}
