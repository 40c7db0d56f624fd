//! # Block and Port Addressing
//!
//! Blocks are owned by the execution engine; this crate only holds their
//! [`BlockId`] and hangs bookkeeping off it. Ports are addressed either by a
//! dense integer index (stream ports, what the engine understands) or by a
//! caller-assigned name (message ports, translated to an index by the
//! block's [`PortIndexRegistry`](crate::registry::PortIndexRegistry)).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle to an engine-owned block (or container).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u64);

impl fmt::Display for BlockId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "block#{}", self.0)
  }
}

/// Which side of a block a port lives on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
  /// Input side; the block is the destination of an edge.
  Input,
  /// Output side; the block is the source of an edge.
  Output,
}

impl fmt::Display for Direction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Direction::Input => write!(f, "input"),
      Direction::Output => write!(f, "output"),
    }
  }
}

/// Selects a port on a block, by index or by message-port name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PortSelector {
  /// A real stream port index.
  Index(usize),
  /// A virtual message port name.
  Name(String),
}

impl From<usize> for PortSelector {
  fn from(index: usize) -> Self {
    PortSelector::Index(index)
  }
}

impl From<&str> for PortSelector {
  fn from(name: &str) -> Self {
    PortSelector::Name(name.to_string())
  }
}

impl From<String> for PortSelector {
  fn from(name: String) -> Self {
    PortSelector::Name(name)
  }
}

impl fmt::Display for PortSelector {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      PortSelector::Index(index) => write!(f, "{}", index),
      PortSelector::Name(name) => write!(f, "'{}'", name),
    }
  }
}

/// A block together with a port selector.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PortRef {
  /// The block the port belongs to.
  pub block: BlockId,
  /// Index or name of the port.
  pub selector: PortSelector,
}

impl PortRef {
  /// Creates a reference to port `selector` on `block`.
  pub fn new(block: BlockId, selector: impl Into<PortSelector>) -> Self {
    Self {
      block,
      selector: selector.into(),
    }
  }
}

impl From<StreamPort> for PortRef {
  fn from(port: StreamPort) -> Self {
    PortRef::new(port.block, port.index)
  }
}

/// A fully resolved, index-addressed port, the only form the engine accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamPort {
  /// The block the port belongs to.
  pub block: BlockId,
  /// Engine port index.
  pub index: usize,
}

impl StreamPort {
  /// Creates a resolved port.
  pub fn new(block: BlockId, index: usize) -> Self {
    Self { block, index }
  }
}

impl fmt::Display for StreamPort {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.block, self.index)
  }
}

/// One element of a chained `connect`/`disconnect` call.
///
/// A bare block stands for port 0 of that block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endpoint {
  /// A block addressed at its default port (index 0).
  Block(BlockId),
  /// A block addressed at an explicit port index.
  Port(BlockId, usize),
}

impl Endpoint {
  /// The block this endpoint refers to.
  pub fn block(&self) -> BlockId {
    match self {
      Endpoint::Block(block) | Endpoint::Port(block, _) => *block,
    }
  }

  /// The port index, defaulting to 0 for a bare block.
  pub fn index(&self) -> usize {
    match self {
      Endpoint::Block(_) => 0,
      Endpoint::Port(_, index) => *index,
    }
  }

  /// Resolves the endpoint into an engine port.
  pub fn resolve(&self) -> StreamPort {
    StreamPort::new(self.block(), self.index())
  }
}

impl From<BlockId> for Endpoint {
  fn from(block: BlockId) -> Self {
    Endpoint::Block(block)
  }
}

impl From<(BlockId, usize)> for Endpoint {
  fn from((block, index): (BlockId, usize)) -> Self {
    Endpoint::Port(block, index)
  }
}

impl From<StreamPort> for Endpoint {
  fn from(port: StreamPort) -> Self {
    Endpoint::Port(port.block, port.index)
  }
}

/// A resolved connection between two engine ports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
  /// Output port on the upstream block.
  pub src: StreamPort,
  /// Input port on the downstream block.
  pub dst: StreamPort,
}

impl Edge {
  /// Creates an edge from `src` to `dst`.
  pub fn new(src: StreamPort, dst: StreamPort) -> Self {
    Self { src, dst }
  }
}

impl fmt::Display for Edge {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} -> {}", self.src, self.dst)
  }
}
