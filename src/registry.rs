//! # Port Index Registry
//!
//! The engine only understands integer port indices, and it allocates them
//! densely: a block that already has `k` real stream ports on one side uses
//! indices `0..k`. Message ports are named by the caller, so each name has to
//! be mapped onto an index above the real ports, and that mapping has to be
//! stable for the life of the block.
//!
//! [`PortIndexRegistry`] holds that mapping for one side of one block.
//! [`BlockPorts`] pairs the output-side (source) and input-side (destination)
//! registries, and [`PortTable`] is the side-table from [`BlockId`] to
//! [`BlockPorts`], populated lazily on first use.

use crate::block::{BlockId, Direction};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, trace};

/// Raised when the real port count of a block is advanced after message ports
/// were already assigned indices on top of it.
///
/// Moving `real_port_count` at that point would shift every index handed out
/// so far. Real stream connections on a block must be made before any message
/// connection touches the same side of that block.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
  "real port count update to {requested} after virtual message ports were registered {virtual_names:?} (real port count is {real_port_count})"
)]
pub struct ConfigurationError {
  /// The count the caller tried to establish.
  pub requested: usize,
  /// The real port count already in effect.
  pub real_port_count: usize,
  /// Message port names registered so far.
  pub virtual_names: Vec<String>,
}

/// Name-to-index bookkeeping for the message ports on one side of a block.
///
/// Index of a name is `position_in_virtual_names + real_port_count`, computed
/// on first request and unchanged afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PortIndexRegistry {
  real_port_count: usize,
  virtual_names: Vec<String>,
}

impl PortIndexRegistry {
  /// Creates an empty registry (no real ports, no message ports).
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns the index for `name`, assigning the next free one on first use.
  pub fn get_index(&mut self, name: &str) -> usize {
    if let Some(position) = self.virtual_names.iter().position(|n| n == name) {
      let index = position + self.real_port_count;
      trace!(name, index, "message port index reused");
      return index;
    }
    self.virtual_names.push(name.to_string());
    let index = self.virtual_names.len() - 1 + self.real_port_count;
    debug!(
      name,
      index,
      real_port_count = self.real_port_count,
      "message port index assigned"
    );
    index
  }

  /// Raises the real port count to at least `new_count`.
  ///
  /// # Errors
  ///
  /// Returns [`ConfigurationError`] if any message port name has been
  /// registered, whatever the value of `new_count`.
  pub fn update(&mut self, new_count: usize) -> Result<(), ConfigurationError> {
    if !self.virtual_names.is_empty() {
      return Err(ConfigurationError {
        requested: new_count,
        real_port_count: self.real_port_count,
        virtual_names: self.virtual_names.clone(),
      });
    }
    if new_count > self.real_port_count {
      trace!(
        from = self.real_port_count,
        to = new_count,
        "real port count advanced"
      );
      self.real_port_count = new_count;
    }
    Ok(())
  }

  /// Highest known count of real (stream) ports.
  pub fn real_port_count(&self) -> usize {
    self.real_port_count
  }

  /// Message port names in the order they were first seen.
  pub fn virtual_names(&self) -> &[String] {
    &self.virtual_names
  }

  /// Whether `name` already has an index.
  pub fn contains(&self, name: &str) -> bool {
    self.virtual_names.iter().any(|n| n == name)
  }

  /// Whether `index` belongs to a message port rather than a real port.
  pub fn is_virtual(&self, index: usize) -> bool {
    self.port_name(index).is_some()
  }

  /// Name registered at `index`, if that index is a message port.
  pub fn port_name(&self, index: usize) -> Option<&str> {
    index
      .checked_sub(self.real_port_count)
      .and_then(|position| self.virtual_names.get(position))
      .map(String::as_str)
  }
}

/// The source (output side) and destination (input side) registries of a block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockPorts {
  /// Used when the block is the source of an edge.
  pub source: PortIndexRegistry,
  /// Used when the block is the destination of an edge.
  pub destination: PortIndexRegistry,
}

impl BlockPorts {
  /// The registry for one side of the block.
  pub fn side(&self, direction: Direction) -> &PortIndexRegistry {
    match direction {
      Direction::Output => &self.source,
      Direction::Input => &self.destination,
    }
  }

  /// Mutable access to one side of the block.
  pub fn side_mut(&mut self, direction: Direction) -> &mut PortIndexRegistry {
    match direction {
      Direction::Output => &mut self.source,
      Direction::Input => &mut self.destination,
    }
  }
}

/// Side-table of per-block registries keyed by block identity.
#[derive(Debug, Default)]
pub struct PortTable {
  blocks: HashMap<BlockId, BlockPorts>,
}

impl PortTable {
  /// Creates an empty table.
  pub fn new() -> Self {
    Self::default()
  }

  /// Output-side registry of `block`, created on first access.
  pub fn src_monitor(&mut self, block: BlockId) -> &mut PortIndexRegistry {
    self.monitor(block, Direction::Output)
  }

  /// Input-side registry of `block`, created on first access.
  pub fn dst_monitor(&mut self, block: BlockId) -> &mut PortIndexRegistry {
    self.monitor(block, Direction::Input)
  }

  /// Registry for `direction` of `block`, created on first access.
  pub fn monitor(&mut self, block: BlockId, direction: Direction) -> &mut PortIndexRegistry {
    self.blocks.entry(block).or_default().side_mut(direction)
  }

  /// Registries of `block`, if it has been seen.
  pub fn get(&self, block: BlockId) -> Option<&BlockPorts> {
    self.blocks.get(&block)
  }

  /// Drops the bookkeeping for `block`.
  pub fn remove(&mut self, block: BlockId) -> Option<BlockPorts> {
    self.blocks.remove(&block)
  }

  /// Whether `block` has bookkeeping attached.
  pub fn contains(&self, block: BlockId) -> bool {
    self.blocks.contains_key(&block)
  }

  /// Number of blocks with bookkeeping attached.
  pub fn len(&self) -> usize {
    self.blocks.len()
  }

  /// Whether no block has bookkeeping attached.
  pub fn is_empty(&self) -> bool {
    self.blocks.is_empty()
  }
}
