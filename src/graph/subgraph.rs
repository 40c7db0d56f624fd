//! # Subgraph Support
//!
//! A [`Subgraph`] is a nested container: it has its own engine container, is
//! wired with the same [`FlowGraphContainer`] operations as a top-level
//! [`Graph`](super::Graph), and can itself appear as a block inside a parent.
//! Its own id is a valid endpoint inside it, which is how internal blocks are
//! exported to the subgraph's ports:
//!
//! ```rust
//! use portweave::engine::{BlockSpec, MemoryEngine};
//! use portweave::graph::{FlowGraphContainer, IoSignature, StreamType, Subgraph};
//! use portweave::orchestrator::ConnectionOrchestrator;
//! use portweave::endpoints;
//! use std::sync::Arc;
//!
//! let engine = Arc::new(MemoryEngine::new());
//! let gain = engine.add_block(BlockSpec::new("gain"));
//! let orchestrator = Arc::new(ConnectionOrchestrator::new(engine));
//!
//! let sig = IoSignature::new(vec![Some(StreamType::new("f32", 4))]);
//! let amp = Subgraph::new(orchestrator, "amp", sig.clone(), sig)?;
//! amp.connect(&endpoints![amp.id(), gain, amp.id()])?;
//! # Ok::<(), portweave::error::GraphError>(())
//! ```
//!
//! Subgraphs are handed out as `Arc<Subgraph>` and keep a [`SubgraphHandle`]
//! to themselves: a weak, lookup-only back-reference that never keeps the
//! subgraph alive.

use super::container::{ContainerCore, FlowGraphContainer};
use crate::block::BlockId;
use crate::engine::Engine;
use crate::error::GraphResult;
use crate::orchestrator::ConnectionOrchestrator;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::trace;

/// Type descriptor of one stream port.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamType {
  /// Item type name, e.g. `"f32"` or `"complex64"`.
  pub name: String,
  /// Size of one item in bytes.
  pub item_size: usize,
}

impl StreamType {
  /// Creates a descriptor.
  pub fn new(name: impl Into<String>, item_size: usize) -> Self {
    Self {
      name: name.into(),
      item_size,
    }
  }
}

/// Ordered stream types of a container's ports; `None` entries are unconstrained.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IoSignature(pub Vec<Option<StreamType>>);

impl IoSignature {
  /// Wraps a list of port types.
  pub fn new(ports: Vec<Option<StreamType>>) -> Self {
    Self(ports)
  }

  /// A signature with no ports.
  pub fn empty() -> Self {
    Self::default()
  }

  /// Number of ports described.
  pub fn len(&self) -> usize {
    self.0.len()
  }

  /// Whether no port is described.
  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Type of port `index`; `None` if the port is unconstrained or absent.
  pub fn port(&self, index: usize) -> Option<&StreamType> {
    self.0.get(index).and_then(Option::as_ref)
  }
}

/// Nested flowgraph container.
pub struct Subgraph<E: Engine> {
  core: ContainerCore<E>,
  input_signature: IoSignature,
  output_signature: IoSignature,
  self_handle: Weak<Subgraph<E>>,
}

impl<E: Engine> Subgraph<E> {
  /// Creates a subgraph named `name` with the given port signatures.
  pub fn new(
    orchestrator: Arc<ConnectionOrchestrator<E>>,
    name: &str,
    input_signature: IoSignature,
    output_signature: IoSignature,
  ) -> GraphResult<Arc<Self>> {
    let core = ContainerCore::new(orchestrator, name)?;
    trace!(
      id = %core.id(),
      name,
      inputs = input_signature.len(),
      outputs = output_signature.len(),
      "subgraph created"
    );
    Ok(Arc::new_cyclic(|self_handle| Self {
      core,
      input_signature,
      output_signature,
      self_handle: self_handle.clone(),
    }))
  }

  /// Stream types accepted on the subgraph's inputs.
  pub fn input_signature(&self) -> &IoSignature {
    &self.input_signature
  }

  /// Stream types produced on the subgraph's outputs.
  pub fn output_signature(&self) -> &IoSignature {
    &self.output_signature
  }

  /// Weak back-reference to this subgraph.
  pub fn handle(&self) -> SubgraphHandle<E> {
    SubgraphHandle {
      id: self.core.id(),
      subgraph: self.self_handle.clone(),
    }
  }
}

impl<E: Engine> fmt::Debug for Subgraph<E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Subgraph")
      .field("core", &self.core)
      .field("input_signature", &self.input_signature)
      .field("output_signature", &self.output_signature)
      .finish()
  }
}

impl<E: Engine> FlowGraphContainer for Subgraph<E> {
  type Engine = E;

  fn core(&self) -> &ContainerCore<E> {
    &self.core
  }
}

/// Non-owning reference to a [`Subgraph`].
pub struct SubgraphHandle<E: Engine> {
  id: BlockId,
  subgraph: Weak<Subgraph<E>>,
}

impl<E: Engine> SubgraphHandle<E> {
  /// Id of the referenced subgraph; stays readable after it is dropped.
  pub fn id(&self) -> BlockId {
    self.id
  }

  /// The subgraph, if it is still alive.
  pub fn upgrade(&self) -> Option<Arc<Subgraph<E>>> {
    self.subgraph.upgrade()
  }

  /// Whether the subgraph is still alive.
  pub fn is_alive(&self) -> bool {
    self.subgraph.strong_count() > 0
  }
}

impl<E: Engine> Clone for SubgraphHandle<E> {
  fn clone(&self) -> Self {
    Self {
      id: self.id,
      subgraph: self.subgraph.clone(),
    }
  }
}

impl<E: Engine> fmt::Debug for SubgraphHandle<E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SubgraphHandle")
      .field("id", &self.id)
      .field("alive", &self.is_alive())
      .finish()
  }
}
