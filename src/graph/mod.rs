//! Flowgraph containers.
//!
//! [`Graph`] is the top-level container, [`Subgraph`] the nested one. Both
//! expose the construction surface of [`FlowGraphContainer`].

pub mod container;
#[allow(clippy::module_inception)]
pub mod graph;
pub mod subgraph;

pub use container::{BuildState, ContainerCore, FlowGraphContainer};
pub use graph::Graph;
pub use subgraph::{IoSignature, StreamType, Subgraph, SubgraphHandle};
