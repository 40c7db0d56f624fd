//! # Graph Macros
//!
//! Shorthand for the endpoint lists taken by
//! [`FlowGraphContainer::connect`](crate::graph::FlowGraphContainer::connect)
//! and `disconnect`.

/// Builds an endpoint array from blocks and `(block, index)` pairs.
///
/// A bare block stands for its port 0.
///
/// ```rust
/// use portweave::block::{BlockId, Endpoint};
/// use portweave::endpoints;
///
/// let (a, b, c) = (BlockId(1), BlockId(2), BlockId(3));
/// let chain = endpoints![a, (b, 1), c];
/// assert_eq!(chain, [Endpoint::Block(a), Endpoint::Port(b, 1), Endpoint::Block(c)]);
/// ```
#[macro_export]
macro_rules! endpoints {
  ($($endpoint:expr),* $(,)?) => {
    [$($crate::block::Endpoint::from($endpoint)),*]
  };
}
