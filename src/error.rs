//! # Graph Construction Errors
//!
//! Everything that can abort a `connect`, `msg_connect` or `unlock` call.
//!
//! - [`ConfigurationError`] means the caller wired a block in the wrong order
//!   (real stream connections after message connections on the same side).
//!   It is never corrected automatically.
//! - [`EngineError`] is whatever the engine raised. The probe layer absorbs
//!   `UnsupportedDirection`; every other engine error arrives here unchanged.
//!
//! Nothing is rolled back on error: edges registered before the failure stay
//! registered.

use crate::block::StreamPort;
use crate::config::ConfigError;
use crate::engine::EngineError;
use crate::registry::ConfigurationError;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type GraphResult<T> = Result<T, GraphError>;

/// Error type for graph construction.
#[derive(Error, Debug)]
pub enum GraphError {
  /// A real port count update hit a block that already has message ports.
  #[error(transparent)]
  Configuration(#[from] ConfigurationError),
  /// The engine rejected a call.
  #[error(transparent)]
  Engine(#[from] EngineError),
  /// A port index is too large to record a real port count for.
  #[error("port {0} is beyond the largest recordable port index")]
  PortIndexOverflow(StreamPort),
  /// Configuration could not be loaded.
  #[error(transparent)]
  Config(#[from] ConfigError),
}

impl GraphError {
  /// Whether this is an engine `UnknownPort` signal.
  pub fn is_unknown_port(&self) -> bool {
    matches!(self, GraphError::Engine(EngineError::UnknownPort { .. }))
  }
}
