//! Configuration for graph construction.
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration:
//!
//! ```json
//! {
//!   "probe_container_name": "bs_block",
//!   "stream_probe": "stream",
//!   "message_probe": "message",
//!   "maximum_output_items": 4096
//! }
//! ```

use crate::probe::ProbeKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for loading a [`GraphConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
  /// The file could not be read.
  #[error("failed to read config {path}: {source}")]
  Io {
    /// File that was read.
    path: PathBuf,
    /// Underlying error.
    source: std::io::Error,
  },
  /// The document is not a valid configuration.
  #[error("invalid config: {0}")]
  Parse(#[from] serde_json::Error),
}

/// Tunables for a [`ConnectionOrchestrator`](crate::orchestrator::ConnectionOrchestrator)
/// and the containers built on it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
  /// Name given to the disposable helper container used by probes.
  pub probe_container_name: String,
  /// Probe run before each chained stream connection.
  pub stream_probe: ProbeKind,
  /// Probe run before each message connection.
  pub message_probe: ProbeKind,
  /// Initial `maximum_output_items` for top-level graphs.
  pub maximum_output_items: Option<usize>,
}

impl Default for GraphConfig {
  fn default() -> Self {
    Self {
      probe_container_name: "bs_block".to_string(),
      stream_probe: ProbeKind::Stream,
      message_probe: ProbeKind::Message,
      maximum_output_items: None,
    }
  }
}

impl GraphConfig {
  /// Parses a configuration from JSON.
  pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
    Ok(serde_json::from_str(json)?)
  }

  /// Reads and parses a JSON configuration file.
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_json_str(&json)
  }
}
