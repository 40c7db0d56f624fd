//! Shared fixtures for unit tests.

use crate::config::GraphConfig;
use crate::engine::{EngineCall, MemoryEngine};
use crate::orchestrator::ConnectionOrchestrator;
use std::sync::Arc;

/// Installs a fmt subscriber writing through the test harness. Safe to call
/// from every test.
pub fn init_tracing() {
  let _ = tracing_subscriber::fmt()
    .with_max_level(tracing::Level::TRACE)
    .with_test_writer()
    .try_init();
}

/// Engine plus an orchestrator with the default configuration.
pub fn setup() -> (Arc<MemoryEngine>, Arc<ConnectionOrchestrator<MemoryEngine>>) {
  setup_with(GraphConfig::default())
}

/// Engine plus an orchestrator with `config`.
pub fn setup_with(
  config: GraphConfig,
) -> (Arc<MemoryEngine>, Arc<ConnectionOrchestrator<MemoryEngine>>) {
  init_tracing();
  let engine = Arc::new(MemoryEngine::new());
  let orchestrator = Arc::new(ConnectionOrchestrator::with_config(engine.clone(), config));
  (engine, orchestrator)
}

/// Number of probe helper containers created in `calls`.
pub fn helper_count(calls: &[EngineCall]) -> usize {
  calls
    .iter()
    .filter(|call| matches!(call, EngineCall::CreateContainer { name, .. } if name == "bs_block"))
    .count()
}
