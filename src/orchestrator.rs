//! # Connection Orchestration
//!
//! [`ConnectionOrchestrator`] implements the allocate-then-connect protocol
//! shared by every container:
//!
//! 1. **Probe**: run the configured [`AllocationProbe`] through a disposable
//!    helper container so the engine materializes the ports of the edge.
//! 2. **Record**: for stream edges, raise each endpoint's real port count to
//!    `index + 1`, establishing the floor for later message port indices.
//! 3. **Connect**: issue the raw engine call with resolved indices.
//!
//! It also owns the [`PortTable`] side-table that attaches a source and a
//! destination [`PortIndexRegistry`] to every block that takes part in a
//! connection. Containers built on the same orchestrator share that table, so
//! a block keeps the same message port indices wherever it is wired.

use crate::block::{BlockId, Direction, Edge, Endpoint, PortRef, StreamPort};
use crate::config::GraphConfig;
use crate::engine::Engine;
use crate::error::{GraphError, GraphResult};
use crate::probe::{AllocationProbe, ProbeReport, execute};
use crate::registry::{PortIndexRegistry, PortTable};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// Allocate-then-connect protocol over an [`Engine`].
pub struct ConnectionOrchestrator<E: Engine> {
  engine: Arc<E>,
  ports: Mutex<PortTable>,
  config: GraphConfig,
  stream_probe: Box<dyn AllocationProbe>,
  message_probe: Box<dyn AllocationProbe>,
}

impl<E: Engine> fmt::Debug for ConnectionOrchestrator<E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ConnectionOrchestrator")
      .field("config", &self.config)
      .field("stream_probe", &self.stream_probe)
      .field("message_probe", &self.message_probe)
      .finish_non_exhaustive()
  }
}

impl<E: Engine> ConnectionOrchestrator<E> {
  /// Creates an orchestrator with the default configuration.
  pub fn new(engine: Arc<E>) -> Self {
    Self::with_config(engine, GraphConfig::default())
  }

  /// Creates an orchestrator whose probe strategies come from `config`.
  pub fn with_config(engine: Arc<E>, config: GraphConfig) -> Self {
    let stream_probe = config.stream_probe.strategy();
    let message_probe = config.message_probe.strategy();
    Self::with_probes(engine, config, stream_probe, message_probe)
  }

  /// Creates an orchestrator with explicit probe strategies.
  pub fn with_probes(
    engine: Arc<E>,
    config: GraphConfig,
    stream_probe: Box<dyn AllocationProbe>,
    message_probe: Box<dyn AllocationProbe>,
  ) -> Self {
    debug!(
      stream_probe = ?stream_probe.kind(),
      message_probe = ?message_probe.kind(),
      "orchestrator created"
    );
    Self {
      engine,
      ports: Mutex::new(PortTable::new()),
      config,
      stream_probe,
      message_probe,
    }
  }

  /// The engine every call is issued against.
  pub fn engine(&self) -> &Arc<E> {
    &self.engine
  }

  /// The active configuration.
  pub fn config(&self) -> &GraphConfig {
    &self.config
  }

  fn ports(&self) -> MutexGuard<'_, PortTable> {
    self.ports.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Forces the engine to materialize `src` and `dst`, then records their
  /// indices as real ports of the two blocks.
  ///
  /// # Errors
  ///
  /// [`GraphError::PortIndexOverflow`] if an index leaves no room for a port
  /// count, checked before any engine call;
  /// [`ConfigurationError`](crate::registry::ConfigurationError) if either
  /// block side already carries message ports; any engine error other than
  /// an unsupported direction during the probe.
  pub fn allocate_real_ports(&self, src: StreamPort, dst: StreamPort) -> GraphResult<ProbeReport> {
    let src_count = port_count(src)?;
    let dst_count = port_count(dst)?;
    let report = self.run_probe(
      self.stream_probe.as_ref(),
      &PortRef::from(src),
      &PortRef::from(dst),
    )?;
    let mut ports = self.ports();
    ports.src_monitor(src.block).update(src_count)?;
    ports.dst_monitor(dst.block).update(dst_count)?;
    Ok(report)
  }

  /// Wires `e0 -> e1 -> … -> en` inside `container`, probing each edge first.
  ///
  /// A single endpoint adds the block to the container unwired and produces
  /// no edge.
  pub fn connect_chain(&self, container: BlockId, endpoints: &[Endpoint]) -> GraphResult<Vec<Edge>> {
    if let [single] = endpoints {
      trace!(%container, block = %single.block(), "connect pass-through");
      self.engine.connect_block(container, single.block())?;
      return Ok(Vec::new());
    }
    let mut edges = Vec::with_capacity(endpoints.len().saturating_sub(1));
    for pair in endpoints.windows(2) {
      let edge = Edge::new(pair[0].resolve(), pair[1].resolve());
      self.allocate_real_ports(edge.src, edge.dst)?;
      self.engine.connect(container, edge.src, edge.dst)?;
      debug!(%container, %edge, "stream edge connected");
      edges.push(edge);
    }
    Ok(edges)
  }

  /// Unwires `e0 -> e1 -> … -> en` inside `container`. No probe is run.
  pub fn disconnect_chain(
    &self,
    container: BlockId,
    endpoints: &[Endpoint],
  ) -> GraphResult<Vec<Edge>> {
    if let [single] = endpoints {
      trace!(%container, block = %single.block(), "disconnect pass-through");
      self.engine.disconnect_block(container, single.block())?;
      return Ok(Vec::new());
    }
    let mut edges = Vec::with_capacity(endpoints.len().saturating_sub(1));
    for pair in endpoints.windows(2) {
      let edge = Edge::new(pair[0].resolve(), pair[1].resolve());
      self.engine.disconnect(container, edge.src, edge.dst)?;
      debug!(%container, %edge, "stream edge disconnected");
      edges.push(edge);
    }
    Ok(edges)
  }

  /// Connects message port `src_name` of `src` to `dst_name` of `dst`.
  pub fn msg_connect(
    &self,
    container: BlockId,
    src: BlockId,
    src_name: &str,
    dst: BlockId,
    dst_name: &str,
  ) -> GraphResult<Edge> {
    self.run_probe(
      self.message_probe.as_ref(),
      &PortRef::new(src, src_name),
      &PortRef::new(dst, dst_name),
    )?;
    let edge = Self::resolve_message_edge(&mut self.ports(), src, src_name, dst, dst_name);
    self.engine.connect(container, edge.src, edge.dst)?;
    debug!(%container, %edge, src_name, dst_name, "message edge connected");
    Ok(edge)
  }

  /// Disconnects a message edge previously made with [`Self::msg_connect`].
  pub fn msg_disconnect(
    &self,
    container: BlockId,
    src: BlockId,
    src_name: &str,
    dst: BlockId,
    dst_name: &str,
  ) -> GraphResult<Edge> {
    let edge = Self::resolve_message_edge(&mut self.ports(), src, src_name, dst, dst_name);
    self.engine.disconnect(container, edge.src, edge.dst)?;
    debug!(%container, %edge, src_name, dst_name, "message edge disconnected");
    Ok(edge)
  }

  /// Index of message port `name` on the output side of `block`.
  pub fn src_index(&self, block: BlockId, name: &str) -> usize {
    self.ports().src_monitor(block).get_index(name)
  }

  /// Index of message port `name` on the input side of `block`.
  pub fn dst_index(&self, block: BlockId, name: &str) -> usize {
    self.ports().dst_monitor(block).get_index(name)
  }

  /// Snapshot of one side of a block's registry, if the block has been seen.
  pub fn registry(&self, block: BlockId, direction: Direction) -> Option<PortIndexRegistry> {
    self
      .ports()
      .get(block)
      .map(|block_ports| block_ports.side(direction).clone())
  }

  /// Drops the bookkeeping attached to `block`.
  pub fn forget_block(&self, block: BlockId) {
    if self.ports().remove(block).is_some() {
      trace!(%block, "port registries dropped");
    }
  }

  fn resolve_message_edge(
    ports: &mut PortTable,
    src: BlockId,
    src_name: &str,
    dst: BlockId,
    dst_name: &str,
  ) -> Edge {
    Edge::new(
      StreamPort::new(src, ports.src_monitor(src).get_index(src_name)),
      StreamPort::new(dst, ports.dst_monitor(dst).get_index(dst_name)),
    )
  }

  // The port table is never locked while the engine runs: engines may call
  // back into the orchestrator.
  fn run_probe(
    &self,
    probe: &dyn AllocationProbe,
    src: &PortRef,
    dst: &PortRef,
  ) -> GraphResult<ProbeReport> {
    if !probe.needs_helper() {
      return Ok(ProbeReport::skipped());
    }
    let helper = self
      .engine
      .create_container(&self.config.probe_container_name)?;
    let plan = probe.plan(&mut self.ports(), helper, src, dst);
    let result = execute(self.engine.as_ref(), helper, &plan);
    self.engine.release_container(helper);
    self.ports().remove(helper);
    if let Ok(report) = &result {
      trace!(
        kind = ?probe.kind(),
        src = %src.block,
        dst = %dst.block,
        source = ?report.source,
        destination = ?report.destination,
        "ports allocated"
      );
    }
    result
  }
}

fn port_count(port: StreamPort) -> GraphResult<usize> {
  port
    .index
    .checked_add(1)
    .ok_or(GraphError::PortIndexOverflow(port))
}
