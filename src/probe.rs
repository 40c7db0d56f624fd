//! # Allocation Probes
//!
//! The engine sizes a block's port table on first reference. A probe forces
//! that reference without leaving anything behind: it wires the port to a
//! disposable helper container and immediately unwires it again, once for the
//! source side and once for the destination side.
//!
//! A block that cannot act on a side (a pure source offered as a destination)
//! answers with [`EngineError::UnsupportedDirection`]; that half of the probe
//! is reported as [`ProbeOutcome::Unsupported`] and construction continues.
//! Every other engine error propagates.
//!
//! Probe shapes are strategies behind [`AllocationProbe`], picked per path
//! (stream or message) through [`ProbeKind`] in the graph configuration.

use crate::block::{BlockId, Direction, Edge, PortRef, PortSelector, StreamPort};
use crate::engine::{Engine, EngineError};
use crate::error::GraphResult;
use crate::registry::PortTable;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, trace};

/// Port name the message probe uses on the helper container.
pub const HELPER_PORT: &str = "bs";

/// Result of one probe half.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeOutcome {
  /// The engine accepted the probe edge, so the port is now materialized.
  Allocated,
  /// The block does not support this direction; nothing to allocate.
  Unsupported,
  /// No probe was attempted.
  Skipped,
}

/// Outcome of both halves of a probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProbeReport {
  /// `src -> helper` half.
  pub source: ProbeOutcome,
  /// `helper -> dst` half.
  pub destination: ProbeOutcome,
}

impl ProbeReport {
  /// A report for a probe that did nothing.
  pub fn skipped() -> Self {
    Self {
      source: ProbeOutcome::Skipped,
      destination: ProbeOutcome::Skipped,
    }
  }
}

/// Sorts an engine reply into the three probe outcomes.
///
/// Only `UnsupportedDirection` is absorbed.
pub fn classify(result: Result<(), EngineError>) -> Result<ProbeOutcome, EngineError> {
  match result {
    Ok(()) => Ok(ProbeOutcome::Allocated),
    Err(EngineError::UnsupportedDirection { block, direction }) => {
      trace!(%block, %direction, "probe half unsupported");
      Ok(ProbeOutcome::Unsupported)
    }
    Err(err) => Err(err),
  }
}

/// The two edges a probe wires through the helper container.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProbePlan {
  /// `src -> helper`; `None` skips this half.
  pub source: Option<Edge>,
  /// `helper -> dst`; `None` skips this half.
  pub destination: Option<Edge>,
}

impl ProbePlan {
  /// A plan that wires nothing.
  pub fn empty() -> Self {
    Self {
      source: None,
      destination: None,
    }
  }
}

/// A strategy that forces the engine to materialize the ports of an edge
/// before the edge itself is registered.
///
/// Probing runs in two steps. [`Self::plan`] resolves every index with the
/// port table locked and never touches the engine; [`execute`] then issues
/// the engine calls with the table released.
pub trait AllocationProbe: fmt::Debug + Send + Sync {
  /// Which strategy this is.
  fn kind(&self) -> ProbeKind;

  /// Whether a helper container has to be created for the plan.
  fn needs_helper(&self) -> bool {
    true
  }

  /// Resolves the probe edges between `src`, `dst` and the disposable
  /// container `helper`. Port names are registered exactly as the real
  /// connect that follows will register them.
  fn plan(
    &self,
    ports: &mut PortTable,
    helper: BlockId,
    src: &PortRef,
    dst: &PortRef,
  ) -> ProbePlan;
}

/// Wires and immediately unwires each planned edge inside `helper`.
///
/// Leaves no edge behind. Only `UnsupportedDirection` is absorbed.
pub fn execute(engine: &dyn Engine, helper: BlockId, plan: &ProbePlan) -> GraphResult<ProbeReport> {
  Ok(ProbeReport {
    source: execute_half(engine, helper, plan.source)?,
    destination: execute_half(engine, helper, plan.destination)?,
  })
}

/// Selectable probe strategies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
  /// [`StreamProbe`]: symmetric, through helper port 0.
  #[default]
  Stream,
  /// [`MessageProbe`]: symmetric, through the helper's named port.
  Message,
  /// [`NoProbe`]: trust the engine to allocate on the real connect.
  Disabled,
}

impl ProbeKind {
  /// Instantiates the strategy.
  pub fn strategy(self) -> Box<dyn AllocationProbe> {
    match self {
      ProbeKind::Stream => Box::new(StreamProbe),
      ProbeKind::Message => Box::new(MessageProbe),
      ProbeKind::Disabled => Box::new(NoProbe),
    }
  }
}

/// Connect-then-disconnect `src -> helper:0` and `helper:0 -> dst`.
///
/// Named selectors are resolved through the block registries, so this shape
/// also serves the message path.
#[derive(Clone, Copy, Debug, Default)]
pub struct StreamProbe;

impl AllocationProbe for StreamProbe {
  fn kind(&self) -> ProbeKind {
    ProbeKind::Stream
  }

  fn plan(
    &self,
    ports: &mut PortTable,
    helper: BlockId,
    src: &PortRef,
    dst: &PortRef,
  ) -> ProbePlan {
    let helper_port = StreamPort::new(helper, 0);
    let src_port = StreamPort::new(src.block, resolve(ports, src, Direction::Output));
    let dst_port = StreamPort::new(dst.block, resolve(ports, dst, Direction::Input));
    trace!(src = %src_port, dst = %dst_port, "stream probe planned");
    ProbePlan {
      source: Some(Edge::new(src_port, helper_port)),
      destination: Some(Edge::new(helper_port, dst_port)),
    }
  }
}

/// Connect-then-disconnect `src -> helper["bs"]` and `helper["bs"] -> dst`,
/// resolving names through the block registries.
#[derive(Clone, Copy, Debug, Default)]
pub struct MessageProbe;

impl AllocationProbe for MessageProbe {
  fn kind(&self) -> ProbeKind {
    ProbeKind::Message
  }

  fn plan(
    &self,
    ports: &mut PortTable,
    helper: BlockId,
    src: &PortRef,
    dst: &PortRef,
  ) -> ProbePlan {
    let src_port = StreamPort::new(src.block, resolve(ports, src, Direction::Output));
    let helper_in = StreamPort::new(helper, ports.dst_monitor(helper).get_index(HELPER_PORT));
    let helper_out = StreamPort::new(helper, ports.src_monitor(helper).get_index(HELPER_PORT));
    let dst_port = StreamPort::new(dst.block, resolve(ports, dst, Direction::Input));
    trace!(src = %src_port, dst = %dst_port, "message probe planned");
    ProbePlan {
      source: Some(Edge::new(src_port, helper_in)),
      destination: Some(Edge::new(helper_out, dst_port)),
    }
  }
}

/// Does nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProbe;

impl AllocationProbe for NoProbe {
  fn kind(&self) -> ProbeKind {
    ProbeKind::Disabled
  }

  fn needs_helper(&self) -> bool {
    false
  }

  fn plan(
    &self,
    _ports: &mut PortTable,
    _helper: BlockId,
    _src: &PortRef,
    _dst: &PortRef,
  ) -> ProbePlan {
    ProbePlan::empty()
  }
}

fn execute_half(
  engine: &dyn Engine,
  helper: BlockId,
  edge: Option<Edge>,
) -> GraphResult<ProbeOutcome> {
  let Some(edge) = edge else {
    return Ok(ProbeOutcome::Skipped);
  };
  let outcome = classify(engine.connect(helper, edge.src, edge.dst))?;
  if outcome == ProbeOutcome::Allocated {
    engine.disconnect(helper, edge.src, edge.dst)?;
  }
  debug!(%helper, %edge, ?outcome, "probe half finished");
  Ok(outcome)
}

fn resolve(ports: &mut PortTable, port: &PortRef, direction: Direction) -> usize {
  match &port.selector {
    PortSelector::Index(index) => *index,
    PortSelector::Name(name) => ports.monitor(port.block, direction).get_index(name),
  }
}
