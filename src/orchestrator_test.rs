//! # Connection Orchestrator Test Suite
//!
//! Checks the exact engine call sequences issued by the allocate-then-connect
//! protocol, the handling of one-sided blocks during probing, and message
//! port index resolution.

use crate::block::{BlockId, Direction, Edge, PortRef, StreamPort};
use crate::config::GraphConfig;
use crate::endpoints;
use crate::engine::{BlockSpec, Engine, EngineCall, EngineError, MemoryEngine, RunConfig};
use crate::error::GraphError;
use crate::orchestrator::ConnectionOrchestrator;
use crate::probe::{
  AllocationProbe, MessageProbe, NoProbe, ProbeKind, ProbeOutcome, ProbePlan, ProbeReport,
  StreamProbe, classify, execute,
};
use crate::registry::PortTable;
use crate::test_support::{helper_count, init_tracing, setup, setup_with};
use std::sync::{Arc, Mutex, OnceLock, Weak, mpsc};
use std::thread;
use std::time::Duration;

// ============================================================================
// Helpers
// ============================================================================

fn sp(block: BlockId, index: usize) -> StreamPort {
  StreamPort::new(block, index)
}

fn helpers(calls: &[EngineCall]) -> Vec<BlockId> {
  calls
    .iter()
    .filter_map(|call| match call {
      EngineCall::CreateContainer { container, .. } => Some(*container),
      _ => None,
    })
    .collect()
}

/// The six calls of a successful symmetric probe through `helper`.
fn probe_calls(helper: BlockId, src: StreamPort, dst: StreamPort) -> Vec<EngineCall> {
  let helper_port = sp(helper, 0);
  let first = Edge::new(src, helper_port);
  let second = Edge::new(helper_port, dst);
  vec![
    EngineCall::CreateContainer {
      container: helper,
      name: "bs_block".to_string(),
    },
    EngineCall::Connect {
      container: helper,
      edge: first,
    },
    EngineCall::Disconnect {
      container: helper,
      edge: first,
    },
    EngineCall::Connect {
      container: helper,
      edge: second,
    },
    EngineCall::Disconnect {
      container: helper,
      edge: second,
    },
    EngineCall::ReleaseContainer(helper),
  ]
}

fn blocks(engine: &MemoryEngine, names: &[&str]) -> Vec<BlockId> {
  names
    .iter()
    .map(|name| engine.add_block(BlockSpec::new(*name)))
    .collect()
}

// ============================================================================
// Chained stream connections
// ============================================================================

#[test]
fn test_connect_chain_probes_before_each_edge() {
  let (engine, orchestrator) = setup();
  let ids = blocks(&engine, &["a", "b", "c"]);
  let (a, b, c) = (ids[0], ids[1], ids[2]);
  let container = engine.create_container("top").unwrap();
  engine.clear_calls();

  let edges = orchestrator
    .connect_chain(container, &endpoints![a, b, c])
    .unwrap();
  assert_eq!(
    edges,
    vec![Edge::new(sp(a, 0), sp(b, 0)), Edge::new(sp(b, 0), sp(c, 0))]
  );

  let calls = engine.calls();
  let helpers = helpers(&calls);
  assert_eq!(helpers.len(), 2);

  let mut expected = probe_calls(helpers[0], sp(a, 0), sp(b, 0));
  expected.push(EngineCall::Connect {
    container,
    edge: edges[0],
  });
  expected.extend(probe_calls(helpers[1], sp(b, 0), sp(c, 0)));
  expected.push(EngineCall::Connect {
    container,
    edge: edges[1],
  });
  assert_eq!(calls, expected);

  for helper in helpers {
    assert!(!engine.has_container(helper));
  }
  assert_eq!(engine.pending_edges(container), edges);
}

#[test]
fn test_connect_chain_records_real_port_counts() {
  let (engine, orchestrator) = setup();
  let ids = blocks(&engine, &["a", "b"]);
  let (a, b) = (ids[0], ids[1]);
  let container = engine.create_container("top").unwrap();

  orchestrator
    .connect_chain(container, &endpoints![(a, 2), (b, 1)])
    .unwrap();
  orchestrator
    .connect_chain(container, &endpoints![(a, 0), b])
    .unwrap();

  let a_out = orchestrator.registry(a, Direction::Output).unwrap();
  let b_in = orchestrator.registry(b, Direction::Input).unwrap();
  assert_eq!(a_out.real_port_count(), 3);
  assert_eq!(b_in.real_port_count(), 2);
  assert_eq!(
    orchestrator
      .registry(a, Direction::Input)
      .unwrap()
      .real_port_count(),
    0
  );
}

#[test]
fn test_connect_chain_single_endpoint_is_pass_through() {
  let (engine, orchestrator) = setup();
  let a = engine.add_block(BlockSpec::new("a"));
  let container = engine.create_container("top").unwrap();
  engine.clear_calls();

  let edges = orchestrator.connect_chain(container, &endpoints![a]).unwrap();
  assert!(edges.is_empty());
  assert_eq!(
    engine.calls(),
    vec![EngineCall::ConnectBlock {
      container,
      block: a
    }]
  );
  assert!(orchestrator.registry(a, Direction::Output).is_none());
}

#[test]
fn test_connect_chain_empty_is_noop() {
  let (engine, orchestrator) = setup();
  let container = engine.create_container("top").unwrap();
  engine.clear_calls();

  assert!(orchestrator.connect_chain(container, &[]).unwrap().is_empty());
  assert!(engine.calls().is_empty());
}

#[test]
fn test_disconnect_chain_skips_probe() {
  let (engine, orchestrator) = setup();
  let ids = blocks(&engine, &["a", "b", "c"]);
  let (a, b, c) = (ids[0], ids[1], ids[2]);
  let container = engine.create_container("top").unwrap();
  let edges = orchestrator
    .connect_chain(container, &endpoints![a, (b, 0), c])
    .unwrap();
  engine.clear_calls();

  let removed = orchestrator
    .disconnect_chain(container, &endpoints![a, b, c])
    .unwrap();
  assert_eq!(removed, edges);
  assert_eq!(
    engine.calls(),
    vec![
      EngineCall::Disconnect {
        container,
        edge: edges[0]
      },
      EngineCall::Disconnect {
        container,
        edge: edges[1]
      },
    ]
  );
  assert!(engine.pending_edges(container).is_empty());
}

#[test]
fn test_disconnect_chain_single_endpoint() {
  let (engine, orchestrator) = setup();
  let a = engine.add_block(BlockSpec::new("a"));
  let container = engine.create_container("top").unwrap();
  orchestrator.connect_chain(container, &endpoints![a]).unwrap();
  engine.clear_calls();

  assert!(
    orchestrator
      .disconnect_chain(container, &endpoints![a])
      .unwrap()
      .is_empty()
  );
  assert_eq!(
    engine.calls(),
    vec![EngineCall::DisconnectBlock {
      container,
      block: a
    }]
  );
}

// ============================================================================
// Probing one-sided blocks
// ============================================================================

#[test]
fn test_unsupported_probe_halves_are_skipped() {
  let (engine, orchestrator) = setup();
  let sink = engine.add_block(BlockSpec::sink("sink"));
  let source = engine.add_block(BlockSpec::source("source"));
  engine.clear_calls();

  // Deliberately backwards: the sink offered as a source and vice versa.
  let report = orchestrator
    .allocate_real_ports(sp(sink, 0), sp(source, 0))
    .unwrap();
  assert_eq!(
    report,
    ProbeReport {
      source: ProbeOutcome::Unsupported,
      destination: ProbeOutcome::Unsupported,
    }
  );

  let calls = engine.calls();
  assert!(
    !calls
      .iter()
      .any(|call| matches!(call, EngineCall::Disconnect { .. }))
  );
  assert_eq!(helper_count(&calls), 1);
  assert!(matches!(calls.last(), Some(EngineCall::ReleaseContainer(_))));

  assert_eq!(
    orchestrator
      .registry(sink, Direction::Output)
      .unwrap()
      .real_port_count(),
    1
  );
}

#[test]
fn test_source_to_sink_chain_allocates_both_sides() {
  let (engine, orchestrator) = setup();
  let source = engine.add_block(BlockSpec::source("source"));
  let sink = engine.add_block(BlockSpec::sink("sink"));
  let container = engine.create_container("top").unwrap();

  let report = orchestrator
    .allocate_real_ports(sp(source, 0), sp(sink, 0))
    .unwrap();
  assert_eq!(report.source, ProbeOutcome::Allocated);
  assert_eq!(report.destination, ProbeOutcome::Allocated);

  orchestrator
    .connect_chain(container, &endpoints![source, sink])
    .unwrap();
  assert_eq!(engine.allocated_ports(source, Direction::Output), vec![0]);
  assert_eq!(engine.allocated_ports(sink, Direction::Input), vec![0]);
}

#[test]
fn test_other_engine_errors_propagate() {
  let (engine, orchestrator) = setup();
  let a = engine.add_block(BlockSpec::new("a"));
  let missing = BlockId(999);
  let container = engine.create_container("top").unwrap();
  engine.clear_calls();

  let err = orchestrator
    .connect_chain(container, &endpoints![a, missing])
    .unwrap_err();
  assert!(matches!(
    err,
    GraphError::Engine(EngineError::UnknownBlock(block)) if block == missing
  ));

  let calls = engine.calls();
  for helper in helpers(&calls) {
    assert!(!engine.has_container(helper));
  }
  assert!(engine.pending_edges(container).is_empty());
}

#[test]
fn test_last_port_index_is_rejected_before_engine_calls() {
  let (engine, orchestrator) = setup();
  let ids = blocks(&engine, &["a", "b"]);
  let (a, b) = (ids[0], ids[1]);
  let container = engine.create_container("top").unwrap();
  engine.clear_calls();

  let err = orchestrator
    .connect_chain(container, &endpoints![(a, usize::MAX), b])
    .unwrap_err();
  assert!(matches!(err, GraphError::PortIndexOverflow(port) if port == sp(a, usize::MAX)));
  assert!(engine.calls().is_empty());
  assert!(orchestrator.registry(a, Direction::Output).is_none());

  let err = orchestrator
    .connect_chain(container, &endpoints![a, (b, usize::MAX)])
    .unwrap_err();
  assert!(matches!(err, GraphError::PortIndexOverflow(port) if port == sp(b, usize::MAX)));
  assert!(engine.pending_edges(container).is_empty());
}

#[test]
fn test_stream_plan_resolves_names() {
  let mut table = PortTable::new();
  let (a, b, helper) = (BlockId(1), BlockId(2), BlockId(9));
  table.src_monitor(a).update(2).unwrap();

  let plan = StreamProbe.plan(
    &mut table,
    helper,
    &PortRef::new(a, "out"),
    &PortRef::new(b, 0),
  );
  assert_eq!(plan.source, Some(Edge::new(sp(a, 2), sp(helper, 0))));
  assert_eq!(plan.destination, Some(Edge::new(sp(helper, 0), sp(b, 0))));
  assert_eq!(table.src_monitor(a).get_index("out"), 2);
}

#[test]
fn test_message_plan_uses_named_helper_ports() {
  let mut table = PortTable::new();
  let (p, q, helper) = (BlockId(1), BlockId(2), BlockId(9));
  table.dst_monitor(q).update(1).unwrap();

  let plan = MessageProbe.plan(
    &mut table,
    helper,
    &PortRef::new(p, "ctrl"),
    &PortRef::new(q, "status"),
  );
  assert_eq!(plan.source, Some(Edge::new(sp(p, 0), sp(helper, 0))));
  assert_eq!(plan.destination, Some(Edge::new(sp(helper, 0), sp(q, 1))));
  assert!(table.dst_monitor(helper).contains("bs"));
  assert!(table.src_monitor(helper).contains("bs"));
}

#[test]
fn test_empty_plan_issues_no_engine_call() {
  let engine = MemoryEngine::new();
  let helper = engine.create_container("bs_block").unwrap();
  let mut table = PortTable::new();
  engine.clear_calls();

  let plan = NoProbe.plan(
    &mut table,
    helper,
    &PortRef::new(BlockId(1), "a"),
    &PortRef::new(BlockId(2), "b"),
  );
  assert_eq!(plan, ProbePlan::empty());
  assert_eq!(execute(&engine, helper, &plan).unwrap(), ProbeReport::skipped());
  assert!(engine.calls().is_empty());
  assert!(table.is_empty());
}

#[test]
fn test_classify() {
  let block = BlockId(1);
  assert_eq!(classify(Ok(())), Ok(ProbeOutcome::Allocated));
  assert_eq!(
    classify(Err(EngineError::UnsupportedDirection {
      block,
      direction: Direction::Input,
    })),
    Ok(ProbeOutcome::Unsupported)
  );
  let unknown = EngineError::UnknownPort {
    block,
    direction: Direction::Output,
    index: 4,
  };
  assert_eq!(classify(Err(unknown.clone())), Err(unknown));
}

// ============================================================================
// Message connections
// ============================================================================

#[test]
fn test_msg_connect_resolves_above_real_ports() {
  let (engine, orchestrator) = setup();
  let ids = blocks(&engine, &["p", "x", "q"]);
  let (p, x, q) = (ids[0], ids[1], ids[2]);
  let container = engine.create_container("top").unwrap();

  // P gets two real output ports.
  orchestrator
    .connect_chain(container, &endpoints![(p, 1), x])
    .unwrap();
  engine.clear_calls();

  let edge = orchestrator
    .msg_connect(container, p, "ctrl", q, "status")
    .unwrap();
  assert_eq!(edge, Edge::new(sp(p, 2), sp(q, 0)));

  let calls = engine.calls();
  let helpers = helpers(&calls);
  assert_eq!(helpers.len(), 1);
  let mut expected = probe_calls(helpers[0], sp(p, 2), sp(q, 0));
  expected.push(EngineCall::Connect { container, edge });
  assert_eq!(calls, expected);

  engine.clear_calls();
  let removed = orchestrator
    .msg_disconnect(container, p, "ctrl", q, "status")
    .unwrap();
  assert_eq!(removed, edge);
  assert_eq!(
    engine.calls(),
    vec![EngineCall::Disconnect { container, edge }]
  );
}

#[test]
fn test_msg_connect_destination_above_real_inputs() {
  let (engine, orchestrator) = setup();
  let ids = blocks(&engine, &["p", "x", "q"]);
  let (p, x, q) = (ids[0], ids[1], ids[2]);
  let container = engine.create_container("top").unwrap();

  orchestrator
    .connect_chain(container, &endpoints![x, (q, 2)])
    .unwrap();
  let edge = orchestrator
    .msg_connect(container, p, "out", q, "status")
    .unwrap();
  assert_eq!(edge, Edge::new(sp(p, 0), sp(q, 3)));
  assert_eq!(orchestrator.dst_index(q, "status"), 3);
  assert_eq!(orchestrator.src_index(p, "out"), 0);
}

#[test]
fn test_msg_ports_are_stable_across_connections() {
  let (engine, orchestrator) = setup();
  let ids = blocks(&engine, &["p", "q", "r"]);
  let (p, q, r) = (ids[0], ids[1], ids[2]);
  let container = engine.create_container("top").unwrap();

  let first = orchestrator
    .msg_connect(container, p, "ctrl", q, "in")
    .unwrap();
  let second = orchestrator
    .msg_connect(container, p, "ctrl", r, "in")
    .unwrap();
  let third = orchestrator
    .msg_connect(container, p, "log", r, "aux")
    .unwrap();

  assert_eq!(first.src, second.src);
  assert_eq!(third.src, sp(p, 1));
  assert_eq!(third.dst, sp(r, 1));

  let registry = orchestrator.registry(p, Direction::Output).unwrap();
  assert_eq!(registry.virtual_names(), ["ctrl".to_string(), "log".to_string()]);
  assert_eq!(registry.port_name(1), Some("log"));
}

#[test]
fn test_stream_connect_after_msg_connect_fails() {
  let (engine, orchestrator) = setup();
  let ids = blocks(&engine, &["p", "q", "x"]);
  let (p, q, x) = (ids[0], ids[1], ids[2]);
  let container = engine.create_container("top").unwrap();

  let msg_edge = orchestrator
    .msg_connect(container, p, "ctrl", q, "status")
    .unwrap();

  let err = orchestrator
    .connect_chain(container, &endpoints![p, x])
    .unwrap_err();
  assert!(matches!(err, GraphError::Configuration(_)));
  assert_eq!(engine.pending_edges(container), vec![msg_edge]);

  // The other side of each block is unaffected.
  orchestrator
    .connect_chain(container, &endpoints![q, x])
    .unwrap();
}

#[test]
fn test_probe_helper_leaves_no_registry() {
  let (engine, orchestrator) = setup();
  let ids = blocks(&engine, &["p", "q"]);
  let container = engine.create_container("top").unwrap();
  engine.clear_calls();

  orchestrator
    .msg_connect(container, ids[0], "a", ids[1], "b")
    .unwrap();
  let helper = helpers(&engine.calls())[0];
  assert!(orchestrator.registry(helper, Direction::Input).is_none());
  assert!(orchestrator.registry(helper, Direction::Output).is_none());
}

#[test]
fn test_message_probe_tolerates_one_sided_blocks() {
  let (engine, _orchestrator) = setup();
  let source = engine.add_block(BlockSpec::source("source"));
  let sink = engine.add_block(BlockSpec::sink("sink"));
  let helper = engine.create_container("bs_block").unwrap();
  let mut table = PortTable::new();

  // Backwards on purpose so both halves hit an unsupported direction.
  let plan = MessageProbe.plan(
    &mut table,
    helper,
    &PortRef::new(sink, "out"),
    &PortRef::new(source, "in"),
  );
  let report = execute(&*engine, helper, &plan).unwrap();
  assert_eq!(report.source, ProbeOutcome::Unsupported);
  assert_eq!(report.destination, ProbeOutcome::Unsupported);
  assert!(engine.pending_edges(helper).is_empty());
}

#[test]
fn test_disabled_message_probe() {
  let config = GraphConfig {
    message_probe: ProbeKind::Disabled,
    ..GraphConfig::default()
  };
  let (engine, orchestrator) = setup_with(config);
  let ids = blocks(&engine, &["p", "q"]);
  let container = engine.create_container("top").unwrap();
  engine.clear_calls();

  let edge = orchestrator
    .msg_connect(container, ids[0], "a", ids[1], "b")
    .unwrap();
  assert_eq!(engine.calls(), vec![EngineCall::Connect { container, edge }]);
}

#[test]
fn test_stream_strategy_on_message_path_resolves_names() {
  let config = GraphConfig {
    message_probe: ProbeKind::Stream,
    ..GraphConfig::default()
  };
  let (engine, orchestrator) = setup_with(config);
  let ids = blocks(&engine, &["p", "q"]);
  let (p, q) = (ids[0], ids[1]);
  let container = engine.create_container("top").unwrap();
  engine.clear_calls();

  let edge = orchestrator
    .msg_connect(container, p, "a", q, "b")
    .unwrap();
  assert_eq!(edge, Edge::new(sp(p, 0), sp(q, 0)));

  let calls = engine.calls();
  let mut expected = probe_calls(helpers(&calls)[0], sp(p, 0), sp(q, 0));
  expected.push(EngineCall::Connect { container, edge });
  assert_eq!(calls, expected);
}

#[test]
fn test_custom_probe_helper_name() {
  let config = GraphConfig {
    probe_container_name: "probe".to_string(),
    ..GraphConfig::default()
  };
  let (engine, orchestrator) = setup_with(config);
  let ids = blocks(&engine, &["a", "b"]);
  let container = engine.create_container("top").unwrap();
  engine.clear_calls();

  orchestrator
    .connect_chain(container, &endpoints![ids[0], ids[1]])
    .unwrap();
  assert!(matches!(
    engine.calls().first(),
    Some(EngineCall::CreateContainer { name, .. }) if name == "probe"
  ));
}

#[test]
fn test_forget_block() {
  let (engine, orchestrator) = setup();
  let a = engine.add_block(BlockSpec::new("a"));
  orchestrator.src_index(a, "x");
  assert!(orchestrator.registry(a, Direction::Output).is_some());
  orchestrator.forget_block(a);
  assert!(orchestrator.registry(a, Direction::Output).is_none());
}

// ============================================================================
// Engines that call back into the orchestrator
// ============================================================================

/// Looks up the destination port name through the orchestrator on every
/// `connect`, the way a message dispatcher would.
#[derive(Default)]
struct IntrospectingEngine {
  inner: MemoryEngine,
  orchestrator: OnceLock<Weak<ConnectionOrchestrator<IntrospectingEngine>>>,
  seen: Mutex<Vec<(StreamPort, Option<String>)>>,
}

impl IntrospectingEngine {
  fn record(&self, dst: StreamPort) {
    let Some(orchestrator) = self.orchestrator.get().and_then(Weak::upgrade) else {
      return;
    };
    let name = orchestrator
      .registry(dst.block, Direction::Input)
      .and_then(|registry| registry.port_name(dst.index).map(str::to_string));
    self.seen.lock().unwrap().push((dst, name));
  }
}

impl Engine for IntrospectingEngine {
  fn create_container(&self, name: &str) -> Result<BlockId, EngineError> {
    self.inner.create_container(name)
  }

  fn release_container(&self, container: BlockId) {
    self.inner.release_container(container)
  }

  fn connect(&self, container: BlockId, src: StreamPort, dst: StreamPort) -> Result<(), EngineError> {
    self.record(dst);
    self.inner.connect(container, src, dst)
  }

  fn disconnect(
    &self,
    container: BlockId,
    src: StreamPort,
    dst: StreamPort,
  ) -> Result<(), EngineError> {
    self.inner.disconnect(container, src, dst)
  }

  fn connect_block(&self, container: BlockId, block: BlockId) -> Result<(), EngineError> {
    self.inner.connect_block(container, block)
  }

  fn disconnect_block(&self, container: BlockId, block: BlockId) -> Result<(), EngineError> {
    self.inner.disconnect_block(container, block)
  }

  fn disconnect_all(&self, container: BlockId) -> Result<(), EngineError> {
    self.inner.disconnect_all(container)
  }

  fn commit(&self, container: BlockId) -> Result<(), EngineError> {
    self.inner.commit(container)
  }

  fn configure(&self, container: BlockId, config: &RunConfig) -> Result<(), EngineError> {
    self.inner.configure(container, config)
  }

  fn start(&self, container: BlockId) -> Result<(), EngineError> {
    self.inner.start(container)
  }

  fn stop(&self, container: BlockId) -> Result<(), EngineError> {
    self.inner.stop(container)
  }

  fn wait(&self, container: BlockId) -> Result<(), EngineError> {
    self.inner.wait(container)
  }
}

/// Runs `f` on a worker thread and fails the test if it does not finish.
fn within_deadline<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
  let (tx, rx) = mpsc::channel();
  thread::spawn(move || {
    let _ = tx.send(f());
  });
  rx.recv_timeout(Duration::from_secs(5))
    .expect("orchestrator blocked while the engine read its registries")
}

#[test]
fn test_engine_may_read_registries_during_calls() {
  init_tracing();
  let engine = Arc::new(IntrospectingEngine::default());
  let orchestrator = Arc::new(ConnectionOrchestrator::new(engine.clone()));
  engine
    .orchestrator
    .set(Arc::downgrade(&orchestrator))
    .unwrap();
  let p = engine.inner.add_block(BlockSpec::new("p"));
  let q = engine.inner.add_block(BlockSpec::new("q"));
  let x = engine.inner.add_block(BlockSpec::new("x"));
  let container = engine.create_container("top").unwrap();

  let worker = orchestrator.clone();
  let edge = within_deadline(move || {
    worker.connect_chain(container, &endpoints![p, x])?;
    worker.msg_connect(container, p, "ctrl", q, "status")
  })
  .unwrap();
  assert_eq!(edge, Edge::new(sp(p, 1), sp(q, 0)));

  let seen = engine.seen.lock().unwrap();
  assert!(seen.contains(&(sp(x, 0), None)));
  assert!(seen.contains(&(sp(q, 0), Some("status".to_string()))));
}
