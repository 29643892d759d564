//! Audio graph sanity checks.
//!
//! Runs on a low-priority worker, never on the render thread. The cheap
//! check looks only at the running flag and the output's inputs; the full
//! check walks every player route and sorts the graph. Both are timed
//! against a budget, and the verdict is published through an atomic that
//! any thread can read.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arrayvec::ArrayVec;
use bc_ir::{AudioGraph, NodeType, TrackId};
use tracing::{info, warn};

use crate::config::HealthConfig;

/// Issues recorded per check before the rest are dropped.
pub const MAX_ISSUES: usize = 16;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum GraphHealth {
    #[default]
    Unknown = 0,
    Healthy = 1,
    /// Plays, but some tracks will be silent or the check ran long.
    Degraded = 2,
    /// Nothing will reach the output.
    Failed = 3,
}

impl GraphHealth {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => GraphHealth::Healthy,
            2 => GraphHealth::Degraded,
            3 => GraphHealth::Failed,
            _ => GraphHealth::Unknown,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HealthIssue {
    NotRunning,
    OutputUnreachable,
    PlayerDetached(TrackId),
    PlayerNotRouted(TrackId),
    DanglingConnections(usize),
    Cycle,
}

impl HealthIssue {
    fn is_fatal(&self) -> bool {
        matches!(
            self,
            HealthIssue::NotRunning | HealthIssue::OutputUnreachable | HealthIssue::Cycle
        )
    }
}

#[derive(Clone, Debug)]
pub struct CheckReport {
    pub issues: ArrayVec<HealthIssue, MAX_ISSUES>,
    pub elapsed: Duration,
    pub over_budget: bool,
}

impl CheckReport {
    pub fn health(&self) -> GraphHealth {
        if self.issues.iter().any(HealthIssue::is_fatal) {
            GraphHealth::Failed
        } else if !self.issues.is_empty() || self.over_budget {
            GraphHealth::Degraded
        } else {
            GraphHealth::Healthy
        }
    }
}

/// Running flag plus "something feeds the output".
pub fn quick_check(graph: &AudioGraph, budget: Duration) -> CheckReport {
    let started = Instant::now();
    let mut issues = ArrayVec::new();
    if !graph.is_running() {
        issues.push(HealthIssue::NotRunning);
    }
    let output = graph.output();
    if graph.len() > 1 && !graph.connections().iter().any(|c| c.to == output) {
        issues.push(HealthIssue::OutputUnreachable);
    }
    finish(issues, started, budget)
}

/// Quick check plus every player attached and routed, no dangling
/// connections, and no cycles.
pub fn full_check(graph: &AudioGraph, budget: Duration) -> CheckReport {
    let started = Instant::now();
    let mut issues = quick_check(graph, budget).issues;

    for (key, node) in graph.nodes() {
        if let NodeType::Player { track } = node.node_type {
            let issue = if !node.attached {
                Some(HealthIssue::PlayerDetached(track))
            } else if !graph.routes_to_output(key) {
                Some(HealthIssue::PlayerNotRouted(track))
            } else {
                None
            };
            if let Some(issue) = issue {
                let _ = issues.try_push(issue);
            }
        }
    }
    let dangling = graph.dangling_connections();
    if dangling > 0 {
        let _ = issues.try_push(HealthIssue::DanglingConnections(dangling));
    }
    if graph.topological_order().is_none() {
        let _ = issues.try_push(HealthIssue::Cycle);
    }
    finish(issues, started, budget)
}

fn finish(
    issues: ArrayVec<HealthIssue, MAX_ISSUES>,
    started: Instant,
    budget: Duration,
) -> CheckReport {
    let elapsed = started.elapsed();
    CheckReport {
        issues,
        elapsed,
        over_budget: elapsed > budget,
    }
}

/// Lock-free, cloneable view of the latest verdict.
#[derive(Clone, Debug, Default)]
pub struct HealthSignal {
    state: Arc<AtomicU8>,
}

impl HealthSignal {
    pub fn get(&self) -> GraphHealth {
        GraphHealth::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set(&self, health: GraphHealth) -> GraphHealth {
        GraphHealth::from_u8(self.state.swap(health as u8, Ordering::AcqRel))
    }
}

/// Alternates quick checks with a periodic full check.
pub struct HealthMonitor {
    config: HealthConfig,
    signal: HealthSignal,
    quick_since_full: u32,
}

impl HealthMonitor {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            signal: HealthSignal::default(),
            quick_since_full: 0,
        }
    }

    pub fn signal(&self) -> HealthSignal {
        self.signal.clone()
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Run whichever check is due and publish the result.
    pub fn run_once(&mut self, graph: &AudioGraph) -> CheckReport {
        let report = if self.quick_since_full >= self.config.full_check_every {
            self.quick_since_full = 0;
            full_check(graph, self.config.full_budget())
        } else {
            self.quick_since_full += 1;
            quick_check(graph, self.config.quick_budget())
        };

        if report.over_budget {
            warn!(
                elapsed_us = report.elapsed.as_micros() as u64,
                "graph health check over budget"
            );
        }
        let health = report.health();
        let previous = self.signal.set(health);
        if previous != health {
            match health {
                GraphHealth::Healthy => info!(?previous, "audio graph healthy"),
                _ => warn!(
                    ?previous,
                    ?health,
                    issues = ?report.issues,
                    "audio graph health changed"
                ),
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUDGET: Duration = Duration::from_secs(1);

    fn healthy_graph() -> AudioGraph {
        let mut g = AudioGraph::with_output();
        g.set_running(true);
        let mixer = g.add_node(NodeType::Mixer, "mix");
        let player = g.add_node(NodeType::Player { track: TrackId(1) }, "t1");
        g.attach(mixer);
        g.attach(player);
        g.connect(player, mixer);
        let out = g.output();
        g.connect(mixer, out);
        g
    }

    #[test]
    fn healthy_graph_passes_both_checks() {
        let g = healthy_graph();
        assert_eq!(quick_check(&g, BUDGET).health(), GraphHealth::Healthy);
        assert_eq!(full_check(&g, BUDGET).health(), GraphHealth::Healthy);
    }

    #[test]
    fn stopped_graph_fails_quick_check() {
        let mut g = healthy_graph();
        g.set_running(false);
        let report = quick_check(&g, BUDGET);
        assert_eq!(report.health(), GraphHealth::Failed);
        assert!(report.issues.contains(&HealthIssue::NotRunning));
    }

    #[test]
    fn unrouted_player_degrades() {
        let mut g = healthy_graph();
        let p = g.add_node(NodeType::Player { track: TrackId(2) }, "t2");
        g.attach(p);
        let report = full_check(&g, BUDGET);
        assert_eq!(report.health(), GraphHealth::Degraded);
        assert!(report.issues.contains(&HealthIssue::PlayerNotRouted(TrackId(2))));
    }

    #[test]
    fn detached_player_reported() {
        let mut g = healthy_graph();
        g.add_node(NodeType::Player { track: TrackId(3) }, "t3");
        let report = full_check(&g, BUDGET);
        assert!(report.issues.contains(&HealthIssue::PlayerDetached(TrackId(3))));
    }

    #[test]
    fn cycle_fails_full_check() {
        let mut g = healthy_graph();
        let mixer = g.find(NodeType::Mixer).unwrap();
        let player = g.find(NodeType::Player { track: TrackId(1) }).unwrap();
        g.push_unchecked(mixer, player);
        assert_eq!(full_check(&g, BUDGET).health(), GraphHealth::Failed);
    }

    #[test]
    fn zero_budget_marks_over_budget() {
        let g = healthy_graph();
        let report = full_check(&g, Duration::ZERO);
        // Any measurable time exceeds a zero budget.
        if report.elapsed > Duration::ZERO {
            assert_eq!(report.health(), GraphHealth::Degraded);
        }
    }

    #[test]
    fn monitor_runs_full_check_periodically() {
        let mut g = healthy_graph();
        let p = g.add_node(NodeType::Player { track: TrackId(2) }, "t2");
        g.attach(p);

        let mut monitor = HealthMonitor::new(HealthConfig {
            full_check_every: 2,
            full_budget_us: 1_000_000,
            quick_budget_us: 1_000_000,
            ..HealthConfig::default()
        });
        let signal = monitor.signal();
        assert_eq!(signal.get(), GraphHealth::Unknown);

        monitor.run_once(&g);
        assert_eq!(signal.get(), GraphHealth::Healthy);
        monitor.run_once(&g);
        assert_eq!(signal.get(), GraphHealth::Healthy);
        monitor.run_once(&g);
        assert_eq!(signal.get(), GraphHealth::Degraded);
    }
}
