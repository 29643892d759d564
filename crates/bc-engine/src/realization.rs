//! Plugin realization lifecycle.
//!
//! A plugin slot moves Uninstalled → Installed → Realized and back through
//! an explicit transition table. Because the native graph can change under
//! us (device reset, node torn down elsewhere), `reconcile` re-derives the
//! state from the graph instead of trusting the cached value.

use bc_ir::{AudioGraph, NodeKey, NodeType, TrackId};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RealizationState {
    #[default]
    Uninstalled,
    /// Node exists in the graph but is not processing.
    Installed,
    /// Attached, routed and the graph is running.
    Realized,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RealizationEvent {
    Install,
    Realize,
    Unrealize,
    Uninstall,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RealizationError {
    #[error("cannot {event:?} a plugin that is {state:?}")]
    IllegalTransition {
        state: RealizationState,
        event: RealizationEvent,
    },
    #[error("plugin node for track {0:?} could not be routed")]
    RouteFailed(TrackId),
}

impl RealizationState {
    /// Transition table.
    pub fn apply(self, event: RealizationEvent) -> Result<Self, RealizationError> {
        use RealizationEvent::*;
        use RealizationState::*;
        match (self, event) {
            (Uninstalled, Install) => Ok(Installed),
            (Installed, Realize) => Ok(Realized),
            (Realized, Unrealize) => Ok(Installed),
            (Installed, Uninstall) => Ok(Uninstalled),
            (state, event) => Err(RealizationError::IllegalTransition { state, event }),
        }
    }
}

/// State implied by the graph for `node`.
pub fn reconcile(graph: &AudioGraph, node: Option<NodeKey>) -> RealizationState {
    match node {
        Some(key) if graph.contains(key) => {
            if graph.is_running() && graph.is_attached(key) && graph.has_output_connection(key) {
                RealizationState::Realized
            } else {
                RealizationState::Installed
            }
        }
        _ => RealizationState::Uninstalled,
    }
}

/// One insert plugin on a track.
#[derive(Clone, Debug)]
pub struct PluginSlot {
    track: TrackId,
    node: Option<NodeKey>,
    state: RealizationState,
}

impl PluginSlot {
    pub fn new(track: TrackId) -> Self {
        Self {
            track,
            node: None,
            state: RealizationState::Uninstalled,
        }
    }

    pub fn track(&self) -> TrackId {
        self.track
    }

    pub fn node(&self) -> Option<NodeKey> {
        self.node
    }

    pub fn state(&self) -> RealizationState {
        self.state
    }

    /// Add a detached plugin node to the graph.
    pub fn install(&mut self, graph: &mut AudioGraph, name: &str) -> Result<NodeKey, RealizationError> {
        let next = self.state.apply(RealizationEvent::Install)?;
        let key = graph.add_node(NodeType::Plugin { track: self.track }, name);
        self.node = Some(key);
        self.state = next;
        debug!(track = self.track.0, "plugin installed");
        Ok(key)
    }

    /// Attach the node and route it into `destination`.
    pub fn realize(
        &mut self,
        graph: &mut AudioGraph,
        destination: NodeKey,
    ) -> Result<(), RealizationError> {
        let next = self.state.apply(RealizationEvent::Realize)?;
        let key = self.node.ok_or(RealizationError::RouteFailed(self.track))?;
        graph.attach(key);
        if !graph.connect(key, destination) {
            graph.detach(key);
            return Err(RealizationError::RouteFailed(self.track));
        }
        self.state = next;
        debug!(track = self.track.0, "plugin realized");
        Ok(())
    }

    /// Detach from the graph, keeping the node.
    pub fn unrealize(&mut self, graph: &mut AudioGraph) -> Result<(), RealizationError> {
        let next = self.state.apply(RealizationEvent::Unrealize)?;
        if let Some(key) = self.node {
            graph.detach(key);
        }
        self.state = next;
        Ok(())
    }

    /// Remove the node from the graph.
    pub fn uninstall(&mut self, graph: &mut AudioGraph) -> Result<(), RealizationError> {
        let next = self.state.apply(RealizationEvent::Uninstall)?;
        if let Some(key) = self.node.take() {
            graph.remove_node(key);
        }
        self.state = next;
        Ok(())
    }

    /// Replace the cached state with what the graph says.
    pub fn reconcile(&mut self, graph: &AudioGraph) -> RealizationState {
        let actual = reconcile(graph, self.node);
        if actual != self.state {
            warn!(
                track = self.track.0,
                cached = ?self.state,
                actual = ?actual,
                "plugin realization state out of sync with graph"
            );
            self.state = actual;
        }
        if actual == RealizationState::Uninstalled {
            self.node = None;
        }
        actual
    }
}
