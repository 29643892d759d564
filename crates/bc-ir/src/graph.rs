//! Audio graph model: player, mixer and plugin nodes routed to one output.
//!
//! This mirrors the host's native audio graph so that playback and health
//! code can ask "is this node attached / routed / is the graph running"
//! without touching the hardware layer.

use std::collections::HashMap;

use arrayvec::ArrayString;
use slotmap::SlotMap;

use crate::event::TrackId;

slotmap::new_key_type! {
    /// Stable handle to a graph node.
    pub struct NodeKey;
}

/// Type of audio graph node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeType {
    /// Hardware output (exactly one per graph)
    Output,
    /// Summing mixer
    Mixer,
    /// Per-track buffer player
    Player { track: TrackId },
    /// Per-track insert plugin
    Plugin { track: TrackId },
}

/// A node in the audio graph.
#[derive(Clone, Debug)]
pub struct Node {
    pub node_type: NodeType,
    /// Display name (truncated to 32 bytes)
    pub name: ArrayString<32>,
    /// Whether the node is attached to the running graph
    pub attached: bool,
}

/// Directed connection between two nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Connection {
    pub from: NodeKey,
    pub to: NodeKey,
}

/// The audio processing graph.
#[derive(Clone, Debug)]
pub struct AudioGraph {
    nodes: SlotMap<NodeKey, Node>,
    connections: Vec<Connection>,
    output: NodeKey,
    running: bool,
}

impl AudioGraph {
    /// Create a graph with just an attached output node.
    pub fn with_output() -> Self {
        let mut nodes = SlotMap::with_key();
        let output = nodes.insert(Node {
            node_type: NodeType::Output,
            name: label("Output"),
            attached: true,
        });
        Self {
            nodes,
            connections: Vec::new(),
            output,
            running: false,
        }
    }

    pub fn output(&self) -> NodeKey {
        self.output
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    /// Add a detached node and return its key.
    pub fn add_node(&mut self, node_type: NodeType, name: &str) -> NodeKey {
        self.nodes.insert(Node {
            node_type,
            name: label(name),
            attached: false,
        })
    }

    /// Remove a node and every connection touching it. The output node stays.
    pub fn remove_node(&mut self, key: NodeKey) -> Option<Node> {
        if key == self.output {
            return None;
        }
        self.disconnect_all(key);
        self.nodes.remove(key)
    }

    pub fn attach(&mut self, key: NodeKey) -> bool {
        match self.nodes.get_mut(key) {
            Some(node) => {
                node.attached = true;
                true
            }
            None => false,
        }
    }

    /// Detach a node; detaching also drops its connections.
    pub fn detach(&mut self, key: NodeKey) {
        if key == self.output {
            return;
        }
        if let Some(node) = self.nodes.get_mut(key) {
            node.attached = false;
        }
        self.disconnect_all(key);
    }

    /// Connect two attached nodes. Returns false if either is missing or detached.
    pub fn connect(&mut self, from: NodeKey, to: NodeKey) -> bool {
        if !self.is_attached(from) || !self.is_attached(to) || from == to {
            return false;
        }
        let conn = Connection { from, to };
        if !self.connections.contains(&conn) {
            self.connections.push(conn);
        }
        true
    }

    pub fn disconnect(&mut self, from: NodeKey, to: NodeKey) {
        self.connections.retain(|c| !(c.from == from && c.to == to));
    }

    pub fn disconnect_all(&mut self, key: NodeKey) {
        self.connections.retain(|c| c.from != key && c.to != key);
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn node(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    pub fn is_attached(&self, key: NodeKey) -> bool {
        self.nodes.get(key).is_some_and(|n| n.attached)
    }

    /// Whether the node feeds at least one other node.
    pub fn has_output_connection(&self, key: NodeKey) -> bool {
        self.connections.iter().any(|c| c.from == key)
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeKey, &Node)> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Find the node of the given type for a track.
    pub fn find(&self, node_type: NodeType) -> Option<NodeKey> {
        self.nodes
            .iter()
            .find(|(_, n)| n.node_type == node_type)
            .map(|(k, _)| k)
    }

    /// Whether a path of connections leads from `key` to the output node.
    pub fn routes_to_output(&self, key: NodeKey) -> bool {
        let mut stack = vec![key];
        let mut seen = Vec::new();
        while let Some(current) = stack.pop() {
            if current == self.output {
                return true;
            }
            if seen.contains(&current) {
                continue;
            }
            seen.push(current);
            stack.extend(
                self.connections
                    .iter()
                    .filter(|c| c.from == current)
                    .map(|c| c.to),
            );
        }
        false
    }

    /// Topological order via Kahn's algorithm, or `None` if the graph has a cycle.
    pub fn topological_order(&self) -> Option<Vec<NodeKey>> {
        let mut in_degree: HashMap<NodeKey, u32> = self.nodes.keys().map(|k| (k, 0)).collect();
        for conn in &self.connections {
            if let Some(d) = in_degree.get_mut(&conn.to) {
                *d += 1;
            }
        }

        let mut queue: Vec<NodeKey> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(&k, _)| k)
            .collect();
        let mut result = Vec::with_capacity(self.nodes.len());

        while let Some(key) = queue.pop() {
            result.push(key);
            for conn in self.connections.iter().filter(|c| c.from == key) {
                if let Some(d) = in_degree.get_mut(&conn.to) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push(conn.to);
                    }
                }
            }
        }

        (result.len() == self.nodes.len()).then_some(result)
    }

    /// Connections whose endpoints no longer exist.
    pub fn dangling_connections(&self) -> usize {
        self.connections
            .iter()
            .filter(|c| !self.contains(c.from) || !self.contains(c.to))
            .count()
    }

    /// Test/diagnostic hook: insert a raw connection without validation.
    #[doc(hidden)]
    pub fn push_unchecked(&mut self, from: NodeKey, to: NodeKey) {
        self.connections.push(Connection { from, to });
    }
}

impl Default for AudioGraph {
    fn default() -> Self {
        Self::with_output()
    }
}

fn label(name: &str) -> ArrayString<32> {
    let mut s = ArrayString::new();
    for ch in name.chars() {
        if s.try_push(ch).is_err() {
            break;
        }
    }
    s
}
