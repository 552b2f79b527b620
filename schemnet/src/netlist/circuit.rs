//! Circuit Graph
//!
//! A petgraph view of a flat netlist. Devices and electrical nodes are both
//! graph vertices; every terminal connection is an edge between them. The
//! graph enables:
//! - Node listing for simulators
//! - Device/node neighbourhood queries
//! - Path finding between devices
//! - Connectivity statistics

use std::collections::HashMap;

use petgraph::algo::{astar, connected_components};
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use super::LeafRecord;

/// Vertex in the circuit graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CircuitNode {
    /// A leaf device, keyed by its instance name
    Device { key: String, record: LeafRecord },

    /// An electrical node
    Node(String),
}

impl CircuitNode {
    pub fn is_device(&self) -> bool {
        matches!(self, CircuitNode::Device { .. })
    }

    pub fn is_node(&self) -> bool {
        matches!(self, CircuitNode::Node(_))
    }

    pub fn as_device(&self) -> Option<&LeafRecord> {
        match self {
            CircuitNode::Device { record, .. } => Some(record),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&str> {
        match self {
            CircuitNode::Node(name) => Some(name),
            _ => None,
        }
    }

    fn label(&self) -> String {
        match self {
            CircuitNode::Device { key, .. } => key.clone(),
            CircuitNode::Node(name) => format!("[{}]", name),
        }
    }
}

/// Edge in the circuit graph: one device terminal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitEdge {
    pub terminal: String,
}

impl CircuitEdge {
    pub fn new(terminal: impl Into<String>) -> Self {
        Self {
            terminal: terminal.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Circuit {
    graph: UnGraph<CircuitNode, CircuitEdge>,

    /// Device key -> vertex
    device_indices: HashMap<String, NodeIndex>,

    /// Node name -> vertex
    node_indices: HashMap<String, NodeIndex>,
}

impl Circuit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph for a netlist. Devices without a `name` property
    /// (jumpers, ground) are keyed `type#index`.
    pub fn from_netlist(netlist: &[LeafRecord]) -> Self {
        let mut circuit = Self::new();
        for (index, record) in netlist.iter().enumerate() {
            let key = record
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("{}#{}", record.type_name, index));
            circuit.add_device(key, record.clone());
        }
        circuit
    }

    /// Add a device and connect it to its nodes, creating them as needed.
    pub fn add_device(&mut self, key: impl Into<String>, record: LeafRecord) -> NodeIndex {
        let key = key.into();
        let connections: Vec<(String, String)> = record
            .connections
            .iter()
            .map(|(t, n)| (t.clone(), n.clone()))
            .collect();
        let idx = self.graph.add_node(CircuitNode::Device {
            key: key.clone(),
            record,
        });
        if self.device_indices.insert(key.clone(), idx).is_some() {
            tracing::warn!("Device {} appears more than once in the netlist", key);
        }
        for (terminal, node) in connections {
            let node_idx = self.node_index(&node);
            self.graph.add_edge(idx, node_idx, CircuitEdge::new(terminal));
        }
        idx
    }

    fn node_index(&mut self, name: &str) -> NodeIndex {
        if let Some(idx) = self.node_indices.get(name) {
            return *idx;
        }
        let idx = self.graph.add_node(CircuitNode::Node(name.to_string()));
        self.node_indices.insert(name.to_string(), idx);
        idx
    }

    pub fn device(&self, key: &str) -> Option<&LeafRecord> {
        self.device_indices
            .get(key)
            .and_then(|idx| self.graph.node_weight(*idx))
            .and_then(CircuitNode::as_device)
    }

    pub fn devices(&self) -> impl Iterator<Item = &LeafRecord> {
        self.graph.node_weights().filter_map(CircuitNode::as_device)
    }

    /// Every electrical node name, sorted.
    pub fn nodes(&self) -> Vec<&str> {
        let mut nodes: Vec<&str> = self.node_indices.keys().map(String::as_str).collect();
        nodes.sort_unstable();
        nodes
    }

    /// `(terminal, device key)` pairs attached to `node`, sorted.
    pub fn devices_on_node(&self, node: &str) -> Vec<(&str, &str)> {
        let Some(idx) = self.node_indices.get(node) else {
            return Vec::new();
        };
        let mut out: Vec<(&str, &str)> = self
            .graph
            .edges(*idx)
            .filter_map(|edge| {
                let other = if edge.source() == *idx { edge.target() } else { edge.source() };
                match self.graph.node_weight(other) {
                    Some(CircuitNode::Device { key, .. }) => {
                        Some((edge.weight().terminal.as_str(), key.as_str()))
                    }
                    _ => None,
                }
            })
            .collect();
        out.sort_unstable();
        out
    }

    /// `(terminal, node)` pairs of a device, sorted by terminal.
    pub fn nodes_for_device(&self, key: &str) -> Vec<(&str, &str)> {
        let Some(idx) = self.device_indices.get(key) else {
            return Vec::new();
        };
        let mut out: Vec<(&str, &str)> = self
            .graph
            .edges(*idx)
            .filter_map(|edge| {
                let other = if edge.source() == *idx { edge.target() } else { edge.source() };
                self.graph
                    .node_weight(other)
                    .and_then(CircuitNode::as_node)
                    .map(|node| (edge.weight().terminal.as_str(), node))
            })
            .collect();
        out.sort_unstable();
        out
    }

    /// Shortest device-node-device chain between two devices. Nodes are
    /// shown as `[name]`.
    pub fn find_path(&self, from: &str, to: &str) -> Option<Vec<String>> {
        let from_idx = self.device_indices.get(from)?;
        let to_idx = self.device_indices.get(to)?;

        let (_, path) = astar(&self.graph, *from_idx, |n| n == *to_idx, |_| 1, |_| 0)?;
        Some(
            path.into_iter()
                .filter_map(|idx| self.graph.node_weight(idx))
                .map(CircuitNode::label)
                .collect(),
        )
    }

    pub fn stats(&self) -> CircuitStats {
        CircuitStats {
            device_count: self.device_indices.len(),
            node_count: self.node_indices.len(),
            connection_count: self.graph.edge_count(),
            connected_groups: connected_components(&self.graph),
        }
    }
}

/// Statistics about a circuit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitStats {
    pub device_count: usize,
    pub node_count: usize,
    pub connection_count: usize,
    pub connected_groups: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_circuit() -> Circuit {
        let netlist = vec![
            LeafRecord::new("/gates/inverter")
                .with_connection("a", "in")
                .with_connection("z", "mid")
                .with_property("name", "u1"),
            LeafRecord::new("/gates/inverter")
                .with_connection("a", "mid")
                .with_connection("z", "out")
                .with_property("name", "u2"),
            LeafRecord::new("ground").with_connection("gnd", "gnd"),
        ];
        Circuit::from_netlist(&netlist)
    }

    #[test]
    fn test_nodes_are_sorted() {
        let circuit = create_test_circuit();
        assert_eq!(circuit.nodes(), vec!["gnd", "in", "mid", "out"]);
    }

    #[test]
    fn test_devices_on_node() {
        let circuit = create_test_circuit();
        assert_eq!(circuit.devices_on_node("mid"), vec![("a", "u2"), ("z", "u1")]);
        assert_eq!(circuit.devices_on_node("gnd"), vec![("gnd", "ground#2")]);
        assert!(circuit.devices_on_node("nowhere").is_empty());
    }

    #[test]
    fn test_nodes_for_device() {
        let circuit = create_test_circuit();
        assert_eq!(circuit.nodes_for_device("u1"), vec![("a", "in"), ("z", "mid")]);
        assert!(circuit.device("u2").is_some());
    }

    #[test]
    fn test_find_path() {
        let circuit = create_test_circuit();
        assert_eq!(
            circuit.find_path("u1", "u2"),
            Some(vec!["u1".to_string(), "[mid]".to_string(), "u2".to_string()])
        );
        assert_eq!(circuit.find_path("u1", "ground#2"), None);
    }

    #[test]
    fn test_circuit_stats() {
        let stats = create_test_circuit().stats();
        assert_eq!(stats.device_count, 3);
        assert_eq!(stats.node_count, 4);
        assert_eq!(stats.connection_count, 5);
        assert_eq!(stats.connected_groups, 2);
    }
}
