//! Netlist Extraction
//!
//! Turns a hierarchical aspect into a flat list of [`LeafRecord`]s:
//!
//! 1. every connection point gets an electrical-node label ([`label`])
//! 2. components get unique names
//! 3. leaf components become records; other instances are expanded by
//!    extracting their module's schematic with a substituted port map
//!    ([`flatten`])
//!
//! The result can be viewed as a graph with [`circuit::Circuit`].

pub mod circuit;
pub mod flatten;
pub mod label;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::ExtractOptions;
use crate::library::ModuleLookup;
use crate::model::Aspect;
use crate::signal::SignalError;

pub use circuit::{Circuit, CircuitStats};
pub use label::{label_aspect, NodeLabels};

/// One leaf device of the flattened netlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafRecord {
    #[serde(rename = "type")]
    pub type_name: String,
    /// Terminal name to node label.
    pub connections: BTreeMap<String, String>,
    pub properties: BTreeMap<String, String>,
}

impl LeafRecord {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            connections: BTreeMap::new(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_connection(mut self, terminal: impl Into<String>, node: impl Into<String>) -> Self {
        self.connections.insert(terminal.into(), node.into());
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Hierarchical instance name, when the record has one.
    pub fn name(&self) -> Option<&str> {
        self.properties.get("name").map(String::as_str)
    }
}

/// Errors raised while extracting a netlist. Extraction stops at the first.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetlistError {
    #[error("Duplicate component name: {0}")]
    DuplicateName(String),

    #[error(
        "Node has two conflicting sets of labels: [{}], [{}]",
        .existing.join(", "),
        .new.join(", ")
    )]
    ConflictingLabel {
        existing: Vec<String>,
        new: Vec<String>,
    },

    #[error(
        "Number of connections ({got}) for terminal {terminal} of {component} not a multiple of {expected}"
    )]
    ConnectionCountMismatch {
        terminal: String,
        component: String,
        got: usize,
        expected: usize,
    },

    #[error("No schematic for {instance}, an instance of {module}")]
    MissingSchematic { instance: String, module: String },

    #[error("Unknown module: {0}")]
    UnknownModule(String),

    #[error("Recursive inclusion of module: {}", .0.join(" -> "))]
    RecursiveInstantiation(Vec<String>),

    #[error("Node has two conflicting widths: {existing}, {new}")]
    ConflictingWidth { existing: usize, new: usize },

    #[error("Node label [{}] incompatible with specified width {width}", .label.join(", "))]
    LabelWidthMismatch { label: Vec<String>, width: usize },

    #[error("Signals of different widths ({n1}, {n2}) connected by jumper")]
    JumperWidthMismatch { n1: usize, n2: usize },

    #[error("Width {width} exceeds the limit of {limit} bits")]
    WidthTooLarge { width: i64, limit: usize },

    #[error(transparent)]
    Signal(#[from] SignalError),
}

/// Flatten `aspect` into leaf records.
///
/// Leaf types, global signal names and the name of the aspect to recurse
/// into come from `options`. Extraction is all-or-nothing.
pub fn extract(
    aspect: &Aspect,
    lookup: &dyn ModuleLookup,
    options: &ExtractOptions,
) -> Result<Vec<LeafRecord>, NetlistError> {
    let mut extractor = flatten::Extractor::new(lookup, options);
    let netlist = extractor.extract(aspect)?;
    tracing::info!(
        module = aspect.module().unwrap_or("<top>"),
        devices = netlist.len(),
        globals = %extractor.globals().join(","),
        "Extracted netlist"
    );
    Ok(netlist)
}
