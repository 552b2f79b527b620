//! Schemnet - hierarchical schematic model and netlist extraction
//!
//! This library keeps a schematic as a graph of components joined at
//! connection points, maintains its wires while it is edited (with undo and
//! redo), and flattens a hierarchy of modules into a list of leaf devices
//! for a simulator.
//!
//! # Quick Start
//!
//! ```no_run
//! use schemnet::{ExtractOptions, SchemnetCore};
//! use std::path::Path;
//!
//! let libraries = SchemnetCore::load_libraries(Path::new("user.json")).unwrap();
//! let module = SchemnetCore::resolve_module(&libraries, "adder").unwrap();
//! let netlist = SchemnetCore::extract(module, &libraries, &ExtractOptions::gate_level()).unwrap();
//!
//! for record in &netlist {
//!     println!("{} {:?}", record.type_name, record.connections);
//! }
//! ```
//!
//! # Features
//!
//! - **Editing model**: location index, wire bisection and merging,
//!   transactional undo/redo
//! - **Signal syntax**: buses, replication and numeric constants
//! - **Libraries**: JSON modules plus a built-in gate library
//! - **Extraction**: hierarchical labelling, instance replication over
//!   buses, recursion detection
//! - **Circuit graph**: petgraph view of the flat netlist

pub mod core;
pub mod geometry;
pub mod library;
pub mod model;
pub mod netlist;
pub mod signal;

// Re-export main types
pub use crate::core::{ExtractOptions, SchemnetCore, SchemnetError};
pub use geometry::{Location, Rect, Rotation};
pub use library::{Library, LibrarySet, Module, ModuleLookup};
pub use model::{Aspect, Component, ComponentId, ModelError};
pub use netlist::{extract, Circuit, LeafRecord, NetlistError};
pub use signal::{parse_signal, SignalError, MAX_SIGNAL_WIDTH};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        Aspect, Component, ExtractOptions, LeafRecord, Library, LibrarySet, ModuleLookup,
        NetlistError, SchemnetCore, SchemnetError,
    };
}
