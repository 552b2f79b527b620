//! Core extraction API shared by the library and the CLI.

use std::path::Path;

use crate::library::builtin::{self, PRIMITIVE_LEAF_TYPES};
use crate::library::{Library, LibrarySet, Module, ModuleLookup};
use crate::model::ModelError;
use crate::netlist::{self, Circuit, LeafRecord, NetlistError};

#[derive(Debug, thiserror::Error)]
pub enum SchemnetError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Netlist(#[from] NetlistError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for SchemnetError {
    fn from(e: serde_json::Error) -> Self {
        SchemnetError::Parse(e.to_string())
    }
}

/// Options for netlist extraction.
#[derive(Clone, Debug)]
pub struct ExtractOptions {
    /// Types emitted as records instead of being expanded.
    pub leaf_types: Vec<String>,
    /// Any type starting with one of these is a leaf too.
    pub leaf_prefixes: Vec<String>,
    /// Signal names shared by every level of the hierarchy.
    pub globals: Vec<String>,
    /// Aspect expanded for non-leaf instances.
    pub schematic_aspect: String,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            leaf_types: PRIMITIVE_LEAF_TYPES.iter().map(|s| s.to_string()).collect(),
            leaf_prefixes: vec![],
            globals: vec![],
            schematic_aspect: "schematic".to_string(),
        }
    }
}

impl ExtractOptions {
    /// Primitives plus every gate of the built-in `/gates/` library.
    pub fn gate_level() -> Self {
        Self {
            leaf_types: builtin::gate_leaf_types(),
            ..Self::default()
        }
    }

    pub fn with_leaf(mut self, type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        if !self.leaf_types.contains(&type_name) {
            self.leaf_types.push(type_name);
        }
        self
    }

    pub fn with_leaf_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.leaf_prefixes.push(prefix.into());
        self
    }

    pub fn with_global(mut self, name: impl Into<String>) -> Self {
        let name = name.into().to_lowercase();
        if !self.globals.contains(&name) {
            self.globals.push(name);
        }
        self
    }

    pub fn with_schematic_aspect(mut self, aspect: impl Into<String>) -> Self {
        self.schematic_aspect = aspect.into();
        self
    }

    pub fn is_leaf(&self, type_name: &str) -> bool {
        self.leaf_types.iter().any(|t| t == type_name)
            || self.leaf_prefixes.iter().any(|p| type_name.starts_with(p.as_str()))
    }
}

/// Core API used by the CLI: library loading plus extraction.
pub struct SchemnetCore;

impl SchemnetCore {
    /// The built-in `/gates/` library followed by the library in `path`,
    /// whose name is the file stem. A directory loads every `*.json` file in
    /// it; files that fail to load are skipped with a warning.
    pub fn load_libraries(path: &Path) -> Result<LibrarySet, SchemnetError> {
        let gates = builtin::gates_library();
        if path.is_dir() {
            let (loaded, errors) = builtin::load_libraries_from_directory(path, &gates);
            for error in &errors {
                tracing::warn!("{}", error);
            }
            if loaded.is_empty() {
                return Err(SchemnetError::Other(format!(
                    "No libraries could be loaded from {:?}",
                    path
                )));
            }
            let mut libraries = LibrarySet::new();
            libraries.push(gates);
            for library in loaded {
                libraries.push(library);
            }
            return Ok(libraries);
        }

        let content = std::fs::read_to_string(path)?;
        let value: serde_json::Value = serde_json::from_str(&content)?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| SchemnetError::Other(format!("Invalid library path {:?}", path)))?;
        let library = Library::from_json(name, &value, &gates)?;
        tracing::info!(
            "Loaded library {} ({} modules) from {:?}",
            library.name(),
            library.len(),
            path
        );

        let mut libraries = LibrarySet::new();
        libraries.push(gates);
        libraries.push(library);
        Ok(libraries)
    }

    /// Find a module by qualified name, or by bare name in any library
    /// (latest loaded first).
    pub fn resolve_module<'a>(
        libraries: &'a LibrarySet,
        name: &str,
    ) -> Result<&'a Module, SchemnetError> {
        if name.starts_with('/') {
            return Ok(libraries.require_module(name)?);
        }
        libraries
            .libraries()
            .iter()
            .rev()
            .find_map(|library| library.module(&library.qualify(name)))
            .ok_or_else(|| ModelError::UnknownModule(name.to_string()).into())
    }

    /// Flatten a module's schematic into leaf records.
    pub fn extract(
        module: &Module,
        lookup: &dyn ModuleLookup,
        options: &ExtractOptions,
    ) -> Result<Vec<LeafRecord>, SchemnetError> {
        let schematic = module
            .aspect(&options.schematic_aspect)
            .filter(|aspect| !aspect.is_empty())
            .ok_or_else(|| NetlistError::MissingSchematic {
                instance: module.name().to_string(),
                module: module.name().to_string(),
            })?;
        Ok(netlist::extract(schematic, lookup, options)?)
    }

    /// Sorted node names of a module's flattened netlist.
    pub fn nodes(
        module: &Module,
        lookup: &dyn ModuleLookup,
        options: &ExtractOptions,
    ) -> Result<Vec<String>, SchemnetError> {
        let netlist = Self::extract(module, lookup, options)?;
        let circuit = Circuit::from_netlist(&netlist);
        Ok(circuit.nodes().into_iter().map(str::to_string).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = ExtractOptions::default();
        assert!(options.is_leaf("ground"));
        assert!(options.is_leaf("memory"));
        assert!(!options.is_leaf("/gates/nand2"));
        assert_eq!(options.schematic_aspect, "schematic");
    }

    #[test]
    fn test_builders() {
        let options = ExtractOptions::default()
            .with_leaf("/user/cell")
            .with_leaf_prefix("/analog/")
            .with_global("VDD")
            .with_global("vdd");
        assert!(options.is_leaf("/user/cell"));
        assert!(options.is_leaf("/analog/nfet"));
        assert_eq!(options.globals, vec!["vdd".to_string()]);
    }

    #[test]
    fn test_gate_level_options() {
        let options = ExtractOptions::gate_level();
        assert!(options.is_leaf("/gates/nand2"));
        assert!(options.is_leaf("jumper"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = SchemnetCore::load_libraries(Path::new("/nonexistent/lib.json")).unwrap_err();
        assert!(matches!(err, SchemnetError::Io(_)));
    }

    #[test]
    fn test_resolve_bare_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cells.json");
        std::fs::write(&path, r#"{"buf": {"icon": [["terminal", [0, 0, 0], {"name": "a"}]]}}"#)
            .unwrap();
        let libraries = SchemnetCore::load_libraries(&path).unwrap();
        let module = SchemnetCore::resolve_module(&libraries, "buf").unwrap();
        assert_eq!(module.name(), "/cells/buf");
        let gate = SchemnetCore::resolve_module(&libraries, "nand2").unwrap();
        assert_eq!(gate.name(), "/gates/nand2");
        assert!(SchemnetCore::resolve_module(&libraries, "adder").is_err());
    }

    #[test]
    fn test_load_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("cells.json"),
            r#"{"buf": {"icon": [["terminal", [0, 0, 0], {"name": "a"}]]}}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("broken.json"), "[]").unwrap();

        let libraries = SchemnetCore::load_libraries(dir.path()).unwrap();
        assert_eq!(libraries.libraries().len(), 2);
        assert!(libraries.find_module("/cells/buf").is_some());

        let empty = tempfile::tempdir().unwrap();
        assert!(matches!(
            SchemnetCore::load_libraries(empty.path()),
            Err(SchemnetError::Other(_))
        ));
    }

    #[test]
    fn test_extract_without_schematic() {
        let module = Module::new("/user/empty");
        let err = SchemnetCore::extract(&module, &LibrarySet::new(), &ExtractOptions::default())
            .unwrap_err();
        assert!(matches!(
            err,
            SchemnetError::Netlist(NetlistError::MissingSchematic { .. })
        ));
    }
}
