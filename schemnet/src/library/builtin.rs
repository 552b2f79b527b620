//! Built-in and External Module Libraries
//!
//! Libraries come from two places:
//! 1. The `/gates/` library embedded in the binary
//! 2. JSON files in a user directory, one library per file named after the
//!    file stem
//!
//! Directory loading never fails as a whole; per-file problems are
//! collected and returned next to the libraries that did load.

use std::path::Path;

use super::{Library, ModuleLookup};

const EMBEDDED_GATES: &str = include_str!("../../libraries/gates.json");

/// Built-in types that netlist consumers treat as primitives.
pub const PRIMITIVE_LEAF_TYPES: [&str; 3] = ["ground", "jumper", "memory"];

/// The embedded `/gates/` library: inverter, buffer, nand2, nor2, and2,
/// or2, xor2 and dreg.
pub fn gates_library() -> Library {
    let parsed = serde_json::from_str(EMBEDDED_GATES)
        .map_err(|e| e.to_string())
        .and_then(|value| {
            Library::from_json("gates", &value, &Library::default()).map_err(|e| e.to_string())
        });
    match parsed {
        Ok(library) => library,
        Err(e) => {
            tracing::warn!("Failed to parse embedded gates library: {}", e);
            Library::new("gates")
        }
    }
}

/// Leaf types for gate-level extraction: the primitives plus every gate.
pub fn gate_leaf_types() -> Vec<String> {
    let gates = gates_library();
    PRIMITIVE_LEAF_TYPES
        .iter()
        .map(|s| s.to_string())
        .chain(gates.module_names().map(str::to_string))
        .collect()
}

/// Load every `*.json` library in `dir`.
/// Returns both successfully loaded libraries and any errors encountered.
pub fn load_libraries_from_directory(
    dir: &Path,
    external: &dyn ModuleLookup,
) -> (Vec<Library>, Vec<String>) {
    let mut libraries = Vec::new();
    let mut errors = Vec::new();

    if !dir.is_dir() {
        return (libraries, errors);
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            errors.push(format!("Failed to read directory {:?}: {}", dir, e));
            return (libraries, errors);
        }
    };

    let mut paths: Vec<_> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().map(|e| e == "json").unwrap_or(false))
        .collect();
    paths.sort();

    for path in paths {
        match load_library_from_file(&path, external) {
            Ok(library) => {
                tracing::info!(
                    "Loaded library {} ({} modules) from {:?}",
                    library.name(),
                    library.len(),
                    path.file_name()
                );
                libraries.push(library);
            }
            Err(e) => {
                let error_msg = format!("Failed to load {:?}: {}", path.file_name(), e);
                tracing::warn!("{}", error_msg);
                errors.push(error_msg);
            }
        }
    }

    (libraries, errors)
}

/// Load a single library; its name is the file stem.
pub fn load_library_from_file(path: &Path, external: &dyn ModuleLookup) -> Result<Library, String> {
    let content =
        std::fs::read_to_string(path).map_err(|e| format!("Failed to read file: {}", e))?;
    let value: serde_json::Value =
        serde_json::from_str(&content).map_err(|e| format!("Failed to parse JSON: {}", e))?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("user");
    Library::from_json(name, &value, external).map_err(|e| e.to_string())
}
