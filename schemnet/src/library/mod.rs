//! Modules and Libraries
//!
//! A [`Module`] is a named container of aspects (`icon`, `schematic`, ...)
//! with a property schema. A [`Library`] owns modules under a common
//! `/library/` prefix and a [`LibrarySet`] searches several libraries in
//! order. Anything that can resolve a qualified module name implements
//! [`ModuleLookup`].
//!
//! # Library JSON
//!
//! ```json
//! {
//!   "half_adder": {
//!     "properties": { "name": { "type": "name", "label": "Name", "value": "", "edit": "yes" } },
//!     "icon": [["terminal", [0, 0, 0], {"name": "a"}]],
//!     "schematic": [["port", [0, 0, 0], {"signal": "a"}]]
//!   }
//! }
//! ```

pub mod builtin;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::{Aspect, ModelError};

/// Resolve a qualified module name such as `/gates/nand2`.
pub trait ModuleLookup {
    fn find_module(&self, name: &str) -> Option<&Module>;

    /// Qualified form of a type name as written in a component.
    fn qualify(&self, name: &str) -> String {
        qualify_name(name)
    }
}

/// Unqualified names live in the `/user/` library.
pub fn qualify_name(name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/user/{}", name)
    }
}

/// Schema entry for one module property.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDef {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub label: String,
    /// Default value.
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub edit: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

impl PropertyDef {
    pub fn new(kind: impl Into<String>, label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            label: label.into(),
            value: value.into(),
            edit: "yes".to_string(),
            choices: Vec::new(),
        }
    }

    /// The `name` property every module declares.
    pub fn instance_name() -> Self {
        Self::new("name", "Name", "")
    }
}

/// A named module with its property schema and aspects.
#[derive(Debug, Clone)]
pub struct Module {
    name: String,
    properties: BTreeMap<String, PropertyDef>,
    aspects: BTreeMap<String, Aspect>,
}

impl Module {
    pub fn new(name: impl AsRef<str>) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert("name".to_string(), PropertyDef::instance_name());
        Self {
            name: qualify_name(name.as_ref()),
            properties,
            aspects: BTreeMap::new(),
        }
    }

    /// Qualified name, e.g. `/user/adder`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> &BTreeMap<String, PropertyDef> {
        &self.properties
    }

    pub fn set_property(&mut self, name: impl Into<String>, def: PropertyDef) {
        self.properties.insert(name.into(), def);
    }

    /// Default value of a declared property.
    pub fn property_value(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(|p| p.value.as_str())
    }

    pub fn aspect(&self, name: &str) -> Option<&Aspect> {
        self.aspects.get(name)
    }

    /// The named aspect, created empty on first use.
    pub fn aspect_mut(&mut self, name: &str) -> &mut Aspect {
        let module = self.name.clone();
        self.aspects
            .entry(name.to_string())
            .or_insert_with(|| Aspect::with_module(name, module))
    }

    pub fn set_aspect(&mut self, mut aspect: Aspect) {
        aspect.set_module(self.name.clone());
        self.aspects.insert(aspect.name().to_string(), aspect);
    }

    /// `true` only for an aspect that exists and has components.
    pub fn has_aspect(&self, name: &str) -> bool {
        self.aspects.get(name).map_or(false, |a| !a.is_empty())
    }

    pub fn aspect_names(&self) -> impl Iterator<Item = &str> {
        self.aspects.keys().map(String::as_str)
    }

    pub fn is_modified(&self) -> bool {
        self.aspects.values().any(Aspect::is_modified)
    }

    /// `{"properties": ..., "<aspect>": [...]}`; empty aspects and the
    /// implicit `name` property are left out.
    pub fn to_json(&self) -> Value {
        let mut json = Map::new();
        let properties: BTreeMap<&String, &PropertyDef> = self
            .properties
            .iter()
            .filter(|(k, v)| !(k.as_str() == "name" && **v == PropertyDef::instance_name()))
            .collect();
        if !properties.is_empty() {
            json.insert(
                "properties".to_string(),
                serde_json::to_value(properties).unwrap_or(Value::Null),
            );
        }
        for (name, aspect) in &self.aspects {
            if !aspect.is_empty() {
                json.insert(name.clone(), aspect.to_json());
            }
        }
        Value::Object(json)
    }
}

/// Modules sharing a `/library/` prefix.
#[derive(Debug, Clone, Default)]
pub struct Library {
    name: String,
    modules: BTreeMap<String, Module>,
}

impl Library {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            modules: BTreeMap::new(),
        }
    }

    /// Load a library, resolving instances against its own modules first and
    /// then `external`.
    ///
    /// Loading is two-phase: properties and icons of every module first, so
    /// that schematics can instantiate any module of the library regardless
    /// of the order they appear in.
    pub fn from_json(
        name: impl Into<String>,
        value: &Value,
        external: &dyn ModuleLookup,
    ) -> Result<Self, ModelError> {
        let mut library = Self::new(name);
        let entries = value.as_object().ok_or_else(|| {
            ModelError::InvalidLibrary(format!("library '{}' must be a JSON object", library.name))
        })?;

        // Phase 1: property schemas.
        for (key, body) in entries {
            let body = body.as_object().ok_or_else(|| {
                ModelError::InvalidLibrary(format!("module '{}' must be a JSON object", key))
            })?;
            let mut module = Module::new(library.qualify(key));
            if let Some(props) = body.get("properties") {
                let props: BTreeMap<String, PropertyDef> = serde_json::from_value(props.clone())?;
                for (pname, def) in props {
                    module.set_property(pname, def);
                }
            }
            library.add_module(module);
        }

        // Phase 1b: icons, which normally only hold built-in components.
        let icons = library.load_aspects(entries, external, |aspect| aspect == "icon")?;
        library.install(icons);

        // Phase 2: every other aspect, now that all icons are known.
        let others = library.load_aspects(entries, external, |aspect| {
            aspect != "icon" && aspect != "properties"
        })?;
        library.install(others);

        tracing::debug!(
            library = %library.name,
            modules = library.modules.len(),
            "Loaded library"
        );
        Ok(library)
    }

    fn load_aspects(
        &self,
        entries: &Map<String, Value>,
        external: &dyn ModuleLookup,
        wanted: impl Fn(&str) -> bool,
    ) -> Result<Vec<(String, Aspect)>, ModelError> {
        let lookup = Layered {
            first: self,
            second: external,
        };
        let mut loaded = Vec::new();
        for (key, body) in entries {
            let Some(body) = body.as_object() else {
                continue;
            };
            for (aspect_name, components) in body {
                if !wanted(aspect_name) {
                    continue;
                }
                let aspect = Aspect::from_json(aspect_name.as_str(), components, &lookup)?;
                loaded.push((self.qualify(key), aspect));
            }
        }
        Ok(loaded)
    }

    fn install(&mut self, aspects: Vec<(String, Aspect)>) {
        for (module, aspect) in aspects {
            if let Some(m) = self.modules.get_mut(&module) {
                m.set_aspect(aspect);
            }
        }
    }

    pub fn to_json(&self) -> Value {
        let prefix = format!("/{}/", self.name);
        let mut json = Map::new();
        for (name, module) in &self.modules {
            let key = name.strip_prefix(&prefix).unwrap_or(name).to_string();
            json.insert(key, module.to_json());
        }
        Value::Object(json)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Qualified name of `module` within this library.
    pub fn qualify(&self, module: &str) -> String {
        if module.starts_with('/') || self.name.is_empty() {
            qualify_name(module)
        } else {
            format!("/{}/{}", self.name, module)
        }
    }

    pub fn add_module(&mut self, module: Module) {
        self.modules.insert(module.name().to_string(), module);
    }

    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    pub fn module_mut(&mut self, name: &str) -> Option<&mut Module> {
        self.modules.get_mut(name)
    }

    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    pub fn module_names_with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> {
        self.module_names().filter(move |n| n.starts_with(prefix))
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl ModuleLookup for Library {
    fn find_module(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    /// Short names refer to this library's own modules.
    fn qualify(&self, name: &str) -> String {
        Library::qualify(self, name)
    }
}

/// Several libraries searched in insertion order.
#[derive(Debug, Clone, Default)]
pub struct LibrarySet {
    libraries: Vec<Library>,
}

impl LibrarySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, library: Library) {
        self.libraries.push(library);
    }

    pub fn libraries(&self) -> &[Library] {
        &self.libraries
    }

    pub fn library(&self, name: &str) -> Option<&Library> {
        self.libraries.iter().find(|l| l.name() == name)
    }

    /// Like [`ModuleLookup::find_module`] but reporting a missing module.
    pub fn require_module(&self, name: &str) -> Result<&Module, ModelError> {
        self.find_module(name)
            .ok_or_else(|| ModelError::UnknownModule(name.to_string()))
    }

    pub fn module_names(&self) -> Vec<&str> {
        self.libraries.iter().flat_map(Library::module_names).collect()
    }
}

impl ModuleLookup for LibrarySet {
    fn find_module(&self, name: &str) -> Option<&Module> {
        self.libraries.iter().find_map(|l| l.find_module(name))
    }
}

/// Two lookups consulted in order.
struct Layered<'a> {
    first: &'a dyn ModuleLookup,
    second: &'a dyn ModuleLookup,
}

impl ModuleLookup for Layered<'_> {
    fn find_module(&self, name: &str) -> Option<&Module> {
        self.first
            .find_module(name)
            .or_else(|| self.second.find_module(name))
    }

    fn qualify(&self, name: &str) -> String {
        self.first.qualify(name)
    }
}
