//! Hierarchical flattening.
//!
//! The [`Extractor`] walks an aspect, names its components, turns leaves
//! into [`LeafRecord`]s and recurses into the schematic of every other
//! instance. An expansion stack of module names catches recursive
//! instantiation.

use std::collections::{BTreeMap, BTreeSet};

use super::label::{label_aspect, NodeLabels};
use super::{LeafRecord, NetlistError};
use crate::core::ExtractOptions;
use crate::library::ModuleLookup;
use crate::model::{Aspect, Component, ComponentId, ComponentKind, CpRef};
use crate::signal::parse_signal;

pub struct Extractor<'a> {
    lookup: &'a dyn ModuleLookup,
    options: &'a ExtractOptions,
    globals: Vec<String>,
    stack: Vec<String>,
}

impl<'a> Extractor<'a> {
    pub fn new(lookup: &'a dyn ModuleLookup, options: &'a ExtractOptions) -> Self {
        Self {
            lookup,
            options,
            globals: options.globals.clone(),
            stack: Vec::new(),
        }
    }

    /// Global names seen so far, configured ones first.
    pub fn globals(&self) -> &[String] {
        &self.globals
    }

    /// Flatten a top-level aspect: empty prefix and port map.
    pub fn extract(&mut self, aspect: &Aspect) -> Result<Vec<LeafRecord>, NetlistError> {
        self.expand(aspect, aspect.module(), "", &BTreeMap::new())
    }

    fn expand(
        &mut self,
        aspect: &Aspect,
        module: Option<&str>,
        prefix: &str,
        port_map: &BTreeMap<String, String>,
    ) -> Result<Vec<LeafRecord>, NetlistError> {
        if let Some(module) = module {
            if self.stack.iter().any(|m| m == module) {
                let mut chain = self.stack.clone();
                chain.push(module.to_string());
                return Err(NetlistError::RecursiveInstantiation(chain));
            }
            self.stack.push(module.to_string());
        }

        let result = self.flatten_aspect(aspect, prefix, port_map);

        if module.is_some() {
            self.stack.pop();
        }
        result
    }

    fn flatten_aspect(
        &mut self,
        aspect: &Aspect,
        prefix: &str,
        port_map: &BTreeMap<String, String>,
    ) -> Result<Vec<LeafRecord>, NetlistError> {
        let labels = label_aspect(aspect, prefix, port_map, &mut self.globals)?;
        let names = assign_names(aspect, prefix)?;

        let mut netlist = Vec::new();
        for (id, component) in aspect.components() {
            match component.kind() {
                ComponentKind::Jumper => {
                    if self.options.is_leaf("jumper") {
                        netlist.extend(jumper_records(aspect, id, &labels)?);
                    }
                }
                ComponentKind::Ground => {
                    if self.options.is_leaf("ground") {
                        netlist.extend(ground_record(id, &labels));
                    }
                }
                ComponentKind::Instance | ComponentKind::Memory => {
                    let name = names.get(&id).map(String::as_str).unwrap_or_default();
                    netlist.extend(self.flatten_component(id, component, name, &labels, prefix)?);
                }
                _ => {}
            }
        }
        Ok(netlist)
    }

    fn flatten_component(
        &mut self,
        id: ComponentId,
        component: &Component,
        name: &str,
        labels: &NodeLabels,
        prefix: &str,
    ) -> Result<Vec<LeafRecord>, NetlistError> {
        let mut terminals: Vec<(&[String], &[String])> = Vec::new();
        let mut ninstances = 1;
        for (i, point) in component.connections().iter().enumerate() {
            let expected = point.width();
            if expected == 0 {
                // Names too wide to expand were dropped when the point was built.
                parse_signal(&point.name)?;
                continue;
            }
            let slist = labels.label(CpRef::new(id, i)).unwrap_or(&[]);
            let got = slist.len();
            if got == 0 || got % expected != 0 {
                return Err(NetlistError::ConnectionCountMismatch {
                    terminal: point.name.clone(),
                    component: format!("{}{}", prefix, name),
                    got,
                    expected,
                });
            }
            ninstances = ninstances.max(got / expected);
            terminals.push((point.nlist.as_slice(), slist));
        }

        let type_name = component.type_name();
        let leaf = component.kind() == &ComponentKind::Memory || self.options.is_leaf(type_name);
        if ninstances > 1 {
            tracing::debug!(component = %format!("{}{}", prefix, name), ninstances, "Replicating instance");
        }

        let mut netlist = Vec::new();
        for i in 0..ninstances {
            let mut port_map = BTreeMap::new();
            for (nlist, slist) in &terminals {
                for (k, terminal) in nlist.iter().enumerate() {
                    let signal = &slist[(i * nlist.len() + k) % slist.len()];
                    port_map.insert(terminal.clone(), signal.clone());
                }
            }
            let suffix = if ninstances > 1 {
                format!("[{}]", i)
            } else {
                String::new()
            };

            if leaf {
                let mut properties = component.clone_properties(false);
                properties.insert("name".to_string(), format!("{}{}{}", prefix, name, suffix));
                netlist.push(LeafRecord {
                    type_name: type_name.to_string(),
                    connections: port_map,
                    properties,
                });
                continue;
            }

            let lookup = self.lookup;
            let module = lookup
                .find_module(type_name)
                .ok_or_else(|| NetlistError::UnknownModule(type_name.to_string()))?;
            let schematic = module
                .aspect(&self.options.schematic_aspect)
                .filter(|aspect| !aspect.is_empty())
                .ok_or_else(|| NetlistError::MissingSchematic {
                    instance: format!("{}{}", prefix, name),
                    module: type_name.to_string(),
                })?;
            let child_prefix = format!("{}{}{}.", prefix, name, suffix);
            netlist.extend(self.expand(schematic, Some(module.name()), &child_prefix, &port_map)?);
        }
        Ok(netlist)
    }
}

/// One record per bit joining the jumper's two nodes.
fn jumper_records(
    aspect: &Aspect,
    id: ComponentId,
    labels: &NodeLabels,
) -> Result<Vec<LeafRecord>, NetlistError> {
    let ends = labels.labels_for(aspect, id);
    let (n1, n2) = match ends.as_slice() {
        [n1, n2] => (*n1, *n2),
        _ => return Ok(Vec::new()),
    };
    if n1.len() != n2.len() {
        return Err(NetlistError::JumperWidthMismatch {
            n1: n1.len(),
            n2: n2.len(),
        });
    }
    Ok(n1
        .iter()
        .zip(n2)
        .map(|(a, b)| {
            LeafRecord::new("jumper")
                .with_connection("n1", a.clone())
                .with_connection("n2", b.clone())
        })
        .collect())
}

fn ground_record(id: ComponentId, labels: &NodeLabels) -> Option<LeafRecord> {
    let node = labels.label(CpRef::new(id, 0))?.first()?;
    Some(LeafRecord::new("ground").with_connection("gnd", node.clone()))
}

/// Final names for every instance and memory in `aspect`.
///
/// Explicit names must be unique. Blank ones become `base_N`, where `base`
/// is the last segment of the type name and `N` counts up per base, skipping
/// names already taken.
fn assign_names(
    aspect: &Aspect,
    prefix: &str,
) -> Result<BTreeMap<ComponentId, String>, NetlistError> {
    let mut names = BTreeMap::new();
    let mut taken = BTreeSet::new();

    for (id, component) in aspect.components().filter(|(_, c)| c.is_named()) {
        let name = component.name();
        if name.is_empty() {
            continue;
        }
        if !taken.insert(name.clone()) {
            return Err(NetlistError::DuplicateName(format!("{}{}", prefix, name)));
        }
        names.insert(id, name);
    }

    let mut counters: BTreeMap<String, usize> = BTreeMap::new();
    for (id, component) in aspect.components().filter(|(_, c)| c.is_named()) {
        if names.contains_key(&id) {
            continue;
        }
        let base = component
            .type_name()
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_lowercase();
        let counter = counters.entry(base.clone()).or_insert(0);
        let name = loop {
            *counter += 1;
            let candidate = format!("{}_{}", base, counter);
            if !taken.contains(&candidate) {
                break candidate;
            }
        };
        taken.insert(name.clone());
        names.insert(id, name);
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::builtin::gates_library;
    use crate::model::Placement;

    fn gate(aspect: &mut Aspect, type_name: &str, x: i64, y: i64, name: &str) -> ComponentId {
        let mut props = BTreeMap::new();
        if !name.is_empty() {
            props.insert("name".to_string(), name.to_string());
        }
        let component = Component::instance(type_name, Placement::at(x, y), props, &gates_library());
        aspect.add_component(component).unwrap()
    }

    #[test]
    fn test_blank_names_count_per_base() {
        let mut aspect = Aspect::new("schematic");
        aspect.start_action().unwrap();
        let a = gate(&mut aspect, "/gates/inverter", 0, 0, "");
        let b = gate(&mut aspect, "/gates/inverter", 0, 64, "inverter_1");
        let c = gate(&mut aspect, "/gates/nand2", 0, 128, "");
        aspect.end_action().unwrap();

        let names = assign_names(&aspect, "").unwrap();
        assert_eq!(names[&a], "inverter_2");
        assert_eq!(names[&b], "inverter_1");
        assert_eq!(names[&c], "nand2_1");
    }

    #[test]
    fn test_explicit_names_are_lowercased_and_unique() {
        let mut aspect = Aspect::new("schematic");
        aspect.start_action().unwrap();
        gate(&mut aspect, "/gates/inverter", 0, 0, "U1");
        gate(&mut aspect, "/gates/inverter", 0, 64, "u1");
        aspect.end_action().unwrap();

        let err = assign_names(&aspect, "top.").unwrap_err();
        assert_eq!(err, NetlistError::DuplicateName("top.u1".to_string()));
    }

    #[test]
    fn test_jumper_widths_must_match() {
        let mut aspect = Aspect::new("schematic");
        aspect.start_action().unwrap();
        let j = aspect
            .add_component(Component::builtin("jumper", Placement::at(0, 0), &[], BTreeMap::new()).unwrap())
            .unwrap();
        let w = aspect.add_wire(8, 0, 40, 0).unwrap();
        let mut props = aspect.component(w).unwrap().properties().clone();
        props.insert("width".to_string(), "2".to_string());
        aspect.update_properties(w, props).unwrap();
        aspect.end_action().unwrap();

        let labels = label_aspect(&aspect, "", &BTreeMap::new(), &mut Vec::new()).unwrap();
        let err = jumper_records(&aspect, j, &labels).unwrap_err();
        assert_eq!(err, NetlistError::JumperWidthMismatch { n1: 1, n2: 2 });
    }
}
