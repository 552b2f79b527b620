//! Node labelling for one aspect.
//!
//! Every connection point ends up with a list of node names, one per bit.
//! Points that share a location or are joined by wires form one electrical
//! node and must agree on that list.

use std::collections::{BTreeMap, BTreeSet};

use super::NetlistError;
use crate::model::{Aspect, ComponentId, CpRef};
use crate::signal::{parse_integer, parse_signal, MAX_SIGNAL_WIDTH};

/// Labels and widths assigned to an aspect's connection points.
#[derive(Debug, Clone, Default)]
pub struct NodeLabels {
    labels: BTreeMap<CpRef, Vec<String>>,
    widths: BTreeMap<CpRef, usize>,
}

impl NodeLabels {
    pub fn label(&self, cp: CpRef) -> Option<&[String]> {
        self.labels.get(&cp).map(Vec::as_slice)
    }

    pub fn width(&self, cp: CpRef) -> Option<usize> {
        self.widths.get(&cp).copied()
    }

    /// Labels of a component's connection points, in connection order.
    /// Unlabelled points give an empty slice.
    pub fn labels_for(&self, aspect: &Aspect, id: ComponentId) -> Vec<&[String]> {
        let count = aspect.component(id).map_or(0, |c| c.connections().len());
        (0..count)
            .map(|i| self.label(CpRef::new(id, i)).unwrap_or(&[]))
            .collect()
    }

    /// Every distinct node name, sorted.
    pub fn node_names(&self) -> BTreeSet<&str> {
        self.labels
            .values()
            .flat_map(|label| label.iter().map(String::as_str))
            .collect()
    }

    fn propagate_width(
        &mut self,
        aspect: &Aspect,
        start: CpRef,
        width: usize,
    ) -> Result<(), NetlistError> {
        let mut stack = vec![start];
        while let Some(cp) = stack.pop() {
            match self.widths.get(&cp) {
                Some(&existing) if existing == width => continue,
                Some(&existing) => {
                    return Err(NetlistError::ConflictingWidth {
                        existing,
                        new: width,
                    })
                }
                None => {
                    self.widths.insert(cp, width);
                    stack.extend(neighbours(aspect, cp));
                }
            }
        }
        Ok(())
    }

    fn propagate_label(
        &mut self,
        aspect: &Aspect,
        start: CpRef,
        label: &[String],
    ) -> Result<(), NetlistError> {
        let mut stack = vec![start];
        while let Some(cp) = stack.pop() {
            if let Some(width) = self.width(cp) {
                if width != label.len() {
                    return Err(NetlistError::LabelWidthMismatch {
                        label: label.to_vec(),
                        width,
                    });
                }
            }
            match self.labels.get(&cp) {
                Some(existing) if existing.as_slice() == label => continue,
                Some(existing) => {
                    return Err(NetlistError::ConflictingLabel {
                        existing: existing.clone(),
                        new: label.to_vec(),
                    })
                }
                None => {
                    self.labels.insert(cp, label.to_vec());
                    stack.extend(neighbours(aspect, cp));
                }
            }
        }
        Ok(())
    }
}

/// Points electrically joined to `cp` in one step: everything at the same
/// location and, for a wire, its other end.
fn neighbours(aspect: &Aspect, cp: CpRef) -> Vec<CpRef> {
    let Some(point) = aspect.connection(cp) else {
        return Vec::new();
    };
    let mut out: Vec<CpRef> = aspect
        .connections_at(point.location)
        .iter()
        .copied()
        .filter(|other| *other != cp)
        .collect();
    if let Some(component) = aspect.component(cp.component) {
        if component.is_wire() {
            out.extend(
                (0..component.connections().len())
                    .filter(|i| *i != cp.index)
                    .map(|i| CpRef::new(cp.component, i)),
            );
        }
    }
    out
}

/// Label every connection point of `aspect`.
///
/// Names are prefixed with `prefix` unless they are global or come through
/// `port_map`. Global names declared by components are added to `globals`.
pub fn label_aspect(
    aspect: &Aspect,
    prefix: &str,
    port_map: &BTreeMap<String, String>,
    globals: &mut Vec<String>,
) -> Result<NodeLabels, NetlistError> {
    let mut labels = NodeLabels::default();

    for (id, component) in aspect.components() {
        let Some(width) = component
            .property("width")
            .and_then(parse_integer)
            .filter(|w| *w > 0)
        else {
            continue;
        };
        let width = usize::try_from(width)
            .ok()
            .filter(|w| *w <= MAX_SIGNAL_WIDTH)
            .ok_or(NetlistError::WidthTooLarge {
                width,
                limit: MAX_SIGNAL_WIDTH,
            })?;
        for i in 0..component.connections().len() {
            labels.propagate_width(aspect, CpRef::new(id, i), width)?;
        }
    }

    let ids: Vec<ComponentId> = aspect.ids().to_vec();
    for &id in ids.iter().rev() {
        let Some(component) = aspect.component(id) else {
            continue;
        };
        let global = component
            .property("global_signal")
            .filter(|s| !s.trim().is_empty());
        let signal = component.property("signal").filter(|s| !s.trim().is_empty());

        let label: Vec<String> = if let Some(global) = global {
            let mut names = parse_signal(global)?;
            for name in &names {
                if !globals.contains(name) {
                    globals.push(name.clone());
                }
            }
            if let [name] = names.as_slice() {
                let width = labels.width(CpRef::new(id, 0)).unwrap_or(1);
                if width > 1 {
                    names = vec![name.clone(); width];
                }
            }
            names
        } else if let Some(signal) = signal {
            parse_signal(signal)?
                .into_iter()
                .map(|name| match port_map.get(&name) {
                    Some(mapped) => mapped.clone(),
                    None if globals.contains(&name) => name,
                    None => format!("{}{}", prefix, name),
                })
                .collect()
        } else {
            continue;
        };
        if label.is_empty() {
            continue;
        }
        for i in 0..component.connections().len() {
            labels.propagate_label(aspect, CpRef::new(id, i), &label)?;
        }
    }

    let mut counter = 0usize;
    for &id in ids.iter().rev() {
        let Some(component) = aspect.component(id) else {
            continue;
        };
        if component.is_wire() {
            continue;
        }
        for (i, point) in component.connections().iter().enumerate().rev() {
            let cp = CpRef::new(id, i);
            if labels.label(cp).is_some() {
                continue;
            }
            let width = labels.width(cp).unwrap_or_else(|| point.width());
            if width == 0 {
                continue;
            }
            let label: Vec<String> = (0..width)
                .map(|_| {
                    counter += 1;
                    format!("{}{}", prefix, counter)
                })
                .collect();
            labels.propagate_label(aspect, cp, &label)?;
        }
    }

    tracing::debug!(
        aspect = aspect.name(),
        prefix,
        nodes = labels.node_names().len(),
        "Labelled aspect"
    );
    Ok(labels)
}
