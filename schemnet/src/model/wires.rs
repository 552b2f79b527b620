//! Wire maintenance: bisection, collinear merging and redundant-wire removal.
//!
//! These passes run at the end of each transaction (recorded into it) and
//! after undo/redo (unrecorded). They keep wires split at every connection
//! point that lands on their span and joined wherever nothing else connects.

use std::collections::{BTreeSet, VecDeque};

use super::aspect::Aspect;
use super::component::Component;
use super::connection::ComponentId;
use crate::geometry::{collinear, Location};

impl Aspect {
    /// Replace `wire` with two wires meeting at `at`. The pieces keep the
    /// wire's properties.
    fn split_wire(&mut self, wire: ComponentId, at: Location) -> Vec<ComponentId> {
        let Some(original) = self.remove_recorded(wire) else {
            return Vec::new();
        };
        let Some((start, end)) = original.wire_ends() else {
            return Vec::new();
        };
        tracing::debug!(%wire, at = %at, "Splitting wire");

        [start, end]
            .into_iter()
            .map(|from| {
                let mut piece = Component::wire(from.x, from.y, at.x, at.y);
                piece.set_properties(original.properties().clone());
                self.add_recorded(piece)
            })
            .collect()
    }

    /// Split every wire that one of `id`'s connection points lands on.
    /// Returns the wires created.
    pub fn check_wires(&mut self, id: ComponentId) -> Vec<ComponentId> {
        let wires: Vec<ComponentId> = self
            .components()
            .filter(|(w, c)| *w != id && c.is_wire())
            .map(|(w, _)| w)
            .collect();

        let mut created = Vec::new();
        for w in wires {
            let hit = match (self.component(w), self.component(id)) {
                (Some(wire), Some(c)) => wire.bisect(c),
                _ => None,
            };
            if let Some(at) = hit {
                created.extend(self.split_wire(w, at));
            }
        }
        created
    }

    /// Split wire `id` at the first existing connection point on its span.
    /// The pieces are returned so the caller can check them in turn.
    pub fn check_connection_points(&mut self, id: ComponentId) -> Vec<ComponentId> {
        let hit = match self.component(id) {
            Some(wire) if wire.is_wire() => self
                .locations()
                .map(|(location, _)| *location)
                .find(|location| wire.bisect_cp(*location)),
            _ => None,
        };
        match hit {
            Some(at) => self.split_wire(id, at),
            None => Vec::new(),
        }
    }

    /// Bisection over every component touched by a transaction, following
    /// newly created pieces until nothing splits.
    pub(super) fn bisect_touched(&mut self, touched: Vec<ComponentId>) {
        let mut work: VecDeque<ComponentId> = touched.into();
        let mut seen = BTreeSet::new();
        while let Some(id) = work.pop_front() {
            if !seen.insert(id) || self.component(id).is_none() {
                continue;
            }
            let mut created = self.check_wires(id);
            if self.component(id).map_or(false, Component::is_wire) {
                created.extend(self.check_connection_points(id));
            }
            work.extend(created);
        }
    }

    /// Merge collinear wires and drop duplicates until the drawing is stable.
    pub fn clean_up_wires(&mut self) {
        loop {
            let mut changed = false;
            while self.merge_collinear_wires() {
                changed = true;
            }
            while self.remove_redundant_wire() {
                changed = true;
            }
            if !changed {
                break;
            }
        }
    }

    /// Merge one pair of collinear wires meeting at a point nothing else
    /// connects to. Returns `false` when no such pair exists.
    fn merge_collinear_wires(&mut self) -> bool {
        let candidate = self.locations().find_map(|(location, refs)| {
            let [r1, r2] = refs.as_slice() else {
                return None;
            };
            if r1.component == r2.component {
                return None;
            }
            let w1 = self.component(r1.component).filter(|c| c.is_wire())?;
            let w2 = self.component(r2.component).filter(|c| c.is_wire())?;
            let e1 = w1.other_end(r1.index)?;
            let e2 = w2.other_end(r2.index)?;
            if e1 == e2 || !collinear(e1, e2, *location) || w1.properties() != w2.properties() {
                return None;
            }
            Some((r1.component, r2.component, e1, e2))
        });
        let Some((a, b, e1, e2)) = candidate else {
            return false;
        };

        let properties = self
            .component(a)
            .map(|c| c.properties().clone())
            .unwrap_or_default();
        self.remove_recorded(a);
        self.remove_recorded(b);
        let mut merged = Component::wire(e1.x, e1.y, e2.x, e2.y);
        merged.set_properties(properties);
        let id = self.add_recorded(merged);
        tracing::debug!(%a, %b, merged = %id, "Merged collinear wires");
        true
    }

    /// Remove the later of two wires sharing both end points. Returns
    /// `false` when there are none.
    fn remove_redundant_wire(&mut self) -> bool {
        let mut found = None;
        'search: for (_, refs) in self.locations() {
            for (i, r1) in refs.iter().enumerate() {
                let Some(e1) = self
                    .component(r1.component)
                    .filter(|c| c.is_wire())
                    .and_then(|c| c.other_end(r1.index))
                else {
                    continue;
                };
                for r2 in &refs[i + 1..] {
                    if r2.component == r1.component {
                        continue;
                    }
                    let e2 = self
                        .component(r2.component)
                        .filter(|c| c.is_wire())
                        .and_then(|c| c.other_end(r2.index));
                    if e2 == Some(e1) {
                        found = Some((r1.component, r2.component));
                        break 'search;
                    }
                }
            }
        }
        let Some((a, b)) = found else {
            return false;
        };

        let later = match (self.position(a), self.position(b)) {
            (Some(pa), Some(pb)) if pa > pb => a,
            _ => b,
        };
        tracing::debug!(wire = %later, "Removing redundant wire");
        self.remove_recorded(later).is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::model::component::Placement;

    fn port_at(x: i64, y: i64) -> Component {
        let mut props = BTreeMap::new();
        props.insert("signal".to_string(), "p".to_string());
        Component::builtin("port", Placement::at(x, y), &[], props).unwrap()
    }

    fn wires(aspect: &Aspect) -> Vec<(Location, Location)> {
        let mut ends: Vec<_> = aspect
            .components()
            .filter_map(|(_, c)| c.wire_ends())
            .map(|(a, b)| if a <= b { (a, b) } else { (b, a) })
            .collect();
        ends.sort();
        ends
    }

    #[test]
    fn test_terminal_on_wire_bisects_it() {
        let mut aspect = Aspect::new("schematic");
        aspect.start_action().unwrap();
        aspect.add_wire(0, 0, 20, 0).unwrap();
        aspect.add_component(port_at(10, 0)).unwrap();
        aspect.end_action().unwrap();

        assert_eq!(
            wires(&aspect),
            vec![
                (Location::new(0, 0), Location::new(10, 0)),
                (Location::new(10, 0), Location::new(20, 0)),
            ]
        );
        assert_eq!(aspect.connections_at(Location::new(10, 0)).len(), 3);
        assert!(aspect.index_is_consistent());
    }

    #[test]
    fn test_wire_end_splits_existing_wire() {
        let mut aspect = Aspect::new("schematic");
        aspect.start_action().unwrap();
        aspect.add_wire(0, 0, 32, 0).unwrap();
        aspect.end_action().unwrap();

        aspect.start_action().unwrap();
        aspect.add_wire(16, 0, 16, 16).unwrap();
        aspect.end_action().unwrap();

        assert_eq!(wires(&aspect).len(), 3);
        assert_eq!(aspect.connections_at(Location::new(16, 0)).len(), 3);
    }

    #[test]
    fn test_several_points_on_one_wire() {
        let mut aspect = Aspect::new("schematic");
        aspect.start_action().unwrap();
        aspect.add_component(port_at(8, 0)).unwrap();
        aspect.add_component(port_at(24, 0)).unwrap();
        aspect.add_wire(0, 0, 32, 0).unwrap();
        aspect.end_action().unwrap();

        assert_eq!(
            wires(&aspect),
            vec![
                (Location::new(0, 0), Location::new(8, 0)),
                (Location::new(8, 0), Location::new(24, 0)),
                (Location::new(24, 0), Location::new(32, 0)),
            ]
        );
    }

    #[test]
    fn test_collinear_wires_merge() {
        let mut aspect = Aspect::new("schematic");
        aspect.start_action().unwrap();
        aspect.add_wire(0, 0, 10, 0).unwrap();
        aspect.add_wire(10, 0, 20, 0).unwrap();
        aspect.end_action().unwrap();

        assert_eq!(wires(&aspect), vec![(Location::new(0, 0), Location::new(20, 0))]);
        assert!(aspect.connections_at(Location::new(10, 0)).is_empty());
    }

    #[test]
    fn test_corner_does_not_merge() {
        let mut aspect = Aspect::new("schematic");
        aspect.start_action().unwrap();
        aspect.add_wire(0, 0, 10, 0).unwrap();
        aspect.add_wire(10, 0, 10, 10).unwrap();
        aspect.end_action().unwrap();
        assert_eq!(wires(&aspect).len(), 2);
    }

    #[test]
    fn test_differently_named_wires_do_not_merge() {
        let mut aspect = Aspect::new("schematic");
        aspect.start_action().unwrap();
        let a = aspect.add_wire(0, 0, 10, 0).unwrap();
        aspect.add_wire(10, 0, 20, 0).unwrap();
        let mut props = aspect.component(a).unwrap().properties().clone();
        props.insert("signal".to_string(), "clk".to_string());
        aspect.update_properties(a, props).unwrap();
        aspect.end_action().unwrap();
        assert_eq!(wires(&aspect).len(), 2);
    }

    #[test]
    fn test_redundant_wire_removed() {
        let mut aspect = Aspect::new("schematic");
        aspect.start_action().unwrap();
        let first = aspect.add_wire(0, 0, 16, 0).unwrap();
        aspect.add_wire(16, 0, 0, 0).unwrap();
        aspect.add_wire(0, 0, 16, 0).unwrap();
        aspect.end_action().unwrap();

        assert_eq!(aspect.ids(), &[first]);
        assert!(aspect.index_is_consistent());
    }

    #[test]
    fn test_clean_up_is_idempotent() {
        let mut aspect = Aspect::new("schematic");
        aspect.start_action().unwrap();
        aspect.add_wire(0, 0, 10, 0).unwrap();
        aspect.add_wire(10, 0, 20, 0).unwrap();
        aspect.add_wire(20, 0, 20, 20).unwrap();
        aspect.add_component(port_at(20, 20)).unwrap();
        aspect.end_action().unwrap();

        let before = aspect.to_json();
        let ids = aspect.ids().to_vec();
        aspect.clean_up_wires();
        assert_eq!(aspect.to_json(), before);
        assert_eq!(aspect.ids(), ids.as_slice());
    }

    #[test]
    fn test_undo_redo_of_split() {
        let mut aspect = Aspect::new("schematic");
        aspect.start_action().unwrap();
        aspect.add_wire(0, 0, 20, 0).unwrap();
        aspect.end_action().unwrap();
        let after_first = aspect.to_json();

        aspect.start_action().unwrap();
        aspect.add_component(port_at(10, 0)).unwrap();
        aspect.end_action().unwrap();
        let after_second = aspect.to_json();
        assert_eq!(wires(&aspect).len(), 2);

        assert!(aspect.undo());
        assert_eq!(aspect.to_json(), after_first);
        assert!(aspect.redo());
        assert_eq!(aspect.to_json(), after_second);
        assert!(aspect.index_is_consistent());
    }
}
