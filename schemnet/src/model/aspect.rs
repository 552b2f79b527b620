//! Aspect: an ordered collection of components with a connection index and
//! an undo log.

use std::collections::BTreeMap;

use serde_json::Value;

use super::action::{ActionLog, Change, Transaction};
use super::component::{Component, ComponentKind, Placement, DEFAULT_BBOX};
use super::connection::{ComponentId, ConnectionPoint, CpRef};
use super::ModelError;
use crate::geometry::{Location, Rect, Rotation};
use crate::library::ModuleLookup;
use crate::signal::{validate_name, validate_signal};

/// One view (schematic, icon, ...) of a module.
///
/// Mutators must be called between [`Aspect::start_action`] and
/// [`Aspect::end_action`]; each records a reversible [`Change`]. The location
/// index always mirrors the live components' connection points.
#[derive(Debug, Clone, Default)]
pub struct Aspect {
    name: String,
    module: Option<String>,
    components: BTreeMap<ComponentId, Component>,
    /// z-order, bottom first.
    order: Vec<ComponentId>,
    next_id: u64,
    index: BTreeMap<Location, Vec<CpRef>>,
    log: ActionLog,
    pending: Option<Transaction>,
    /// Components added or moved during the open action.
    touched: Vec<ComponentId>,
    modified: bool,
}

impl Aspect {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Aspect owned by the module named `module`.
    pub fn with_module(name: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            module: Some(module.into()),
            ..Self::new(name)
        }
    }

    /// Load components from a JSON array of component triples. Nothing is
    /// recorded and the aspect starts unmodified.
    pub fn from_json(
        name: impl Into<String>,
        value: &Value,
        lookup: &dyn ModuleLookup,
    ) -> Result<Self, ModelError> {
        let mut aspect = Self::new(name);
        aspect.load(value, lookup)?;
        Ok(aspect)
    }

    pub(crate) fn load(&mut self, value: &Value, lookup: &dyn ModuleLookup) -> Result<(), ModelError> {
        let items = value.as_array().ok_or_else(|| {
            ModelError::InvalidComponent(format!("aspect '{}' must be an array", self.name))
        })?;
        for item in items {
            let component = Component::from_json(item, lookup)?;
            let id = self.allocate_id();
            self.insert_at(self.order.len(), id, component);
        }
        self.modified = false;
        Ok(())
    }

    pub fn to_json(&self) -> Value {
        Value::Array(self.components().map(|(_, c)| c.to_json()).collect())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Qualified name of the owning module, if any.
    pub fn module(&self) -> Option<&str> {
        self.module.as_deref()
    }

    pub fn set_module(&mut self, module: impl Into<String>) {
        self.module = Some(module.into());
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn set_modified(&mut self, modified: bool) {
        self.modified = modified;
    }

    /// Component ids in z-order.
    pub fn ids(&self) -> &[ComponentId] {
        &self.order
    }

    pub fn component(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(&id)
    }

    /// Components in z-order, bottom first.
    pub fn components(&self) -> impl Iterator<Item = (ComponentId, &Component)> + '_ {
        self.order
            .iter()
            .filter_map(move |id| self.components.get(id).map(|c| (*id, c)))
    }

    pub fn position(&self, id: ComponentId) -> Option<usize> {
        self.order.iter().position(|i| *i == id)
    }

    pub fn connection(&self, cp: CpRef) -> Option<&ConnectionPoint> {
        self.components.get(&cp.component)?.connections().get(cp.index)
    }

    /// Connection points at exactly `location`.
    pub fn connections_at(&self, location: Location) -> &[CpRef] {
        self.index.get(&location).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every occupied location with its connection points, in location order.
    pub fn locations(&self) -> impl Iterator<Item = (&Location, &Vec<CpRef>)> {
        self.index.iter()
    }

    /// Rebuild the index from scratch and compare with the maintained one.
    pub fn index_is_consistent(&self) -> bool {
        let mut expected: BTreeMap<Location, Vec<CpRef>> = BTreeMap::new();
        for (id, component) in self.components() {
            for (i, cp) in component.connections().iter().enumerate() {
                expected.entry(cp.location).or_default().push(CpRef::new(id, i));
            }
        }
        let mut actual = self.index.clone();
        for list in expected.values_mut().chain(actual.values_mut()) {
            list.sort();
        }
        expected == actual && self.components.len() == self.order.len()
    }

    // ---- transactions ----

    /// Open a transaction.
    pub fn start_action(&mut self) -> Result<(), ModelError> {
        if self.pending.is_some() {
            return Err(ModelError::NestedAction);
        }
        self.pending = Some(Transaction::new());
        self.touched.clear();
        Ok(())
    }

    pub fn in_action(&self) -> bool {
        self.pending.is_some()
    }

    /// Close the open transaction. A non-empty transaction has touched
    /// components checked against wires, wires normalized, and is committed;
    /// an empty one leaves no trace.
    pub fn end_action(&mut self) -> Result<(), ModelError> {
        let is_empty = match &self.pending {
            Some(t) => t.is_empty(),
            None => return Err(ModelError::NoActiveAction),
        };
        if is_empty {
            self.pending = None;
            self.touched.clear();
            return Ok(());
        }

        let touched = std::mem::take(&mut self.touched);
        self.bisect_touched(touched);
        self.clean_up_wires();

        if let Some(transaction) = self.pending.take() {
            tracing::debug!(
                aspect = %self.name,
                changes = transaction.len(),
                "Committed transaction"
            );
            self.log.commit(transaction);
        }
        self.modified = true;
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        self.log.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.log.can_redo()
    }

    /// Revert the most recent transaction. Returns `false` when there is
    /// nothing to undo or an action is open.
    pub fn undo(&mut self) -> bool {
        if self.pending.is_some() {
            tracing::warn!(aspect = %self.name, "Undo requested while an action is open");
            return false;
        }
        let Some(transaction) = self.log.step_back() else {
            return false;
        };
        for change in transaction.changes().iter().rev() {
            self.revert(change);
        }
        self.clean_up_wires();
        self.modified = self.log.can_undo();
        true
    }

    /// Re-apply the next undone transaction.
    pub fn redo(&mut self) -> bool {
        if self.pending.is_some() {
            tracing::warn!(aspect = %self.name, "Redo requested while an action is open");
            return false;
        }
        let Some(transaction) = self.log.step_forward() else {
            return false;
        };
        for change in transaction.changes() {
            self.replay(change);
        }
        self.clean_up_wires();
        self.modified = true;
        true
    }

    // ---- mutators ----

    /// Append a component on top of the z-order.
    pub fn add_component(&mut self, component: Component) -> Result<ComponentId, ModelError> {
        self.require_action()?;
        let id = self.add_recorded(component);
        self.touched.push(id);
        Ok(id)
    }

    /// Convenience for `add_component(Component::wire(..))`.
    pub fn add_wire(&mut self, x1: i64, y1: i64, x2: i64, y2: i64) -> Result<ComponentId, ModelError> {
        self.add_component(Component::wire(x1, y1, x2, y2))
    }

    pub fn remove_component(&mut self, id: ComponentId) -> Result<Component, ModelError> {
        self.require_action()?;
        self.remove_recorded(id)
            .ok_or(ModelError::UnknownComponent(id))
    }

    pub fn move_component(&mut self, id: ComponentId, dx: i64, dy: i64) -> Result<(), ModelError> {
        self.require_action()?;
        if !self.components.contains_key(&id) {
            return Err(ModelError::UnknownComponent(id));
        }
        if dx == 0 && dy == 0 {
            return Ok(());
        }
        self.reposition(id, |c| c.translate(dx, dy));
        self.record(Change::Move { id, dx, dy });
        self.touched.push(id);
        Ok(())
    }

    /// Rotate about the centre `(cx, cy)`.
    pub fn rotate_component(
        &mut self,
        id: ComponentId,
        rotation: Rotation,
        cx: i64,
        cy: i64,
    ) -> Result<(), ModelError> {
        self.require_action()?;
        let component = self
            .components
            .get(&id)
            .ok_or(ModelError::UnknownComponent(id))?;
        let from = component.placement();
        let to = component.rotated_placement(rotation, cx, cy);
        self.reposition(id, |c| c.set_placement(to));
        self.record(Change::Rotate { id, from, to });
        self.touched.push(id);
        Ok(())
    }

    /// Replace a component's property bag.
    pub fn update_properties(
        &mut self,
        id: ComponentId,
        properties: BTreeMap<String, String>,
    ) -> Result<(), ModelError> {
        self.require_action()?;
        let component = self
            .components
            .get(&id)
            .ok_or(ModelError::UnknownComponent(id))?;
        check_property_edits(component, &properties)?;
        let old = component.properties().clone();
        self.reposition(id, |c| c.set_properties(properties));
        let new = self
            .components
            .get(&id)
            .map(|c| c.properties().clone())
            .unwrap_or_default();
        if old != new {
            self.record(Change::UpdateProperties { id, old, new });
            self.touched.push(id);
        }
        Ok(())
    }

    // ---- selection and queries ----

    pub fn set_selected(&mut self, id: ComponentId, selected: bool) {
        if let Some(c) = self.components.get_mut(&id) {
            c.selected = selected;
        }
    }

    pub fn clear_selection(&mut self) {
        for c in self.components.values_mut() {
            c.selected = false;
        }
    }

    /// Select every component overlapping `rect`.
    pub fn select_rect(&mut self, rect: Rect) {
        let rect = rect.canonicalize();
        for c in self.components.values_mut() {
            if c.intersects(&rect) {
                c.selected = true;
            }
        }
    }

    /// The selected component, when exactly one is selected.
    pub fn selected_component(&self) -> Option<ComponentId> {
        let mut selected = self.components().filter(|(_, c)| c.selected).map(|(id, _)| id);
        let first = selected.next()?;
        selected.next().is_none().then_some(first)
    }

    /// Visit components topmost first; the visitor returns `true` to stop.
    pub fn map_components<F>(&self, mut visitor: F)
    where
        F: FnMut(ComponentId, &Component) -> bool,
    {
        for id in self.order.iter().rev() {
            if let Some(c) = self.components.get(id) {
                if visitor(*id, c) {
                    return;
                }
            }
        }
    }

    /// Topmost component near `(x, y)`.
    pub fn component_at(&self, x: i64, y: i64) -> Option<ComponentId> {
        let mut hit = None;
        self.map_components(|id, c| {
            if c.near(x, y) {
                hit = Some(id);
                true
            } else {
                false
            }
        });
        hit
    }

    /// Bounding box of every component except property tags.
    pub fn bbox(&self) -> Rect {
        self.compute_bbox(|_| true)
    }

    pub fn selected_bbox(&self) -> Rect {
        self.compute_bbox(|c| c.selected)
    }

    pub fn unselected_bbox(&self) -> Rect {
        self.compute_bbox(|c| !c.selected)
    }

    fn compute_bbox(&self, filter: impl Fn(&Component) -> bool) -> Rect {
        if self.is_empty() {
            return DEFAULT_BBOX;
        }
        self.components()
            .map(|(_, c)| c)
            .filter(|c| filter(*c) && *c.kind() != ComponentKind::Property)
            .fold(Rect::EMPTY, |acc, c| acc.union(&c.bbox()))
    }

    /// Grid the selection must snap to; at least 1.
    pub fn required_grid(&self) -> i64 {
        self.components()
            .filter(|(_, c)| c.selected)
            .map(|(_, c)| c.required_grid())
            .fold(1, i64::max)
    }

    /// Terminal definitions `(x, y, name)` found in this aspect, topmost first.
    pub fn terminals(&self) -> Vec<(i64, i64, String)> {
        let mut terminals = Vec::new();
        self.map_components(|_, c| {
            if let Some(t) = c.terminal_coords() {
                terminals.push(t);
            }
            false
        });
        terminals
    }

    // ---- internals shared with wire maintenance ----

    fn require_action(&self) -> Result<(), ModelError> {
        if self.pending.is_none() {
            return Err(ModelError::NoActiveAction);
        }
        Ok(())
    }

    fn allocate_id(&mut self) -> ComponentId {
        let id = ComponentId(self.next_id);
        self.next_id += 1;
        id
    }

    fn record(&mut self, change: Change) {
        if let Some(pending) = self.pending.as_mut() {
            pending.push(change);
        }
    }

    /// Add on top and record, without requiring an open action.
    pub(super) fn add_recorded(&mut self, component: Component) -> ComponentId {
        let id = self.allocate_id();
        let position = self.order.len();
        self.record(Change::Add {
            id,
            position,
            component: component.clone(),
        });
        self.insert_at(position, id, component);
        id
    }

    /// Remove and record, without requiring an open action.
    pub(super) fn remove_recorded(&mut self, id: ComponentId) -> Option<Component> {
        let (position, component) = self.detach(id)?;
        self.record(Change::Remove {
            id,
            position,
            component: component.clone(),
        });
        Some(component)
    }

    fn insert_at(&mut self, position: usize, id: ComponentId, component: Component) {
        if self.components.contains_key(&id) {
            tracing::warn!(aspect = %self.name, %id, "Component already present; skipping insert");
            return;
        }
        let position = position.min(self.order.len());
        self.order.insert(position, id);
        self.components.insert(id, component);
        self.index_component(id);
        self.next_id = self.next_id.max(id.0 + 1);
    }

    fn detach(&mut self, id: ComponentId) -> Option<(usize, Component)> {
        let position = self.position(id)?;
        self.unindex_component(id);
        self.order.remove(position);
        let component = self.components.remove(&id)?;
        Some((position, component))
    }

    /// Apply a geometric change to a component, keeping the index in step.
    fn reposition(&mut self, id: ComponentId, f: impl FnOnce(&mut Component)) {
        self.unindex_component(id);
        if let Some(c) = self.components.get_mut(&id) {
            f(c);
        }
        self.index_component(id);
    }

    fn index_component(&mut self, id: ComponentId) {
        let Some(component) = self.components.get(&id) else {
            return;
        };
        for (i, cp) in component.connections().iter().enumerate() {
            self.index.entry(cp.location).or_default().push(CpRef::new(id, i));
        }
    }

    fn unindex_component(&mut self, id: ComponentId) {
        let Some(component) = self.components.get(&id) else {
            return;
        };
        for (i, cp) in component.connections().iter().enumerate() {
            let cp_ref = CpRef::new(id, i);
            if let Some(list) = self.index.get_mut(&cp.location) {
                list.retain(|r| *r != cp_ref);
                if list.is_empty() {
                    self.index.remove(&cp.location);
                }
            }
        }
    }

    /// Map a recorded id to a live component. Wires replaced by later
    /// normalization are found again by their end points.
    fn resolve(&self, id: ComponentId, snapshot: Option<&Component>) -> Option<ComponentId> {
        if self.components.contains_key(&id) {
            return Some(id);
        }
        let found = snapshot.and_then(Component::wire_ends).and_then(|(a, b)| {
            self.components()
                .find(|(_, c)| match c.wire_ends() {
                    Some((x, y)) => (x == a && y == b) || (x == b && y == a),
                    None => false,
                })
                .map(|(id, _)| id)
        });
        if found.is_none() {
            tracing::warn!(aspect = %self.name, %id, "Change refers to a missing component; skipped");
        }
        found
    }

    fn revert(&mut self, change: &Change) {
        match change {
            Change::Add { id, component, .. } => {
                if let Some(live) = self.resolve(*id, Some(component)) {
                    self.detach(live);
                }
            }
            Change::Remove {
                id,
                position,
                component,
            } => self.insert_at(*position, *id, component.clone()),
            Change::Move { id, dx, dy } => {
                if let Some(live) = self.resolve(*id, None) {
                    self.reposition(live, |c| c.translate(-dx, -dy));
                }
            }
            Change::Rotate { id, from, .. } => self.place(*id, *from),
            Change::UpdateProperties { id, old, .. } => self.assign_properties(*id, old),
        }
    }

    fn replay(&mut self, change: &Change) {
        match change {
            Change::Add {
                id,
                position,
                component,
            } => self.insert_at(*position, *id, component.clone()),
            Change::Remove { id, component, .. } => {
                if let Some(live) = self.resolve(*id, Some(component)) {
                    self.detach(live);
                }
            }
            Change::Move { id, dx, dy } => {
                if let Some(live) = self.resolve(*id, None) {
                    self.reposition(live, |c| c.translate(*dx, *dy));
                }
            }
            Change::Rotate { id, to, .. } => self.place(*id, *to),
            Change::UpdateProperties { id, new, .. } => self.assign_properties(*id, new),
        }
    }

    fn place(&mut self, id: ComponentId, placement: Placement) {
        if let Some(live) = self.resolve(id, None) {
            self.reposition(live, |c| c.set_placement(placement));
        }
    }

    fn assign_properties(&mut self, id: ComponentId, properties: &BTreeMap<String, String>) {
        if let Some(live) = self.resolve(id, None) {
            let properties = properties.clone();
            self.reposition(live, |c| c.set_properties(properties));
        }
    }
}

/// Edited names and signals must follow the naming rules; values left
/// unchanged are not rechecked.
fn check_property_edits(
    component: &Component,
    properties: &BTreeMap<String, String>,
) -> Result<(), ModelError> {
    for (key, value) in properties {
        if component.properties().get(key) == Some(value) {
            continue;
        }
        let valid = match key.as_str() {
            "name" if component.kind() == &ComponentKind::Terminal => validate_signal(value),
            "name" => validate_name(value),
            "signal" | "global_signal" => validate_signal(value),
            _ => true,
        };
        if !valid {
            return Err(ModelError::InvalidComponent(format!(
                "invalid {} '{}' for {}",
                key,
                value,
                component.type_name()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::Library;
    use serde_json::json;

    fn port(x: i64, y: i64, signal: &str) -> Component {
        let mut props = BTreeMap::new();
        props.insert("signal".to_string(), signal.to_string());
        Component::builtin("port", Placement::at(x, y), &[], props).unwrap()
    }

    #[test]
    fn test_mutators_require_action() {
        let mut aspect = Aspect::new("schematic");
        assert!(matches!(
            aspect.add_component(port(0, 0, "a")),
            Err(ModelError::NoActiveAction)
        ));
        aspect.start_action().unwrap();
        assert!(matches!(aspect.start_action(), Err(ModelError::NestedAction)));
        aspect.add_component(port(0, 0, "a")).unwrap();
        aspect.end_action().unwrap();
        assert!(matches!(aspect.end_action(), Err(ModelError::NoActiveAction)));
    }

    #[test]
    fn test_empty_action_leaves_no_history() {
        let mut aspect = Aspect::new("schematic");
        aspect.start_action().unwrap();
        aspect.end_action().unwrap();
        assert!(!aspect.can_undo());
        assert!(!aspect.is_modified());
    }

    #[test]
    fn test_index_follows_moves() {
        let mut aspect = Aspect::new("schematic");
        aspect.start_action().unwrap();
        let id = aspect.add_component(port(0, 0, "a")).unwrap();
        aspect.move_component(id, 8, 16).unwrap();
        aspect.end_action().unwrap();

        assert!(aspect.connections_at(Location::new(0, 0)).is_empty());
        assert_eq!(aspect.connections_at(Location::new(8, 16)), &[CpRef::new(id, 0)]);
        assert!(aspect.index_is_consistent());
    }

    #[test]
    fn test_undo_remove_restores_z_order() {
        let mut aspect = Aspect::new("schematic");
        aspect.start_action().unwrap();
        let a = aspect.add_component(port(0, 0, "a")).unwrap();
        let b = aspect.add_component(port(0, 32, "b")).unwrap();
        let c = aspect.add_component(port(0, 64, "c")).unwrap();
        aspect.end_action().unwrap();

        aspect.start_action().unwrap();
        aspect.remove_component(b).unwrap();
        aspect.end_action().unwrap();
        assert_eq!(aspect.ids(), &[a, c]);

        assert!(aspect.undo());
        assert_eq!(aspect.ids(), &[a, b, c]);
        assert!(aspect.redo());
        assert_eq!(aspect.ids(), &[a, c]);
        assert!(aspect.index_is_consistent());
    }

    #[test]
    fn test_rotate_and_undo() {
        let mut aspect = Aspect::new("schematic");
        aspect.start_action().unwrap();
        let id = aspect.add_component(port(8, 0, "a")).unwrap();
        aspect.end_action().unwrap();

        aspect.start_action().unwrap();
        aspect.rotate_component(id, Rotation::East, 0, 0).unwrap();
        aspect.end_action().unwrap();
        let p = aspect.component(id).unwrap().placement();
        assert_eq!(p, Placement::new(0, 8, Rotation::East));

        aspect.undo();
        let p = aspect.component(id).unwrap().placement();
        assert_eq!(p, Placement::new(8, 0, Rotation::North));
        assert!(aspect.index_is_consistent());
    }

    #[test]
    fn test_update_properties_undo() {
        let mut aspect = Aspect::new("schematic");
        aspect.start_action().unwrap();
        let id = aspect.add_component(port(0, 0, "a")).unwrap();
        aspect.end_action().unwrap();

        let mut props = aspect.component(id).unwrap().properties().clone();
        props.insert("signal".to_string(), "b".to_string());
        aspect.start_action().unwrap();
        aspect.update_properties(id, props).unwrap();
        aspect.end_action().unwrap();
        assert_eq!(aspect.component(id).unwrap().property("signal"), Some("b"));

        aspect.undo();
        assert_eq!(aspect.component(id).unwrap().property("signal"), Some("a"));

        let mut props = aspect.component(id).unwrap().properties().clone();
        props.insert("signal".to_string(), "a[x]".to_string());
        aspect.start_action().unwrap();
        assert!(matches!(
            aspect.update_properties(id, props),
            Err(ModelError::InvalidComponent(_))
        ));
        aspect.end_action().unwrap();
        assert_eq!(aspect.component(id).unwrap().property("signal"), Some("a"));
    }

    #[test]
    fn test_bbox_queries() {
        let lib = Library::new("user");
        let empty = Aspect::new("icon");
        assert_eq!(empty.bbox(), DEFAULT_BBOX);

        let aspect = Aspect::from_json(
            "icon",
            &json!([
                ["line", [0, 0, 0, 16, 0]],
                ["property", [100, 100, 0]],
                ["terminal", [16, 0, 0], {"name": "z"}]
            ]),
            &lib,
        )
        .unwrap();
        assert_eq!(aspect.bbox(), Rect::new(-2, -2, 26, 2));
        assert_eq!(aspect.selected_bbox(), Rect::EMPTY);
        assert_eq!(aspect.unselected_bbox(), aspect.bbox());
        assert_eq!(aspect.terminals(), vec![(16, 0, "z".to_string())]);
        assert!(!aspect.is_modified());
    }

    #[test]
    fn test_selection_helpers() {
        let lib = Library::new("user");
        let mut aspect = Aspect::from_json(
            "schematic",
            &json!([
                ["text", [0, 0, 0], {"text": "hi"}],
                ["port", [100, 0, 0], {"signal": "a"}]
            ]),
            &lib,
        )
        .unwrap();
        assert_eq!(aspect.required_grid(), 1);

        aspect.select_rect(Rect::new(-4, -4, 4, 4));
        let text = aspect.ids()[0];
        assert_eq!(aspect.selected_component(), Some(text));
        assert_eq!(aspect.required_grid(), 1);

        aspect.select_rect(Rect::new(90, -2, 110, 2));
        assert_eq!(aspect.selected_component(), None);
        assert_eq!(aspect.required_grid(), 8);

        assert_eq!(aspect.component_at(99, 0), Some(aspect.ids()[1]));
        assert_eq!(aspect.component_at(500, 500), None);
    }

    #[test]
    fn test_json_round_trip() {
        let lib = Library::new("user");
        let value = json!([
            ["wire", [0, 0, 0, 16, 0], {"signal": "a"}],
            ["ground", [16, 0, 0]]
        ]);
        let aspect = Aspect::from_json("schematic", &value, &lib).unwrap();
        assert_eq!(aspect.to_json(), value);
    }
}
