//! Integration tests for the editing model

use schemnet::geometry::{Location, Rect, Rotation};
use schemnet::library::builtin::gates_library;
use schemnet::model::{Aspect, Component, ModelError, Placement};
use std::collections::BTreeMap;

fn wire_count(aspect: &Aspect) -> usize {
    aspect.components().filter(|(_, c)| c.is_wire()).count()
}

fn inverter(x: i64, y: i64) -> Component {
    Component::instance("/gates/inverter", Placement::at(x, y), BTreeMap::new(), &gates_library())
}

#[test]
fn test_mutators_require_an_action() {
    let mut aspect = Aspect::new("schematic");
    assert!(matches!(aspect.add_wire(0, 0, 8, 0), Err(ModelError::NoActiveAction)));
    aspect.start_action().unwrap();
    assert!(matches!(aspect.start_action(), Err(ModelError::NestedAction)));
    aspect.end_action().unwrap();
    assert!(matches!(aspect.end_action(), Err(ModelError::NoActiveAction)));
}

#[test]
fn test_gate_dropped_onto_wire_splits_it() {
    let mut aspect = Aspect::new("schematic");
    aspect.start_action().unwrap();
    aspect.add_wire(-32, 0, 64, 0).unwrap();
    aspect.end_action().unwrap();

    aspect.start_action().unwrap();
    let gate = aspect.add_component(inverter(0, 0)).unwrap();
    aspect.end_action().unwrap();

    // Both gate terminals sit on the wire.
    assert_eq!(wire_count(&aspect), 3);
    assert_eq!(aspect.connections_at(Location::new(0, 0)).len(), 3);
    assert_eq!(aspect.connections_at(Location::new(32, 0)).len(), 3);
    assert!(aspect.index_is_consistent());

    assert!(aspect.undo());
    assert_eq!(wire_count(&aspect), 1);
    assert!(aspect.component(gate).is_none());
    assert!(aspect.index_is_consistent());

    assert!(aspect.redo());
    assert_eq!(wire_count(&aspect), 3);
    assert!(aspect.index_is_consistent());
}

#[test]
fn test_moving_gate_off_wire_merges_pieces_back() {
    let mut aspect = Aspect::new("schematic");
    aspect.start_action().unwrap();
    aspect.add_wire(-32, 0, 64, 0).unwrap();
    let gate = aspect.add_component(inverter(0, 0)).unwrap();
    aspect.end_action().unwrap();
    assert_eq!(wire_count(&aspect), 3);

    aspect.start_action().unwrap();
    aspect.move_component(gate, 0, 64).unwrap();
    aspect.end_action().unwrap();

    assert_eq!(wire_count(&aspect), 1);
    let (_, wire) = aspect.components().find(|(_, c)| c.is_wire()).unwrap();
    let (a, b) = wire.wire_ends().unwrap();
    let mut ends = [a, b];
    ends.sort();
    assert_eq!(ends, [Location::new(-32, 0), Location::new(64, 0)]);
    assert!(aspect.index_is_consistent());
}

#[test]
fn test_undo_redo_round_trip() {
    let mut aspect = Aspect::new("schematic");
    let mut snapshots = vec![aspect.to_json()];

    aspect.start_action().unwrap();
    let gate = aspect.add_component(inverter(0, 0)).unwrap();
    aspect.end_action().unwrap();
    snapshots.push(aspect.to_json());

    aspect.start_action().unwrap();
    aspect.rotate_component(gate, Rotation::East, 16, 0).unwrap();
    aspect.end_action().unwrap();
    snapshots.push(aspect.to_json());

    aspect.start_action().unwrap();
    aspect.add_wire(0, 64, 32, 64).unwrap();
    aspect.end_action().unwrap();
    snapshots.push(aspect.to_json());

    for expected in snapshots.iter().rev().skip(1) {
        assert!(aspect.undo());
        assert_eq!(&aspect.to_json(), expected);
    }
    assert!(!aspect.can_undo());
    for expected in snapshots.iter().skip(1) {
        assert!(aspect.redo());
        assert_eq!(&aspect.to_json(), expected);
    }
    assert!(!aspect.can_redo());
}

#[test]
fn test_new_action_discards_redo_history() {
    let mut aspect = Aspect::new("schematic");
    aspect.start_action().unwrap();
    aspect.add_wire(0, 0, 16, 0).unwrap();
    aspect.end_action().unwrap();
    assert!(aspect.undo());
    assert!(aspect.can_redo());

    aspect.start_action().unwrap();
    aspect.add_wire(0, 32, 16, 32).unwrap();
    aspect.end_action().unwrap();
    assert!(!aspect.can_redo());
}

#[test]
fn test_bounding_box_and_hit_testing() {
    let mut aspect = Aspect::new("schematic");
    aspect.start_action().unwrap();
    let gate = aspect.add_component(inverter(0, 0)).unwrap();
    let wire = aspect.add_wire(64, 64, 96, 64).unwrap();
    aspect.end_action().unwrap();

    let bbox = aspect.bbox();
    assert!(bbox.contains(0, 0));
    assert!(bbox.contains(96, 64));
    assert_eq!(aspect.component_at(80, 65), Some(wire));
    assert_eq!(aspect.component_at(16, 0), Some(gate));

    aspect.select_rect(Rect::new(60, 60, 100, 70));
    assert_eq!(aspect.selected_component(), Some(wire));
}

#[test]
fn test_library_aspect_round_trip() {
    let gates = gates_library();
    let icon = gates.module("/gates/nand2").unwrap().aspect("icon").unwrap();
    let reloaded = Aspect::from_json("icon", &icon.to_json(), &gates).unwrap();
    assert_eq!(reloaded.to_json(), icon.to_json());
    assert_eq!(reloaded.terminals().len(), 3);
    assert!(!reloaded.is_modified());
}
