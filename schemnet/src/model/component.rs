//! Component variants and their geometry.
//!
//! Every placed item in an aspect is a [`Component`]: a type tag, a
//! placement, a property bag and the connection points derived from them.
//! The set of variants is closed; module instances are the only variant whose
//! terminals come from outside (the module's icon aspect).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::connection::ConnectionPoint;
use super::ModelError;
use crate::geometry::{Location, Rect, Rotation};
use crate::library::ModuleLookup;
use crate::signal::{parse_integer, parse_signal, MAX_SIGNAL_WIDTH};

/// How close to a wire counts as "on" it.
pub const WIRE_DISTANCE: i64 = 2;
/// Radius of a drawn connection point; pads the terminal bbox.
pub const CONNECTION_POINT_RADIUS: i64 = 2;
/// Box used for instances whose module has no icon.
pub const DEFAULT_BBOX: Rect = Rect::new(-16, -16, 16, 16);

/// Spacing between memory ports along the y axis.
const MEMORY_PORT_PITCH: i64 = 48;

/// Origin and orientation of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Placement {
    pub x: i64,
    pub y: i64,
    pub rotation: Rotation,
}

impl Placement {
    pub fn new(x: i64, y: i64, rotation: Rotation) -> Self {
        Self { x, y, rotation }
    }

    pub fn at(x: i64, y: i64) -> Self {
        Self::new(x, y, Rotation::North)
    }
}

/// Icon-only drawing primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Graphic {
    Line { dx: i64, dy: i64 },
    Arc { dx: i64, dy: i64, third: Option<(i64, i64)> },
    Circle { radius: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentKind {
    /// Instance of a library module, drawn with the module's icon.
    Instance,
    Wire { dx: i64, dy: i64 },
    Ground,
    Vdd,
    Port,
    Jumper,
    Text,
    Property,
    /// Icon terminal; defines a connection point of the module's instances.
    Terminal,
    Graphic(Graphic),
    Memory,
}

impl ComponentKind {
    /// Built-in type tag, `None` for module instances.
    pub fn tag(&self) -> Option<&'static str> {
        Some(match self {
            ComponentKind::Instance => return None,
            ComponentKind::Wire { .. } => "wire",
            ComponentKind::Ground => "ground",
            ComponentKind::Vdd => "vdd",
            ComponentKind::Port => "port",
            ComponentKind::Jumper => "jumper",
            ComponentKind::Text => "text",
            ComponentKind::Property => "property",
            ComponentKind::Terminal => "terminal",
            ComponentKind::Graphic(Graphic::Line { .. }) => "line",
            ComponentKind::Graphic(Graphic::Arc { .. }) => "arc",
            ComponentKind::Graphic(Graphic::Circle { .. }) => "circle",
            ComponentKind::Memory => "memory",
        })
    }

    fn from_tag(tag: &str, extra: &[i64]) -> Option<Self> {
        let at = |i: usize| extra.get(i).copied().unwrap_or(0);
        Some(match tag {
            "wire" => ComponentKind::Wire { dx: at(0), dy: at(1) },
            "ground" => ComponentKind::Ground,
            "vdd" => ComponentKind::Vdd,
            "port" => ComponentKind::Port,
            "jumper" => ComponentKind::Jumper,
            "text" => ComponentKind::Text,
            "property" => ComponentKind::Property,
            "terminal" => ComponentKind::Terminal,
            "line" => ComponentKind::Graphic(Graphic::Line { dx: at(0), dy: at(1) }),
            "arc" => ComponentKind::Graphic(Graphic::Arc {
                dx: at(0),
                dy: at(1),
                third: (extra.len() >= 4).then(|| (at(2), at(3))),
            }),
            "circle" => ComponentKind::Graphic(Graphic::Circle { radius: at(0) }),
            "memory" => ComponentKind::Memory,
            _ => return None,
        })
    }

    /// Declared properties and their default values.
    fn defaults(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            ComponentKind::Instance | ComponentKind::Jumper | ComponentKind::Graphic(_) => &[],
            ComponentKind::Wire { .. } => &[("signal", ""), ("width", "")],
            ComponentKind::Ground => &[("global_signal", "gnd")],
            ComponentKind::Vdd => &[("global_signal", "Vdd")],
            ComponentKind::Port => &[("signal", "???")],
            ComponentKind::Text => &[
                ("text", "???"),
                ("font", "6pt sans-serif"),
                ("align", "center-left"),
            ],
            ComponentKind::Property => &[("format", "{???}"), ("align", "center-left")],
            ComponentKind::Terminal => &[("name", "???"), ("line", "yes")],
            ComponentKind::Memory => &[
                ("name", ""),
                ("nports", "1"),
                ("naddr", "3"),
                ("ndata", "8"),
                ("contents", ""),
            ],
        }
    }
}

/// A placed, oriented primitive or module instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    type_name: String,
    kind: ComponentKind,
    placement: Placement,
    properties: BTreeMap<String, String>,
    defaults: BTreeMap<String, String>,
    connections: Vec<ConnectionPoint>,
    /// Local bounding box, before placement.
    bounding_box: Rect,
    /// Absolute bounding box.
    bbox: Rect,
    pub selected: bool,
}

impl Component {
    /// Build a built-in component from its type tag.
    pub fn builtin(
        tag: &str,
        placement: Placement,
        extra: &[i64],
        properties: BTreeMap<String, String>,
    ) -> Result<Self, ModelError> {
        let kind = ComponentKind::from_tag(tag, extra)
            .ok_or_else(|| ModelError::InvalidComponent(format!("unknown built-in type '{}'", tag)))?;
        let defaults = kind
            .defaults()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut component = Self {
            type_name: tag.to_string(),
            kind,
            placement,
            properties,
            defaults,
            connections: Vec::new(),
            bounding_box: Rect::new(0, 0, 0, 0),
            bbox: Rect::new(0, 0, 0, 0),
            selected: false,
        };
        component.check_limits()?;
        component.default_properties();
        component.setup_geometry();
        Ok(component)
    }

    /// Reject terminal names and memory sizes that would expand past
    /// [`MAX_SIGNAL_WIDTH`] bits.
    fn check_limits(&self) -> Result<(), ModelError> {
        match self.kind {
            ComponentKind::Terminal => {
                if let Some(name) = self.properties.get("name") {
                    parse_signal(name).map_err(|e| ModelError::InvalidComponent(e.to_string()))?;
                }
            }
            ComponentKind::Memory => {
                for key in ["nports", "naddr", "ndata"] {
                    let Some(value) = self.properties.get(key) else {
                        continue;
                    };
                    if parse_integer(value).is_some_and(|n| n > MAX_SIGNAL_WIDTH as i64) {
                        return Err(ModelError::InvalidComponent(format!(
                            "memory {} of {} exceeds {} bits",
                            key, value, MAX_SIGNAL_WIDTH
                        )));
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Wire from `(x1, y1)` to `(x2, y2)`.
    pub fn wire(x1: i64, y1: i64, x2: i64, y2: i64) -> Self {
        let kind = ComponentKind::Wire { dx: x2 - x1, dy: y2 - y1 };
        let mut component = Self {
            type_name: "wire".to_string(),
            kind,
            placement: Placement::at(x1, y1),
            properties: BTreeMap::new(),
            defaults: kind
                .defaults()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            connections: Vec::new(),
            bounding_box: Rect::new(0, 0, 0, 0),
            bbox: Rect::new(0, 0, 0, 0),
            selected: false,
        };
        component.default_properties();
        component.setup_geometry();
        component
    }

    /// Instance of a module. Terminals and the bounding box come from the
    /// module's icon; unknown modules and modules without an icon get a
    /// stand-in box and no terminals.
    pub fn instance(
        type_name: &str,
        placement: Placement,
        properties: BTreeMap<String, String>,
        lookup: &dyn ModuleLookup,
    ) -> Self {
        let type_name = lookup.qualify(type_name);
        let mut defaults = BTreeMap::new();
        let mut connections = Vec::new();
        let mut bounding_box = DEFAULT_BBOX;

        match lookup.find_module(&type_name) {
            Some(module) => {
                for (name, def) in module.properties() {
                    defaults.insert(name.clone(), def.value.clone());
                }
                if let Some(icon) = module.aspect("icon").filter(|icon| !icon.is_empty()) {
                    connections = icon
                        .terminals()
                        .into_iter()
                        .map(|(x, y, name)| ConnectionPoint::new(x, y, name))
                        .collect();
                    bounding_box = icon.bbox();
                }
            }
            None => {
                tracing::warn!("No module named {}; using a placeholder instance", type_name);
            }
        }

        let mut component = Self {
            type_name,
            kind: ComponentKind::Instance,
            placement,
            properties,
            defaults,
            connections,
            bounding_box,
            bbox: bounding_box,
            selected: false,
        };
        component.default_properties();
        component.update_coords();
        component
    }

    /// Load from the `[type, [x, y, rotation, ...extra], {props}?]` form.
    pub fn from_json(value: &Value, lookup: &dyn ModuleLookup) -> Result<Self, ModelError> {
        let parts = value
            .as_array()
            .ok_or_else(|| ModelError::InvalidComponent(format!("expected an array, got {}", value)))?;
        let type_name = parts
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| ModelError::InvalidComponent("missing component type".to_string()))?;
        let coords = parts
            .get(1)
            .and_then(Value::as_array)
            .ok_or_else(|| {
                ModelError::InvalidComponent(format!("missing coordinates for '{}'", type_name))
            })?
            .iter()
            .map(|v| parse_coord(v, type_name))
            .collect::<Result<Vec<i64>, ModelError>>()?;
        if coords.len() < 2 {
            return Err(ModelError::InvalidComponent(format!(
                "'{}' needs at least x and y coordinates",
                type_name
            )));
        }
        let placement = Placement::new(
            coords[0],
            coords[1],
            Rotation::from_index(coords.get(2).copied().unwrap_or(0)),
        );
        let properties = match parts.get(2) {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(k, v)| {
                    let v = match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), v)
                })
                .collect(),
            Some(Value::Null) | None => BTreeMap::new(),
            Some(other) => {
                return Err(ModelError::InvalidComponent(format!(
                    "properties of '{}' must be an object, got {}",
                    type_name, other
                )))
            }
        };

        let extra = coords.get(3..).unwrap_or(&[]);
        if ComponentKind::from_tag(type_name, extra).is_some() {
            Self::builtin(type_name, placement, extra, properties)
        } else {
            Ok(Self::instance(type_name, placement, properties, lookup))
        }
    }

    /// Serialize back to the component triple; default-valued properties
    /// are omitted.
    pub fn to_json(&self) -> Value {
        let p = &self.placement;
        let mut coords = vec![p.x, p.y, p.rotation.index() as i64];
        match self.kind {
            ComponentKind::Wire { dx, dy } | ComponentKind::Graphic(Graphic::Line { dx, dy }) => {
                coords.extend([dx, dy]);
            }
            ComponentKind::Graphic(Graphic::Arc { dx, dy, third }) => {
                coords.extend([dx, dy]);
                if let Some((ex, ey)) = third {
                    coords.extend([ex, ey]);
                }
            }
            ComponentKind::Graphic(Graphic::Circle { radius }) => coords.push(radius),
            _ => {}
        }
        let props = self.clone_properties(true);
        if props.is_empty() {
            json!([self.type_name, coords])
        } else {
            json!([self.type_name, coords, props])
        }
    }

    /// Copy placed at a new origin.
    pub fn clone_at(&self, x: i64, y: i64) -> Self {
        let mut c = self.clone();
        c.selected = false;
        c.placement.x = x;
        c.placement.y = y;
        c.update_coords();
        c
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn kind(&self) -> &ComponentKind {
        &self.kind
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    pub fn connections(&self) -> &[ConnectionPoint] {
        &self.connections
    }

    pub fn bounding_box(&self) -> Rect {
        self.bounding_box
    }

    pub fn bbox(&self) -> Rect {
        self.bbox
    }

    pub fn is_wire(&self) -> bool {
        matches!(self.kind, ComponentKind::Wire { .. })
    }

    /// Components that carry a user-visible instance name.
    pub fn is_named(&self) -> bool {
        matches!(self.kind, ComponentKind::Instance | ComponentKind::Memory)
    }

    /// Lowercased `name` property; empty when unset.
    pub fn name(&self) -> String {
        self.property("name").unwrap_or("").trim().to_lowercase()
    }

    pub fn required_grid(&self) -> i64 {
        match self.kind {
            ComponentKind::Text | ComponentKind::Property | ComponentKind::Graphic(_) => 1,
            _ => 8,
        }
    }

    /// Non-empty properties; with `remove_defaults` those equal to their
    /// declared default are dropped as well.
    pub fn clone_properties(&self, remove_defaults: bool) -> BTreeMap<String, String> {
        self.properties
            .iter()
            .filter(|(k, v)| {
                !v.is_empty() && !(remove_defaults && self.defaults.get(*k) == Some(*v))
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Declared property names with their defaults.
    pub fn defaults(&self) -> &BTreeMap<String, String> {
        &self.defaults
    }

    /// Replace the property bag. Missing declared properties get their
    /// defaults and terminals that depend on properties are rebuilt.
    pub fn set_properties(&mut self, properties: BTreeMap<String, String>) {
        self.properties = properties;
        self.default_properties();
        if self.kind != ComponentKind::Instance {
            self.setup_geometry();
        }
    }

    pub fn set_placement(&mut self, placement: Placement) {
        self.placement = placement;
        self.update_coords();
    }

    pub fn translate(&mut self, dx: i64, dy: i64) {
        self.placement.x += dx;
        self.placement.y += dy;
        self.update_coords();
    }

    /// Placement after rotating by `rotation` about `(cx, cy)`.
    pub fn rotated_placement(&self, rotation: Rotation, cx: i64, cy: i64) -> Placement {
        let (rx, ry) = (self.placement.x - cx, self.placement.y - cy);
        let (nx, ny) = rotation.transform(rx, ry);
        Placement::new(nx + cx, ny + cy, self.placement.rotation.compose(rotation))
    }

    pub fn inside(&self, x: i64, y: i64) -> bool {
        self.bbox.contains(x, y)
    }

    /// Hit test used for picking.
    pub fn near(&self, x: i64, y: i64) -> bool {
        match self.kind {
            ComponentKind::Wire { .. } | ComponentKind::Graphic(Graphic::Line { .. }) => {
                self.inside(x, y)
                    && self
                        .line_distance_sq(x, y)
                        .map(|(cross, len)| cross <= WIRE_DISTANCE as i128 * WIRE_DISTANCE as i128 * len)
                        .unwrap_or(false)
            }
            _ => self.inside(x, y),
        }
    }

    /// `true` when the component overlaps `rect`. Wires only count when one
    /// of their end points lies inside.
    pub fn intersects(&self, rect: &Rect) -> bool {
        match self.wire_ends() {
            Some((a, b)) => rect.contains(a.x, a.y) || rect.contains(b.x, b.y),
            None => self.bbox.intersects(rect),
        }
    }

    /// End points of a wire.
    pub fn wire_ends(&self) -> Option<(Location, Location)> {
        if !self.is_wire() {
            return None;
        }
        match self.connections.as_slice() {
            [a, b] => Some((a.location, b.location)),
            _ => None,
        }
    }

    /// For a wire, the location of the connection point opposite `index`.
    pub fn other_end(&self, index: usize) -> Option<Location> {
        let (a, b) = self.wire_ends()?;
        Some(if index == 0 { b } else { a })
    }

    /// Squared cross product and squared length of the wire, for comparing
    /// the point-to-line distance without floating point.
    fn line_distance_sq(&self, x: i64, y: i64) -> Option<(i128, i128)> {
        let (dx, dy) = match self.kind {
            ComponentKind::Wire { dx, dy } | ComponentKind::Graphic(Graphic::Line { dx, dy }) => {
                self.placement.rotation.transform(dx, dy)
            }
            _ => return None,
        };
        let len_sq = dx as i128 * dx as i128 + dy as i128 * dy as i128;
        if len_sq == 0 {
            return None;
        }
        let cross = (x - self.placement.x) as i128 * dy as i128
            - (y - self.placement.y) as i128 * dx as i128;
        Some((cross * cross, len_sq))
    }

    /// `true` when `location` lies strictly inside this wire's span.
    pub fn bisect_cp(&self, location: Location) -> bool {
        let Some((a, b)) = self.wire_ends() else {
            return false;
        };
        self.inside(location.x, location.y)
            && self
                .line_distance_sq(location.x, location.y)
                .map(|(cross, len)| cross < len)
                .unwrap_or(false)
            && location != a
            && location != b
    }

    /// First connection point of `other` that splits this wire.
    pub fn bisect(&self, other: &Component) -> Option<Location> {
        if !self.is_wire() {
            return None;
        }
        other
            .connections
            .iter()
            .rev()
            .map(|cp| cp.location)
            .find(|loc| self.bisect_cp(*loc))
    }

    /// Terminal definition `(x, y, name)` provided to instances of the
    /// module whose icon contains this component.
    pub fn terminal_coords(&self) -> Option<(i64, i64, String)> {
        match self.kind {
            ComponentKind::Terminal => Some((
                self.placement.x,
                self.placement.y,
                self.property("name").unwrap_or("").to_string(),
            )),
            _ => None,
        }
    }

    fn default_properties(&mut self) {
        for (name, value) in &self.defaults {
            self.properties
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
    }

    /// Connection points and local bbox for the built-in variants.
    fn setup_geometry(&mut self) {
        let (connections, bounding_box) = match self.kind {
            ComponentKind::Instance => return,
            ComponentKind::Wire { dx, dy } => (
                vec![ConnectionPoint::unnamed(0, 0), ConnectionPoint::unnamed(dx, dy)],
                Rect::new(0, 0, dx, dy).canonicalize().expand(WIRE_DISTANCE),
            ),
            ComponentKind::Ground => (
                vec![ConnectionPoint::new(0, 0, "gnd")],
                Rect::new(-6, 0, 6, 14),
            ),
            ComponentKind::Vdd => (vec![ConnectionPoint::unnamed(0, 0)], Rect::new(-6, -8, 6, 0)),
            ComponentKind::Port => (vec![ConnectionPoint::unnamed(0, 0)], Rect::new(-24, -4, 0, 4)),
            ComponentKind::Jumper => (
                vec![ConnectionPoint::new(0, 0, "n1"), ConnectionPoint::new(8, 0, "n2")],
                Rect::new(0, -4, 8, 0),
            ),
            ComponentKind::Text => (
                Vec::new(),
                text_bbox(
                    self.property("text").unwrap_or(""),
                    self.property("align").unwrap_or("center-left"),
                ),
            ),
            ComponentKind::Property => (
                Vec::new(),
                text_bbox(
                    self.property("format").unwrap_or(""),
                    self.property("align").unwrap_or("center-left"),
                ),
            ),
            ComponentKind::Terminal => (
                Vec::new(),
                Rect::new(
                    -CONNECTION_POINT_RADIUS,
                    -CONNECTION_POINT_RADIUS,
                    8 + CONNECTION_POINT_RADIUS,
                    CONNECTION_POINT_RADIUS,
                ),
            ),
            ComponentKind::Graphic(Graphic::Line { dx, dy })
            | ComponentKind::Graphic(Graphic::Arc { dx, dy, third: None }) => (
                Vec::new(),
                Rect::new(0, 0, dx, dy).canonicalize().expand(WIRE_DISTANCE),
            ),
            ComponentKind::Graphic(Graphic::Arc { dx, dy, third: Some((ex, ey)) }) => (
                Vec::new(),
                Rect::new(0, 0, dx, dy)
                    .canonicalize()
                    .union(&Rect::new(ex, ey, ex, ey)),
            ),
            ComponentKind::Graphic(Graphic::Circle { radius }) => {
                (Vec::new(), Rect::new(-radius, -radius, radius, radius))
            }
            ComponentKind::Memory => self.memory_geometry(),
        };
        self.connections = connections;
        self.bounding_box = bounding_box;
        self.update_coords();
    }

    /// Per port `i`: `a{i}[naddr-1:0]`, `d{i}[ndata-1:0]`, `oe{i}`, `we{i}`
    /// and `clk{i}`. Control terminals sit on the left edge, data on the right.
    fn memory_geometry(&self) -> (Vec<ConnectionPoint>, Rect) {
        let count = |name: &str, default: i64| {
            self.property(name)
                .and_then(parse_integer)
                .unwrap_or(default)
                .clamp(1, MAX_SIGNAL_WIDTH as i64)
        };
        let nports = count("nports", 1);
        let naddr = count("naddr", 3);
        let ndata = count("ndata", 8);

        let mut connections = Vec::new();
        for port in 0..nports {
            let y = port * MEMORY_PORT_PITCH;
            connections.push(ConnectionPoint::new(0, y, format!("a{}[{}:0]", port, naddr - 1)));
            connections.push(ConnectionPoint::new(64, y, format!("d{}[{}:0]", port, ndata - 1)));
            connections.push(ConnectionPoint::new(0, y + 8, format!("oe{}", port)));
            connections.push(ConnectionPoint::new(0, y + 16, format!("we{}", port)));
            connections.push(ConnectionPoint::new(0, y + 24, format!("clk{}", port)));
        }
        (connections, Rect::new(0, -8, 64, nports * MEMORY_PORT_PITCH))
    }

    /// Refresh the absolute bbox and connection point locations.
    fn update_coords(&mut self) {
        let Placement { x, y, rotation } = self.placement;
        self.bbox = self.bounding_box.transform(rotation, x, y);
        for cp in &mut self.connections {
            cp.update_location(x, y, rotation);
        }
    }
}

fn parse_coord(value: &Value, type_name: &str) -> Result<i64, ModelError> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.round() as i64))
        .ok_or_else(|| {
            ModelError::InvalidComponent(format!("non-numeric coordinate {} in '{}'", value, type_name))
        })
}

/// Crude text extent: 8 units high, 4 per character, positioned by an
/// alignment such as `center-left` or `bottom-right`.
fn text_bbox(text: &str, align: &str) -> Rect {
    let h = 8;
    let w = 4 * text.chars().count() as i64;
    let mut position = align.split('-');
    let vertical = position.next().unwrap_or("center");
    let horizontal = position.next().unwrap_or(vertical);
    let (top, bottom) = match vertical {
        "top" => (0, h),
        "center" => (-h / 2, h / 2),
        _ => (-h, 0),
    };
    let (left, right) = match horizontal {
        "left" => (0, w),
        "center" => (-w / 2, w / 2),
        _ => (-w, 0),
    };
    Rect::new(left, top, right, bottom)
}
