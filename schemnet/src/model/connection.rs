//! Connection points and the identifiers used to address them.

use serde::{Deserialize, Serialize};

use crate::geometry::{Location, Rotation};
use crate::signal::parse_signal;

/// Stable identifier of a component within its aspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComponentId(pub u64);

impl std::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Address of one connection point: owning component plus its index in
/// that component's connection list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CpRef {
    pub component: ComponentId,
    pub index: usize,
}

impl CpRef {
    pub fn new(component: ComponentId, index: usize) -> Self {
        Self { component, index }
    }
}

/// A named terminal attached to a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionPoint {
    /// Terminal name as written, e.g. `d[3:0]`. Empty for unnamed points.
    pub name: String,
    /// One entry per bit of `name`.
    pub nlist: Vec<String>,
    /// Offset from the owner's origin before rotation.
    pub offset_x: i64,
    pub offset_y: i64,
    /// Absolute location, kept in step with the owner's placement.
    pub location: Location,
}

impl ConnectionPoint {
    pub fn new(offset_x: i64, offset_y: i64, name: impl Into<String>) -> Self {
        let name = name.into();
        let nlist = parse_signal(&name).unwrap_or_else(|e| {
            tracing::warn!("Ignoring terminal name: {}", e);
            Vec::new()
        });
        Self {
            name,
            nlist,
            offset_x,
            offset_y,
            location: Location::new(offset_x, offset_y),
        }
    }

    /// Unnamed point, as used by wires and rails.
    pub fn unnamed(offset_x: i64, offset_y: i64) -> Self {
        Self::new(offset_x, offset_y, "")
    }

    /// Recompute the absolute location for an owner placed at `(x, y)`.
    pub fn update_location(&mut self, x: i64, y: i64, rotation: Rotation) {
        let (dx, dy) = rotation.transform(self.offset_x, self.offset_y);
        self.location = Location::new(x + dx, y + dy);
    }

    pub fn coincident(&self, location: Location) -> bool {
        self.location == location
    }

    /// Number of bits the terminal name expands to.
    pub fn width(&self) -> usize {
        self.nlist.len()
    }
}
