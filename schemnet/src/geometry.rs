//! Geometry and Orientation
//!
//! Integer rectangles and the eight dihedral orientations used to place
//! components. Composition and transforms are table lookups so a component's
//! orientation always stays inside the 8-element group.

use serde::{Deserialize, Serialize};

/// Absolute position on the drawing grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    pub x: i64,
    pub y: i64,
}

impl Location {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// One of the eight orientations: four rotations, then their mirror images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Rotation {
    #[default]
    North = 0,
    East = 1,
    South = 2,
    West = 3,
    RNorth = 4,
    REast = 5,
    RSouth = 6,
    RWest = 7,
}

/// Result of composing two rotations: `COMPOSE[old * 8 + new]`.
const COMPOSE: [u8; 64] = [
    0, 1, 2, 3, 4, 5, 6, 7, // North (identity)
    1, 2, 3, 0, 7, 4, 5, 6, // East
    2, 3, 0, 1, 6, 7, 4, 5, // South
    3, 0, 1, 2, 5, 6, 7, 4, // West
    4, 5, 6, 7, 0, 1, 2, 3, // RNorth
    5, 6, 7, 4, 3, 0, 1, 2, // REast
    6, 7, 4, 5, 2, 3, 0, 1, // RSouth
    7, 4, 5, 6, 1, 2, 3, 0, // RWest
];

impl Rotation {
    pub const ALL: [Rotation; 8] = [
        Rotation::North,
        Rotation::East,
        Rotation::South,
        Rotation::West,
        Rotation::RNorth,
        Rotation::REast,
        Rotation::RSouth,
        Rotation::RWest,
    ];

    /// Rotation for an encoded index; values outside 0..8 wrap.
    pub fn from_index(index: i64) -> Self {
        Self::ALL[index.rem_euclid(8) as usize]
    }

    pub fn index(self) -> u8 {
        self as u8
    }

    /// Orientation after applying `next` to a component already at `self`.
    pub fn compose(self, next: Rotation) -> Rotation {
        Self::ALL[COMPOSE[self.index() as usize * 8 + next.index() as usize] as usize]
    }

    pub fn transform_x(self, x: i64, y: i64) -> i64 {
        match self {
            Rotation::North | Rotation::RSouth => x,
            Rotation::East | Rotation::REast => -y,
            Rotation::South | Rotation::RNorth => -x,
            Rotation::West | Rotation::RWest => y,
        }
    }

    pub fn transform_y(self, x: i64, y: i64) -> i64 {
        match self {
            Rotation::East | Rotation::RWest => x,
            Rotation::South | Rotation::RSouth => -y,
            Rotation::West | Rotation::REast => -x,
            Rotation::North | Rotation::RNorth => y,
        }
    }

    /// Image of a local offset under this orientation.
    pub fn transform(self, x: i64, y: i64) -> (i64, i64) {
        (self.transform_x(x, y), self.transform_y(x, y))
    }
}

/// Axis-aligned rectangle `[left, top, right, bottom]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

impl Rect {
    /// Identity for [`Rect::union`]; contains nothing.
    pub const EMPTY: Rect = Rect {
        left: i64::MAX,
        top: i64::MAX,
        right: i64::MIN,
        bottom: i64::MIN,
    };

    pub const fn new(left: i64, top: i64, right: i64, bottom: i64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Swap corners so that `left <= right` and `top <= bottom`.
    pub fn canonicalize(mut self) -> Self {
        if self.left > self.right {
            std::mem::swap(&mut self.left, &mut self.right);
        }
        if self.top > self.bottom {
            std::mem::swap(&mut self.top, &mut self.bottom);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.left > self.right || self.top > self.bottom
    }

    /// Manhattan overlap test, edges inclusive.
    pub fn intersects(&self, other: &Rect) -> bool {
        !(other.left > self.right
            || other.right < self.left
            || other.top > self.bottom
            || other.bottom < self.top)
    }

    pub fn contains(&self, x: i64, y: i64) -> bool {
        between(x, self.left, self.right) && between(y, self.top, self.bottom)
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }

    /// Grow every edge outwards by `amount`.
    pub fn expand(&self, amount: i64) -> Rect {
        Rect {
            left: self.left - amount,
            top: self.top - amount,
            right: self.right + amount,
            bottom: self.bottom + amount,
        }
    }

    /// Image of a local rectangle placed at `(x, y)` with `rotation`.
    pub fn transform(&self, rotation: Rotation, x: i64, y: i64) -> Rect {
        let (x1, y1) = rotation.transform(self.left, self.top);
        let (x2, y2) = rotation.transform(self.right, self.bottom);
        Rect::new(x1 + x, y1 + y, x2 + x, y2 + y).canonicalize()
    }
}

fn between(v: i64, lo: i64, hi: i64) -> bool {
    lo <= v && v <= hi
}

/// True when the three points lie on one line (zero triangle area).
pub fn collinear(p1: Location, p2: Location, p3: Location) -> bool {
    let area = p1.x * (p2.y - p3.y) + p2.x * (p3.y - p1.y) + p3.x * (p1.y - p2.y);
    area == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_stays_in_group() {
        for a in Rotation::ALL {
            assert_eq!(Rotation::North.compose(a), a);
            assert_eq!(a.compose(Rotation::North), a);
        }
        // four quarter turns return to the start
        let mut r = Rotation::North;
        for _ in 0..4 {
            r = r.compose(Rotation::East);
        }
        assert_eq!(r, Rotation::North);
        // mirroring twice is the identity
        assert_eq!(Rotation::RNorth.compose(Rotation::RNorth), Rotation::North);
    }

    #[test]
    fn test_compose_matches_transforms() {
        let (x, y) = (3, 7);
        for a in Rotation::ALL {
            for b in Rotation::ALL {
                let (ax, ay) = a.transform(x, y);
                let chained = b.transform(ax, ay);
                assert_eq!(a.compose(b).transform(x, y), chained, "{:?} then {:?}", a, b);
            }
        }
    }

    #[test]
    fn test_transform_table() {
        assert_eq!(Rotation::North.transform(8, 0), (8, 0));
        assert_eq!(Rotation::East.transform(8, 0), (0, 8));
        assert_eq!(Rotation::South.transform(8, 0), (-8, 0));
        assert_eq!(Rotation::West.transform(8, 0), (0, -8));
        assert_eq!(Rotation::RNorth.transform(8, 2), (-8, 2));
        assert_eq!(Rotation::RSouth.transform(8, 2), (8, -2));
    }

    #[test]
    fn test_rect_canonicalize_and_intersect() {
        let r = Rect::new(10, 10, 0, 0).canonicalize();
        assert_eq!(r, Rect::new(0, 0, 10, 10));
        assert!(r.intersects(&Rect::new(10, 10, 20, 20)));
        assert!(!r.intersects(&Rect::new(11, 0, 20, 5)));
        assert!(r.contains(0, 10));
        assert!(!r.contains(-1, 5));
    }

    #[test]
    fn test_rect_union_with_empty() {
        let r = Rect::new(-2, 3, 4, 5);
        assert_eq!(Rect::EMPTY.union(&r), r);
        assert!(Rect::EMPTY.is_empty());
    }

    #[test]
    fn test_rect_transform() {
        let r = Rect::new(0, -2, 8, 2);
        assert_eq!(r.transform(Rotation::East, 10, 10), Rect::new(8, 10, 12, 18));
    }

    #[test]
    fn test_collinear() {
        assert!(collinear(Location::new(0, 0), Location::new(20, 0), Location::new(10, 0)));
        assert!(collinear(Location::new(0, 0), Location::new(8, 8), Location::new(4, 4)));
        assert!(!collinear(Location::new(0, 0), Location::new(10, 10), Location::new(10, 0)));
    }
}
