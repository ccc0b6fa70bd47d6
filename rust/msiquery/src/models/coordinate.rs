use serde::{
    Deserialize,
    Serialize,
};

/// 1-indexed pixel position of a spectrum. `z` is usually 1.
///
/// Serialized as an `[x, y, z]` triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(i32, i32, i32)", into = "(i32, i32, i32)")]
pub struct Coordinate {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Coordinate {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// A pixel on the first (and usually only) plane.
    pub fn planar(x: i32, y: i32) -> Self {
        Self { x, y, z: 1 }
    }
}

impl From<(i32, i32, i32)> for Coordinate {
    fn from((x, y, z): (i32, i32, i32)) -> Self {
        Self { x, y, z }
    }
}

impl From<Coordinate> for (i32, i32, i32) {
    fn from(value: Coordinate) -> Self {
        (value.x, value.y, value.z)
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}
