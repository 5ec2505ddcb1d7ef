//! Block coordinates, persisted positions and bounding boxes.
//!
//! Block positions round-trip through two string forms used as script ids:
//! `x_y_z` for a single block and `x_y_z~x_y_z` for an area.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GeometryError {
    #[error("Invalid block position '{0}'. Expected x_y_z")]
    InvalidBlock(String),

    #[error("Invalid area '{0}'. Expected x_y_z~x_y_z")]
    InvalidArea(String),
}

/// Integer block coordinates. Persisted as `[x, y, z]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "[i32; 3]", into = "[i32; 3]")]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The block directly below this one.
    pub fn below(&self) -> Self {
        Self::new(self.x, self.y - 1, self.z)
    }

    /// Script id form, `x_y_z`.
    pub fn to_id(&self) -> String {
        format!("{}_{}_{}", self.x, self.y, self.z)
    }

    pub fn parse_id(id: &str) -> Result<Self, GeometryError> {
        let parts: Vec<&str> = id.trim().split('_').collect();
        if parts.len() != 3 {
            return Err(GeometryError::InvalidBlock(id.to_string()));
        }
        let mut coords = [0i32; 3];
        for (slot, part) in coords.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| GeometryError::InvalidBlock(id.to_string()))?;
        }
        Ok(coords.into())
    }

    pub fn pretty(&self) -> String {
        format!("({}, {}, {})", self.x, self.y, self.z)
    }
}

impl From<[i32; 3]> for BlockPos {
    fn from(v: [i32; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

impl From<BlockPos> for [i32; 3] {
    fn from(p: BlockPos) -> Self {
        [p.x, p.y, p.z]
    }
}

/// Block-aligned position with a cardinal yaw. Persisted as `[x, y, z, yaw]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct Position {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub yaw: i32,
}

impl Position {
    pub fn new(x: i32, y: i32, z: i32, yaw: i32) -> Self {
        Self { x, y, z, yaw }
    }

    /// Captures a live location, snapping the yaw to a cardinal direction.
    pub fn from_location(location: &Location) -> Self {
        let block = location.block();
        Self::new(block.x, block.y, block.z, quantize_yaw(location.yaw))
    }

    /// Live location at the centre of the block.
    pub fn to_location(&self, world: &str) -> Location {
        Location {
            world: world.to_string(),
            x: f64::from(self.x) + 0.5,
            y: f64::from(self.y),
            z: f64::from(self.z) + 0.5,
            yaw: self.yaw as f32,
        }
    }
}

impl From<[i32; 4]> for Position {
    fn from(v: [i32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<Position> for [i32; 4] {
    fn from(p: Position) -> Self {
        [p.x, p.y, p.z, p.yaw]
    }
}

/// A live location in a named world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub world: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default)]
    pub yaw: f32,
}

impl Location {
    pub fn new(world: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
            yaw: 0.0,
        }
    }

    pub fn with_yaw(mut self, yaw: f32) -> Self {
        self.yaw = yaw;
        self
    }

    /// The block containing this location.
    pub fn block(&self) -> BlockPos {
        BlockPos::new(
            self.x.floor() as i32,
            self.y.floor() as i32,
            self.z.floor() as i32,
        )
    }
}

/// Axis-aligned bounding box given by two opposite corners in any order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Area {
    pub a: BlockPos,
    pub b: BlockPos,
}

impl Area {
    pub fn new(a: BlockPos, b: BlockPos) -> Self {
        Self { a, b }
    }

    pub fn contains(&self, pos: BlockPos) -> bool {
        is_inside_area(self.a, self.b, pos)
    }

    /// Script id form, `x_y_z~x_y_z`.
    pub fn to_id(&self) -> String {
        format!("{}~{}", self.a.to_id(), self.b.to_id())
    }

    pub fn parse_id(id: &str) -> Result<Self, GeometryError> {
        let (a, b) = id
            .trim()
            .split_once('~')
            .ok_or_else(|| GeometryError::InvalidArea(id.to_string()))?;
        let a = BlockPos::parse_id(a).map_err(|_| GeometryError::InvalidArea(id.to_string()))?;
        let b = BlockPos::parse_id(b).map_err(|_| GeometryError::InvalidArea(id.to_string()))?;
        Ok(Self::new(a, b))
    }

    pub fn pretty(&self) -> String {
        format!("{} ~ {}", self.a.pretty(), self.b.pretty())
    }
}

fn within(v: i32, a: i32, b: i32) -> bool {
    v >= a.min(b) && v <= a.max(b)
}

/// Inclusive containment test. Corner order does not matter.
pub fn is_inside_area(a: BlockPos, b: BlockPos, pos: BlockPos) -> bool {
    within(pos.x, a.x, b.x) && within(pos.y, a.y, b.y) && within(pos.z, a.z, b.z)
}

/// Snaps a yaw in degrees to 180 (north), -90 (east), 0 (south) or 90 (west).
pub fn quantize_yaw(yaw: f32) -> i32 {
    let yaw = ((yaw % 360.0) + 540.0) % 360.0 - 180.0;
    if yaw >= 135.0 || yaw <= -134.0 {
        180
    } else if yaw < -45.0 {
        -90
    } else if yaw < 45.0 {
        0
    } else {
        90
    }
}
