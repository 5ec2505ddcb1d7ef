//! Shared domain types for party dungeon sessions.
//!
//! Everything here is plain data with no I/O:
//! - `ParticipantState`: per-participant lifecycle state inside an instance
//! - `BlockPos`, `Position`, `Location`: block, persisted and live coordinates
//! - `Area`: an inclusive axis-aligned bounding box
//! - `quantize_yaw`: snaps a live orientation to a cardinal direction

pub mod geometry;
pub mod state;

pub use geometry::{Area, BlockPos, GeometryError, Location, Position, is_inside_area, quantize_yaw};
pub use state::ParticipantState;
