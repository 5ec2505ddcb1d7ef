//! Party dungeons: bounded areas with a party whose state survives restarts,
//! disconnects and environmental events, plus Lua hooks fired along the way.
//!
//! The [`registry::Registry`] is the entry point. It owns the loaded
//! [`instance::Instance`]s, the active-participant index, the
//! [`recovery::RecoveryLedger`] and the [`scripts::ScriptEngine`]. Host
//! integrations implement the traits in [`host`] and forward their events to
//! the methods in [`events`].

pub mod config;
pub mod errors;
pub mod events;
pub mod host;
pub mod instance;
pub mod item_drop;
pub mod layout;
pub mod logging;
pub mod recovery;
pub mod registry;
pub mod scripts;
pub mod world_vars;

pub use dungeon_common::{Area, BlockPos, Location, ParticipantState, Position, quantize_yaw};
pub use errors::{DungeonError, PersistError, ScriptError};
pub use registry::{Registry, ScriptRequest, Services};
