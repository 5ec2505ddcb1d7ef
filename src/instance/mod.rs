//! Dungeon instances: persisted config, session state machine and hooks.
//!
//! An [`Instance`] owns one `config.json` and the in-memory roster of the
//! current run. Every roster transition is persisted inline; side effects
//! that need the host (relocation, messages, hook scripts) are collected
//! while the instance is locked and performed after the lock is released.
//!
//! # Session states
//!
//! - inactive: roster may fill through `join`
//! - active: started, no new members
//! - cleared: active and won, members may leave freely
//!
//! `reset` returns any state to inactive and empties the roster.

pub mod file;
pub mod hooks;
pub mod session;

pub use file::{InstanceConfig, InstanceFile, UNLIMITED};
pub use hooks::InstanceHook;
pub use session::{Instance, JoinOutcome, JoinRejection, LeaveOutcome};
