//! Script resolution, dispatch and evaluation.
//!
//! A script is a Lua file found by id and category under an instance, world
//! or the global script root. A missing file means the hook is not
//! implemented and is never an error.

pub mod api;
pub mod category;
pub mod engine;
pub mod lua;
pub mod resolve;
pub mod writer;

pub use api::{Capabilities, ScriptApi};
pub use category::{ScriptCategory, WORLD_BINDINGS, bindings_for};
pub use engine::{Bindings, ScriptEngine, ScriptJob};
pub use resolve::{Placement, Resolution, ScriptTarget, resolve};
pub use writer::{ScriptWriter, write_default_hooks};
