//! CLI command implementations.
//!
//! | Module    | Commands handled                               |
//! |-----------|------------------------------------------------|
//! | `dungeon` | `List`, `Check`, `Create`, `Settings`          |
//! | `script`  | `CreateScript`, `CreateWorldScript`            |

pub mod dungeon;
pub mod script;

pub use dungeon::{cmd_check, cmd_create, cmd_list, cmd_settings};
pub use script::{cmd_create_script, cmd_create_world_script};
