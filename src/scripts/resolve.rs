//! Script path resolution.
//!
//! Given a script id, its category and the invocation context, pick the
//! script root to look in:
//!
//! 1. participant assigned to an instance → that instance's scripts
//! 2. participant not in an instance → the scripts of the world they stand in
//! 3. no participant, instance given → that instance's scripts
//! 4. otherwise → the global plugin scripts
//!
//! A resolved path that doesn't exist means the hook is not implemented.

use std::path::PathBuf;

use crate::layout::{Layout, script_file};
use crate::scripts::ScriptCategory;

/// Where a supplied participant currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Assigned to an instance, live or through the recovery ledger.
    Instance(String),
    /// Not in any instance, standing in this world.
    World(String),
    /// Not in any instance and the host can't place them.
    Unplaced,
}

/// Which root a script resolved under. Decides its binding set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptTarget {
    Instance(String),
    World(String),
    Global,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub path: PathBuf,
    pub target: ScriptTarget,
}

impl Resolution {
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }
}

pub fn resolve(
    layout: &Layout,
    id: &str,
    category: ScriptCategory,
    participant: Option<&Placement>,
    instance: Option<&str>,
) -> Resolution {
    let target = match (participant, instance) {
        (Some(Placement::Instance(name)), _) => ScriptTarget::Instance(name.clone()),
        (Some(Placement::World(world)), _) => ScriptTarget::World(world.clone()),
        (_, Some(name)) => ScriptTarget::Instance(name.to_string()),
        _ => ScriptTarget::Global,
    };
    let root = match &target {
        ScriptTarget::Instance(name) => layout.instance_scripts(name),
        ScriptTarget::World(world) => layout.world_scripts(world),
        ScriptTarget::Global => layout.global_scripts(),
    };
    Resolution {
        path: script_file(&root, category, id),
        target,
    }
}
