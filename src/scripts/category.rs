//! Script categories and their binding sets.

use serde::{Deserialize, Serialize};

/// Classification of a script by trigger kind.
///
/// The category decides the storage subdirectory and the names a script can
/// expect to find bound when it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptCategory {
    Uncategorized,
    Interact,
    Walk,
    AreaWalk,
    Instance,
}

/// Bindings of a script resolved under a world directory.
pub const WORLD_BINDINGS: &[&str] = &["player", "sm", "variables", "world"];

impl ScriptCategory {
    pub fn all() -> &'static [ScriptCategory] {
        &[
            ScriptCategory::Uncategorized,
            ScriptCategory::Interact,
            ScriptCategory::Walk,
            ScriptCategory::AreaWalk,
            ScriptCategory::Instance,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptCategory::Uncategorized => "none",
            ScriptCategory::Interact => "interact",
            ScriptCategory::Walk => "walk",
            ScriptCategory::AreaWalk => "area_walk",
            ScriptCategory::Instance => "dungeon",
        }
    }

    /// Subdirectory under a script root. `None` for uncategorized scripts.
    pub fn dir_name(&self) -> Option<&'static str> {
        match self {
            ScriptCategory::Uncategorized => None,
            other => Some(other.as_str()),
        }
    }

    /// Upper-case tag written into script headers.
    pub fn header_tag(&self) -> &'static str {
        match self {
            ScriptCategory::Uncategorized => "NONE",
            ScriptCategory::Interact => "INTERACT",
            ScriptCategory::Walk => "WALK",
            ScriptCategory::AreaWalk => "AREA_WALK",
            ScriptCategory::Instance => "DUNGEON",
        }
    }
}

impl std::fmt::Display for ScriptCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ScriptCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "uncategorized" => Ok(ScriptCategory::Uncategorized),
            "interact" => Ok(ScriptCategory::Interact),
            "walk" => Ok(ScriptCategory::Walk),
            "area_walk" | "areawalk" => Ok(ScriptCategory::AreaWalk),
            "dungeon" | "instance" => Ok(ScriptCategory::Instance),
            _ => anyhow::bail!(
                "Invalid script category '{}'. Valid values: none, interact, walk, area_walk, dungeon",
                s
            ),
        }
    }
}

/// Names bound for a script of `category` resolved under an instance or the
/// global root.
pub fn bindings_for(category: ScriptCategory) -> &'static [&'static str] {
    match category {
        ScriptCategory::Uncategorized => &[],
        ScriptCategory::Interact | ScriptCategory::Walk | ScriptCategory::AreaWalk => {
            &["sm", "player"]
        }
        ScriptCategory::Instance => &["sm", "dungeon"],
    }
}
