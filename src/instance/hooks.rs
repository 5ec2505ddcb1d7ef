//! Named hook points an instance fires into its `scripts/dungeon/` directory.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceHook {
    /// Replaces the default status text when present.
    Status,
    DungeonReset,
    EntityDeath,
    PartyMemberJoin,
    PartyMemberQuit,
    PlayerRebirth,
    PlayerReset,
}

impl InstanceHook {
    pub fn all() -> &'static [InstanceHook] {
        &[
            InstanceHook::Status,
            InstanceHook::DungeonReset,
            InstanceHook::EntityDeath,
            InstanceHook::PartyMemberJoin,
            InstanceHook::PartyMemberQuit,
            InstanceHook::PlayerRebirth,
            InstanceHook::PlayerReset,
        ]
    }

    /// Script id the hook resolves to.
    pub fn script_id(&self) -> &'static str {
        match self {
            InstanceHook::Status => "DungeonStatus",
            InstanceHook::DungeonReset => "onDungeonReset",
            InstanceHook::EntityDeath => "onEntityDeath",
            InstanceHook::PartyMemberJoin => "onPartyMemberJoin",
            InstanceHook::PartyMemberQuit => "onPartyMemberQuit",
            InstanceHook::PlayerRebirth => "onPlayerRebirth",
            InstanceHook::PlayerReset => "onPlayerReset",
        }
    }

    /// One-line description written into the default script.
    pub fn describe(&self) -> &'static str {
        match self {
            InstanceHook::Status => "Runs when a participant asks for the dungeon status",
            InstanceHook::DungeonReset => "Runs after the dungeon has been reset",
            InstanceHook::EntityDeath => "Runs when an entity dies inside the running dungeon",
            InstanceHook::PartyMemberJoin => "Runs when a participant joins the party",
            InstanceHook::PartyMemberQuit => "Runs when a living participant abandons the run",
            InstanceHook::PlayerRebirth => "Runs when a dead participant asks to rejoin",
            InstanceHook::PlayerReset => "Runs when a participant is sent back to the spawn",
        }
    }

    /// Body of the generated script, when the hook has a useful default.
    pub fn default_body(&self) -> Option<&'static str> {
        match self {
            InstanceHook::Status => Some("player:send_message(dungeon:default_status())"),
            _ => None,
        }
    }

    /// Whether a participant is bound when the hook fires.
    pub fn has_participant(&self) -> bool {
        !matches!(self, InstanceHook::DungeonReset | InstanceHook::EntityDeath)
    }
}

impl std::fmt::Display for InstanceHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.script_id())
    }
}
