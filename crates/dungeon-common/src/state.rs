//! Participant lifecycle states.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a participant inside one instance roster.
///
/// `None` is a query answer only; it is never stored in a roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParticipantState {
    /// In the session, counted for reset eligibility.
    Alive,
    /// Died, or came back online after a mid-session disconnect.
    Dead,
    /// Disconnected while the session was running.
    Offline,
    /// Left while the session was running. Terminal for the run.
    Quitter,
    /// Not a roster member.
    None,
}

impl ParticipantState {
    /// Returns all states, in declaration order.
    pub fn all() -> &'static [ParticipantState] {
        &[
            ParticipantState::Alive,
            ParticipantState::Dead,
            ParticipantState::Offline,
            ParticipantState::Quitter,
            ParticipantState::None,
        ]
    }

    /// Returns the persisted name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantState::Alive => "Alive",
            ParticipantState::Dead => "Dead",
            ParticipantState::Offline => "Offline",
            ParticipantState::Quitter => "Quitter",
            ParticipantState::None => "None",
        }
    }

    /// Upper-case label used in status output.
    pub fn label(&self) -> &'static str {
        match self {
            ParticipantState::Alive => "ALIVE",
            ParticipantState::Dead => "DEAD",
            ParticipantState::Offline => "OFFLINE",
            ParticipantState::Quitter => "QUITTER",
            ParticipantState::None => "NONE",
        }
    }

    pub fn is_alive(&self) -> bool {
        matches!(self, ParticipantState::Alive)
    }
}

impl std::fmt::Display for ParticipantState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ParticipantState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "alive" => Ok(ParticipantState::Alive),
            "dead" => Ok(ParticipantState::Dead),
            "offline" => Ok(ParticipantState::Offline),
            "quitter" => Ok(ParticipantState::Quitter),
            "none" => Ok(ParticipantState::None),
            _ => Err(format!(
                "Invalid participant state '{}'. Valid values: alive, dead, offline, quitter, none",
                s
            )),
        }
    }
}
