//! Typed error hierarchy for the dungeon runtime.
//!
//! Three enums cover the three failure domains:
//! - `PersistError` for reading and writing the JSON documents on disk
//! - `ScriptError` for script loading, evaluation and dispatch
//! - `DungeonError` for administrative operations on instances
//!
//! Participant-facing outcomes (a rejected join, an already-left quit) are
//! not errors. They are returned as plain outcome enums by the session.

use std::path::PathBuf;

use dungeon_common::GeometryError;
use thiserror::Error;

/// Errors from the JSON document store.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors from the script subsystem.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Failed to read script {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Script {path} failed: {message}")]
    Evaluation { path: PathBuf, message: String },

    #[error("Script queue is full, dropped {path}")]
    QueueFull { path: PathBuf },

    #[error("Script engine is shut down")]
    EngineStopped,

    #[error("Invalid script id '{0}'")]
    InvalidId(String),

    #[error("Script already exists at {path}")]
    AlreadyExists { path: PathBuf },

    #[error("Failed to write script {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start script runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

/// Errors from administrative instance operations.
#[derive(Debug, Error)]
pub enum DungeonError {
    #[error("Dungeon '{0}' does not exist")]
    UnknownInstance(String),

    #[error("Dungeon '{0}' already exists")]
    AlreadyExists(String),

    #[error("Invalid dungeon name '{0}'")]
    InvalidName(String),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("Registry lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persist_error_write_carries_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = PersistError::Write {
            path: PathBuf::from("/plugin/reset.json"),
            source: io_err,
        };
        let msg = err.to_string();
        assert!(msg.contains("/plugin/reset.json"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn script_error_queue_full_is_matchable() {
        let err = ScriptError::QueueFull {
            path: PathBuf::from("walk/1_2_3.lua"),
        };
        match &err {
            ScriptError::QueueFull { path } => assert!(path.ends_with("1_2_3.lua")),
            _ => panic!("Expected QueueFull variant"),
        }
    }

    #[test]
    fn dungeon_error_wraps_geometry() {
        let err: DungeonError = GeometryError::InvalidArea("nope".into()).into();
        assert!(matches!(err, DungeonError::Geometry(_)));
        assert!(err.to_string().contains("x_y_z~x_y_z"));
    }

    #[test]
    fn dungeon_error_from_persist() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: DungeonError = PersistError::Parse {
            path: PathBuf::from("config.json"),
            source,
        }
        .into();
        assert!(matches!(err, DungeonError::Persist(PersistError::Parse { .. })));
    }

    #[test]
    fn dungeon_error_unknown_instance_message() {
        let err = DungeonError::UnknownInstance("crypt".into());
        assert_eq!(err.to_string(), "Dungeon 'crypt' does not exist");
    }
}
