//! Per-world persisted variable store (`worlds/<world>/variables.json`).

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::layout::{read_json, write_json};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariablesDoc {
    #[serde(default)]
    pub variables: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug)]
pub struct WorldVariables {
    world: String,
    path: PathBuf,
    doc: Mutex<VariablesDoc>,
}

impl WorldVariables {
    pub fn open(world: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let world = world.into();
        let path = path.into();
        let doc = match read_json::<VariablesDoc>(&path) {
            Ok(doc) => doc.unwrap_or_default(),
            Err(e) => {
                warn!(world, error = %e, "World variables unreadable, starting empty");
                VariablesDoc::default()
            }
        };
        Self {
            world,
            path,
            doc: Mutex::new(doc),
        }
    }

    pub fn world(&self) -> &str {
        &self.world
    }

    fn lock(&self) -> MutexGuard<'_, VariablesDoc> {
        self.doc.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, doc: &VariablesDoc) {
        if let Err(e) = write_json(&self.path, doc) {
            warn!(world = %self.world, error = %e, "Failed to persist world variables");
        }
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.lock().variables.get(key).cloned()
    }

    pub fn set(&self, key: &str, value: serde_json::Value) {
        let mut doc = self.lock();
        doc.variables.insert(key.to_string(), value);
        self.persist(&doc);
    }

    pub fn remove(&self, key: &str) -> Option<serde_json::Value> {
        let mut doc = self.lock();
        let removed = doc.variables.remove(key);
        self.persist(&doc);
        removed
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().variables.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_set_persists_immediately() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("worlds/overworld/variables.json");
        let vars = WorldVariables::open("overworld", &path);
        vars.set("gate_open", json!(true));
        vars.set("kills", json!(12));

        let reopened = WorldVariables::open("overworld", &path);
        assert_eq!(reopened.get("gate_open"), Some(json!(true)));
        assert_eq!(reopened.keys(), vec!["gate_open".to_string(), "kills".to_string()]);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["variables"]["kills"], 12);
    }

    #[test]
    fn test_remove() {
        let dir = tempdir().unwrap();
        let vars = WorldVariables::open("w", dir.path().join("variables.json"));
        vars.set("a", json!("x"));
        assert_eq!(vars.remove("a"), Some(json!("x")));
        assert_eq!(vars.get("a"), None);
        assert_eq!(vars.remove("a"), None);
    }
}
