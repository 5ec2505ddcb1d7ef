//! Recovery ledger (`reset.json`).
//!
//! Maps participants who went offline mid-session to the instance they were
//! in, so they can be reconciled when they come back. Every mutation rewrites
//! the whole document.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::layout::{read_json, write_json};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerDoc {
    #[serde(default)]
    pub offline_players: BTreeMap<Uuid, String>,
    #[serde(default)]
    pub active_instances: BTreeSet<String>,
}

#[derive(Debug)]
pub struct RecoveryLedger {
    path: PathBuf,
    doc: Mutex<LedgerDoc>,
}

impl RecoveryLedger {
    /// Loads the ledger, starting empty if the file is missing or unreadable.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let doc = match read_json::<LedgerDoc>(&path) {
            Ok(doc) => doc.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Recovery ledger unreadable, starting empty");
                LedgerDoc::default()
            }
        };
        Self {
            path,
            doc: Mutex::new(doc),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, LedgerDoc> {
        self.doc.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, doc: &LedgerDoc) {
        if let Err(e) = write_json(&self.path, doc) {
            warn!(error = %e, "Failed to persist recovery ledger");
        }
    }

    pub fn add_player(&self, participant: Uuid, instance: &str) {
        let mut doc = self.lock();
        doc.offline_players.insert(participant, instance.to_string());
        debug!(%participant, instance, "Added participant to recovery ledger");
        self.persist(&doc);
    }

    /// Removes the entry, returning the instance it pointed at.
    pub fn remove_player(&self, participant: Uuid) -> Option<String> {
        let mut doc = self.lock();
        let removed = doc.offline_players.remove(&participant);
        if removed.is_some() {
            self.persist(&doc);
        }
        removed
    }

    pub fn contains(&self, participant: Uuid) -> bool {
        self.lock().offline_players.contains_key(&participant)
    }

    pub fn get(&self, participant: Uuid) -> Option<String> {
        self.lock().offline_players.get(&participant).cloned()
    }

    pub fn mark_instance_active(&self, instance: &str) {
        let mut doc = self.lock();
        if doc.active_instances.insert(instance.to_string()) {
            self.persist(&doc);
        }
    }

    pub fn clear_instance(&self, instance: &str) {
        let mut doc = self.lock();
        if doc.active_instances.remove(instance) {
            self.persist(&doc);
        }
    }

    pub fn is_instance_active(&self, instance: &str) -> bool {
        self.lock().active_instances.contains(instance)
    }

    pub fn snapshot(&self) -> LedgerDoc {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_add_and_remove_player_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reset.json");
        let ledger = RecoveryLedger::open(&path);
        let p = Uuid::new_v4();

        ledger.add_player(p, "crypt");
        assert!(ledger.contains(p));
        assert_eq!(ledger.get(p).as_deref(), Some("crypt"));

        let reopened = RecoveryLedger::open(&path);
        assert_eq!(reopened.get(p).as_deref(), Some("crypt"));

        assert_eq!(reopened.remove_player(p).as_deref(), Some("crypt"));
        assert_eq!(reopened.remove_player(p), None);
        assert!(!RecoveryLedger::open(&path).contains(p));
    }

    #[test]
    fn test_document_shape() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reset.json");
        let ledger = RecoveryLedger::open(&path);
        let p = Uuid::new_v4();
        ledger.add_player(p, "tower");
        ledger.mark_instance_active("tower");

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["offlinePlayers"][p.to_string()], "tower");
        assert_eq!(raw["activeInstances"], serde_json::json!(["tower"]));

        ledger.clear_instance("tower");
        assert!(!ledger.is_instance_active("tower"));
    }

    #[test]
    fn test_corrupt_ledger_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reset.json");
        std::fs::write(&path, "garbage").unwrap();
        let ledger = RecoveryLedger::open(&path);
        assert_eq!(ledger.snapshot(), LedgerDoc::default());
    }
}
