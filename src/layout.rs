//! On-disk layout of the plugin root and the JSON document helpers.
//!
//! ```text
//! <root>/
//! ├── dungeons.toml
//! ├── reset.json
//! ├── scripts/[<category>/]<id>.lua
//! ├── dungeon/<name>/config.json
//! ├── dungeon/<name>/scripts/[<category>/]<id>.lua
//! ├── worlds/<world>/variables.json
//! └── worlds/<world>/scripts/[<category>/]<id>.lua
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::errors::PersistError;
use crate::scripts::ScriptCategory;

pub const SCRIPT_EXTENSION: &str = "lua";

#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("dungeons.toml")
    }

    pub fn ledger_file(&self) -> PathBuf {
        self.root.join("reset.json")
    }

    pub fn global_scripts(&self) -> PathBuf {
        self.root.join("scripts")
    }

    pub fn dungeons_dir(&self) -> PathBuf {
        self.root.join("dungeon")
    }

    pub fn instance_dir(&self, name: &str) -> PathBuf {
        self.dungeons_dir().join(name)
    }

    pub fn instance_config(&self, name: &str) -> PathBuf {
        self.instance_dir(name).join("config.json")
    }

    pub fn instance_scripts(&self, name: &str) -> PathBuf {
        self.instance_dir(name).join("scripts")
    }

    pub fn world_dir(&self, world: &str) -> PathBuf {
        self.root.join("worlds").join(world)
    }

    pub fn world_scripts(&self, world: &str) -> PathBuf {
        self.world_dir(world).join("scripts")
    }

    pub fn world_variables(&self, world: &str) -> PathBuf {
        self.world_dir(world).join("variables.json")
    }

    /// Every directory under `dungeon/` that holds a `config.json`.
    pub fn discover_instances(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(self.dungeons_dir()) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().join("config.json").is_file())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .collect();
        names.sort();
        names
    }
}

/// Directory for `category` under a script root. Uncategorized scripts live
/// directly in the root.
pub fn category_dir(scripts_root: &Path, category: ScriptCategory) -> PathBuf {
    match category.dir_name() {
        Some(dir) => scripts_root.join(dir),
        None => scripts_root.to_path_buf(),
    }
}

pub fn script_file(scripts_root: &Path, category: ScriptCategory, id: &str) -> PathBuf {
    category_dir(scripts_root, category).join(format!("{id}.{SCRIPT_EXTENSION}"))
}

/// Instance and world names become directory names.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Script ids become file names inside a category directory.
pub fn is_valid_script_id(id: &str) -> bool {
    !id.is_empty()
        && !id.contains("..")
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '~' | '.'))
}

/// Reads a JSON document. A missing file is `Ok(None)`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(PersistError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| PersistError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Rewrites the whole document, creating parent directories as needed.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistError> {
    let content = serde_json::to_string_pretty(value).map_err(|source| PersistError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| PersistError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, content).map_err(|source| PersistError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    #[test]
    fn test_script_file_skips_uncategorized_dir() {
        let layout = Layout::new("/plugin");
        let root = layout.instance_scripts("A");
        assert_eq!(
            script_file(&root, ScriptCategory::Walk, "X"),
            PathBuf::from("/plugin/dungeon/A/scripts/walk/X.lua")
        );
        assert_eq!(
            script_file(&root, ScriptCategory::Uncategorized, "X"),
            PathBuf::from("/plugin/dungeon/A/scripts/X.lua")
        );
        assert_eq!(
            script_file(&layout.world_scripts("W"), ScriptCategory::AreaWalk, "1_2_3~4_5_6"),
            PathBuf::from("/plugin/worlds/W/scripts/area_walk/1_2_3~4_5_6.lua")
        );
    }

    #[test]
    fn test_valid_names() {
        assert!(is_valid_name("crypt_01"));
        assert!(is_valid_name("tower-b"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("../etc"));
        assert!(!is_valid_name("a b"));
    }

    #[test]
    fn test_valid_script_ids() {
        assert!(is_valid_script_id("onPlayerReset"));
        assert!(is_valid_script_id("1_64_-2"));
        assert!(is_valid_script_id("0_0_0~5_5_5"));
        assert!(!is_valid_script_id(""));
        assert!(!is_valid_script_id("../../evil"));
        assert!(!is_valid_script_id("a/b"));
        assert!(!is_valid_script_id("a\\b"));
        assert!(!is_valid_script_id(".."));
    }

    #[test]
    fn test_read_missing_json_is_none() {
        let dir = tempdir().unwrap();
        let value: Option<BTreeMap<String, i32>> = read_json(&dir.path().join("nope.json")).unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn test_write_then_read_json_creates_parents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/deeper/doc.json");
        let mut doc = BTreeMap::new();
        doc.insert("k".to_string(), 3);
        write_json(&path, &doc).unwrap();
        let back: BTreeMap<String, i32> = read_json(&path).unwrap().unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_read_corrupt_json_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        let err = read_json::<BTreeMap<String, i32>>(&path).unwrap_err();
        assert!(matches!(err, PersistError::Parse { .. }));
    }

    #[test]
    fn test_discover_instances_requires_config() {
        let dir = tempdir().unwrap();
        let layout = Layout::new(dir.path());
        fs::create_dir_all(layout.instance_dir("empty")).unwrap();
        fs::create_dir_all(layout.instance_dir("crypt")).unwrap();
        fs::write(layout.instance_config("crypt"), "{}").unwrap();
        assert_eq!(layout.discover_instances(), vec!["crypt".to_string()]);
    }
}
