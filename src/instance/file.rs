//! Persisted per-instance configuration (`dungeon/<name>/config.json`).
//!
//! The `party` field doubles as the crash-recovery signal: it is only
//! non-empty on disk while a session is running, so a non-empty party at load
//! time means the process went down mid-session.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate, TimeZone, Timelike};
use dungeon_common::{Area, BlockPos, ParticipantState, Position};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::PersistError;
use crate::layout::{read_json, write_json};

/// Sentinel for "no limit" on `maxParty` and `dailyClear`.
pub const UNLIMITED: i32 = -1;

fn unlimited() -> i32 {
    UNLIMITED
}

/// Clamps any non-positive limit to [`UNLIMITED`].
pub fn clamp_limit(value: i32) -> i32 {
    if value <= 0 { UNLIMITED } else { value }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceConfig {
    #[serde(default = "unlimited")]
    pub max_party: i32,
    #[serde(default = "unlimited")]
    pub daily_clear: i32,
    pub world_name: String,
    pub spawn_position: Position,
    pub start_position: Position,
    pub block_a: BlockPos,
    pub block_b: BlockPos,
    #[serde(default)]
    pub variables: BTreeMap<String, serde_json::Value>,
    /// Clear timestamps in epoch milliseconds, oldest first.
    #[serde(default)]
    pub cleared_players: BTreeMap<Uuid, Vec<i64>>,
    #[serde(default)]
    pub party: BTreeMap<Uuid, ParticipantState>,
}

fn local_day(millis: i64) -> Option<NaiveDate> {
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|t| t.date_naive())
}

impl InstanceConfig {
    /// Fresh config with spawn and start at the first corner.
    pub fn new(world: impl Into<String>, area: Area) -> Self {
        let origin = Position::new(area.a.x, area.a.y, area.a.z, 0);
        Self {
            max_party: UNLIMITED,
            daily_clear: UNLIMITED,
            world_name: world.into(),
            spawn_position: origin,
            start_position: origin,
            block_a: area.a,
            block_b: area.b,
            variables: BTreeMap::new(),
            cleared_players: BTreeMap::new(),
            party: BTreeMap::new(),
        }
    }

    pub fn area(&self) -> Area {
        Area::new(self.block_a, self.block_b)
    }

    pub fn set_area(&mut self, area: Area) {
        self.block_a = area.a;
        self.block_b = area.b;
    }

    pub fn set_max_party(&mut self, value: i32) {
        self.max_party = clamp_limit(value);
    }

    pub fn set_daily_clear(&mut self, value: i32) {
        self.daily_clear = clamp_limit(value);
    }

    /// Whether a roster of `size` members has room for one more.
    pub fn has_room(&self, size: usize) -> bool {
        self.max_party == UNLIMITED || (size as i64) < i64::from(self.max_party)
    }

    /// Daily-clear gate. A history from an earlier day is dropped, which is
    /// why this takes `&mut self`; the caller persists afterwards.
    pub fn can_participant_join(&mut self, participant: Uuid, now: DateTime<Local>) -> bool {
        if self.daily_clear == UNLIMITED {
            return true;
        }
        let Some(clears) = self.cleared_players.get(&participant) else {
            return true;
        };
        let last_day = clears.last().and_then(|ms| local_day(*ms));
        if last_day != Some(now.date_naive()) {
            self.cleared_players.remove(&participant);
            return true;
        }
        (clears.len() as i64) < i64::from(self.daily_clear)
    }

    /// Records a clear at `now`, starting a fresh history on a new day.
    pub fn add_cleared_player(&mut self, participant: Uuid, now: DateTime<Local>) {
        let today = now.date_naive();
        let clears = self.cleared_players.entry(participant).or_default();
        if clears.last().and_then(|ms| local_day(*ms)) != Some(today) {
            clears.clear();
        }
        clears.push(now.timestamp_millis());
    }

    pub fn clears_today(&self, participant: Uuid, now: DateTime<Local>) -> usize {
        self.cleared_players
            .get(&participant)
            .map(|clears| {
                clears
                    .iter()
                    .filter(|ms| local_day(**ms) == Some(now.date_naive()))
                    .count()
            })
            .unwrap_or(0)
    }
}

/// Time left until local midnight, as `HH:MM:SS`.
pub fn until_midnight(now: DateTime<Local>) -> String {
    let left = 86_400 - i64::from(now.num_seconds_from_midnight());
    format!("{:02}:{:02}:{:02}", left / 3600, (left % 3600) / 60, left % 60)
}

/// An instance config bound to its file.
#[derive(Debug, Clone)]
pub struct InstanceFile {
    path: PathBuf,
    pub data: InstanceConfig,
}

impl InstanceFile {
    pub fn new(path: impl Into<PathBuf>, data: InstanceConfig) -> Self {
        Self {
            path: path.into(),
            data,
        }
    }

    /// `Ok(None)` when the file doesn't exist. Hand-edited limits are clamped.
    pub fn load(path: &Path) -> Result<Option<Self>, PersistError> {
        Ok(read_json::<InstanceConfig>(path)?.map(|mut data| {
            data.max_party = clamp_limit(data.max_party);
            data.daily_clear = clamp_limit(data.daily_clear);
            Self::new(path, data)
        }))
    }

    pub fn save(&self) -> Result<(), PersistError> {
        write_json(&self.path, &self.data)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> InstanceConfig {
        InstanceConfig::new(
            "world",
            Area::new(BlockPos::new(0, 60, 0), BlockPos::new(10, 70, 10)),
        )
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_limits_clamp_non_positive() {
        let mut config = sample();
        config.set_max_party(0);
        assert_eq!(config.max_party, UNLIMITED);
        config.set_max_party(-7);
        assert_eq!(config.max_party, UNLIMITED);
        config.set_daily_clear(3);
        assert_eq!(config.daily_clear, 3);
        config.set_daily_clear(0);
        assert_eq!(config.daily_clear, UNLIMITED);
    }

    #[test]
    fn test_has_room() {
        let mut config = sample();
        assert!(config.has_room(1000));
        config.set_max_party(2);
        assert!(config.has_room(1));
        assert!(!config.has_room(2));
    }

    #[test]
    fn test_daily_clear_gate_same_day() {
        let mut config = sample();
        config.set_daily_clear(2);
        let p = Uuid::new_v4();
        let morning = at(2024, 3, 5, 9);
        assert!(config.can_participant_join(p, morning));
        config.add_cleared_player(p, morning);
        assert!(config.can_participant_join(p, at(2024, 3, 5, 10)));
        config.add_cleared_player(p, at(2024, 3, 5, 11));
        assert!(!config.can_participant_join(p, at(2024, 3, 5, 12)));
        assert_eq!(config.clears_today(p, at(2024, 3, 5, 13)), 2);
    }

    #[test]
    fn test_daily_clear_resets_on_new_day() {
        let mut config = sample();
        config.set_daily_clear(2);
        let p = Uuid::new_v4();
        config.add_cleared_player(p, at(2024, 3, 5, 9));
        config.add_cleared_player(p, at(2024, 3, 5, 10));
        assert!(!config.can_participant_join(p, at(2024, 3, 5, 22)));
        assert!(config.can_participant_join(p, at(2024, 3, 6, 9)));
        assert!(!config.cleared_players.contains_key(&p));

        config.add_cleared_player(p, at(2024, 3, 6, 9));
        assert_eq!(config.cleared_players[&p].len(), 1);
    }

    #[test]
    fn test_unlimited_daily_clear_always_joins() {
        let mut config = sample();
        let p = Uuid::new_v4();
        for h in 0..5 {
            config.add_cleared_player(p, at(2024, 3, 5, h));
        }
        assert!(config.can_participant_join(p, at(2024, 3, 5, 6)));
    }

    #[test]
    fn test_until_midnight_format() {
        assert_eq!(until_midnight(at(2024, 3, 5, 22)), "02:00:00");
    }

    #[test]
    fn test_json_uses_camel_case_keys() {
        let mut config = sample();
        let p = Uuid::new_v4();
        config.party.insert(p, ParticipantState::Alive);
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["maxParty"], -1);
        assert_eq!(json["worldName"], "world");
        assert_eq!(json["blockB"], serde_json::json!([10, 70, 10]));
        assert_eq!(json["spawnPosition"], serde_json::json!([0, 60, 0, 0]));
        assert_eq!(json["party"][p.to_string()], "Alive");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("crypt/config.json");
        let mut file = InstanceFile::new(&path, sample());
        file.data.variables.insert("boss".into(), serde_json::json!("alive"));
        file.save().unwrap();

        let loaded = InstanceFile::load(&path).unwrap().unwrap();
        assert_eq!(loaded.data, file.data);
        assert!(InstanceFile::load(&dir.path().join("missing.json")).unwrap().is_none());
    }

    #[test]
    fn test_load_tolerates_missing_optional_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"worldName":"w","spawnPosition":[1,2,3,90],"startPosition":[1,2,3,0],"blockA":[0,0,0],"blockB":[5,5,5]}"#,
        )
        .unwrap();
        let loaded = InstanceFile::load(&path).unwrap().unwrap();
        assert_eq!(loaded.data.max_party, UNLIMITED);
        assert!(loaded.data.party.is_empty());
    }

    #[test]
    fn test_load_clamps_hand_edited_limits() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"maxParty":0,"dailyClear":-7,"worldName":"w","spawnPosition":[1,2,3,90],"startPosition":[1,2,3,0],"blockA":[0,0,0],"blockB":[5,5,5]}"#,
        )
        .unwrap();
        let loaded = InstanceFile::load(&path).unwrap().unwrap();
        assert_eq!(loaded.data.max_party, UNLIMITED);
        assert_eq!(loaded.data.daily_clear, UNLIMITED);
        assert!(loaded.data.has_room(10));
    }
}
