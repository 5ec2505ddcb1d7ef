//! Weighted random item drops, spawned one at a time.

use std::sync::Arc;

use dungeon_common::Location;
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::warn;

use crate::host::{HostTasks, ItemSpawner};

/// Host ticks between two spawned items (half a second).
pub const SPAWN_INTERVAL_TICKS: u64 = 10;

/// Most items a single `run` schedules.
pub const MAX_DROPS_PER_RUN: u64 = 256;

pub struct ItemDrop {
    location: Location,
    table: Vec<(String, f64)>,
    total: f64,
    tasks: Arc<HostTasks>,
    spawner: Arc<dyn ItemSpawner>,
}

impl ItemDrop {
    /// Entries with a non-positive weight never drop and are discarded.
    /// A table whose weights overflow drops nothing.
    pub fn new(
        location: Location,
        table: impl IntoIterator<Item = (String, f64)>,
        tasks: Arc<HostTasks>,
        spawner: Arc<dyn ItemSpawner>,
    ) -> Self {
        let mut table: Vec<(String, f64)> = table
            .into_iter()
            .filter(|(_, weight)| weight.is_finite() && *weight > 0.0)
            .collect();
        table.sort_by(|a, b| a.0.cmp(&b.0));
        let mut total: f64 = table.iter().map(|(_, w)| w).sum();
        if !total.is_finite() {
            warn!(entries = table.len(), "Item drop weights overflow, table ignored");
            table.clear();
            total = 0.0;
        }
        Self {
            location,
            table,
            total,
            tasks,
            spawner,
        }
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    /// One weighted draw over a shuffled copy of the table.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<String> {
        if self.table.is_empty() {
            return None;
        }
        let mut entries: Vec<&(String, f64)> = self.table.iter().collect();
        entries.shuffle(rng);
        let roll = rng.gen_range(0.0..self.total);
        let mut acc = 0.0;
        for (item, weight) in &entries {
            acc += weight;
            if roll < acc {
                return Some(item.clone());
            }
        }
        entries.last().map(|(item, _)| item.clone())
    }

    /// Schedules `amount` drops, one every [`SPAWN_INTERVAL_TICKS`], capped at
    /// [`MAX_DROPS_PER_RUN`]. Returns the number scheduled.
    pub fn run(&self, amount: i64) -> usize {
        if amount <= 0 {
            return 0;
        }
        let amount = amount as u64;
        if amount > MAX_DROPS_PER_RUN {
            warn!(requested = amount, cap = MAX_DROPS_PER_RUN, "Item drop amount capped");
        }
        let mut rng = rand::thread_rng();
        let mut scheduled = 0;
        for i in 0..amount.min(MAX_DROPS_PER_RUN) {
            let Some(item) = self.pick(&mut rng) else {
                break;
            };
            let spawner = self.spawner.clone();
            let at = self.location.clone();
            self.tasks
                .schedule_after(i * SPAWN_INTERVAL_TICKS, move || spawner.spawn(&item, &at));
            scheduled += 1;
        }
        scheduled
    }

    /// `item - chance%` per entry.
    pub fn debug(&self) -> Vec<String> {
        self.table
            .iter()
            .map(|(item, weight)| format!("{item} - {:.2}%", weight / self.total * 100.0))
            .collect()
    }
}
