//! Interfaces to the host game server and the deferred follow-up queue.
//!
//! The runtime never touches the world directly. Everything host-visible goes
//! through these traits, and anything that needs a scheduler tick (relocation,
//! potion effects, item spawns) is queued on [`HostTasks`] instead of running
//! inline. The host drains the queue once per tick with [`HostTasks::tick`].

use std::collections::VecDeque;
use std::sync::Mutex;

use dungeon_common::Location;
use uuid::Uuid;

/// Participant-facing operations of the host server.
pub trait Host: Send + Sync {
    fn is_online(&self, participant: Uuid) -> bool;

    /// Display name. Unknown participants get their id.
    fn display_name(&self, participant: Uuid) -> String;

    fn location_of(&self, participant: Uuid) -> Option<Location>;

    fn send_message(&self, participant: Uuid, message: &str);

    fn teleport(&self, participant: Uuid, to: &Location);

    fn online_participants(&self) -> Vec<Uuid>;
}

/// Optional economy provider.
pub trait Economy: Send + Sync {
    fn has(&self, participant: Uuid, amount: f64) -> bool;

    fn deposit(&self, participant: Uuid, amount: f64) -> bool;

    fn withdraw(&self, participant: Uuid, amount: f64) -> bool;
}

/// Buff and debuff application.
pub trait Effects: Send + Sync {
    fn apply(&self, participant: Uuid, effect: &str, duration_ticks: u32, amplifier: u32);

    fn clear(&self, participant: Uuid, effect: &str);

    fn clear_all(&self, participant: Uuid);
}

/// Drops an item at a location.
pub trait ItemSpawner: Send + Sync {
    fn spawn(&self, item: &str, at: &Location);
}

/// Host stand-in with nobody online. Used by offline tooling.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineHost;

impl Host for OfflineHost {
    fn is_online(&self, _participant: Uuid) -> bool {
        false
    }

    fn display_name(&self, participant: Uuid) -> String {
        participant.to_string()
    }

    fn location_of(&self, _participant: Uuid) -> Option<Location> {
        None
    }

    fn send_message(&self, _participant: Uuid, _message: &str) {}

    fn teleport(&self, _participant: Uuid, _to: &Location) {}

    fn online_participants(&self) -> Vec<Uuid> {
        Vec::new()
    }
}

impl Effects for OfflineHost {
    fn apply(&self, _participant: Uuid, _effect: &str, _duration_ticks: u32, _amplifier: u32) {}

    fn clear(&self, _participant: Uuid, _effect: &str) {}

    fn clear_all(&self, _participant: Uuid) {}
}

impl ItemSpawner for OfflineHost {
    fn spawn(&self, _item: &str, _at: &Location) {}
}

type Task = Box<dyn FnOnce() + Send>;

struct Scheduled {
    due: u64,
    task: Task,
}

#[derive(Default)]
struct TaskQueue {
    now: u64,
    pending: VecDeque<Scheduled>,
}

/// Ordered queue of deferred follow-up tasks, drained by the host tick.
#[derive(Default)]
pub struct HostTasks {
    queue: Mutex<TaskQueue>,
}

impl HostTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs on the next tick.
    pub fn schedule(&self, task: impl FnOnce() + Send + 'static) {
        self.schedule_after(0, task);
    }

    /// Runs once `delay_ticks` ticks have passed after the next one.
    pub fn schedule_after(&self, delay_ticks: u64, task: impl FnOnce() + Send + 'static) {
        let Ok(mut queue) = self.queue.lock() else {
            tracing::error!("Host task queue lock poisoned, dropping task");
            return;
        };
        let due = queue.now + delay_ticks;
        queue.pending.push_back(Scheduled {
            due,
            task: Box::new(task),
        });
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().map(|q| q.pending.len()).unwrap_or(0)
    }

    /// Runs every due task in submission order and advances the clock.
    /// Returns the number of tasks run.
    pub fn tick(&self) -> usize {
        let due: Vec<Task> = {
            let Ok(mut queue) = self.queue.lock() else {
                return 0;
            };
            let now = queue.now;
            let mut ready = Vec::new();
            let mut waiting = VecDeque::with_capacity(queue.pending.len());
            while let Some(item) = queue.pending.pop_front() {
                if item.due <= now {
                    ready.push(item.task);
                } else {
                    waiting.push_back(item);
                }
            }
            queue.pending = waiting;
            queue.now += 1;
            ready
        };
        // Tasks may schedule more work, so they run with the lock released.
        let count = due.len();
        for task in due {
            task();
        }
        count
    }

    /// Ticks until the queue is empty or `max_ticks` have elapsed.
    pub fn drain(&self, max_ticks: u64) -> usize {
        let mut total = 0;
        for _ in 0..max_ticks {
            if self.pending() == 0 {
                break;
            }
            total += self.tick();
        }
        total
    }
}
