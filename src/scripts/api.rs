//! Capability surface exposed to scripts.
//!
//! Scripts only ever reach the runtime through [`ScriptApi`]. The default
//! implementation, [`Capabilities`], gets its economy, effect and item
//! collaborators injected so it can be exercised without a running host.

use std::path::PathBuf;
use std::sync::{Arc, Weak};

use dungeon_common::{Location, ParticipantState};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::host::{Economy, Effects, Host, HostTasks, ItemSpawner};
use crate::instance::Instance;
use crate::item_drop::ItemDrop;
use crate::layout::{Layout, category_dir};
use crate::registry::Registry;
use crate::scripts::ScriptCategory;
use crate::world_vars::WorldVariables;

pub trait ScriptApi: Send + Sync {
    fn log(&self, level: &str, message: &str);

    fn participant_state(&self, participant: Uuid) -> ParticipantState;

    /// Instance the participant is assigned to, live or through the ledger.
    fn instance_of(&self, participant: Uuid) -> Option<Arc<Instance>>;

    fn instance(&self, name: &str) -> Option<Arc<Instance>>;

    fn script_directory(&self, instance: &str, category: ScriptCategory) -> PathBuf;

    fn instance_directory(&self, instance: &str) -> PathBuf;

    fn instance_world(&self, instance: &str) -> Option<String>;

    fn world_variables(&self, world: &str) -> Arc<WorldVariables>;

    fn display_name(&self, participant: Uuid) -> String;

    fn is_online(&self, participant: Uuid) -> bool;

    fn send_message(&self, participant: Uuid, message: &str);

    fn location_of(&self, participant: Uuid) -> Option<Location>;

    /// Deferred to the next host tick.
    fn teleport(&self, participant: Uuid, to: Location);

    fn is_economy_enabled(&self) -> bool;

    fn has_money(&self, participant: Uuid, amount: f64) -> bool;

    fn deposit_money(&self, participant: Uuid, amount: f64) -> bool;

    fn withdraw_money(&self, participant: Uuid, amount: f64) -> bool;

    /// Deferred to the next host tick.
    fn add_potion_effect(&self, participant: Uuid, effect: &str, duration_ticks: u32, amplifier: u32);

    /// Clears the named effects, or every effect when `effects` is empty.
    /// Deferred to the next host tick.
    fn clear_potion_effects(&self, participant: Uuid, effects: &[String]);

    fn create_item_drop(&self, at: Location, table: Vec<(String, f64)>) -> ItemDrop;
}

/// [`ScriptApi`] backed by the registry and the injected collaborators.
pub struct Capabilities {
    registry: Weak<Registry>,
    layout: Layout,
    host: Arc<dyn Host>,
    economy: Option<Arc<dyn Economy>>,
    effects: Arc<dyn Effects>,
    items: Arc<dyn ItemSpawner>,
    tasks: Arc<HostTasks>,
}

impl Capabilities {
    pub fn new(
        registry: Weak<Registry>,
        layout: Layout,
        host: Arc<dyn Host>,
        economy: Option<Arc<dyn Economy>>,
        effects: Arc<dyn Effects>,
        items: Arc<dyn ItemSpawner>,
        tasks: Arc<HostTasks>,
    ) -> Self {
        Self {
            registry,
            layout,
            host,
            economy,
            effects,
            items,
            tasks,
        }
    }

    fn registry(&self) -> Option<Arc<Registry>> {
        self.registry.upgrade()
    }
}

impl ScriptApi for Capabilities {
    fn log(&self, level: &str, message: &str) {
        match level.to_uppercase().as_str() {
            "SEVERE" | "ERROR" => error!(target: "partydungeons::script", "{message}"),
            "WARNING" | "WARN" => warn!(target: "partydungeons::script", "{message}"),
            "CONFIG" | "FINE" | "FINER" | "FINEST" | "DEBUG" => {
                debug!(target: "partydungeons::script", "{message}")
            }
            _ => info!(target: "partydungeons::script", "{message}"),
        }
    }

    fn participant_state(&self, participant: Uuid) -> ParticipantState {
        self.registry()
            .map(|r| r.participant_state(participant))
            .unwrap_or(ParticipantState::None)
    }

    fn instance_of(&self, participant: Uuid) -> Option<Arc<Instance>> {
        let registry = self.registry()?;
        let name = registry.participant_instance(participant)?;
        registry.instance(&name)
    }

    fn instance(&self, name: &str) -> Option<Arc<Instance>> {
        self.registry()?.instance(name)
    }

    fn script_directory(&self, instance: &str, category: ScriptCategory) -> PathBuf {
        category_dir(&self.layout.instance_scripts(instance), category)
    }

    fn instance_directory(&self, instance: &str) -> PathBuf {
        self.layout.instance_dir(instance)
    }

    fn instance_world(&self, instance: &str) -> Option<String> {
        self.instance(instance).map(|i| i.world())
    }

    fn world_variables(&self, world: &str) -> Arc<WorldVariables> {
        match self.registry() {
            Some(registry) => registry.world_variables(world),
            None => Arc::new(WorldVariables::open(world, self.layout.world_variables(world))),
        }
    }

    fn display_name(&self, participant: Uuid) -> String {
        self.host.display_name(participant)
    }

    fn is_online(&self, participant: Uuid) -> bool {
        self.host.is_online(participant)
    }

    fn send_message(&self, participant: Uuid, message: &str) {
        self.host.send_message(participant, message);
    }

    fn location_of(&self, participant: Uuid) -> Option<Location> {
        self.host.location_of(participant)
    }

    fn teleport(&self, participant: Uuid, to: Location) {
        let host = self.host.clone();
        self.tasks.schedule(move || host.teleport(participant, &to));
    }

    fn is_economy_enabled(&self) -> bool {
        self.economy.is_some()
    }

    fn has_money(&self, participant: Uuid, amount: f64) -> bool {
        let Some(economy) = &self.economy else {
            return false;
        };
        if amount < 0.0 {
            return true;
        }
        economy.has(participant, amount)
    }

    fn deposit_money(&self, participant: Uuid, amount: f64) -> bool {
        let Some(economy) = &self.economy else {
            return false;
        };
        if amount < 0.0 {
            return false;
        }
        economy.deposit(participant, amount)
    }

    fn withdraw_money(&self, participant: Uuid, amount: f64) -> bool {
        let Some(economy) = &self.economy else {
            return false;
        };
        if amount < 0.0 || !economy.has(participant, amount) {
            return false;
        }
        economy.withdraw(participant, amount)
    }

    fn add_potion_effect(&self, participant: Uuid, effect: &str, duration_ticks: u32, amplifier: u32) {
        let effects = self.effects.clone();
        let effect = effect.to_string();
        self.tasks
            .schedule(move || effects.apply(participant, &effect, duration_ticks, amplifier));
    }

    fn clear_potion_effects(&self, participant: Uuid, effects: &[String]) {
        let sink = self.effects.clone();
        let effects = effects.to_vec();
        self.tasks.schedule(move || {
            if effects.is_empty() {
                sink.clear_all(participant);
            } else {
                for effect in &effects {
                    sink.clear(participant, effect);
                }
            }
        });
    }

    fn create_item_drop(&self, at: Location, table: Vec<(String, f64)>) -> ItemDrop {
        ItemDrop::new(at, table, self.tasks.clone(), self.items.clone())
    }
}
