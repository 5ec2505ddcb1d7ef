//! Process-wide registry: loaded instances, the active-participant index,
//! the recovery ledger and the script engine.
//!
//! The registry is an explicitly owned context object. Nothing here is a
//! global; tests build as many registries as they like.
//!
//! # Lock order
//!
//! instance session → active index → ledger. The instance map lock is never
//! held while calling into an instance.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};

use dungeon_common::{Area, ParticipantState};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RuntimeConfig;
use crate::errors::DungeonError;
use crate::host::{Economy, Effects, Host, HostTasks, ItemSpawner, OfflineHost};
use crate::instance::{Instance, InstanceConfig, InstanceFile, InstanceHook};
use crate::layout::{Layout, category_dir, is_valid_name};
use crate::recovery::RecoveryLedger;
use crate::scripts::api::Capabilities;
use crate::scripts::engine::{Bindings, ScriptEngine, ScriptJob};
use crate::scripts::resolve::{Placement, ScriptTarget, resolve};
use crate::scripts::{ScriptCategory, lua, writer};
use crate::world_vars::WorldVariables;

/// Host collaborators injected into the registry.
#[derive(Clone)]
pub struct Services {
    pub host: Arc<dyn Host>,
    pub economy: Option<Arc<dyn Economy>>,
    pub effects: Arc<dyn Effects>,
    pub items: Arc<dyn ItemSpawner>,
}

impl Services {
    /// No economy, and effects and items are discarded.
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self {
            host,
            economy: None,
            effects: Arc::new(OfflineHost),
            items: Arc::new(OfflineHost),
        }
    }

    pub fn with_economy(mut self, economy: Arc<dyn Economy>) -> Self {
        self.economy = Some(economy);
        self
    }

    pub fn with_effects(mut self, effects: Arc<dyn Effects>) -> Self {
        self.effects = effects;
        self
    }

    pub fn with_items(mut self, items: Arc<dyn ItemSpawner>) -> Self {
        self.items = items;
        self
    }
}

/// A script invocation before resolution.
#[derive(Clone)]
pub struct ScriptRequest {
    pub id: String,
    pub category: ScriptCategory,
    pub participant: Option<Uuid>,
    pub instance: Option<Arc<Instance>>,
    /// Resolve under `instance` even when the participant is elsewhere.
    pub pinned: bool,
    /// World the participant is known to stand in, if the caller has it.
    pub world: Option<String>,
    pub function: Option<String>,
    pub extra: Vec<(String, serde_json::Value)>,
}

impl ScriptRequest {
    pub fn new(id: impl Into<String>, category: ScriptCategory) -> Self {
        Self {
            id: id.into(),
            category,
            participant: None,
            instance: None,
            pinned: false,
            world: None,
            function: None,
            extra: Vec::new(),
        }
    }

    /// Hook fired by an instance. Always resolves under that instance.
    pub fn hook(instance: &Arc<Instance>, hook: InstanceHook) -> Self {
        let mut request = Self::new(hook.script_id(), ScriptCategory::Instance);
        request.instance = Some(instance.clone());
        request.pinned = true;
        request
    }

    pub fn participant(mut self, participant: Uuid) -> Self {
        self.participant = Some(participant);
        self
    }

    pub fn instance(mut self, instance: Arc<Instance>) -> Self {
        self.instance = Some(instance);
        self
    }

    pub fn in_world(mut self, world: impl Into<String>) -> Self {
        self.world = Some(world.into());
        self
    }

    pub fn function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }

    pub fn with(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.push((name.into(), value));
        self
    }
}

pub struct Registry {
    config: RuntimeConfig,
    services: Services,
    tasks: Arc<HostTasks>,
    ledger: RecoveryLedger,
    instances: RwLock<BTreeMap<String, Arc<Instance>>>,
    active: Mutex<HashMap<Uuid, String>>,
    worlds: Mutex<HashMap<String, Arc<WorldVariables>>>,
    engine: ScriptEngine,
    initialized: AtomicBool,
    me: Weak<Registry>,
}

impl Registry {
    pub fn new(config: RuntimeConfig, services: Services) -> Result<Arc<Self>, DungeonError> {
        let runtime = ScriptEngine::build_runtime(config.workers)?;
        let tasks = Arc::new(HostTasks::new());
        let ledger = RecoveryLedger::open(config.layout.ledger_file());
        Ok(Arc::new_cyclic(|me: &Weak<Registry>| {
            let api = Arc::new(Capabilities::new(
                me.clone(),
                config.layout.clone(),
                services.host.clone(),
                services.economy.clone(),
                services.effects.clone(),
                services.items.clone(),
                tasks.clone(),
            ));
            let engine = ScriptEngine::new(
                runtime,
                config.queue_capacity,
                config.workers,
                lua::runner(api),
            );
            Registry {
                config,
                services,
                tasks,
                ledger,
                instances: RwLock::new(BTreeMap::new()),
                active: Mutex::new(HashMap::new()),
                worlds: Mutex::new(HashMap::new()),
                engine,
                initialized: AtomicBool::new(false),
                me: me.clone(),
            }
        }))
    }

    pub fn layout(&self) -> &Layout {
        &self.config.layout
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.services.host
    }

    pub fn tasks(&self) -> &Arc<HostTasks> {
        &self.tasks
    }

    pub fn ledger(&self) -> &RecoveryLedger {
        &self.ledger
    }

    pub fn engine(&self) -> &ScriptEngine {
        &self.engine
    }

    /// Runs due host follow-ups. Called by the host once per tick.
    pub fn tick(&self) -> usize {
        self.tasks.tick()
    }

    // -- lifecycle ----------------------------------------------------------

    /// Loads every instance on disk. A second call is a no-op.
    /// Returns the number of instances loaded.
    pub fn init(&self) -> usize {
        if self.initialized.swap(true, Ordering::SeqCst) {
            debug!("Registry already initialized");
            return 0;
        }
        let mut loaded = 0;
        for name in self.layout().discover_instances() {
            match self.load_instance(&name) {
                Ok(true) => loaded += 1,
                Ok(false) => {}
                Err(e) => warn!(instance = %name, error = %e, "Failed to load dungeon"),
            }
        }
        info!(loaded, "Dungeons loaded");
        loaded
    }

    /// Loads one instance. Returns false if it was already loaded.
    ///
    /// A non-empty persisted party means the process stopped mid-session:
    /// living members who are not online go to the recovery ledger and the
    /// instance is reset before it becomes visible.
    pub fn load_instance(&self, name: &str) -> Result<bool, DungeonError> {
        if self.instance(name).is_some() {
            return Ok(false);
        }
        let file = InstanceFile::load(&self.layout().instance_config(name))?
            .ok_or_else(|| DungeonError::UnknownInstance(name.to_string()))?;
        let crashed_party = file.data.party.clone();
        let instance = Instance::new(name, file, self.me.clone());

        if !crashed_party.is_empty() {
            warn!(instance = %name, members = crashed_party.len(), "Recovering interrupted session");
            for (participant, state) in &crashed_party {
                if state.is_alive() && !self.host().is_online(*participant) {
                    self.ledger.add_player(*participant, name);
                }
            }
            instance.reset();
        }

        let mut instances = self.instances.write().map_err(|_| DungeonError::LockPoisoned)?;
        if instances.contains_key(name) {
            return Ok(false);
        }
        instances.insert(name.to_string(), instance);
        info!(instance = %name, "Dungeon loaded");
        Ok(true)
    }

    /// Unloads an instance, resetting it first. Returns false if not loaded.
    pub fn unload_instance(&self, name: &str) -> bool {
        let removed = match self.instances.write() {
            Ok(mut instances) => instances.remove(name),
            Err(_) => None,
        };
        match removed {
            Some(instance) => {
                instance.reset();
                info!(instance = %name, "Dungeon unloaded");
                true
            }
            None => false,
        }
    }

    /// Creates the directory tree, default hook scripts and config of a new
    /// instance, then loads it.
    pub fn create_instance(
        &self,
        name: &str,
        world: &str,
        area: Area,
    ) -> Result<Arc<Instance>, DungeonError> {
        if !is_valid_name(name) {
            return Err(DungeonError::InvalidName(name.to_string()));
        }
        let config_path = self.layout().instance_config(name);
        if config_path.exists() || self.instance(name).is_some() {
            return Err(DungeonError::AlreadyExists(name.to_string()));
        }
        let scripts = self.layout().instance_scripts(name);
        for category in ScriptCategory::all() {
            let dir = category_dir(&scripts, *category);
            fs::create_dir_all(&dir)
                .map_err(|e| anyhow::anyhow!("Failed to create {}: {}", dir.display(), e))?;
        }
        writer::write_default_hooks(&scripts)?;
        InstanceFile::new(&config_path, InstanceConfig::new(world, area)).save()?;
        self.load_instance(name)?;
        self.instance(name)
            .ok_or_else(|| DungeonError::UnknownInstance(name.to_string()))
    }

    /// Force-cancels all script work. Instances are left as they are so the
    /// next start can recover them.
    pub fn shutdown(&self) {
        info!("Shutting down dungeon registry");
        self.engine.shutdown();
    }

    // -- lookups ------------------------------------------------------------

    pub fn instance(&self, name: &str) -> Option<Arc<Instance>> {
        self.instances.read().ok()?.get(name).cloned()
    }

    pub fn instance_names(&self) -> Vec<String> {
        self.instances
            .read()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn instances(&self) -> Vec<Arc<Instance>> {
        self.instances
            .read()
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn world_variables(&self, world: &str) -> Arc<WorldVariables> {
        let mut worlds = self.worlds.lock().unwrap_or_else(|p| p.into_inner());
        worlds
            .entry(world.to_string())
            .or_insert_with(|| {
                Arc::new(WorldVariables::open(world, self.layout().world_variables(world)))
            })
            .clone()
    }

    // -- active index -------------------------------------------------------

    fn index(&self) -> MutexGuard<'_, HashMap<Uuid, String>> {
        self.active.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn active_instance_of(&self, participant: Uuid) -> Option<String> {
        self.index().get(&participant).cloned()
    }

    /// Instance from the active index, else from the recovery ledger.
    pub fn participant_instance(&self, participant: Uuid) -> Option<String> {
        self.active_instance_of(participant)
            .or_else(|| self.ledger.get(participant))
    }

    pub fn participant_state(&self, participant: Uuid) -> ParticipantState {
        self.participant_instance(participant)
            .and_then(|name| self.instance(&name))
            .map(|instance| instance.state_of(participant))
            .unwrap_or(ParticipantState::None)
    }

    /// Points the participant at `instance`. False if they are already
    /// active in a different one.
    pub fn register_active(&self, participant: Uuid, instance: &str) -> bool {
        let mut index = self.index();
        match index.get(&participant) {
            Some(current) => current == instance,
            None => {
                index.insert(participant, instance.to_string());
                true
            }
        }
    }

    /// Removes the entry only if it points at `instance`.
    pub fn deregister_active_if(&self, participant: Uuid, instance: &str) {
        let mut index = self.index();
        if index.get(&participant).is_some_and(|current| current == instance) {
            index.remove(&participant);
        }
    }

    pub fn deregister_active(&self, participant: Uuid) -> Option<String> {
        self.index().remove(&participant)
    }

    pub fn active_participants(&self) -> Vec<(Uuid, String)> {
        self.index().iter().map(|(p, i)| (*p, i.clone())).collect()
    }

    // -- scripts ------------------------------------------------------------

    fn placement(&self, participant: Uuid, world: Option<&str>) -> Placement {
        if let Some(name) = self.participant_instance(participant) {
            return Placement::Instance(name);
        }
        if let Some(world) = world {
            return Placement::World(world.to_string());
        }
        match self.host().location_of(participant) {
            Some(location) => Placement::World(location.world),
            None => Placement::Unplaced,
        }
    }

    /// Resolves and queues a script. Returns whether it exists and was
    /// accepted; a missing script is a quiet `false`.
    pub fn dispatch(&self, request: ScriptRequest) -> bool {
        let placement = match (request.participant, &request.instance) {
            (Some(_), Some(instance)) if request.pinned => {
                Some(Placement::Instance(instance.name().to_string()))
            }
            (Some(participant), _) => {
                Some(self.placement(participant, request.world.as_deref()))
            }
            (None, _) => None,
        };
        let resolution = resolve(
            self.layout(),
            &request.id,
            request.category,
            placement.as_ref(),
            request.instance.as_ref().map(|i| i.name()),
        );
        if !resolution.exists() {
            debug!(script = %resolution.path.display(), "No script, skipping");
            return false;
        }

        let mut bindings = Bindings {
            participant: request.participant,
            extra: request.extra,
            ..Bindings::default()
        };
        match &resolution.target {
            ScriptTarget::Instance(name) => {
                bindings.instance = match request.instance {
                    Some(instance) if instance.name() == name => Some(instance),
                    _ => self.instance(name),
                };
            }
            ScriptTarget::World(world) => {
                bindings.world = Some(self.world_variables(world));
            }
            ScriptTarget::Global => {}
        }

        let job = ScriptJob {
            path: resolution.path,
            function: request.function,
            bindings,
        };
        match self.engine.submit(job) {
            Ok(()) => true,
            Err(e) => {
                warn!(script = %request.id, error = %e, "Script not dispatched");
                false
            }
        }
    }

    pub fn dispatch_hook(
        &self,
        instance: &Arc<Instance>,
        hook: InstanceHook,
        participant: Option<Uuid>,
        extra: Vec<(String, serde_json::Value)>,
    ) -> bool {
        let mut request = ScriptRequest::hook(instance, hook);
        request.participant = participant;
        request.extra = extra;
        self.dispatch(request)
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.engine.shutdown();
    }
}
