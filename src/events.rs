//! Entry points for host events.
//!
//! The host calls these from whatever thread delivers the event. They only
//! read and mutate through the instance and registry APIs, so each step is
//! individually locked.

use std::path::Path;
use std::sync::Arc;

use dungeon_common::{Area, Location, ParticipantState};
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::errors::DungeonError;
use crate::instance::{Instance, InstanceHook};
use crate::layout::{SCRIPT_EXTENSION, category_dir};
use crate::registry::{Registry, ScriptRequest};
use crate::scripts::ScriptCategory;

/// Area ids of the AreaWalk scripts under `scripts_root`.
fn area_scripts(scripts_root: &Path) -> Vec<Area> {
    let dir = category_dir(scripts_root, ScriptCategory::AreaWalk);
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .is_some_and(|ext| ext == SCRIPT_EXTENSION)
        })
        .filter_map(|e| {
            let stem = e.path().file_stem()?.to_str()?.to_string();
            Area::parse_id(&stem).ok()
        })
        .collect()
}

impl Registry {
    /// Instance listing the participant in its roster, in any state.
    pub fn membership_of(&self, participant: Uuid) -> Option<Arc<Instance>> {
        if let Some(instance) = self
            .active_instance_of(participant)
            .and_then(|name| self.instance(&name))
        {
            return Some(instance);
        }
        self.instances()
            .into_iter()
            .find(|i| i.state_of(participant) != ParticipantState::None)
    }

    pub fn on_disconnect(&self, participant: Uuid) {
        let Some(name) = self.active_instance_of(participant) else {
            return;
        };
        let Some(instance) = self.instance(&name) else {
            warn!(%participant, instance = %name, "Active entry for unloaded dungeon, removing");
            self.deregister_active(participant);
            return;
        };

        let who = self.host().display_name(participant);
        if !instance.is_active() || instance.is_cleared() {
            let cleared = instance.is_cleared();
            instance.remove_participant(participant);
            instance.message_party(&format!("{who} has disconnected and left the party"));
            if cleared {
                self.ledger().add_player(participant, &name);
                instance.reset_eligibility_check();
            }
            return;
        }

        self.ledger().add_player(participant, &name);
        instance.modify_state(participant, ParticipantState::Offline);
        instance.message_party(&format!("{who} has disconnected"));
        info!(%participant, instance = %name, "Participant went offline mid-run");
        instance.reset_eligibility_check();
    }

    pub fn on_connect(&self, participant: Uuid) {
        let Some(name) = self.ledger().get(participant) else {
            return;
        };
        let instance = self.instance(&name);
        match &instance {
            Some(instance) => {
                self.dispatch_hook(instance, InstanceHook::PlayerReset, Some(participant), Vec::new());
            }
            None => {
                let request = ScriptRequest::new(
                    InstanceHook::PlayerReset.script_id(),
                    ScriptCategory::Instance,
                )
                .participant(participant);
                self.dispatch(request);
            }
        }
        self.ledger().remove_player(participant);

        let Some(instance) = instance else {
            debug!(%participant, instance = %name, "Recovered participant's dungeon is not loaded");
            return;
        };
        let spawn = instance.spawn_location();
        let host = self.host().clone();
        self.tasks()
            .schedule(move || host.teleport(participant, &spawn));
        self.host().send_message(
            participant,
            &format!("You were disconnected from {name} and sent back to its entrance"),
        );
        instance.modify_state(participant, ParticipantState::Dead);
        info!(%participant, instance = %name, "Recovered participant");
    }

    pub fn on_death(&self, participant: Uuid) {
        let Some(instance) = self
            .active_instance_of(participant)
            .and_then(|name| self.instance(&name))
        else {
            return;
        };
        if !instance.is_active() || instance.state_of(participant) != ParticipantState::Alive {
            return;
        }
        self.dispatch_hook(&instance, InstanceHook::PlayerReset, Some(participant), Vec::new());
        instance.modify_state(participant, ParticipantState::Dead);
        instance.reset_eligibility_check();
    }

    /// Applies the area boundary policy to a living member found outside.
    fn left_area(&self, instance: &Arc<Instance>, participant: Uuid) {
        let name = instance.name();
        if instance.is_cleared() {
            self.dispatch_hook(instance, InstanceHook::PlayerReset, Some(participant), Vec::new());
            instance.remove_participant(participant);
            self.host()
                .send_message(participant, &format!("You left {name} after clearing it"));
            instance.reset_eligibility_check();
        } else if !instance.is_active() {
            instance.remove_participant(participant);
            self.host()
                .send_message(participant, &format!("You left the party of {name}"));
        } else {
            self.dispatch_hook(instance, InstanceHook::PlayerReset, Some(participant), Vec::new());
            instance.modify_state(participant, ParticipantState::Quitter);
            self.host()
                .send_message(participant, &format!("You abandoned {name}"));
            instance.reset_eligibility_check();
        }
    }

    fn area_walk(&self, scripts_root: &Path, participant: Uuid, from: &Location, to: &Location) {
        for area in area_scripts(scripts_root) {
            let was_inside = from.world == to.world && area.contains(from.block());
            let is_inside = area.contains(to.block());
            let function = match (was_inside, is_inside) {
                (false, true) => "_enter",
                (true, false) => "_exit",
                _ => continue,
            };
            let request = ScriptRequest::new(area.to_id(), ScriptCategory::AreaWalk)
                .participant(participant)
                .in_world(to.world.clone())
                .function(function);
            self.dispatch(request);
        }
    }

    pub fn on_move(&self, participant: Uuid, from: &Location, to: &Location) {
        if from.world == to.world && from.block() == to.block() {
            return;
        }
        let walk_id = to.block().below().to_id();

        let Some(instance) = self
            .active_instance_of(participant)
            .and_then(|name| self.instance(&name))
        else {
            let request = ScriptRequest::new(walk_id, ScriptCategory::Walk)
                .participant(participant)
                .in_world(to.world.clone());
            self.dispatch(request);
            let root = self.layout().world_scripts(&to.world);
            self.area_walk(&root, participant, from, to);
            return;
        };

        if !instance.contains(to) {
            self.left_area(&instance, participant);
            return;
        }
        self.dispatch(ScriptRequest::new(walk_id, ScriptCategory::Walk).participant(participant));
        let root = self.layout().instance_scripts(instance.name());
        self.area_walk(&root, participant, from, to);
    }

    pub fn on_teleport(&self, participant: Uuid, _from: &Location, to: &Location) {
        let Some(instance) = self
            .active_instance_of(participant)
            .and_then(|name| self.instance(&name))
        else {
            return;
        };
        if to.world != instance.world() && !instance.contains(to) {
            self.left_area(&instance, participant);
        }
    }

    /// Whether the host must suppress the interaction.
    pub fn on_interact(&self, participant: Uuid, block: &Location) -> bool {
        let id = block.block().to_id();
        if self.active_instance_of(participant).is_some() {
            return self.dispatch(ScriptRequest::new(id, ScriptCategory::Interact).participant(participant));
        }
        if self.membership_of(participant).is_some() {
            return false;
        }
        let request = ScriptRequest::new(id, ScriptCategory::Interact)
            .participant(participant)
            .in_world(block.world.clone());
        self.dispatch(request)
    }

    /// Fires `onEntityDeath` in the first running dungeon around `at`.
    pub fn on_entity_death(&self, entity: &str, at: &Location) -> bool {
        let Some(instance) = self
            .instances()
            .into_iter()
            .find(|i| i.is_active() && i.contains(at))
        else {
            return false;
        };
        self.dispatch_hook(
            &instance,
            InstanceHook::EntityDeath,
            None,
            vec![("entity".to_string(), serde_json::Value::String(entity.to_string()))],
        )
    }

    /// Runs the dungeon's status script, or sends the default status text.
    pub fn status(&self, participant: Uuid, instance: &str) -> Result<(), DungeonError> {
        let instance = self
            .instance(instance)
            .ok_or_else(|| DungeonError::UnknownInstance(instance.to_string()))?;
        let request = ScriptRequest::hook(&instance, InstanceHook::Status).participant(participant);
        if !self.dispatch(request) {
            self.host()
                .send_message(participant, &instance.default_status());
        }
        Ok(())
    }
}
