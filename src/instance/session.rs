//! Session state machine for one dungeon instance.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::Local;
use dungeon_common::{Area, Location, ParticipantState, Position};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::file::{InstanceConfig, InstanceFile, UNLIMITED, until_midnight};
use super::hooks::InstanceHook;
use crate::registry::Registry;

/// Why a join was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinRejection {
    /// Left this run earlier.
    Quitter,
    SessionActive,
    /// Already in the party of another instance.
    ActiveElsewhere(String),
    PartyFull { max: i32 },
    DailyLimit { resets_in: String },
}

impl JoinRejection {
    pub fn message(&self, instance: &str) -> String {
        match self {
            JoinRejection::Quitter => {
                format!("You already left this run of {instance} and cannot rejoin")
            }
            JoinRejection::SessionActive => format!("{instance} is already running"),
            JoinRejection::ActiveElsewhere(other) => {
                format!("You are already in the party of {other}")
            }
            JoinRejection::PartyFull { max } => {
                format!("The party of {instance} is full ({max} members)")
            }
            JoinRejection::DailyLimit { resets_in } => format!(
                "You reached today's clear limit for {instance}. Resets in {resets_in}"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    AlreadyJoined,
    /// Dead or offline member; the rebirth hook decides.
    RebirthRequested,
    Rejected(JoinRejection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    NotMember,
    /// Removed without penalty.
    Left,
    /// Marked as quitter for the rest of the run.
    Quit,
    AlreadyLeft,
}

struct Session {
    file: InstanceFile,
    active: bool,
    cleared: bool,
    roster: BTreeMap<Uuid, ParticipantState>,
    temp_vars: HashMap<String, serde_json::Value>,
    generation: u64,
}

impl Session {
    fn alive(&self) -> Vec<Uuid> {
        self.roster
            .iter()
            .filter(|(_, state)| state.is_alive())
            .map(|(id, _)| *id)
            .collect()
    }

    fn any_alive(&self) -> bool {
        self.roster.values().any(|s| s.is_alive())
    }

    fn spawn(&self) -> Location {
        let data = &self.file.data;
        data.spawn_position.to_location(&data.world_name)
    }

    fn start(&self) -> Location {
        let data = &self.file.data;
        data.start_position.to_location(&data.world_name)
    }
}

/// Host-facing work produced while the session was locked.
#[derive(Default)]
struct Outbox {
    relocations: Vec<(Uuid, Location)>,
    messages: Vec<(Uuid, String)>,
    hooks: Vec<(InstanceHook, Option<Uuid>)>,
}

impl Outbox {
    fn relocate(&mut self, participant: Uuid, to: Location) {
        self.relocations.push((participant, to));
    }

    fn message(&mut self, participant: Uuid, text: impl Into<String>) {
        self.messages.push((participant, text.into()));
    }

    fn broadcast(&mut self, participants: &[Uuid], text: &str) {
        for p in participants {
            self.message(*p, text);
        }
    }

    fn hook(&mut self, hook: InstanceHook, participant: Option<Uuid>) {
        self.hooks.push((hook, participant));
    }
}

/// One loaded dungeon instance.
pub struct Instance {
    name: String,
    registry: Weak<Registry>,
    session: Mutex<Session>,
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance").field("name", &self.name).finish()
    }
}

impl Instance {
    pub fn new(name: impl Into<String>, file: InstanceFile, registry: Weak<Registry>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            registry,
            session: Mutex::new(Session {
                file,
                active: false,
                cleared: false,
                roster: BTreeMap::new(),
                temp_vars: HashMap::new(),
                generation: 0,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn registry(&self) -> Option<Arc<Registry>> {
        self.registry.upgrade()
    }

    fn display_name(&self, participant: Uuid) -> String {
        match self.registry() {
            Some(registry) => registry.host().display_name(participant),
            None => participant.to_string(),
        }
    }

    // -- queries ----------------------------------------------------------

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    pub fn is_cleared(&self) -> bool {
        self.lock().cleared
    }

    /// Incremented by every reset.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn state_of(&self, participant: Uuid) -> ParticipantState {
        self.lock()
            .roster
            .get(&participant)
            .copied()
            .unwrap_or(ParticipantState::None)
    }

    pub fn party(&self) -> Vec<(Uuid, ParticipantState)> {
        self.lock().roster.iter().map(|(id, s)| (*id, *s)).collect()
    }

    pub fn alive_members(&self) -> Vec<Uuid> {
        self.lock().alive()
    }

    pub fn config(&self) -> InstanceConfig {
        self.lock().file.data.clone()
    }

    pub fn world(&self) -> String {
        self.lock().file.data.world_name.clone()
    }

    pub fn area(&self) -> Area {
        self.lock().file.data.area()
    }

    pub fn spawn_location(&self) -> Location {
        self.lock().spawn()
    }

    pub fn start_location(&self) -> Location {
        self.lock().start()
    }

    /// Whether `location` lies in this instance's world and bounding box.
    pub fn contains(&self, location: &Location) -> bool {
        let session = self.lock();
        location.world == session.file.data.world_name
            && session.file.data.area().contains(location.block())
    }

    // -- active index helpers ---------------------------------------------

    fn register(&self, participant: Uuid) -> bool {
        match self.registry() {
            Some(registry) => registry.register_active(participant, &self.name),
            None => true,
        }
    }

    fn deregister(&self, participant: Uuid) {
        if let Some(registry) = self.registry() {
            registry.deregister_active_if(participant, &self.name);
        }
    }

    fn persist(&self, session: &Session) {
        if let Err(e) = session.file.save() {
            warn!(instance = %self.name, error = %e, "Failed to persist instance config");
        }
    }

    /// The on-disk party only mirrors the roster while a run is in progress.
    fn persist_roster(&self, session: &mut Session) {
        session.file.data.party = if session.active {
            session.roster.clone()
        } else {
            BTreeMap::new()
        };
        self.persist(session);
    }

    // -- transitions ------------------------------------------------------

    pub fn join(self: &Arc<Self>, participant: Uuid) -> JoinOutcome {
        let who = self.display_name(participant);
        let mut out = Outbox::default();
        let outcome = {
            let mut session = self.lock();
            match session.roster.get(&participant).copied() {
                Some(ParticipantState::Quitter) => JoinOutcome::Rejected(JoinRejection::Quitter),
                Some(ParticipantState::Alive) => {
                    out.message(participant, format!("You are already in the party of {}", self.name));
                    JoinOutcome::AlreadyJoined
                }
                Some(ParticipantState::Dead) | Some(ParticipantState::Offline) => {
                    out.hook(InstanceHook::PlayerRebirth, Some(participant));
                    JoinOutcome::RebirthRequested
                }
                Some(ParticipantState::None) | None => {
                    self.admit(&mut session, participant, &who, &mut out)
                }
            }
        };
        if let JoinOutcome::Rejected(reason) = &outcome {
            debug!(instance = %self.name, %participant, ?reason, "Join rejected");
            out.message(participant, reason.message(&self.name));
        }
        self.flush(out);
        outcome
    }

    fn admit(
        &self,
        session: &mut Session,
        participant: Uuid,
        who: &str,
        out: &mut Outbox,
    ) -> JoinOutcome {
        if session.active {
            return JoinOutcome::Rejected(JoinRejection::SessionActive);
        }
        if let Some(registry) = self.registry() {
            match registry.active_instance_of(participant) {
                Some(other) if other == self.name => {
                    warn!(instance = %self.name, %participant, "Stale active index entry, removing");
                    registry.deregister_active_if(participant, &self.name);
                }
                Some(other) => {
                    return JoinOutcome::Rejected(JoinRejection::ActiveElsewhere(other));
                }
                None => {}
            }
        }
        if !session.file.data.has_room(session.roster.len()) {
            return JoinOutcome::Rejected(JoinRejection::PartyFull {
                max: session.file.data.max_party,
            });
        }
        let now = Local::now();
        let allowed = session.file.data.can_participant_join(participant, now);
        self.persist(session);
        if !allowed {
            return JoinOutcome::Rejected(JoinRejection::DailyLimit {
                resets_in: until_midnight(now),
            });
        }
        if !self.register(participant) {
            let other = self
                .registry()
                .and_then(|r| r.active_instance_of(participant))
                .unwrap_or_default();
            return JoinOutcome::Rejected(JoinRejection::ActiveElsewhere(other));
        }

        session.roster.insert(participant, ParticipantState::Alive);
        self.persist(session);
        info!(instance = %self.name, %participant, "Participant joined");
        out.broadcast(&session.alive(), &format!("{who} has joined the party"));
        out.hook(InstanceHook::PartyMemberJoin, Some(participant));
        JoinOutcome::Joined
    }

    pub fn leave(self: &Arc<Self>, participant: Uuid) -> LeaveOutcome {
        let who = self.display_name(participant);
        let mut out = Outbox::default();
        let outcome = {
            let mut session = self.lock();
            let Some(state) = session.roster.get(&participant).copied() else {
                return LeaveOutcome::NotMember;
            };
            if !session.active || session.cleared {
                let cleared = session.cleared;
                if cleared {
                    out.hook(InstanceHook::PlayerReset, Some(participant));
                    out.relocate(participant, session.spawn());
                }
                self.remove_locked(&mut session, participant);
                out.message(participant, format!("You left the party of {}", self.name));
                out.broadcast(&session.alive(), &format!("{who} has left the party"));
                if cleared {
                    self.reset_check_locked(&mut session, &mut out);
                }
                LeaveOutcome::Left
            } else {
                match state {
                    ParticipantState::Alive => {
                        out.hook(InstanceHook::PartyMemberQuit, Some(participant));
                        out.hook(InstanceHook::PlayerReset, Some(participant));
                        self.set_state_locked(&mut session, participant, ParticipantState::Quitter);
                        out.relocate(participant, session.spawn());
                        out.message(participant, format!("You abandoned {}", self.name));
                        out.broadcast(&session.alive(), &format!("{who} abandoned the party"));
                        self.reset_check_locked(&mut session, &mut out);
                        LeaveOutcome::Quit
                    }
                    ParticipantState::Dead | ParticipantState::Offline => {
                        self.set_state_locked(&mut session, participant, ParticipantState::Quitter);
                        out.broadcast(&session.alive(), &format!("{who} has left the party"));
                        LeaveOutcome::Quit
                    }
                    ParticipantState::Quitter => {
                        out.message(participant, format!("You already left {}", self.name));
                        LeaveOutcome::AlreadyLeft
                    }
                    ParticipantState::None => LeaveOutcome::NotMember,
                }
            }
        };
        self.flush(out);
        outcome
    }

    /// Starts the run. Fails on an empty roster or a running session.
    pub fn start(self: &Arc<Self>, teleport: bool) -> bool {
        let mut out = Outbox::default();
        {
            let mut session = self.lock();
            if session.roster.is_empty() || session.active {
                return false;
            }
            session.active = true;
            session.cleared = false;
            let alive = session.alive();
            if teleport {
                let start = session.start();
                for p in &alive {
                    out.relocate(*p, start.clone());
                }
            }
            self.persist_roster(&mut session);
            out.broadcast(&alive, &format!("{} has started", self.name));
        }
        if let Some(registry) = self.registry() {
            registry.ledger().mark_instance_active(&self.name);
        }
        info!(instance = %self.name, "Session started");
        self.flush(out);
        true
    }

    /// Ends a running session through a reset.
    pub fn stop(self: &Arc<Self>) -> bool {
        if !self.is_active() {
            return false;
        }
        self.reset();
        true
    }

    /// Marks the run as won and records a clear for every living member.
    /// Repeated calls record again.
    pub fn clear(&self) -> bool {
        let mut out = Outbox::default();
        {
            let mut session = self.lock();
            session.cleared = true;
            let now = Local::now();
            let alive = session.alive();
            for p in &alive {
                session.file.data.add_cleared_player(*p, now);
            }
            self.persist(&session);
            out.broadcast(&alive, &format!("{} has been cleared", self.name));
        }
        info!(instance = %self.name, "Session cleared");
        self.send_messages(out.messages);
        true
    }

    pub fn reset(self: &Arc<Self>) {
        let mut out = Outbox::default();
        {
            let mut session = self.lock();
            self.reset_locked(&mut session, &mut out);
        }
        self.flush(out);
    }

    /// Resets when nobody is left alive. Returns whether a reset happened.
    pub fn reset_eligibility_check(self: &Arc<Self>) -> bool {
        let mut out = Outbox::default();
        let fired = {
            let mut session = self.lock();
            self.reset_check_locked(&mut session, &mut out)
        };
        self.flush(out);
        fired
    }

    /// Overwrites a member's state. Non-members are ignored, quitters stay
    /// quitters, and `Alive` is refused while the participant is active in
    /// another instance. `None` removes the member.
    pub fn modify_state(&self, participant: Uuid, state: ParticipantState) -> bool {
        let mut session = self.lock();
        self.set_state_locked(&mut session, participant, state)
    }

    /// Removes a member without penalty.
    pub fn remove_participant(&self, participant: Uuid) -> bool {
        let mut session = self.lock();
        if !session.roster.contains_key(&participant) {
            return false;
        }
        self.remove_locked(&mut session, participant);
        true
    }

    fn reset_check_locked(&self, session: &mut Session, out: &mut Outbox) -> bool {
        if session.any_alive() {
            return false;
        }
        self.reset_locked(session, out);
        true
    }

    fn reset_locked(&self, session: &mut Session, out: &mut Outbox) {
        let spawn = session.spawn();
        for p in session.alive() {
            out.relocate(p, spawn.clone());
            out.hook(InstanceHook::PlayerReset, Some(p));
        }
        let members: Vec<Uuid> = session.roster.keys().copied().collect();
        for p in members {
            self.deregister(p);
        }
        session.roster.clear();
        session.temp_vars.clear();
        session.active = false;
        session.cleared = false;
        session.generation += 1;
        self.persist_roster(session);
        if let Some(registry) = self.registry() {
            registry.ledger().clear_instance(&self.name);
        }
        info!(instance = %self.name, generation = session.generation, "Session reset");
        out.hook(InstanceHook::DungeonReset, None);
    }

    fn set_state_locked(
        &self,
        session: &mut Session,
        participant: Uuid,
        state: ParticipantState,
    ) -> bool {
        let Some(current) = session.roster.get(&participant).copied() else {
            return false;
        };
        if current == ParticipantState::Quitter && state != ParticipantState::Quitter {
            debug!(instance = %self.name, %participant, ?state, "Quitter state is final");
            return false;
        }
        match state {
            ParticipantState::None => {
                self.remove_locked(session, participant);
                return true;
            }
            ParticipantState::Alive => {
                if !self.register(participant) {
                    warn!(instance = %self.name, %participant, "Participant is active elsewhere");
                    return false;
                }
            }
            _ => self.deregister(participant),
        }
        session.roster.insert(participant, state);
        self.persist_roster(session);
        true
    }

    fn remove_locked(&self, session: &mut Session, participant: Uuid) {
        session.roster.remove(&participant);
        self.deregister(participant);
        self.persist_roster(session);
    }

    // -- side effects -----------------------------------------------------

    fn send_messages(&self, messages: Vec<(Uuid, String)>) {
        let Some(registry) = self.registry() else {
            return;
        };
        let host = registry.host();
        for (p, text) in messages {
            host.send_message(p, &text);
        }
    }

    fn flush(self: &Arc<Self>, out: Outbox) {
        let Some(registry) = self.registry() else {
            return;
        };
        for (p, to) in out.relocations {
            let host = registry.host().clone();
            registry.tasks().schedule(move || host.teleport(p, &to));
        }
        self.send_messages(out.messages);
        for (hook, p) in out.hooks {
            registry.dispatch_hook(self, hook, p, Vec::new());
        }
    }

    /// Sends `text` to every living member.
    pub fn message_party(&self, text: &str) {
        let alive = self.alive_members();
        self.send_messages(alive.into_iter().map(|p| (p, text.to_string())).collect());
    }

    /// Sends `text` to everyone online standing inside the area.
    pub fn message_area(&self, text: &str) {
        let Some(registry) = self.registry() else {
            return;
        };
        let host = registry.host();
        for p in host.online_participants() {
            if host.location_of(p).is_some_and(|loc| self.contains(&loc)) {
                host.send_message(p, text);
            }
        }
    }

    // -- settings ---------------------------------------------------------

    fn update_config(&self, f: impl FnOnce(&mut InstanceConfig)) {
        let mut session = self.lock();
        f(&mut session.file.data);
        self.persist(&session);
    }

    pub fn set_max_party(&self, value: i32) {
        self.update_config(|c| c.set_max_party(value));
    }

    pub fn set_daily_clear(&self, value: i32) {
        self.update_config(|c| c.set_daily_clear(value));
    }

    pub fn set_spawn(&self, position: Position) {
        self.update_config(|c| c.spawn_position = position);
    }

    pub fn set_start(&self, position: Position) {
        self.update_config(|c| c.start_position = position);
    }

    pub fn set_area(&self, area: Area) {
        self.update_config(|c| c.set_area(area));
    }

    // -- variables --------------------------------------------------------

    pub fn get_variable(&self, key: &str) -> Option<serde_json::Value> {
        self.lock().file.data.variables.get(key).cloned()
    }

    pub fn set_variable(&self, key: &str, value: serde_json::Value) {
        self.update_config(|c| {
            c.variables.insert(key.to_string(), value);
        });
    }

    pub fn remove_variable(&self, key: &str) -> Option<serde_json::Value> {
        let mut removed = None;
        self.update_config(|c| removed = c.variables.remove(key));
        removed
    }

    /// Temporary variables live until the next reset.
    pub fn get_temp_variable(&self, key: &str) -> Option<serde_json::Value> {
        self.lock().temp_vars.get(key).cloned()
    }

    pub fn set_temp_variable(&self, key: &str, value: serde_json::Value) {
        self.lock().temp_vars.insert(key.to_string(), value);
    }

    pub fn remove_temp_variable(&self, key: &str) -> Option<serde_json::Value> {
        self.lock().temp_vars.remove(key)
    }

    // -- status -----------------------------------------------------------

    pub fn default_status(&self) -> String {
        let (active, cleared, party, max) = {
            let session = self.lock();
            (
                session.active,
                session.cleared,
                session.roster.iter().map(|(id, s)| (*id, *s)).collect::<Vec<_>>(),
                session.file.data.max_party,
            )
        };
        let status = match (active, cleared) {
            (true, true) => "CLEARED",
            (true, false) => "ACTIVE",
            _ => "INACTIVE",
        };
        let max = if max == UNLIMITED {
            "∞".to_string()
        } else {
            max.to_string()
        };
        let mut lines = vec![
            format!("Dungeon: {}", self.name),
            format!("Status: {status}"),
            format!("Party ({}/{max}):", party.len()),
        ];
        for (p, state) in party {
            lines.push(format!("  {} - {}", self.display_name(p), state.label()));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::host::OfflineHost;
    use crate::registry::Services;
    use dungeon_common::BlockPos;
    use tempfile::{TempDir, tempdir};

    fn make_instance() -> (Arc<Registry>, Arc<Instance>, TempDir) {
        let dir = tempdir().unwrap();
        let registry = Registry::new(
            RuntimeConfig::new(dir.path()).with_workers(1),
            Services::new(Arc::new(OfflineHost)),
        )
        .unwrap();
        let area = Area::new(BlockPos::new(0, 60, 0), BlockPos::new(20, 80, 20));
        let instance = registry.create_instance("crypt", "world", area).unwrap();
        (registry, instance, dir)
    }

    #[test]
    fn test_join_registers_and_is_idempotent() {
        let (registry, instance, _dir) = make_instance();
        let p = Uuid::new_v4();
        assert_eq!(instance.join(p), JoinOutcome::Joined);
        assert_eq!(instance.join(p), JoinOutcome::AlreadyJoined);
        assert_eq!(instance.party().len(), 1);
        assert_eq!(registry.active_instance_of(p).as_deref(), Some("crypt"));
    }

    #[test]
    fn test_join_rejected_while_active() {
        let (_registry, instance, _dir) = make_instance();
        instance.join(Uuid::new_v4());
        assert!(instance.start(false));
        assert_eq!(
            instance.join(Uuid::new_v4()),
            JoinOutcome::Rejected(JoinRejection::SessionActive)
        );
    }

    #[test]
    fn test_join_respects_max_party() {
        let (_registry, instance, _dir) = make_instance();
        instance.set_max_party(1);
        instance.join(Uuid::new_v4());
        assert_eq!(
            instance.join(Uuid::new_v4()),
            JoinOutcome::Rejected(JoinRejection::PartyFull { max: 1 })
        );
    }

    #[test]
    fn test_start_requires_members() {
        let (_registry, instance, _dir) = make_instance();
        assert!(!instance.start(true));
        instance.join(Uuid::new_v4());
        assert!(instance.start(true));
        assert!(!instance.start(true));
        assert!(instance.is_active());
    }

    #[test]
    fn test_start_persists_party_and_reset_clears_it() {
        let (_registry, instance, dir) = make_instance();
        let p = Uuid::new_v4();
        instance.join(p);
        assert!(instance.config().party.is_empty());
        instance.start(false);

        let path = dir.path().join("dungeon/crypt/config.json");
        let on_disk = InstanceFile::load(&path).unwrap().unwrap();
        assert_eq!(on_disk.data.party.get(&p), Some(&ParticipantState::Alive));

        instance.reset();
        let on_disk = InstanceFile::load(&path).unwrap().unwrap();
        assert!(on_disk.data.party.is_empty());
        assert_eq!(instance.generation(), 1);
        assert!(!instance.is_active());
    }

    #[test]
    fn test_leave_alive_during_run_makes_quitter_and_resets() {
        let (registry, instance, _dir) = make_instance();
        let p = Uuid::new_v4();
        let q = Uuid::new_v4();
        instance.join(p);
        instance.join(q);
        instance.start(false);

        assert_eq!(instance.leave(p), LeaveOutcome::Quit);
        assert_eq!(instance.state_of(p), ParticipantState::Quitter);
        assert_eq!(registry.active_instance_of(p), None);
        assert_eq!(instance.leave(p), LeaveOutcome::AlreadyLeft);
        assert_eq!(instance.generation(), 0);

        assert_eq!(instance.leave(q), LeaveOutcome::Quit);
        assert_eq!(instance.generation(), 1);
        assert!(instance.party().is_empty());
    }

    #[test]
    fn test_quitter_cannot_return() {
        let (_registry, instance, _dir) = make_instance();
        let p = Uuid::new_v4();
        let q = Uuid::new_v4();
        instance.join(p);
        instance.join(q);
        instance.start(false);
        instance.leave(p);

        assert_eq!(instance.join(p), JoinOutcome::Rejected(JoinRejection::Quitter));
        assert!(!instance.modify_state(p, ParticipantState::Alive));
        assert!(!instance.modify_state(p, ParticipantState::Dead));
        assert_eq!(instance.state_of(p), ParticipantState::Quitter);
    }

    #[test]
    fn test_leave_inactive_removes_without_penalty() {
        let (registry, instance, _dir) = make_instance();
        let p = Uuid::new_v4();
        instance.join(p);
        assert_eq!(instance.leave(p), LeaveOutcome::Left);
        assert_eq!(instance.state_of(p), ParticipantState::None);
        assert_eq!(registry.active_instance_of(p), None);
        assert_eq!(instance.leave(p), LeaveOutcome::NotMember);
    }

    #[test]
    fn test_clear_records_alive_members_each_call() {
        let (_registry, instance, _dir) = make_instance();
        let p = Uuid::new_v4();
        let d = Uuid::new_v4();
        instance.join(p);
        instance.join(d);
        instance.start(false);
        instance.modify_state(d, ParticipantState::Dead);
        assert!(instance.clear());
        assert!(instance.clear());
        assert!(instance.is_cleared());

        let config = instance.config();
        assert_eq!(config.cleared_players.get(&p).map(Vec::len), Some(2));
        assert!(!config.cleared_players.contains_key(&d));
    }

    #[test]
    fn test_clear_before_start_still_counts() {
        let (_registry, instance, _dir) = make_instance();
        let p = Uuid::new_v4();
        instance.join(p);
        assert!(!instance.is_active());
        assert!(instance.clear());
        assert!(instance.is_cleared());
        assert_eq!(instance.config().cleared_players.get(&p).map(Vec::len), Some(1));
    }

    #[test]
    fn test_modify_state_tracks_active_index() {
        let (registry, instance, _dir) = make_instance();
        let p = Uuid::new_v4();
        instance.join(p);
        instance.start(false);

        assert!(instance.modify_state(p, ParticipantState::Dead));
        assert_eq!(registry.active_instance_of(p), None);
        assert!(instance.modify_state(p, ParticipantState::Alive));
        assert_eq!(registry.active_instance_of(p).as_deref(), Some("crypt"));
        assert!(!instance.modify_state(Uuid::new_v4(), ParticipantState::Alive));
    }

    #[test]
    fn test_dead_member_join_requests_rebirth() {
        let (_registry, instance, _dir) = make_instance();
        let p = Uuid::new_v4();
        let q = Uuid::new_v4();
        instance.join(p);
        instance.join(q);
        instance.start(false);
        instance.modify_state(p, ParticipantState::Dead);
        assert_eq!(instance.join(p), JoinOutcome::RebirthRequested);
        assert_eq!(instance.state_of(p), ParticipantState::Dead);
    }

    #[test]
    fn test_temp_variables_cleared_on_reset() {
        let (_registry, instance, _dir) = make_instance();
        instance.set_temp_variable("wave", serde_json::json!(3));
        instance.set_variable("best", serde_json::json!(42));
        instance.reset();
        assert_eq!(instance.get_temp_variable("wave"), None);
        assert_eq!(instance.get_variable("best"), Some(serde_json::json!(42)));
    }

    #[test]
    fn test_default_status_lists_party() {
        let (_registry, instance, _dir) = make_instance();
        let p = Uuid::new_v4();
        instance.join(p);
        let status = instance.default_status();
        assert!(status.contains("Dungeon: crypt"));
        assert!(status.contains("INACTIVE"));
        assert!(status.contains(&format!("{p} - ALIVE")));
    }
}
