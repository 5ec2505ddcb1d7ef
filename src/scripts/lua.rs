//! Lua evaluation of script jobs.
//!
//! Every job gets a fresh interpreter with exactly one binding set:
//!
//! - `sm` always, the capability table
//! - `player` when a participant is supplied
//! - `dungeon` for scripts resolved under an instance
//! - `world` and `variables` for scripts resolved under a world
//! - any extra named values the caller attached
//!
//! Handles are tables of methods and are called with `:`.

use std::collections::HashMap;
use std::sync::Arc;

use dungeon_common::{Location, ParticipantState};
use mlua::{Error as LuaError, Lua, LuaSerdeExt, Result as LuaResult, Table, Value, Variadic};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::ScriptError;
use crate::instance::Instance;
use crate::item_drop::ItemDrop;
use crate::scripts::ScriptCategory;
use crate::scripts::api::ScriptApi;
use crate::scripts::engine::{JobRunner, ScriptJob};
use crate::world_vars::WorldVariables;

/// Runner handed to the script engine.
pub fn runner(api: Arc<dyn ScriptApi>) -> JobRunner {
    Arc::new(move |job: ScriptJob, source: String| {
        let path = job.path.clone();
        if let Err(e) = evaluate(&api, job, &source) {
            let err = ScriptError::Evaluation {
                path,
                message: e.to_string(),
            };
            warn!(error = %err, "Script failed");
        }
    })
}

/// Runs `source` with the job's bindings, then its entry point if one was
/// requested and defined.
pub fn evaluate(api: &Arc<dyn ScriptApi>, job: ScriptJob, source: &str) -> LuaResult<()> {
    let lua = Lua::new();
    install_bindings(&lua, api, &job)?;

    let chunk_name = job
        .path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("script");
    lua.load(source).set_name(chunk_name).exec()?;

    if let Some(function) = &job.function {
        match lua.globals().get::<_, Value>(function.as_str())? {
            Value::Function(f) => f.call::<_, ()>(())?,
            _ => debug!(script = %job.path.display(), function, "Entry point not defined"),
        }
    }
    Ok(())
}

fn install_bindings(lua: &Lua, api: &Arc<dyn ScriptApi>, job: &ScriptJob) -> LuaResult<()> {
    let globals = lua.globals();
    let bindings = &job.bindings;
    globals.set("sm", sm_table(lua, api)?)?;
    if let Some(participant) = bindings.participant {
        globals.set("player", player_table(lua, api, participant)?)?;
    }
    if let Some(instance) = &bindings.instance {
        globals.set("dungeon", dungeon_table(lua, instance.clone())?)?;
    }
    if let Some(world) = &bindings.world {
        globals.set("world", world.world())?;
        globals.set("variables", variables_table(lua, world.clone())?)?;
    }
    for (name, value) in &bindings.extra {
        globals.set(name.as_str(), lua.to_value(value)?)?;
    }
    Ok(())
}

/// Accepts a player table (its `id` field) or a uuid string.
fn participant_id(value: &Value) -> LuaResult<Uuid> {
    let raw = match value {
        Value::Table(t) => t.get::<_, String>("id")?,
        Value::String(s) => s.to_str()?.to_string(),
        other => {
            return Err(LuaError::RuntimeError(format!(
                "expected a player or uuid, got {}",
                other.type_name()
            )));
        }
    };
    Uuid::parse_str(&raw).map_err(LuaError::external)
}

fn to_json(lua: &Lua, value: Value) -> LuaResult<serde_json::Value> {
    lua.from_value(value)
}

fn sm_table<'lua>(lua: &'lua Lua, api: &Arc<dyn ScriptApi>) -> LuaResult<Table<'lua>> {
    let sm = lua.create_table()?;

    let a = api.clone();
    sm.set(
        "log",
        lua.create_function(move |_, (_this, level, message): (Table, String, String)| {
            a.log(&level, &message);
            Ok(())
        })?,
    )?;

    sm.set(
        "enum_player_state",
        lua.create_function(|lua, _this: Table| {
            let states = lua.create_table()?;
            for state in ParticipantState::all() {
                states.set(state.label(), state.as_str())?;
            }
            Ok(states)
        })?,
    )?;

    let a = api.clone();
    sm.set(
        "get_player_state",
        lua.create_function(move |_, (_this, player): (Table, Value)| {
            Ok(a.participant_state(participant_id(&player)?).as_str())
        })?,
    )?;

    let a = api.clone();
    sm.set(
        "get_player",
        lua.create_function(move |lua, (_this, player): (Table, Value)| {
            player_table(lua, &a, participant_id(&player)?)
        })?,
    )?;

    let a = api.clone();
    sm.set(
        "get_dungeon",
        lua.create_function(move |lua, (_this, name): (Table, String)| {
            match a.instance(&name) {
                Some(instance) => Ok(Value::Table(dungeon_table(lua, instance)?)),
                None => Ok(Value::Nil),
            }
        })?,
    )?;

    let a = api.clone();
    sm.set(
        "get_player_dungeon",
        lua.create_function(move |lua, (_this, player): (Table, Value)| {
            match a.instance_of(participant_id(&player)?) {
                Some(instance) => Ok(Value::Table(dungeon_table(lua, instance)?)),
                None => Ok(Value::Nil),
            }
        })?,
    )?;

    let a = api.clone();
    sm.set(
        "get_script_directory",
        lua.create_function(
            move |_, (_this, name, category): (Table, String, Option<String>)| {
                let category = match category {
                    Some(raw) => raw
                        .parse::<ScriptCategory>()
                        .map_err(|e| LuaError::RuntimeError(e.to_string()))?,
                    None => ScriptCategory::Uncategorized,
                };
                Ok(a.script_directory(&name, category).display().to_string())
            },
        )?,
    )?;

    let a = api.clone();
    sm.set(
        "get_dungeon_directory",
        lua.create_function(move |_, (_this, name): (Table, String)| {
            Ok(a.instance_directory(&name).display().to_string())
        })?,
    )?;

    let a = api.clone();
    sm.set(
        "get_dungeon_world",
        lua.create_function(move |_, (_this, name): (Table, String)| Ok(a.instance_world(&name)))?,
    )?;

    let a = api.clone();
    sm.set(
        "is_economy_enabled",
        lua.create_function(move |_, _this: Table| Ok(a.is_economy_enabled()))?,
    )?;

    let a = api.clone();
    sm.set(
        "has_money",
        lua.create_function(move |_, (_this, player, amount): (Table, Value, f64)| {
            Ok(a.has_money(participant_id(&player)?, amount))
        })?,
    )?;

    let a = api.clone();
    sm.set(
        "deposit_money",
        lua.create_function(move |_, (_this, player, amount): (Table, Value, f64)| {
            Ok(a.deposit_money(participant_id(&player)?, amount))
        })?,
    )?;

    let a = api.clone();
    sm.set(
        "withdraw_money",
        lua.create_function(move |_, (_this, player, amount): (Table, Value, f64)| {
            Ok(a.withdraw_money(participant_id(&player)?, amount))
        })?,
    )?;

    let a = api.clone();
    sm.set(
        "add_potion_effect",
        lua.create_function(
            move |_, (_this, player, effect, duration, amplifier): (Table, Value, String, u32, Option<u32>)| {
                a.add_potion_effect(participant_id(&player)?, &effect, duration, amplifier.unwrap_or(0));
                Ok(())
            },
        )?,
    )?;

    let a = api.clone();
    sm.set(
        "clear_potion_effect",
        lua.create_function(
            move |_, (_this, player, effects): (Table, Value, Variadic<String>)| {
                let effects: Vec<String> = effects.into_iter().collect();
                a.clear_potion_effects(participant_id(&player)?, &effects);
                Ok(())
            },
        )?,
    )?;

    let a = api.clone();
    sm.set(
        "create_item_drop",
        lua.create_function(
            move |lua, (_this, at, table): (Table, Value, HashMap<String, f64>)| {
                let at: Location = lua.from_value(at)?;
                let drop = Arc::new(a.create_item_drop(at, table.into_iter().collect()));
                item_drop_table(lua, drop)
            },
        )?,
    )?;

    Ok(sm)
}

fn player_table<'lua>(
    lua: &'lua Lua,
    api: &Arc<dyn ScriptApi>,
    participant: Uuid,
) -> LuaResult<Table<'lua>> {
    let player = lua.create_table()?;
    player.set("id", participant.to_string())?;
    player.set("name", api.display_name(participant))?;

    let a = api.clone();
    player.set(
        "send_message",
        lua.create_function(move |_, (_this, message): (Table, String)| {
            a.send_message(participant, &message);
            Ok(())
        })?,
    )?;

    let a = api.clone();
    player.set(
        "is_online",
        lua.create_function(move |_, _this: Table| Ok(a.is_online(participant)))?,
    )?;

    let a = api.clone();
    player.set(
        "get_state",
        lua.create_function(move |_, _this: Table| Ok(a.participant_state(participant).as_str()))?,
    )?;

    let a = api.clone();
    player.set(
        "location",
        lua.create_function(move |lua, _this: Table| match a.location_of(participant) {
            Some(location) => lua.to_value(&location),
            None => Ok(Value::Nil),
        })?,
    )?;

    let a = api.clone();
    player.set(
        "teleport",
        lua.create_function(move |lua, (_this, to): (Table, Value)| {
            let to: Location = lua.from_value(to)?;
            a.teleport(participant, to);
            Ok(())
        })?,
    )?;

    Ok(player)
}

fn dungeon_table(lua: &Lua, instance: Arc<Instance>) -> LuaResult<Table<'_>> {
    let dungeon = lua.create_table()?;
    dungeon.set("name", instance.name())?;

    let i = instance.clone();
    dungeon.set(
        "get_world",
        lua.create_function(move |_, _this: Table| Ok(i.world()))?,
    )?;

    let i = instance.clone();
    dungeon.set(
        "is_active",
        lua.create_function(move |_, _this: Table| Ok(i.is_active()))?,
    )?;

    let i = instance.clone();
    dungeon.set(
        "is_cleared",
        lua.create_function(move |_, _this: Table| Ok(i.is_cleared()))?,
    )?;

    let i = instance.clone();
    dungeon.set(
        "get_player_state",
        lua.create_function(move |_, (_this, player): (Table, Value)| {
            Ok(i.state_of(participant_id(&player)?).as_str())
        })?,
    )?;

    let i = instance.clone();
    dungeon.set(
        "get_party",
        lua.create_function(move |lua, _this: Table| {
            let party = lua.create_table()?;
            for (p, state) in i.party() {
                party.set(p.to_string(), state.as_str())?;
            }
            Ok(party)
        })?,
    )?;

    let i = instance.clone();
    dungeon.set(
        "modify_player_state",
        lua.create_function(move |_, (_this, player, state): (Table, Value, String)| {
            let state = state
                .parse::<ParticipantState>()
                .map_err(LuaError::RuntimeError)?;
            Ok(i.modify_state(participant_id(&player)?, state))
        })?,
    )?;

    let i = instance.clone();
    dungeon.set(
        "remove_player",
        lua.create_function(move |_, (_this, player): (Table, Value)| {
            Ok(i.remove_participant(participant_id(&player)?))
        })?,
    )?;

    let i = instance.clone();
    dungeon.set(
        "start",
        lua.create_function(move |_, (_this, teleport): (Table, Option<bool>)| {
            Ok(i.start(teleport.unwrap_or(true)))
        })?,
    )?;

    let i = instance.clone();
    dungeon.set(
        "stop",
        lua.create_function(move |_, _this: Table| Ok(i.stop()))?,
    )?;

    let i = instance.clone();
    dungeon.set(
        "clear",
        lua.create_function(move |_, _this: Table| Ok(i.clear()))?,
    )?;

    let i = instance.clone();
    dungeon.set(
        "reset",
        lua.create_function(move |_, _this: Table| {
            i.reset();
            Ok(())
        })?,
    )?;

    let i = instance.clone();
    dungeon.set(
        "reset_eligibility_check",
        lua.create_function(move |_, _this: Table| Ok(i.reset_eligibility_check()))?,
    )?;

    let i = instance.clone();
    dungeon.set(
        "message_party",
        lua.create_function(move |_, (_this, text): (Table, String)| {
            i.message_party(&text);
            Ok(())
        })?,
    )?;

    let i = instance.clone();
    dungeon.set(
        "message_area",
        lua.create_function(move |_, (_this, text): (Table, String)| {
            i.message_area(&text);
            Ok(())
        })?,
    )?;

    let i = instance.clone();
    dungeon.set(
        "get_spawn_location",
        lua.create_function(move |lua, _this: Table| lua.to_value(&i.spawn_location()))?,
    )?;

    let i = instance.clone();
    dungeon.set(
        "get_start_location",
        lua.create_function(move |lua, _this: Table| lua.to_value(&i.start_location()))?,
    )?;

    let i = instance.clone();
    dungeon.set(
        "get_variable",
        lua.create_function(move |lua, (_this, key): (Table, String)| match i.get_variable(&key) {
            Some(value) => lua.to_value(&value),
            None => Ok(Value::Nil),
        })?,
    )?;

    let i = instance.clone();
    dungeon.set(
        "set_variable",
        lua.create_function(move |lua, (_this, key, value): (Table, String, Value)| {
            i.set_variable(&key, to_json(lua, value)?);
            Ok(())
        })?,
    )?;

    let i = instance.clone();
    dungeon.set(
        "remove_variable",
        lua.create_function(move |_, (_this, key): (Table, String)| {
            Ok(i.remove_variable(&key).is_some())
        })?,
    )?;

    let i = instance.clone();
    dungeon.set(
        "get_temp_variable",
        lua.create_function(move |lua, (_this, key): (Table, String)| {
            match i.get_temp_variable(&key) {
                Some(value) => lua.to_value(&value),
                None => Ok(Value::Nil),
            }
        })?,
    )?;

    let i = instance.clone();
    dungeon.set(
        "set_temp_variable",
        lua.create_function(move |lua, (_this, key, value): (Table, String, Value)| {
            i.set_temp_variable(&key, to_json(lua, value)?);
            Ok(())
        })?,
    )?;

    let i = instance.clone();
    dungeon.set(
        "remove_temp_variable",
        lua.create_function(move |_, (_this, key): (Table, String)| {
            Ok(i.remove_temp_variable(&key).is_some())
        })?,
    )?;

    let i = instance;
    dungeon.set(
        "default_status",
        lua.create_function(move |_, _this: Table| Ok(i.default_status()))?,
    )?;

    Ok(dungeon)
}

fn variables_table(lua: &Lua, store: Arc<WorldVariables>) -> LuaResult<Table<'_>> {
    let variables = lua.create_table()?;

    let s = store.clone();
    variables.set(
        "get",
        lua.create_function(move |lua, (_this, key): (Table, String)| match s.get(&key) {
            Some(value) => lua.to_value(&value),
            None => Ok(Value::Nil),
        })?,
    )?;

    let s = store.clone();
    variables.set(
        "set",
        lua.create_function(move |lua, (_this, key, value): (Table, String, Value)| {
            s.set(&key, to_json(lua, value)?);
            Ok(())
        })?,
    )?;

    let s = store.clone();
    variables.set(
        "remove",
        lua.create_function(move |_, (_this, key): (Table, String)| Ok(s.remove(&key).is_some()))?,
    )?;

    let s = store;
    variables.set(
        "keys",
        lua.create_function(move |_, _this: Table| Ok(s.keys()))?,
    )?;

    Ok(variables)
}

fn item_drop_table(lua: &Lua, drop: Arc<ItemDrop>) -> LuaResult<Table<'_>> {
    let handle = lua.create_table()?;
    handle.set("location", lua.to_value(drop.location())?)?;

    let d = drop.clone();
    handle.set(
        "run",
        lua.create_function(move |_, (_this, amount): (Table, i64)| Ok(d.run(amount)))?,
    )?;

    let d = drop;
    handle.set(
        "debug",
        lua.create_function(move |_, _this: Table| Ok(d.debug()))?,
    )?;

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Host, HostTasks, OfflineHost};
    use crate::instance::{InstanceConfig, InstanceFile};
    use crate::layout::Layout;
    use crate::scripts::api::Capabilities;
    use crate::scripts::engine::Bindings;
    use dungeon_common::{Area, BlockPos};
    use std::path::PathBuf;
    use std::sync::{Mutex, Weak};
    use tempfile::tempdir;

    #[derive(Default)]
    struct RecordingHost {
        messages: Mutex<Vec<(Uuid, String)>>,
    }

    impl Host for RecordingHost {
        fn is_online(&self, _participant: Uuid) -> bool {
            true
        }

        fn display_name(&self, _participant: Uuid) -> String {
            "Alex".to_string()
        }

        fn location_of(&self, _participant: Uuid) -> Option<Location> {
            Some(Location::new("world", 1.5, 64.0, -3.5))
        }

        fn send_message(&self, participant: Uuid, message: &str) {
            self.messages
                .lock()
                .unwrap()
                .push((participant, message.to_string()));
        }

        fn teleport(&self, _participant: Uuid, _to: &Location) {}

        fn online_participants(&self) -> Vec<Uuid> {
            Vec::new()
        }
    }

    fn api_with(host: Arc<RecordingHost>, tasks: Arc<HostTasks>) -> Arc<dyn ScriptApi> {
        Arc::new(Capabilities::new(
            Weak::new(),
            Layout::new("/plugin"),
            host,
            None,
            Arc::new(OfflineHost),
            Arc::new(OfflineHost),
            tasks,
        ))
    }

    fn job(bindings: Bindings, function: Option<&str>) -> ScriptJob {
        ScriptJob {
            path: PathBuf::from("/plugin/scripts/test.lua"),
            function: function.map(str::to_string),
            bindings,
        }
    }

    fn with_player(p: Uuid) -> Bindings {
        Bindings {
            participant: Some(p),
            ..Bindings::default()
        }
    }

    #[test]
    fn test_player_binding_sends_message() {
        let host = Arc::new(RecordingHost::default());
        let api = api_with(host.clone(), Arc::new(HostTasks::new()));
        let p = Uuid::new_v4();
        evaluate(
            &api,
            job(with_player(p), None),
            "sm:log('info', 'hello')\nplayer:send_message('hi ' .. player.name)",
        )
        .unwrap();
        assert_eq!(*host.messages.lock().unwrap(), vec![(p, "hi Alex".to_string())]);
    }

    #[test]
    fn test_entry_point_called_and_missing_one_ignored() {
        let host = Arc::new(RecordingHost::default());
        let api = api_with(host.clone(), Arc::new(HostTasks::new()));
        let p = Uuid::new_v4();
        let source = "function main()\n  player:send_message('main')\nend";
        evaluate(&api, job(with_player(p), Some("main")), source).unwrap();
        evaluate(&api, job(with_player(p), Some("_enter")), source).unwrap();
        assert_eq!(host.messages.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_syntax_error_is_reported() {
        let api = api_with(Arc::new(RecordingHost::default()), Arc::new(HostTasks::new()));
        assert!(evaluate(&api, job(Bindings::default(), None), "this is not lua").is_err());
        assert!(evaluate(&api, job(Bindings::default(), None), "error('boom')").is_err());
    }

    #[test]
    fn test_runner_swallows_errors() {
        let api = api_with(Arc::new(RecordingHost::default()), Arc::new(HostTasks::new()));
        let run = runner(api);
        run(job(Bindings::default(), None), "error('boom')".to_string());
    }

    #[test]
    fn test_money_without_economy() {
        let host = Arc::new(RecordingHost::default());
        let api = api_with(host.clone(), Arc::new(HostTasks::new()));
        let p = Uuid::new_v4();
        evaluate(
            &api,
            job(with_player(p), None),
            "player:send_message(tostring(sm:is_economy_enabled()) .. ' ' .. tostring(sm:has_money(player, 5)))",
        )
        .unwrap();
        assert_eq!(host.messages.lock().unwrap()[0].1, "false false");
    }

    #[test]
    fn test_world_variables_binding() {
        let dir = tempdir().unwrap();
        let store = Arc::new(WorldVariables::open("w", dir.path().join("variables.json")));
        let api = api_with(Arc::new(RecordingHost::default()), Arc::new(HostTasks::new()));
        let bindings = Bindings {
            world: Some(store.clone()),
            ..Bindings::default()
        };
        evaluate(
            &api,
            job(bindings, None),
            "assert(world == 'w')\nvariables:set('visits', 5)\nvariables:set('tag', 'gate')",
        )
        .unwrap();
        assert_eq!(store.get("visits").and_then(|v| v.as_f64()), Some(5.0));
        assert_eq!(store.get("tag"), Some(serde_json::json!("gate")));
    }

    #[test]
    fn test_dungeon_binding() {
        let dir = tempdir().unwrap();
        let area = Area::new(BlockPos::new(0, 0, 0), BlockPos::new(5, 5, 5));
        let file = InstanceFile::new(dir.path().join("config.json"), InstanceConfig::new("w", area));
        let instance = Instance::new("crypt", file, Weak::new());
        let api = api_with(Arc::new(RecordingHost::default()), Arc::new(HostTasks::new()));
        let bindings = Bindings {
            instance: Some(instance.clone()),
            ..Bindings::default()
        };
        evaluate(
            &api,
            job(bindings, None),
            "assert(dungeon.name == 'crypt')\nassert(not dungeon:is_active())\ndungeon:set_temp_variable('wave', 3)",
        )
        .unwrap();
        assert_eq!(
            instance.get_temp_variable("wave").and_then(|v| v.as_f64()),
            Some(3.0)
        );
    }

    #[test]
    fn test_extra_bindings_and_item_drop() {
        let tasks = Arc::new(HostTasks::new());
        let api = api_with(Arc::new(RecordingHost::default()), tasks.clone());
        let bindings = Bindings {
            extra: vec![("entity".to_string(), serde_json::json!("zombie"))],
            ..Bindings::default()
        };
        let source = r#"
            assert(entity == 'zombie')
            local drop = sm:create_item_drop({world = 'w', x = 1, y = 2, z = 3}, {gold = 1, dirt = 3})
            assert(drop:run(3) == 3)
        "#;
        evaluate(&api, job(bindings, None), source).unwrap();
        assert_eq!(tasks.pending(), 3);
    }

    #[test]
    fn test_participant_argument_accepts_uuid_string() {
        let host = Arc::new(RecordingHost::default());
        let api = api_with(host.clone(), Arc::new(HostTasks::new()));
        let p = Uuid::new_v4();
        let source = format!(
            "local other = sm:get_player('{p}')\nother:send_message(sm:get_player_state(other))"
        );
        evaluate(&api, job(Bindings::default(), None), &source).unwrap();
        assert_eq!(*host.messages.lock().unwrap(), vec![(p, "None".to_string())]);
    }
}
