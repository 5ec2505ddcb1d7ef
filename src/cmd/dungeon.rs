//! Dungeon listing, recovery check, creation and settings.

use std::sync::Arc;

use anyhow::{Context, Result};
use partydungeons::config::RuntimeConfig;
use partydungeons::host::OfflineHost;
use partydungeons::instance::{InstanceFile, UNLIMITED};
use partydungeons::{Area, DungeonError, Registry, Services};

use super::super::Setting;

fn limit(value: i32) -> String {
    if value == UNLIMITED {
        "unlimited".to_string()
    } else {
        value.to_string()
    }
}

fn load_file(config: &RuntimeConfig, name: &str) -> Result<InstanceFile> {
    InstanceFile::load(&config.layout.instance_config(name))?
        .ok_or_else(|| DungeonError::UnknownInstance(name.to_string()).into())
}

fn offline_registry(config: RuntimeConfig) -> Result<Arc<Registry>> {
    Registry::new(config, Services::new(Arc::new(OfflineHost)))
        .context("Failed to start dungeon registry")
}

pub fn cmd_list(config: RuntimeConfig) -> Result<()> {
    let names = config.layout.discover_instances();
    if names.is_empty() {
        println!("No dungeons found under {}", config.layout.dungeons_dir().display());
        return Ok(());
    }

    println!(
        "{:<20} {:<12} {:<10} {:<12} {:<12} Area",
        "Dungeon", "World", "Max party", "Daily clear", "Status"
    );
    for name in names {
        let file = match load_file(&config, &name) {
            Ok(file) => file,
            Err(e) => {
                println!("{:<20} unreadable: {}", name, e);
                continue;
            }
        };
        let data = &file.data;
        let status = if data.party.is_empty() {
            "idle"
        } else {
            "interrupted"
        };
        println!(
            "{:<20} {:<12} {:<10} {:<12} {:<12} {}",
            name,
            data.world_name,
            limit(data.max_party),
            limit(data.daily_clear),
            status,
            data.area().pretty()
        );
    }
    Ok(())
}

pub fn cmd_check(config: RuntimeConfig) -> Result<()> {
    let registry = offline_registry(config)?;
    let loaded = registry.init();
    let ledger = registry.ledger().snapshot();

    println!("Loaded {} dungeon(s)", loaded);
    if ledger.offline_players.is_empty() {
        println!("No participants awaiting recovery");
    } else {
        println!("Participants awaiting recovery:");
        for (participant, instance) in &ledger.offline_players {
            println!("  {} -> {}", participant, instance);
        }
    }
    registry.shutdown();
    Ok(())
}

pub fn cmd_create(config: RuntimeConfig, name: &str, world: &str, area: &str) -> Result<()> {
    let area = Area::parse_id(area)?;
    let registry = offline_registry(config)?;
    let instance = registry.create_instance(name, world, area)?;
    println!(
        "Created dungeon {} in {} covering {}",
        instance.name(),
        world,
        area.pretty()
    );
    registry.shutdown();
    Ok(())
}

pub fn cmd_settings(
    config: RuntimeConfig,
    name: &str,
    setting: Setting,
    value: Option<i32>,
) -> Result<()> {
    let mut file = load_file(&config, name)?;
    let label = match setting {
        Setting::MaxParty => "max-party",
        Setting::DailyClear => "daily-clear",
    };
    let Some(value) = value else {
        let current = match setting {
            Setting::MaxParty => file.data.max_party,
            Setting::DailyClear => file.data.daily_clear,
        };
        println!("{} {} = {}", name, label, limit(current));
        return Ok(());
    };

    match setting {
        Setting::MaxParty => file.data.set_max_party(value),
        Setting::DailyClear => file.data.set_daily_clear(value),
    }
    file.save()?;
    let stored = match setting {
        Setting::MaxParty => file.data.max_party,
        Setting::DailyClear => file.data.daily_clear,
    };
    println!("{} {} set to {}", name, label, limit(stored));
    Ok(())
}
