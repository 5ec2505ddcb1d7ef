//! Script scaffolding commands.

use anyhow::Result;
use partydungeons::config::RuntimeConfig;
use partydungeons::layout::{category_dir, is_valid_name};
use partydungeons::scripts::{ScriptCategory, ScriptWriter};
use partydungeons::{BlockPos, DungeonError};

fn writer(category: ScriptCategory, id: &str, author: Option<&str>) -> ScriptWriter {
    let mut writer = ScriptWriter::new(category);
    if let Some(author) = author {
        writer = writer.author(author);
    }
    if matches!(category, ScriptCategory::Interact | ScriptCategory::Walk) {
        if let Ok(block) = BlockPos::parse_id(id) {
            writer = writer.block(block);
        }
    }
    writer
}

pub fn cmd_create_script(
    config: RuntimeConfig,
    name: &str,
    category: &str,
    id: &str,
    author: Option<&str>,
) -> Result<()> {
    let category: ScriptCategory = category.parse()?;
    if !is_valid_name(name) {
        return Err(DungeonError::InvalidName(name.to_string()).into());
    }
    if !config.layout.instance_config(name).is_file() {
        return Err(DungeonError::UnknownInstance(name.to_string()).into());
    }
    let dir = category_dir(&config.layout.instance_scripts(name), category);
    let path = writer(category, id, author).write(&dir, id)?;
    println!("Created {}", path.display());
    Ok(())
}

pub fn cmd_create_world_script(
    config: RuntimeConfig,
    world: &str,
    category: &str,
    id: &str,
    author: Option<&str>,
) -> Result<()> {
    let category: ScriptCategory = category.parse()?;
    if !is_valid_name(world) {
        anyhow::bail!("Invalid world name '{}'", world);
    }
    let dir = category_dir(&config.layout.world_scripts(world), category);
    let path = writer(category, id, author).for_world().write(&dir, id)?;
    println!("Created {}", path.display());
    Ok(())
}
