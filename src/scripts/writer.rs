//! Script file scaffolding for authors.

use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use dungeon_common::{Area, BlockPos};
use tracing::{debug, info};

use crate::errors::ScriptError;
use crate::instance::InstanceHook;
use crate::layout::{category_dir, is_valid_script_id, script_file};
use crate::scripts::{ScriptCategory, WORLD_BINDINGS, bindings_for};

pub const DEFAULT_AUTHOR: &str = "CONSOLE";

fn binding_type(name: &str) -> &'static str {
    match name {
        "sm" => "ScriptManager",
        "player" => "Player",
        "dungeon" => "Dungeon",
        "variables" => "WorldVariables",
        "world" => "World",
        _ => "Value",
    }
}

/// Writes a new script with a documented header and a `main()` skeleton.
#[derive(Debug, Clone)]
pub struct ScriptWriter {
    author: String,
    category: ScriptCategory,
    block: Option<BlockPos>,
    description: Option<String>,
    body: Option<String>,
    world_bindings: bool,
    player: bool,
}

impl ScriptWriter {
    pub fn new(category: ScriptCategory) -> Self {
        Self {
            author: DEFAULT_AUTHOR.to_string(),
            category,
            block: None,
            description: None,
            body: None,
            world_bindings: false,
            player: false,
        }
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// Block the script belongs to (interact and walk scripts).
    pub fn block(mut self, block: BlockPos) -> Self {
        self.block = Some(block);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Replaces the greeting inside `main()`.
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// The script runs with a participant bound.
    pub fn with_player(mut self) -> Self {
        self.player = true;
        self
    }

    /// Use the bindings of a world-directory script.
    pub fn for_world(mut self) -> Self {
        self.world_bindings = true;
        self
    }

    fn bindings(&self) -> Vec<&'static str> {
        let mut names = if self.world_bindings {
            WORLD_BINDINGS.to_vec()
        } else {
            bindings_for(self.category).to_vec()
        };
        if self.player && !names.contains(&"player") {
            names.push("player");
        }
        names
    }

    /// Script text for `id`.
    pub fn render(&self, id: &str) -> String {
        let area = match self.category {
            ScriptCategory::AreaWalk => Area::parse_id(id).ok().map(|a| a.pretty()),
            _ => None,
        };
        let bindings = self.bindings();
        let has_player = bindings.contains(&"player");
        let tag = self.category.header_tag();

        let mut out = String::new();
        let subject = match (&area, &self.block) {
            (Some(area), _) => format!(" for AREA {area}"),
            (None, Some(block)) => format!(" for BLOCK {}", block.pretty()),
            (None, None) => String::new(),
        };
        let _ = writeln!(out, "--[[");
        let _ = writeln!(out, "  {tag} type script{subject}");
        let description = self
            .description
            .as_deref()
            .unwrap_or("Describe what the script does here.");
        let _ = writeln!(out, "  {description}");
        let _ = writeln!(out);
        let _ = writeln!(out, "  {:<12} {}", "@author", self.author);
        let _ = writeln!(out, "  {:<12} {}", "@version", "0.1");
        let _ = writeln!(out, "  {:<12} {}", "@type", tag);
        match (&area, &self.block) {
            (Some(area), _) => {
                let _ = writeln!(out, "  {:<12} {}", "@block", area);
            }
            (None, Some(block)) => {
                let _ = writeln!(out, "  {:<12} {}, {}, {}", "@block", block.x, block.y, block.z);
            }
            (None, None) => {}
        }
        if !bindings.is_empty() {
            let _ = writeln!(out);
        }
        for name in &bindings {
            let _ = writeln!(
                out,
                "  @param {:<17} {:<10} SCRIPT BINDING",
                format!("{{{}}}", binding_type(name)),
                name
            );
        }
        let _ = writeln!(out, "]]");

        let greeting = match (&area, &self.block) {
            (Some(area), _) => format!("Hello World, from area {area}!"),
            (None, Some(block)) => format!("Hello World, from block {}!", block.pretty()),
            (None, None) => "Hello World!".to_string(),
        };
        let _ = writeln!(out, "function main()");
        if let Some(body) = &self.body {
            for line in body.lines() {
                let _ = writeln!(out, "  {line}");
            }
        } else if area.is_some() {
            let _ = writeln!(out, "  -- Runs whenever a player enters or leaves the area.");
            let _ = writeln!(out, "  -- sm:log(\"INFO\", \"{greeting}\")");
            if has_player {
                let _ = writeln!(out, "  -- player:send_message(\"{greeting}\")");
            }
        } else {
            let _ = writeln!(out, "  sm:log(\"INFO\", \"{greeting}\")");
            if has_player {
                let _ = writeln!(out, "  player:send_message(\"{greeting}\")");
            }
        }
        let _ = writeln!(out, "end");
        let _ = writeln!(out);
        let _ = writeln!(out, "main()");

        if let Some(area) = &area {
            let _ = writeln!(out);
            let _ = writeln!(out, "-- Called when a player enters the area. Do not remove.");
            let _ = writeln!(out, "function _enter()");
            let _ = writeln!(out, "  player:send_message(\"Entered Area {area}\")");
            let _ = writeln!(out, "end");
            let _ = writeln!(out);
            let _ = writeln!(out, "-- Called when a player leaves the area. Do not remove.");
            let _ = writeln!(out, "function _exit()");
            let _ = writeln!(out, "  player:send_message(\"Exited Area {area}\")");
            let _ = writeln!(out, "end");
        }
        out
    }

    /// Writes `<dir>/<id>.lua`. Never overwrites an existing file.
    pub fn write(&self, dir: &Path, id: &str) -> Result<PathBuf, ScriptError> {
        if !is_valid_script_id(id) {
            return Err(ScriptError::InvalidId(id.to_string()));
        }
        let path = script_file(dir, ScriptCategory::Uncategorized, id);
        fs::create_dir_all(dir).map_err(|e| ScriptError::Write {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(ScriptError::AlreadyExists { path });
            }
            Err(e) => return Err(ScriptError::Write { path, source: e }),
        };
        file.write_all(self.render(id).as_bytes())
            .map_err(|e| ScriptError::Write {
                path: path.clone(),
                source: e,
            })?;
        info!(script = %path.display(), category = %self.category, "Script created");
        Ok(path)
    }
}

/// Writes the instance hook scripts missing under `scripts_root`.
/// Returns how many were created.
pub fn write_default_hooks(scripts_root: &Path) -> Result<usize, ScriptError> {
    let dir = category_dir(scripts_root, ScriptCategory::Instance);
    let mut created = 0;
    for hook in InstanceHook::all() {
        let mut writer = ScriptWriter::new(ScriptCategory::Instance).description(hook.describe());
        if hook.has_participant() {
            writer = writer.with_player();
        }
        if let Some(body) = hook.default_body() {
            writer = writer.body(body);
        }
        match writer.write(&dir, hook.script_id()) {
            Ok(_) => created += 1,
            Err(ScriptError::AlreadyExists { path }) => {
                debug!(script = %path.display(), "Hook script already present");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(created)
}
