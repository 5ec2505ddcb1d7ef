use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "partydungeons")]
#[command(version, about = "Administer party dungeons on disk")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Plugin root holding dungeon/, worlds/ and scripts/ (defaults to the current directory)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List dungeons and their settings
    List,
    /// Load every dungeon, recovering interrupted sessions
    Check,
    /// Create a new dungeon
    Create {
        name: String,
        /// World the dungeon lives in
        #[arg(long)]
        world: String,
        /// Bounding box as x_y_z~x_y_z
        #[arg(long)]
        area: String,
    },
    /// Show or change a dungeon setting
    Settings {
        name: String,
        setting: Setting,
        /// New value; -1 means unlimited
        #[arg(allow_negative_numbers = true)]
        value: Option<i32>,
    },
    /// Create a script in a dungeon's script directory
    CreateScript {
        name: String,
        category: String,
        id: String,
        #[arg(long)]
        author: Option<String>,
    },
    /// Create a script in a world's script directory
    CreateWorldScript {
        world: String,
        category: String,
        id: String,
        #[arg(long)]
        author: Option<String>,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Setting {
    MaxParty,
    DailyClear,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let root = match cli.root.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let config = partydungeons::config::RuntimeConfig::load(root, cli.verbose)?;
    partydungeons::logging::init(&config.logging);

    match &cli.command {
        Commands::List => cmd::cmd_list(config)?,
        Commands::Check => cmd::cmd_check(config)?,
        Commands::Create { name, world, area } => cmd::cmd_create(config, name, world, area)?,
        Commands::Settings {
            name,
            setting,
            value,
        } => cmd::cmd_settings(config, name, *setting, *value)?,
        Commands::CreateScript {
            name,
            category,
            id,
            author,
        } => cmd::cmd_create_script(config, name, category, id, author.as_deref())?,
        Commands::CreateWorldScript {
            world,
            category,
            id,
            author,
        } => cmd::cmd_create_world_script(config, world, category, id, author.as_deref())?,
    }

    Ok(())
}
