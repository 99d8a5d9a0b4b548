//! `homelab-inventory`: resolve an inventory once and print what the
//! service adapters would see.

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use homelab_inventory::InventoryConfig;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Inspect a homelab inventory: merged host vars, capabilities and enums
#[derive(Parser, Debug)]
#[command(name = "homelab-inventory", version, about, long_about = None)]
struct Cli {
    /// Inventory document (overrides the config file)
    #[arg(short, long, env = "ANSIBLE_INVENTORY_PATH", global = true)]
    inventory: Option<PathBuf>,

    /// Resolver configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log level when RUST_LOG is not set
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Print JSON instead of plain text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve the inventory and report whether it loads
    Check,

    /// List hosts, optionally filtered by group or capability
    Hosts {
        /// Only hosts in this group (nested groups included)
        #[arg(long, conflicts_with = "capability")]
        group: Option<String>,

        /// Only hosts with this capability
        #[arg(long)]
        capability: Option<String>,
    },

    /// List groups with their parents, children and hosts
    Groups,

    /// Show the merged variables of one host
    Host {
        /// Host name (case-insensitive)
        name: String,
    },

    /// Show which hosts carry each capability
    Capabilities,

    /// Print the sorted enum lists used for tool parameters
    Enums,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}

fn load_config(cli: &Cli) -> Result<InventoryConfig> {
    let config = match &cli.config {
        Some(path) => InventoryConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path))?,
        None => InventoryConfig::default(),
    };
    let mut config = config.with_env_overrides();
    if let Some(path) = &cli.inventory {
        config.path = Some(path.clone());
    }
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = load_config(&cli)?;
    debug!(path = ?config.path, mode = ?config.mode, "Resolved CLI configuration");

    let handle = config.open().context("no inventory configured")?;
    let snapshot = handle
        .ensure_loaded()
        .with_context(|| format!("failed to load {}", handle.cache().source().describe()))?;

    let output = commands::Output { json: cli.json };
    let rendered = match cli.command {
        Command::Check => commands::check(&snapshot, output),
        Command::Hosts { group, capability } => {
            commands::hosts(&snapshot, group.as_deref(), capability.as_deref(), output)
        }
        Command::Groups => commands::groups(&snapshot, output),
        Command::Host { name } => commands::host(&snapshot, &name, output),
        Command::Capabilities => commands::capabilities(&snapshot, output),
        Command::Enums => commands::enums(&snapshot, output),
    }?;
    println!("{}", rendered);
    Ok(())
}
