//! CLI argument definitions using clap derive

use crate::inspection::ToolKind;
use crate::session::SessionMode;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// vmprobe - VM snapshot guest inspection
///
/// Exposes vSphere snapshot disks over NBD and inspects them with
/// libguestfs tools, caching results per VM and snapshot.
#[derive(Parser, Debug)]
#[command(name = "vmprobe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "VMPROBE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inspect the guest OS of a VM snapshot
    Inspect(InspectArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Arguments for the inspect command
#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// VM name
    #[arg(long)]
    pub vm: String,

    /// Snapshot name
    #[arg(long)]
    pub snapshot: String,

    /// Datacenter holding the VM (required in shared mode)
    #[arg(long, default_value = "")]
    pub datacenter: String,

    /// VM managed object reference, e.g. vm-42
    #[arg(long, default_value = "")]
    pub vm_moref: String,

    /// Snapshot managed object reference, e.g. snapshot-7
    #[arg(long, default_value = "")]
    pub snapshot_moref: String,

    /// Base disk path, repeat for each disk in order
    #[arg(long = "disk", value_name = "PATH")]
    pub disks: Vec<String>,

    /// Inspection tool
    #[arg(long, value_enum, default_value_t = ToolKind::VirtInspector)]
    pub tool: ToolKind,

    /// Session strategy (overrides config)
    #[arg(long, value_enum)]
    pub mode: Option<SessionMode>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Config action
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}
