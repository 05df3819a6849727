//! CLI command definitions and dispatch.

pub mod create;
pub mod delete;
pub mod init;
pub mod kill;
pub mod spec;
pub mod start;
pub mod state;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use runlet_common::config::RuntimeConfig;
use runlet_common::constants;
use runlet_runtime::Runtime;

/// runlet, a minimal OCI container runtime.
#[derive(Parser, Debug)]
#[command(name = "runlet", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Directory holding per-container state.
    #[arg(long, global = true, env = constants::STATE_ROOT_ENV)]
    pub root: Option<PathBuf>,

    /// Cgroup directory under which container cgroups are created.
    #[arg(long, global = true, env = constants::CGROUP_ROOT_ENV)]
    pub cgroup_root: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `runlet_runtime=trace`. Overrides `RUST_LOG`.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Formats for log lines written to stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a container from a bundle, leaving its process stopped.
    Create(create::CreateArgs),
    /// Start the user process of a created container.
    Start(start::StartArgs),
    /// Send a signal to the container process.
    Kill(kill::KillArgs),
    /// Delete a stopped container.
    Delete(delete::DeleteArgs),
    /// Print the state of a container as JSON.
    State(state::StateArgs),
    /// Write a starting-point config.json into a bundle.
    Spec(spec::SpecArgs),
    /// Container init entry point, run inside the new namespaces.
    #[command(hide = true)]
    Init(init::InitArgs),
}

impl Cli {
    /// Runtime configuration from the environment, overridden by flags.
    #[must_use]
    pub fn runtime_config(&self) -> RuntimeConfig {
        let mut config = RuntimeConfig::from_env();
        if let Some(root) = &self.root {
            config.state_root.clone_from(root);
        }
        if let Some(root) = &self.cgroup_root {
            config.cgroup_root.clone_from(root);
        }
        config
    }
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let runtime = || Runtime::new(cli.runtime_config());
    match cli.command {
        Command::Create(ref args) => create::execute(&runtime(), args),
        Command::Start(ref args) => start::execute(&runtime(), args),
        Command::Kill(ref args) => kill::execute(&runtime(), args),
        Command::Delete(ref args) => delete::execute(&runtime(), args),
        Command::State(ref args) => state::execute(&runtime(), args),
        Command::Spec(ref args) => spec::execute(args),
        Command::Init(ref args) => init::execute(args),
    }
}
