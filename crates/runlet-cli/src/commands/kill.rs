//! `runlet kill`: Send a signal to the container process.

use std::str::FromStr;

use clap::Args;
use nix::sys::signal::Signal;
use runlet_common::error::RunletError;
use runlet_common::types::ContainerId;
use runlet_runtime::Runtime;

/// Arguments for the `kill` command.
#[derive(Args, Debug)]
pub struct KillArgs {
    /// Container ID.
    pub id: String,

    /// Signal number or name (`9`, `KILL`, `SIGKILL`).
    #[arg(default_value = "SIGTERM", value_parser = parse_signal)]
    pub signal: Signal,
}

/// Parses a signal given as a number or a name, with or without `SIG`.
///
/// # Errors
///
/// Returns a validation error for unknown signals.
pub fn parse_signal(value: &str) -> Result<Signal, RunletError> {
    let invalid = || RunletError::validation(format!("unknown signal {value:?}"));
    if let Ok(number) = value.parse::<i32>() {
        return Signal::try_from(number).map_err(|_| invalid());
    }
    let name = value.to_ascii_uppercase();
    let name = if name.starts_with("SIG") {
        name
    } else {
        format!("SIG{name}")
    };
    Signal::from_str(&name).map_err(|_| invalid())
}

/// Executes the `kill` command.
///
/// # Errors
///
/// Returns an error if the container has no live process or the signal
/// cannot be delivered.
pub fn execute(runtime: &Runtime, args: &KillArgs) -> anyhow::Result<()> {
    let id = ContainerId::parse(args.id.as_str())?;
    runtime.kill(&id, args.signal)?;
    Ok(())
}
