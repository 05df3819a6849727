//! `runlet state`: Print a container's state.

use clap::Args;
use runlet_common::types::ContainerId;
use runlet_runtime::Runtime;

use crate::output;

/// Arguments for the `state` command.
#[derive(Args, Debug)]
pub struct StateArgs {
    /// Container ID.
    pub id: String,
}

/// Executes the `state` command, writing the state JSON to stdout.
///
/// # Errors
///
/// Returns an error if the container does not exist.
pub fn execute(runtime: &Runtime, args: &StateArgs) -> anyhow::Result<()> {
    let id = ContainerId::parse(args.id.as_str())?;
    let state = runtime.state(&id)?;
    output::print_json(&state)
}
