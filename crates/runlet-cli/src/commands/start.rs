//! `runlet start`: Start the user process of a created container.

use clap::Args;
use runlet_common::types::ContainerId;
use runlet_runtime::Runtime;

/// Arguments for the `start` command.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Container ID.
    pub id: String,
}

/// Executes the `start` command.
///
/// # Errors
///
/// Returns an error if the container is not `created` or cannot be started.
pub fn execute(runtime: &Runtime, args: &StartArgs) -> anyhow::Result<()> {
    let id = ContainerId::parse(args.id.as_str())?;
    let _ = runtime.start(&id)?;
    Ok(())
}
