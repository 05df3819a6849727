//! `runlet delete`: Remove a stopped container.

use clap::Args;
use runlet_common::types::ContainerId;
use runlet_runtime::Runtime;

/// Arguments for the `delete` command.
#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Container ID.
    pub id: String,
}

/// Executes the `delete` command.
///
/// # Errors
///
/// Returns an error if the container is not `stopped` or cleanup fails.
pub fn execute(runtime: &Runtime, args: &DeleteArgs) -> anyhow::Result<()> {
    let id = ContainerId::parse(args.id.as_str())?;
    runtime.delete(&id)?;
    Ok(())
}
