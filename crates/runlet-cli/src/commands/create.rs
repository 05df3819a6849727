//! `runlet create`: Create a container from a bundle.

use std::path::PathBuf;

use clap::Args;
use runlet_common::types::ContainerId;
use runlet_runtime::Runtime;

/// Arguments for the `create` command.
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Unique container ID.
    pub id: String,

    /// Bundle directory containing `config.json`.
    pub bundle: PathBuf,
}

/// Executes the `create` command.
///
/// # Errors
///
/// Returns an error if the ID is invalid or creation fails.
pub fn execute(runtime: &Runtime, args: &CreateArgs) -> anyhow::Result<()> {
    let id = ContainerId::parse(args.id.as_str())?;
    let state = runtime.create(&id, &args.bundle)?;
    tracing::info!(id = %id, pid = state.pid, "created");
    Ok(())
}
