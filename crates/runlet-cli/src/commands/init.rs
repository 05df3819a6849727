//! `runlet init`: In-container entry point after re-exec.

use std::path::PathBuf;

use clap::Args;
use runlet_runtime::init::child;

/// Arguments for the hidden `init` command.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// The container's state directory.
    pub metadata_dir: PathBuf,
}

/// Executes the `init` command. Only returns on failure.
///
/// # Errors
///
/// Returns the setup step that failed before the user command could run.
pub fn execute(args: &InitArgs) -> anyhow::Result<()> {
    match child::run(&args.metadata_dir) {
        Err(e) => Err(e.into()),
    }
}
