//! `runlet spec`: Write a starting-point `config.json`.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use runlet_common::constants;
use runlet_common::spec::Spec;

/// Arguments for the `spec` command.
#[derive(Args, Debug)]
pub struct SpecArgs {
    /// Bundle directory to write `config.json` into.
    #[arg(short, long, default_value = ".")]
    pub bundle: PathBuf,
}

/// Executes the `spec` command.
///
/// # Errors
///
/// Returns an error if `config.json` already exists or cannot be written.
pub fn execute(args: &SpecArgs) -> anyhow::Result<()> {
    let path = args.bundle.join(constants::CONFIG_FILE);
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }
    let content = serde_json::to_string_pretty(&Spec::example())?;
    std::fs::write(&path, content + "\n")
        .with_context(|| format!("writing {}", path.display()))?;
    tracing::info!(path = %path.display(), "spec written");
    Ok(())
}
