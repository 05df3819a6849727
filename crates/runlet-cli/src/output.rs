//! Output helpers for CLI commands.
//!
//! Machine-readable results go to stdout; everything else is logged to
//! stderr.

use std::io::Write;

use serde::Serialize;

/// Writes `value` to stdout as pretty-printed JSON followed by a newline.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}

/// Single-line form of an error chain, as printed before exiting.
#[must_use]
pub fn error_line(err: &anyhow::Error) -> String {
    format!("{}: {err:#}", runlet_common::constants::APP_NAME).replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_line_is_single_line_with_context() {
        let err = anyhow::anyhow!("root cause\nsecond line").context("creating c1");
        assert_eq!(error_line(&err), "runlet: creating c1: root cause second line");
    }
}
