//! UTS namespace isolation.
//!
//! Gives the container its own hostname.

use runlet_common::error::Result;

use crate::syscall::Syscall;

/// Sets the hostname inside the container's UTS namespace.
///
/// Without a private UTS namespace this would rename the host, so the
/// hostname is skipped with a warning in that case.
///
/// # Errors
///
/// Returns an error if `sethostname(2)` fails.
pub fn set_hostname(syscall: &dyn Syscall, hostname: &str, has_uts_namespace: bool) -> Result<()> {
    if !has_uts_namespace {
        tracing::warn!(hostname, "no UTS namespace requested, leaving hostname unchanged");
        return Ok(());
    }
    syscall.set_hostname(hostname)?;
    tracing::debug!(hostname, "container hostname set");
    Ok(())
}
