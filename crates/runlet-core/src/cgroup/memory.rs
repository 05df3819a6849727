//! Memory resource control via cgroups v2.
//!
//! Manages `memory.max`, `memory.low`, and `memory.swap.max`.

use runlet_common::error::Result;
use runlet_common::spec::Resources;

use super::ControlWrite;

/// Formats a byte limit; negative values mean unlimited.
pub(super) fn limit_value(bytes: i64) -> String {
    if bytes < 0 {
        "max".to_string()
    } else {
        bytes.to_string()
    }
}

/// Collects memory control-file writes.
///
/// # Errors
///
/// Never fails; the signature matches the other rules.
#[allow(clippy::unnecessary_wraps)]
pub fn collect(resources: &Resources, out: &mut Vec<ControlWrite>) -> Result<()> {
    let Some(memory) = &resources.memory else {
        return Ok(());
    };
    if let Some(limit) = memory.limit {
        out.push(ControlWrite::new("memory.max", limit_value(limit)));
    }
    if let Some(reservation) = memory.reservation {
        out.push(ControlWrite::new("memory.low", limit_value(reservation)));
    }
    if let Some(swap) = memory.swap {
        out.push(ControlWrite::new("memory.swap.max", limit_value(swap)));
    }
    if memory.swappiness.is_some() {
        tracing::warn!("memory swappiness has no cgroup v2 control file, ignoring");
    }
    Ok(())
}
