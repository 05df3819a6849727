//! I/O resource control via cgroups v2.
//!
//! Manages `io.weight` and per-device `io.max` bandwidth caps.

use runlet_common::error::{Result, RunletError};
use runlet_common::spec::Resources;

use super::ControlWrite;

/// Accepted range for `io.weight`.
pub const IO_WEIGHT_RANGE: std::ops::RangeInclusive<u16> = 10..=1000;

/// Collects block I/O control-file writes.
///
/// # Errors
///
/// Returns a validation error if the weight is outside 10..=1000.
pub fn collect(resources: &Resources, out: &mut Vec<ControlWrite>) -> Result<()> {
    let Some(block_io) = &resources.block_io else {
        return Ok(());
    };
    if let Some(weight) = block_io.weight {
        if !IO_WEIGHT_RANGE.contains(&weight) {
            return Err(RunletError::validation(format!(
                "blockIO weight {weight} out of range 10-1000"
            )));
        }
        out.push(ControlWrite::new("io.weight", weight.to_string()));
    }
    for dev in &block_io.throttle_read_bps_device {
        out.push(ControlWrite::new(
            "io.max",
            format!("{}:{} rbps={}", dev.major, dev.minor, dev.rate),
        ));
    }
    for dev in &block_io.throttle_write_bps_device {
        out.push(ControlWrite::new(
            "io.max",
            format!("{}:{} wbps={}", dev.major, dev.minor, dev.rate),
        ));
    }
    Ok(())
}
