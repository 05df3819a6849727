//! CPU resource control via cgroups v2.
//!
//! Manages `cpu.max`, `cpu.weight`, `cpuset.cpus`, and `cpuset.mems`.

use runlet_common::error::Result;
use runlet_common::spec::Resources;

use super::ControlWrite;

/// Formats the `cpu.max` value from an optional quota and period.
///
/// Whichever half is missing (or a negative quota) is written as `max`.
#[must_use]
pub fn cpu_max(quota: Option<i64>, period: Option<u64>) -> Option<String> {
    let quota = quota.map(|q| if q < 0 { "max".to_string() } else { q.to_string() });
    match (quota, period) {
        (Some(q), Some(p)) => Some(format!("{q} {p}")),
        (Some(q), None) => Some(format!("{q} max")),
        (None, Some(p)) => Some(format!("max {p}")),
        (None, None) => None,
    }
}

/// Collects CPU and cpuset control-file writes.
///
/// # Errors
///
/// Never fails; the signature matches the other rules.
#[allow(clippy::unnecessary_wraps)]
pub fn collect(resources: &Resources, out: &mut Vec<ControlWrite>) -> Result<()> {
    let Some(cpu) = &resources.cpu else {
        return Ok(());
    };
    if let Some(shares) = cpu.shares {
        out.push(ControlWrite::new("cpu.weight", shares.to_string()));
    }
    if let Some(value) = cpu_max(cpu.quota, cpu.period) {
        out.push(ControlWrite::new("cpu.max", value));
    }
    if let Some(cpus) = &cpu.cpus {
        out.push(ControlWrite::new("cpuset.cpus", cpus.as_str()));
    }
    if let Some(mems) = &cpu.mems {
        out.push(ControlWrite::new("cpuset.mems", mems.as_str()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use runlet_common::spec::Cpu;

    use super::*;

    #[test]
    fn cpu_max_covers_each_combination() {
        assert_eq!(cpu_max(Some(50_000), Some(100_000)).as_deref(), Some("50000 100000"));
        assert_eq!(cpu_max(Some(50_000), None).as_deref(), Some("50000 max"));
        assert_eq!(cpu_max(None, Some(100_000)).as_deref(), Some("max 100000"));
        assert_eq!(cpu_max(Some(-1), Some(100_000)).as_deref(), Some("max 100000"));
        assert_eq!(cpu_max(None, None), None);
    }

    #[test]
    fn collect_writes_present_fields_only() {
        let mut out = Vec::new();
        let resources = Resources {
            cpu: Some(Cpu {
                shares: Some(512),
                cpus: Some("0-1".into()),
                ..Cpu::default()
            }),
            ..Resources::default()
        };
        collect(&resources, &mut out).unwrap();
        assert_eq!(
            out,
            vec![
                ControlWrite::new("cpu.weight", "512"),
                ControlWrite::new("cpuset.cpus", "0-1"),
            ]
        );
    }
}
