//! Declarative mapping from resource fields to control-file writes.
//!
//! Each [`Rule`] inspects one resource sub-record and appends the writes
//! for whichever of its fields are present. Absent fields produce nothing.

use runlet_common::error::{Result, RunletError};
use runlet_common::spec::Resources;

use super::memory::limit_value;
use super::{ControlWrite, cpu, io, memory};

/// One entry of the resource table.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    /// Resource sub-record the rule reads.
    pub resource: &'static str,
    /// Appends the writes for the present fields.
    pub collect: fn(&Resources, &mut Vec<ControlWrite>) -> Result<()>,
}

/// Every rule, in the order their writes are applied.
///
/// `unified` comes last so raw writes can override the typed fields.
pub const RULES: &[Rule] = &[
    Rule { resource: "memory", collect: memory::collect },
    Rule { resource: "cpu", collect: cpu::collect },
    Rule { resource: "pids", collect: pids },
    Rule { resource: "blockIO", collect: io::collect },
    Rule { resource: "hugepageLimits", collect: hugepages },
    Rule { resource: "network", collect: network },
    Rule { resource: "rdma", collect: rdma },
    Rule { resource: "devices", collect: devices },
    Rule { resource: "unified", collect: unified },
];

/// Turns resource limits into the full, validated list of writes.
///
/// # Errors
///
/// Returns the first validation error any rule reports.
pub fn plan(resources: &Resources) -> Result<Vec<ControlWrite>> {
    let mut writes = Vec::new();
    for rule in RULES {
        (rule.collect)(resources, &mut writes)?;
    }
    Ok(writes)
}

#[allow(clippy::unnecessary_wraps)]
fn pids(resources: &Resources, out: &mut Vec<ControlWrite>) -> Result<()> {
    if let Some(pids) = resources.pids {
        out.push(ControlWrite::new("pids.max", limit_value(pids.limit)));
    }
    Ok(())
}

fn hugepages(resources: &Resources, out: &mut Vec<ControlWrite>) -> Result<()> {
    for limit in &resources.hugepage_limits {
        if limit.page_size.is_empty() || limit.page_size.contains('/') {
            return Err(RunletError::validation(format!(
                "invalid hugepage size {:?}",
                limit.page_size
            )));
        }
        out.push(ControlWrite::new(
            format!("hugetlb.{}.max", limit.page_size),
            limit.limit.to_string(),
        ));
    }
    Ok(())
}

#[allow(clippy::unnecessary_wraps)]
fn network(resources: &Resources, out: &mut Vec<ControlWrite>) -> Result<()> {
    let Some(network) = &resources.network else {
        return Ok(());
    };
    if let Some(class_id) = network.class_id {
        out.push(ControlWrite::new("net_cls.classid", class_id.to_string()));
    }
    for prio in &network.priorities {
        out.push(ControlWrite::new(
            "net_prio.ifpriomap",
            format!("{} {}", prio.name, prio.priority),
        ));
    }
    Ok(())
}

fn rdma(resources: &Resources, out: &mut Vec<ControlWrite>) -> Result<()> {
    for (device, limits) in &resources.rdma {
        if device.is_empty() || device.contains('/') {
            return Err(RunletError::validation(format!("invalid rdma device {device:?}")));
        }
        if let Some(handles) = limits.hca_handles {
            out.push(ControlWrite::new(
                format!("rdma.{device}.hca_handle.max"),
                handles.to_string(),
            ));
        }
        if let Some(objects) = limits.hca_objects {
            out.push(ControlWrite::new(
                format!("rdma.{device}.hca_object.max"),
                objects.to_string(),
            ));
        }
    }
    Ok(())
}

#[allow(clippy::unnecessary_wraps)]
fn devices(resources: &Resources, out: &mut Vec<ControlWrite>) -> Result<()> {
    let number = |n: Option<i64>| n.map_or_else(|| "*".to_string(), |n| n.to_string());
    for rule in resources.devices.iter().filter(|d| d.allow) {
        out.push(ControlWrite::new(
            "cgroup.devices.allow",
            format!(
                "{} {}:{} {}",
                rule.kind.as_deref().unwrap_or("a"),
                number(rule.major),
                number(rule.minor),
                rule.access.as_deref().unwrap_or("rwm"),
            ),
        ));
    }
    Ok(())
}

fn unified(resources: &Resources, out: &mut Vec<ControlWrite>) -> Result<()> {
    for (key, value) in &resources.unified {
        if key.is_empty() || key.contains('/') || key == "." || key == ".." {
            return Err(RunletError::validation(format!(
                "unified key {key:?} is not a control file name"
            )));
        }
        out.push(ControlWrite::new(key.as_str(), value.as_str()));
    }
    Ok(())
}
