//! Linux section of the bundle configuration: namespaces, id maps, and
//! cgroup resources.
//!
//! Every resource field is independently optional. Absence means the
//! corresponding control file is left untouched, never written with zero.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Linux-specific container configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Linux {
    /// Namespaces to create for the init process.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<Namespace>,

    /// UID mappings for a user namespace.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uid_mappings: Vec<IdMapping>,

    /// GID mappings for a user namespace.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gid_mappings: Vec<IdMapping>,

    /// Cgroup resource limits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<Resources>,

    /// Cgroup path relative to the runtime's cgroup root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cgroups_path: Option<String>,

    /// Paths hidden from the container.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub masked_paths: Vec<String>,

    /// Paths remounted read-only inside the container.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub readonly_paths: Vec<String>,

    /// Seccomp profile. Accepted but not enforced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seccomp: Option<Seccomp>,
}

/// A namespace requested for the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    /// Namespace kind.
    #[serde(rename = "type")]
    pub kind: NamespaceKind,
    /// Existing namespace to join. Not supported; a fresh namespace is created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Namespace {
    /// A request for a fresh namespace of the given kind.
    #[must_use]
    pub const fn new(kind: NamespaceKind) -> Self {
        Self { kind, path: None }
    }
}

/// Linux namespace kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceKind {
    /// Process ID namespace.
    Pid,
    /// Hostname and domain name.
    Uts,
    /// System V IPC and POSIX message queues.
    Ipc,
    /// Network stack.
    Network,
    /// Mount table.
    Mount,
    /// Cgroup root view.
    Cgroup,
    /// Boot and monotonic clocks.
    Time,
    /// User and group IDs.
    User,
    /// Any kind this runtime does not recognize.
    #[serde(other)]
    Unknown,
}

/// A contiguous ID range mapped into a user namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdMapping {
    /// First ID inside the container.
    pub container_id: u32,
    /// First ID on the host.
    pub host_id: u32,
    /// Number of IDs in the range.
    pub size: u32,
}

/// Cgroup resource limits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resources {
    /// Device access rules.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<DeviceRule>,
    /// Memory limits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<Memory>,
    /// CPU limits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<Cpu>,
    /// Process count limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pids: Option<Pids>,
    /// Block I/O limits.
    #[serde(rename = "blockIO", skip_serializing_if = "Option::is_none")]
    pub block_io: Option<BlockIo>,
    /// Hugepage limits per page size.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hugepage_limits: Vec<HugepageLimit>,
    /// Network class and priorities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<Network>,
    /// RDMA limits per device.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rdma: BTreeMap<String, Rdma>,
    /// Raw control-file writes keyed by file name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub unified: BTreeMap<String, String>,
}

/// A device cgroup rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRule {
    /// Allow (`true`) or deny (`false`).
    pub allow: bool,
    /// Device type: `a`, `c`, or `b`.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Major number; absent means all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub major: Option<i64>,
    /// Minor number; absent means all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minor: Option<i64>,
    /// Access string made of `r`, `w`, `m`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access: Option<String>,
}

/// Memory limits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memory {
    /// Hard limit in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    /// Soft reservation in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservation: Option<i64>,
    /// Swap limit in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swap: Option<i64>,
    /// Swappiness (0-100).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swappiness: Option<u64>,
}

/// CPU limits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cpu {
    /// Relative weight.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shares: Option<u64>,
    /// Microseconds of CPU time allowed per period.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota: Option<i64>,
    /// Period length in microseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<u64>,
    /// CPUs the container may run on, e.g. `0-3`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpus: Option<String>,
    /// Memory nodes the container may use.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mems: Option<String>,
}

/// Process count limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pids {
    /// Maximum number of tasks.
    pub limit: i64,
}

/// Block I/O limits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockIo {
    /// Default weight, 10 to 1000.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<u16>,
    /// Read bandwidth caps per device.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub throttle_read_bps_device: Vec<ThrottleDevice>,
    /// Write bandwidth caps per device.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub throttle_write_bps_device: Vec<ThrottleDevice>,
}

/// A per-device throttle rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleDevice {
    /// Major device number.
    pub major: i64,
    /// Minor device number.
    pub minor: i64,
    /// Rate in bytes per second.
    pub rate: u64,
}

/// Hugepage limit for one page size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HugepageLimit {
    /// Page size, e.g. `2MB`.
    pub page_size: String,
    /// Limit in bytes.
    pub limit: u64,
}

/// Network class and interface priorities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    /// Class identifier tagged onto outgoing packets.
    #[serde(rename = "classID", skip_serializing_if = "Option::is_none")]
    pub class_id: Option<u32>,
    /// Per-interface priorities.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub priorities: Vec<NetworkPriority>,
}

/// Priority of one network interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkPriority {
    /// Interface name.
    pub name: String,
    /// Priority value.
    pub priority: u32,
}

/// RDMA limits for one device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rdma {
    /// Maximum HCA handles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hca_handles: Option<u32>,
    /// Maximum HCA objects.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hca_objects: Option<u32>,
}

/// Seccomp profile, kept opaque.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seccomp {
    /// Action for syscalls no rule matches.
    pub default_action: String,
    /// Per-syscall rules, not interpreted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub syscalls: Vec<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_namespace_kind_deserializes_as_unknown() {
        let ns: Vec<Namespace> =
            serde_json::from_str(r#"[{"type":"pid"},{"type":"quantum"},{"type":"time"}]"#).unwrap();
        let kinds: Vec<_> = ns.iter().map(|n| n.kind).collect();
        assert_eq!(
            kinds,
            vec![NamespaceKind::Pid, NamespaceKind::Unknown, NamespaceKind::Time]
        );
    }

    #[test]
    fn resources_use_oci_key_names() {
        let res: Resources = serde_json::from_str(
            r#"{
                "memory": { "limit": 104857600 },
                "cpu": { "quota": 50000, "period": 100000, "cpus": "0-1" },
                "blockIO": {
                    "weight": 500,
                    "throttleReadBpsDevice": [{ "major": 8, "minor": 0, "rate": 1048576 }]
                },
                "hugepageLimits": [{ "pageSize": "2MB", "limit": 4194304 }],
                "network": { "classID": 1048577, "priorities": [{ "name": "eth0", "priority": 5 }] },
                "rdma": { "mlx5_1": { "hcaHandles": 3 } },
                "unified": { "memory.high": "50000000" }
            }"#,
        )
        .unwrap();

        assert_eq!(res.memory.as_ref().unwrap().limit, Some(104_857_600));
        assert_eq!(res.memory.as_ref().unwrap().swap, None);
        assert_eq!(res.cpu.as_ref().unwrap().cpus.as_deref(), Some("0-1"));
        let bio = res.block_io.as_ref().unwrap();
        assert_eq!(bio.weight, Some(500));
        assert_eq!(bio.throttle_read_bps_device[0].rate, 1_048_576);
        assert_eq!(res.hugepage_limits[0].page_size, "2MB");
        assert_eq!(res.network.as_ref().unwrap().class_id, Some(1_048_577));
        assert_eq!(res.rdma["mlx5_1"].hca_handles, Some(3));
        assert_eq!(res.rdma["mlx5_1"].hca_objects, None);
        assert_eq!(res.unified["memory.high"], "50000000");
        assert!(res.pids.is_none());
    }
}
