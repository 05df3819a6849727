//! OCI bundle configuration model (`config.json`).
//!
//! Pure data decoded from a bundle. Only the fields the runtime acts on are
//! modeled; unknown keys are ignored by serde.

mod hooks;
mod linux;

pub use hooks::{Hook, Hooks};
pub use linux::{
    BlockIo, Cpu, DeviceRule, HugepageLimit, IdMapping, Linux, Memory, Namespace, NamespaceKind,
    Network, NetworkPriority, Pids, Rdma, Resources, Seccomp, ThrottleDevice,
};

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{Result, RunletError};

/// Root of the OCI runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spec {
    /// Version of the runtime spec the bundle was written for.
    #[serde(default)]
    pub oci_version: String,

    /// Process to run inside the container.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process: Option<Process>,

    /// Root filesystem of the container.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<Root>,

    /// Hostname set inside the UTS namespace.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// Mounts applied in order under the root filesystem.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<Mount>,

    /// Lifecycle hooks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hooks: Option<Hooks>,

    /// Arbitrary metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub annotations: HashMap<String, String>,

    /// Linux-specific configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linux: Option<Linux>,
}

/// The container's root filesystem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Root {
    /// Path to the rootfs, absolute or relative to the bundle.
    pub path: PathBuf,
    /// Remount the root read-only after setup.
    #[serde(default)]
    pub readonly: bool,
}

/// The user process and the attributes it runs with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Process {
    /// Attach a terminal to the process.
    #[serde(default)]
    pub terminal: bool,
    /// User and group identity.
    #[serde(default)]
    pub user: User,
    /// Command line; `args[0]` is the executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment as `KEY=value` entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    /// Working directory inside the container.
    #[serde(default = "default_cwd")]
    pub cwd: PathBuf,
    /// Capability sets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capabilities>,
    /// POSIX resource limits.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rlimits: Vec<Rlimit>,
    /// Set `PR_SET_NO_NEW_PRIVS` before exec.
    #[serde(default)]
    pub no_new_privileges: bool,
}

fn default_cwd() -> PathBuf {
    PathBuf::from("/")
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

fn mount(destination: &str, kind: &str, source: &str, options: &[&str]) -> Mount {
    Mount {
        destination: PathBuf::from(destination),
        kind: Some(kind.to_string()),
        source: Some(source.to_string()),
        options: strings(options),
    }
}

/// Process identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// User ID.
    #[serde(default)]
    pub uid: u32,
    /// Group ID.
    #[serde(default)]
    pub gid: u32,
    /// File mode creation mask.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub umask: Option<u32>,
    /// Supplementary group IDs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_gids: Vec<u32>,
}

/// Linux capability sets by name (`CAP_*`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Bounding set.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bounding: Vec<String>,
    /// Effective set.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub effective: Vec<String>,
    /// Inheritable set.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inheritable: Vec<String>,
    /// Permitted set.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permitted: Vec<String>,
    /// Ambient set.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ambient: Vec<String>,
}

/// A single POSIX rlimit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rlimit {
    /// Limit name, e.g. `RLIMIT_NOFILE`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Soft limit.
    pub soft: u64,
    /// Hard limit.
    pub hard: u64,
}

/// A filesystem mount applied under the root filesystem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mount {
    /// Absolute path inside the container.
    pub destination: PathBuf,
    /// Filesystem type, e.g. `proc` or `tmpfs`.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Device, directory, or pseudo-source name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Mount option tokens such as `nosuid` or `mode=755`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl Spec {
    /// Loads and validates `<bundle>/config.json`.
    ///
    /// # Errors
    ///
    /// Returns [`RunletError::Spec`] if the file cannot be read, is not valid
    /// JSON for this model, or fails [`Spec::validate`].
    pub fn load(bundle: &Path) -> Result<Self> {
        let path = bundle.join(constants::CONFIG_FILE);
        let content = std::fs::read_to_string(&path).map_err(|e| RunletError::Spec {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let spec: Self = serde_json::from_str(&content).map_err(|e| RunletError::Spec {
            path: path.clone(),
            message: e.to_string(),
        })?;
        spec.validate().map_err(|e| RunletError::Spec {
            path,
            message: e.to_string(),
        })?;
        Ok(spec)
    }

    /// Checks the fields the runtime cannot work without.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the process or its arguments are missing
    /// or no root filesystem is configured.
    pub fn validate(&self) -> Result<()> {
        let process = self
            .process
            .as_ref()
            .ok_or_else(|| RunletError::validation("spec has no process"))?;
        if process.args.is_empty() {
            return Err(RunletError::validation("process.args must not be empty"));
        }
        if self.root.is_none() {
            return Err(RunletError::validation("spec has no root"));
        }
        Ok(())
    }

    /// Resolves the root filesystem path against the bundle directory.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the spec has no root.
    pub fn rootfs(&self, bundle: &Path) -> Result<PathBuf> {
        let root = self
            .root
            .as_ref()
            .ok_or_else(|| RunletError::validation("spec has no root"))?;
        Ok(if root.path.is_absolute() {
            root.path.clone()
        } else {
            bundle.join(&root.path)
        })
    }

    /// Returns the Linux resources section, if any.
    #[must_use]
    pub fn resources(&self) -> Option<&Resources> {
        self.linux.as_ref().and_then(|l| l.resources.as_ref())
    }

    /// Returns the requested namespaces (empty if none).
    #[must_use]
    pub fn namespaces(&self) -> &[Namespace] {
        self.linux.as_ref().map_or(&[], |l| l.namespaces.as_slice())
    }

    /// Whether the spec requests a namespace of the given kind.
    #[must_use]
    pub fn has_namespace(&self, kind: NamespaceKind) -> bool {
        self.namespaces().iter().any(|ns| ns.kind == kind)
    }

    /// A starting-point configuration for a new bundle with a `rootfs` directory.
    #[must_use]
    pub fn example() -> Self {
        let caps: Vec<String> = ["CAP_AUDIT_WRITE", "CAP_KILL", "CAP_NET_BIND_SERVICE"]
            .iter()
            .map(ToString::to_string)
            .collect();

        Self {
            oci_version: constants::OCI_VERSION.to_string(),
            process: Some(Process {
                terminal: false,
                user: User::default(),
                args: strings(&["sh"]),
                env: strings(&[
                    "PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin",
                    "TERM=xterm",
                ]),
                cwd: default_cwd(),
                capabilities: Some(Capabilities {
                    bounding: caps.clone(),
                    effective: caps.clone(),
                    inheritable: Vec::new(),
                    permitted: caps.clone(),
                    ambient: caps,
                }),
                rlimits: vec![Rlimit {
                    kind: "RLIMIT_NOFILE".into(),
                    soft: 1024,
                    hard: 1024,
                }],
                no_new_privileges: true,
            }),
            root: Some(Root {
                path: PathBuf::from("rootfs"),
                readonly: true,
            }),
            hostname: Some(constants::APP_NAME.to_string()),
            mounts: vec![
                mount("/proc", "proc", "proc", &[]),
                mount("/dev", "tmpfs", "tmpfs", &["nosuid", "strictatime", "mode=755", "size=65536k"]),
                mount(
                    "/dev/pts",
                    "devpts",
                    "devpts",
                    &["nosuid", "noexec", "newinstance", "ptmxmode=0666", "mode=0620", "gid=5"],
                ),
                mount("/dev/shm", "tmpfs", "shm", &["nosuid", "noexec", "nodev", "mode=1777", "size=65536k"]),
                mount("/dev/mqueue", "mqueue", "mqueue", &["nosuid", "noexec", "nodev"]),
                mount("/sys", "sysfs", "sysfs", &["nosuid", "noexec", "nodev", "ro"]),
            ],
            hooks: None,
            annotations: HashMap::new(),
            linux: Some(Linux {
                namespaces: [
                    NamespaceKind::Pid,
                    NamespaceKind::Network,
                    NamespaceKind::Ipc,
                    NamespaceKind::Uts,
                    NamespaceKind::Mount,
                    NamespaceKind::Cgroup,
                ]
                .into_iter()
                .map(Namespace::new)
                .collect(),
                resources: Some(Resources {
                    devices: vec![DeviceRule {
                        allow: false,
                        kind: None,
                        major: None,
                        minor: None,
                        access: Some("rwm".into()),
                    }],
                    ..Resources::default()
                }),
                masked_paths: strings(&[
                    "/proc/acpi",
                    "/proc/asound",
                    "/proc/kcore",
                    "/proc/keys",
                    "/proc/latency_stats",
                    "/proc/timer_list",
                    "/proc/timer_stats",
                    "/proc/sched_debug",
                    "/sys/firmware",
                    "/proc/scsi",
                ]),
                readonly_paths: strings(&[
                    "/proc/bus",
                    "/proc/fs",
                    "/proc/irq",
                    "/proc/sys",
                    "/proc/sysrq-trigger",
                ]),
                ..Linux::default()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "ociVersion": "1.0.2",
        "process": { "args": ["/bin/echo", "hi"], "cwd": "/" },
        "root": { "path": "rootfs" }
    }"#;

    #[test]
    fn parses_minimal_config() {
        let spec: Spec = serde_json::from_str(MINIMAL).unwrap();
        spec.validate().unwrap();
        let process = spec.process.as_ref().unwrap();
        assert_eq!(process.args, vec!["/bin/echo", "hi"]);
        assert!(spec.mounts.is_empty());
        assert!(spec.resources().is_none());
        assert!(spec.namespaces().is_empty());
    }

    #[test]
    fn validate_rejects_empty_args() {
        let spec: Spec = serde_json::from_str(
            r#"{ "process": { "args": [] }, "root": { "path": "rootfs" } }"#,
        )
        .unwrap();
        assert!(matches!(spec.validate(), Err(RunletError::Validation { .. })));
    }

    #[test]
    fn rootfs_is_resolved_against_bundle() {
        let spec: Spec = serde_json::from_str(MINIMAL).unwrap();
        assert_eq!(
            spec.rootfs(Path::new("/bundles/demo")).unwrap(),
            PathBuf::from("/bundles/demo/rootfs")
        );
    }

    #[test]
    fn load_reads_bundle_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.json"), MINIMAL).unwrap();
        let spec = Spec::load(dir.path()).unwrap();
        assert_eq!(spec.oci_version, "1.0.2");
    }

    #[test]
    fn load_reports_parse_errors_with_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.json"), "{ not json").unwrap();
        match Spec::load(dir.path()) {
            Err(RunletError::Spec { path, .. }) => {
                assert_eq!(path, dir.path().join("config.json"));
            }
            other => panic!("expected spec error, got {other:?}"),
        }
    }

    #[test]
    fn load_missing_config_is_spec_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Spec::load(dir.path()),
            Err(RunletError::Spec { .. })
        ));
    }

    #[test]
    fn example_is_valid_and_survives_json() {
        let spec = Spec::example();
        spec.validate().unwrap();
        let json = serde_json::to_string_pretty(&spec).unwrap();
        let back: Spec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
        assert!(back.has_namespace(NamespaceKind::Mount));
        assert!(!back.has_namespace(NamespaceKind::User));
    }
}
