//! System-wide constants and default paths.

/// Default directory holding one state directory per container.
pub const DEFAULT_STATE_ROOT: &str = "/run/runlet";

/// Name of the per-container state file inside its state directory.
pub const STATE_FILE: &str = "state.json";

/// Name of the OCI configuration file inside a bundle.
pub const CONFIG_FILE: &str = "config.json";

/// Cgroups v2 unified hierarchy mount point.
pub const CGROUP_V2_PATH: &str = "/sys/fs/cgroup";

/// Default cgroup base under which one directory per container is created.
pub const DEFAULT_CGROUP_ROOT: &str = "/sys/fs/cgroup/runlet";

/// Binary re-executed to become the container's init process.
pub const DEFAULT_INIT_BINARY: &str = "/proc/self/exe";

/// OCI runtime-spec version written into state files.
pub const OCI_VERSION: &str = "1.0.2";

/// Environment variable carrying the bundle path from the runtime to the init process.
pub const BUNDLE_ENV: &str = "_RUNLET_BUNDLE";

/// Subcommand that selects the init entry point after re-exec.
pub const INIT_SUBCOMMAND: &str = "init";

/// Environment variable overriding [`DEFAULT_STATE_ROOT`].
pub const STATE_ROOT_ENV: &str = "RUNLET_ROOT";

/// Environment variable overriding [`DEFAULT_CGROUP_ROOT`].
pub const CGROUP_ROOT_ENV: &str = "RUNLET_CGROUP_ROOT";

/// Annotation key recording the creation timestamp.
pub const CREATED_ANNOTATION: &str = "runlet.created";

/// Application name used in CLI output and state files.
pub const APP_NAME: &str = "runlet";
