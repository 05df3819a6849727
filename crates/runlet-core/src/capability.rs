//! Linux capability management for least-privilege execution.
//!
//! Capabilities outside the configured bounding set are dropped while the
//! process is still root. After the UID change the effective, permitted,
//! and inheritable sets are replaced wholesale and ambient capabilities are
//! raised last.

use runlet_common::error::{Result, RunletError};
use runlet_common::spec::Capabilities;

use crate::syscall::Syscall;

/// Capability names indexed by their kernel number.
const NAMES: [&str; 41] = [
    "CAP_CHOWN",
    "CAP_DAC_OVERRIDE",
    "CAP_DAC_READ_SEARCH",
    "CAP_FOWNER",
    "CAP_FSETID",
    "CAP_KILL",
    "CAP_SETGID",
    "CAP_SETUID",
    "CAP_SETPCAP",
    "CAP_LINUX_IMMUTABLE",
    "CAP_NET_BIND_SERVICE",
    "CAP_NET_BROADCAST",
    "CAP_NET_ADMIN",
    "CAP_NET_RAW",
    "CAP_IPC_LOCK",
    "CAP_IPC_OWNER",
    "CAP_SYS_MODULE",
    "CAP_SYS_RAWIO",
    "CAP_SYS_CHROOT",
    "CAP_SYS_PTRACE",
    "CAP_SYS_PACCT",
    "CAP_SYS_ADMIN",
    "CAP_SYS_BOOT",
    "CAP_SYS_NICE",
    "CAP_SYS_RESOURCE",
    "CAP_SYS_TIME",
    "CAP_SYS_TTY_CONFIG",
    "CAP_MKNOD",
    "CAP_LEASE",
    "CAP_AUDIT_WRITE",
    "CAP_AUDIT_CONTROL",
    "CAP_SETFCAP",
    "CAP_MAC_OVERRIDE",
    "CAP_MAC_ADMIN",
    "CAP_SYSLOG",
    "CAP_WAKE_ALARM",
    "CAP_BLOCK_SUSPEND",
    "CAP_AUDIT_READ",
    "CAP_PERFMON",
    "CAP_BPF",
    "CAP_CHECKPOINT_RESTORE",
];

/// A single Linux capability, identified by its kernel number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Capability(u8);

impl Capability {
    /// Looks a capability up by name. The `CAP_` prefix is optional and
    /// matching is case-insensitive.
    ///
    /// # Errors
    ///
    /// Returns a validation error for names this runtime does not know.
    pub fn from_name(name: &str) -> Result<Self> {
        let upper = name.to_ascii_uppercase();
        let full = if upper.starts_with("CAP_") {
            upper
        } else {
            format!("CAP_{upper}")
        };
        NAMES
            .iter()
            .position(|n| *n == full)
            .and_then(|i| u8::try_from(i).ok())
            .map(Self)
            .ok_or_else(|| RunletError::validation(format!("unknown capability {name:?}")))
    }

    /// Kernel capability number.
    #[must_use]
    pub const fn index(self) -> u8 {
        self.0
    }

    /// Canonical `CAP_*` name.
    #[must_use]
    pub fn name(self) -> &'static str {
        NAMES[usize::from(self.0)]
    }

    /// Every capability this runtime knows about, in kernel order.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..NAMES.len()).filter_map(|i| u8::try_from(i).ok().map(Self))
    }

    const fn bit(self) -> u64 {
        1 << self.0
    }
}

/// Bitmask form of the effective, permitted, and inheritable sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilitySets {
    /// Effective set.
    pub effective: u64,
    /// Permitted set.
    pub permitted: u64,
    /// Inheritable set.
    pub inheritable: u64,
}

/// Capability configuration resolved from names to numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedCapabilities {
    /// Capabilities kept in the bounding set.
    pub bounding: Vec<Capability>,
    /// Sets installed with `capset(2)`.
    pub sets: CapabilitySets,
    /// Capabilities raised into the ambient set.
    pub ambient: Vec<Capability>,
}

impl ResolvedCapabilities {
    /// Resolves every name in the configuration.
    ///
    /// # Errors
    ///
    /// Returns a validation error if any name is unknown.
    pub fn resolve(caps: &Capabilities) -> Result<Self> {
        Ok(Self {
            bounding: parse_list(&caps.bounding)?,
            sets: CapabilitySets {
                effective: mask(&parse_list(&caps.effective)?),
                permitted: mask(&parse_list(&caps.permitted)?),
                inheritable: mask(&parse_list(&caps.inheritable)?),
            },
            ambient: parse_list(&caps.ambient)?,
        })
    }
}

fn parse_list(names: &[String]) -> Result<Vec<Capability>> {
    names.iter().map(|n| Capability::from_name(n)).collect()
}

fn mask(caps: &[Capability]) -> u64 {
    caps.iter().fold(0, |acc, c| acc | c.bit())
}

/// Drops every capability outside the configured bounding set.
///
/// Needs `CAP_SETPCAP` in the effective set, so it must run while the
/// process is still root, before [`crate::identity::apply`].
///
/// # Errors
///
/// Returns a syscall error if a drop fails for any reason other than the
/// kernel not knowing the capability.
pub fn drop_bounding(syscall: &dyn Syscall, resolved: &ResolvedCapabilities) -> Result<()> {
    for cap in Capability::all().filter(|c| !resolved.bounding.contains(c)) {
        match syscall.drop_bounding_cap(cap) {
            Ok(()) => {}
            // Capabilities newer than the running kernel are reported as EINVAL.
            Err(RunletError::Syscall { source, .. })
                if source.raw_os_error() == Some(libc::EINVAL) =>
            {
                tracing::debug!(cap = cap.name(), "capability not supported by kernel");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Installs the capability sets and raises the ambient capabilities.
///
/// Runs after the UID change. `set_id` keeps the permitted set across it,
/// and `capset` restores the effective set the change cleared.
///
/// # Errors
///
/// Returns a syscall error if `capset` or an ambient raise fails.
pub fn install(syscall: &dyn Syscall, resolved: &ResolvedCapabilities) -> Result<()> {
    syscall.set_capabilities(&resolved.sets)?;
    for cap in &resolved.ambient {
        syscall.raise_ambient_cap(*cap)?;
    }
    tracing::info!(
        bounding = resolved.bounding.len(),
        ambient = resolved.ambient.len(),
        "capabilities applied"
    );
    Ok(())
}
