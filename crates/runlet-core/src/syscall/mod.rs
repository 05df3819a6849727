//! The system-call seam used by every in-namespace setup step.
//!
//! Mount, pivot, identity, and capability code never calls into the kernel
//! directly. It goes through [`Syscall`], so the exact call sequence can be
//! recorded and checked with `test::TestSyscall`, available to tests and
//! behind the `test-util` feature.

pub mod linux;

use std::os::fd::{BorrowedFd, OwnedFd};
use std::path::Path;

use nix::mount::{MntFlags, MsFlags};
use nix::sys::resource::Resource;
use nix::unistd::{Gid, Uid};
use runlet_common::error::Result;

use crate::capability::{Capability, CapabilitySets};

pub use linux::LinuxSyscall;

/// Kernel operations needed to turn a cloned child into a container process.
pub trait Syscall {
    /// Opens a directory and returns its descriptor.
    ///
    /// # Errors
    ///
    /// Returns a syscall error if the path cannot be opened as a directory.
    fn open_dir(&self, path: &Path) -> Result<OwnedFd>;

    /// Changes the working directory to an open directory descriptor.
    ///
    /// # Errors
    ///
    /// Returns a syscall error if `fchdir(2)` fails.
    fn fchdir(&self, fd: BorrowedFd<'_>) -> Result<()>;

    /// Changes the working directory to a path.
    ///
    /// # Errors
    ///
    /// Returns a syscall error if `chdir(2)` fails.
    fn chdir(&self, path: &Path) -> Result<()>;

    /// Swaps the root mount with `new_root`, moving the old one to `put_old`.
    ///
    /// # Errors
    ///
    /// Returns a syscall error if `pivot_root(2)` fails.
    fn pivot_root(&self, new_root: &Path, put_old: &Path) -> Result<()>;

    /// Mounts a filesystem or changes the properties of an existing mount.
    ///
    /// # Errors
    ///
    /// Returns a syscall error if `mount(2)` fails.
    fn mount(
        &self,
        source: Option<&Path>,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> Result<()>;

    /// Unmounts a filesystem.
    ///
    /// # Errors
    ///
    /// Returns a syscall error if `umount2(2)` fails.
    fn umount2(&self, target: &Path, flags: MntFlags) -> Result<()>;

    /// Sets the hostname of the current UTS namespace.
    ///
    /// # Errors
    ///
    /// Returns a syscall error if `sethostname(2)` fails.
    fn set_hostname(&self, hostname: &str) -> Result<()>;

    /// Sets soft and hard limits for one resource.
    ///
    /// # Errors
    ///
    /// Returns a syscall error if `setrlimit(2)` fails.
    fn set_rlimit(&self, resource: Resource, soft: u64, hard: u64) -> Result<()>;

    /// Sets the file mode creation mask.
    fn set_umask(&self, mask: u32);

    /// Replaces the supplementary group list.
    ///
    /// # Errors
    ///
    /// Returns a syscall error if `setgroups(2)` fails.
    fn set_groups(&self, groups: &[Gid]) -> Result<()>;

    /// Switches real, effective, and saved IDs, keeping permitted capabilities.
    ///
    /// # Errors
    ///
    /// Returns a syscall error if any of the ID changes fails.
    fn set_id(&self, uid: Uid, gid: Gid) -> Result<()>;

    /// Removes one capability from the bounding set.
    ///
    /// # Errors
    ///
    /// Returns a syscall error if `PR_CAPBSET_DROP` fails.
    fn drop_bounding_cap(&self, cap: Capability) -> Result<()>;

    /// Installs the effective, permitted, and inheritable sets.
    ///
    /// # Errors
    ///
    /// Returns a syscall error if `capset(2)` fails.
    fn set_capabilities(&self, sets: &CapabilitySets) -> Result<()>;

    /// Adds one capability to the ambient set.
    ///
    /// # Errors
    ///
    /// Returns a syscall error if `PR_CAP_AMBIENT_RAISE` fails.
    fn raise_ambient_cap(&self, cap: Capability) -> Result<()>;

    /// Sets `PR_SET_NO_NEW_PRIVS` for the calling thread.
    ///
    /// # Errors
    ///
    /// Returns a syscall error if `prctl(2)` fails.
    fn set_no_new_privileges(&self) -> Result<()>;
}
