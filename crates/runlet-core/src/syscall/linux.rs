//! [`Syscall`] backed by the running kernel.

#![allow(unsafe_code)]

use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd};
use std::path::Path;

use nix::fcntl::{OFlag, open};
use nix::mount::{MntFlags, MsFlags};
use nix::sys::resource::{Resource, setrlimit};
use nix::sys::stat::{Mode, umask};
use nix::unistd::{Gid, Uid};
use runlet_common::error::{Result, RunletError};

use super::Syscall;
use crate::capability::{Capability, CapabilitySets};

const LINUX_CAPABILITY_VERSION_3: u32 = 0x2008_0522;

#[repr(C)]
struct CapUserHeader {
    version: u32,
    pid: libc::c_int,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
struct CapUserData {
    effective: u32,
    permitted: u32,
    inheritable: u32,
}

/// Direct system calls through `nix` and `libc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxSyscall;

impl LinuxSyscall {
    fn prctl(op: &str, option: libc::c_int, arg2: libc::c_ulong, arg3: libc::c_ulong) -> Result<()> {
        // SAFETY: prctl with integer arguments only; no memory is shared with the kernel.
        let rc = unsafe { libc::prctl(option, arg2, arg3, 0, 0) };
        if rc < 0 {
            return Err(RunletError::syscall(op, std::io::Error::last_os_error()));
        }
        Ok(())
    }
}

impl Syscall for LinuxSyscall {
    fn open_dir(&self, path: &Path) -> Result<OwnedFd> {
        open(
            path,
            OFlag::O_DIRECTORY | OFlag::O_RDONLY | OFlag::O_CLOEXEC,
            Mode::empty(),
        )
        .map_err(|e| RunletError::syscall(format!("open {}", path.display()), e))
    }

    fn fchdir(&self, fd: BorrowedFd<'_>) -> Result<()> {
        // SAFETY: `fd` is borrowed from a live OwnedFd for the duration of the call.
        let rc = unsafe { libc::fchdir(fd.as_raw_fd()) };
        if rc < 0 {
            return Err(RunletError::syscall("fchdir", std::io::Error::last_os_error()));
        }
        Ok(())
    }

    fn chdir(&self, path: &Path) -> Result<()> {
        nix::unistd::chdir(path)
            .map_err(|e| RunletError::syscall(format!("chdir {}", path.display()), e))
    }

    fn pivot_root(&self, new_root: &Path, put_old: &Path) -> Result<()> {
        nix::unistd::pivot_root(new_root, put_old)
            .map_err(|e| RunletError::syscall("pivot_root", e))
    }

    fn mount(
        &self,
        source: Option<&Path>,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> Result<()> {
        nix::mount::mount(source, target, fstype, flags, data)
            .map_err(|e| RunletError::syscall(format!("mount {}", target.display()), e))
    }

    fn umount2(&self, target: &Path, flags: MntFlags) -> Result<()> {
        nix::mount::umount2(target, flags)
            .map_err(|e| RunletError::syscall(format!("umount {}", target.display()), e))
    }

    fn set_hostname(&self, hostname: &str) -> Result<()> {
        nix::unistd::sethostname(hostname).map_err(|e| RunletError::syscall("sethostname", e))
    }

    fn set_rlimit(&self, resource: Resource, soft: u64, hard: u64) -> Result<()> {
        setrlimit(resource, soft, hard)
            .map_err(|e| RunletError::syscall(format!("setrlimit {resource:?}"), e))
    }

    fn set_umask(&self, mask: u32) {
        let _ = umask(Mode::from_bits_truncate(mask));
    }

    fn set_groups(&self, groups: &[Gid]) -> Result<()> {
        nix::unistd::setgroups(groups).map_err(|e| RunletError::syscall("setgroups", e))
    }

    fn set_id(&self, uid: Uid, gid: Gid) -> Result<()> {
        Self::prctl("prctl(PR_SET_KEEPCAPS)", libc::PR_SET_KEEPCAPS, 1, 0)?;
        nix::unistd::setresgid(gid, gid, gid).map_err(|e| RunletError::syscall("setresgid", e))?;
        nix::unistd::setresuid(uid, uid, uid).map_err(|e| RunletError::syscall("setresuid", e))?;
        Self::prctl("prctl(PR_SET_KEEPCAPS)", libc::PR_SET_KEEPCAPS, 0, 0)
    }

    fn drop_bounding_cap(&self, cap: Capability) -> Result<()> {
        Self::prctl(
            "prctl(PR_CAPBSET_DROP)",
            libc::PR_CAPBSET_DROP,
            libc::c_ulong::from(cap.index()),
            0,
        )
    }

    fn set_capabilities(&self, sets: &CapabilitySets) -> Result<()> {
        let header = CapUserHeader {
            version: LINUX_CAPABILITY_VERSION_3,
            pid: 0,
        };
        #[allow(clippy::cast_possible_truncation)]
        let split = |mask: u64| [mask as u32, (mask >> 32) as u32];
        let (eff, perm, inh) = (
            split(sets.effective),
            split(sets.permitted),
            split(sets.inheritable),
        );
        let data = [
            CapUserData {
                effective: eff[0],
                permitted: perm[0],
                inheritable: inh[0],
            },
            CapUserData {
                effective: eff[1],
                permitted: perm[1],
                inheritable: inh[1],
            },
        ];
        // SAFETY: header and data are valid repr(C) structs matching the
        // kernel's v3 capability ABI, which reads exactly two data entries.
        let rc = unsafe {
            libc::syscall(
                libc::SYS_capset,
                std::ptr::from_ref(&header),
                data.as_ptr(),
            )
        };
        if rc < 0 {
            return Err(RunletError::syscall("capset", std::io::Error::last_os_error()));
        }
        Ok(())
    }

    fn raise_ambient_cap(&self, cap: Capability) -> Result<()> {
        Self::prctl(
            "prctl(PR_CAP_AMBIENT_RAISE)",
            libc::PR_CAP_AMBIENT,
            libc::c_ulong::try_from(libc::PR_CAP_AMBIENT_RAISE).unwrap_or_default(),
            libc::c_ulong::from(cap.index()),
        )
    }

    fn set_no_new_privileges(&self) -> Result<()> {
        Self::prctl("prctl(PR_SET_NO_NEW_PRIVS)", libc::PR_SET_NO_NEW_PRIVS, 1, 0)
    }
}
