//! Secure root filesystem switching via `pivot_root(2)`.
//!
//! More secure than `chroot` because it actually changes the root mount
//! point rather than just the process's view of `/`. Both arguments are
//! `"."`, so no scratch directory is needed inside the new root: the old
//! root is stacked on top of the new one and detached from there.

use std::os::fd::AsFd;
use std::path::Path;

use nix::mount::{MntFlags, MsFlags};
use runlet_common::error::Result;

use crate::syscall::Syscall;

/// Makes `new_root` the root filesystem of the calling process and
/// detaches the old root.
///
/// The caller must be in a private mount namespace and `new_root` must be
/// a mount point. Every step aborts on failure; nothing is undone, since
/// the init process is discarded if its setup fails.
///
/// # Errors
///
/// Returns the syscall error of the first step that fails.
pub fn pivot_root(syscall: &dyn Syscall, new_root: &Path) -> Result<()> {
    tracing::info!(new_root = %new_root.display(), "performing pivot_root");

    let old_root = syscall.open_dir(Path::new("/"))?;
    let new_root_fd = syscall.open_dir(new_root)?;

    syscall.fchdir(new_root_fd.as_fd())?;
    syscall.pivot_root(Path::new("."), Path::new("."))?;
    syscall.fchdir(old_root.as_fd())?;

    // Keep the detach below from propagating back into the host namespace.
    syscall.mount(
        None,
        Path::new("."),
        None,
        MsFlags::MS_SLAVE | MsFlags::MS_REC,
        None,
    )?;
    syscall.umount2(Path::new("."), MntFlags::MNT_DETACH)?;
    syscall.chdir(Path::new("/"))?;

    tracing::debug!("old root detached");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::syscall::test::{Call, TestSyscall};

    fn ops(sys: &TestSyscall) -> Vec<&'static str> {
        sys.calls().iter().map(Call::op).collect()
    }

    #[test]
    fn steps_run_in_order() {
        let sys = TestSyscall::default();
        pivot_root(&sys, Path::new("/bundle/rootfs")).unwrap();

        assert_eq!(
            sys.calls(),
            vec![
                Call::OpenDir(PathBuf::from("/")),
                Call::OpenDir(PathBuf::from("/bundle/rootfs")),
                Call::Fchdir(1),
                Call::PivotRoot(PathBuf::from("."), PathBuf::from(".")),
                Call::Fchdir(0),
                Call::Mount {
                    source: None,
                    target: PathBuf::from("."),
                    fstype: None,
                    flags: MsFlags::MS_SLAVE | MsFlags::MS_REC,
                    data: None,
                },
                Call::Umount2(PathBuf::from("."), MntFlags::MNT_DETACH),
                Call::Chdir(PathBuf::from("/")),
            ]
        );
    }

    #[test]
    fn failure_stops_remaining_steps() {
        let cases: [(&str, usize); 5] = [
            ("open_dir", 1),
            ("pivot_root", 4),
            ("mount", 6),
            ("umount2", 7),
            ("chdir", 8),
        ];
        for (op, recorded) in cases {
            let sys = TestSyscall::failing_on(op);
            assert!(pivot_root(&sys, Path::new("/rootfs")).is_err(), "{op} should fail");
            assert_eq!(ops(&sys).len(), recorded, "after failing {op}");
            assert_eq!(ops(&sys).last(), Some(&op));
        }
    }

    #[test]
    fn failing_first_fchdir_never_pivots() {
        let sys = TestSyscall::failing_on("fchdir");
        assert!(pivot_root(&sys, Path::new("/rootfs")).is_err());
        assert_eq!(ops(&sys), vec!["open_dir", "open_dir", "fchdir"]);
    }
}
