//! Post-pivot hardening: masked paths, read-only paths, and a read-only root.

use std::path::Path;

use nix::mount::MsFlags;
use runlet_common::error::Result;

use super::mount::container_path;
use crate::syscall::Syscall;

/// Hides each existing path from the container.
///
/// Files are covered with `/dev/null`; directories with an empty read-only
/// tmpfs. Missing paths are skipped. `root` is `/` once pivoted.
///
/// # Errors
///
/// Returns the syscall error of the first mount that fails.
pub fn mask_paths(syscall: &dyn Syscall, root: &Path, paths: &[String]) -> Result<()> {
    for path in paths {
        let target = container_path(root, Path::new(path))?;
        if target.is_dir() {
            syscall.mount(
                Some(Path::new("tmpfs")),
                &target,
                Some("tmpfs"),
                MsFlags::MS_RDONLY,
                None,
            )?;
        } else if target.exists() {
            syscall.mount(
                Some(Path::new("/dev/null")),
                &target,
                None,
                MsFlags::MS_BIND,
                None,
            )?;
        } else {
            continue;
        }
        tracing::debug!(path, "masked");
    }
    Ok(())
}

/// Remounts each existing path read-only. Missing paths are skipped.
///
/// # Errors
///
/// Returns the syscall error of the first mount that fails.
pub fn readonly_paths(syscall: &dyn Syscall, root: &Path, paths: &[String]) -> Result<()> {
    for path in paths {
        let target = container_path(root, Path::new(path))?;
        if !target.exists() {
            continue;
        }
        syscall.mount(
            Some(&target),
            &target,
            None,
            MsFlags::MS_BIND | MsFlags::MS_REC,
            None,
        )?;
        syscall.mount(
            Some(&target),
            &target,
            None,
            MsFlags::MS_BIND | MsFlags::MS_REMOUNT | MsFlags::MS_RDONLY | MsFlags::MS_REC,
            None,
        )?;
        tracing::debug!(path, "made read-only");
    }
    Ok(())
}

/// Remounts the new root read-only.
///
/// # Errors
///
/// Returns the syscall error if the remount fails.
pub fn readonly_root(syscall: &dyn Syscall) -> Result<()> {
    syscall.mount(
        None,
        Path::new("/"),
        None,
        MsFlags::MS_BIND | MsFlags::MS_REMOUNT | MsFlags::MS_RDONLY,
        None,
    )
}
