//! Mount utilities for container filesystem setup.
//!
//! Applies the bundle's mount list in order under the container rootfs and
//! prepares the rootfs so it can be pivoted into.

use std::fs::DirBuilder;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Component, Path, PathBuf};

use nix::mount::MsFlags;
use runlet_common::error::{Result, RunletError};
use runlet_common::spec::Mount;

use crate::syscall::Syscall;

/// Option tokens that map onto `mount(2)` flags.
const FLAG_TOKENS: &[(&str, MsFlags)] = &[
    ("ro", MsFlags::MS_RDONLY),
    ("nosuid", MsFlags::MS_NOSUID),
    ("noexec", MsFlags::MS_NOEXEC),
    ("nodev", MsFlags::MS_NODEV),
    ("relatime", MsFlags::MS_RELATIME),
    ("noatime", MsFlags::MS_NOATIME),
    ("bind", MsFlags::MS_BIND),
    ("rbind", MsFlags::MS_BIND.union(MsFlags::MS_REC)),
    ("remount", MsFlags::MS_REMOUNT),
    ("shared", MsFlags::MS_SHARED),
    ("private", MsFlags::MS_PRIVATE),
    ("slave", MsFlags::MS_SLAVE),
    ("unbindable", MsFlags::MS_UNBINDABLE),
    ("sync", MsFlags::MS_SYNCHRONOUS),
    ("dirsync", MsFlags::MS_DIRSYNC),
    ("mand", MsFlags::MS_MANDLOCK),
    ("lazytime", MsFlags::MS_LAZYTIME),
];

/// Flags and filesystem data parsed from a mount's option tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountOptions {
    /// Union of every recognized flag token.
    pub flags: MsFlags,
    /// Remaining tokens, comma-joined in input order.
    pub data: String,
}

impl MountOptions {
    /// Splits option tokens into flags and a data string.
    ///
    /// Every token lands in exactly one of the two outputs.
    #[must_use]
    pub fn parse<S: AsRef<str>>(options: &[S]) -> Self {
        let mut flags = MsFlags::empty();
        let mut data: Vec<&str> = Vec::new();
        for opt in options {
            let opt = opt.as_ref();
            match FLAG_TOKENS.iter().find(|(token, _)| *token == opt) {
                Some((_, flag)) => flags |= *flag,
                None => data.push(opt),
            }
        }
        Self {
            flags,
            data: data.join(","),
        }
    }

    /// The data string, or `None` when there is nothing to pass.
    #[must_use]
    pub fn data(&self) -> Option<&str> {
        (!self.data.is_empty()).then_some(self.data.as_str())
    }
}

/// Resolves an absolute in-container path against the rootfs.
///
/// # Errors
///
/// Returns a validation error if the path contains `..`.
pub fn container_path(rootfs: &Path, destination: &Path) -> Result<PathBuf> {
    let mut path = rootfs.to_path_buf();
    for component in destination.components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir | Component::Prefix(_) => {
                return Err(RunletError::validation(format!(
                    "mount destination {} escapes the rootfs",
                    destination.display()
                )));
            }
        }
    }
    Ok(path)
}

/// Applies every mount in order under `rootfs`.
///
/// Destination directories are created with mode 0755. A bind mount of a
/// regular file gets an empty file as its target instead. Mounting is not
/// transactional: mounts applied before a failure stay in place.
///
/// # Errors
///
/// Returns an I/O error if a target cannot be created or the syscall error
/// of the first mount that fails.
pub fn mount_all(syscall: &dyn Syscall, rootfs: &Path, mounts: &[Mount]) -> Result<()> {
    for mount in mounts {
        let target = container_path(rootfs, &mount.destination)?;
        let options = MountOptions::parse(&mount.options);
        let source = mount.source.as_deref().map(Path::new);

        let file_bind = options.flags.contains(MsFlags::MS_BIND) && source.is_some_and(Path::is_file);
        create_target(&target, file_bind)?;

        tracing::debug!(
            destination = %mount.destination.display(),
            kind = mount.kind.as_deref().unwrap_or(""),
            flags = options.flags.bits(),
            data = %options.data,
            "mounting"
        );
        syscall.mount(
            source,
            &target,
            mount.kind.as_deref(),
            options.flags,
            options.data(),
        )?;
    }
    tracing::info!(count = mounts.len(), "mounts applied");
    Ok(())
}

fn create_target(target: &Path, as_file: bool) -> Result<()> {
    let io_err = |e| RunletError::Io {
        path: target.to_path_buf(),
        source: e,
    };
    if as_file {
        if let Some(parent) = target.parent() {
            DirBuilder::new()
                .recursive(true)
                .mode(0o755)
                .create(parent)
                .map_err(io_err)?;
        }
        if !target.exists() {
            let _ = std::fs::File::create(target).map_err(io_err)?;
        }
        return Ok(());
    }
    DirBuilder::new()
        .recursive(true)
        .mode(0o755)
        .create(target)
        .map_err(io_err)
}

/// Makes every mount in the namespace private so later mounts stay inside it.
///
/// # Errors
///
/// Returns the syscall error if the remount fails.
pub fn make_rprivate(syscall: &dyn Syscall) -> Result<()> {
    syscall.mount(
        None,
        Path::new("/"),
        None,
        MsFlags::MS_REC | MsFlags::MS_PRIVATE,
        None,
    )
}

/// Bind-mounts the rootfs onto itself so it is a mount point for `pivot_root`.
///
/// # Errors
///
/// Returns the syscall error if the bind mount fails.
pub fn bind_rootfs(syscall: &dyn Syscall, rootfs: &Path) -> Result<()> {
    syscall.mount(
        Some(rootfs),
        rootfs,
        None,
        MsFlags::MS_BIND | MsFlags::MS_REC,
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syscall::test::{Call, TestSyscall};

    #[test]
    fn parse_splits_flags_and_data() {
        let opts = MountOptions::parse(&["nosuid", "strictatime", "mode=755", "size=65536k"]);
        assert_eq!(opts.flags, MsFlags::MS_NOSUID);
        assert_eq!(opts.data, "strictatime,mode=755,size=65536k");
    }

    #[test]
    fn parse_unions_every_documented_flag() {
        let tokens: Vec<&str> = FLAG_TOKENS.iter().map(|(t, _)| *t).collect();
        let opts = MountOptions::parse(&tokens);
        let expected = FLAG_TOKENS
            .iter()
            .fold(MsFlags::empty(), |acc, (_, f)| acc | *f);
        assert_eq!(opts.flags, expected);
        assert!(opts.data.is_empty());
        assert_eq!(opts.data(), None);
    }

    #[test]
    fn parse_keeps_unknown_tokens_in_input_order() {
        let opts = MountOptions::parse(&["gid=5", "ro", "mode=0620", "newinstance", "rbind"]);
        assert_eq!(opts.flags, MsFlags::MS_RDONLY | MsFlags::MS_BIND | MsFlags::MS_REC);
        assert_eq!(opts.data, "gid=5,mode=0620,newinstance");
    }

    #[test]
    fn duplicate_flags_are_idempotent() {
        let opts = MountOptions::parse(&["ro", "ro", "nodev"]);
        assert_eq!(opts.flags, MsFlags::MS_RDONLY | MsFlags::MS_NODEV);
    }

    #[test]
    fn container_path_rejects_parent_components() {
        let root = Path::new("/rootfs");
        assert_eq!(
            container_path(root, Path::new("/dev/shm")).unwrap(),
            PathBuf::from("/rootfs/dev/shm")
        );
        assert!(container_path(root, Path::new("/../etc")).is_err());
    }

    #[test]
    fn mount_all_creates_targets_and_mounts_in_order() {
        let rootfs = tempfile::tempdir().unwrap();
        let sys = TestSyscall::default();
        let mounts = vec![
            Mount {
                destination: PathBuf::from("/proc"),
                kind: Some("proc".into()),
                source: Some("proc".into()),
                options: vec![],
            },
            Mount {
                destination: PathBuf::from("/dev/pts"),
                kind: Some("devpts".into()),
                source: Some("devpts".into()),
                options: vec!["nosuid".into(), "mode=0620".into()],
            },
        ];
        mount_all(&sys, rootfs.path(), &mounts).unwrap();

        assert!(rootfs.path().join("proc").is_dir());
        assert!(rootfs.path().join("dev/pts").is_dir());
        assert_eq!(
            sys.calls(),
            vec![
                Call::Mount {
                    source: Some(PathBuf::from("proc")),
                    target: rootfs.path().join("proc"),
                    fstype: Some("proc".into()),
                    flags: MsFlags::empty(),
                    data: None,
                },
                Call::Mount {
                    source: Some(PathBuf::from("devpts")),
                    target: rootfs.path().join("dev/pts"),
                    fstype: Some("devpts".into()),
                    flags: MsFlags::MS_NOSUID,
                    data: Some("mode=0620".into()),
                },
            ]
        );
    }

    #[test]
    fn mount_all_stops_at_first_failure() {
        let rootfs = tempfile::tempdir().unwrap();
        let sys = TestSyscall::failing_on("mount");
        let mounts = vec![
            Mount {
                destination: PathBuf::from("/a"),
                ..Mount::default()
            },
            Mount {
                destination: PathBuf::from("/b"),
                ..Mount::default()
            },
        ];
        assert!(mount_all(&sys, rootfs.path(), &mounts).is_err());
        assert_eq!(sys.mounts().len(), 1);
        assert!(!rootfs.path().join("b").exists());
    }

    #[test]
    fn bind_of_file_creates_file_target() {
        let rootfs = tempfile::tempdir().unwrap();
        let host = tempfile::NamedTempFile::new().unwrap();
        let sys = TestSyscall::default();
        let mounts = vec![Mount {
            destination: PathBuf::from("/etc/resolv.conf"),
            kind: None,
            source: Some(host.path().to_string_lossy().into_owned()),
            options: vec!["bind".into(), "ro".into()],
        }];
        mount_all(&sys, rootfs.path(), &mounts).unwrap();
        assert!(rootfs.path().join("etc/resolv.conf").is_file());
    }
}
