//! Cgroups v2 resource management.
//!
//! Each container gets its own directory under the configured cgroup root.
//! Resource limits are turned into a list of control-file writes by the
//! table in [`rules`], validated as a whole, and only then written.

pub mod cpu;
pub mod io;
pub mod memory;
pub mod rules;

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use nix::sys::statfs::{CGROUP2_SUPER_MAGIC, statfs};
use runlet_common::error::{Result, RunletError};
use runlet_common::spec::Resources;

pub use rules::plan;

/// A single value destined for one control file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlWrite {
    /// Control file name inside the container's cgroup directory.
    pub file: String,
    /// Exact content to write.
    pub value: String,
}

impl ControlWrite {
    /// Builds a write of `value` to `file`.
    pub fn new(file: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            value: value.into(),
        }
    }
}

/// Filesystem operations the cgroup manager needs.
pub trait CgroupFs {
    /// Creates a directory and its parents.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be created.
    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Writes `value` to a control file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the write fails.
    fn write(&self, path: &Path, value: &str) -> Result<()>;

    /// Reads a control file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read.
    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Removes a cgroup directory. A missing directory is not an error.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be removed.
    fn remove_dir(&self, path: &Path) -> Result<()>;
}

/// [`CgroupFs`] on the host filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostCgroupFs;

fn io_error(path: &Path, source: std::io::Error) -> RunletError {
    RunletError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl CgroupFs for HostCgroupFs {
    fn create_dir_all(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path).map_err(|e| io_error(path, e))
    }

    fn write(&self, path: &Path, value: &str) -> Result<()> {
        std::fs::write(path, value).map_err(|e| io_error(path, e))
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path).map_err(|e| io_error(path, e))
    }

    fn remove_dir(&self, path: &Path) -> Result<()> {
        match std::fs::remove_dir(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            // A busy cgroup fails with EBUSY and a child cgroup with
            // ENOTEMPTY; neither is retried. Only a plain directory standing
            // in for a cgroup holds real files to clear.
            Err(e) if e.kind() == ErrorKind::DirectoryNotEmpty && !is_cgroupfs(path) => {
                std::fs::remove_dir_all(path).map_err(|e| io_error(path, e))
            }
            Err(e) => Err(io_error(path, e)),
        }
    }
}

/// Whether `path` lives on a cgroup v2 filesystem.
fn is_cgroupfs(path: &Path) -> bool {
    statfs(path).is_ok_and(|fs| fs.filesystem_type() == CGROUP2_SUPER_MAGIC)
}

/// Resolves a container's cgroup directory.
///
/// A configured `cgroupsPath` is taken relative to `root`; otherwise the
/// container ID names the directory.
///
/// # Errors
///
/// Returns a validation error if `cgroups_path` contains `..` or is empty.
pub fn cgroup_path(root: &Path, id: &str, cgroups_path: Option<&str>) -> Result<PathBuf> {
    let Some(relative) = cgroups_path else {
        return Ok(root.join(id));
    };
    let mut path = root.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir | Component::Prefix(_) => {
                return Err(RunletError::validation(format!(
                    "cgroupsPath {relative:?} escapes the cgroup root"
                )));
            }
        }
    }
    if path == root {
        return Err(RunletError::validation("cgroupsPath must name a directory"));
    }
    Ok(path)
}

/// Handle to a cgroup for a specific container.
pub struct CgroupManager<'a> {
    path: PathBuf,
    fs: &'a dyn CgroupFs,
}

impl std::fmt::Debug for CgroupManager<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CgroupManager")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl<'a> CgroupManager<'a> {
    /// A manager for the cgroup at `path`. Nothing is created yet.
    #[must_use]
    pub fn new(path: PathBuf, fs: &'a dyn CgroupFs) -> Self {
        Self { path, fs }
    }

    /// Path to this container's cgroup directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the cgroup directory.
    ///
    /// Controllers available in the parent are enabled for its children
    /// first, on a best-effort basis.
    ///
    /// # Errors
    ///
    /// Returns an error if the cgroup directory cannot be created.
    pub fn create(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            self.fs.create_dir_all(parent)?;
            self.enable_controllers(parent);
        }
        self.fs.create_dir_all(&self.path)?;
        tracing::info!(path = %self.path.display(), "cgroup created");
        Ok(())
    }

    fn enable_controllers(&self, parent: &Path) {
        let Ok(available) = self.fs.read_to_string(&parent.join("cgroup.controllers")) else {
            return;
        };
        let wanted: Vec<String> = available.split_whitespace().map(|c| format!("+{c}")).collect();
        if wanted.is_empty() {
            return;
        }
        let control = parent.join("cgroup.subtree_control");
        if let Err(e) = self.fs.write(&control, &wanted.join(" ")) {
            tracing::debug!(error = %e, "could not enable controllers");
        }
    }

    /// Applies resource limits to this cgroup.
    ///
    /// Every value is formatted and validated before the first write. Only
    /// fields present in `resources` are written. A failed write aborts
    /// the rest; values already written stay in place.
    ///
    /// # Errors
    ///
    /// Returns a validation error for out-of-range values or an I/O error
    /// if writing a control file fails.
    pub fn apply(&self, resources: &Resources) -> Result<()> {
        let writes = plan(resources)?;
        for write in &writes {
            let file = self.path.join(&write.file);
            self.fs.write(&file, &write.value)?;
            tracing::debug!(file = %write.file, value = %write.value, "cgroup value set");
        }
        tracing::info!(path = %self.path.display(), writes = writes.len(), "cgroup limits applied");
        Ok(())
    }

    /// Adds a process to this cgroup by writing its PID.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to `cgroup.procs` fails.
    pub fn add_process(&self, pid: i32) -> Result<()> {
        self.fs.write(&self.path.join("cgroup.procs"), &pid.to_string())?;
        tracing::debug!(pid, "added process to cgroup");
        Ok(())
    }

    /// Removes the cgroup directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the cgroup directory cannot be removed.
    pub fn destroy(&self) -> Result<()> {
        self.fs.remove_dir(&self.path)?;
        tracing::info!(path = %self.path.display(), "cgroup destroyed");
        Ok(())
    }
}
