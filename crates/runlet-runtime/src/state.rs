//! Persistent state management.
//!
//! Each container has `<root>/<id>/state.json`, the source of truth shared
//! by separate CLI invocations. Writers take a per-ID advisory lock on
//! `<root>/<id>.lock` for their whole read-modify-write, and every save
//! replaces the file atomically.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use nix::fcntl::{Flock, FlockArg};
use runlet_common::constants;
use runlet_common::error::{Result, RunletError};
use runlet_common::types::{ContainerId, ContainerStatus};
use serde::{Deserialize, Serialize};

/// Persistent record of a container's state, in OCI state format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerState {
    /// Runtime spec version.
    pub oci_version: String,
    /// Container identifier.
    pub id: ContainerId,
    /// Current lifecycle status.
    pub status: ContainerStatus,
    /// PID of the container process, or -1 when there is none.
    pub pid: i32,
    /// Absolute path of the bundle.
    pub bundle: PathBuf,
    /// Annotations copied from the spec plus runtime-added entries.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ContainerState {
    /// Initial `creating` state with no process.
    #[must_use]
    pub fn new(id: ContainerId, bundle: PathBuf, annotations: BTreeMap<String, String>) -> Self {
        Self {
            oci_version: constants::OCI_VERSION.to_string(),
            id,
            status: ContainerStatus::Creating,
            pid: -1,
            bundle,
            annotations,
        }
    }
}

/// Exclusive advisory lock on one container ID, released on drop.
#[derive(Debug)]
pub struct StateLock {
    _lock: Flock<File>,
    path: PathBuf,
}

impl StateLock {
    /// Releases the lock and removes its file. Used once the container is gone.
    pub fn remove(self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::debug!(path = %self.path.display(), error = %e, "could not remove lock file");
        }
    }
}

/// On-disk store of container states.
#[derive(Debug, Clone)]
pub struct StateStore {
    root: PathBuf,
}

fn io_error(path: &Path, source: std::io::Error) -> RunletError {
    RunletError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl StateStore {
    /// A store rooted at `root`. The directory is created on first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the state of one container.
    #[must_use]
    pub fn container_dir(&self, id: &ContainerId) -> PathBuf {
        self.root.join(id.as_str())
    }

    fn state_path(&self, id: &ContainerId) -> PathBuf {
        self.container_dir(id).join(constants::STATE_FILE)
    }

    /// Takes the exclusive lock for `id`, blocking until it is available.
    ///
    /// A `delete` may unlink the lock file while others wait on it, so the
    /// lock only counts once the locked file is still the one at the path.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the lock file cannot be opened or locked.
    pub fn lock(&self, id: &ContainerId) -> Result<StateLock> {
        std::fs::create_dir_all(&self.root).map_err(|e| io_error(&self.root, e))?;
        let path = self.root.join(format!("{id}.lock"));
        loop {
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&path)
                .map_err(|e| io_error(&path, e))?;
            let lock = Flock::lock(file, FlockArg::LockExclusive)
                .map_err(|(_, errno)| io_error(&path, errno.into()))?;
            let held = lock.metadata().map_err(|e| io_error(&path, e))?;
            let current = match std::fs::metadata(&path) {
                Ok(meta) => Some(meta),
                Err(e) if e.kind() == ErrorKind::NotFound => None,
                Err(e) => return Err(io_error(&path, e)),
            };
            if current.is_some_and(|m| m.dev() == held.dev() && m.ino() == held.ino()) {
                return Ok(StateLock { _lock: lock, path });
            }
            tracing::debug!(path = %path.display(), "lock file replaced while waiting, retrying");
        }
    }

    /// Whether a state file exists for `id`.
    #[must_use]
    pub fn exists(&self, id: &ContainerId) -> bool {
        self.state_path(id).exists()
    }

    /// Loads the state of `id`.
    ///
    /// # Errors
    ///
    /// Returns [`RunletError::NotFound`] if no state exists, or an I/O or
    /// serialization error if it cannot be read.
    pub fn load(&self, id: &ContainerId) -> Result<ContainerState> {
        let path = self.state_path(id);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RunletError::NotFound {
                    kind: "container",
                    id: id.to_string(),
                });
            }
            Err(e) => return Err(io_error(&path, e)),
        };
        Ok(serde_json::from_str(&content)?)
    }

    /// Persists `state`, replacing any previous version atomically.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the state directory or file cannot be written.
    pub fn save(&self, state: &ContainerState) -> Result<()> {
        let dir = self.container_dir(&state.id);
        std::fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;

        let path = dir.join(constants::STATE_FILE);
        let tmp = dir.join(format!(".{}.tmp", constants::STATE_FILE));
        let content = serde_json::to_string_pretty(state)?;
        std::fs::write(&tmp, content).map_err(|e| io_error(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| io_error(&path, e))?;

        tracing::debug!(id = %state.id, status = %state.status, "state saved");
        Ok(())
    }

    /// Removes the state of `id`. Missing state is not an error.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the state directory cannot be removed.
    pub fn delete(&self, id: &ContainerId) -> Result<()> {
        let dir = self.container_dir(id);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(io_error(&dir, e)),
        }
        tracing::debug!(id = %id, "state removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ContainerId {
        ContainerId::parse(s).unwrap()
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let mut state = ContainerState::new(id("c1"), PathBuf::from("/bundles/demo"), BTreeMap::new());
        state.status = ContainerStatus::Created;
        state.pid = 4242;

        store.save(&state).unwrap();
        assert!(store.exists(&id("c1")));
        assert_eq!(store.load(&id("c1")).unwrap(), state);
        assert!(!dir.path().join("c1/.state.json.tmp").exists());
    }

    #[test]
    fn state_file_uses_oci_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let state = ContainerState::new(
            id("c1"),
            PathBuf::from("/b"),
            BTreeMap::from([("k".to_string(), "v".to_string())]),
        );
        store.save(&state).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("c1/state.json")).unwrap())
                .unwrap();
        assert_eq!(raw["ociVersion"], "1.0.2");
        assert_eq!(raw["id"], "c1");
        assert_eq!(raw["status"], "creating");
        assert_eq!(raw["pid"], -1);
        assert_eq!(raw["bundle"], "/b");
        assert_eq!(raw["annotations"]["k"], "v");
    }

    #[test]
    fn load_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        assert!(store.load(&id("nope")).unwrap_err().is_not_found());
    }

    #[test]
    fn delete_removes_state_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        store
            .save(&ContainerState::new(id("c1"), PathBuf::from("/b"), BTreeMap::new()))
            .unwrap();
        store.delete(&id("c1")).unwrap();
        assert!(!store.exists(&id("c1")));
        store.delete(&id("c1")).unwrap();
    }

    #[test]
    fn lock_creates_and_removes_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state"));
        let lock = store.lock(&id("c1")).unwrap();
        assert!(dir.path().join("state/c1.lock").exists());
        lock.remove();
        assert!(!dir.path().join("state/c1.lock").exists());
        let _again = store.lock(&id("c1")).unwrap();
    }

    #[test]
    fn waiter_relocks_after_lock_file_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let first = store.lock(&id("c1")).unwrap();

        let waiting = store.clone();
        let waiter = std::thread::spawn(move || {
            let lock = waiting.lock(&id("c1")).unwrap();
            let held = lock._lock.metadata().unwrap().ino();
            let on_disk = std::fs::metadata(&lock.path).unwrap().ino();
            (held, on_disk)
        });
        std::thread::sleep(std::time::Duration::from_millis(100));
        first.remove();

        let (held, on_disk) = waiter.join().unwrap();
        assert_eq!(held, on_disk);
    }
}
