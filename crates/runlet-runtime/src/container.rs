//! The container aggregate: persisted state plus its bundle spec.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use runlet_common::constants;
use runlet_common::error::{Result, RunletError};
use runlet_common::spec::Spec;
use runlet_common::types::{ContainerId, ContainerStatus};

use crate::process::ProcessControl;
use crate::state::{ContainerState, StateStore};

/// A container instance with its state and, once loaded, its spec.
#[derive(Debug)]
pub struct Container {
    state: ContainerState,
    spec: Option<Spec>,
}

impl Container {
    /// A new container in the `creating` status.
    ///
    /// Annotations are copied from the spec and stamped with the creation
    /// time.
    #[must_use]
    pub fn new(id: ContainerId, bundle: PathBuf, spec: Spec) -> Self {
        let mut annotations: BTreeMap<String, String> = spec
            .annotations
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let _ = annotations.insert(
            constants::CREATED_ANNOTATION.to_string(),
            chrono::Utc::now().to_rfc3339(),
        );
        Self {
            state: ContainerState::new(id, bundle, annotations),
            spec: Some(spec),
        }
    }

    /// Loads a container's persisted state. The spec is read lazily.
    ///
    /// # Errors
    ///
    /// Returns [`RunletError::NotFound`] if the container does not exist.
    pub fn load(store: &StateStore, id: &ContainerId) -> Result<Self> {
        Ok(Self {
            state: store.load(id)?,
            spec: None,
        })
    }

    /// Container identifier.
    #[must_use]
    pub const fn id(&self) -> &ContainerId {
        &self.state.id
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> ContainerStatus {
        self.state.status
    }

    /// Recorded PID, or -1.
    #[must_use]
    pub const fn pid(&self) -> i32 {
        self.state.pid
    }

    /// Absolute bundle path.
    #[must_use]
    pub fn bundle(&self) -> &Path {
        &self.state.bundle
    }

    /// The persisted state record.
    #[must_use]
    pub const fn state(&self) -> &ContainerState {
        &self.state
    }

    /// The bundle spec, read from disk on first use.
    ///
    /// # Errors
    ///
    /// Returns a spec error if `config.json` cannot be loaded.
    pub fn spec(&mut self) -> Result<&Spec> {
        if self.spec.is_none() {
            self.spec = Some(Spec::load(&self.state.bundle)?);
        }
        self.spec
            .as_ref()
            .ok_or_else(|| RunletError::validation("bundle spec unavailable"))
    }

    /// Rejects `operation` unless the status is one of `allowed`.
    ///
    /// # Errors
    ///
    /// Returns [`RunletError::Precondition`] naming the found and expected
    /// statuses.
    pub fn require(
        &self,
        operation: &'static str,
        allowed: &[ContainerStatus],
        expected: &'static str,
    ) -> Result<()> {
        if allowed.contains(&self.state.status) {
            return Ok(());
        }
        Err(RunletError::Precondition {
            id: self.state.id.to_string(),
            operation,
            status: self.state.status.to_string(),
            expected,
        })
    }

    /// Moves the container forward to `status`.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `status` does not come after the
    /// current one.
    pub fn set_status(&mut self, status: ContainerStatus) -> Result<()> {
        if !self.state.status.can_advance_to(status) {
            return Err(RunletError::validation(format!(
                "container {} cannot move from {} to {status}",
                self.state.id, self.state.status
            )));
        }
        tracing::info!(id = %self.state.id, from = %self.state.status, to = %status, "status");
        self.state.status = status;
        if status == ContainerStatus::Stopped {
            self.state.pid = -1;
        }
        Ok(())
    }

    /// Records the container process.
    pub const fn set_pid(&mut self, pid: i32) {
        self.state.pid = pid;
    }

    /// Marks a container whose process is gone as `stopped`.
    ///
    /// A `creating` record seen by another command means its creator died
    /// mid-way. Returns whether anything changed.
    pub fn refresh(&mut self, control: &dyn ProcessControl) -> bool {
        let gone = match self.state.status {
            ContainerStatus::Creating => true,
            ContainerStatus::Created | ContainerStatus::Running => {
                self.state.pid <= 0 || !control.is_alive(self.state.pid)
            }
            ContainerStatus::Stopped => false,
        };
        if !gone {
            return false;
        }
        tracing::info!(id = %self.state.id, pid = self.state.pid, "container process is gone");
        self.state.status = ContainerStatus::Stopped;
        self.state.pid = -1;
        true
    }

    /// Persists the current state.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the state cannot be written.
    pub fn save(&self, store: &StateStore) -> Result<()> {
        store.save(&self.state)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use nix::sys::signal::Signal;

    use super::*;
    use crate::process::InitRequest;

    struct Liveness(bool);

    impl ProcessControl for Liveness {
        fn spawn_init(&self, _request: &InitRequest) -> Result<i32> {
            Ok(1)
        }
        fn stop(&self, _pid: i32) -> Result<()> {
            Ok(())
        }
        fn signal(&self, _pid: i32, _signal: Signal) -> Result<()> {
            Ok(())
        }
        fn is_alive(&self, _pid: i32) -> bool {
            self.0
        }
        fn reap(&self, _pid: i32) {}
    }

    fn container() -> Container {
        let spec = Spec {
            annotations: HashMap::from([("org.example".to_string(), "yes".to_string())]),
            ..Spec::default()
        };
        Container::new(
            ContainerId::parse("c1").unwrap(),
            PathBuf::from("/bundles/demo"),
            spec,
        )
    }

    #[test]
    fn new_container_is_creating_with_annotations() {
        let c = container();
        assert_eq!(c.status(), ContainerStatus::Creating);
        assert_eq!(c.pid(), -1);
        assert_eq!(c.state().annotations["org.example"], "yes");
        assert!(c.state().annotations.contains_key("runlet.created"));
    }

    #[test]
    fn require_reports_found_and_expected() {
        let c = container();
        let err = c
            .require("start", &[ContainerStatus::Created], "created")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot start container c1: status is creating, expected created"
        );
    }

    #[test]
    fn status_never_moves_backwards() {
        let mut c = container();
        c.set_status(ContainerStatus::Created).unwrap();
        c.set_pid(10);
        c.set_status(ContainerStatus::Running).unwrap();
        assert!(c.set_status(ContainerStatus::Created).is_err());
        c.set_status(ContainerStatus::Stopped).unwrap();
        assert_eq!(c.pid(), -1);
    }

    #[test]
    fn refresh_stops_dead_process() {
        let mut c = container();
        c.set_status(ContainerStatus::Created).unwrap();
        c.set_pid(10);
        assert!(!c.refresh(&Liveness(true)));
        assert_eq!(c.status(), ContainerStatus::Created);
        assert!(c.refresh(&Liveness(false)));
        assert_eq!(c.status(), ContainerStatus::Stopped);
        assert_eq!(c.pid(), -1);
        assert!(!c.refresh(&Liveness(false)));
    }

    #[test]
    fn refresh_treats_leftover_creating_as_stopped() {
        let mut c = container();
        assert!(c.refresh(&Liveness(true)));
        assert_eq!(c.status(), ContainerStatus::Stopped);
    }

    #[test]
    fn spec_is_loaded_from_bundle_on_demand() {
        let bundle = tempfile::tempdir().unwrap();
        std::fs::write(
            bundle.path().join("config.json"),
            r#"{ "process": { "args": ["true"] }, "root": { "path": "rootfs" } }"#,
        )
        .unwrap();
        let store = StateStore::new(bundle.path().join("state"));
        let id = ContainerId::parse("c2").unwrap();
        store
            .save(&ContainerState::new(id.clone(), bundle.path().to_path_buf(), BTreeMap::new()))
            .unwrap();

        let mut c = Container::load(&store, &id).unwrap();
        assert_eq!(c.spec().unwrap().process.as_ref().unwrap().args, vec!["true"]);
    }
}
