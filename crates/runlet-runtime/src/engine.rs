//! Runtime engine that drives the container lifecycle.
//!
//! Every operation takes the per-container lock, loads the state,
//! refreshes process liveness, checks its precondition, and only then
//! touches the system.

use std::path::Path;

use nix::sys::signal::Signal;
use runlet_common::config::RuntimeConfig;
use runlet_common::error::{Result, RunletError};
use runlet_common::spec::{NamespaceKind, Spec};
use runlet_common::types::{ContainerId, ContainerStatus};
use runlet_core::capability::ResolvedCapabilities;
use runlet_core::cgroup::{self, CgroupFs, CgroupManager, HostCgroupFs};
use runlet_core::{namespace, rlimit};

use crate::container::Container;
use crate::hooks::{self, HookRunner, HookStage, ProcessHookRunner};
use crate::init::{BootstrapPhase, InitProcess};
use crate::process::{InitRequest, LinuxProcessControl, ProcessControl};
use crate::state::{ContainerState, StateStore};

/// The lifecycle engine.
///
/// Owns the runtime configuration and the OS-facing collaborators, so
/// tests can swap any of them for fakes.
pub struct Runtime {
    config: RuntimeConfig,
    store: StateStore,
    process: Box<dyn ProcessControl>,
    hooks: Box<dyn HookRunner>,
    cgroups: Box<dyn CgroupFs>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    /// An engine acting on the real system.
    #[must_use]
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_parts(
            config,
            Box::new(LinuxProcessControl::new()),
            Box::new(ProcessHookRunner),
            Box::new(HostCgroupFs),
        )
    }

    /// An engine with explicit collaborators.
    #[must_use]
    pub fn with_parts(
        config: RuntimeConfig,
        process: Box<dyn ProcessControl>,
        hooks: Box<dyn HookRunner>,
        cgroups: Box<dyn CgroupFs>,
    ) -> Self {
        Self {
            store: StateStore::new(config.state_root.clone()),
            config,
            process,
            hooks,
            cgroups,
        }
    }

    /// The configuration this engine was built with.
    #[must_use]
    pub const fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    fn cgroup_for(&self, id: &ContainerId, spec: Option<&Spec>) -> Result<CgroupManager<'_>> {
        let relative = spec
            .and_then(|s| s.linux.as_ref())
            .and_then(|l| l.cgroups_path.as_deref());
        let path = cgroup::cgroup_path(&self.config.cgroup_root, id.as_str(), relative)?;
        Ok(CgroupManager::new(path, &*self.cgroups))
    }

    fn load(&self, id: &ContainerId) -> Result<Container> {
        let mut container = Container::load(&self.store, id)?;
        if container.refresh(&*self.process) {
            container.save(&self.store)?;
        }
        Ok(container)
    }

    /// Creates a container from `bundle`.
    ///
    /// On return the init process is stopped inside its namespaces and
    /// cgroup, the state is `created`, and the create hooks have run.
    ///
    /// # Errors
    ///
    /// Returns [`RunletError::AlreadyExists`] if the ID is taken, a spec or
    /// validation error before anything is created, and otherwise the
    /// first failing step. After a failed spawn the state is left as
    /// `stopped` for `delete` to clean up.
    pub fn create(&self, id: &ContainerId, bundle: &Path) -> Result<ContainerState> {
        let _lock = self.store.lock(id)?;
        if self.store.exists(id) {
            return Err(RunletError::AlreadyExists {
                kind: "container",
                id: id.to_string(),
            });
        }

        let bundle = std::fs::canonicalize(bundle).map_err(|e| RunletError::Io {
            path: bundle.to_path_buf(),
            source: e,
        })?;
        let spec = Spec::load(&bundle)?;
        validate(&spec)?;
        let cgroup = self.cgroup_for(id, Some(&spec))?;

        let request = InitRequest {
            init_binary: self.config.init_binary.clone(),
            metadata_dir: self.store.container_dir(id),
            bundle: bundle.clone(),
            clone_flags: namespace::clone_flags(spec.namespaces()),
        };
        let mut container = Container::new(id.clone(), bundle, spec);
        container.save(&self.store)?;
        tracing::info!(id = %id, "creating container");

        let mut init = match InitProcess::spawn(&*self.process, &request) {
            Ok(init) => init,
            Err(e) => {
                self.mark_failed(&mut container);
                return Err(e);
            }
        };

        if let Err(e) = self.bootstrap(&mut container, &mut init, &cgroup) {
            init.abort();
            if let Err(cleanup) = cgroup.destroy() {
                tracing::warn!(id = %id, error = %cleanup, "could not remove cgroup");
            }
            self.mark_failed(&mut container);
            return Err(e);
        }

        tracing::info!(id = %id, pid = container.pid(), "container created");
        Ok(container.state().clone())
    }

    fn bootstrap(
        &self,
        container: &mut Container,
        init: &mut InitProcess<'_>,
        cgroup: &CgroupManager<'_>,
    ) -> Result<()> {
        init.wait_stopped()?;
        let pid = init.pid();
        let spec = container.spec()?.clone();

        if spec.has_namespace(NamespaceKind::User) {
            if let Some(linux) = &spec.linux {
                namespace::user::write_id_mappings(
                    &namespace::user::proc_dir(pid),
                    &linux.uid_mappings,
                    &linux.gid_mappings,
                )?;
            }
        }

        cgroup.create()?;
        if let Some(resources) = spec.resources() {
            cgroup.apply(resources)?;
        }
        cgroup.add_process(pid)?;

        container.set_pid(pid);
        container.set_status(ContainerStatus::Created)?;
        container.save(&self.store)?;

        if let Some(hooks) = &spec.hooks {
            for stage in [
                HookStage::Prestart,
                HookStage::CreateRuntime,
                HookStage::CreateContainer,
            ] {
                hooks::run_stage(&*self.hooks, stage, hooks, container.state())?;
            }
        }
        Ok(())
    }

    fn mark_failed(&self, container: &mut Container) {
        if container.set_status(ContainerStatus::Stopped).is_err() {
            return;
        }
        if let Err(e) = container.save(&self.store) {
            tracing::warn!(id = %container.id(), error = %e, "could not record failed create");
        }
    }

    /// Releases the user process of a `created` container.
    ///
    /// # Errors
    ///
    /// Returns a precondition error unless the container is `created`, a
    /// hook error if a `startContainer` hook fails, or a process error if
    /// the init process cannot be continued.
    pub fn start(&self, id: &ContainerId) -> Result<ContainerState> {
        let _lock = self.store.lock(id)?;
        let mut container = self.load(id)?;
        container.require("start", &[ContainerStatus::Created], "created")?;

        let hooks = container.spec()?.hooks.clone().unwrap_or_default();
        hooks::run_stage(&*self.hooks, HookStage::StartContainer, &hooks, container.state())?;

        let mut init =
            InitProcess::attach(&*self.process, container.pid(), BootstrapPhase::Stopped);
        init.resume()?;
        init.confirm_exec()?;

        container.set_status(ContainerStatus::Running)?;
        container.save(&self.store)?;
        tracing::info!(id = %id, pid = container.pid(), "container started");

        hooks::run_stage(&*self.hooks, HookStage::Poststart, &hooks, container.state())?;
        Ok(container.state().clone())
    }

    /// Sends `signal` to the container process.
    ///
    /// The status is left alone; a later command observes the exit.
    ///
    /// # Errors
    ///
    /// Returns a process error if there is no process to signal or the
    /// signal cannot be delivered, or a precondition error unless the
    /// container is `created` or `running`.
    pub fn kill(&self, id: &ContainerId, signal: Signal) -> Result<()> {
        let _lock = self.store.lock(id)?;
        let container = self.load(id)?;
        if container.pid() == -1 {
            return Err(RunletError::process(format!(
                "container {id} has no process"
            )));
        }
        container.require(
            "kill",
            &[ContainerStatus::Created, ContainerStatus::Running],
            "created or running",
        )?;
        self.process.signal(container.pid(), signal)?;
        tracing::info!(id = %id, pid = container.pid(), %signal, "container signaled");
        Ok(())
    }

    /// Removes a `stopped` container's cgroup and state.
    ///
    /// # Errors
    ///
    /// Returns a precondition error unless the container is `stopped`, or
    /// an I/O error if its cgroup or state cannot be removed.
    pub fn delete(&self, id: &ContainerId) -> Result<()> {
        let lock = self.store.lock(id)?;
        let mut container = self.load(id)?;
        container.require("delete", &[ContainerStatus::Stopped], "stopped")?;

        let spec = match container.spec() {
            Ok(spec) => Some(spec.clone()),
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "bundle unreadable, skipping poststop hooks");
                None
            }
        };
        if let Some(hooks) = spec.as_ref().and_then(|s| s.hooks.as_ref()) {
            hooks::run_stage(&*self.hooks, HookStage::Poststop, hooks, container.state())?;
        }

        self.cgroup_for(id, spec.as_ref())?.destroy()?;
        self.store.delete(id)?;
        lock.remove();
        tracing::info!(id = %id, "container deleted");
        Ok(())
    }

    /// Reads a container's state, refreshed for process exit.
    ///
    /// # Errors
    ///
    /// Returns [`RunletError::NotFound`] if the container does not exist.
    pub fn state(&self, id: &ContainerId) -> Result<ContainerState> {
        let _lock = self.store.lock(id)?;
        Ok(self.load(id)?.state().clone())
    }
}

/// Checks everything that would otherwise fail halfway through setup.
fn validate(spec: &Spec) -> Result<()> {
    if !spec.has_namespace(NamespaceKind::Mount) {
        return Err(RunletError::validation(
            "a mount namespace is required to switch the root filesystem",
        ));
    }
    if let Some(resources) = spec.resources() {
        let _ = cgroup::plan(resources)?;
    }
    if let Some(process) = &spec.process {
        for limit in &process.rlimits {
            let _ = rlimit::resource_from_name(&limit.kind)?;
        }
        if let Some(caps) = &process.capabilities {
            let _ = ResolvedCapabilities::resolve(caps)?;
        }
    }
    Ok(())
}
