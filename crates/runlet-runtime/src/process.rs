//! Spawning and signaling the container init process.
//!
//! The init process is a re-exec of the runtime binary, cloned directly
//! into the container's new namespaces. It first leaves the caller's
//! session, so the `create` process exiting cannot orphan a process group
//! holding it and trigger the kernel's `SIGHUP`/`SIGCONT` pair. It then
//! reports ready and blocks on a release pipe. The parent delivers
//! `SIGSTOP`, confirms the stop with `waitpid(WUNTRACED)` and only then
//! writes the release byte, so the child is guaranteed to sit stopped until
//! a later `SIGCONT`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::CString;
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use nix::fcntl::OFlag;
use nix::sched::CloneFlags;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use runlet_common::constants;
use runlet_common::error::{Result, RunletError};

const STACK_SIZE: usize = 1024 * 1024;

/// Everything needed to start the init process.
#[derive(Debug, Clone)]
pub struct InitRequest {
    /// Binary to re-execute, normally `/proc/self/exe`.
    pub init_binary: PathBuf,
    /// The container's state directory, passed as the init argument.
    pub metadata_dir: PathBuf,
    /// Absolute bundle path, passed through the environment.
    pub bundle: PathBuf,
    /// Namespaces the child is cloned into.
    pub clone_flags: CloneFlags,
}

/// Process operations the lifecycle engine depends on.
pub trait ProcessControl {
    /// Clones the init process into its namespaces and returns its host PID.
    ///
    /// The child does not run any setup until [`ProcessControl::stop`] has
    /// returned and the process is later continued.
    ///
    /// # Errors
    ///
    /// Returns a process error if the clone fails.
    fn spawn_init(&self, request: &InitRequest) -> Result<i32>;

    /// Delivers `SIGSTOP` and blocks until the stop is observed.
    ///
    /// # Errors
    ///
    /// Returns a process error if the signal cannot be sent or the process
    /// exits instead of stopping.
    fn stop(&self, pid: i32) -> Result<()>;

    /// Sends `signal` to `pid`.
    ///
    /// # Errors
    ///
    /// Returns a process error if `kill(2)` fails.
    fn signal(&self, pid: i32, signal: Signal) -> Result<()>;

    /// Whether `pid` names a live, non-zombie process.
    fn is_alive(&self, pid: i32) -> bool;

    /// Collects the exit status of a child of this process, if it is one.
    fn reap(&self, pid: i32);
}

/// [`ProcessControl`] backed by `clone(2)`, `kill(2)` and `waitpid(2)`.
#[derive(Debug, Default)]
pub struct LinuxProcessControl {
    release: RefCell<HashMap<i32, OwnedFd>>,
}

impl LinuxProcessControl {
    /// A controller with no spawned children.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn cstring(bytes: &[u8]) -> Result<CString> {
    CString::new(bytes).map_err(|_| RunletError::validation("argument contains a NUL byte"))
}

fn init_argv(request: &InitRequest) -> Result<Vec<CString>> {
    Ok(vec![
        cstring(constants::APP_NAME.as_bytes())?,
        cstring(constants::INIT_SUBCOMMAND.as_bytes())?,
        cstring(request.metadata_dir.as_os_str().as_bytes())?,
    ])
}

fn init_env(bundle: &Path) -> Result<Vec<CString>> {
    let mut env = Vec::new();
    for (key, value) in std::env::vars_os() {
        if key == constants::BUNDLE_ENV {
            continue;
        }
        let mut entry = key.as_bytes().to_vec();
        entry.push(b'=');
        entry.extend_from_slice(value.as_bytes());
        env.push(cstring(&entry)?);
    }
    let mut bundle_entry = format!("{}=", constants::BUNDLE_ENV).into_bytes();
    bundle_entry.extend_from_slice(bundle.as_os_str().as_bytes());
    env.push(cstring(&bundle_entry)?);
    Ok(env)
}

impl ProcessControl for LinuxProcessControl {
    fn spawn_init(&self, request: &InitRequest) -> Result<i32> {
        let binary = cstring(request.init_binary.as_os_str().as_bytes())?;
        let argv = init_argv(request)?;
        let envp = init_env(&request.bundle)?;
        let (release_rx, release_tx) =
            nix::unistd::pipe2(OFlag::O_CLOEXEC).map_err(|e| RunletError::syscall("pipe2", e))?;
        let (ready_rx, ready_tx) =
            nix::unistd::pipe2(OFlag::O_CLOEXEC).map_err(|e| RunletError::syscall("pipe2", e))?;
        let release_tx_raw = release_tx.as_raw_fd();
        let ready_rx_raw = ready_rx.as_raw_fd();

        let child = Box::new(|| {
            // The child's copies of the parent's ends must go, or a dead
            // parent would never produce EOF.
            // SAFETY: both are descriptors this process owns a copy of.
            let _ = unsafe { libc::close(release_tx_raw) };
            // SAFETY: as above.
            let _ = unsafe { libc::close(ready_rx_raw) };
            if nix::unistd::setsid().is_err() {
                return 1;
            }
            if nix::unistd::write(&ready_tx, &[1]).is_err() {
                return 1;
            }
            let mut byte = [0_u8; 1];
            match nix::unistd::read(&release_rx, &mut byte) {
                Ok(1) => {}
                _ => return 1,
            }
            let _ = nix::unistd::execve(&binary, &argv, &envp);
            127
        });

        let mut stack = vec![0_u8; STACK_SIZE];
        // SAFETY: the child runs in a copy of this address space (no
        // CLONE_VM) and only reads, closes a descriptor, and execs.
        let pid = unsafe {
            nix::sched::clone(
                child,
                &mut stack,
                request.clone_flags,
                Some(Signal::SIGCHLD as libc::c_int),
            )
        }
        .map_err(|e| RunletError::process(format!("clone init process: {e}")))?;

        // The stop must not land before the child has its own session.
        drop(ready_tx);
        let mut byte = [0_u8; 1];
        match nix::unistd::read(&ready_rx, &mut byte) {
            Ok(1) => {}
            outcome => {
                self.reap(pid.as_raw());
                return Err(RunletError::process(format!(
                    "init process {pid} exited before it was ready: {outcome:?}"
                )));
            }
        }

        let _ = self.release.borrow_mut().insert(pid.as_raw(), release_tx);
        tracing::info!(
            pid = pid.as_raw(),
            flags = request.clone_flags.bits(),
            "init process cloned"
        );
        Ok(pid.as_raw())
    }

    fn stop(&self, pid: i32) -> Result<()> {
        let target = Pid::from_raw(pid);
        kill(target, Signal::SIGSTOP)
            .map_err(|e| RunletError::process(format!("stop pid {pid}: {e}")))?;
        match waitpid(target, Some(WaitPidFlag::WUNTRACED)) {
            Ok(WaitStatus::Stopped(_, _)) => {}
            Ok(status) => {
                return Err(RunletError::process(format!(
                    "init process {pid} did not stop: {status:?}"
                )));
            }
            Err(e) => return Err(RunletError::process(format!("wait for pid {pid}: {e}"))),
        }

        if let Some(tx) = self.release.borrow_mut().remove(&pid) {
            let _ = nix::unistd::write(&tx, &[1])
                .map_err(|e| RunletError::process(format!("release pid {pid}: {e}")))?;
        }
        tracing::debug!(pid, "init process stopped");
        Ok(())
    }

    fn signal(&self, pid: i32, signal: Signal) -> Result<()> {
        kill(Pid::from_raw(pid), signal)
            .map_err(|e| RunletError::process(format!("send {signal} to pid {pid}: {e}")))?;
        tracing::debug!(pid, %signal, "signal delivered");
        Ok(())
    }

    fn is_alive(&self, pid: i32) -> bool {
        if pid <= 0 || kill(Pid::from_raw(pid), None).is_err() {
            return false;
        }
        std::fs::read_to_string(format!("/proc/{pid}/stat"))
            .map_or(true, |stat| !is_zombie_stat(&stat))
    }

    fn reap(&self, pid: i32) {
        let _ = self.release.borrow_mut().remove(&pid);
        if let Err(e) = waitpid(Pid::from_raw(pid), None) {
            tracing::debug!(pid, error = %e, "could not reap process");
        }
    }
}

/// Whether a `/proc/<pid>/stat` line reports a zombie or dead task.
///
/// The state letter follows the command name, which is wrapped in
/// parentheses and may itself contain spaces or parentheses.
fn is_zombie_stat(stat: &str) -> bool {
    stat_state(stat).is_some_and(|state| matches!(state, "Z" | "X"))
}

fn stat_state(stat: &str) -> Option<&str> {
    stat.rfind(')')
        .and_then(|end| stat[end + 1..].split_whitespace().next())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stat_state_letter_is_found_after_command() {
        assert!(is_zombie_stat("42 (sh) Z 1 42 42 0 -1"));
        assert!(is_zombie_stat("42 (odd) name)) X 1"));
        assert!(!is_zombie_stat("42 (sleep) S 1 42 42"));
        assert!(!is_zombie_stat("42 (zombie Z) R 1"));
    }

    #[test]
    fn init_argv_selects_init_entry_point() {
        let request = InitRequest {
            init_binary: PathBuf::from("/proc/self/exe"),
            metadata_dir: PathBuf::from("/run/runlet/c1"),
            bundle: PathBuf::from("/bundles/demo"),
            clone_flags: CloneFlags::empty(),
        };
        let argv = init_argv(&request).unwrap();
        let argv: Vec<&str> = argv.iter().map(|a| a.to_str().unwrap()).collect();
        assert_eq!(argv, vec!["runlet", "init", "/run/runlet/c1"]);
    }

    #[test]
    fn init_env_carries_bundle_once() {
        let env = init_env(Path::new("/bundles/demo")).unwrap();
        let bundle: Vec<_> = env
            .iter()
            .filter_map(|e| e.to_str().ok())
            .filter(|e| e.starts_with("_RUNLET_BUNDLE="))
            .collect();
        assert_eq!(bundle, vec!["_RUNLET_BUNDLE=/bundles/demo"]);
    }

    #[test]
    fn init_stays_stopped_after_creating_job_exits() {
        use std::os::unix::fs::PermissionsExt;
        use std::time::Duration;

        use nix::unistd::{ForkResult, fork, setpgid};

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-init");
        std::fs::write(&script, "#!/bin/sh\ntouch \"$2/ran\"\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        let request = InitRequest {
            init_binary: script,
            metadata_dir: dir.path().to_path_buf(),
            bundle: dir.path().to_path_buf(),
            clone_flags: CloneFlags::empty(),
        };
        let (pid_rx, pid_tx) = nix::unistd::pipe().unwrap();

        // SAFETY: the forked child only spawns, stops, reports a pid and exits.
        match unsafe { fork() }.unwrap() {
            ForkResult::Child => {
                // Run as its own job, the way a shell starts `runlet create`.
                let _ = setpgid(Pid::from_raw(0), Pid::from_raw(0));
                let control = LinuxProcessControl::new();
                let code = match control.spawn_init(&request) {
                    Ok(pid) if control.stop(pid).is_ok() => {
                        let _ = nix::unistd::write(&pid_tx, &pid.to_ne_bytes());
                        0
                    }
                    _ => 1,
                };
                // SAFETY: leave without running the test harness's atexit handlers.
                unsafe { libc::_exit(code) };
            }
            ForkResult::Parent { child } => {
                drop(pid_tx);
                let mut buf = [0_u8; 4];
                assert_eq!(nix::unistd::read(&pid_rx, &mut buf).unwrap(), 4);
                let init = i32::from_ne_bytes(buf);
                let _ = waitpid(child, None).unwrap();

                std::thread::sleep(Duration::from_millis(500));
                let stat = std::fs::read_to_string(format!("/proc/{init}/stat")).unwrap();
                let state = stat_state(&stat).map(str::to_string);
                let _ = kill(Pid::from_raw(init), Signal::SIGKILL);

                assert_eq!(state.as_deref(), Some("T"));
                assert!(!dir.path().join("ran").exists());
            }
        }
    }

    #[test]
    fn spawned_init_waits_for_release() {
        use std::os::unix::fs::PermissionsExt;
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-init");
        std::fs::write(&script, "#!/bin/sh\ntouch \"$2/ran\"\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        let request = InitRequest {
            init_binary: script,
            metadata_dir: dir.path().to_path_buf(),
            bundle: dir.path().to_path_buf(),
            clone_flags: CloneFlags::empty(),
        };

        let control = LinuxProcessControl::new();
        let pid = control.spawn_init(&request).unwrap();
        std::thread::sleep(Duration::from_millis(200));
        assert!(control.is_alive(pid));
        assert!(!dir.path().join("ran").exists());

        control.signal(pid, Signal::SIGKILL).unwrap();
        control.reap(pid);
        assert!(!control.is_alive(pid));
    }

    #[test]
    fn current_process_is_alive_and_bogus_pid_is_not() {
        let control = LinuxProcessControl::new();
        assert!(control.is_alive(i32::try_from(std::process::id()).unwrap()));
        assert!(!control.is_alive(-1));
        assert!(!control.is_alive(0));
    }
}
