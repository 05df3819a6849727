//! Lifecycle hook execution.
//!
//! Hooks run synchronously, one after another, with the bundle as working
//! directory, exactly the environment they declare, and the container
//! state JSON on stdin.

use std::io::{ErrorKind, Write};
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use nix::fcntl::{FcntlArg, OFlag, fcntl};
use runlet_common::error::{Result, RunletError};
use runlet_common::spec::{Hook, Hooks};

use crate::state::ContainerState;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Lifecycle point a hook list belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    /// During `create`, after the runtime environment is ready.
    Prestart,
    /// During `create`, after `prestart`.
    CreateRuntime,
    /// During `create`, after `createRuntime`.
    CreateContainer,
    /// During `start`, before the user process runs.
    StartContainer,
    /// After the user process has been released.
    Poststart,
    /// During `delete`.
    Poststop,
}

impl HookStage {
    /// Name as written in `config.json`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Prestart => "prestart",
            Self::CreateRuntime => "createRuntime",
            Self::CreateContainer => "createContainer",
            Self::StartContainer => "startContainer",
            Self::Poststart => "poststart",
            Self::Poststop => "poststop",
        }
    }

    /// Whether a failing hook aborts the enclosing operation.
    ///
    /// `poststart` and `poststop` run after the point of no return, so
    /// their failures are only logged.
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        !matches!(self, Self::Poststart | Self::Poststop)
    }

    /// The hook list for this stage.
    #[must_use]
    pub fn select(self, hooks: &Hooks) -> &[Hook] {
        match self {
            Self::Prestart => &hooks.prestart,
            Self::CreateRuntime => &hooks.create_runtime,
            Self::CreateContainer => &hooks.create_container,
            Self::StartContainer => &hooks.start_container,
            Self::Poststart => &hooks.poststart,
            Self::Poststop => &hooks.poststop,
        }
    }
}

/// Runs a single hook to completion.
pub trait HookRunner {
    /// Runs `hook` in `cwd`, feeding `state_json` on stdin.
    ///
    /// # Errors
    ///
    /// Returns an error if the hook cannot be started, exits unsuccessfully,
    /// or exceeds its timeout.
    fn run(&self, hook: &Hook, state_json: &str, cwd: &Path) -> Result<()>;
}

/// [`HookRunner`] that spawns hooks as child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessHookRunner;

impl HookRunner for ProcessHookRunner {
    fn run(&self, hook: &Hook, state_json: &str, cwd: &Path) -> Result<()> {
        let mut cmd = Command::new(&hook.path);
        if let Some((argv0, rest)) = hook.args.split_first() {
            let _ = cmd.arg0(argv0).args(rest);
        }
        let _ = cmd
            .env_clear()
            .envs(hook.env.iter().filter_map(|kv| kv.split_once('=')))
            .current_dir(cwd)
            .stdin(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| RunletError::Io {
            path: hook.path.clone(),
            source: e,
        })?;

        // The state goes in from the same loop that watches the deadline,
        // so a hook that never reads its input still times out.
        let stdin = match child.stdin.take() {
            Some(stdin) => {
                if let Err(e) = fcntl(&stdin, FcntlArg::F_SETFL(OFlag::O_NONBLOCK)) {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(RunletError::syscall("fcntl(O_NONBLOCK)", e));
                }
                Some(stdin)
            }
            None => None,
        };

        let timeout = hook.timeout.filter(|t| *t > 0).map(|t| Duration::from_secs(t.into()));
        let status = supervise(&mut child, stdin, state_json.as_bytes(), &hook.path, timeout)?;
        if !status.success() {
            return Err(RunletError::process(format!("hook {status}")));
        }
        Ok(())
    }
}

/// Feeds `input` to the hook and waits for it, killing it at the deadline.
fn supervise(
    child: &mut Child,
    mut stdin: Option<ChildStdin>,
    mut input: &[u8],
    path: &Path,
    timeout: Option<Duration>,
) -> Result<ExitStatus> {
    let io_err = |e| RunletError::Io {
        path: path.to_path_buf(),
        source: e,
    };
    let started = Instant::now();
    loop {
        if let Some(pipe) = stdin.as_mut() {
            match pipe.write(input) {
                Ok(n) => input = &input[n..],
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {}
                // The hook is free to ignore its input.
                Err(e) if e.kind() == ErrorKind::BrokenPipe => input = &[],
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(io_err(e));
                }
            }
            if input.is_empty() {
                stdin = None;
            }
        }
        if let Some(status) = child.try_wait().map_err(io_err)? {
            return Ok(status);
        }
        if let Some(timeout) = timeout.filter(|t| started.elapsed() >= *t) {
            let _ = child.kill();
            let _ = child.wait();
            return Err(RunletError::process(format!(
                "timed out after {}s",
                timeout.as_secs()
            )));
        }
        // Poll faster while input is still pending.
        let pause = if stdin.is_some() { POLL_INTERVAL / 10 } else { POLL_INTERVAL };
        std::thread::sleep(pause);
    }
}

/// Runs every hook of `stage` in order.
///
/// For fatal stages the first failure is returned as
/// [`RunletError::Hook`]. For `poststart` and `poststop` failures are
/// logged and the remaining hooks still run.
///
/// # Errors
///
/// Returns a hook error for the first failing hook of a fatal stage.
pub fn run_stage(
    runner: &dyn HookRunner,
    stage: HookStage,
    hooks: &Hooks,
    state: &ContainerState,
) -> Result<()> {
    let list = stage.select(hooks);
    if list.is_empty() {
        return Ok(());
    }
    let state_json = serde_json::to_string(state)?;

    for hook in list {
        tracing::debug!(stage = stage.name(), path = %hook.path.display(), "running hook");
        let Err(e) = runner.run(hook, &state_json, &state.bundle) else {
            continue;
        };
        if stage.is_fatal() {
            return Err(RunletError::Hook {
                stage: stage.name(),
                path: hook.path.clone(),
                reason: e.to_string(),
            });
        }
        tracing::warn!(
            stage = stage.name(),
            path = %hook.path.display(),
            error = %e,
            "hook failed, continuing"
        );
    }
    tracing::info!(stage = stage.name(), count = list.len(), "hooks finished");
    Ok(())
}
