//! The two-process bootstrap handshake.
//!
//! The parent side is a small state machine over the init process:
//! `spawned → stopped → resumed → execed`. Each step goes through
//! [`ProcessControl`], so the protocol can be driven without real
//! processes in tests. The child side lives in [`child`].

pub mod child;

use std::fmt;

use nix::sys::signal::Signal;
use runlet_common::error::{Result, RunletError};

use crate::process::{InitRequest, ProcessControl};

/// Where the init process is in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapPhase {
    /// Cloned into its namespaces, not yet confirmed stopped.
    Spawned,
    /// Stopped; cgroup and state setup may proceed.
    Stopped,
    /// Continued; container setup is running.
    Resumed,
    /// Confirmed running past the resume.
    Execed,
}

impl BootstrapPhase {
    const fn next(self) -> Option<Self> {
        match self {
            Self::Spawned => Some(Self::Stopped),
            Self::Stopped => Some(Self::Resumed),
            Self::Resumed => Some(Self::Execed),
            Self::Execed => None,
        }
    }
}

impl fmt::Display for BootstrapPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Spawned => "spawned",
            Self::Stopped => "stopped",
            Self::Resumed => "resumed",
            Self::Execed => "execed",
        };
        f.write_str(name)
    }
}

/// Parent-side handle on the init process.
pub struct InitProcess<'a> {
    pid: i32,
    phase: BootstrapPhase,
    control: &'a dyn ProcessControl,
}

impl fmt::Debug for InitProcess<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitProcess")
            .field("pid", &self.pid)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

impl<'a> InitProcess<'a> {
    /// Clones a new init process.
    ///
    /// # Errors
    ///
    /// Returns a process error if the clone fails.
    pub fn spawn(control: &'a dyn ProcessControl, request: &InitRequest) -> Result<Self> {
        let pid = control.spawn_init(request)?;
        tracing::info!(pid, phase = %BootstrapPhase::Spawned, "bootstrap");
        Ok(Self {
            pid,
            phase: BootstrapPhase::Spawned,
            control,
        })
    }

    /// Takes over an init process spawned by an earlier command.
    #[must_use]
    pub fn attach(control: &'a dyn ProcessControl, pid: i32, phase: BootstrapPhase) -> Self {
        Self {
            pid,
            phase,
            control,
        }
    }

    /// Host PID of the init process.
    #[must_use]
    pub const fn pid(&self) -> i32 {
        self.pid
    }

    /// Current handshake phase.
    #[must_use]
    pub const fn phase(&self) -> BootstrapPhase {
        self.phase
    }

    fn advance(&mut self, next: BootstrapPhase) -> Result<()> {
        if self.phase.next() != Some(next) {
            return Err(RunletError::process(format!(
                "bootstrap of pid {} cannot go from {} to {next}",
                self.pid, self.phase
            )));
        }
        self.phase = next;
        tracing::info!(pid = self.pid, phase = %next, "bootstrap");
        Ok(())
    }

    /// Stops the freshly spawned child and waits until it is stopped.
    ///
    /// # Errors
    ///
    /// Returns a process error if the child is not in the `spawned` phase
    /// or does not stop.
    pub fn wait_stopped(&mut self) -> Result<()> {
        if self.phase != BootstrapPhase::Spawned {
            return self.advance(BootstrapPhase::Stopped);
        }
        self.control.stop(self.pid)?;
        self.advance(BootstrapPhase::Stopped)
    }

    /// Continues the stopped child.
    ///
    /// # Errors
    ///
    /// Returns a process error if the child is not stopped or cannot be
    /// signaled.
    pub fn resume(&mut self) -> Result<()> {
        if self.phase != BootstrapPhase::Stopped {
            return self.advance(BootstrapPhase::Resumed);
        }
        self.control.signal(self.pid, Signal::SIGCONT)?;
        self.advance(BootstrapPhase::Resumed)
    }

    /// Confirms the resumed child is still alive.
    ///
    /// # Errors
    ///
    /// Returns a process error if the child is not resumed or has already
    /// exited.
    pub fn confirm_exec(&mut self) -> Result<()> {
        if self.phase == BootstrapPhase::Resumed && !self.control.is_alive(self.pid) {
            return Err(RunletError::process(format!(
                "container process {} exited during start",
                self.pid
            )));
        }
        self.advance(BootstrapPhase::Execed)
    }

    /// Kills and reaps a child that will never be resumed.
    pub fn abort(self) {
        if let Err(e) = self.control.signal(self.pid, Signal::SIGKILL) {
            tracing::warn!(pid = self.pid, error = %e, "could not kill init process");
        }
        self.control.reap(self.pid);
        tracing::info!(pid = self.pid, phase = %self.phase, "bootstrap aborted");
    }
}
