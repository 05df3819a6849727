//! Unified error types for the runlet workspace.
//!
//! The variants follow the runtime's failure taxonomy: validation problems are
//! reported before any side effect, I/O and syscall failures abort the current
//! step, precondition failures reject a lifecycle transition outright, and
//! process failures are fatal to the command that hit them.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum RunletError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// An argument or configuration value is invalid.
    #[error("invalid argument: {message}")]
    Validation {
        /// Description of the invalid value.
        message: String,
    },

    /// A lifecycle operation was attempted from a status that does not allow it.
    #[error("cannot {operation} container {id}: status is {status}, expected {expected}")]
    Precondition {
        /// Container the operation targeted.
        id: String,
        /// Name of the rejected operation.
        operation: &'static str,
        /// Status found on disk.
        status: String,
        /// Status (or statuses) the operation requires.
        expected: &'static str,
    },

    /// Spawning or signaling a process failed.
    #[error("process error: {message}")]
    Process {
        /// Description of the failure.
        message: String,
    },

    /// A lifecycle hook failed, timed out, or could not be started.
    #[error("{stage} hook {path} failed: {reason}")]
    Hook {
        /// Lifecycle stage the hook belongs to.
        stage: &'static str,
        /// Path of the hook executable.
        path: PathBuf,
        /// Why the hook failed.
        reason: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// A resource that must be unique already exists.
    #[error("{kind} already exists: {id}")]
    AlreadyExists {
        /// Type of the conflicting resource.
        kind: &'static str,
        /// Identifier of the conflicting resource.
        id: String,
    },

    /// A system call failed.
    #[error("{op} failed: {source}")]
    Syscall {
        /// Name of the operation, including its target where useful.
        op: String,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// The bundle's `config.json` could not be read or parsed.
    #[error("invalid bundle spec at {path}: {message}")]
    Spec {
        /// Path of the offending `config.json`.
        path: PathBuf,
        /// Parser or validation message.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl RunletError {
    /// Builds a [`RunletError::Validation`] from any displayable message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Builds a [`RunletError::Process`] from any displayable message.
    pub fn process(message: impl Into<String>) -> Self {
        Self::Process {
            message: message.into(),
        }
    }

    /// Builds a [`RunletError::Syscall`] from an operation name and OS error.
    pub fn syscall(op: impl Into<String>, source: impl Into<std::io::Error>) -> Self {
        Self::Syscall {
            op: op.into(),
            source: source.into(),
        }
    }

    /// Returns `true` if this error reports a missing resource.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, RunletError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_message_names_operation_and_statuses() {
        let err = RunletError::Precondition {
            id: "c1".into(),
            operation: "start",
            status: "running".into(),
            expected: "created",
        };
        assert_eq!(
            err.to_string(),
            "cannot start container c1: status is running, expected created"
        );
    }

    #[test]
    fn not_found_is_detected() {
        let err = RunletError::NotFound {
            kind: "container",
            id: "x".into(),
        };
        assert!(err.is_not_found());
        assert!(!RunletError::validation("bad").is_not_found());
    }
}
