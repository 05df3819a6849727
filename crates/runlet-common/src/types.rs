//! Domain primitive types used across the runlet workspace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RunletError};

/// Unique identifier for a container instance.
///
/// IDs name a state directory and a cgroup directory, so they are restricted
/// to characters that cannot escape either root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(String);

impl ContainerId {
    /// Parses and validates a container ID.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the ID is empty, is `.` or `..`, or
    /// contains characters other than ASCII alphanumerics, `-`, `_`, and `.`.
    pub fn parse(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() || id == "." || id == ".." {
            return Err(RunletError::validation(format!(
                "invalid container id {id:?}"
            )));
        }
        if let Some(bad) = id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(RunletError::validation(format!(
                "invalid character {bad:?} in container id {id:?}"
            )));
        }
        Ok(Self(id))
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContainerId {
    type Err = RunletError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Lifecycle status of a container as persisted in its state file.
///
/// Status only moves forward: `creating → created → running → stopped`.
/// Deletion removes the state entirely rather than recording a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    /// The runtime is still setting the container up.
    Creating,
    /// Setup finished; the init process is stopped, waiting for `start`.
    Created,
    /// The user process has been released.
    Running,
    /// The container process has exited.
    Stopped,
}

impl ContainerStatus {
    /// Whether the container still has a live process worth signaling.
    #[must_use]
    pub const fn has_process(self) -> bool {
        matches!(self, Self::Created | Self::Running)
    }

    /// Position in the forward-only lifecycle order.
    const fn rank(self) -> u8 {
        match self {
            Self::Creating => 0,
            Self::Created => 1,
            Self::Running => 2,
            Self::Stopped => 3,
        }
    }

    /// Whether moving from `self` to `next` respects the forward-only order.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        next.rank() > self.rank()
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Creating => write!(f, "creating"),
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_id_accepts_common_forms() {
        for id in ["c1", "my-app_2", "abc.def", "0123456789abcdef"] {
            assert_eq!(ContainerId::parse(id).unwrap().as_str(), id);
        }
    }

    #[test]
    fn container_id_rejects_path_escapes() {
        for id in ["", ".", "..", "a/b", "../etc", "x y"] {
            assert!(
                matches!(ContainerId::parse(id), Err(RunletError::Validation { .. })),
                "{id:?} should be rejected"
            );
        }
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&ContainerStatus::Running).unwrap();
        assert_eq!(json, "\"running\"");
        let back: ContainerStatus = serde_json::from_str("\"created\"").unwrap();
        assert_eq!(back, ContainerStatus::Created);
    }

    #[test]
    fn status_moves_forward_only() {
        use ContainerStatus::*;
        assert!(Creating.can_advance_to(Created));
        assert!(Created.can_advance_to(Running));
        assert!(Created.can_advance_to(Stopped));
        assert!(!Running.can_advance_to(Created));
        assert!(!Stopped.can_advance_to(Running));
        assert!(!Running.can_advance_to(Running));
    }

    #[test]
    fn only_created_and_running_have_process() {
        assert!(ContainerStatus::Created.has_process());
        assert!(ContainerStatus::Running.has_process());
        assert!(!ContainerStatus::Creating.has_process());
        assert!(!ContainerStatus::Stopped.has_process());
    }
}
