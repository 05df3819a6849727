//! User namespace isolation.
//!
//! Maps container UIDs/GIDs to host IDs. The maps are written by the
//! parent into `/proc/<pid>/` of the stopped child, since a process
//! cannot map its own IDs without privileges in the parent namespace.

use std::path::{Path, PathBuf};

use runlet_common::error::{Result, RunletError};
use runlet_common::spec::IdMapping;

/// Formats mappings as `uid_map`/`gid_map` content, one range per line.
#[must_use]
pub fn format_id_map(mappings: &[IdMapping]) -> String {
    mappings
        .iter()
        .map(|m| format!("{} {} {}\n", m.container_id, m.host_id, m.size))
        .collect()
}

/// `/proc/<pid>` for a process.
#[must_use]
pub fn proc_dir(pid: i32) -> PathBuf {
    PathBuf::from(format!("/proc/{pid}"))
}

/// Writes the UID map, denies `setgroups`, then writes the GID map.
///
/// Empty mapping lists are skipped. `proc_dir` is normally
/// [`proc_dir`] of the child.
///
/// # Errors
///
/// Returns an I/O error if writing to `uid_map`, `setgroups`, or
/// `gid_map` fails.
pub fn write_id_mappings(
    proc_dir: &Path,
    uid_mappings: &[IdMapping],
    gid_mappings: &[IdMapping],
) -> Result<()> {
    if !uid_mappings.is_empty() {
        write(&proc_dir.join("uid_map"), &format_id_map(uid_mappings))?;
    }
    if !gid_mappings.is_empty() {
        let setgroups = proc_dir.join("setgroups");
        if setgroups.exists() {
            write(&setgroups, "deny")?;
        }
        write(&proc_dir.join("gid_map"), &format_id_map(gid_mappings))?;
    }
    tracing::debug!(
        proc_dir = %proc_dir.display(),
        uid_ranges = uid_mappings.len(),
        gid_ranges = gid_mappings.len(),
        "wrote UID/GID maps"
    );
    Ok(())
}

fn write(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content).map_err(|e| RunletError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT_MAP: IdMapping = IdMapping {
        container_id: 0,
        host_id: 100_000,
        size: 65_536,
    };

    #[test]
    fn format_one_line_per_range() {
        let map = format_id_map(&[
            ROOT_MAP,
            IdMapping {
                container_id: 65_536,
                host_id: 1000,
                size: 1,
            },
        ]);
        assert_eq!(map, "0 100000 65536\n65536 1000 1\n");
    }

    #[test]
    fn writes_maps_and_denies_setgroups() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("setgroups"), "allow").unwrap();

        write_id_mappings(dir.path(), &[ROOT_MAP], &[ROOT_MAP]).unwrap();

        let read = |f: &str| std::fs::read_to_string(dir.path().join(f)).unwrap();
        assert_eq!(read("uid_map"), "0 100000 65536\n");
        assert_eq!(read("gid_map"), "0 100000 65536\n");
        assert_eq!(read("setgroups"), "deny");
    }

    #[test]
    fn empty_mappings_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write_id_mappings(dir.path(), &[], &[]).unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn proc_dir_uses_pid() {
        assert_eq!(proc_dir(42), PathBuf::from("/proc/42"));
    }
}
