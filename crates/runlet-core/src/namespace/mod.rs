//! Linux namespace management for container isolation.
//!
//! Namespaces are created in one step, by passing the combined clone flags
//! to `clone(2)` when the init process is spawned.

pub mod user;
pub mod uts;

use nix::sched::CloneFlags;
use runlet_common::spec::{Namespace, NamespaceKind};

/// Clone flag for one namespace kind, or `None` for unrecognized kinds.
#[must_use]
pub const fn clone_flag(kind: NamespaceKind) -> Option<CloneFlags> {
    match kind {
        NamespaceKind::Pid => Some(CloneFlags::CLONE_NEWPID),
        NamespaceKind::Uts => Some(CloneFlags::CLONE_NEWUTS),
        NamespaceKind::Ipc => Some(CloneFlags::CLONE_NEWIPC),
        NamespaceKind::Network => Some(CloneFlags::CLONE_NEWNET),
        NamespaceKind::Mount => Some(CloneFlags::CLONE_NEWNS),
        NamespaceKind::Cgroup => Some(CloneFlags::CLONE_NEWCGROUP),
        NamespaceKind::Time => Some(CloneFlags::from_bits_retain(libc::CLONE_NEWTIME)),
        NamespaceKind::User => Some(CloneFlags::CLONE_NEWUSER),
        NamespaceKind::Unknown => None,
    }
}

/// Combines the clone flags of every requested namespace.
///
/// The result is a union, so order and duplicates do not matter.
/// Unrecognized kinds are skipped with a warning.
#[must_use]
pub fn clone_flags(namespaces: &[Namespace]) -> CloneFlags {
    namespaces.iter().fold(CloneFlags::empty(), |flags, ns| {
        if ns.path.is_some() {
            tracing::warn!(kind = ?ns.kind, "joining existing namespaces is unsupported, creating a new one");
        }
        match clone_flag(ns.kind) {
            Some(flag) => flags | flag,
            None => {
                tracing::warn!("ignoring unrecognized namespace type");
                flags
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn namespaces(kinds: &[NamespaceKind]) -> Vec<Namespace> {
        kinds.iter().copied().map(Namespace::new).collect()
    }

    #[test]
    fn flags_are_a_union() {
        let flags = clone_flags(&namespaces(&[
            NamespaceKind::Pid,
            NamespaceKind::Uts,
            NamespaceKind::Mount,
        ]));
        assert_eq!(
            flags,
            CloneFlags::CLONE_NEWPID | CloneFlags::CLONE_NEWUTS | CloneFlags::CLONE_NEWNS
        );
    }

    #[test]
    fn order_and_duplicates_do_not_matter() {
        let a = clone_flags(&namespaces(&[NamespaceKind::Ipc, NamespaceKind::Network]));
        let b = clone_flags(&namespaces(&[
            NamespaceKind::Network,
            NamespaceKind::Ipc,
            NamespaceKind::Network,
        ]));
        assert_eq!(a, b);
    }

    #[test]
    fn unknown_kinds_are_ignored() {
        let flags = clone_flags(&namespaces(&[NamespaceKind::Unknown, NamespaceKind::User]));
        assert_eq!(flags, CloneFlags::CLONE_NEWUSER);
        assert!(clone_flags(&namespaces(&[NamespaceKind::Unknown])).is_empty());
    }

    #[test]
    fn every_known_kind_has_a_distinct_flag() {
        let kinds = [
            NamespaceKind::Pid,
            NamespaceKind::Uts,
            NamespaceKind::Ipc,
            NamespaceKind::Network,
            NamespaceKind::Mount,
            NamespaceKind::Cgroup,
            NamespaceKind::Time,
            NamespaceKind::User,
        ];
        let all = clone_flags(&namespaces(&kinds));
        assert_eq!(all.bits().count_ones(), 8);
        assert_eq!(
            clone_flag(NamespaceKind::Time).map(|f| f.bits()),
            Some(libc::CLONE_NEWTIME)
        );
    }
}
