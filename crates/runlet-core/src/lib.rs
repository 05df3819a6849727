//! # runlet-core
//!
//! Low-level Linux isolation primitives for the runlet runtime.
//!
//! This crate provides safe abstractions over:
//! - **Namespaces**: clone flags for PID, mount, network, user, IPC, UTS,
//!   cgroup, and time namespaces, plus user ID maps and the hostname.
//! - **Cgroups v2**: a table-driven mapping from OCI resources to control files.
//! - **Filesystem**: ordered mounts, `pivot_root`, masked and read-only paths.
//! - **Process attributes**: capabilities, rlimits, and user identity.
//!
//! Kernel calls made inside the container go through the [`syscall::Syscall`]
//! trait so their order can be checked without privileges.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod capability;
pub mod cgroup;
pub mod filesystem;
pub mod identity;
pub mod namespace;
pub mod rlimit;
pub mod syscall;
