//! Container filesystem setup: mounts, root switch, and path protection.

pub mod mount;
pub mod pivot_root;
pub mod protect;
