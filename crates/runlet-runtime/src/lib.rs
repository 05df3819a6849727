//! # runlet-runtime
//!
//! Container lifecycle engine for the runlet runtime: the state store,
//! hook executor, init bootstrap handshake, and the
//! `create → start → kill → delete` state machine.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod container;
pub mod engine;
pub mod hooks;
pub mod init;
pub mod process;
pub mod state;

pub use engine::Runtime;
