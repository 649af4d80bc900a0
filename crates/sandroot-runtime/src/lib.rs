//! Root lifecycle orchestration for sandroot.
//!
//! The [`orchestrator::Orchestrator`] is the only component that sequences
//! the others: root resolution, staging, sync, mounts, launch and teardown.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod handle;
pub mod orchestrator;
pub mod release;
