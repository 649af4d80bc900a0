//! Filesystem management for root isolation.
//!
//! Provides mount-point detection, bind mounts with bounded-retry
//! unmounting, symlink-aware root resolution, and the set of mounts a
//! root needs before a process is launched inside it.

pub mod mount;
pub mod mounter;
pub mod root;
