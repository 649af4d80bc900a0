//! # sandroot-core
//!
//! Low-level Linux primitives behind the sandroot root lifecycle.
//!
//! This crate provides safe abstractions over:
//! - **Capabilities**: probing and dropping the capability bounding set.
//! - **Filesystem**: mount-point detection, bind mounts, bounded-retry
//!   unmounts, and symlink-aware root resolution.
//! - **Launch**: the `chroot` → `chdir` → capability drop → `execve` transition.
//! - **Ownership**: uid/gid lookup and root directory fixups.
//! - **Command**: running external utilities with captured output.
//!
//! All unsafe system calls are encapsulated in safe wrappers with
//! `// SAFETY:` documentation.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod capability;
pub mod command;
pub mod filesystem;
pub mod launch;
pub mod ownership;
