//! # sandroot-image
//!
//! Moves a root filesystem image from its source into a live root.
//!
//! Handles:
//! - **Sources**: local files, standard input, and HTTP(S) locators.
//! - **Compression**: a bounded producer/consumer gzip pipe.
//! - **Archive**: streaming tar-gzip extraction into a staging directory.
//! - **Sync**: converging a live root onto a staging directory.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod archive;
pub mod compress;
pub mod source;
pub mod sync;
