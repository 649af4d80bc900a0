//! # sandroot-common
//!
//! Shared types, error definitions, configuration models, and constants
//! used across the sandroot workspace.
//!
//! This crate is the leaf of the dependency graph. Every other crate
//! reports failures through [`error::SandrootError`].

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
