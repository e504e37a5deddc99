//! # devstack-common
//!
//! Shared error definitions, the explicit settings object, and constants
//! used across the Devstack workspace.
//!
//! This crate is the leaf of the dependency graph: it depends on no other
//! internal crate and provides the primitives everything else builds on.

pub mod config;
pub mod constants;
pub mod error;
