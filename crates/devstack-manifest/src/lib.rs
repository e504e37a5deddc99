//! # devstack-manifest
//!
//! Configuration-resolution core of the Devstack orchestrator.
//!
//! Handles:
//! - **Template**: `#{...}` interpolation over a layered context.
//! - **Ports**: shorthand parsing and host-binding derivation.
//! - **Volumes**: fixed binds, templated mount folders, persistent storage.
//! - **Image**: references, build steps, and the runtime metadata seam.
//! - **System**: one service's fully resolved configuration.
//! - **Launch**: daemon and shell launch-descriptor compilation.
//! - **Manifest**: project namespace and lazy System instantiation.
//! - **Graph**: dependency ordering with fail-fast cycle detection.
//!
//! All resolution is synchronous and confined to a single task; the only
//! asynchronous boundary is the [`image::ImageClient`] seam to the
//! container runtime.

pub mod graph;
pub mod image;
pub mod launch;
pub mod manifest;
pub mod ports;
pub mod system;
pub mod template;
pub mod volumes;
