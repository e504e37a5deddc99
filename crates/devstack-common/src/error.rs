//! Unified error types for the Devstack workspace.
//!
//! None of these are retried inside the resolution core; retry policy, if
//! any, belongs to the orchestration layer driving it.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum DevstackError {
    /// A `#{...}` placeholder could not be resolved against its context.
    ///
    /// Always fatal to the single resolution call; never silently
    /// defaulted and never left partially substituted.
    #[error("cannot resolve `#{{{expression}}}` while expanding {value:?}")]
    TemplateResolution {
        /// The placeholder expression that failed to resolve.
        expression: String,
        /// The value that was being expanded.
        value: String,
    },

    /// The container runtime cannot locate or pull the declared image.
    #[error("image not available: {image}")]
    ImageNotAvailable {
        /// The image reference that could not be provided.
        image: String,
    },

    /// A declared dependency does not exist in the manifest.
    #[error("system `{system}` depends on unknown system `{dependency}`")]
    InvalidSystemReference {
        /// The system whose dependency list is invalid.
        system: String,
        /// The missing dependency name.
        dependency: String,
    },

    /// A port declaration cannot be parsed into a valid `port/proto` form.
    #[error("system `{system}` declares an invalid port: {value:?}")]
    InvalidPort {
        /// The system carrying the invalid declaration.
        system: String,
        /// The raw declared value, reported verbatim.
        value: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, DevstackError>;
