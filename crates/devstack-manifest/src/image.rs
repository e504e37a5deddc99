//! Image references, build steps, and the runtime metadata seam.
//!
//! The loose raw shapes a manifest may use for `image` (a reference string
//! or an ordered list of heterogeneous build steps) are decided exactly
//! once, here, into tagged variants. Downstream code never sniffs shapes.

use std::collections::BTreeMap;
use std::fmt;

use devstack_common::constants::DEFAULT_IMAGE_TAG;
use devstack_common::error::Result;
use serde::{Deserialize, Serialize};

/// Raw `image` field of a system definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawImage {
    /// `repository[:tag]` reference.
    Name(String),
    /// Ordered build steps.
    Build(Vec<BuildStep>),
}

/// One build step: a shell line or an explicit argument vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BuildStep {
    /// A single shell command line.
    Shell(String),
    /// An explicit argument list.
    Args(Vec<String>),
}

/// A fully decided image specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSpec {
    /// A registry reference.
    Reference {
        /// Repository component.
        repo: String,
        /// Tag component, `latest` when omitted.
        tag: String,
    },
    /// A local build described by ordered steps.
    Build {
        /// Build steps in declaration order.
        steps: Vec<BuildStep>,
    },
}

impl ImageSpec {
    /// Decides a raw image value into its tagged form.
    #[must_use]
    pub fn from_raw(raw: &RawImage) -> Self {
        match raw {
            RawImage::Name(name) => {
                let (repo, tag) = match name.rsplit_once(':') {
                    Some((repo, tag)) if !tag.contains('/') => {
                        (repo.to_string(), tag.to_string())
                    }
                    _ => (name.clone(), DEFAULT_IMAGE_TAG.to_string()),
                };
                Self::Reference { repo, tag }
            }
            RawImage::Build(steps) => Self::Build {
                steps: steps.clone(),
            },
        }
    }
}

impl fmt::Display for ImageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reference { repo, tag } => write!(f, "{repo}:{tag}"),
            Self::Build { steps } => write!(f, "build({} steps)", steps.len()),
        }
    }
}

/// Container-runtime image metadata, in the runtime's inspect shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    /// The image's static configuration.
    #[serde(rename = "Config", default)]
    pub config: ImageConfig,
}

/// `Config` block of an inspected image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Default command.
    #[serde(rename = "Cmd", default)]
    pub cmd: Option<Vec<String>>,
    /// Entrypoint prefix.
    #[serde(rename = "Entrypoint", default)]
    pub entrypoint: Option<Vec<String>>,
    /// Default working directory; the runtime reports an empty string when
    /// the image leaves it unset.
    #[serde(rename = "WorkingDir", default)]
    pub working_dir: String,
    /// Exposed ports in `"port/proto"` key-set form.
    #[serde(rename = "ExposedPorts", default)]
    pub exposed_ports: BTreeMap<String, serde_json::Value>,
}

impl ImageConfig {
    /// Working directory, `None` when the image leaves it unset.
    #[must_use]
    pub fn workdir(&self) -> Option<&str> {
        if self.working_dir.is_empty() {
            None
        } else {
            Some(&self.working_dir)
        }
    }
}

/// Seam to the container-runtime collaborator.
///
/// The concrete client lives outside this crate; resolution only needs to
/// confirm an image exists and read its metadata. Callers must await
/// `inspect` before passing the metadata into option compilation. Neither
/// operation is retried here.
#[allow(async_fn_in_trait)]
pub trait ImageClient {
    /// Confirms the image exists locally, pulling it when necessary.
    ///
    /// # Errors
    ///
    /// Returns `ImageNotAvailable` when the runtime cannot provide it.
    async fn check(&self, image: &ImageSpec) -> Result<()>;

    /// Returns the image's metadata.
    ///
    /// # Errors
    ///
    /// Returns `ImageNotAvailable` when the runtime cannot inspect it.
    async fn inspect(&self, image: &ImageSpec) -> Result<ImageMetadata>;
}
