//! Workspace-wide constants and default values.

/// Container-side root under which manifest directories are mounted.
pub const NAMESPACE_ROOT: &str = "/devstack";

/// Default shell for systems that declare none.
pub const DEFAULT_SHELL: &str = "/bin/sh";

/// Default working directory for systems that declare none.
pub const DEFAULT_WORKDIR: &str = "/";

/// Internal port assumed for HTTP-exposing systems without a declared port.
pub const DEFAULT_HTTP_PORT: u16 = 5000;

/// Protocol assumed when a port declaration omits one.
pub const DEFAULT_PROTOCOL: &str = "tcp";

/// Internal port that is published on a fixed, equal host port.
pub const FIXED_PUBLIC_PORT: u16 = 443;

/// Host IP that published ports bind to by default.
pub const DEFAULT_DNS_IP: &str = "172.17.0.1";

/// Default balancer hostname advertised to templates.
pub const DEFAULT_BALANCER_HOST: &str = "devstack.dev";

/// Default balancer IP advertised to templates.
pub const DEFAULT_BALANCER_IP: &str = "127.0.0.1";

/// Default balancer port advertised to templates.
pub const DEFAULT_BALANCER_PORT: u16 = 80;

/// Default root for persistent per-system data folders.
pub const DEFAULT_PERSISTENT_ROOT: &str = "/var/lib/devstack/persistent";

/// Container path that persistent volumes bind to.
pub const PERSISTENT_MOUNT: &str = "/data";

/// Manifest file name looked up inside a project directory.
pub const MANIFEST_FILE: &str = "Devstackfile.json";

/// Environment-defaults file looked up next to the manifest.
pub const DOTENV_FILE: &str = ".env";

/// Repository namespace for locally built images.
pub const DEFAULT_REPOSITORY: &str = "devstack";

/// Image tag assumed when a reference omits one.
pub const DEFAULT_IMAGE_TAG: &str = "latest";

/// Application name used in annotations and CLI output.
pub const APP_NAME: &str = "devstack";
