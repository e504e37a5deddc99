//! System entity: one service's fully resolved configuration.
//!
//! Every `options`-style getter is a pure function of the raw definition
//! plus manifest context, recomputed on access. `provisioned` is the one
//! piece of explicit mutable state, with a single-writer contract: only
//! the provisioning collaborator writes it, confined to a single task.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use devstack_common::config::Settings;
use devstack_common::constants::{DEFAULT_SHELL, DEFAULT_WORKDIR};
use devstack_common::error::{DevstackError, Result};
use serde::{Deserialize, Serialize};

use crate::image::{ImageSpec, RawImage};
use crate::launch::{self, LaunchDescriptor, LaunchOptions};
use crate::manifest::{Manifest, ManifestMeta};
use crate::ports::{self, ResolvedPorts};
use crate::template::{ManifestView, TemplateContext, interpolate, interpolate_map};
use crate::volumes;

/// Command of a system: a shell line or an argument vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Command {
    /// A single shell command line.
    Shell(String),
    /// An explicit argument vector.
    Args(Vec<String>),
}

/// Raw scalability value as declared in a manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawScalable {
    /// `false` disables scaling; `true` enables it with no default.
    Flag(bool),
    /// Enabled with a default instance count.
    WithDefault {
        /// Default number of instances.
        default: u32,
    },
}

impl Default for RawScalable {
    fn default() -> Self {
        Self::Flag(false)
    }
}

/// Decided scalability descriptor, passed through uninterpreted by the
/// entity itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalable {
    /// The system never scales.
    Disabled,
    /// Scaling is allowed; the instance count is the caller's choice.
    Enabled,
    /// Scaling is allowed with a declared default instance count.
    WithDefault(u32),
}

impl From<RawScalable> for Scalable {
    fn from(raw: RawScalable) -> Self {
        match raw {
            RawScalable::Flag(false) => Self::Disabled,
            RawScalable::Flag(true) => Self::Enabled,
            RawScalable::WithDefault { default } => Self::WithDefault(default),
        }
    }
}

/// Raw per-system definition as loaded from a manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemDef {
    /// Image reference or build steps.
    #[serde(default)]
    pub image: Option<RawImage>,
    /// Dependency names, in launch order.
    #[serde(default)]
    pub depends: Vec<String>,
    /// Working-directory template.
    #[serde(default)]
    pub workdir: Option<String>,
    /// Shell path.
    #[serde(default)]
    pub shell: Option<String>,
    /// Command to run in daemon mode.
    #[serde(default)]
    pub command: Option<Command>,
    /// Environment variables; values may be templates.
    #[serde(default)]
    pub envs: BTreeMap<String, String>,
    /// Environment templates exported to dependent systems.
    #[serde(default)]
    pub export_envs: BTreeMap<String, String>,
    /// Port declarations: symbolic name or raw `"port/proto"` to spec.
    #[serde(default)]
    pub ports: BTreeMap<String, String>,
    /// Mount-folder templates: host path to container path.
    #[serde(default)]
    pub mount_folders: BTreeMap<String, String>,
    /// Scalability descriptor.
    #[serde(default)]
    pub scalable: RawScalable,
    /// Whether the system is exposed through the HTTP balancer.
    #[serde(default)]
    pub http: bool,
}

/// One service's resolved configuration, owned by exactly one manifest.
#[derive(Debug)]
pub struct System {
    name: String,
    def: SystemDef,
    meta: Rc<ManifestMeta>,
    settings: Rc<Settings>,
    provisioned: Cell<Option<DateTime<Utc>>>,
}

impl System {
    /// Creates a system from its raw definition and manifest context.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        def: SystemDef,
        meta: Rc<ManifestMeta>,
        settings: Rc<Settings>,
    ) -> Self {
        Self {
            name: name.into(),
            def,
            meta,
            settings,
            provisioned: Cell::new(None),
        }
    }

    /// System name, unique within its manifest.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw definition this system resolves from.
    #[must_use]
    pub fn def(&self) -> &SystemDef {
        &self.def
    }

    /// Manifest identity this system belongs to.
    #[must_use]
    pub fn meta(&self) -> &ManifestMeta {
        &self.meta
    }

    /// Settings in effect for this system.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Decided image specification.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the definition declares no image.
    pub fn image(&self) -> Result<ImageSpec> {
        self.def
            .image
            .as_ref()
            .map(ImageSpec::from_raw)
            .ok_or_else(|| DevstackError::Config {
                message: format!("system `{}` declares no image", self.name),
            })
    }

    /// Shell used for script and interactive launches.
    #[must_use]
    pub fn shell(&self) -> &str {
        self.def.shell.as_deref().unwrap_or(DEFAULT_SHELL)
    }

    /// Declared working directory, template-expanded.
    ///
    /// # Errors
    ///
    /// Returns `TemplateResolution` when the template fails to expand.
    pub fn declared_workdir(&self) -> Result<Option<String>> {
        self.def
            .workdir
            .as_deref()
            .map(|workdir| interpolate(workdir, &self.base_context()))
            .transpose()
    }

    /// Working directory, falling back to the built-in default.
    ///
    /// # Errors
    ///
    /// Returns `TemplateResolution` when the template fails to expand.
    pub fn workdir(&self) -> Result<String> {
        Ok(self
            .declared_workdir()?
            .unwrap_or_else(|| DEFAULT_WORKDIR.to_string()))
    }

    /// Declared command, template-expanded.
    ///
    /// # Errors
    ///
    /// Returns `TemplateResolution` when a template fails to expand.
    pub fn declared_command(&self) -> Result<Option<Command>> {
        let ctx = self.base_context();
        self.def
            .command
            .as_ref()
            .map(|command| expand_command(command, &ctx))
            .transpose()
    }

    /// Command to run, falling back to one that fails loudly naming the
    /// system.
    ///
    /// # Errors
    ///
    /// Returns `TemplateResolution` when a template fails to expand.
    pub fn command(&self) -> Result<Command> {
        Ok(self
            .declared_command()?
            .unwrap_or_else(|| self.fallback_command()))
    }

    /// The built-in command used when a system declares none.
    #[must_use]
    pub fn fallback_command(&self) -> Command {
        Command::Shell(format!(
            "echo \"no command defined for system `{}`\"; exit 1",
            self.name
        ))
    }

    /// Resolved environment variables: the manifest's `.env` defaults
    /// layered under the declared envs, template-expanded against the
    /// manifest context and the raw envs themselves.
    ///
    /// # Errors
    ///
    /// Returns `TemplateResolution` when a value fails to expand.
    pub fn envs(&self) -> Result<BTreeMap<String, String>> {
        interpolate_map(&self.raw_envs(), &self.base_context())
    }

    /// Decided scalability descriptor.
    #[must_use]
    pub fn scalable(&self) -> Scalable {
        Scalable::from(self.def.scalable)
    }

    /// Whether this system is exposed through the HTTP balancer.
    #[must_use]
    pub fn http_exposed(&self) -> bool {
        self.def.http || self.def.ports.contains_key(ports::HTTP_PORT_NAME)
    }

    /// Resolved port set.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPort` for declarations that fail to parse.
    pub fn ports(&self) -> Result<ResolvedPorts> {
        ResolvedPorts::resolve(&self.name, &self.def.ports, self.def.http, &self.settings)
    }

    /// Regular volume table.
    ///
    /// # Errors
    ///
    /// Returns `TemplateResolution` when a mount-folder template fails to
    /// expand.
    pub fn volumes(&self) -> Result<BTreeMap<String, String>> {
        volumes::resolve(&self.name, &self.def.mount_folders, &self.meta, &self.settings)
    }

    /// Persistent volume table.
    #[must_use]
    pub fn persistent_volumes(&self) -> BTreeMap<String, String> {
        volumes::persistent(&self.meta.namespace, &self.name, &self.settings)
    }

    /// Dependency systems in declared order.
    ///
    /// Duplicates and self-references are not filtered; avoiding them is
    /// the caller's responsibility.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSystemReference` when a declared name is absent
    /// from the manifest.
    pub fn depends_instances(&self, manifest: &Manifest) -> Result<Vec<Rc<Self>>> {
        self.def
            .depends
            .iter()
            .map(|dep| {
                manifest
                    .system(dep)
                    .map_err(|_| DevstackError::InvalidSystemReference {
                        system: self.name.clone(),
                        dependency: dep.clone(),
                    })
            })
            .collect()
    }

    /// Provisioning timestamp, `None` until the provisioning step ran.
    #[must_use]
    pub fn provisioned(&self) -> Option<DateTime<Utc>> {
        self.provisioned.get()
    }

    /// Records the provisioning timestamp.
    pub fn set_provisioned(&self, at: Option<DateTime<Utc>>) {
        self.provisioned.set(at);
    }

    /// Expands the export-env templates against a dependent's observed
    /// network view, then synthesizes `<SYSTEM>_<LABEL>_HOST` and
    /// `<SYSTEM>_<LABEL>_PORT` pairs for every symbolically named port.
    ///
    /// `LABEL` is the raw internal port number; the HTTP port additionally
    /// gets the `HTTP` label.
    ///
    /// # Errors
    ///
    /// Returns `TemplateResolution` when a referenced env or net key is
    /// absent from the context.
    pub fn expand_export_envs(&self, ctx: &TemplateContext) -> Result<BTreeMap<String, String>> {
        let mut envs = interpolate_map(&self.def.export_envs, ctx)?;
        let system_label = ports::env_label(&self.name);

        for (name, spec) in self.ports()?.iter() {
            if !ports::is_symbolic(name) {
                continue;
            }
            let host = ctx
                .net
                .host
                .clone()
                .ok_or_else(|| missing_net("net.host", name))?;
            let bound = ctx
                .net
                .port
                .get(&spec.port)
                .copied()
                .ok_or_else(|| missing_net(&format!("net.port.{}", spec.port), name))?;

            let _ = envs.insert(format!("{system_label}_{}_HOST", spec.port), host.clone());
            let _ = envs.insert(
                format!("{system_label}_{}_PORT", spec.port),
                bound.to_string(),
            );
            if name == ports::HTTP_PORT_NAME {
                let _ = envs.insert(format!("{system_label}_HTTP_HOST"), host);
                let _ = envs.insert(format!("{system_label}_HTTP_PORT"), bound.to_string());
            }
        }

        Ok(envs)
    }

    /// Compiles the long-running launch descriptor for this system.
    ///
    /// # Errors
    ///
    /// Propagates template, port, and configuration errors from option
    /// resolution.
    pub fn daemon_options(&self, overrides: &LaunchOptions) -> Result<LaunchDescriptor> {
        launch::daemon_options(self, overrides)
    }

    /// Compiles the interactive/script launch descriptor for this system.
    ///
    /// # Errors
    ///
    /// Propagates template and configuration errors from option
    /// resolution.
    pub fn shell_options(&self, overrides: &LaunchOptions) -> Result<LaunchDescriptor> {
        launch::shell_options(self, overrides)
    }

    /// Raw envs before template expansion: `.env` defaults, overridden by
    /// the declared envs.
    fn raw_envs(&self) -> BTreeMap<String, String> {
        let mut envs = self.meta.dotenv.clone();
        for (key, value) in &self.def.envs {
            let _ = envs.insert(key.clone(), value.clone());
        }
        envs
    }

    /// Seed context for expanding this system's own option templates.
    fn base_context(&self) -> TemplateContext {
        TemplateContext {
            manifest: ManifestView {
                dir: self.meta.dir_name.clone(),
                project_name: self.meta.project_name.clone(),
            },
            envs: self.raw_envs(),
            ..TemplateContext::default()
        }
    }
}

/// Expands a command's strings against a context.
fn expand_command(command: &Command, ctx: &TemplateContext) -> Result<Command> {
    Ok(match command {
        Command::Shell(line) => Command::Shell(interpolate(line, ctx)?),
        Command::Args(args) => Command::Args(
            args.iter()
                .map(|arg| interpolate(arg, ctx))
                .collect::<Result<_>>()?,
        ),
    })
}

fn missing_net(expression: &str, port_name: &str) -> DevstackError {
    DevstackError::TemplateResolution {
        expression: expression.to_string(),
        value: format!("export envs for port `{port_name}`"),
    }
}
