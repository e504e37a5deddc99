//! Launch-descriptor compilation.
//!
//! Turns a system's resolved configuration plus caller overrides into the
//! flat, runtime-ready descriptor handed to the container runtime. Two
//! profiles exist: daemon (long-running, published ports) and shell
//! (one-shot script or interactive session, no published ports).

use std::collections::BTreeMap;
use std::fmt;

use devstack_common::constants::DEFAULT_WORKDIR;
use devstack_common::error::Result;
use serde::{Deserialize, Serialize};

use crate::image::ImageMetadata;
use crate::ports::{HostBinding, ResolvedPorts};
use crate::system::{Command, System};

/// Launch profile recorded in the descriptor annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchKind {
    /// Long-running service container.
    Daemon,
    /// One-shot or interactive shell container.
    Shell,
}

impl fmt::Display for LaunchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Daemon => write!(f, "daemon"),
            Self::Shell => write!(f, "shell"),
        }
    }
}

/// Sub-mode of a shell launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellMode {
    /// Non-interactive script execution.
    Script,
    /// Interactive session attached to the caller's terminal.
    Interactive,
}

impl fmt::Display for ShellMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Script => write!(f, "script"),
            Self::Interactive => write!(f, "interactive"),
        }
    }
}

/// Identity annotations attached to every launched container, used later
/// to find and classify containers belonging to a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotations {
    /// Manifest namespace the container belongs to.
    pub mid: String,
    /// Launch profile.
    #[serde(rename = "type")]
    pub kind: LaunchKind,
    /// Owning system name.
    pub sys: String,
    /// Instance sequence number, starting at 1.
    pub seq: u32,
    /// Shell sub-mode, present only for shell launches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell: Option<ShellMode>,
}

/// A standard stream handed to an interactive launch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StdioDescriptor {
    /// Underlying file descriptor, when the stream is a real one.
    pub fd: Option<i32>,
    /// Whether the stream is attached to a terminal.
    pub is_tty: bool,
}

/// Per-profile instance sequence numbers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sequencies {
    /// Next daemon instance number.
    pub daemon: Option<u32>,
    /// Next shell instance number.
    pub shell: Option<u32>,
}

/// Caller overrides applied on top of a system's resolved configuration.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// Working-directory override.
    pub workdir: Option<String>,
    /// Command override.
    pub command: Option<Command>,
    /// Environment overrides; these win over resolved and derived envs.
    pub envs: BTreeMap<String, String>,
    /// Port overrides, overlaid by name onto the declared ports.
    pub ports: BTreeMap<String, String>,
    /// Full replacement of the regular volume table.
    pub volumes: Option<BTreeMap<String, String>>,
    /// Full replacement of the persistent volume table.
    pub local_volumes: Option<BTreeMap<String, String>>,
    /// Instance sequence numbers.
    pub sequencies: Sequencies,
    /// Whether a shell launch is interactive.
    pub interactive: bool,
    /// Standard input stream, for interactive launches.
    pub stdin: Option<StdioDescriptor>,
    /// Standard output stream, for interactive launches.
    pub stdout: Option<StdioDescriptor>,
    /// Standard error stream, for interactive launches.
    pub stderr: Option<StdioDescriptor>,
    /// Inspected image metadata, used to gap-fill command, workdir, and
    /// exposed ports.
    pub image_data: Option<ImageMetadata>,
}

/// Flat, runtime-ready container configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchDescriptor {
    /// Whether the container runs detached as a service.
    pub daemon: bool,
    /// Working directory inside the container.
    pub working_dir: String,
    /// Command to run.
    pub command: Command,
    /// Final environment table.
    pub env: BTreeMap<String, String>,
    /// Host binding table keyed by `"port/proto"`.
    pub ports: BTreeMap<String, Vec<HostBinding>>,
    /// Regular volume table, host path to container path.
    pub volumes: BTreeMap<String, String>,
    /// Persistent volume table, host path to container path.
    pub local_volumes: BTreeMap<String, String>,
    /// Name servers injected into the container.
    pub dns: Vec<String>,
    /// Identity annotations.
    pub annotations: Annotations,
    /// Standard input stream, if attached.
    pub stdin: Option<StdioDescriptor>,
    /// Standard output stream, if attached.
    pub stdout: Option<StdioDescriptor>,
    /// Standard error stream, if attached.
    pub stderr: Option<StdioDescriptor>,
    /// Whether to allocate a terminal.
    pub tty: bool,
}

/// Compiles the daemon launch descriptor for a system.
///
/// Override precedence per field: caller overrides, then the declared
/// definition, then image metadata as gap-fill, then built-in defaults.
/// Port overrides are overlaid by name before resolution, so derived
/// `<NAME>_PORT` envs reflect the overridden values.
///
/// # Errors
///
/// Returns template, port, or configuration errors from resolving the
/// underlying system options.
pub fn daemon_options(system: &System, overrides: &LaunchOptions) -> Result<LaunchDescriptor> {
    let settings = system.settings();

    let mut declared = system.def().ports.clone();
    for (name, raw) in &overrides.ports {
        let _ = declared.insert(name.clone(), raw.clone());
    }
    let mut ports =
        ResolvedPorts::resolve(system.name(), &declared, system.def().http, settings)?;
    if let Some(image_data) = &overrides.image_data {
        ports.merge_exposed(system.name(), image_data.config.exposed_ports.keys())?;
    }

    let mut env = system.envs()?;
    env.append(&mut ports.env());
    for (key, value) in &overrides.envs {
        let _ = env.insert(key.clone(), value.clone());
    }

    let image_config = overrides.image_data.as_ref().map(|data| &data.config);
    let command = match &overrides.command {
        Some(command) => command.clone(),
        None => match system.declared_command()? {
            Some(command) => command,
            None => image_config
                .and_then(|config| config.cmd.clone())
                .map_or_else(|| system.fallback_command(), Command::Args),
        },
    };
    let working_dir = match &overrides.workdir {
        Some(workdir) => workdir.clone(),
        None => system.declared_workdir()?.unwrap_or_else(|| {
            image_config
                .and_then(|config| config.workdir())
                .unwrap_or(DEFAULT_WORKDIR)
                .to_string()
        }),
    };

    let volumes = match &overrides.volumes {
        Some(volumes) => volumes.clone(),
        None => system.volumes()?,
    };
    let local_volumes = overrides
        .local_volumes
        .clone()
        .unwrap_or_else(|| system.persistent_volumes());

    let seq = overrides.sequencies.daemon.unwrap_or(1);
    tracing::debug!(system = system.name(), seq, "compiled daemon options");

    Ok(LaunchDescriptor {
        daemon: true,
        working_dir,
        command,
        env,
        ports: ports.bindings(settings),
        volumes,
        local_volumes,
        dns: settings.name_servers.clone(),
        annotations: Annotations {
            mid: system.meta().namespace.clone(),
            kind: LaunchKind::Daemon,
            sys: system.name().to_string(),
            seq,
            shell: None,
        },
        stdin: None,
        stdout: None,
        stderr: None,
        tty: false,
    })
}

/// Compiles the shell launch descriptor for a system.
///
/// Shell launches never publish ports and never derive port envs. Without
/// a command override the system's shell is run directly; a terminal is
/// allocated only for an interactive launch whose stdout is a terminal.
///
/// # Errors
///
/// Returns template or configuration errors from resolving the underlying
/// system options.
pub fn shell_options(system: &System, overrides: &LaunchOptions) -> Result<LaunchDescriptor> {
    let settings = system.settings();

    let mut env = system.envs()?;
    for (key, value) in &overrides.envs {
        let _ = env.insert(key.clone(), value.clone());
    }

    let command = overrides
        .command
        .clone()
        .unwrap_or_else(|| Command::Args(vec![system.shell().to_string()]));
    let working_dir = match &overrides.workdir {
        Some(workdir) => workdir.clone(),
        None => system.workdir()?,
    };

    let volumes = match &overrides.volumes {
        Some(volumes) => volumes.clone(),
        None => system.volumes()?,
    };
    let local_volumes = overrides
        .local_volumes
        .clone()
        .unwrap_or_else(|| system.persistent_volumes());

    let mode = if overrides.interactive {
        ShellMode::Interactive
    } else {
        ShellMode::Script
    };
    let tty = overrides.interactive
        && overrides.stdout.is_some_and(|stream| stream.is_tty);

    let seq = overrides.sequencies.shell.unwrap_or(1);
    tracing::debug!(system = system.name(), seq, %mode, "compiled shell options");

    Ok(LaunchDescriptor {
        daemon: false,
        working_dir,
        command,
        env,
        ports: BTreeMap::new(),
        volumes,
        local_volumes,
        dns: settings.name_servers.clone(),
        annotations: Annotations {
            mid: system.meta().namespace.clone(),
            kind: LaunchKind::Shell,
            sys: system.name().to_string(),
            seq,
            shell: Some(mode),
        },
        stdin: overrides.stdin,
        stdout: overrides.stdout,
        stderr: overrides.stderr,
        tty,
    })
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use devstack_common::config::Settings;

    use crate::image::RawImage;
    use crate::manifest::{Manifest, ManifestDef};
    use crate::system::SystemDef;

    use super::*;

    fn manifest(defs: &[(&str, SystemDef)]) -> Manifest {
        let def = ManifestDef {
            systems: defs
                .iter()
                .map(|(name, def)| ((*name).to_string(), def.clone()))
                .collect(),
            default: defs.first().map(|(name, _)| (*name).to_string()),
            namespace: Some("testapp-0000000000".to_string()),
        };
        Manifest::new("/tmp/testapp", def, Rc::new(Settings::default()))
    }

    fn map(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn web_def() -> SystemDef {
        SystemDef {
            image: Some(RawImage::Name("nginx".to_string())),
            workdir: Some("/devstack/#{manifest.dir}".to_string()),
            command: Some(Command::Shell("nginx -g 'daemon off;'".to_string())),
            envs: map(&[("MODE", "production")]),
            ports: map(&[("http", "5000/tcp")]),
            ..SystemDef::default()
        }
    }

    #[test]
    fn daemon_descriptor_carries_resolved_options() {
        let manifest = manifest(&[("web", web_def())]);
        let system = manifest.system("web").expect("system");
        let desc = daemon_options(&system, &LaunchOptions::default()).expect("daemon");

        assert!(desc.daemon);
        assert_eq!(desc.working_dir, "/devstack/testapp");
        assert_eq!(
            desc.command,
            Command::Shell("nginx -g 'daemon off;'".to_string())
        );
        assert_eq!(desc.env.get("MODE").map(String::as_str), Some("production"));
        assert_eq!(desc.env.get("HTTP_PORT").map(String::as_str), Some("5000"));
        assert!(desc.ports.contains_key("5000/tcp"));
        assert_eq!(desc.annotations.kind, LaunchKind::Daemon);
        assert_eq!(desc.annotations.sys, "web");
        assert_eq!(desc.annotations.seq, 1);
        assert_eq!(desc.annotations.mid, "testapp-0000000000");
        assert!(desc.annotations.shell.is_none());
        assert!(!desc.tty);
    }

    #[test]
    fn port_overrides_move_the_derived_env() {
        let manifest = manifest(&[("web", web_def())]);
        let system = manifest.system("web").expect("system");
        let overrides = LaunchOptions {
            ports: map(&[("http", "8080/tcp")]),
            ..LaunchOptions::default()
        };
        let desc = daemon_options(&system, &overrides).expect("daemon");

        assert_eq!(desc.env.get("HTTP_PORT").map(String::as_str), Some("8080"));
        assert!(desc.ports.contains_key("8080/tcp"));
        assert!(!desc.ports.contains_key("5000/tcp"));
    }

    #[test]
    fn override_envs_win_over_derived_envs() {
        let manifest = manifest(&[("web", web_def())]);
        let system = manifest.system("web").expect("system");
        let overrides = LaunchOptions {
            envs: map(&[("MODE", "debug"), ("HTTP_PORT", "9999")]),
            ..LaunchOptions::default()
        };
        let desc = daemon_options(&system, &overrides).expect("daemon");

        assert_eq!(desc.env.get("MODE").map(String::as_str), Some("debug"));
        assert_eq!(desc.env.get("HTTP_PORT").map(String::as_str), Some("9999"));
    }

    #[test]
    fn image_metadata_gap_fills_command_workdir_and_ports() {
        let def = SystemDef {
            image: Some(RawImage::Name("postgres".to_string())),
            ..SystemDef::default()
        };
        let manifest = manifest(&[("db", def)]);
        let system = manifest.system("db").expect("system");

        let image_data: ImageMetadata = serde_json::from_str(
            r#"{
                "Config": {
                    "Cmd": ["postgres", "-D", "/data"],
                    "WorkingDir": "/data",
                    "ExposedPorts": { "5432/tcp": {} }
                }
            }"#,
        )
        .expect("metadata");
        let overrides = LaunchOptions {
            image_data: Some(image_data),
            ..LaunchOptions::default()
        };
        let desc = daemon_options(&system, &overrides).expect("daemon");

        assert_eq!(
            desc.command,
            Command::Args(vec![
                "postgres".to_string(),
                "-D".to_string(),
                "/data".to_string(),
            ])
        );
        assert_eq!(desc.working_dir, "/data");
        assert!(desc.ports.contains_key("5432/tcp"));
        assert!(desc.env.is_empty());
    }

    #[test]
    fn declared_values_beat_image_metadata() {
        let manifest = manifest(&[("web", web_def())]);
        let system = manifest.system("web").expect("system");

        let image_data: ImageMetadata = serde_json::from_str(
            r#"{ "Config": { "Cmd": ["other"], "WorkingDir": "/elsewhere" } }"#,
        )
        .expect("metadata");
        let overrides = LaunchOptions {
            image_data: Some(image_data),
            ..LaunchOptions::default()
        };
        let desc = daemon_options(&system, &overrides).expect("daemon");

        assert_eq!(
            desc.command,
            Command::Shell("nginx -g 'daemon off;'".to_string())
        );
        assert_eq!(desc.working_dir, "/devstack/testapp");
    }

    #[test]
    fn missing_command_everywhere_falls_back_to_a_loud_failure() {
        let def = SystemDef {
            image: Some(RawImage::Name("scratch".to_string())),
            ..SystemDef::default()
        };
        let manifest = manifest(&[("empty", def)]);
        let system = manifest.system("empty").expect("system");
        let desc = daemon_options(&system, &LaunchOptions::default()).expect("daemon");

        let Command::Shell(line) = desc.command else {
            panic!("expected the shell fallback");
        };
        assert!(line.contains("empty"), "got: {line}");
        assert!(line.contains("exit 1"), "got: {line}");
    }

    #[test]
    fn shell_descriptor_publishes_no_ports() {
        let manifest = manifest(&[("web", web_def())]);
        let system = manifest.system("web").expect("system");
        let desc = shell_options(&system, &LaunchOptions::default()).expect("shell");

        assert!(!desc.daemon);
        assert!(desc.ports.is_empty());
        assert!(!desc.env.contains_key("HTTP_PORT"));
        assert_eq!(desc.annotations.kind, LaunchKind::Shell);
        assert_eq!(desc.annotations.shell, Some(ShellMode::Script));
    }

    #[test]
    fn shell_without_command_runs_the_system_shell() {
        let def = SystemDef {
            shell: Some("/bin/bash".to_string()),
            ..SystemDef::default()
        };
        let manifest = manifest(&[("tools", def)]);
        let system = manifest.system("tools").expect("system");
        let desc = shell_options(&system, &LaunchOptions::default()).expect("shell");
        assert_eq!(desc.command, Command::Args(vec!["/bin/bash".to_string()]));
    }

    #[test]
    fn script_mode_keeps_the_given_command() {
        let manifest = manifest(&[("web", web_def())]);
        let system = manifest.system("web").expect("system");
        let overrides = LaunchOptions {
            command: Some(Command::Shell("ls -la".to_string())),
            ..LaunchOptions::default()
        };
        let desc = shell_options(&system, &overrides).expect("shell");
        assert_eq!(desc.command, Command::Shell("ls -la".to_string()));
        assert_eq!(desc.annotations.shell, Some(ShellMode::Script));
        assert!(!desc.tty);
    }

    #[test]
    fn interactive_tty_requires_a_terminal_stdout() {
        let manifest = manifest(&[("web", web_def())]);
        let system = manifest.system("web").expect("system");

        let tty_stream = StdioDescriptor {
            fd: Some(1),
            is_tty: true,
        };
        let overrides = LaunchOptions {
            interactive: true,
            stdin: Some(StdioDescriptor {
                fd: Some(0),
                is_tty: true,
            }),
            stdout: Some(tty_stream),
            ..LaunchOptions::default()
        };
        let desc = shell_options(&system, &overrides).expect("shell");
        assert!(desc.tty);
        assert_eq!(desc.annotations.shell, Some(ShellMode::Interactive));
        assert_eq!(desc.stdout, Some(tty_stream));

        let piped = LaunchOptions {
            interactive: true,
            stdout: Some(StdioDescriptor {
                fd: Some(1),
                is_tty: false,
            }),
            ..LaunchOptions::default()
        };
        let desc = shell_options(&system, &piped).expect("shell");
        assert!(!desc.tty);
    }

    #[test]
    fn sequence_numbers_default_to_one_and_follow_overrides() {
        let manifest = manifest(&[("web", web_def())]);
        let system = manifest.system("web").expect("system");

        let overrides = LaunchOptions {
            sequencies: Sequencies {
                daemon: Some(3),
                shell: Some(7),
            },
            ..LaunchOptions::default()
        };
        let daemon = daemon_options(&system, &overrides).expect("daemon");
        assert_eq!(daemon.annotations.seq, 3);
        let shell = shell_options(&system, &overrides).expect("shell");
        assert_eq!(shell.annotations.seq, 7);

        let default_daemon =
            daemon_options(&system, &LaunchOptions::default()).expect("daemon");
        assert_eq!(default_daemon.annotations.seq, 1);
    }

    #[test]
    fn annotations_serialize_with_the_runtime_field_names() {
        let annotations = Annotations {
            mid: "testapp-0000000000".to_string(),
            kind: LaunchKind::Shell,
            sys: "web".to_string(),
            seq: 2,
            shell: Some(ShellMode::Interactive),
        };
        let json = serde_json::to_value(&annotations).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "mid": "testapp-0000000000",
                "type": "shell",
                "sys": "web",
                "seq": 2,
                "shell": "interactive",
            })
        );
    }
}
