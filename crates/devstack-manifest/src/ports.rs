//! Port shorthand parsing and host-binding derivation.
//!
//! Declared ports arrive as a map of name (symbolic like `http`, or a raw
//! `"port/proto"` literal used as its own name) to a `"port/proto"` spec.
//! Resolution produces the runtime-shaped binding table keyed by
//! `"port/proto"`, plus the derived `<NAME>_PORT` environment variables
//! for symbolically named ports.

use std::collections::BTreeMap;
use std::fmt;

use devstack_common::config::Settings;
use devstack_common::error::{DevstackError, Result};
use serde::{Deserialize, Serialize};

/// Name of the implicit HTTP port entry.
pub const HTTP_PORT_NAME: &str = "http";

/// Transport protocol of a declared port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP.
    Tcp,
    /// UDP.
    Udp,
}

impl Protocol {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "tcp" => Some(Self::Tcp),
            "udp" => Some(Self::Udp),
            _ => None,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
        }
    }
}

/// A parsed `"PORT"`, `"PORT/proto"`, or `"PUBLIC:PORT/proto"` declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSpec {
    /// Internal (container-side) port.
    pub port: u16,
    /// Transport protocol, `tcp` when omitted.
    pub protocol: Protocol,
    /// Explicitly pinned host port, if any.
    pub public: Option<u16>,
}

impl PortSpec {
    /// Parses a raw declaration, reporting the owning system on failure.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPort` carrying the system name and the raw value
    /// when it is not a valid `[public:]port[/proto]` form; the value is
    /// never coerced to a guess.
    pub fn parse(system: &str, raw: &str) -> Result<Self> {
        let invalid = || DevstackError::InvalidPort {
            system: system.to_string(),
            value: raw.to_string(),
        };

        let (ports_part, proto_part) = match raw.split_once('/') {
            Some((ports, proto)) => (ports, Some(proto)),
            None => (raw, None),
        };
        let protocol = match proto_part {
            Some(proto) => Protocol::parse(proto).ok_or_else(invalid)?,
            None => Protocol::Tcp,
        };
        let (public, port) = match ports_part.split_once(':') {
            Some((public, port)) => (Some(public.parse::<u16>().map_err(|_| invalid())?), port),
            None => (None, ports_part),
        };
        let port = port.parse::<u16>().map_err(|_| invalid())?;

        Ok(Self {
            port,
            protocol,
            public,
        })
    }

    /// Runtime binding-table key, e.g. `"8080/tcp"`.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}/{}", self.port, self.protocol)
    }
}

/// One host-side binding for a container port.
///
/// Serialized in the container runtime's own field naming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostBinding {
    /// Host IP the port binds to.
    #[serde(rename = "HostIp")]
    pub host_ip: String,
    /// Fixed host port; dynamically assigned by the runtime when absent.
    #[serde(rename = "HostPort", skip_serializing_if = "Option::is_none")]
    pub host_port: Option<String>,
}

/// The resolved port set of one system, keyed by declared name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedPorts {
    specs: BTreeMap<String, PortSpec>,
}

impl ResolvedPorts {
    /// Resolves declared shorthand, adding the implicit HTTP default when
    /// the system is flagged as HTTP-exposing and declares no `http` port.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPort` for any declaration that fails to parse.
    pub fn resolve(
        system: &str,
        declared: &BTreeMap<String, String>,
        http_exposed: bool,
        settings: &Settings,
    ) -> Result<Self> {
        let mut specs = BTreeMap::new();
        for (name, raw) in declared {
            let _ = specs.insert(name.clone(), PortSpec::parse(system, raw)?);
        }
        if http_exposed && !specs.contains_key(HTTP_PORT_NAME) {
            let protocol =
                Protocol::parse(&settings.http.default_protocol).unwrap_or(Protocol::Tcp);
            let _ = specs.insert(
                HTTP_PORT_NAME.to_string(),
                PortSpec {
                    port: settings.http.default_port,
                    protocol,
                    public: None,
                },
            );
        }
        Ok(Self { specs })
    }

    /// Merges image-declared exposed ports additively.
    ///
    /// Declared ports win on conflict; image ports never override them.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPort` if an exposed-port key is malformed.
    pub fn merge_exposed<'a>(
        &mut self,
        system: &str,
        exposed: impl IntoIterator<Item = &'a String>,
    ) -> Result<()> {
        for key in exposed {
            let spec = PortSpec::parse(system, key)?;
            if !self.specs.values().any(|s| s.key() == spec.key()) {
                let _ = self.specs.insert(spec.key(), spec);
            }
        }
        Ok(())
    }

    /// Builds the runtime binding table keyed by `"port/proto"`.
    ///
    /// Every binding uses the configured DNS bind IP; a fixed host port is
    /// present only for the fixed public port or an explicitly pinned one.
    #[must_use]
    pub fn bindings(&self, settings: &Settings) -> BTreeMap<String, Vec<HostBinding>> {
        let mut table = BTreeMap::new();
        for spec in self.specs.values() {
            let host_port = spec.public.map(|p| p.to_string()).or_else(|| {
                (spec.port == settings.http.fixed_public_port).then(|| spec.port.to_string())
            });
            let _ = table.insert(
                spec.key(),
                vec![HostBinding {
                    host_ip: settings.dns_ip.clone(),
                    host_port,
                }],
            );
        }
        table
    }

    /// Derives `<NAME>_PORT` variables for symbolically named ports.
    ///
    /// Raw `"port/proto"` names never produce a variable.
    #[must_use]
    pub fn env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        for (name, spec) in &self.specs {
            if is_symbolic(name) {
                let _ = env.insert(format!("{}_PORT", env_label(name)), spec.port.to_string());
            }
        }
        env
    }

    /// Internal port of the `http` entry, if present.
    #[must_use]
    pub fn http_port(&self) -> Option<u16> {
        self.specs.get(HTTP_PORT_NAME).map(|spec| spec.port)
    }

    /// Iterates over `(name, spec)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &PortSpec)> {
        self.specs.iter()
    }

    /// Whether any port is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// Whether a port name is symbolic rather than a raw `"port/proto"` literal.
pub(crate) fn is_symbolic(name: &str) -> bool {
    !name.chars().next().is_some_and(|c| c.is_ascii_digit())
}

/// Uppercases a name for env-var derivation.
pub(crate) fn env_label(name: &str) -> String {
    name.to_uppercase().replace(['-', '.'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declared(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn parse_bare_port_defaults_to_tcp() {
        let spec = PortSpec::parse("web", "8080").expect("should parse");
        assert_eq!(spec.port, 8080);
        assert_eq!(spec.protocol, Protocol::Tcp);
        assert!(spec.public.is_none());
        assert_eq!(spec.key(), "8080/tcp");
    }

    #[test]
    fn parse_port_with_protocol() {
        let spec = PortSpec::parse("dns", "53/udp").expect("should parse");
        assert_eq!(spec.port, 53);
        assert_eq!(spec.protocol, Protocol::Udp);
    }

    #[test]
    fn parse_pinned_public_port() {
        let spec = PortSpec::parse("web", "8080:80/tcp").expect("should parse");
        assert_eq!(spec.port, 80);
        assert_eq!(spec.public, Some(8080));
    }

    #[test]
    fn parse_failure_reports_system_and_value() {
        let err = PortSpec::parse("web", "not-a-port").expect_err("should fail");
        let msg = err.to_string();
        assert!(msg.contains("web"), "got: {msg}");
        assert!(msg.contains("not-a-port"), "got: {msg}");
    }

    #[test]
    fn parse_rejects_unknown_protocol() {
        assert!(PortSpec::parse("web", "80/sctp").is_err());
        assert!(PortSpec::parse("web", "80/").is_err());
    }

    #[test]
    fn http_exposing_system_gets_implicit_default() {
        let settings = Settings::default();
        let ports =
            ResolvedPorts::resolve("web", &BTreeMap::new(), true, &settings).expect("resolve");
        assert_eq!(ports.http_port(), Some(settings.http.default_port));
    }

    #[test]
    fn declared_http_port_wins_over_implicit_default() {
        let settings = Settings::default();
        let ports = ResolvedPorts::resolve("web", &declared(&[("http", "8080/tcp")]), true, &settings)
            .expect("resolve");
        assert_eq!(ports.http_port(), Some(8080));
    }

    #[test]
    fn bindings_use_dns_ip_and_dynamic_host_ports() {
        let settings = Settings::default();
        let ports = ResolvedPorts::resolve(
            "web",
            &declared(&[("80/tcp", "80/tcp"), ("53/udp", "53/udp"), ("443/tcp", "443/tcp")]),
            false,
            &settings,
        )
        .expect("resolve");
        let table = ports.bindings(&settings);

        let web = &table["80/tcp"];
        assert_eq!(
            web,
            &vec![HostBinding {
                host_ip: settings.dns_ip.clone(),
                host_port: None,
            }]
        );
        let dns = &table["53/udp"];
        assert!(dns[0].host_port.is_none());
        let https = &table["443/tcp"];
        assert_eq!(https[0].host_port.as_deref(), Some("443"));
    }

    #[test]
    fn pinned_port_keeps_its_host_port() {
        let settings = Settings::default();
        let ports = ResolvedPorts::resolve("web", &declared(&[("http", "8080:80/tcp")]), false, &settings)
            .expect("resolve");
        let table = ports.bindings(&settings);
        assert_eq!(table["80/tcp"][0].host_port.as_deref(), Some("8080"));
    }

    #[test]
    fn symbolic_names_derive_env_raw_names_do_not() {
        let settings = Settings::default();
        let ports = ResolvedPorts::resolve(
            "cache",
            &declared(&[("http", "8080/tcp"), ("6379/tcp", "6379/tcp")]),
            false,
            &settings,
        )
        .expect("resolve");
        let env = ports.env();

        assert_eq!(env.get("HTTP_PORT").map(String::as_str), Some("8080"));
        assert!(!env.contains_key("6379_PORT"));
        assert!(!env.contains_key("6379/TCP_PORT"));
    }

    #[test]
    fn image_ports_merge_additively_without_overriding() {
        let settings = Settings::default();
        let mut ports = ResolvedPorts::resolve("db", &declared(&[("80/tcp", "80/tcp")]), false, &settings)
            .expect("resolve");

        let exposed = vec!["53/udp".to_string(), "5000/tcp".to_string(), "80/tcp".to_string()];
        ports.merge_exposed("db", exposed.iter()).expect("merge");

        let table = ports.bindings(&settings);
        assert_eq!(table.len(), 3);
        assert!(table.contains_key("80/tcp"));
        assert!(table.contains_key("53/udp"));
        assert!(table.contains_key("5000/tcp"));
    }

    #[test]
    fn image_port_names_are_raw_and_derive_no_env() {
        let settings = Settings::default();
        let mut ports = ResolvedPorts::resolve("db", &BTreeMap::new(), false, &settings).expect("resolve");
        let exposed = vec!["5432/tcp".to_string()];
        ports.merge_exposed("db", exposed.iter()).expect("merge");
        assert!(ports.env().is_empty());
    }
}
