//! Explicit settings object for the resolution core.
//!
//! A `Settings` value is constructed once by the embedding application and
//! passed by reference into every component that needs it. There is no
//! ambient lookup: these fields are the only source of agent-level
//! defaults.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants;

/// Agent-level settings consumed by manifest resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Host IP that published container ports bind to.
    pub dns_ip: String,
    /// Name servers injected into every launched container.
    pub name_servers: Vec<String>,
    /// HTTP exposure defaults.
    pub http: HttpSettings,
    /// Balancer identity advertised to templates.
    pub balancer: BalancerSettings,
    /// Root directory for persistent per-system storage.
    pub persistent_root: PathBuf,
    /// Repository namespace used for locally built images.
    pub repository: String,
}

/// HTTP exposure defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpSettings {
    /// Internal port assumed when an HTTP-exposing system declares none.
    pub default_port: u16,
    /// Protocol assumed when a declaration omits one.
    pub default_protocol: String,
    /// Internal port that is published on a fixed, equal host port.
    pub fixed_public_port: u16,
}

/// Balancer identity advertised to templates and export envs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalancerSettings {
    /// Hostname the balancer answers on.
    pub host: String,
    /// IP the balancer binds to.
    pub ip: String,
    /// Port the balancer listens on.
    pub port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dns_ip: constants::DEFAULT_DNS_IP.to_string(),
            name_servers: vec![constants::DEFAULT_DNS_IP.to_string()],
            http: HttpSettings::default(),
            balancer: BalancerSettings::default(),
            persistent_root: PathBuf::from(constants::DEFAULT_PERSISTENT_ROOT),
            repository: constants::DEFAULT_REPOSITORY.to_string(),
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            default_port: constants::DEFAULT_HTTP_PORT,
            default_protocol: constants::DEFAULT_PROTOCOL.to_string(),
            fixed_public_port: constants::FIXED_PUBLIC_PORT,
        }
    }
}

impl Default for BalancerSettings {
    fn default() -> Self {
        Self {
            host: constants::DEFAULT_BALANCER_HOST.to_string(),
            ip: constants::DEFAULT_BALANCER_IP.to_string(),
            port: constants::DEFAULT_BALANCER_PORT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_come_from_constants() {
        let settings = Settings::default();
        assert_eq!(settings.dns_ip, constants::DEFAULT_DNS_IP);
        assert_eq!(settings.http.default_port, constants::DEFAULT_HTTP_PORT);
        assert_eq!(settings.http.fixed_public_port, constants::FIXED_PUBLIC_PORT);
        assert_eq!(settings.balancer.port, constants::DEFAULT_BALANCER_PORT);
    }

    #[test]
    fn settings_serialization_roundtrip() {
        let settings = Settings::default();
        let json = serde_json::to_string(&settings).expect("serialize");
        let back: Settings = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, settings);
    }

    #[test]
    fn two_settings_values_are_independent() {
        let a = Settings::default();
        let mut b = Settings::default();
        b.dns_ip = "10.0.0.1".to_string();
        assert_ne!(a, b);
        assert_eq!(a.dns_ip, constants::DEFAULT_DNS_IP);
    }
}
