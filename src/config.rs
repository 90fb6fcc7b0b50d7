//! Configuration management
//!
//! Loaded once at startup from an optional YAML file merged with `AUTHD_`
//! environment variables, then immutable for the process lifetime. The only
//! runtime-mutable state in the daemon is the store snapshot, which is
//! replaced whole — never edited in place.
//!
//! # Example YAML
//!
//! ```yaml
//! server:
//!   host: "0.0.0.0"
//!   port: 9669
//! tls:
//!   server_cert: "/etc/authd/tls/server.crt"
//!   server_key:  "/etc/authd/tls/server.key"
//!   sni_hostname: "openspock.org"
//!   require_client_cert: false
//! limits:
//!   max_sessions: 64
//!   read_timeout: 30s
//! store:
//!   path: "/etc/authd"
//!   watch: true
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listener configuration
    pub server: ServerConfig,
    /// TLS material and client-auth policy
    pub tls: TlsConfig,
    /// Concurrency and timeout limits
    pub limits: LimitsConfig,
    /// Store location
    pub store: StoreConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9669,
        }
    }
}

/// TLS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Path to the PEM-encoded server certificate chain.
    pub server_cert: String,

    /// Path to the PEM-encoded server private key.
    pub server_key: String,

    /// When `true`, clients that do not present a valid certificate signed
    /// by `ca_cert` are rejected at the TLS handshake. Off by default; the
    /// deployed clients authenticate with credentials, not certificates.
    pub require_client_cert: bool,

    /// Path to the PEM-encoded CA bundle used to verify client certs.
    ///
    /// When set without `require_client_cert`, certificates are requested
    /// and verified if offered, but connections without one still complete.
    pub ca_cert: Option<String>,

    /// Hostname clients use for SNI. Recorded here so `authd tls issue`
    /// puts the right SAN on the server certificate.
    pub sni_hostname: String,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            server_cert: "/etc/authd/tls/server.crt".to_string(),
            server_key: "/etc/authd/tls/server.key".to_string(),
            require_client_cert: false,
            ca_cert: None,
            sni_hostname: "localhost".to_string(),
        }
    }
}

/// Concurrency and timeout limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum concurrent sessions; further connections are refused.
    pub max_sessions: u32,

    /// Deadline for completing the TLS handshake.
    #[serde(with = "humantime_serde")]
    pub handshake_timeout: Duration,

    /// Deadline for receiving the command frame after the handshake.
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,

    /// Deadline for writing the response frame.
    #[serde(with = "humantime_serde")]
    pub write_timeout: Duration,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_sessions: 64,
            handshake_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(10),
        }
    }
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding `users.yaml`, `roles.yaml`, and `grants.yaml`.
    pub path: PathBuf,
    /// Reload the store when its files change on disk.
    pub watch: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/etc/authd"),
            watch: true,
        }
    }
}

impl Config {
    /// Load configuration from an optional YAML file and the environment.
    ///
    /// Environment variables use the `AUTHD_` prefix with `__` as the
    /// section separator, e.g. `AUTHD_SERVER__PORT=9669`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("AUTHD_").split("__"));

        figment.extract().map_err(|e| Error::Config(e.to_string()))
    }

    /// Check cross-field constraints before the server starts.
    pub fn validate(&self) -> Result<()> {
        if self.tls.server_cert.is_empty() || self.tls.server_key.is_empty() {
            return Err(Error::Config(
                "tls.server_cert and tls.server_key are required".into(),
            ));
        }
        if self.tls.require_client_cert && self.tls.ca_cert.is_none() {
            return Err(Error::Config(
                "tls.require_client_cert is set but tls.ca_cert is not configured".into(),
            ));
        }
        if self.limits.max_sessions == 0 {
            return Err(Error::Config("limits.max_sessions must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults_match_the_deployed_protocol() {
        let config = Config::default();
        assert_eq!(config.server.port, 9669);
        assert_eq!(config.server.host, "127.0.0.1");
        assert!(!config.tls.require_client_cert);
        assert!(config.store.watch);
    }

    #[test]
    fn default_config_passes_validation() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn yaml_overrides_land_in_every_section() {
        // GIVEN: a config file overriding scattered fields
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("authd.yaml");
        std::fs::write(
            &path,
            "server:\n  port: 7000\ntls:\n  sni_hostname: openspock.org\nlimits:\n  max_sessions: 2\n  read_timeout: 5s\nstore:\n  watch: false\n",
        )
        .unwrap();

        // WHEN: loading
        let config = Config::load(Some(&path)).unwrap();

        // THEN: overrides applied, untouched fields keep defaults
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.tls.sni_hostname, "openspock.org");
        assert_eq!(config.limits.max_sessions, 2);
        assert_eq!(config.limits.read_timeout, Duration::from_secs(5));
        assert!(!config.store.watch);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/authd.yaml"))).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn require_client_cert_without_ca_fails_validation() {
        let mut config = Config::default();
        config.tls.require_client_cert = true;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ca_cert"));
    }

    #[test]
    fn zero_session_limit_fails_validation() {
        let mut config = Config::default();
        config.limits.max_sessions = 0;
        assert!(config.validate().is_err());
    }
}
