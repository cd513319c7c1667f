use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;

use serde::Deserialize;

use crate::telemetry::CollectorConfig;

#[derive(clap::Parser, Debug)]
#[command(version, about = "An SSH honeypot with a fake shell and HTTP telemetry", long_about = "An SSH honeypot that captures credentials and commands. It presents a fake command interface backed by canned output, so nothing an attacker types is ever executed, and ships every authentication attempt and command line to a remote collector over HTTP")]
pub struct App {
    /// The addresses to listen on, requires a port over 1000 or use linux setcap cap_net_bind_service command
    #[arg(short = 'i', long = "interface", default_values_t = vec![SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), 2222), SocketAddr::new(std::net::IpAddr::V6(Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 0)), 2222)], env = "INTERFACE")]
    pub interfaces: Vec<SocketAddr>,

    /// Deployment configuration file (credentials, hostname, collector endpoints)
    #[arg(short = 'f', long = "config", env = "CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    /// Folder holding the server host keys; created and populated on first start
    #[arg(short = 'k', long = "key-folder", env = "KEY_FOLDER")]
    pub key_folder: Option<PathBuf>,

    /// Directory with the canned command output resources
    #[arg(short = 's', long = "static-dir", default_value = "static", env = "STATIC_DIR")]
    pub static_dir: PathBuf,

    /// Upper bound on concurrent attacker sessions
    #[arg(short = 'm', long = "max-connections", default_value_t = 256, env = "MAX_CONNECTIONS")]
    pub max_connections: usize,

    /// Authentication banner to show. Can make the server more realistic
    #[arg(short, long, env = "AUTHENTICATION_BANNER")]
    pub authentication_banner: Option<String>,
}

fn default_user() -> String {
    "admin".to_string()
}

fn default_password() -> String {
    "dadada".to_string()
}

fn default_hostname() -> String {
    "localhost.localdomain".to_string()
}

/// Deployment configuration, loaded once at startup and immutable after.
/// Every field has a default so a missing file still yields a working
/// (if collector-less) honeypot.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeployConfig {
    /// The one credential pair the honeypot accepts
    pub user: String,
    pub password: String,
    /// Hostname shown in the shell prompt
    pub hostname: String,
    pub identity: Identity,
    pub collector: Collector,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Identity {
    pub service: String,
    pub ip: String,
    pub location: String,
    pub provider: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Collector {
    pub bruteforce_url: Option<String>,
    pub commands_url: Option<String>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        DeployConfig {
            user: default_user(),
            password: default_password(),
            hostname: default_hostname(),
            identity: Identity::default(),
            collector: Collector::default(),
        }
    }
}

impl DeployConfig {
    /// Reads the TOML deployment file. A missing file falls back to the
    /// defaults; an unreadable or malformed file is a startup error, since
    /// running with half a config would silently misreport telemetry.
    pub fn load(path: &std::path::Path) -> Result<Self, Box<dyn std::error::Error>> {
        match std::fs::read_to_string(path) {
            Ok(raw) => {
                let config: DeployConfig = toml::from_str(&raw)?;
                log::info!("Loaded deployment config from {}", path.display());
                Ok(config)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("No deployment config at {}, using defaults", path.display());
                Ok(DeployConfig::default())
            }
            Err(err) => Err(Box::new(err)),
        }
    }

    pub fn collector_config(&self) -> CollectorConfig {
        CollectorConfig {
            bruteforce_url: self.collector.bruteforce_url.clone(),
            commands_url: self.collector.commands_url.clone(),
            service: self.identity.service.clone(),
            honeypot_ip: self.identity.ip.clone(),
            honeypot_location: self.identity.location.clone(),
            honeypot_provider: self.identity.provider.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = DeployConfig::load(std::path::Path::new("/nonexistent/honeypot.toml")).unwrap();
        assert_eq!(config.user, "admin");
        assert_eq!(config.password, "dadada");
        assert_eq!(config.hostname, "localhost.localdomain");
        assert!(config.collector.bruteforce_url.is_none());
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("honeypot.toml");
        std::fs::write(
            &path,
            r#"
user = "root"
hostname = "web01.internal"

[identity]
service = "ssh"
ip = "198.51.100.7"

[collector]
bruteforce_url = "http://collector.example/api/ip"
commands_url = "http://collector.example/api/commands"
"#,
        )
        .unwrap();

        let config = DeployConfig::load(&path).unwrap();
        assert_eq!(config.user, "root");
        // Unset fields keep their defaults
        assert_eq!(config.password, "dadada");
        assert_eq!(config.hostname, "web01.internal");
        assert_eq!(config.identity.ip, "198.51.100.7");
        assert_eq!(
            config.collector.bruteforce_url.as_deref(),
            Some("http://collector.example/api/ip")
        );
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("honeypot.toml");
        std::fs::write(&path, "user = [not toml").unwrap();
        assert!(DeployConfig::load(&path).is_err());
    }
}
