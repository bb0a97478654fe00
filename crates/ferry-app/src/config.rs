//! Configuration file loading.
//!
//! The file is TOML with two optional tables:
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 48765
//!
//! [proxy]
//! blocked_domains = ["ads.example"]
//! cache_duration_minutes = 5
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use ferry_core::ProxySettings;
use ferry_server::ServerConfig;
use serde::Deserialize;

/// Name of the config file inside the platform config directory.
pub const CONFIG_FILE: &str = "ferry.toml";

/// `[server]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        let config = ServerConfig::default();
        Self {
            host: config.host,
            port: config.port,
        }
    }
}

impl From<ServerSection> for ServerConfig {
    fn from(section: ServerSection) -> Self {
        ServerConfig::default()
            .with_host(section.host)
            .with_port(section.port)
    }
}

/// Whole application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSection,
    pub proxy: ProxySettings,
}

impl AppConfig {
    /// Parses configuration from TOML text.
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid configuration")
    }

    /// Loads configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Loads the explicit path if given, else the default file if it exists,
    /// else built-in defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }
}

/// Platform config location, e.g. `~/.config/ferry/ferry.toml` on Linux.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "ferry", "Ferry").map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn empty_file_uses_defaults() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.server.port, 48765);
    }

    #[test]
    fn partial_tables_fill_defaults() {
        let config = AppConfig::parse(
            r#"
            [server]
            port = 9000

            [proxy]
            blocked_domains = ["ads.example"]
            enable_caching = false
            "#,
        )
        .unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.proxy.blocked_domains, vec!["ads.example".to_string()]);
        assert!(!config.proxy.enable_caching);
        assert_eq!(config.proxy.max_redirects, 5);
    }

    #[test]
    fn load_reads_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[proxy]\nproxy_base_url = \"https://relay.example\"").unwrap();

        let config = AppConfig::resolve(Some(file.path())).unwrap();
        assert_eq!(config.proxy.proxy_base(), "https://relay.example");
    }

    #[test]
    fn load_reports_bad_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = \"not a number\"").unwrap();

        let err = AppConfig::load(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("invalid configuration"));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AppConfig::resolve(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn server_section_converts() {
        let config: ServerConfig = ServerSection {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
        .into();
        assert_eq!(config, ServerConfig::default().with_host("0.0.0.0").with_port(8080));
    }
}
