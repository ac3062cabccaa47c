//! Configuration resolution for `LanChat`.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/lanchat/settings.json) or an explicit file
//! 3. Environment variables
//! 4. CLI arguments (applied by the binaries, highest priority)

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default relay listen / connect address.
pub const DEFAULT_ADDR: &str = "127.0.0.1:5566";

/// Complete `LanChat` configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

/// Relay-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub addr: SocketAddr,
    pub database_path: Option<PathBuf>,
    pub log_level: String,
    pub max_frame_bytes: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 5566)),
            database_path: None,
            log_level: "info".to_string(),
            max_frame_bytes: 8 * 1024 * 1024, // 8 MiB
        }
    }
}

/// Client session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub addr: SocketAddr,
    /// Upper bound for a single frame read inside a request cycle (seconds).
    pub read_timeout_secs: u64,
    /// Connect timeout (seconds).
    pub connect_timeout_secs: u64,
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 5566)),
            read_timeout_secs: 5,
            connect_timeout_secs: 5,
            log_level: "warn".to_string(),
        }
    }
}

impl ClientConfig {
    pub const fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Load configuration with hierarchical resolution.
///
/// When `explicit` is given it replaces the global settings file and must
/// exist.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let mut config = match explicit {
        Some(path) => load_config_file(path)?,
        None => match global_config_path() {
            Some(path) if path.exists() => load_config_file(&path)?,
            _ => Config::default(),
        },
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.validate()?;

    Ok(config)
}

impl Config {
    /// Reject values that parse but would stall or break a session.
    pub fn validate(&self) -> Result<()> {
        let zero = |key: &'static str| Error::InvalidSetting {
            key,
            reason: "must be greater than zero".to_string(),
        };
        if self.relay.max_frame_bytes == 0 {
            return Err(zero("relay.max_frame_bytes"));
        }
        if self.client.read_timeout_secs == 0 {
            return Err(zero("client.read_timeout_secs"));
        }
        if self.client.connect_timeout_secs == 0 {
            return Err(zero("client.connect_timeout_secs"));
        }
        Ok(())
    }
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".lanchat").join("settings.json"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/lanchat/settings.json"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("lanchat").join("settings.json"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| Error::ConfigParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Apply `LANCHAT_*` overrides using the given variable lookup.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(addr) = lookup("LANCHAT_ADDR").and_then(|v| v.parse().ok()) {
        config.relay.addr = addr;
        config.client.addr = addr;
    }
    if let Some(path) = lookup("LANCHAT_DB_PATH") {
        config.relay.database_path = Some(PathBuf::from(path));
    }
    if let Some(level) = lookup("LANCHAT_LOG_LEVEL") {
        config.relay.log_level.clone_from(&level);
        config.client.log_level = level;
    }
    if let Some(secs) = lookup("LANCHAT_READ_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        config.client.read_timeout_secs = secs;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_point_at_local_relay() {
        let config = Config::default();
        assert_eq!(config.relay.addr.to_string(), DEFAULT_ADDR);
        assert_eq!(config.client.addr.to_string(), DEFAULT_ADDR);
        assert_eq!(config.client.read_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"relay": {"addr": "0.0.0.0:7000"}}"#).unwrap();

        let config = load_config_file(&path).unwrap();
        assert_eq!(config.relay.addr.port(), 7000);
        assert_eq!(config.relay.max_frame_bytes, 8 * 1024 * 1024);
        assert_eq!(config.client.read_timeout_secs, 5);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ nope").unwrap();

        assert!(matches!(
            load_config_file(&path),
            Err(Error::ConfigParse { path: p, .. }) if p == path
        ));
    }

    #[test]
    fn missing_explicit_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");

        let err = load_config(Some(&path)).unwrap_err();
        assert!(matches!(err, Error::ConfigRead { .. }));
        assert!(err.to_string().contains("absent.json"));
    }

    #[test]
    fn zero_timeouts_are_rejected() {
        let mut config = Config::default();
        config.validate().unwrap();

        config.client.read_timeout_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidSetting { key: "client.read_timeout_secs", .. })
        ));
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("LANCHAT_ADDR", "10.0.0.2:9000"),
            ("LANCHAT_DB_PATH", "/tmp/chat.db"),
            ("LANCHAT_READ_TIMEOUT_SECS", "12"),
        ]);
        let mut config = Config::default();
        apply_env_overrides(&mut config, |k| vars.get(k).map(ToString::to_string));

        assert_eq!(config.relay.addr.to_string(), "10.0.0.2:9000");
        assert_eq!(config.client.addr.to_string(), "10.0.0.2:9000");
        assert_eq!(
            config.relay.database_path.as_deref(),
            Some(Path::new("/tmp/chat.db"))
        );
        assert_eq!(config.client.read_timeout_secs, 12);
    }

    #[test]
    fn unparsable_env_values_are_ignored() {
        let mut config = Config::default();
        apply_env_overrides(&mut config, |k| {
            (k == "LANCHAT_ADDR").then(|| "not-an-addr".to_string())
        });
        assert_eq!(config.relay.addr.to_string(), DEFAULT_ADDR);
    }
}
