//! Configuration for BroDesk.
//!
//! Settings are read from `<data_dir>/brodesk.toml` and layered
//! file → environment → CLI flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3141
//! dev_mode = false
//!
//! [database]
//! path = "brodesk.db"
//!
//! [notifications]
//! enabled = true
//! webhook_url = "https://example.org/functions/v1/send-notification"
//! timeout_secs = 10
//!
//! [board]
//! drag_activation_distance = 8.0
//! feed_capacity = 256
//!
//! [logging]
//! filter = "brodesk=info,tower_http=info"
//! format = "pretty"
//! ```
//!
//! Environment overrides: `BRODESK_PORT`, `BRODESK_DB_PATH`,
//! `BRODESK_NOTIFY_URL`, `BRODESK_LOG`. A `.env` file in the working
//! directory is loaded first.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "brodesk.toml";
pub const DEFAULT_DATA_DIR: &str = ".brodesk";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Permissive CORS for a local front-end dev server.
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3141
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dev_mode: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    /// Relative paths are taken from the data directory.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("brodesk.db")
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Endpoint accepting `send-notification` requests. Without one,
    /// notifications are only logged.
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for NotificationsSection {
    fn default() -> Self {
        Self {
            enabled: true,
            webhook_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardSection {
    /// Pointer travel (px) before a press on a card becomes a drag.
    #[serde(default = "default_drag_distance")]
    pub drag_activation_distance: f64,
    /// Buffered change events per feed subscriber.
    #[serde(default = "default_feed_capacity")]
    pub feed_capacity: usize,
}

fn default_drag_distance() -> f64 {
    8.0
}

fn default_feed_capacity() -> usize {
    256
}

impl Default for BoardSection {
    fn default() -> Self {
        Self {
            drag_activation_distance: default_drag_distance(),
            feed_capacity: default_feed_capacity(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_filter() -> String {
    "brodesk=info,tower_http=info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            format: LogFormat::default(),
        }
    }
}

/// The complete brodesk.toml configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeskToml {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub notifications: NotificationsSection,
    #[serde(default)]
    pub board: BoardSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl DeskToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse brodesk.toml")
    }

    /// Load `<data_dir>/brodesk.toml`, or defaults if it doesn't exist.
    pub fn load_or_default(data_dir: &Path) -> Result<Self> {
        let config_path = data_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize brodesk.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply environment overrides through `lookup` (normally `std::env::var`).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("BRODESK_PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid BRODESK_PORT '{}'", port))?;
        }
        if let Some(path) = lookup("BRODESK_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(url) = lookup("BRODESK_NOTIFY_URL") {
            self.notifications.webhook_url = Some(url).filter(|u| !u.trim().is_empty());
        }
        if let Some(filter) = lookup("BRODESK_LOG") {
            self.logging.filter = filter;
        }
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.board.drag_activation_distance < 0.0 {
            warnings.push(format!(
                "drag_activation_distance {} is negative; every press will start a drag",
                self.board.drag_activation_distance
            ));
        }
        if self.board.feed_capacity == 0 {
            warnings.push("feed_capacity must be at least 1".to_string());
        }
        if self.notifications.enabled
            && let Some(url) = &self.notifications.webhook_url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            warnings.push(format!("webhook_url '{}' is not an http(s) URL", url));
        }
        if self.notifications.timeout_secs == 0 {
            warnings.push("notifications.timeout_secs of 0 disables delivery".to_string());
        }

        warnings
    }
}

/// Resolved runtime configuration: the data directory plus its settings.
#[derive(Debug, Clone)]
pub struct DeskConfig {
    pub data_dir: PathBuf,
    pub toml: DeskToml,
}

impl DeskConfig {
    /// Load from `data_dir`, then apply `.env` and process environment overrides.
    pub fn load(data_dir: PathBuf) -> Result<Self> {
        dotenvy::dotenv().ok();
        let mut toml = DeskToml::load_or_default(&data_dir)?;
        toml.apply_env(|key| std::env::var(key).ok())?;
        Ok(Self { data_dir, toml })
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.toml.database.path)
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = DeskToml::default();
        assert_eq!(config.server.port, 3141);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.database.path, PathBuf::from("brodesk.db"));
        assert!(config.notifications.enabled);
        assert!(config.notifications.webhook_url.is_none());
        assert_eq!(config.board.drag_activation_distance, 8.0);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_parse_partial_file_keeps_defaults() {
        let config = DeskToml::parse(
            r#"
            [server]
            port = 8080

            [logging]
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.board.feed_capacity, 256);
    }

    #[test]
    fn test_parse_invalid_toml() {
        assert!(DeskToml::parse("[server\nport = ").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("BRODESK_PORT", "9000"),
            ("BRODESK_DB_PATH", "/tmp/desk.db"),
            ("BRODESK_NOTIFY_URL", "https://hooks.example.org/notify"),
        ]
        .into_iter()
        .collect();

        let mut config = DeskToml::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.database.path, PathBuf::from("/tmp/desk.db"));
        assert_eq!(
            config.notifications.webhook_url.as_deref(),
            Some("https://hooks.example.org/notify")
        );
    }

    #[test]
    fn test_env_invalid_port_is_error() {
        let mut config = DeskToml::default();
        let result = config.apply_env(|k| (k == "BRODESK_PORT").then(|| "lots".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_flags_bad_webhook_url() {
        let mut config = DeskToml::default();
        config.notifications.webhook_url = Some("ftp://nope".to_string());
        let warnings = config.validate();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("ftp://nope"));
    }

    #[test]
    fn test_save_and_load_roundtrip_file() {
        let dir = tempdir().unwrap();
        let mut config = DeskToml::default();
        config.server.port = 4242;
        config.save(&dir.path().join(CONFIG_FILE)).unwrap();

        let loaded = DeskToml::load_or_default(dir.path()).unwrap();
        assert_eq!(loaded.server.port, 4242);
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = tempdir().unwrap();
        let loaded = DeskToml::load_or_default(dir.path()).unwrap();
        assert_eq!(loaded.server.port, 3141);
    }

    #[test]
    fn test_db_path_is_relative_to_data_dir() {
        let mut config = DeskConfig {
            data_dir: PathBuf::from("/srv/desk"),
            toml: DeskToml::default(),
        };
        assert_eq!(config.db_path(), PathBuf::from("/srv/desk/brodesk.db"));

        config.toml.database.path = PathBuf::from("/var/lib/desk.db");
        assert_eq!(config.db_path(), PathBuf::from("/var/lib/desk.db"));
    }
}
