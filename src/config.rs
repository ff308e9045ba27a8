//! Configuration file handling.
//!
//! Settings come from an optional `polarity.toml`, then the `POLARITY_DB`
//! environment variable, then command-line flags (applied by the binaries).

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::hover::HoverConfig;
use crate::layout::LayoutConfig;

/// Config file looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "polarity.toml";

/// Environment variable overriding the database path
pub const DB_ENV_VAR: &str = "POLARITY_DB";

/// Root configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database file.
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// Log file for the terminal UI (it owns the screen, so no stderr logging there).
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    #[serde(default)]
    pub server: ServerConfig,

    /// Web page layout, in vh and px.
    #[serde(default)]
    pub layout: LayoutConfig,

    /// Web page hover, in px.
    #[serde(default)]
    pub hover: HoverConfig,

    /// Terminal surface settings, in rows and columns.
    #[serde(default)]
    pub terminal: TerminalConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: default_database(),
            log_file: None,
            server: ServerConfig::default(),
            layout: LayoutConfig::default(),
            hover: HoverConfig::default(),
            terminal: TerminalConfig::default(),
        }
    }
}

fn default_database() -> PathBuf {
    PathBuf::from("polarity.db")
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,

    /// Directory served under /static.
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            static_dir: default_static_dir(),
        }
    }
}

fn default_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("web")
}

/// The terminal is one screen tall, so the page is 100 "vh" of rows and
/// staggers are measured in columns. Keys missing from `[terminal.*]` fall
/// back to the terminal defaults, not the web ones.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TerminalConfig {
    pub layout: LayoutConfig,
    pub hover: HoverConfig,
}

impl<'de> Deserialize<'de> for TerminalConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct RawTerminal {
            #[serde(default)]
            layout: toml::Table,
            #[serde(default)]
            hover: toml::Table,
        }

        let raw = RawTerminal::deserialize(deserializer)?;
        let defaults = TerminalConfig::default();

        Ok(TerminalConfig {
            layout: overlay(defaults.layout, raw.layout).map_err(serde::de::Error::custom)?,
            hover: overlay(defaults.hover, raw.hover).map_err(serde::de::Error::custom)?,
        })
    }
}

/// Apply the keys of `patch` on top of `base`
fn overlay<T: Serialize + DeserializeOwned>(base: T, patch: toml::Table) -> Result<T, String> {
    let mut table = match toml::Value::try_from(base).map_err(|e| e.to_string())? {
        toml::Value::Table(table) => table,
        other => return Err(format!("expected a table, got {}", other.type_str())),
    };
    table.extend(patch);
    toml::Value::Table(table)
        .try_into()
        .map_err(|e: toml::de::Error| e.to_string())
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            layout: default_terminal_layout(),
            hover: default_terminal_hover(),
        }
    }
}

fn default_terminal_layout() -> LayoutConfig {
    LayoutConfig {
        page_height: 100.0,
        top_margin: 5.0,
        bottom_margin: 5.0,
        proximity_threshold: 2.0,
        stagger_magnitude: 3.0,
    }
}

fn default_terminal_hover() -> HoverConfig {
    HoverConfig {
        threshold_px: 1.0,
        panel_band_px: 4.0,
    }
}

impl Config {
    /// Parse a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Load the explicit file if given, else `polarity.toml` if present, else defaults.
    /// `POLARITY_DB` then overrides the database path.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::load_from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };

        if let Ok(db) = std::env::var(DB_ENV_VAR) {
            if !db.trim().is_empty() {
                config.database = PathBuf::from(db);
            }
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.layout.validate().context("Invalid [layout]")?;
        self.terminal
            .layout
            .validate()
            .context("Invalid [terminal.layout]")?;
        self.hover.validate().context("Invalid [hover]")?;
        self.terminal
            .hover
            .validate()
            .context("Invalid [terminal.hover]")?;
        Ok(())
    }

    /// Generate a config file with every default spelled out.
    pub fn default_toml() -> Result<String> {
        toml::to_string_pretty(&Self::default()).context("Failed to serialize default config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database, PathBuf::from("polarity.db"));
        assert_eq!(config.server.addr, "0.0.0.0:3000");
        assert_eq!(config.layout.page_height, 200.0);
        assert_eq!(config.terminal.layout.page_height, 100.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            database = "/tmp/votes.db"

            [layout]
            top_margin = 10.0

            [terminal.hover]
            threshold_px = 2.0
            "#,
        )
        .unwrap();

        assert_eq!(config.database, PathBuf::from("/tmp/votes.db"));
        assert_eq!(config.layout.top_margin, 10.0);
        assert_eq!(config.layout.bottom_margin, 15.0);
        assert_eq!(config.terminal.hover.threshold_px, 2.0);
        assert_eq!(config.terminal.hover.panel_band_px, 4.0);
        assert_eq!(config.terminal.layout, default_terminal_layout());
    }

    #[test]
    fn test_invalid_layout_rejected() {
        let result = Config::from_toml(
            r#"
            [layout]
            page_height = 20.0
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_negative_hover_distance_rejected() {
        let result = Config::from_toml(
            r#"
            [hover]
            threshold_px = -5.0
            "#,
        );
        assert!(result.is_err());

        let result = Config::from_toml(
            r#"
            [terminal.hover]
            panel_band_px = -1.0
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_default_toml_round_trips() {
        let text = Config::default_toml().unwrap();
        assert_eq!(Config::from_toml(&text).unwrap(), Config::default());
    }
}
