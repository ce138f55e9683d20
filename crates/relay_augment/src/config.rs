//! Plugin configuration.
//!
//! Loaded from an optional TOML file. Every section has defaults matching
//! the stock host, so the plugin works without any file at all:
//!
//! ```toml
//! [interfaces]
//! server_game_dll = "ServerGameDLL010"
//! engine_server = "VEngineServer023"
//! file_system = "VFileSystem022"
//! relay_director = "HLTVDirector001"
//!
//! [[proxies]]
//! label = "local_data"
//! class = "CBasePlayer"
//! path = "localdata"
//!
//! [events]
//! search_path = "GAME"
//! resources = ["resource/modevents.res", "resource/gameevents.res", "resource/serverevents.res"]
//! max_host_events = 1000
//!
//! [logging]
//! level = "info"
//! json_format = false
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;

/// Default location of the configuration file, relative to the game dir.
pub const DEFAULT_CONFIG_PATH: &str = "cfg/relay_augment.toml";

/// Top-level plugin configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Host interface names to resolve
    pub interfaces: InterfaceNames,
    /// Serialization callbacks to intercept
    pub proxies: Vec<ProxyTarget>,
    /// Event catalog sources
    pub events: EventSettings,
    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Requested names of the host interfaces. Version suffixes are probed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceNames {
    pub server_game_dll: String,
    pub engine_server: String,
    pub file_system: String,
    pub relay_director: String,
}

impl Default for InterfaceNames {
    fn default() -> Self {
        Self {
            server_game_dll: "ServerGameDLL010".to_string(),
            engine_server: "VEngineServer023".to_string(),
            file_system: "VFileSystem022".to_string(),
            relay_director: "HLTVDirector001".to_string(),
        }
    }
}

/// A data-table property whose serialization callback gets intercepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyTarget {
    /// Name of the hook record, used in diagnostics
    pub label: String,
    /// Network class name
    pub class: String,
    /// Dot-separated property path inside the class table
    pub path: String,
}

impl ProxyTarget {
    pub fn new(label: &str, class: &str, path: &str) -> Self {
        Self {
            label: label.to_string(),
            class: class.to_string(),
            path: path.to_string(),
        }
    }
}

/// The three local data tables the relay is normally excluded from.
pub fn default_proxies() -> Vec<ProxyTarget> {
    vec![
        ProxyTarget::new("local_data", "CBasePlayer", "localdata"),
        ProxyTarget::new("local_weapon_data", "CBaseCombatWeapon", "LocalWeaponData"),
        ProxyTarget::new(
            "local_active_weapon_data",
            "CBaseCombatWeapon",
            "LocalActiveWeaponData",
        ),
    ]
}

/// Event catalog sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSettings {
    /// Search path id the resources are loaded from
    pub search_path: String,
    /// Resource files whose top-level keys are event names
    pub resources: Vec<String>,
    /// Upper bound on entries read from the host's own list
    pub max_host_events: usize,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            search_path: "GAME".to_string(),
            resources: vec![
                "resource/modevents.res".to_string(),
                "resource/gameevents.res".to_string(),
                "resource/serverevents.res".to_string(),
            ],
            max_host_events: 1000,
        }
    }
}

/// Logging system configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            interfaces: InterfaceNames::default(),
            proxies: default_proxies(),
            events: EventSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl PluginConfig {
    /// Loads configuration from a TOML file.
    ///
    /// A missing file yields the defaults. A file without a `[[proxies]]`
    /// table keeps the default proxy targets.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Validates the configuration for consistency and correctness.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let names = [
            ("server_game_dll", &self.interfaces.server_game_dll),
            ("engine_server", &self.interfaces.engine_server),
            ("file_system", &self.interfaces.file_system),
            ("relay_director", &self.interfaces.relay_director),
        ];
        for (key, value) in names {
            if value.is_empty() {
                return Err(ConfigError::Invalid(format!("interface name {key} is empty")));
            }
        }

        if self.proxies.is_empty() {
            return Err(ConfigError::Invalid("no proxy targets configured".to_string()));
        }
        for target in &self.proxies {
            if target.label.is_empty() || target.class.is_empty() || target.path.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "proxy target {:?} needs a label, class and path",
                    target
                )));
            }
        }
        let mut labels: Vec<&str> = self.proxies.iter().map(|t| t.label.as_str()).collect();
        labels.sort_unstable();
        if let Some(pair) = labels.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(ConfigError::Invalid(format!("duplicate proxy label {}", pair[0])));
        }

        if self.events.search_path.is_empty() {
            return Err(ConfigError::Invalid("event search path cannot be empty".to_string()));
        }
        if self.events.max_host_events == 0 {
            return Err(ConfigError::Invalid("max_host_events must be positive".to_string()));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            )));
        }

        Ok(())
    }
}
