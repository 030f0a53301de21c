// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Application configuration management.
//!
//! Configuration is stored as TOML through `confy`, either at the platform
//! default location or at an explicit path. Every field has a default so a
//! partial file loads. Filter pattern edits made at runtime are written back
//! to the same file.

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zone_tracker::{
    CallsignFilter, FilterError, GeoPoint, PollConfig, TrackerConfig, WatchConfig, Zone, ZoneError,
    ZoneRegistry,
};

const APP_NAME: &str = "airspace-watch";
const CONFIG_NAME: &str = "config";

/// Environment variable that overrides the configured webhook URL.
pub const WEBHOOK_URL_ENV: &str = "AIRSPACE_WATCH_WEBHOOK_URL";

/// Default upstream feed (GeoFS multiplayer map)
pub const DEFAULT_UPSTREAM_URL: &str = "https://mps.geo-fs.com/map";

/// Configuration problems that must stop the process before polling starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field} URL '{value}': {reason}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("no zones configured")]
    NoZones,

    #[error(transparent)]
    Zone(#[from] ZoneError),

    #[error(transparent)]
    Filter(#[from] FilterError),
}

/// Application configuration stored in TOML format
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    /// Configuration schema version for migrations
    #[serde(default = "default_config_version")]
    pub config_version: u32,

    /// Upstream live-position feed URL
    #[serde(default = "default_upstream_url")]
    pub upstream_url: String,

    /// Upper bound for one upstream fetch, seconds
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Sleep between poll cycles, seconds
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Longest delay between attempts while the feed keeps failing, seconds
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,

    /// Aircraft unseen for longer than this are hidden from the aircraft list
    #[serde(default = "default_stale_secs")]
    pub display_stale_secs: u64,

    /// Aircraft unseen for longer than this lose their zone state
    #[serde(default = "default_stale_secs")]
    pub tracking_stale_secs: u64,

    /// Discord-compatible webhook receiving zone alerts (env var takes precedence)
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Role id mentioned in entry alerts
    #[serde(default)]
    pub mention_role: Option<String>,

    /// Upper bound for one webhook delivery, seconds
    #[serde(default = "default_notify_timeout_secs")]
    pub notify_timeout_secs: u64,

    /// Alerts waiting beyond this many are dropped
    #[serde(default = "default_notify_queue_capacity")]
    pub notify_queue_capacity: usize,

    /// Address of the query API
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Optional JSON object mapping aircraft type ids to names
    #[serde(default)]
    pub ac_map_url: Option<String>,

    /// Callsign substrings to track (empty tracks everything)
    #[serde(default = "default_patterns")]
    pub patterns: Vec<String>,

    /// Callsigns that are never tracked (exact, case-insensitive)
    #[serde(default = "default_excluded_callsigns")]
    pub excluded_callsigns: Vec<String>,

    /// Watched airspaces
    #[serde(default = "default_zones")]
    pub zones: Vec<Zone>,
}

// Default value functions for serde
fn default_config_version() -> u32 {
    1
}

fn default_upstream_url() -> String {
    DEFAULT_UPSTREAM_URL.to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    3
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_max_backoff_secs() -> u64 {
    30
}

fn default_stale_secs() -> u64 {
    15
}

fn default_notify_timeout_secs() -> u64 {
    5
}

fn default_notify_queue_capacity() -> usize {
    64
}

fn default_listen_address() -> String {
    "127.0.0.1:5000".to_string()
}

fn default_excluded_callsigns() -> Vec<String> {
    vec!["randomassguy[u]".to_string()]
}

fn default_patterns() -> Vec<String> {
    const TAGS: [&str; 19] = [
        "U", "UTP", "P", "PMC", "SHL", "NFS", "RPAF", "RNLAF", "RNZAF", "USAF", "RAAF", "TuAF",
        "TASC", "UAC", "UAEAF", "USSR", "BAF", "PAF", "RAF",
    ];
    TAGS.iter()
        .map(|t| format!("[{t}]"))
        .chain(TAGS.iter().map(|t| format!("({t})")))
        .collect()
}

fn zone(name: &str, coords: &[(f64, f64)]) -> Zone {
    Zone::new(
        name,
        coords.iter().map(|&(lat, lon)| GeoPoint::new(lat, lon)).collect(),
    )
}

fn default_zones() -> Vec<Zone> {
    vec![
        zone(
            "Mainland",
            &[
                (25.0, 61.5),
                (27.5, 62.8),
                (29.7, 60.8),
                (32.66, 68.86),
                (36.88, 72.22),
                (35.5, 80.0),
                (31.8, 79.0),
                (30.33, 80.97),
                (28.95, 80.0),
                (26.5, 88.0),
                (27.96, 88.0),
                (29.4, 97.5),
                (20.86, 92.4),
                (21.7, 88.84),
                (7.5, 78.4),
                (7.67, 76.2),
                (21.0, 68.5),
            ],
        ),
        zone(
            "Islands",
            &[
                (13.55, 92.83),
                (13.59, 93.13),
                (10.6, 92.6),
                (6.84, 94.0),
                (6.73, 93.69),
                (10.65, 92.27),
            ],
        ),
        zone(
            "Africa",
            &[
                (10.57, 22.4),
                (10.51, 34.1),
                (14.7, 37.9),
                (13.98, 40.86),
                (12.47, 42.35),
                (11.0, 41.75),
                (7.8, 47.34),
                (5.0, 44.76),
                (3.84, 38.0),
                (3.0, 16.0),
                (7.68, 15.5),
            ],
        ),
    ]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            upstream_url: default_upstream_url(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            display_stale_secs: default_stale_secs(),
            tracking_stale_secs: default_stale_secs(),
            webhook_url: None,
            mention_role: None,
            notify_timeout_secs: default_notify_timeout_secs(),
            notify_queue_capacity: default_notify_queue_capacity(),
            listen_address: default_listen_address(),
            ac_map_url: None,
            patterns: default_patterns(),
            excluded_callsigns: default_excluded_callsigns(),
            zones: default_zones(),
        }
    }
}

fn check_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
        reason,
    };
    let url = Url::parse(value).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!("unsupported scheme '{other}'"))),
    }
}

impl AppConfig {
    /// Check everything that would otherwise fail later at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("upstream", &self.upstream_url)?;
        if let Some(url) = self.resolved_webhook_url() {
            check_url("webhook", &url)?;
        }
        if let Some(url) = &self.ac_map_url {
            check_url("aircraft map", url)?;
        }

        for (name, value) in [
            ("poll_interval_secs", self.poll_interval_secs),
            ("fetch_timeout_secs", self.fetch_timeout_secs),
            ("notify_timeout_secs", self.notify_timeout_secs),
            ("display_stale_secs", self.display_stale_secs),
            ("tracking_stale_secs", self.tracking_stale_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero(name));
            }
        }
        if self.notify_queue_capacity == 0 {
            return Err(ConfigError::Zero("notify_queue_capacity"));
        }

        if self.zones.is_empty() {
            return Err(ConfigError::NoZones);
        }
        self.zone_registry()?;
        self.callsign_filter()?;
        Ok(())
    }

    pub fn zone_registry(&self) -> Result<ZoneRegistry, ZoneError> {
        ZoneRegistry::new(self.zones.clone())
    }

    pub fn callsign_filter(&self) -> Result<CallsignFilter, FilterError> {
        CallsignFilter::new(self.patterns.clone(), self.excluded_callsigns.clone())
    }

    /// Webhook URL, preferring the environment variable over the file.
    #[must_use]
    pub fn resolved_webhook_url(&self) -> Option<String> {
        if let Ok(url) = std::env::var(WEBHOOK_URL_ENV) {
            if !url.trim().is_empty() {
                return Some(url.trim().to_string());
            }
        }
        self.webhook_url.clone().filter(|u| !u.trim().is_empty())
    }

    /// Role mention text appended to entry alerts.
    #[must_use]
    pub fn mention(&self) -> Option<String> {
        self.mention_role
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(|r| format!("<@&{r}>"))
    }

    #[must_use]
    pub fn display_window(&self) -> Duration {
        Duration::from_secs(self.display_stale_secs)
    }

    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    #[must_use]
    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs)
    }

    #[must_use]
    pub fn watch_config(&self) -> WatchConfig {
        WatchConfig {
            poll: PollConfig {
                interval: Duration::from_secs(self.poll_interval_secs),
                fetch_timeout: self.fetch_timeout(),
                max_backoff: Duration::from_secs(self.max_backoff_secs),
                mention: self.mention(),
            },
            tracker: TrackerConfig {
                stale_after: Duration::from_secs(self.tracking_stale_secs),
                ..Default::default()
            },
            notify_capacity: self.notify_queue_capacity,
            notify_timeout: self.notify_timeout(),
        }
    }
}

/// Where the configuration came from, and where edits are written.
#[derive(Debug, Clone)]
enum ConfigLocation {
    Default,
    Path(PathBuf),
    Memory,
}

/// Loaded configuration plus the means to persist runtime edits.
#[derive(Debug)]
pub struct ConfigStore {
    location: ConfigLocation,
    config: Mutex<AppConfig>,
}

impl ConfigStore {
    /// Load from `path`, or from the platform default location. A missing
    /// file is created with defaults.
    pub fn load(path: Option<PathBuf>) -> Result<Self, confy::ConfyError> {
        let (location, config) = match path {
            Some(path) => {
                let config: AppConfig = confy::load_path(&path)?;
                (ConfigLocation::Path(path), config)
            }
            None => {
                let config: AppConfig = confy::load(APP_NAME, CONFIG_NAME)?;
                (ConfigLocation::Default, config)
            }
        };
        Ok(Self {
            location,
            config: Mutex::new(config),
        })
    }

    /// Store that never touches the filesystem.
    #[must_use]
    pub fn in_memory(config: AppConfig) -> Self {
        Self {
            location: ConfigLocation::Memory,
            config: Mutex::new(config),
        }
    }

    /// Copy of the configuration as loaded (without command-line overrides).
    #[must_use]
    pub fn config(&self) -> AppConfig {
        self.config.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Get the config file path for display to user
    pub fn path(&self) -> Result<Option<PathBuf>, confy::ConfyError> {
        match &self.location {
            ConfigLocation::Default => confy::get_configuration_file_path(APP_NAME, CONFIG_NAME).map(Some),
            ConfigLocation::Path(path) => Ok(Some(path.clone())),
            ConfigLocation::Memory => Ok(None),
        }
    }

    /// Replace the stored filter patterns and save to disk.
    pub fn save_patterns(&self, patterns: &[String]) -> Result<(), confy::ConfyError> {
        let mut config = self.config.lock().unwrap_or_else(PoisonError::into_inner);
        config.patterns = patterns.to_vec();
        match &self.location {
            ConfigLocation::Default => confy::store(APP_NAME, CONFIG_NAME, &*config),
            ConfigLocation::Path(path) => confy::store_path(path, &*config),
            ConfigLocation::Memory => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.zone_registry().unwrap().len(), 3);
        let filter = config.callsign_filter().unwrap();
        assert!(filter.allows("Maverick[USAF]"));
        assert!(filter.allows("maverick(raf)"));
        assert!(!filter.allows("Cessna123"));
        assert!(!filter.allows("RandomAssGuy[U]"));
    }

    #[test]
    fn test_default_patterns_skip_home_forces() {
        let filter = AppConfig::default().callsign_filter().unwrap();
        assert!(!filter.allows("Pilot[IAF]"));
        assert!(!filter.allows("Ship[IN]"));
        assert!(!filter.allows("Boat(ICG)"));
        assert!(filter.allows("Eagle[tuaf]"));
        assert!(filter.allows("Viper(PAF)"));
        assert_eq!(AppConfig::default().patterns.len(), 38);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: AppConfig = serde_json::from_str(r#"{"poll_interval_secs": 5, "patterns": []}"#).unwrap();
        assert_eq!(config.poll_interval_secs, 5);
        assert!(config.patterns.is_empty());
        assert_eq!(config.upstream_url, DEFAULT_UPSTREAM_URL);
        assert_eq!(config.zones.len(), 3);
        assert!(config.callsign_filter().unwrap().allows("anyone"));
    }

    #[test]
    fn test_rejects_invalid_zone() {
        let mut config = AppConfig::default();
        config.zones.push(Zone::new("Broken", vec![GeoPoint::new(0.0, 0.0)]));
        assert!(matches!(config.validate(), Err(ConfigError::Zone(_))));
    }

    #[test]
    fn test_rejects_blank_pattern() {
        let config = AppConfig {
            patterns: vec!["[IAF]".to_string(), "  ".to_string()],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Filter(_))));
    }

    #[test]
    fn test_rejects_zero_interval_and_bad_url() {
        let config = AppConfig {
            poll_interval_secs: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Zero("poll_interval_secs"))));

        let config = AppConfig {
            upstream_url: "ftp://example.com/map".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidUrl { .. })));

        let config = AppConfig {
            zones: vec![],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::NoZones)));
    }

    #[test]
    fn test_mention_and_watch_config() {
        let config = AppConfig {
            mention_role: Some(" 1203013719752446042 ".to_string()),
            tracking_stale_secs: 60,
            ..Default::default()
        };
        let watch = config.watch_config();
        assert_eq!(watch.poll.mention.as_deref(), Some("<@&1203013719752446042>"));
        assert_eq!(watch.tracker.stale_after, Duration::from_secs(60));
        assert_eq!(watch.poll.interval, Duration::from_secs(2));
    }

    #[test]
    fn test_in_memory_store_saves_patterns() {
        let store = ConfigStore::in_memory(AppConfig::default());
        store.save_patterns(&["[IAF]".to_string()]).unwrap();
        assert_eq!(store.config().patterns, ["[IAF]"]);
        assert!(store.path().unwrap().is_none());
    }
}
