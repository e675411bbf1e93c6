//! Config entries: one configured instance of the integration and its
//! validated options.
//!
//! [`EntryOptions`] can only be built through [`EntryOptions::new`], so an
//! out-of-range scan interval never reaches a coordinator.

use std::time::Duration;

use inforoute_middleware::DEFAULT_API_URL;
use inforoute_types::SetupError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DOMAIN: &str = "inforoute65";
pub const DEFAULT_NAME: &str = "Inforoute 65";

/// Default refresh interval, in minutes.
pub const DEFAULT_SCAN_INTERVAL: u32 = 10;
/// Smallest accepted refresh interval, in minutes.
pub const MIN_SCAN_INTERVAL: u32 = 10;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("scan_interval must be at least {minimum} minutes, got {minutes}")]
    ScanIntervalTooShort { minutes: u32, minimum: u32 },

    #[error("entry id must not be empty")]
    EmptyEntryId,
}

impl From<ConfigError> for SetupError {
    fn from(e: ConfigError) -> Self {
        SetupError::InvalidOptions(e.to_string())
    }
}

/// Which projections are created per road item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityLayout {
    /// Circulation, Location and Diagnostics sensors.
    #[default]
    Specialized,
    /// One section sensor holding everything.
    Combined,
}

/// User options of a config entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryOptions {
    scan_interval: u32,
}

impl EntryOptions {
    /// Validate `scan_interval` (minutes).
    ///
    /// # Errors
    ///
    /// [`ConfigError::ScanIntervalTooShort`] below [`MIN_SCAN_INTERVAL`].
    pub fn new(scan_interval: u32) -> Result<Self, ConfigError> {
        if scan_interval < MIN_SCAN_INTERVAL {
            return Err(ConfigError::ScanIntervalTooShort {
                minutes: scan_interval,
                minimum: MIN_SCAN_INTERVAL,
            });
        }
        Ok(Self { scan_interval })
    }

    pub fn scan_interval(&self) -> u32 {
        self.scan_interval
    }

    /// Scan interval as a timer period.
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.scan_interval) * 60)
    }
}

impl Default for EntryOptions {
    fn default() -> Self {
        Self {
            scan_interval: DEFAULT_SCAN_INTERVAL,
        }
    }
}

/// One configured instance of the integration.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigEntry {
    pub entry_id: String,
    pub title: String,
    pub options: EntryOptions,
    pub layout: EntityLayout,
    pub api_url: String,
}

impl ConfigEntry {
    /// Entry with the default title, layout and feed URL.
    pub fn new(entry_id: impl Into<String>, options: EntryOptions) -> Result<Self, ConfigError> {
        let entry_id = entry_id.into();
        if entry_id.trim().is_empty() {
            return Err(ConfigError::EmptyEntryId);
        }
        Ok(Self {
            entry_id,
            title: DEFAULT_NAME.to_string(),
            options,
            layout: EntityLayout::default(),
            api_url: DEFAULT_API_URL.to_string(),
        })
    }

    pub fn with_layout(mut self, layout: EntityLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_interval_below_minimum_is_rejected() {
        assert_eq!(
            EntryOptions::new(9),
            Err(ConfigError::ScanIntervalTooShort {
                minutes: 9,
                minimum: 10
            })
        );
        assert!(EntryOptions::new(0).is_err());
        assert_eq!(EntryOptions::new(10).unwrap().scan_interval(), 10);
        assert_eq!(EntryOptions::new(45).unwrap().scan_interval(), 45);
    }

    #[test]
    fn default_options_refresh_every_ten_minutes() {
        let options = EntryOptions::default();
        assert_eq!(options.scan_interval(), DEFAULT_SCAN_INTERVAL);
        assert_eq!(options.update_interval(), Duration::from_secs(600));
    }

    #[test]
    fn entry_defaults() {
        let entry = ConfigEntry::new("abc", EntryOptions::default()).unwrap();
        assert_eq!(entry.title, "Inforoute 65");
        assert_eq!(entry.layout, EntityLayout::Specialized);
        assert_eq!(entry.api_url, DEFAULT_API_URL);

        let entry = entry
            .with_layout(EntityLayout::Combined)
            .with_api_url("http://127.0.0.1:1/feed");
        assert_eq!(entry.layout, EntityLayout::Combined);
        assert_eq!(entry.api_url, "http://127.0.0.1:1/feed");
    }

    #[test]
    fn blank_entry_id_is_rejected() {
        assert_eq!(
            ConfigEntry::new("  ", EntryOptions::default()),
            Err(ConfigError::EmptyEntryId)
        );
    }

    #[test]
    fn option_errors_surface_as_setup_errors() {
        let err = SetupError::from(EntryOptions::new(5).unwrap_err());
        match err {
            SetupError::InvalidOptions(message) => {
                assert!(message.contains("at least 10 minutes, got 5"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn layout_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&EntityLayout::Combined).unwrap(),
            "\"combined\""
        );
        let layout: EntityLayout = serde_json::from_str("\"specialized\"").unwrap();
        assert_eq!(layout, EntityLayout::Specialized);
    }
}
