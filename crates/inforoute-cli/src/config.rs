//! Configuration file – reads/writes `~/.inforoute65/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use inforoute_integration::{ConfigEntry, DEFAULT_SCAN_INTERVAL, EntityLayout, EntryOptions};
use inforoute_middleware::DEFAULT_API_URL;
use inforoute_types::SetupError;

/// Persisted options of the single config entry driven by the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Refresh interval in minutes (at least 10).
    #[serde(default = "default_scan_interval")]
    pub scan_interval: u32,

    /// `specialized` (three sensors per road) or `combined`.
    #[serde(default)]
    pub layout: EntityLayout,

    /// Feed URL.  Only change this to point at a mirror.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Stable id of the config entry.  Generated and written back the first
    /// time a file without one is loaded.
    #[serde(default)]
    pub entry_id: String,
}

fn default_scan_interval() -> u32 {
    DEFAULT_SCAN_INTERVAL
}
fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}
fn new_entry_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scan_interval: default_scan_interval(),
            layout: EntityLayout::default(),
            api_url: default_api_url(),
            entry_id: new_entry_id(),
        }
    }
}

impl Config {
    /// Give the config an entry id if it has none.  Returns `true` when one
    /// was generated, i.e. when the config must be saved to keep it.
    pub fn ensure_entry_id(&mut self) -> bool {
        if !self.entry_id.trim().is_empty() {
            return false;
        }
        self.entry_id = new_entry_id();
        true
    }

    /// Validate the options and build the config entry they describe.
    ///
    /// # Errors
    ///
    /// [`SetupError::InvalidOptions`] when the file holds options the entry
    /// would reject.
    pub fn entry(&self) -> Result<ConfigEntry, SetupError> {
        let options = EntryOptions::new(self.scan_interval)?;
        Ok(ConfigEntry::new(self.entry_id.clone(), options)?
            .with_layout(self.layout)
            .with_api_url(self.api_url.clone()))
    }
}

/// Return the path to `~/.inforoute65/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".inforoute65").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Turn a resolved config (loaded, from the wizard or the defaults) into the
/// one the entry runs with.
///
/// A generated entry id is saved first so the entry keeps it across starts.
/// Then the `INFOROUTE_*` environment overrides are applied; they are never
/// written to disk.
///
/// | Variable | Config field |
/// |---|---|
/// | `INFOROUTE_SCAN_INTERVAL` | `scan_interval` |
/// | `INFOROUTE_API_URL` | `api_url` |
pub fn finalize(cfg: &mut Config) -> Result<(), String> {
    finalize_at(cfg, &config_path(), |key| std::env::var(key).ok())
}

pub(crate) fn finalize_at(
    cfg: &mut Config,
    path: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), String> {
    let saved = if cfg.ensure_entry_id() {
        save_to(cfg, path)
    } else {
        Ok(())
    };
    apply_overrides(cfg, lookup);
    saved
}

fn apply_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("INFOROUTE_SCAN_INTERVAL")
        && let Ok(minutes) = v.trim().parse::<u32>()
    {
        cfg.scan_interval = minutes;
    }
    if let Some(v) = lookup("INFOROUTE_API_URL")
        && !v.trim().is_empty()
    {
        cfg.api_url = v;
    }
}

/// Save the config to disk, creating `~/.inforoute65/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
