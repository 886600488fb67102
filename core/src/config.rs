//! Loading, saving and hot-swapping `zonekeeper.toml`.
//!
//! A failed load never replaces a working configuration: [`ConfigStore`]
//! keeps serving the previous snapshot and the caller logs the error.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;

use thiserror::Error;
use zonekeeper_types::{MIN_CONFIRM_SECS, ZoneKeeperConfig};

use crate::lifecycle::{Direction, LifecycleAction};

pub const CONFIG_FILE_NAME: &str = "zonekeeper.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Serialize error for {path:?}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: toml::ser::Error,
    },
}

/// Load a config file. Missing sections and keys take their defaults.
pub fn load_config(path: &Path) -> Result<ZoneKeeperConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config: ZoneKeeperConfig = toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;

    for warning in config_warnings(&config) {
        tracing::warn!(path = %path.display(), "{}", warning);
    }
    Ok(config)
}

/// Write a config file, creating parent directories as needed.
pub fn save_config(path: &Path, config: &ZoneKeeperConfig) -> Result<(), ConfigError> {
    let contents = toml::to_string_pretty(config).map_err(|e| ConfigError::Serialize {
        path: path.to_path_buf(),
        source: e,
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    fs::write(path, contents).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// `<config dir>/zonekeeper/zonekeeper.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("zonekeeper").join(CONFIG_FILE_NAME))
}

/// Values that will be clamped or ignored when the config is applied.
pub fn config_warnings(config: &ZoneKeeperConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    let detection = &config.detection;

    for (name, value) in [
        ("detection.enter_confirm_secs", detection.enter_confirm_secs),
        ("detection.exit_confirm_secs", detection.exit_confirm_secs),
    ] {
        if !value.is_finite() || value < MIN_CONFIRM_SECS {
            warnings.push(format!("{} = {} is below the {}s minimum and will be clamped", name, value, MIN_CONFIRM_SECS));
        }
    }
    if !detection.transition_cooldown_secs.is_finite() || detection.transition_cooldown_secs < 0.0 {
        warnings.push(format!(
            "detection.transition_cooldown_secs = {} is invalid and will be clamped",
            detection.transition_cooldown_secs
        ));
    }

    if config.registry.max_entities_per_zone == 0 {
        warnings.push("registry.max_entities_per_zone = 0 will be raised to 1".to_string());
    }
    if config.registry.max_entities_per_category == 0 {
        warnings.push("registry.max_entities_per_category = 0 will be raised to 1".to_string());
    }

    let border = &config.border;
    for (name, value, effective) in [
        (
            "border.rebuild_request_cooldown_secs",
            border.rebuild_request_cooldown_secs,
            border.effective_rebuild_cooldown_secs(),
        ),
        (
            "border.auto_rotate_interval_minutes",
            border.auto_rotate_interval_minutes,
            border.effective_rotate_interval_minutes(),
        ),
        (
            "border.readiness_log_interval_secs",
            border.readiness_log_interval_secs,
            border.effective_readiness_log_interval_secs(),
        ),
        (
            "detection.check_interval_ms",
            detection.check_interval_ms,
            detection.effective_check_interval_ms(),
        ),
    ] {
        if value != effective {
            let direction = if effective > value { "raised" } else { "lowered" };
            warnings.push(format!("{} = {} will be {} to {}", name, value, direction, effective));
        }
    }

    for (zone, mapping) in &config.lifecycle.mappings {
        for (direction, tokens) in [(Direction::Enter, &mapping.on_enter), (Direction::Exit, &mapping.on_exit)] {
            for token in tokens {
                if let Some(LifecycleAction::Unknown(name)) = LifecycleAction::parse(token, direction) {
                    warnings.push(format!(
                        "lifecycle.mappings.\"{}\": unknown {} action '{}' will be skipped",
                        zone, direction, name
                    ));
                }
            }
        }
    }

    warnings
}

/// Shared, atomically swapped configuration snapshot.
///
/// Readers clone the `Arc` and keep a consistent view for as long as they
/// hold it; a reload never mutates a snapshot in place.
#[derive(Debug)]
pub struct ConfigStore {
    current: RwLock<Arc<ZoneKeeperConfig>>,
    last_modified: RwLock<Option<SystemTime>>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(ZoneKeeperConfig::default())
    }
}

impl ConfigStore {
    pub fn new(config: ZoneKeeperConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
            last_modified: RwLock::new(None),
        }
    }

    /// Load `path` if it exists, else start from defaults. Never fails.
    pub fn load_or_default(path: &Path) -> Self {
        let store = Self::default();
        if path.exists()
            && let Err(e) = store.reload_from(path)
        {
            tracing::warn!(error = %e, "Failed to load config, using defaults");
        }
        store
    }

    pub fn current(&self) -> Arc<ZoneKeeperConfig> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replace the snapshot. Returns the previous one.
    pub fn swap(&self, config: ZoneKeeperConfig) -> Arc<ZoneKeeperConfig> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(config))
    }

    /// Load `path` and swap it in. Returns `Ok(false)` when the file parsed
    /// to the config already in use. On error the current snapshot stays.
    pub fn reload_from(&self, path: &Path) -> Result<bool, ConfigError> {
        let config = load_config(path)?;
        self.remember_mtime(path);

        if *self.current() == config {
            return Ok(false);
        }
        self.swap(config);
        tracing::info!(path = %path.display(), "Configuration reloaded");
        Ok(true)
    }

    /// Reload only if the file's modification time changed since the last
    /// successful load.
    pub fn reload_if_modified(&self, path: &Path) -> Result<bool, ConfigError> {
        let modified = fs::metadata(path)
            .and_then(|m| m.modified())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        let seen = *self.last_modified.read().unwrap_or_else(PoisonError::into_inner);
        if seen == Some(modified) {
            return Ok(false);
        }
        self.reload_from(path)
    }

    fn remember_mtime(&self, path: &Path) {
        let modified = fs::metadata(path).and_then(|m| m.modified()).ok();
        *self.last_modified.write().unwrap_or_else(PoisonError::into_inner) = modified;
    }
}
