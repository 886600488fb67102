//! Shared configuration types for ZoneKeeper.
//!
//! Everything here is plain serde data so the core, the replay tool and the
//! config validator all agree on one file format.

pub mod formatting;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Smallest confirm window honored by the detector (seconds).
pub const MIN_CONFIRM_SECS: f64 = 0.05;
/// Smallest rebuild request cooldown (seconds).
pub const MIN_REBUILD_COOLDOWN_SECS: u64 = 1;
/// Largest rebuild request cooldown (seconds, one day).
pub const MAX_REBUILD_COOLDOWN_SECS: u64 = 86_400;
/// Smallest auto-rotate interval (minutes).
pub const MIN_ROTATE_INTERVAL_MINUTES: u64 = 1;
/// Largest auto-rotate interval (minutes, one week).
pub const MAX_ROTATE_INTERVAL_MINUTES: u64 = 10_080;
/// Largest gap between readiness log lines (seconds).
pub const MAX_READINESS_LOG_INTERVAL_SECS: u64 = 3_600;
/// Largest gap between detection passes (milliseconds).
pub const MAX_CHECK_INTERVAL_MS: u64 = 60_000;
/// Key used for the catch-all lifecycle mapping.
pub const WILDCARD_ZONE: &str = "*";

/// Root of the `zonekeeper.toml` file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneKeeperConfig {
    pub detection: DetectionConfig,
    pub registry: RegistryConfig,
    pub border: BorderConfig,
    pub lifecycle: LifecycleConfig,
}

// ─────────────────────────────────────────────────────────────────────────────
// Detection
// ─────────────────────────────────────────────────────────────────────────────

/// Hysteresis and cooldown timings for zone transition detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Seconds an actor must stay in a candidate zone before the enter commits.
    pub enter_confirm_secs: f64,
    /// Seconds an actor must stay outside every zone before the exit commits.
    pub exit_confirm_secs: f64,
    /// Minimum seconds between two commits for the same actor.
    pub transition_cooldown_secs: f64,
    /// Minimum milliseconds between two detection passes.
    pub check_interval_ms: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            enter_confirm_secs: 0.35,
            exit_confirm_secs: 0.75,
            transition_cooldown_secs: 1.25,
            check_interval_ms: 100,
        }
    }
}

impl DetectionConfig {
    pub fn effective_enter_confirm_secs(&self) -> f64 {
        clamp_secs(self.enter_confirm_secs, MIN_CONFIRM_SECS, Self::default().enter_confirm_secs)
    }

    pub fn effective_exit_confirm_secs(&self) -> f64 {
        clamp_secs(self.exit_confirm_secs, MIN_CONFIRM_SECS, Self::default().exit_confirm_secs)
    }

    pub fn effective_check_interval_ms(&self) -> u64 {
        self.check_interval_ms.min(MAX_CHECK_INTERVAL_MS)
    }

    pub fn effective_transition_cooldown_secs(&self) -> f64 {
        clamp_secs(
            self.transition_cooldown_secs,
            0.0,
            Self::default().transition_cooldown_secs,
        )
    }
}

/// Clamp a seconds value to `min`, replacing non-finite input with `fallback`.
pub fn clamp_secs(value: f64, min: f64, fallback: f64) -> f64 {
    if !value.is_finite() {
        return fallback.max(min);
    }
    value.max(min)
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Capacity ceilings for entities spawned as zone side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub max_entities_per_zone: usize,
    pub max_entities_per_category: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_entities_per_zone: 1000,
            max_entities_per_category: 500,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Border rebuilds
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BorderConfig {
    /// Seconds after an accepted rebuild request during which further
    /// non-bypass requests are dropped.
    pub rebuild_request_cooldown_secs: u64,
    /// Rotate border visuals on a fixed interval.
    pub auto_rotate: bool,
    pub auto_rotate_interval_minutes: u64,
    /// Seconds between "still waiting for world" log lines.
    pub readiness_log_interval_secs: u64,
}

impl Default for BorderConfig {
    fn default() -> Self {
        Self {
            rebuild_request_cooldown_secs: 5,
            auto_rotate: true,
            auto_rotate_interval_minutes: 5,
            readiness_log_interval_secs: 10,
        }
    }
}

impl BorderConfig {
    pub fn effective_rebuild_cooldown_secs(&self) -> u64 {
        self.rebuild_request_cooldown_secs
            .clamp(MIN_REBUILD_COOLDOWN_SECS, MAX_REBUILD_COOLDOWN_SECS)
    }

    pub fn effective_rotate_interval_minutes(&self) -> u64 {
        self.auto_rotate_interval_minutes
            .clamp(MIN_ROTATE_INTERVAL_MINUTES, MAX_ROTATE_INTERVAL_MINUTES)
    }

    pub fn effective_readiness_log_interval_secs(&self) -> u64 {
        self.readiness_log_interval_secs.min(MAX_READINESS_LOG_INTERVAL_SECS)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Lifecycle
// ─────────────────────────────────────────────────────────────────────────────

/// Per-zone lifecycle action overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// When false, every zone runs the compiled-in default actions.
    pub enabled: bool,
    /// Zone id (or `"*"`) -> override.
    pub mappings: BTreeMap<String, ZoneMapping>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mappings: BTreeMap::new(),
        }
    }
}

impl LifecycleConfig {
    /// Mapping for a zone: exact key, then case-insensitive key, then wildcard.
    pub fn mapping_for(&self, zone_id: &str) -> Option<(&str, &ZoneMapping)> {
        let zone_id = zone_id.trim();
        if !zone_id.is_empty() {
            if let Some((key, mapping)) = self.mappings.get_key_value(zone_id) {
                return Some((key.as_str(), mapping));
            }
            if let Some((key, mapping)) = self
                .mappings
                .iter()
                .find(|(key, _)| key.trim().eq_ignore_ascii_case(zone_id))
            {
                return Some((key.as_str(), mapping));
            }
        }
        self.mappings
            .get_key_value(WILDCARD_ZONE)
            .map(|(key, mapping)| (key.as_str(), mapping))
    }
}

/// Action override for one zone. Tokens are free-form and normalized by the core.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneMapping {
    pub on_enter: Vec<String>,
    pub on_exit: Vec<String>,
    /// Prepend the global defaults before the override tokens.
    pub use_global_defaults: bool,
}
