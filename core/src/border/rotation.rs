//! Periodic rotation of border visuals.

use chrono::{DateTime, Duration, Utc};
use zonekeeper_types::BorderConfig;

/// Decides when the next automatic rotation is due.
///
/// The first tick only schedules; rotation never fires at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationClock {
    enabled: bool,
    interval: Duration,
    next_rotation_at: Option<DateTime<Utc>>,
}

impl RotationClock {
    pub fn from_config(config: &BorderConfig) -> Self {
        Self {
            enabled: config.auto_rotate,
            interval: interval_of(config),
            next_rotation_at: None,
        }
    }

    /// Pick up new settings. A pending schedule is kept unless rotation was
    /// switched off.
    pub fn apply_config(&mut self, config: &BorderConfig) {
        self.enabled = config.auto_rotate;
        self.interval = interval_of(config);
        if !self.enabled {
            self.next_rotation_at = None;
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn next_rotation_at(&self) -> Option<DateTime<Utc>> {
        self.next_rotation_at
    }

    /// Returns true when a rotation is due at `now` and schedules the next.
    pub fn tick(&mut self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }
        match self.next_rotation_at {
            None => {
                self.next_rotation_at = Some(deadline(now, self.interval));
                false
            }
            Some(next) if now < next => false,
            Some(_) => {
                self.next_rotation_at = Some(deadline(now, self.interval));
                true
            }
        }
    }

    /// Push the next automatic rotation one interval past a manual one.
    pub fn reschedule(&mut self, now: DateTime<Utc>) {
        self.next_rotation_at = Some(deadline(now, self.interval));
    }
}

fn interval_of(config: &BorderConfig) -> Duration {
    Duration::minutes(config.effective_rotate_interval_minutes() as i64)
}

/// `now + delay`, saturating at the latest representable instant.
pub(crate) fn deadline(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Case-insensitive FNV-1a hash of a zone id, stable across restarts.
/// Blank ids hash to zero.
pub fn zone_seed(zone_id: &str) -> i32 {
    let zone_id = zone_id.trim();
    if zone_id.is_empty() {
        return 0;
    }
    let mut hash: u32 = 2_166_136_261;
    for ch in zone_id.chars().flat_map(char::to_lowercase) {
        hash ^= ch as u32;
        hash = hash.wrapping_mul(16_777_619);
    }
    hash as i32
}

/// Variant a zone shows at `rotation_offset`, or `None` with no variants.
pub fn variant_index(seed: i32, rotation_offset: u64, variants: usize) -> Option<usize> {
    if variants == 0 {
        return None;
    }
    let shifted = i128::from(seed) + i128::from(rotation_offset);
    Some(shifted.rem_euclid(variants as i128) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::at_secs;

    fn clock(minutes: u64) -> RotationClock {
        RotationClock::from_config(&BorderConfig {
            auto_rotate: true,
            auto_rotate_interval_minutes: minutes,
            ..Default::default()
        })
    }

    #[test]
    fn test_first_tick_only_schedules() {
        let mut clock = clock(5);
        assert!(!clock.tick(at_secs(0.0)));
        assert_eq!(clock.next_rotation_at(), Some(at_secs(300.0)));
        assert!(!clock.tick(at_secs(299.0)));
        assert!(clock.tick(at_secs(300.0)));
        assert!(!clock.tick(at_secs(301.0)));
        assert!(clock.tick(at_secs(600.0)));
    }

    #[test]
    fn test_interval_clamped_to_one_minute() {
        let mut clock = clock(0);
        clock.tick(at_secs(0.0));
        assert!(clock.tick(at_secs(60.0)));
    }

    #[test]
    fn test_disabled_clock_never_fires() {
        let mut clock = clock(1);
        clock.apply_config(&BorderConfig {
            auto_rotate: false,
            ..Default::default()
        });
        for t in 0..10 {
            assert!(!clock.tick(at_secs(t as f64 * 120.0)));
        }
    }

    #[test]
    fn test_zone_seed_ignores_case() {
        assert_eq!(zone_seed("Arena1"), zone_seed("arena1"));
        assert_ne!(zone_seed("arena1"), zone_seed("arena2"));
        assert_eq!(zone_seed("  "), 0);
    }

    #[test]
    fn test_variant_index_wraps_negative_seeds() {
        assert_eq!(variant_index(-1, 0, 4), Some(3));
        assert_eq!(variant_index(-1, 1, 4), Some(0));
        assert_eq!(variant_index(i32::MIN, u64::MAX, 7).map(|i| i < 7), Some(true));
        assert_eq!(variant_index(5, 0, 0), None);
    }

    #[test]
    fn test_rotation_cycles_through_variants() {
        let seed = zone_seed("arena1");
        let picks: Vec<usize> = (0..3).filter_map(|offset| variant_index(seed, offset, 3)).collect();
        let mut sorted = picks.clone();
        sorted.sort();
        assert_eq!(sorted, vec![0, 1, 2]);
    }
}
