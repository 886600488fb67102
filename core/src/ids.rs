use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identity of a tracked actor (a connected player character).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub u64);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ActorId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Handle of a world object spawned as a zone side effect.
///
/// Mirrors the host's `index:version` entity addressing, so a recycled
/// index with a new version is a different handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityHandle {
    pub index: u32,
    pub version: u32,
}

impl EntityHandle {
    pub const fn new(index: u32, version: u32) -> Self {
        Self { index, version }
    }
}

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.index, self.version)
    }
}

/// Case-folded form used as the map key for zone ids and categories.
pub(crate) fn fold_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Normalize an optional zone id: blank ids mean "no zone".
pub(crate) fn normalize_zone(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

/// Case-insensitive zone comparison where blank equals absent.
pub(crate) fn same_zone(a: Option<&str>, b: Option<&str>) -> bool {
    match (normalize_zone(a), normalize_zone(b)) {
        (None, None) => true,
        (Some(a), Some(b)) => a.to_lowercase() == b.to_lowercase(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_zone_ignores_case_and_blank() {
        assert!(same_zone(Some("Arena1"), Some("arena1")));
        assert!(same_zone(None, Some("  ")));
        assert!(!same_zone(Some("arena1"), None));
        assert!(!same_zone(Some("arena1"), Some("arena2")));
    }

    #[test]
    fn test_handle_display() {
        assert_eq!(EntityHandle::new(12, 3).to_string(), "12:3");
        assert_eq!(ActorId(7).to_string(), "7");
    }
}
