//! Positions, the zone resolver seam, and remembered return positions.
//!
//! Zone geometry itself (circles, rectangles) belongs to the host; the core
//! only asks "which zone is this point in" through [`ZoneResolver`].

use std::collections::VecDeque;
use std::hash::Hash;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// Default ceiling for remembered return positions.
pub const MAX_RETURN_POSITIONS: usize = 1000;

/// Positions with both |x| and |z| under this are treated as "unset".
const NEAR_ORIGIN_EPSILON: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// True when the point sits on the world origin column, which the host
    /// reports for entities whose transform is not readable yet.
    pub fn is_near_origin_xz(&self) -> bool {
        self.x.abs() < NEAR_ORIGIN_EPSILON && self.z.abs() < NEAR_ORIGIN_EPSILON
    }
}

impl From<[f32; 3]> for Position {
    fn from([x, y, z]: [f32; 3]) -> Self {
        Self { x, y, z }
    }
}

/// Maps a world position to the id of the zone containing it.
///
/// Must be pure and cheap: it is called once per actor per tick.
pub trait ZoneResolver {
    fn resolve_zone_at(&self, position: Position) -> Option<String>;
}

impl<F> ZoneResolver for F
where
    F: Fn(Position) -> Option<String>,
{
    fn resolve_zone_at(&self, position: Position) -> Option<String> {
        self(position)
    }
}

/// Where each actor stood before an enter teleport, so the exit can send
/// them back. Bounded; the oldest capture is evicted first.
#[derive(Debug, Clone)]
pub struct ReturnPositionStore<K: Eq + Hash + Clone> {
    positions: HashMap<K, Position>,
    order: VecDeque<K>,
    capacity: usize,
}

impl<K: Eq + Hash + Clone> Default for ReturnPositionStore<K> {
    fn default() -> Self {
        Self::with_capacity(MAX_RETURN_POSITIONS)
    }
}

impl<K: Eq + Hash + Clone> ReturnPositionStore<K> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            positions: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Remember `position` for `key` unless one is already stored.
    /// Returns true if a new position was captured.
    pub fn capture(&mut self, key: K, position: Position) -> bool {
        if self.positions.contains_key(&key) || position.is_near_origin_xz() {
            return false;
        }

        while self.positions.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.positions.remove(&oldest);
        }

        self.order.push_back(key.clone());
        self.positions.insert(key, position);
        true
    }

    pub fn get(&self, key: &K) -> Option<Position> {
        self.positions.get(key).copied()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.positions.contains_key(key)
    }

    /// Remove and return the stored position.
    pub fn take(&mut self, key: &K) -> Option<Position> {
        let position = self.positions.remove(key)?;
        self.order.retain(|k| k != key);
        Some(position)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_keeps_first_position() {
        let mut store = ReturnPositionStore::default();
        assert!(store.capture(1u64, Position::new(10.0, 0.0, 5.0)));
        assert!(!store.capture(1u64, Position::new(99.0, 0.0, 99.0)));
        assert_eq!(store.get(&1), Some(Position::new(10.0, 0.0, 5.0)));
    }

    #[test]
    fn test_capture_rejects_origin() {
        let mut store = ReturnPositionStore::default();
        assert!(!store.capture(1u64, Position::new(0.1, 50.0, -0.2)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_oldest_evicted_at_capacity() {
        let mut store = ReturnPositionStore::with_capacity(2);
        store.capture(1u64, Position::new(1.0, 0.0, 1.0));
        store.capture(2u64, Position::new(2.0, 0.0, 2.0));
        store.capture(3u64, Position::new(3.0, 0.0, 3.0));

        assert_eq!(store.len(), 2);
        assert!(!store.contains(&1));
        assert!(store.contains(&2));
        assert!(store.contains(&3));
    }

    #[test]
    fn test_take_removes() {
        let mut store = ReturnPositionStore::default();
        store.capture(1u64, Position::new(4.0, 0.0, 4.0));
        assert_eq!(store.take(&1), Some(Position::new(4.0, 0.0, 4.0)));
        assert_eq!(store.take(&1), None);
    }

    #[test]
    fn test_closure_resolver() {
        let resolver = |p: Position| (p.x > 0.0).then(|| "east".to_string());
        assert_eq!(resolver.resolve_zone_at(Position::new(1.0, 0.0, 0.0)).as_deref(), Some("east"));
        assert_eq!(resolver.resolve_zone_at(Position::new(-1.0, 0.0, 0.0)), None);
    }
}
