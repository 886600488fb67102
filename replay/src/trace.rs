//! Recorded trace format.
//!
//! A trace is JSON lines, one frame per line:
//!
//! ```text
//! {"at_ms": 0, "world_ready": true, "actors": [{"id": 1, "zone": "arena"}]}
//! {"at_ms": 100, "actors": [{"id": 1, "pos": {"x": 12.0, "y": 0.0, "z": 4.0}}], "connect": [2]}
//! {"at_ms": 200, "actors": [], "rotate": true}
//! ```
//!
//! An actor listed without `zone` is resolved from `pos` against the zone
//! boxes; an actor missing from a frame is treated as disconnected.

use std::io::BufRead;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use zonekeeper_core::{ActorId, Position, ZoneResolver};

#[derive(Debug, Clone, Deserialize)]
pub struct Frame {
    pub at_ms: i64,
    #[serde(default)]
    pub actors: Vec<ActorFrame>,
    /// Actors whose connection completed at this frame.
    #[serde(default)]
    pub connect: Vec<u64>,
    /// Request a manual border rotation.
    #[serde(default)]
    pub rotate: bool,
    /// Host world state; sticky until a later frame changes it.
    #[serde(default)]
    pub world_ready: Option<bool>,
}

impl Frame {
    pub fn timestamp(&self) -> Result<DateTime<Utc>, String> {
        DateTime::from_timestamp_millis(self.at_ms)
            .ok_or_else(|| format!("timestamp out of range: {}", self.at_ms))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActorFrame {
    pub id: u64,
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub pos: Option<Position>,
}

impl ActorFrame {
    /// Explicit zone wins; otherwise the position is resolved.
    pub fn observe(&self, resolver: &impl ZoneResolver) -> (ActorId, Option<String>) {
        let zone = match (&self.zone, self.pos) {
            (Some(zone), _) => Some(zone.clone()),
            (None, Some(pos)) => resolver.resolve_zone_at(pos),
            (None, None) => None,
        };
        (ActorId(self.id), zone)
    }
}

/// Axis-aligned zone footprint on the XZ plane.
#[derive(Debug, Clone, Deserialize)]
pub struct ZoneBox {
    pub id: String,
    pub min_x: f32,
    pub min_z: f32,
    pub max_x: f32,
    pub max_z: f32,
    /// Enter-teleport destination; the box center when absent.
    #[serde(default)]
    pub spawn: Option<Position>,
}

impl ZoneBox {
    fn contains(&self, pos: Position) -> bool {
        pos.x >= self.min_x && pos.x <= self.max_x && pos.z >= self.min_z && pos.z <= self.max_z
    }

    pub fn spawn_point(&self) -> Position {
        self.spawn.unwrap_or(Position::new(
            (self.min_x + self.max_x) / 2.0,
            0.0,
            (self.min_z + self.max_z) / 2.0,
        ))
    }
}

/// First matching box wins, in file order.
#[derive(Debug, Clone, Default)]
pub struct BoxResolver {
    pub zones: Vec<ZoneBox>,
}

impl ZoneResolver for BoxResolver {
    fn resolve_zone_at(&self, position: Position) -> Option<String> {
        self.zones
            .iter()
            .find(|b| b.contains(position))
            .map(|b| b.id.clone())
    }
}

/// Parse frames, skipping blank lines and `#` comments.
pub fn read_frames(reader: impl BufRead) -> Result<Vec<Frame>, String> {
    let mut frames = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| format!("line {}: {}", index + 1, e))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let frame: Frame =
            serde_json::from_str(trimmed).map_err(|e| format!("line {}: {}", index + 1, e))?;
        if let Some(prev) = frames.last().map(|f: &Frame| f.at_ms)
            && frame.at_ms < prev
        {
            return Err(format!("line {}: at_ms goes backwards ({} < {})", index + 1, frame.at_ms, prev));
        }
        frames.push(frame);
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena() -> BoxResolver {
        BoxResolver {
            zones: vec![ZoneBox {
                id: "arena".to_string(),
                min_x: 0.0,
                min_z: 0.0,
                max_x: 10.0,
                max_z: 10.0,
                spawn: None,
            }],
        }
    }

    #[test]
    fn test_read_frames_skips_comments_and_defaults_fields() {
        let text = "# trace\n\n{\"at_ms\": 5, \"actors\": [{\"id\": 1, \"zone\": \"arena\"}]}\n";
        let frames = read_frames(text.as_bytes()).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].at_ms, 5);
        assert!(frames[0].connect.is_empty());
        assert!(!frames[0].rotate);
        assert_eq!(frames[0].world_ready, None);
    }

    #[test]
    fn test_read_frames_rejects_time_going_backwards() {
        let text = "{\"at_ms\": 10}\n{\"at_ms\": 5}\n";
        let err = read_frames(text.as_bytes()).unwrap_err();
        assert!(err.starts_with("line 2"), "{err}");
    }

    #[test]
    fn test_read_frames_reports_line_of_bad_json() {
        let text = "{\"at_ms\": 0}\n{not json}\n";
        let err = read_frames(text.as_bytes()).unwrap_err();
        assert!(err.starts_with("line 2"), "{err}");
    }

    #[test]
    fn test_explicit_zone_wins_over_position() {
        let actor = ActorFrame {
            id: 7,
            zone: Some("lobby".to_string()),
            pos: Some(Position::new(5.0, 0.0, 5.0)),
        };
        assert_eq!(actor.observe(&arena()), (ActorId(7), Some("lobby".to_string())));
    }

    #[test]
    fn test_position_resolves_through_boxes() {
        let inside = ActorFrame { id: 1, zone: None, pos: Some(Position::new(5.0, 3.0, 5.0)) };
        let outside = ActorFrame { id: 2, zone: None, pos: Some(Position::new(50.0, 0.0, 5.0)) };
        assert_eq!(inside.observe(&arena()).1.as_deref(), Some("arena"));
        assert_eq!(outside.observe(&arena()).1, None);
    }

    #[test]
    fn test_spawn_point_defaults_to_center() {
        let zone = &arena().zones[0];
        assert_eq!(zone.spawn_point(), Position::new(5.0, 0.0, 5.0));
    }
}
