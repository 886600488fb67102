//! Lifecycle action tokens.
//!
//! Configuration names actions with free-form strings; they are mapped to
//! [`LifecycleAction`] once, at resolution time, so the pipeline only ever
//! dispatches on the closed enum.

use std::fmt;

use serde::Serialize;

/// Which side of a zone boundary a pipeline runs for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Enter,
    Exit,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enter => write!(f, "enter"),
            Self::Exit => write!(f, "exit"),
        }
    }
}

/// One step of an enter or exit pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LifecycleAction {
    // Enter
    CaptureReturnPosition,
    SnapshotSave,
    ZoneEnterMessage,
    ApplyKit,
    TeleportEnter,
    ApplyTemplates,
    ApplyAbilities,
    GlowSpawn,
    BossEnter,
    IntegrationEventsEnter,
    AnnounceEnter,

    // Exit
    ZoneExitMessage,
    RestoreKitSnapshot,
    RestoreAbilities,
    BossExit,
    TeleportReturn,
    GlowReset,
    IntegrationEventsExit,
    AnnounceExit,

    /// Token with no handler for its direction; logged and skipped.
    Unknown(String),
}

/// Compiled-in enter order.
pub const DEFAULT_ENTER_ACTIONS: &[LifecycleAction] = &[
    LifecycleAction::CaptureReturnPosition,
    LifecycleAction::SnapshotSave,
    LifecycleAction::ZoneEnterMessage,
    LifecycleAction::ApplyKit,
    LifecycleAction::TeleportEnter,
    LifecycleAction::ApplyTemplates,
    LifecycleAction::ApplyAbilities,
    LifecycleAction::GlowSpawn,
    LifecycleAction::BossEnter,
    LifecycleAction::IntegrationEventsEnter,
    LifecycleAction::AnnounceEnter,
];

/// Compiled-in exit order.
pub const DEFAULT_EXIT_ACTIONS: &[LifecycleAction] = &[
    LifecycleAction::ZoneExitMessage,
    LifecycleAction::RestoreKitSnapshot,
    LifecycleAction::RestoreAbilities,
    LifecycleAction::BossExit,
    LifecycleAction::TeleportReturn,
    LifecycleAction::GlowReset,
    LifecycleAction::IntegrationEventsExit,
];

pub fn default_actions(direction: Direction) -> &'static [LifecycleAction] {
    match direction {
        Direction::Enter => DEFAULT_ENTER_ACTIONS,
        Direction::Exit => DEFAULT_EXIT_ACTIONS,
    }
}

/// Trim, lowercase, and turn dashes into underscores.
pub fn normalize_token(raw: &str) -> String {
    raw.trim().to_lowercase().replace('-', "_")
}

/// Shorthand accepted in configuration, per direction.
fn alias(token: &str, direction: Direction) -> &str {
    match (direction, token) {
        (Direction::Enter, "store" | "snapshot") => "snapshot_save",
        (Direction::Enter, "message") => "zone_enter_message",
        (Direction::Enter, "kit") => "apply_kit",
        (Direction::Enter, "ability" | "abilities") => "apply_abilities",
        (Direction::Enter, "glow") => "glow_spawn",
        (Direction::Enter, "teleport") => "teleport_enter",
        (Direction::Enter, "templates") => "apply_templates",
        (Direction::Enter, "integration") => "integration_events_enter",
        (Direction::Enter, "announce") => "announce_enter",

        (Direction::Exit, "restore") => "restore_kit_snapshot",
        (Direction::Exit, "message") => "zone_exit_message",
        (Direction::Exit, "ability" | "abilities") => "restore_abilities",
        (Direction::Exit, "glow") => "glow_reset",
        (Direction::Exit, "teleport") => "teleport_return",
        (Direction::Exit, "integration") => "integration_events_exit",
        (Direction::Exit, "announce") => "announce_exit",

        _ => token,
    }
}

impl LifecycleAction {
    /// Map a raw configuration token for `direction`. Blank tokens yield
    /// `None`; tokens that name an action of the other direction are
    /// `Unknown` here.
    pub fn parse(raw: &str, direction: Direction) -> Option<Self> {
        let normalized = normalize_token(raw);
        if normalized.is_empty() {
            return None;
        }
        let canonical = alias(&normalized, direction);
        let action = match Self::from_token(canonical) {
            Some(action) if action.direction() == Some(direction) => action,
            _ => Self::Unknown(normalized),
        };
        Some(action)
    }

    /// Exact canonical token lookup, ignoring direction.
    pub fn from_token(token: &str) -> Option<Self> {
        let action = match token {
            "capture_return_position" => Self::CaptureReturnPosition,
            "snapshot_save" => Self::SnapshotSave,
            "zone_enter_message" => Self::ZoneEnterMessage,
            "apply_kit" => Self::ApplyKit,
            "teleport_enter" => Self::TeleportEnter,
            "apply_templates" => Self::ApplyTemplates,
            "apply_abilities" => Self::ApplyAbilities,
            "glow_spawn" => Self::GlowSpawn,
            "boss_enter" => Self::BossEnter,
            "integration_events_enter" => Self::IntegrationEventsEnter,
            "announce_enter" => Self::AnnounceEnter,
            "zone_exit_message" => Self::ZoneExitMessage,
            "restore_kit_snapshot" => Self::RestoreKitSnapshot,
            "restore_abilities" => Self::RestoreAbilities,
            "boss_exit" => Self::BossExit,
            "teleport_return" => Self::TeleportReturn,
            "glow_reset" => Self::GlowReset,
            "integration_events_exit" => Self::IntegrationEventsExit,
            "announce_exit" => Self::AnnounceExit,
            _ => return None,
        };
        Some(action)
    }

    pub fn token(&self) -> &str {
        match self {
            Self::CaptureReturnPosition => "capture_return_position",
            Self::SnapshotSave => "snapshot_save",
            Self::ZoneEnterMessage => "zone_enter_message",
            Self::ApplyKit => "apply_kit",
            Self::TeleportEnter => "teleport_enter",
            Self::ApplyTemplates => "apply_templates",
            Self::ApplyAbilities => "apply_abilities",
            Self::GlowSpawn => "glow_spawn",
            Self::BossEnter => "boss_enter",
            Self::IntegrationEventsEnter => "integration_events_enter",
            Self::AnnounceEnter => "announce_enter",
            Self::ZoneExitMessage => "zone_exit_message",
            Self::RestoreKitSnapshot => "restore_kit_snapshot",
            Self::RestoreAbilities => "restore_abilities",
            Self::BossExit => "boss_exit",
            Self::TeleportReturn => "teleport_return",
            Self::GlowReset => "glow_reset",
            Self::IntegrationEventsExit => "integration_events_exit",
            Self::AnnounceExit => "announce_exit",
            Self::Unknown(token) => token,
        }
    }

    /// Direction this action belongs to; `None` for unknown tokens.
    pub fn direction(&self) -> Option<Direction> {
        match self {
            Self::CaptureReturnPosition
            | Self::SnapshotSave
            | Self::ZoneEnterMessage
            | Self::ApplyKit
            | Self::TeleportEnter
            | Self::ApplyTemplates
            | Self::ApplyAbilities
            | Self::GlowSpawn
            | Self::BossEnter
            | Self::IntegrationEventsEnter
            | Self::AnnounceEnter => Some(Direction::Enter),
            Self::ZoneExitMessage
            | Self::RestoreKitSnapshot
            | Self::RestoreAbilities
            | Self::BossExit
            | Self::TeleportReturn
            | Self::GlowReset
            | Self::IntegrationEventsExit
            | Self::AnnounceExit => Some(Direction::Exit),
            Self::Unknown(_) => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }

    /// Actions that must run earlier in the same pipeline for this one to
    /// behave (the snapshot needs the return point, the teleport needs both).
    pub fn requires(&self) -> &'static [LifecycleAction] {
        const SNAPSHOT_SAVE: &[LifecycleAction] = &[LifecycleAction::CaptureReturnPosition];
        const TELEPORT_ENTER: &[LifecycleAction] = &[
            LifecycleAction::CaptureReturnPosition,
            LifecycleAction::SnapshotSave,
        ];

        match self {
            Self::SnapshotSave => SNAPSHOT_SAVE,
            Self::TeleportEnter => TELEPORT_ENTER,
            _ => &[],
        }
    }
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl Serialize for LifecycleAction {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_depend_on_direction() {
        assert_eq!(
            LifecycleAction::parse("Glow", Direction::Enter),
            Some(LifecycleAction::GlowSpawn)
        );
        assert_eq!(
            LifecycleAction::parse(" glow ", Direction::Exit),
            Some(LifecycleAction::GlowReset)
        );
        assert_eq!(
            LifecycleAction::parse("STORE", Direction::Enter),
            Some(LifecycleAction::SnapshotSave)
        );
        assert_eq!(
            LifecycleAction::parse("restore", Direction::Exit),
            Some(LifecycleAction::RestoreKitSnapshot)
        );
        assert_eq!(
            LifecycleAction::parse("announce", Direction::Exit),
            Some(LifecycleAction::AnnounceExit)
        );
    }

    #[test]
    fn test_dashes_normalize_to_underscores() {
        assert_eq!(
            LifecycleAction::parse("Teleport-Enter", Direction::Enter),
            Some(LifecycleAction::TeleportEnter)
        );
    }

    #[test]
    fn test_wrong_direction_is_unknown() {
        assert_eq!(
            LifecycleAction::parse("glow_reset", Direction::Enter),
            Some(LifecycleAction::Unknown("glow_reset".into()))
        );
        assert_eq!(
            LifecycleAction::parse("store", Direction::Exit),
            Some(LifecycleAction::Unknown("store".into()))
        );
    }

    #[test]
    fn test_blank_token_is_none() {
        assert_eq!(LifecycleAction::parse("   ", Direction::Enter), None);
    }

    #[test]
    fn test_token_round_trips_for_defaults() {
        for direction in [Direction::Enter, Direction::Exit] {
            for action in default_actions(direction) {
                assert_eq!(action.direction(), Some(direction));
                assert_eq!(LifecycleAction::parse(action.token(), direction).as_ref(), Some(action));
            }
        }
    }

    #[test]
    fn test_defaults_satisfy_their_own_requirements() {
        for (i, action) in DEFAULT_ENTER_ACTIONS.iter().enumerate() {
            for required in action.requires() {
                assert!(DEFAULT_ENTER_ACTIONS[..i].contains(required), "{} before {}", required, action);
            }
        }
    }
}
