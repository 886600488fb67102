use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ids::ActorId;

/// Why an actor left a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitCause {
    /// Confirmed move out of the zone.
    Transition,
    /// Actor vanished from the sample set (disconnect, despawn).
    Stale,
    /// Operator or command forced the exit.
    Forced,
}

/// Signals emitted by the tick driver for committed residency changes and
/// border maintenance. These are the "interesting things that happened" at
/// a higher level than raw position samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ZoneSignal {
    ActorExited {
        actor: ActorId,
        zone_id: String,
        cause: ExitCause,
        timestamp: DateTime<Utc>,
    },
    ActorEntered {
        actor: ActorId,
        zone_id: String,
        forced: bool,
        timestamp: DateTime<Utc>,
    },
    BorderRebuilt {
        reason: String,
        rotation_offset: u64,
        timestamp: DateTime<Utc>,
    },
    BorderRebuildFailed {
        reason: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl ZoneSignal {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::ActorExited { timestamp, .. }
            | Self::ActorEntered { timestamp, .. }
            | Self::BorderRebuilt { timestamp, .. }
            | Self::BorderRebuildFailed { timestamp, .. } => *timestamp,
        }
    }

    pub fn actor(&self) -> Option<ActorId> {
        match self {
            Self::ActorExited { actor, .. } | Self::ActorEntered { actor, .. } => Some(*actor),
            _ => None,
        }
    }
}
