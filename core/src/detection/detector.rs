//! Zone transition state machine.
//!
//! Each tracked actor moves between three situations:
//! - Settled: the sampled zone equals the committed zone
//! - Pending: a different zone has been sampled, waiting out its confirm window
//! - Committed: the window (and the per-actor cooldown) elapsed, the new zone
//!   becomes current and Exit/Enter are reported
//!
//! The detector is pure in-memory bookkeeping. It never fails and never
//! performs I/O; callers run the lifecycle pipelines for what it reports.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use hashbrown::{HashMap, HashSet};
use zonekeeper_types::DetectionConfig;

use crate::ids::{ActorId, fold_key, normalize_zone, same_zone};

/// Confirm windows and cooldown, already clamped to their minimums.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionTimings {
    pub enter_confirm: Duration,
    pub exit_confirm: Duration,
    pub transition_cooldown: Duration,
}

impl DetectionTimings {
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self {
            enter_confirm: secs_to_duration(config.effective_enter_confirm_secs()),
            exit_confirm: secs_to_duration(config.effective_exit_confirm_secs()),
            transition_cooldown: secs_to_duration(config.effective_transition_cooldown_secs()),
        }
    }

    /// Window the candidate must be held for: exits (no zone) and enters
    /// are tuned separately.
    fn confirm_window(&self, candidate: Option<&str>) -> Duration {
        if candidate.is_none() {
            self.exit_confirm
        } else {
            self.enter_confirm
        }
    }
}

impl Default for DetectionTimings {
    fn default() -> Self {
        Self::from_config(&DetectionConfig::default())
    }
}

pub(crate) fn secs_to_duration(secs: f64) -> Duration {
    Duration::microseconds((secs * 1_000_000.0).round() as i64)
}

/// A candidate transition that has not satisfied its confirm window yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransition {
    pub previous_zone_id: Option<String>,
    pub candidate_zone_id: Option<String>,
    pub first_seen: DateTime<Utc>,
}

impl PendingTransition {
    fn matches(&self, previous: Option<&str>, candidate: Option<&str>) -> bool {
        same_zone(self.previous_zone_id.as_deref(), previous)
            && same_zone(self.candidate_zone_id.as_deref(), candidate)
    }
}

/// Per-actor detector state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActorZoneState {
    pub current_zone_id: Option<String>,
    pub pending_transition: Option<PendingTransition>,
    pub last_committed_at: Option<DateTime<Utc>>,
}

/// A committed residency change. Exit (if any) must be handled before Enter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedTransition {
    pub exited: Option<String>,
    pub entered: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Sampled zone equals the committed zone.
    NoChange,
    /// A different zone is sampled but not confirmed (or held by cooldown).
    PendingUnconfirmed,
    Committed(CommittedTransition),
}

impl TransitionOutcome {
    pub fn committed(&self) -> Option<&CommittedTransition> {
        match self {
            Self::Committed(commit) => Some(commit),
            _ => None,
        }
    }
}

/// Exit synthesized for an actor that disappeared from the sample set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleExit {
    pub actor: ActorId,
    pub zone_id: String,
}

/// Per-actor hysteresis + cooldown state machine.
#[derive(Debug, Clone, Default)]
pub struct TransitionDetector {
    timings: DetectionTimings,
    actors: HashMap<ActorId, ActorZoneState>,
}

impl TransitionDetector {
    pub fn new(timings: DetectionTimings) -> Self {
        Self {
            timings,
            actors: HashMap::new(),
        }
    }

    pub fn timings(&self) -> DetectionTimings {
        self.timings
    }

    /// Swap timings after a config reload. Pending transitions keep their
    /// `first_seen` and are judged against the new windows.
    pub fn set_timings(&mut self, timings: DetectionTimings) {
        self.timings = timings;
    }

    /// Feed one sample for `actor` and advance its state machine.
    pub fn observe(
        &mut self,
        actor: ActorId,
        observed_zone_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> TransitionOutcome {
        let timings = self.timings;
        let observed = normalize_zone(observed_zone_id);
        let state = self.actors.entry(actor).or_default();

        if same_zone(state.current_zone_id.as_deref(), observed) {
            state.pending_transition = None;
            return TransitionOutcome::NoChange;
        }

        let previous = state.current_zone_id.clone();
        let window = timings.confirm_window(observed);

        let existing = state
            .pending_transition
            .as_ref()
            .filter(|pending| pending.matches(previous.as_deref(), observed))
            .map(|pending| pending.first_seen);

        let Some(first_seen) = existing else {
            state.pending_transition = Some(PendingTransition {
                previous_zone_id: previous,
                candidate_zone_id: observed.map(str::to_string),
                first_seen: now,
            });
            tracing::trace!(actor = %actor, candidate = ?observed, "Zone transition pending");
            return TransitionOutcome::PendingUnconfirmed;
        };

        if now.signed_duration_since(first_seen) < window {
            return TransitionOutcome::PendingUnconfirmed;
        }

        // Confirmed by dwell time; the cooldown only postpones it, the
        // pending entry stays so the next sample retries.
        if let Some(last) = state.last_committed_at
            && now.signed_duration_since(last) < timings.transition_cooldown
        {
            return TransitionOutcome::PendingUnconfirmed;
        }

        state.pending_transition = None;
        state.last_committed_at = Some(now);
        state.current_zone_id = observed.map(str::to_string);

        tracing::debug!(
            actor = %actor,
            from = ?previous,
            to = ?observed,
            "Zone transition committed"
        );

        TransitionOutcome::Committed(CommittedTransition {
            exited: previous,
            entered: observed.map(str::to_string),
            timestamp: now,
        })
    }

    /// Drop every tracked actor missing from `seen`. Actors that were inside
    /// a zone get exactly one synthesized exit.
    pub fn sweep_stale(&mut self, seen: &HashSet<ActorId>) -> Vec<StaleExit> {
        let stale: Vec<ActorId> = self
            .actors
            .keys()
            .filter(|actor| !seen.contains(*actor))
            .copied()
            .collect();

        let mut exits = Vec::new();
        for actor in stale {
            let Some(state) = self.actors.remove(&actor) else {
                continue;
            };
            if let Some(zone_id) = state.current_zone_id {
                tracing::debug!(actor = %actor, zone = %zone_id, "Stale actor swept from zone");
                exits.push(StaleExit { actor, zone_id });
            }
        }
        exits
    }

    /// Put `actor` into `zone_id` immediately, bypassing confirm and
    /// cooldown. Exit is reported only when leaving a different zone.
    pub fn force_enter(
        &mut self,
        actor: ActorId,
        zone_id: &str,
        now: DateTime<Utc>,
    ) -> Option<CommittedTransition> {
        let zone_id = normalize_zone(Some(zone_id))?;
        let state = self.actors.entry(actor).or_default();

        let exited = state
            .current_zone_id
            .take()
            .filter(|current| !same_zone(Some(current.as_str()), Some(zone_id)));

        state.pending_transition = None;
        state.current_zone_id = Some(zone_id.to_string());
        state.last_committed_at = Some(now);

        Some(CommittedTransition {
            exited,
            entered: Some(zone_id.to_string()),
            timestamp: now,
        })
    }

    /// Remove `actor` from its zone immediately. Returns the zone it left,
    /// or `None` (and changes nothing) if it was not in a zone.
    pub fn force_exit(&mut self, actor: ActorId) -> Option<String> {
        let zone_id = self.actors.get(&actor)?.current_zone_id.clone()?;
        self.actors.remove(&actor);
        Some(zone_id)
    }

    /// Forget an actor without reporting anything.
    pub fn remove_actor(&mut self, actor: ActorId) -> Option<ActorZoneState> {
        self.actors.remove(&actor)
    }

    pub fn current_zone(&self, actor: ActorId) -> Option<&str> {
        self.actors.get(&actor)?.current_zone_id.as_deref()
    }

    pub fn state(&self, actor: ActorId) -> Option<&ActorZoneState> {
        self.actors.get(&actor)
    }

    pub fn is_tracked(&self, actor: ActorId) -> bool {
        self.actors.contains_key(&actor)
    }

    pub fn tracked_count(&self) -> usize {
        self.actors.len()
    }

    pub fn tracked_actors(&self) -> impl Iterator<Item = ActorId> + '_ {
        self.actors.keys().copied()
    }

    /// Actors whose committed zone is `zone_id`.
    pub fn occupancy(&self, zone_id: &str) -> usize {
        self.actors
            .values()
            .filter(|state| same_zone(state.current_zone_id.as_deref(), Some(zone_id)))
            .count()
    }

    /// Occupancy of every non-empty zone, keyed by case-folded zone id.
    pub fn occupancy_snapshot(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for zone_id in self.actors.values().filter_map(|s| s.current_zone_id.as_deref()) {
            *counts.entry(fold_key(zone_id)).or_insert(0) += 1;
        }
        counts
    }

    /// Reset for shutdown.
    pub fn clear(&mut self) {
        self.actors.clear();
    }
}
