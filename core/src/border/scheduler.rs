//! Debounced, readiness-gated border rebuilds.
//!
//! Requests only raise a pending flag; the rebuild itself runs on a later
//! tick once the host world reports it is ready. A failed rebuild leaves the
//! flag raised so the next tick retries.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use zonekeeper_types::BorderConfig;

use super::rotation::{RotationClock, deadline};
use crate::isolation::{isolate, panic_message};

/// Whether the host world can accept a rebuild right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    NotReady(String),
}

impl From<bool> for Readiness {
    fn from(ready: bool) -> Self {
        if ready {
            Self::Ready
        } else {
            Self::NotReady("world not ready".to_string())
        }
    }
}

impl From<Result<(), String>> for Readiness {
    fn from(result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::Ready,
            Err(reason) => Self::NotReady(reason),
        }
    }
}

/// What a successful rebuild reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildStatus {
    Complete,
    /// Some effects need a connected actor to apply; rebuild again on the
    /// first connection.
    NeedsFirstConnect,
}

/// Passed to the rebuild callback.
#[derive(Debug, Clone)]
pub struct RebuildContext<'a> {
    pub reason: &'a str,
    pub rotation_offset: u64,
    /// 1 for the first try after a request, incremented on each retry.
    pub attempt: u32,
    pub now: DateTime<Utc>,
}

/// The host side of a border rebuild.
pub trait RebuildTarget {
    fn readiness(&mut self) -> Readiness;
    fn rebuild(&mut self, ctx: &RebuildContext<'_>) -> Result<RebuildStatus, String>;
}

/// Adapts a readiness closure and a rebuild closure into a [`RebuildTarget`].
pub struct RebuildFns<R, F> {
    readiness: R,
    rebuild: F,
}

impl<R, O, F> RebuildFns<R, F>
where
    R: FnMut() -> O,
    O: Into<Readiness>,
    F: FnMut(&RebuildContext<'_>) -> Result<RebuildStatus, String>,
{
    pub fn new(readiness: R, rebuild: F) -> Self {
        Self { readiness, rebuild }
    }
}

impl<R, O, F> RebuildTarget for RebuildFns<R, F>
where
    R: FnMut() -> O,
    O: Into<Readiness>,
    F: FnMut(&RebuildContext<'_>) -> Result<RebuildStatus, String>,
{
    fn readiness(&mut self) -> Readiness {
        (self.readiness)().into()
    }

    fn rebuild(&mut self, ctx: &RebuildContext<'_>) -> Result<RebuildStatus, String> {
        (self.rebuild)(ctx)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    Accepted,
    /// Inside the request cooldown; the request was discarded.
    Dropped { next_allowed_at: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    Waiting(String),
    Rebuilt { reason: String, rotation_offset: u64 },
    Failed { reason: String, error: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub requests_accepted: u64,
    pub requests_dropped: u64,
    pub rebuilds_completed: u64,
    pub rebuilds_failed: u64,
}

#[derive(Debug, Clone)]
pub struct BorderRebuildScheduler {
    request_cooldown: Duration,
    readiness_log_interval: Duration,
    pending: bool,
    pending_reason: String,
    attempts: u32,
    next_allowed_request_at: Option<DateTime<Utc>>,
    next_readiness_log_at: Option<DateTime<Utc>>,
    rotation_offset: u64,
    rotation: RotationClock,
    needs_first_connect: bool,
    stats: SchedulerStats,
}

impl Default for BorderRebuildScheduler {
    fn default() -> Self {
        Self::new(&BorderConfig::default())
    }
}

impl BorderRebuildScheduler {
    pub fn new(config: &BorderConfig) -> Self {
        Self {
            request_cooldown: Duration::seconds(config.effective_rebuild_cooldown_secs() as i64),
            readiness_log_interval: Duration::seconds(config.effective_readiness_log_interval_secs() as i64),
            pending: false,
            pending_reason: String::new(),
            attempts: 0,
            next_allowed_request_at: None,
            next_readiness_log_at: None,
            rotation_offset: 0,
            rotation: RotationClock::from_config(config),
            needs_first_connect: false,
            stats: SchedulerStats::default(),
        }
    }

    /// Take new settings. An active request cooldown keeps its deadline.
    pub fn apply_config(&mut self, config: &BorderConfig) {
        self.request_cooldown = Duration::seconds(config.effective_rebuild_cooldown_secs() as i64);
        self.readiness_log_interval = Duration::seconds(config.effective_readiness_log_interval_secs() as i64);
        self.rotation.apply_config(config);
    }

    /// Ask for a rebuild. Non-bypass requests inside the cooldown are dropped.
    pub fn request_rebuild(
        &mut self,
        reason: &str,
        bypass_cooldown: bool,
        now: DateTime<Utc>,
    ) -> RequestOutcome {
        if !bypass_cooldown
            && let Some(next_allowed_at) = self.next_allowed_request_at
            && now < next_allowed_at
        {
            self.stats.requests_dropped += 1;
            tracing::debug!(
                reason = %reason,
                next_allowed = %next_allowed_at,
                "Border rebuild request dropped during cooldown"
            );
            return RequestOutcome::Dropped { next_allowed_at };
        }

        self.next_allowed_request_at = Some(deadline(now, self.request_cooldown));
        if !self.pending {
            self.attempts = 0;
        }
        self.pending = true;
        self.pending_reason = reason.to_string();
        self.stats.requests_accepted += 1;
        tracing::debug!(reason = %reason, bypass = bypass_cooldown, "Border rebuild queued");
        RequestOutcome::Accepted
    }

    /// Rotate immediately: bump the offset and queue a bypass rebuild.
    pub fn rotate_now(&mut self, now: DateTime<Utc>) -> u64 {
        self.rotation_offset += 1;
        self.rotation.reschedule(now);
        self.request_rebuild("manual-rotate", true, now);
        self.rotation_offset
    }

    /// Advance the automatic rotation clock. Returns true if it rotated.
    pub fn advance_rotation(&mut self, now: DateTime<Utc>) -> bool {
        if !self.rotation.tick(now) {
            return false;
        }
        self.rotation_offset += 1;
        tracing::debug!(rotation_offset = self.rotation_offset, "Border auto-rotation due");
        self.request_rebuild("auto-rotate", false, now);
        true
    }

    /// An actor connected. Flushes a deferred first-connect rebuild, then
    /// issues the usual (cooldown-limited) request.
    pub fn on_actor_connected(&mut self, now: DateTime<Utc>) {
        if self.needs_first_connect {
            self.needs_first_connect = false;
            self.request_rebuild("first-actor-connect", true, now);
        }
        self.request_rebuild("actor-connect", false, now);
    }

    /// Advance rotation, then run the pending rebuild if `target` is ready.
    ///
    /// Readiness is only consulted while a rebuild is pending. Errors and
    /// panics from the rebuild keep the request pending.
    pub fn tick(&mut self, now: DateTime<Utc>, target: &mut impl RebuildTarget) -> TickOutcome {
        self.advance_rotation(now);

        if !self.pending {
            return TickOutcome::Idle;
        }

        let readiness = isolate(|| target.readiness())
            .unwrap_or_else(|payload| Readiness::NotReady(panic_message(payload.as_ref())));
        if let Readiness::NotReady(why) = readiness {
            self.log_waiting(&why, now);
            return TickOutcome::Waiting(why);
        }

        self.attempts += 1;
        let ctx = RebuildContext {
            reason: &self.pending_reason,
            rotation_offset: self.rotation_offset,
            attempt: self.attempts,
            now,
        };
        let result = match isolate(|| target.rebuild(&ctx)) {
            Ok(result) => result,
            Err(payload) => Err(format!("rebuild panicked: {}", panic_message(payload.as_ref()))),
        };

        let reason = std::mem::take(&mut self.pending_reason);
        match result {
            Ok(status) => {
                self.pending = false;
                self.attempts = 0;
                self.next_readiness_log_at = None;
                self.stats.rebuilds_completed += 1;
                if status == RebuildStatus::NeedsFirstConnect {
                    self.needs_first_connect = true;
                }
                tracing::info!(
                    reason = %reason,
                    rotation_offset = self.rotation_offset,
                    "Border rebuild completed"
                );
                TickOutcome::Rebuilt {
                    reason,
                    rotation_offset: self.rotation_offset,
                }
            }
            Err(error) => {
                self.stats.rebuilds_failed += 1;
                tracing::warn!(
                    reason = %reason,
                    attempt = self.attempts,
                    error = %error,
                    "Border rebuild deferred after failure"
                );
                self.pending_reason.clone_from(&reason);
                TickOutcome::Failed { reason, error }
            }
        }
    }

    fn log_waiting(&mut self, why: &str, now: DateTime<Utc>) {
        if self.next_readiness_log_at.is_some_and(|next| now < next) {
            return;
        }
        self.next_readiness_log_at = Some(deadline(now, self.readiness_log_interval));
        tracing::debug!(waiting_on = %why, reason = %self.pending_reason, "Pending border rebuild waiting");
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Reason of the most recent accepted request, while pending.
    pub fn pending_reason(&self) -> Option<&str> {
        self.pending.then_some(self.pending_reason.as_str())
    }

    pub fn rotation_offset(&self) -> u64 {
        self.rotation_offset
    }

    pub fn needs_first_connect(&self) -> bool {
        self.needs_first_connect
    }

    pub fn next_allowed_request_at(&self) -> Option<DateTime<Utc>> {
        self.next_allowed_request_at
    }

    pub fn rotation(&self) -> &RotationClock {
        &self.rotation
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }
}
