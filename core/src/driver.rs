//! Per-tick orchestration.
//!
//! One tick, in order:
//!
//! ```text
//!   samples ──► resolve zone ──► TransitionDetector::observe
//!                                      │ commit
//!                                      ▼
//!                      Exit pipeline, then Enter pipeline
//!   unseen actors ──► sweep_stale ──► Exit pipeline
//!   rotation clock ──► BorderRebuildScheduler::tick
//! ```
//!
//! Nothing escapes a tick. Host callbacks (resolver, actions, signal
//! handlers) run isolated, and rebuild failures stay pending in the scheduler.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use hashbrown::HashSet;
use serde::{Deserialize, Serialize};
use zonekeeper_types::ZoneKeeperConfig;

use crate::border::{BorderRebuildScheduler, RebuildTarget, TickOutcome};
use crate::config::ConfigStore;
use crate::detection::{CommittedTransition, DetectionTimings, TransitionDetector, TransitionOutcome};
use crate::events::{ExitCause, SignalHandler, ZoneSignal};
use crate::ids::{ActorId, EntityHandle};
use crate::isolation::{isolate, panic_message};
use crate::lifecycle::{Direction, ExecutionReport, LifecyclePipeline, PipelineRun};
use crate::registry::{EntityRegistry, RegistryLimits};
use crate::spatial::{Position, ZoneResolver};

/// One actor's position at sample time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActorSample {
    pub actor: ActorId,
    pub position: Position,
}

/// Everything one tick did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickReport {
    /// False when the detection pass was skipped by the check interval.
    pub detection_ran: bool,
    pub signals: Vec<ZoneSignal>,
    pub executions: Vec<ExecutionReport>,
}

impl TickReport {
    fn skipped() -> Self {
        Self::default()
    }
}

/// Owns the detector, pipeline and scheduler, and shares the registry with
/// handlers and host callbacks.
pub struct ZoneTickDriver<W> {
    config: Arc<ZoneKeeperConfig>,
    detector: TransitionDetector,
    pipeline: LifecyclePipeline<W>,
    scheduler: BorderRebuildScheduler,
    registry: Arc<EntityRegistry>,
    check_interval: Duration,
    last_detection_at: Option<DateTime<Utc>>,
    signal_handlers: Vec<Box<dyn SignalHandler>>,
}

impl<W> ZoneTickDriver<W> {
    pub fn new(config: Arc<ZoneKeeperConfig>) -> Self {
        let registry = Arc::new(EntityRegistry::new(RegistryLimits::from_config(&config.registry)));
        Self::with_registry(config, registry)
    }

    pub fn with_registry(config: Arc<ZoneKeeperConfig>, registry: Arc<EntityRegistry>) -> Self {
        Self {
            detector: TransitionDetector::new(DetectionTimings::from_config(&config.detection)),
            pipeline: LifecyclePipeline::new(Arc::new(config.lifecycle.clone())),
            scheduler: BorderRebuildScheduler::new(&config.border),
            registry,
            check_interval: Duration::milliseconds(config.detection.effective_check_interval_ms() as i64),
            last_detection_at: None,
            signal_handlers: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &Arc<ZoneKeeperConfig> {
        &self.config
    }

    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }

    pub fn detector(&self) -> &TransitionDetector {
        &self.detector
    }

    pub fn pipeline(&self) -> &LifecyclePipeline<W> {
        &self.pipeline
    }

    /// Register handlers and hooks here at startup.
    pub fn pipeline_mut(&mut self) -> &mut LifecyclePipeline<W> {
        &mut self.pipeline
    }

    pub fn scheduler(&self) -> &BorderRebuildScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut BorderRebuildScheduler {
        &mut self.scheduler
    }

    pub fn add_signal_handler(&mut self, handler: impl SignalHandler + 'static) {
        self.signal_handlers.push(Box::new(handler));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tick
    // ─────────────────────────────────────────────────────────────────────────

    /// Resolve each sample's zone and run one tick.
    pub fn tick<R>(
        &mut self,
        now: DateTime<Utc>,
        samples: &[ActorSample],
        resolver: &R,
        world: &mut W,
        border: &mut impl RebuildTarget,
    ) -> TickReport
    where
        R: ZoneResolver + ?Sized,
    {
        let observed: Vec<_> = samples
            .iter()
            .map(|s| (s.actor, self.resolve_sample(resolver, s)))
            .collect();
        self.tick_observed(now, observed, world, border)
    }

    /// A resolver panic holds the actor in its committed zone for this tick.
    fn resolve_sample<R>(&self, resolver: &R, sample: &ActorSample) -> Option<String>
    where
        R: ZoneResolver + ?Sized,
    {
        match isolate(|| resolver.resolve_zone_at(sample.position)) {
            Ok(zone) => zone,
            Err(payload) => {
                tracing::error!(
                    actor = %sample.actor,
                    error = %panic_message(payload.as_ref()),
                    "Zone resolver panicked"
                );
                self.detector.current_zone(sample.actor).map(str::to_string)
            }
        }
    }

    /// Run one tick from already-resolved zones. Actors absent from
    /// `observed` are swept as stale.
    pub fn tick_observed(
        &mut self,
        now: DateTime<Utc>,
        observed: impl IntoIterator<Item = (ActorId, Option<String>)>,
        world: &mut W,
        border: &mut impl RebuildTarget,
    ) -> TickReport {
        let mut report = if self.detection_due(now) {
            self.last_detection_at = Some(now);
            self.run_detection(now, observed, world)
        } else {
            TickReport::skipped()
        };

        match self.scheduler.tick(now, border) {
            TickOutcome::Rebuilt {
                reason,
                rotation_offset,
            } => report.signals.push(ZoneSignal::BorderRebuilt {
                reason,
                rotation_offset,
                timestamp: now,
            }),
            TickOutcome::Failed { reason, error } => report.signals.push(ZoneSignal::BorderRebuildFailed {
                reason,
                error,
                timestamp: now,
            }),
            TickOutcome::Idle | TickOutcome::Waiting(_) => {}
        }

        self.dispatch(&report.signals);
        report
    }

    fn detection_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_detection_at {
            Some(last) => now.signed_duration_since(last) >= self.check_interval,
            None => true,
        }
    }

    fn run_detection(
        &mut self,
        now: DateTime<Utc>,
        observed: impl IntoIterator<Item = (ActorId, Option<String>)>,
        world: &mut W,
    ) -> TickReport {
        let mut report = TickReport {
            detection_ran: true,
            ..Default::default()
        };
        let mut seen = HashSet::new();

        for (actor, zone_id) in observed {
            seen.insert(actor);
            if let TransitionOutcome::Committed(commit) = self.detector.observe(actor, zone_id.as_deref(), now) {
                self.apply_commit(actor, commit, ExitCause::Transition, false, world, &mut report);
            }
        }

        for stale in self.detector.sweep_stale(&seen) {
            self.run_exit(stale.actor, stale.zone_id, ExitCause::Stale, now, world, &mut report);
        }

        report
    }

    /// Exit (if any) strictly before Enter for the same actor.
    fn apply_commit(
        &mut self,
        actor: ActorId,
        commit: CommittedTransition,
        cause: ExitCause,
        forced: bool,
        world: &mut W,
        report: &mut TickReport,
    ) {
        if let Some(exited) = commit.exited {
            self.run_exit(actor, exited, cause, commit.timestamp, world, report);
        }
        if let Some(entered) = commit.entered {
            self.run_enter(actor, entered, forced, commit.timestamp, world, report);
        }
    }

    fn run_exit(
        &mut self,
        actor: ActorId,
        zone_id: String,
        cause: ExitCause,
        now: DateTime<Utc>,
        world: &mut W,
        report: &mut TickReport,
    ) {
        // The detector already moved the actor out, so this is who remains.
        let others_in_zone = self.detector.occupancy(&zone_id);
        let run = PipelineRun {
            actor,
            zone_id: &zone_id,
            direction: Direction::Exit,
            timestamp: now,
            others_in_zone,
        };
        tracing::info!(actor = %actor, zone = %zone_id, cause = ?cause, "Actor left zone");
        report.executions.push(self.pipeline.execute(run, &self.registry, world));
        report.signals.push(ZoneSignal::ActorExited {
            actor,
            zone_id,
            cause,
            timestamp: now,
        });
    }

    fn run_enter(
        &mut self,
        actor: ActorId,
        zone_id: String,
        forced: bool,
        now: DateTime<Utc>,
        world: &mut W,
        report: &mut TickReport,
    ) {
        let others_in_zone = self.detector.occupancy(&zone_id).saturating_sub(1);
        let run = PipelineRun {
            actor,
            zone_id: &zone_id,
            direction: Direction::Enter,
            timestamp: now,
            others_in_zone,
        };
        tracing::info!(actor = %actor, zone = %zone_id, forced, "Actor entered zone");
        report.executions.push(self.pipeline.execute(run, &self.registry, world));
        report.signals.push(ZoneSignal::ActorEntered {
            actor,
            zone_id,
            forced,
            timestamp: now,
        });
    }

    fn dispatch(&mut self, signals: &[ZoneSignal]) {
        for signal in signals {
            for handler in &mut self.signal_handlers {
                if let Err(payload) = isolate(|| handler.handle_signal(signal)) {
                    tracing::error!(
                        signal = ?signal,
                        error = %panic_message(payload.as_ref()),
                        "Signal handler panicked"
                    );
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Forced transitions
    // ─────────────────────────────────────────────────────────────────────────

    /// Put `actor` into `zone_id` now, running the pipelines immediately.
    pub fn force_enter(&mut self, actor: ActorId, zone_id: &str, now: DateTime<Utc>, world: &mut W) -> TickReport {
        let mut report = TickReport::default();
        if let Some(commit) = self.detector.force_enter(actor, zone_id, now) {
            self.apply_commit(actor, commit, ExitCause::Forced, true, world, &mut report);
        }
        self.dispatch(&report.signals);
        report
    }

    /// Take `actor` out of its zone now. No-op if it is not in one.
    pub fn force_exit(&mut self, actor: ActorId, now: DateTime<Utc>, world: &mut W) -> TickReport {
        let mut report = TickReport::default();
        if let Some(zone_id) = self.detector.force_exit(actor) {
            self.run_exit(actor, zone_id, ExitCause::Forced, now, world, &mut report);
        }
        self.dispatch(&report.signals);
        report
    }

    /// Forget `actor` without running any pipeline.
    pub fn remove_actor(&mut self, actor: ActorId) {
        self.detector.remove_actor(actor);
    }

    pub fn on_actor_connected(&mut self, now: DateTime<Utc>) {
        self.scheduler.on_actor_connected(now);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Configuration
    // ─────────────────────────────────────────────────────────────────────────

    /// Apply a new snapshot to every component and queue a border rebuild.
    ///
    /// Registry limits are fixed at construction and are not changed here.
    pub fn apply_config(&mut self, config: Arc<ZoneKeeperConfig>, now: DateTime<Utc>) {
        if config.registry != self.config.registry {
            tracing::warn!("Registry limits changed; they take effect on restart");
        }

        self.detector.set_timings(DetectionTimings::from_config(&config.detection));
        self.pipeline.set_config(Arc::new(config.lifecycle.clone()));
        self.scheduler.apply_config(&config.border);
        self.check_interval = Duration::milliseconds(config.detection.effective_check_interval_ms() as i64);
        self.config = config;

        self.scheduler.request_rebuild("config-reload", false, now);
    }

    /// Reload `path` through `store` if it changed, and apply it. A failed
    /// reload is logged and the running config is kept.
    pub fn reload_config(&mut self, store: &ConfigStore, path: &Path, now: DateTime<Utc>) -> bool {
        match store.reload_if_modified(path) {
            Ok(true) => {
                self.apply_config(store.current(), now);
                true
            }
            Ok(false) => false,
            Err(e) => {
                tracing::warn!(error = %e, "Config reload failed, keeping current settings");
                false
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Introspection and shutdown
    // ─────────────────────────────────────────────────────────────────────────

    pub fn occupancy(&self, zone_id: &str) -> usize {
        self.detector.occupancy(zone_id)
    }

    pub fn occupancy_snapshot(&self) -> BTreeMap<String, usize> {
        self.detector.occupancy_snapshot()
    }

    /// Drop all actor state and return every tracked entity for destruction.
    pub fn shutdown(&mut self) -> Vec<EntityHandle> {
        self.detector.clear();
        let handles = self.registry.clear_all();
        tracing::info!(entities = handles.len(), "Zone driver shut down");
        handles
    }
}
