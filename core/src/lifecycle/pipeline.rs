//! Ordered, fault-isolated execution of lifecycle actions.
//!
//! Every step runs inside one isolation boundary: a returned error or a
//! panic is logged with the step and zone, recorded in the report, and the
//! next step runs anyway. Steps never see each other's outcomes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use serde::Serialize;
use thiserror::Error;
use zonekeeper_types::LifecycleConfig;

use super::action::{Direction, LifecycleAction};
use super::resolver::{ResolvedActions, resolve_actions};
use crate::ids::ActorId;
use crate::isolation::{isolate, panic_message};
use crate::registry::EntityRegistry;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// The step tried and failed.
    #[error("{0}")]
    Failed(String),

    /// The step's precondition did not hold, so it did nothing.
    #[error("skipped: {0}")]
    Skipped(String),
}

impl ActionError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped(reason.into())
    }
}

/// Which actor and zone a pipeline runs for.
#[derive(Debug, Clone, Copy)]
pub struct PipelineRun<'a> {
    pub actor: ActorId,
    pub zone_id: &'a str,
    pub direction: Direction,
    pub timestamp: DateTime<Utc>,
    /// Actors other than `actor` committed to the zone. On enter this is
    /// who was already there; on exit, who remains.
    pub others_in_zone: usize,
}

/// Everything a handler may touch for one step.
pub struct ActionContext<'a, W> {
    pub actor: ActorId,
    pub zone_id: &'a str,
    pub direction: Direction,
    pub timestamp: DateTime<Utc>,
    pub others_in_zone: usize,
    pub registry: &'a EntityRegistry,
    pub world: &'a mut W,
}

impl<W> ActionContext<'_, W> {
    /// No other actor shares the zone.
    pub fn is_alone(&self) -> bool {
        self.others_in_zone == 0
    }
}

/// Performs one lifecycle action against the host world `W`.
pub trait ActionHandler<W> {
    fn handle(&mut self, ctx: &mut ActionContext<'_, W>) -> Result<(), ActionError>;
}

impl<W, F> ActionHandler<W> for F
where
    F: FnMut(&mut ActionContext<'_, W>) -> Result<(), ActionError>,
{
    fn handle(&mut self, ctx: &mut ActionContext<'_, W>) -> Result<(), ActionError> {
        self(ctx)
    }
}

/// Optional external collaborator notified by the integration steps when no
/// dedicated handler is registered for them.
pub trait IntegrationHook<W> {
    fn on_zone_enter(&mut self, ctx: &mut ActionContext<'_, W>) -> Result<(), ActionError>;
    fn on_zone_exit(&mut self, ctx: &mut ActionContext<'_, W>) -> Result<(), ActionError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum StepOutcome {
    Completed,
    Failed(String),
    Panicked(String),
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub action: LifecycleAction,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub actor: ActorId,
    pub zone_id: String,
    pub direction: Direction,
    pub steps: Vec<StepReport>,
}

impl ExecutionReport {
    pub fn completed(&self) -> usize {
        self.count(|o| matches!(o, StepOutcome::Completed))
    }

    /// Steps that returned an error or panicked.
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, StepOutcome::Failed(_) | StepOutcome::Panicked(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, StepOutcome::Skipped(_)))
    }

    fn count(&self, pred: impl Fn(&StepOutcome) -> bool) -> usize {
        self.steps.iter().filter(|s| pred(&s.outcome)).count()
    }
}

/// Resolves and runs enter/exit action lists against handlers registered
/// once at startup.
pub struct LifecyclePipeline<W> {
    config: Arc<LifecycleConfig>,
    handlers: HashMap<LifecycleAction, Box<dyn ActionHandler<W>>>,
    integration: Option<Box<dyn IntegrationHook<W>>>,
}

impl<W> Default for LifecyclePipeline<W> {
    fn default() -> Self {
        Self::new(Arc::new(LifecycleConfig::default()))
    }
}

impl<W> LifecyclePipeline<W> {
    pub fn new(config: Arc<LifecycleConfig>) -> Self {
        Self {
            config,
            handlers: HashMap::new(),
            integration: None,
        }
    }

    pub fn config(&self) -> &Arc<LifecycleConfig> {
        &self.config
    }

    /// Swap in reloaded mappings. Takes effect on the next resolution.
    pub fn set_config(&mut self, config: Arc<LifecycleConfig>) {
        self.config = config;
    }

    /// Register the handler for `action`, replacing any previous one.
    pub fn register(&mut self, action: LifecycleAction, handler: impl ActionHandler<W> + 'static) {
        if action.is_unknown() {
            tracing::warn!(action = %action, "Ignoring handler for unknown lifecycle action");
            return;
        }
        self.handlers.insert(action, Box::new(handler));
    }

    /// Closure form of [`register`](Self::register); the bound lets closure
    /// arguments be inferred.
    pub fn register_fn<F>(&mut self, action: LifecycleAction, handler: F)
    where
        F: FnMut(&mut ActionContext<'_, W>) -> Result<(), ActionError> + 'static,
    {
        self.register(action, handler);
    }

    pub fn has_handler(&self, action: &LifecycleAction) -> bool {
        self.handlers.contains_key(action)
    }

    pub fn set_integration_hook(&mut self, hook: Box<dyn IntegrationHook<W>>) {
        self.integration = Some(hook);
    }

    pub fn clear_integration_hook(&mut self) {
        self.integration = None;
    }

    pub fn resolve(&self, zone_id: &str, direction: Direction) -> ResolvedActions {
        resolve_actions(&self.config, zone_id, direction)
    }

    /// Resolve and run the pipeline for `run`. Never fails; per-step results
    /// are in the report.
    pub fn execute(
        &mut self,
        run: PipelineRun<'_>,
        registry: &EntityRegistry,
        world: &mut W,
    ) -> ExecutionReport {
        let resolved = self.resolve(run.zone_id, run.direction);
        self.execute_actions(run, &resolved.actions, registry, world)
    }

    /// Run an explicit action list in order.
    pub fn execute_actions(
        &mut self,
        run: PipelineRun<'_>,
        actions: &[LifecycleAction],
        registry: &EntityRegistry,
        world: &mut W,
    ) -> ExecutionReport {
        let mut steps = Vec::with_capacity(actions.len());

        for action in actions {
            let mut ctx = ActionContext {
                actor: run.actor,
                zone_id: run.zone_id,
                direction: run.direction,
                timestamp: run.timestamp,
                others_in_zone: run.others_in_zone,
                registry,
                world: &mut *world,
            };
            let outcome = self.run_step(action, &mut ctx);
            log_outcome(&run, action, &outcome);
            steps.push(StepReport {
                action: action.clone(),
                outcome,
            });
        }

        ExecutionReport {
            actor: run.actor,
            zone_id: run.zone_id.to_string(),
            direction: run.direction,
            steps,
        }
    }

    fn run_step(&mut self, action: &LifecycleAction, ctx: &mut ActionContext<'_, W>) -> StepOutcome {
        if action.is_unknown() {
            return StepOutcome::Skipped(format!("unknown action for {}", ctx.direction));
        }

        let result = if let Some(handler) = self.handlers.get_mut(action) {
            isolate(|| handler.handle(ctx))
        } else if let Some(hook) = self.integration.as_mut() {
            match action {
                LifecycleAction::IntegrationEventsEnter => isolate(|| hook.on_zone_enter(ctx)),
                LifecycleAction::IntegrationEventsExit => isolate(|| hook.on_zone_exit(ctx)),
                _ => return StepOutcome::Skipped("no handler registered".to_string()),
            }
        } else {
            return StepOutcome::Skipped("no handler registered".to_string());
        };

        match result {
            Ok(Ok(())) => StepOutcome::Completed,
            Ok(Err(ActionError::Skipped(reason))) => StepOutcome::Skipped(reason),
            Ok(Err(ActionError::Failed(message))) => StepOutcome::Failed(message),
            Err(payload) => StepOutcome::Panicked(panic_message(payload.as_ref())),
        }
    }
}

fn log_outcome(run: &PipelineRun<'_>, action: &LifecycleAction, outcome: &StepOutcome) {
    match outcome {
        StepOutcome::Completed => {
            tracing::trace!(zone = %run.zone_id, actor = %run.actor, step = %action, "Lifecycle step completed");
        }
        StepOutcome::Failed(error) => {
            tracing::warn!(
                zone = %run.zone_id,
                actor = %run.actor,
                direction = %run.direction,
                step = %action,
                error = %error,
                "Lifecycle step failed"
            );
        }
        StepOutcome::Panicked(error) => {
            tracing::error!(
                zone = %run.zone_id,
                actor = %run.actor,
                direction = %run.direction,
                step = %action,
                error = %error,
                "Lifecycle step panicked"
            );
        }
        StepOutcome::Skipped(reason) if action.is_unknown() => {
            tracing::warn!(zone = %run.zone_id, step = %action, reason = %reason, "Skipping lifecycle step");
        }
        StepOutcome::Skipped(reason) => {
            tracing::debug!(zone = %run.zone_id, actor = %run.actor, step = %action, reason = %reason, "Lifecycle step skipped");
        }
    }
}
