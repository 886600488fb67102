//! Simulated host world for trace replay.
//!
//! Stands in for the game server: actor positions come from the trace,
//! teleports are queued until the world is ready, and glow markers are
//! numbered entities tracked in the registry.

use chrono::{DateTime, Utc};
use hashbrown::{HashMap, HashSet};
use zonekeeper_core::border::{RebuildContext, variant_index, zone_seed};
use zonekeeper_core::registry::SpawnMetadata;
use zonekeeper_core::{
    ActionError, ActorId, Attempt, DeferredQueue, EntityHandle, LifecycleAction, LifecyclePipeline,
    Position, Readiness, RebuildStatus, RebuildTarget, ReturnPositionStore,
};

use crate::trace::ZoneBox;

pub const GLOW_CATEGORY: &str = "glow";
const GLOW_MARKERS: u32 = 4;
const BORDER_VARIANTS: usize = 4;

#[derive(Debug)]
pub struct ReplayWorld {
    pub ready: bool,
    positions: HashMap<ActorId, Position>,
    spawn_points: HashMap<String, Position>,
    returns: ReturnPositionStore<ActorId>,
    snapshots: HashSet<ActorId>,
    teleports: DeferredQueue<ActorId, Position>,
    pub messages: Vec<String>,
    next_entity: u32,
}

impl ReplayWorld {
    pub fn new(zones: &[ZoneBox]) -> Self {
        Self {
            ready: false,
            positions: HashMap::new(),
            spawn_points: zones
                .iter()
                .map(|z| (z.id.to_lowercase(), z.spawn_point()))
                .collect(),
            returns: ReturnPositionStore::default(),
            snapshots: HashSet::new(),
            teleports: DeferredQueue::new("teleport"),
            messages: Vec::new(),
            next_entity: 0,
        }
    }

    pub fn set_position(&mut self, actor: ActorId, position: Position) {
        self.positions.insert(actor, position);
    }

    pub fn position(&self, actor: ActorId) -> Option<Position> {
        self.positions.get(&actor).copied()
    }

    pub fn pending_teleports(&self) -> usize {
        self.teleports.len()
    }

    pub fn stored_returns(&self) -> usize {
        self.returns.len()
    }

    /// Apply queued teleports once the world can move actors.
    pub fn flush_teleports(&mut self, now: DateTime<Utc>) {
        let ready = self.ready;
        let positions = &mut self.positions;
        let summary = self.teleports.process(now, |actor, destination| {
            if !ready {
                return Attempt::Retry;
            }
            positions.insert(*actor, *destination);
            tracing::debug!(actor = %actor, x = destination.x, z = destination.z, "Teleported");
            Attempt::Done
        });
        if summary.done > 0 {
            tracing::debug!(done = summary.done, waiting = summary.retried, "Flushed teleports");
        }
    }

    fn next_handles(&mut self, count: u32) -> Vec<EntityHandle> {
        (0..count)
            .map(|_| {
                self.next_entity += 1;
                EntityHandle::new(self.next_entity, 1)
            })
            .collect()
    }

    fn say(&mut self, text: String) {
        tracing::info!("{}", text);
        self.messages.push(text);
    }
}

/// Register the handlers this simulated world can perform. Actions without
/// a handler here are reported as skipped.
pub fn install_handlers(pipeline: &mut LifecyclePipeline<ReplayWorld>) {
    pipeline.register_fn(LifecycleAction::CaptureReturnPosition, |ctx| {
        let Some(position) = ctx.world.position(ctx.actor) else {
            return Err(ActionError::failed("actor position unknown"));
        };
        if !ctx.world.returns.capture(ctx.actor, position) && !ctx.world.returns.contains(&ctx.actor) {
            return Err(ActionError::failed("position not readable yet"));
        }
        Ok(())
    });

    pipeline.register_fn(LifecycleAction::SnapshotSave, |ctx| {
        ctx.world.snapshots.insert(ctx.actor);
        Ok(())
    });

    pipeline.register_fn(LifecycleAction::TeleportEnter, |ctx| {
        let Some(&spawn) = ctx.world.spawn_points.get(&ctx.zone_id.to_lowercase()) else {
            return Err(ActionError::skipped("zone has no spawn point"));
        };
        ctx.world.teleports.push(ctx.actor, spawn, ctx.timestamp);
        Ok(())
    });

    pipeline.register_fn(LifecycleAction::GlowSpawn, |ctx| {
        if !ctx.is_alone() {
            return Err(ActionError::skipped("zone already lit"));
        }
        let handles = ctx.world.next_handles(GLOW_MARKERS);
        let origin = ctx
            .world
            .spawn_points
            .get(&ctx.zone_id.to_lowercase())
            .copied()
            .unwrap_or_default();
        let metadata = SpawnMetadata {
            spawned_at: ctx.timestamp,
            count: handles.len(),
            origin,
            source_name: "replay".to_string(),
        };
        ctx.registry
            .register(ctx.zone_id, GLOW_CATEGORY, &handles, Some(metadata))
            .map_err(|e| ActionError::failed(e.to_string()))
    });

    pipeline.register_fn(LifecycleAction::ZoneEnterMessage, |ctx| {
        let text = format!("actor {} entered {}", ctx.actor, ctx.zone_id);
        ctx.world.say(text);
        Ok(())
    });

    pipeline.register_fn(LifecycleAction::ZoneExitMessage, |ctx| {
        let text = format!("actor {} left {}", ctx.actor, ctx.zone_id);
        ctx.world.say(text);
        Ok(())
    });

    pipeline.register_fn(LifecycleAction::RestoreKitSnapshot, |ctx| {
        if !ctx.world.snapshots.remove(&ctx.actor) {
            return Err(ActionError::skipped("no snapshot saved"));
        }
        Ok(())
    });

    pipeline.register_fn(LifecycleAction::TeleportReturn, |ctx| {
        let Some(position) = ctx.world.returns.take(&ctx.actor) else {
            return Err(ActionError::skipped("no return position stored"));
        };
        ctx.world.teleports.push(ctx.actor, position, ctx.timestamp);
        Ok(())
    });

    pipeline.register_fn(LifecycleAction::GlowReset, |ctx| {
        if !ctx.is_alone() {
            return Err(ActionError::skipped("zone still occupied"));
        }
        let cleared = ctx.registry.clear_category(ctx.zone_id, GLOW_CATEGORY);
        tracing::debug!(zone = %ctx.zone_id, cleared = cleared.len(), "Glow cleared");
        Ok(())
    });
}

/// Border side of the simulated world: picks a visual variant per zone.
#[derive(Debug, Default)]
pub struct ReplayBorder {
    pub ready: bool,
    pub zones: Vec<String>,
    pub actor_connected: bool,
    /// Last variant chosen per zone.
    pub variants: HashMap<String, usize>,
}

impl ReplayBorder {
    pub fn new(zones: Vec<String>) -> Self {
        Self {
            zones,
            ..Default::default()
        }
    }
}

impl RebuildTarget for ReplayBorder {
    fn readiness(&mut self) -> Readiness {
        if self.ready {
            Readiness::Ready
        } else {
            Readiness::NotReady("world not loaded".to_string())
        }
    }

    fn rebuild(&mut self, ctx: &RebuildContext<'_>) -> Result<RebuildStatus, String> {
        for zone in &self.zones {
            let variant = variant_index(zone_seed(zone), ctx.rotation_offset, BORDER_VARIANTS)
                .ok_or_else(|| format!("no border variants for {}", zone))?;
            self.variants.insert(zone.clone(), variant);
        }
        tracing::debug!(
            reason = ctx.reason,
            attempt = ctx.attempt,
            zones = self.zones.len(),
            "Border variants applied"
        );

        if self.actor_connected {
            Ok(RebuildStatus::Complete)
        } else {
            Ok(RebuildStatus::NeedsFirstConnect)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;
    use zonekeeper_core::lifecycle::{Direction, PipelineRun, StepOutcome};
    use zonekeeper_core::{EntityRegistry, RegistryLimits};
    use zonekeeper_types::{LifecycleConfig, ZoneMapping};

    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    fn arena() -> ZoneBox {
        ZoneBox {
            id: "Arena".to_string(),
            min_x: 0.0,
            min_z: 0.0,
            max_x: 20.0,
            max_z: 20.0,
            spawn: Some(Position::new(10.0, 1.0, 10.0)),
        }
    }

    fn pipeline(on_enter: &[&str], on_exit: &[&str]) -> LifecyclePipeline<ReplayWorld> {
        let mut config = LifecycleConfig::default();
        config.mappings.insert(
            "arena".to_string(),
            ZoneMapping {
                on_enter: on_enter.iter().map(|s| s.to_string()).collect(),
                on_exit: on_exit.iter().map(|s| s.to_string()).collect(),
                use_global_defaults: false,
            },
        );
        let mut pipeline = LifecyclePipeline::new(Arc::new(config));
        install_handlers(&mut pipeline);
        pipeline
    }

    fn run(actor: u64, direction: Direction, others: usize, at: i64) -> PipelineRun<'static> {
        PipelineRun {
            actor: ActorId(actor),
            zone_id: "arena",
            direction,
            timestamp: t(at),
            others_in_zone: others,
        }
    }

    #[test]
    fn test_teleport_round_trip_waits_for_ready_world() {
        let registry = EntityRegistry::new(RegistryLimits::default());
        let mut pipeline = pipeline(
            &["capture_return_position", "teleport_enter"],
            &["teleport_return"],
        );
        let mut world = ReplayWorld::new(&[arena()]);
        world.set_position(ActorId(1), Position::new(50.0, 0.0, 50.0));

        let report = pipeline.execute(run(1, Direction::Enter, 0, 0), &registry, &mut world);
        assert_eq!(report.completed(), 2, "{report:?}");
        assert_eq!(world.pending_teleports(), 1);

        world.flush_teleports(t(1));
        assert_eq!(world.pending_teleports(), 1, "held while world not ready");

        world.ready = true;
        world.flush_teleports(t(2));
        assert_eq!(world.position(ActorId(1)), Some(Position::new(10.0, 1.0, 10.0)));

        pipeline.execute(run(1, Direction::Exit, 0, 3), &registry, &mut world);
        world.flush_teleports(t(4));
        assert_eq!(world.position(ActorId(1)), Some(Position::new(50.0, 0.0, 50.0)));
        assert_eq!(world.stored_returns(), 0);
    }

    #[test]
    fn test_capture_fails_for_origin_position() {
        let registry = EntityRegistry::new(RegistryLimits::default());
        let mut pipeline = pipeline(&["capture_return_position"], &["teleport_return"]);
        let mut world = ReplayWorld::new(&[arena()]);
        world.set_position(ActorId(1), Position::new(0.1, 0.0, 0.2));

        let report = pipeline.execute(run(1, Direction::Enter, 0, 0), &registry, &mut world);
        assert!(matches!(report.steps[0].outcome, StepOutcome::Failed(_)));

        let report = pipeline.execute(run(1, Direction::Exit, 0, 1), &registry, &mut world);
        assert!(matches!(report.steps[0].outcome, StepOutcome::Skipped(_)));
    }

    #[test]
    fn test_glow_follows_first_in_last_out() {
        let registry = EntityRegistry::new(RegistryLimits::default());
        let mut pipeline = pipeline(&["glow_spawn"], &["glow_reset"]);
        let mut world = ReplayWorld::new(&[arena()]);

        pipeline.execute(run(1, Direction::Enter, 0, 0), &registry, &mut world);
        pipeline.execute(run(2, Direction::Enter, 1, 1), &registry, &mut world);
        assert_eq!(registry.count("arena", GLOW_CATEGORY), GLOW_MARKERS as usize);
        let meta = registry.metadata("arena", GLOW_CATEGORY).unwrap();
        assert_eq!(meta.origin, Position::new(10.0, 1.0, 10.0));

        pipeline.execute(run(1, Direction::Exit, 1, 2), &registry, &mut world);
        assert!(registry.is_non_empty("arena", GLOW_CATEGORY));

        pipeline.execute(run(2, Direction::Exit, 0, 3), &registry, &mut world);
        assert_eq!(registry.count("arena", GLOW_CATEGORY), 0);
    }

    #[test]
    fn test_border_needs_first_connect_until_actor_connects() {
        let mut border = ReplayBorder::new(vec!["arena".to_string(), "lobby".to_string()]);
        assert!(matches!(border.readiness(), Readiness::NotReady(_)));
        border.ready = true;
        assert_eq!(border.readiness(), Readiness::Ready);

        let ctx = RebuildContext {
            reason: "startup",
            rotation_offset: 3,
            attempt: 1,
            now: t(0),
        };
        assert_eq!(border.rebuild(&ctx), Ok(RebuildStatus::NeedsFirstConnect));
        assert_eq!(border.variants.len(), 2);
        assert_eq!(
            border.variants["arena"],
            variant_index(zone_seed("arena"), 3, BORDER_VARIANTS).unwrap()
        );

        border.actor_connected = true;
        assert_eq!(border.rebuild(&ctx), Ok(RebuildStatus::Complete));
    }
}
