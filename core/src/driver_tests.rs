//! Tests for the tick driver

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use zonekeeper_types::{ZoneKeeperConfig, ZoneMapping};

use crate::border::{RebuildContext, RebuildFns, RebuildStatus, RebuildTarget};
use crate::driver::{ActorSample, ZoneTickDriver};
use crate::events::{ExitCause, ZoneSignal};
use crate::ids::{ActorId, EntityHandle};
use crate::lifecycle::{ActionError, LifecycleAction};
use crate::spatial::Position;
use crate::test_support::{at_secs, capture_logs};

#[derive(Default)]
struct World {
    log: Vec<String>,
    next_entity: u32,
}

fn ready_border() -> impl RebuildTarget {
    RebuildFns::new(|| true, |_: &RebuildContext<'_>| Ok(RebuildStatus::Complete))
}

fn config() -> ZoneKeeperConfig {
    let mut config = ZoneKeeperConfig::default();
    config.detection.enter_confirm_secs = 0.35;
    config.detection.exit_confirm_secs = 0.75;
    config.detection.transition_cooldown_secs = 0.0;
    config.detection.check_interval_ms = 0;
    config.border.auto_rotate = false;
    config.lifecycle.mappings.insert(
        "*".into(),
        ZoneMapping {
            on_enter: vec!["message".into(), "glow".into()],
            on_exit: vec!["message".into(), "glow".into()],
            use_global_defaults: false,
        },
    );
    config
}

/// Driver whose handlers record `enter:<zone>:<actor>` / `exit:<zone>:<actor>`
/// and spawn or clear a glow entity per zone.
fn driver(config: ZoneKeeperConfig) -> ZoneTickDriver<World> {
    let mut driver: ZoneTickDriver<World> = ZoneTickDriver::new(Arc::new(config));
    let pipeline = driver.pipeline_mut();

    pipeline.register_fn(LifecycleAction::ZoneEnterMessage, |ctx| {
        ctx.world.log.push(format!("enter:{}:{}", ctx.zone_id, ctx.actor));
        Ok(())
    });
    pipeline.register_fn(LifecycleAction::ZoneExitMessage, |ctx| {
        ctx.world.log.push(format!("exit:{}:{}", ctx.zone_id, ctx.actor));
        Ok(())
    });
    pipeline.register_fn(LifecycleAction::GlowSpawn, |ctx| {
        if !ctx.is_alone() {
            return Err(ActionError::skipped("zone already lit"));
        }
        ctx.world.next_entity += 1;
        let handle = EntityHandle::new(ctx.world.next_entity, 1);
        ctx.registry
            .register(ctx.zone_id, "glow", &[handle], None)
            .map_err(|e| ActionError::failed(e.to_string()))
    });
    pipeline.register_fn(LifecycleAction::GlowReset, |ctx| {
        if ctx.others_in_zone > 0 {
            return Err(ActionError::skipped("zone still occupied"));
        }
        ctx.registry.clear_category(ctx.zone_id, "glow");
        Ok(())
    });
    driver
}

fn obs(actor: u64, zone: Option<&str>) -> (ActorId, Option<String>) {
    (ActorId(actor), zone.map(str::to_string))
}

// ─────────────────────────────────────────────────────────────────────────────
// Transitions through the pipelines
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_confirmed_enter_runs_enter_pipeline_once() {
    let mut driver = driver(config());
    let mut world = World::default();
    let mut border = ready_border();

    let mut signals = Vec::new();
    for step in 0..=8 {
        let report = driver.tick_observed(
            at_secs(step as f64 * 0.05),
            [obs(1, Some("arena1"))],
            &mut world,
            &mut border,
        );
        signals.extend(report.signals);
    }

    assert_eq!(world.log, vec!["enter:arena1:1"]);
    assert_eq!(signals.len(), 1);
    assert!(matches!(
        &signals[0],
        ZoneSignal::ActorEntered { zone_id, forced: false, .. } if zone_id == "arena1"
    ));
    assert_eq!(driver.registry().count("arena1", "glow"), 1);
}

#[test]
fn test_direct_move_runs_exit_before_enter() {
    let mut driver = driver(config());
    let mut world = World::default();
    let mut border = ready_border();

    driver.tick_observed(at_secs(0.0), [obs(1, Some("arena1"))], &mut world, &mut border);
    driver.tick_observed(at_secs(1.0), [obs(1, Some("arena1"))], &mut world, &mut border);
    driver.tick_observed(at_secs(2.0), [obs(1, Some("arena2"))], &mut world, &mut border);
    let report = driver.tick_observed(at_secs(3.0), [obs(1, Some("arena2"))], &mut world, &mut border);

    assert_eq!(world.log, vec!["enter:arena1:1", "exit:arena1:1", "enter:arena2:1"]);
    assert!(matches!(report.signals[0], ZoneSignal::ActorExited { cause: ExitCause::Transition, .. }));
    assert!(matches!(report.signals[1], ZoneSignal::ActorEntered { .. }));

    // Glow moved with the only occupant
    assert_eq!(driver.registry().count("arena1", "glow"), 0);
    assert_eq!(driver.registry().count("arena2", "glow"), 1);
}

#[test]
fn test_glow_spawns_for_first_and_resets_after_last() {
    let mut driver = driver(config());
    let mut world = World::default();
    let mut border = ready_border();

    for t in [0.0, 1.0] {
        driver.tick_observed(
            at_secs(t),
            [obs(1, Some("arena1")), obs(2, Some("arena1"))],
            &mut world,
            &mut border,
        );
    }
    assert_eq!(driver.occupancy("arena1"), 2);
    assert_eq!(driver.registry().count("arena1", "glow"), 1);

    // Actor 1 leaves; actor 2 still inside keeps the glow
    for t in [2.0, 3.0] {
        driver.tick_observed(
            at_secs(t),
            [obs(1, None), obs(2, Some("arena1"))],
            &mut world,
            &mut border,
        );
    }
    assert_eq!(driver.registry().count("arena1", "glow"), 1);

    for t in [4.0, 5.0] {
        driver.tick_observed(at_secs(t), [obs(1, None), obs(2, None)], &mut world, &mut border);
    }
    assert_eq!(driver.registry().count("arena1", "glow"), 0);
    assert_eq!(driver.occupancy("arena1"), 0);
}

#[test]
fn test_stale_actor_exits_through_pipeline_once() {
    let mut driver = driver(config());
    let mut world = World::default();
    let mut border = ready_border();

    driver.tick_observed(at_secs(0.0), [obs(1, Some("Z"))], &mut world, &mut border);
    driver.tick_observed(at_secs(1.0), [obs(1, Some("Z"))], &mut world, &mut border);

    let report = driver.tick_observed(at_secs(2.0), [], &mut world, &mut border);
    assert_eq!(report.signals.len(), 1);
    assert!(matches!(
        &report.signals[0],
        ZoneSignal::ActorExited { cause: ExitCause::Stale, zone_id, .. } if zone_id == "Z"
    ));

    let again = driver.tick_observed(at_secs(3.0), [], &mut world, &mut border);
    assert!(again.signals.is_empty());
    assert_eq!(world.log, vec!["enter:Z:1", "exit:Z:1"]);
    assert_eq!(driver.registry().count("Z", "glow"), 0);
}

#[test]
fn test_samples_resolved_through_resolver() {
    let mut driver = driver(config());
    let mut world = World::default();
    let mut border = ready_border();
    let resolver = |p: Position| (p.x > 100.0).then(|| "east".to_string());

    let sample = |x: f32| [ActorSample {
        actor: ActorId(4),
        position: Position::new(x, 0.0, 10.0),
    }];

    driver.tick(at_secs(0.0), &sample(150.0), &resolver, &mut world, &mut border);
    driver.tick(at_secs(0.5), &sample(160.0), &resolver, &mut world, &mut border);
    assert_eq!(driver.detector().current_zone(ActorId(4)), Some("east"));

    driver.tick(at_secs(1.0), &sample(10.0), &resolver, &mut world, &mut border);
    driver.tick(at_secs(2.0), &sample(10.0), &resolver, &mut world, &mut border);
    assert_eq!(driver.detector().current_zone(ActorId(4)), None);
    assert_eq!(world.log, vec!["enter:east:4", "exit:east:4"]);
}

#[test]
fn test_check_interval_skips_detection() {
    let mut cfg = config();
    cfg.detection.check_interval_ms = 100;
    let mut driver = driver(cfg);
    let mut world = World::default();
    let mut border = ready_border();

    assert!(driver.tick_observed(at_secs(0.0), [obs(1, Some("a"))], &mut world, &mut border).detection_ran);
    assert!(!driver.tick_observed(at_secs(0.05), [obs(1, Some("a"))], &mut world, &mut border).detection_ran);
    assert!(driver.tick_observed(at_secs(0.10), [obs(1, Some("a"))], &mut world, &mut border).detection_ran);
}

// ─────────────────────────────────────────────────────────────────────────────
// Forced transitions, signals, borders, config
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_force_enter_and_exit() {
    let mut driver = driver(config());
    let mut world = World::default();

    let entered = driver.force_enter(ActorId(9), "arena1", at_secs(0.0), &mut world);
    assert!(matches!(entered.signals[0], ZoneSignal::ActorEntered { forced: true, .. }));

    let moved = driver.force_enter(ActorId(9), "arena2", at_secs(0.1), &mut world);
    assert!(matches!(moved.signals[0], ZoneSignal::ActorExited { cause: ExitCause::Forced, .. }));
    assert_eq!(moved.signals.len(), 2);

    let exited = driver.force_exit(ActorId(9), at_secs(0.2), &mut world);
    assert_eq!(exited.signals.len(), 1);
    assert!(driver.force_exit(ActorId(9), at_secs(0.3), &mut world).signals.is_empty());

    assert_eq!(
        world.log,
        vec!["enter:arena1:9", "exit:arena1:9", "enter:arena2:9", "exit:arena2:9"]
    );
}

#[test]
fn test_signal_handlers_see_every_signal() {
    let mut driver = driver(config());
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    driver.add_signal_handler(move |signal: &ZoneSignal| sink.borrow_mut().push(signal.actor()));

    let mut world = World::default();
    driver.force_enter(ActorId(1), "a", at_secs(0.0), &mut world);
    driver.force_exit(ActorId(1), at_secs(1.0), &mut world);

    assert_eq!(*seen.borrow(), vec![Some(ActorId(1)), Some(ActorId(1))]);
}

#[test]
fn test_config_reload_requests_rebuild() {
    let mut driver = driver(config());
    let mut world = World::default();
    let rebuilds = Rc::new(RefCell::new(Vec::new()));
    let record = Rc::clone(&rebuilds);
    let mut border = RebuildFns::new(
        || true,
        move |ctx: &RebuildContext<'_>| {
            record.borrow_mut().push(ctx.reason.to_string());
            Ok(RebuildStatus::Complete)
        },
    );

    let mut next = config();
    next.detection.enter_confirm_secs = 5.0;
    driver.apply_config(Arc::new(next), at_secs(0.0));
    assert_eq!(driver.detector().timings().enter_confirm, chrono::Duration::seconds(5));

    let report = driver.tick_observed(at_secs(0.1), [], &mut world, &mut border);
    assert_eq!(*rebuilds.borrow(), vec!["config-reload"]);
    assert!(matches!(
        &report.signals[0],
        ZoneSignal::BorderRebuilt { reason, .. } if reason == "config-reload"
    ));
}

#[test]
fn test_failed_rebuild_reported_and_retried() {
    let mut driver = driver(config());
    let mut world = World::default();
    let mut attempts = 0;
    let mut border = RebuildFns::new(
        || true,
        move |_: &RebuildContext<'_>| {
            attempts += 1;
            if attempts == 1 { Err("no markers".to_string()) } else { Ok(RebuildStatus::Complete) }
        },
    );

    driver.scheduler_mut().request_rebuild("startup", true, at_secs(0.0));
    let first = driver.tick_observed(at_secs(0.1), [], &mut world, &mut border);
    assert!(matches!(first.signals[0], ZoneSignal::BorderRebuildFailed { .. }));

    let second = driver.tick_observed(at_secs(0.2), [], &mut world, &mut border);
    assert!(matches!(second.signals[0], ZoneSignal::BorderRebuilt { .. }));
}

#[test]
fn test_shutdown_returns_tracked_entities() {
    let mut driver = driver(config());
    let mut world = World::default();
    driver.force_enter(ActorId(1), "a", at_secs(0.0), &mut world);
    driver.force_enter(ActorId(2), "b", at_secs(0.0), &mut world);

    assert_eq!(driver.shutdown().len(), 2);
    assert_eq!(driver.detector().tracked_count(), 0);
    assert_eq!(driver.registry().tracked_handles(), 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Host callback panics
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_panicking_signal_handler_does_not_escape_tick() {
    let mut driver = driver(config());
    let mut world = World::default();
    let mut border = ready_border();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    driver.add_signal_handler(|_: &ZoneSignal| panic!("handler boom"));
    driver.add_signal_handler(move |signal: &ZoneSignal| sink.borrow_mut().push(signal.actor()));

    driver.tick_observed(at_secs(0.0), [obs(1, Some("arena1"))], &mut world, &mut border);
    let (report, logs) = capture_logs(|| {
        driver.tick_observed(at_secs(1.0), [obs(1, Some("arena1"))], &mut world, &mut border)
    });

    assert_eq!(report.signals.len(), 1);
    assert_eq!(*seen.borrow(), vec![Some(ActorId(1))]);
    assert_eq!(world.log, vec!["enter:arena1:1"]);
    assert!(logs.contains("Signal handler panicked"), "{logs}");
    assert!(logs.contains("handler boom"), "{logs}");
}

#[test]
fn test_panicking_resolver_holds_committed_zone() {
    let mut driver = driver(config());
    let mut world = World::default();
    let mut border = ready_border();
    let broken = Cell::new(false);
    let resolver = |_: Position| -> Option<String> {
        if broken.get() {
            panic!("resolver boom");
        }
        Some("east".to_string())
    };
    let sample = [
        ActorSample { actor: ActorId(4), position: Position::new(150.0, 0.0, 10.0) },
        ActorSample { actor: ActorId(5), position: Position::new(150.0, 0.0, 10.0) },
    ];

    driver.tick(at_secs(0.0), &sample[..1], &resolver, &mut world, &mut border);
    driver.tick(at_secs(1.0), &sample[..1], &resolver, &mut world, &mut border);
    assert_eq!(driver.detector().current_zone(ActorId(4)), Some("east"));

    broken.set(true);
    let (reports, logs) = capture_logs(|| {
        [2.0, 3.0, 4.0].map(|t| driver.tick(at_secs(t), &sample, &resolver, &mut world, &mut border))
    });

    // Neither exited nor swept; the untracked actor simply stays outside
    assert!(reports.iter().all(|r| r.signals.is_empty()));
    assert_eq!(driver.detector().current_zone(ActorId(4)), Some("east"));
    assert_eq!(driver.detector().current_zone(ActorId(5)), None);
    assert_eq!(world.log, vec!["enter:east:4"]);
    assert!(logs.contains("Zone resolver panicked"), "{logs}");
    assert!(logs.contains("resolver boom"), "{logs}");
}
