//! zonekeeper-replay - Run a recorded sample trace through the zone tracker.
//!
//! Prints every signal as one JSON line on stdout, then a summary object.
//! Logs go to stderr, or to the file named by `ZONEKEEPER_LOG_PATH`.

mod trace;
mod world;

use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tracing_subscriber::filter::EnvFilter;
use zonekeeper_core::{ActorId, ZoneKeeperConfig, ZoneSignal, ZoneTickDriver, load_config};
use zonekeeper_types::formatting::format_usage;

use trace::{BoxResolver, ZoneBox, read_frames};
use world::{ReplayBorder, ReplayWorld, install_handlers};

#[derive(Parser)]
#[command(version, about = "Replay a zone sample trace")]
struct Cli {
    /// Trace file (JSON lines), or `-` for stdin
    trace: PathBuf,

    /// Config file; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON array of zone boxes used to resolve positions
    #[arg(short, long)]
    zones: Option<PathBuf>,

    /// Also print per-step pipeline reports
    #[arg(long)]
    steps: bool,
}

fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();

    // Append to ZONEKEEPER_LOG_PATH when set so stdout stays pure JSON
    if let Ok(path) = std::env::var("ZONEKEEPER_LOG_PATH")
        && let Ok(file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
    {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_ansi(false)
            .with_writer(file)
            .init();
        return;
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        tracing::error!(trace = %cli.trace.display(), "{}", e);
        std::process::exit(1);
    }
}

#[derive(Serialize)]
struct Summary {
    frames: usize,
    occupancy: std::collections::BTreeMap<String, usize>,
    registry: Vec<zonekeeper_core::registry::CategoryCount>,
    scheduler: zonekeeper_core::border::SchedulerStats,
    rotation_offset: u64,
    border_variants: std::collections::BTreeMap<String, usize>,
    pending_teleports: usize,
    stored_returns: usize,
    messages: usize,
    released_on_shutdown: usize,
}

fn run(cli: &Cli) -> Result<(), String> {
    let config = match &cli.config {
        Some(path) => load_config(path).map_err(|e| e.to_string())?,
        None => ZoneKeeperConfig::default(),
    };

    let zones: Vec<ZoneBox> = match &cli.zones {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| format!("{}: {}", path.display(), e))?;
            serde_json::from_str(&text).map_err(|e| format!("{}: {}", path.display(), e))?
        }
        None => Vec::new(),
    };

    let frames = if cli.trace.as_os_str() == "-" {
        read_frames(io::stdin().lock())?
    } else {
        let file = File::open(&cli.trace).map_err(|e| e.to_string())?;
        read_frames(BufReader::new(file))?
    };

    let mut border_zones: Vec<String> = zones.iter().map(|z| z.id.clone()).collect();
    for frame in &frames {
        for zone in frame.actors.iter().filter_map(|a| a.zone.as_ref()) {
            if !border_zones.iter().any(|z| z.eq_ignore_ascii_case(zone)) {
                border_zones.push(zone.clone());
            }
        }
    }

    let mut world = ReplayWorld::new(&zones);
    let mut border = ReplayBorder::new(border_zones);
    let resolver = BoxResolver { zones };

    let mut driver: ZoneTickDriver<ReplayWorld> = ZoneTickDriver::new(Arc::new(config));
    install_handlers(driver.pipeline_mut());
    driver.add_signal_handler(|signal: &ZoneSignal| {
        tracing::debug!(signal = ?signal, "Signal");
    });

    tracing::info!(frames = frames.len(), zones = resolver.zones.len(), "Replay starting");

    for frame in &frames {
        let now = frame.timestamp()?;

        if let Some(ready) = frame.world_ready {
            world.ready = ready;
            border.ready = ready;
        }
        for actor in &frame.actors {
            if let Some(pos) = actor.pos {
                world.set_position(ActorId(actor.id), pos);
            }
        }
        for id in &frame.connect {
            tracing::debug!(actor = id, "Actor connected");
            border.actor_connected = true;
            driver.on_actor_connected(now);
        }
        if frame.rotate {
            let offset = driver.scheduler_mut().rotate_now(now);
            tracing::info!(offset, "Manual border rotation");
        }

        let observed: Vec<_> = frame.actors.iter().map(|a| a.observe(&resolver)).collect();
        let report = driver.tick_observed(now, observed, &mut world, &mut border);
        world.flush_teleports(now);

        for signal in &report.signals {
            println!("{}", serde_json::to_string(signal).map_err(|e| e.to_string())?);
        }
        if cli.steps {
            for execution in &report.executions {
                println!("{}", serde_json::to_string(execution).map_err(|e| e.to_string())?);
            }
        }
    }

    let limits = driver.registry().limits();
    for zone in driver.registry().spawned_zones() {
        let used = driver.registry().zone_total(&zone);
        tracing::info!(zone = %zone, usage = %format_usage(used, limits.max_per_zone), "Registry usage");
    }

    let occupancy = driver.occupancy_snapshot();
    let registry = driver.registry().snapshot();
    let released = driver.shutdown();

    let summary = Summary {
        frames: frames.len(),
        occupancy,
        registry,
        scheduler: driver.scheduler().stats(),
        rotation_offset: driver.scheduler().rotation_offset(),
        border_variants: border.variants.into_iter().collect(),
        pending_teleports: world.pending_teleports(),
        stored_returns: world.stored_returns(),
        messages: world.messages.len(),
        released_on_shutdown: released.len(),
    };
    println!("{}", serde_json::to_string(&summary).map_err(|e| e.to_string())?);
    Ok(())
}
