//! zonekeeper-validate - Check a `zonekeeper.toml` before deploying it.
//!
//! Prints the clamped timings, configuration warnings, and the action list
//! every mapped zone will actually run.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::filter::EnvFilter;
use zonekeeper_core::config::{config_warnings, default_config_path, load_config, save_config};
use zonekeeper_core::lifecycle::{Direction, ResolvedActions, resolve_actions};
use zonekeeper_types::formatting::format_secs;
use zonekeeper_types::{WILDCARD_ZONE, ZoneKeeperConfig};

#[derive(Parser)]
#[command(version, about = "Validate ZoneKeeper configuration")]
struct Cli {
    /// Config file (defaults to the per-user config location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the file and report timings, limits and warnings
    Check {
        /// Exit non-zero when there are warnings
        #[arg(long)]
        strict: bool,
    },
    /// Show the enter/exit actions for one zone
    Resolve {
        #[arg(short, long)]
        zone: String,
        #[arg(long)]
        json: bool,
    },
    /// Write a config file with default values
    Init {
        #[arg(long)]
        force: bool,
    },
}

fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();

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
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let Some(path) = cli.config.or_else(default_config_path) else {
        tracing::error!("No config path given and no default config directory available");
        std::process::exit(1);
    };

    let result = match cli.command.unwrap_or(Commands::Check { strict: false }) {
        Commands::Check { strict } => check(&path, strict),
        Commands::Resolve { zone, json } => resolve(&path, &zone, json),
        Commands::Init { force } => init(&path, force),
    };

    if let Err(e) = result {
        tracing::error!(path = %path.display(), "{}", e);
        std::process::exit(1);
    }
}

fn load(path: &Path) -> Result<ZoneKeeperConfig, String> {
    load_config(path).map_err(|e| e.to_string())
}

fn check(path: &Path, strict: bool) -> Result<(), String> {
    let config = load(path)?;
    let detection = &config.detection;
    let border = &config.border;

    println!("{}", path.display());
    println!("detection");
    println!("  enter confirm      {}", format_secs(detection.effective_enter_confirm_secs()));
    println!("  exit confirm       {}", format_secs(detection.effective_exit_confirm_secs()));
    println!("  transition cooldown {}", format_secs(detection.effective_transition_cooldown_secs()));
    println!("  check interval     {}ms", detection.effective_check_interval_ms());
    println!("registry");
    println!("  per zone           {}", config.registry.max_entities_per_zone.max(1));
    println!("  per category       {}", config.registry.max_entities_per_category.max(1));
    println!("border");
    println!("  request cooldown   {}", format_secs(border.effective_rebuild_cooldown_secs() as f64));
    if border.auto_rotate {
        println!(
            "  auto rotate        every {}",
            format_secs((border.effective_rotate_interval_minutes() * 60) as f64)
        );
    } else {
        println!("  auto rotate        off");
    }

    println!("lifecycle {}", if config.lifecycle.enabled { "enabled" } else { "disabled" });
    let mut zones: Vec<&str> = config.lifecycle.mappings.keys().map(String::as_str).collect();
    if zones.is_empty() {
        zones.push(WILDCARD_ZONE);
    }
    for zone in zones {
        for direction in [Direction::Enter, Direction::Exit] {
            print_resolved(zone, &resolve_actions(&config.lifecycle, zone, direction));
        }
    }

    let warnings = config_warnings(&config);
    for warning in &warnings {
        println!("warning: {}", warning);
    }
    if warnings.is_empty() {
        println!("ok");
    }

    if strict && !warnings.is_empty() {
        return Err(format!("{} warning(s)", warnings.len()));
    }
    Ok(())
}

fn print_resolved(zone: &str, resolved: &ResolvedActions) {
    let tokens: Vec<&str> = resolved.actions.iter().map(|a| a.token()).collect();
    println!(
        "  [{}] {} ({:?}): {}",
        zone,
        resolved.direction,
        resolved.source,
        tokens.join(", ")
    );
    for warning in &resolved.warnings {
        println!(
            "    {} requires {}{}",
            warning.action,
            warning.requires,
            if warning.misordered { " (scheduled later)" } else { " (missing)" }
        );
    }
}

fn resolve(path: &Path, zone: &str, json: bool) -> Result<(), String> {
    let config = load(path)?;
    let enter = resolve_actions(&config.lifecycle, zone, Direction::Enter);
    let exit = resolve_actions(&config.lifecycle, zone, Direction::Exit);

    if json {
        let out = serde_json::json!({ "zone": zone, "enter": enter, "exit": exit });
        let text = serde_json::to_string_pretty(&out).map_err(|e| e.to_string())?;
        println!("{}", text);
    } else {
        print_resolved(zone, &enter);
        print_resolved(zone, &exit);
    }
    Ok(())
}

fn init(path: &Path, force: bool) -> Result<(), String> {
    if path.exists() && !force {
        return Err("file exists (use --force to overwrite)".to_string());
    }
    save_config(path, &ZoneKeeperConfig::default()).map_err(|e| e.to_string())?;
    println!("wrote {}", path.display());
    Ok(())
}
