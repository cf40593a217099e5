//! sonar - terminal front-end for the passive combat meter.
//!
//! Captures live game traffic and prints encounter summaries as they
//! happen. Raw packet capture needs root/administrator (or an
//! equivalent capability grant on the binary).

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use sonar_core::capture::driver::list_devices;
use sonar_core::context::AppConfig;
use sonar_core::events::GameSignal;
use sonar_core::service::CaptureService;
use sonar_core::session::{EncounterSummary, PlayerCache};
use sonar_types::formatting::{format_compact, format_compact_f64, format_duration};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::filter::EnvFilter;

#[derive(Parser)]
#[command(version, about = "passive per-player combat statistics from live game traffic")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture live traffic and print encounter summaries
    Run {
        /// Emit finished encounters as JSON lines instead of tables
        #[arg(long)]
        json: bool,
        /// Override the configured idle timeout (seconds, 0 = never)
        #[arg(long)]
        reset_timer: Option<u32>,
    },
    /// List capture-capable network devices
    Devices,
    /// Show the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { json, reset_timer } => run(json, reset_timer).await,
        Commands::Devices => devices(),
        Commands::Config => config(),
    }
}

async fn run(json: bool, reset_timer: Option<u32>) -> Result<(), String> {
    let config = AppConfig::load();
    let mut settings = config.meter;
    if let Some(timer) = reset_timer {
        settings.encounter_reset_timer_seconds = timer;
    }

    let players = Arc::new(PlayerCache::new());
    let handle = CaptureService::start(settings, players).map_err(|e| e.to_string())?;
    let mut signals = handle.subscribe();
    println!("listening... press ctrl-c to stop");

    let mut last_status = Instant::now();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            signal = signals.recv() => match signal {
                Ok(GameSignal::ServerChanged) => {
                    println!("-- game server changed, stream reset --");
                }
                Ok(GameSignal::EncounterStarted(summary)) => {
                    println!("== encounter #{} started ==", summary.encounter_id);
                }
                Ok(GameSignal::EncounterUpdated(summary)) => {
                    // Live status at most once a second.
                    if last_status.elapsed() >= Duration::from_secs(1) {
                        last_status = Instant::now();
                        print_status_line(&summary);
                    }
                }
                Ok(GameSignal::EncounterEnded(summary)) => {
                    if json {
                        match serde_json::to_string(&*summary) {
                            Ok(line) => println!("{line}"),
                            Err(err) => tracing::warn!(%err, "cannot serialize summary"),
                        }
                    } else {
                        print_encounter_table(&summary);
                    }
                }
                Ok(GameSignal::HistoryChanged | GameSignal::SelectedEncounterChanged(_)) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "display fell behind the engine");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}

fn print_status_line(summary: &EncounterSummary) {
    let top = summary.attackers.first();
    let lead = top
        .map(|a| {
            format!(
                "{} {}",
                a.name.clone().unwrap_or_else(|| format!("#{:x}", a.uid)),
                format_compact_f64(a.dps)
            )
        })
        .unwrap_or_else(|| "-".to_string());
    print!(
        "\r[{}] total {} | top: {}        ",
        format_duration(summary.duration_seconds),
        format_compact(summary.total_damage),
        lead
    );
    let _ = std::io::stdout().flush();
}

fn print_encounter_table(summary: &EncounterSummary) {
    println!();
    println!(
        "== encounter #{} ended after {} ({} events) ==",
        summary.encounter_id,
        format_duration(summary.duration_seconds),
        summary.event_count
    );
    for attacker in &summary.attackers {
        let name = attacker
            .name
            .clone()
            .unwrap_or_else(|| format!("#{:x}", attacker.uid));
        let spec = attacker.spec_name.as_deref().unwrap_or("?");
        println!(
            "  {name:<20} {spec:<12} dmg {:>10}  dps {:>8}  heal {:>10}  hits {:>5}  crits {:>5}",
            format_compact(attacker.total_damage),
            format_compact_f64(attacker.dps),
            format_compact(attacker.healing_done),
            attacker.damage_count,
            attacker.crit_count,
        );
    }
}

fn devices() -> Result<(), String> {
    let devices = list_devices().map_err(|e| e.to_string())?;
    for (name, desc, eligible) in devices {
        let marker = if eligible { "*" } else { " " };
        println!("{marker} {name}  {}", desc.unwrap_or_default());
    }
    println!("(* = opened for capture by `sonar run`)");
    Ok(())
}

fn config() -> Result<(), String> {
    let config = AppConfig::load();
    if let Some(path) = AppConfig::path() {
        println!("config file: {}", path.display());
    }
    println!(
        "encounter_reset_timer_seconds = {}",
        config.meter.encounter_reset_timer_seconds
    );
    println!(
        "max_encounter_history = {}",
        config.meter.max_encounter_history
    );
    Ok(())
}
