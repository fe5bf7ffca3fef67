use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use color_eyre::Result;
use color_eyre::eyre::{Context, eyre};
use linebot::EngineConfig;
use linebot_sim::Simulation;
use linebot_sim::track::Track;
use linebot_sim::track_format::TrackFile;
use linebot_sim::world::SimOptions;
use tracing::{info, warn};

mod tui;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Drive the engine around a simulated track.
    Run(RunArgs),
    /// Print the default engine configuration as TOML.
    DumpConfig,
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Track file, or the name of a builtin track.
    #[arg(long, default_value = "oval")]
    track: String,
    /// Engine configuration (TOML); defaults apply to missing fields.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Simulated seconds before the robot is stopped.
    #[arg(long, default_value_t = 120.0)]
    seconds: f64,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Sensor noise amplitude, in intensity units.
    #[arg(long, default_value_t = 0)]
    noise: i32,
    /// Leave the calibration prompts unanswered and keep default thresholds.
    #[arg(long)]
    skip_calibration: bool,
    /// Write one JSON line per frequent tick to this file.
    #[arg(long)]
    telemetry: Option<PathBuf>,
    /// Show a live view instead of logging.
    #[arg(long)]
    tui: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::DumpConfig => {
            color_eyre::install()?;
            let text = toml::to_string_pretty(&EngineConfig::default())
                .wrap_err("failed to serialize config")?;
            print!("{text}");
            Ok(())
        }
        Commands::Run(args) => {
            if !args.tui {
                color_eyre::install()?;
                tracing_subscriber::fmt()
                    .with_env_filter(
                        tracing_subscriber::EnvFilter::try_from_default_env()
                            .unwrap_or_else(|_| "linebot=info,linebot_sim=info".into()),
                    )
                    .init();
            }
            run(args)
        }
    }
}

fn run(args: RunArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => EngineConfig::default(),
    };
    let track = load_track(&args.track)?;
    if !args.seconds.is_finite() || args.seconds <= 0.0 {
        return Err(eyre!("--seconds must be positive, got {}", args.seconds));
    }
    let limit = Duration::from_secs_f64(args.seconds);
    let options = SimOptions {
        seed: args.seed,
        noise: args.noise,
        ..SimOptions::default()
    };

    let mut sim = Simulation::new(config, track, options)?;
    if let Some(path) = &args.telemetry {
        let file = File::create(path)
            .wrap_err_with(|| format!("failed to create {}", path.display()))?;
        sim = sim.with_telemetry(Box::new(BufWriter::new(file)) as Box<dyn Write>);
    }
    let outcome = if args.skip_calibration {
        sim.skip_calibration()
    } else {
        sim.calibrate()
    };
    info!(?outcome, "calibration done");

    let result = if args.tui {
        let mut sim = tui::run(sim, limit)?;
        if sim.finished().is_none() {
            sim.stop(linebot::StopReason::Cancelled)?;
        }
        sim.finished().cloned()
    } else {
        Some(sim.run(limit)?)
    };

    match result {
        Some(Ok(summary)) => {
            let json = serde_json::to_string_pretty(&summary)
                .wrap_err("failed to serialize summary")?;
            println!("{json}");
            Ok(())
        }
        Some(Err(error)) => {
            warn!(%error, "robot halted");
            Err(error).wrap_err("the robot could not finish the run")
        }
        None => Ok(()),
    }
}

fn load_config(path: &Path) -> Result<EngineConfig> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read {}", path.display()))?;
    let config: EngineConfig = toml::from_str(&text)
        .wrap_err_with(|| format!("failed to parse {}", path.display()))?;
    config.validate().wrap_err_with(|| format!("invalid config in {}", path.display()))?;
    Ok(config)
}

/// A path to a TOML file, or else the name of a builtin track.
fn load_track(name: &str) -> Result<Track> {
    let path = Path::new(name);
    let file = if path.exists() {
        TrackFile::load(path)
    } else {
        TrackFile::builtin(name)
    }
    .map_err(|e| eyre!(e))?;
    Ok(Track::from_file(&file))
}
