//! paraeq CLI Application
//!
//! Offline front end for the equalizer: plot the response of a parameter
//! set, run raw audio through it, or write a starting configuration.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use paraeq_core::{EqConfig, ParameterStore, PresetManager, SnapshotSource};
use paraeq_infra::split;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "paraeq")]
#[command(author, version, about = "Seven-stage stereo parametric equalizer", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (TOML); built-in defaults when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Where the parameter values come from
#[derive(clap::Args)]
struct ParamArgs {
    /// Load a preset by name before applying `--set`
    #[arg(long)]
    preset: Option<String>,

    /// Directory holding presets
    #[arg(long, default_value = "presets")]
    preset_dir: PathBuf,

    /// Parameter override, e.g. `--set "MidPeak Gain=4.5"` (repeatable)
    #[arg(long = "set", value_name = "ID=VALUE")]
    overrides: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the magnitude response as JSON
    Response {
        #[command(flatten)]
        params: ParamArgs,

        /// Number of log-spaced points between 20 Hz and 20 kHz
        #[arg(long, default_value_t = 64)]
        points: usize,

        /// Pretty-print the output JSON
        #[arg(short, long)]
        pretty: bool,
    },

    /// Run a raw little-endian f32 interleaved file through the equalizer
    Process {
        #[command(flatten)]
        params: ParamArgs,

        /// Input file
        #[arg(short, long)]
        input: PathBuf,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Samples per frame in the input
        #[arg(long, default_value_t = 2)]
        channels: usize,
    },

    /// Save the current parameters as a preset
    SavePreset {
        #[command(flatten)]
        params: ParamArgs,

        /// Preset name
        name: String,
    },

    /// Write a configuration file with every default filled in
    InitConfig {
        /// Destination path
        path: PathBuf,
    },
}

#[derive(Serialize)]
struct ResponsePoint {
    freq: f64,
    db: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => EqConfig::load_from_file(path)
            .await
            .with_context(|| format!("loading {}", path.display()))?,
        None => EqConfig::default(),
    };
    config.validate()?;

    match cli.command {
        Commands::Response { params, points, pretty } => response(&config, &params, points, pretty).await,
        Commands::Process {
            params,
            input,
            output,
            channels,
        } => process(&config, &params, &input, &output, channels).await,
        Commands::SavePreset { params, name } => {
            let store = build_store(&config, &params).await?;
            PresetManager::new(params.preset_dir.clone())
                .save_preset(&name, &store.snapshot())
                .await?;
            Ok(())
        }
        Commands::InitConfig { path } => {
            config.save_to_file(&path).await?;
            info!(path = %path.display(), "Configuration written");
            Ok(())
        }
    }
}

async fn build_store(config: &EqConfig, params: &ParamArgs) -> anyhow::Result<Arc<ParameterStore>> {
    let store = ParameterStore::new(config.layout.clone())?;

    if let Some(name) = &params.preset {
        let snapshot = PresetManager::new(params.preset_dir.clone())
            .load_preset(name)
            .await?;
        store.apply_snapshot(&snapshot);
        debug!(name, "Preset applied");
    }

    for entry in &params.overrides {
        let Some((id, value)) = entry.rsplit_once('=') else {
            bail!("expected ID=VALUE, got {entry:?}");
        };
        let value: f32 = value
            .trim()
            .parse()
            .with_context(|| format!("parsing value of {id:?}"))?;
        let stored = store.set_by_name(id.trim(), value)?;
        debug!(id, requested = value, stored, "Parameter set");
    }

    Ok(Arc::new(store))
}

fn log_spaced(points: usize) -> Vec<f64> {
    let (low, high) = (20.0_f64, 20000.0_f64);
    if points < 2 {
        return vec![low];
    }
    let ratio = (high / low).ln();
    (0..points)
        .map(|i| low * (ratio * i as f64 / (points - 1) as f64).exp())
        .collect()
}

async fn response(config: &EqConfig, params: &ParamArgs, points: usize, pretty: bool) -> anyhow::Result<()> {
    let store = build_store(config, params).await?;
    let (mut controller, mut processor) = split(store, config.engine.update_queue_capacity)?;
    processor.prepare(config.engine.sample_rate, config.engine.max_block_size)?;
    controller.update_now()?;

    let freqs = log_spaced(points);
    let curve = controller
        .response_curve(&freqs)
        .context("no coefficients were published")?;
    let points: Vec<ResponsePoint> = freqs
        .into_iter()
        .zip(curve)
        .map(|(freq, db)| ResponsePoint { freq, db })
        .collect();

    let json = if pretty {
        serde_json::to_string_pretty(&points)?
    } else {
        serde_json::to_string(&points)?
    };
    println!("{json}");
    Ok(())
}

async fn process(
    config: &EqConfig,
    params: &ParamArgs,
    input: &Path,
    output: &Path,
    channels: usize,
) -> anyhow::Result<()> {
    if channels == 0 {
        bail!("channels must be at least 1");
    }

    let bytes = tokio::fs::read(input)
        .await
        .with_context(|| format!("reading {}", input.display()))?;
    if bytes.len() % 4 != 0 {
        bail!("{} is not a whole number of f32 samples", input.display());
    }
    let mut samples: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    let store = build_store(config, params).await?;
    let (_controller, mut processor) = split(store, config.engine.update_queue_capacity)?;
    let block = config.engine.max_block_size;
    processor.prepare(config.engine.sample_rate, block)?;

    for chunk in samples.chunks_mut(block * channels) {
        processor.process_interleaved(chunk, channels)?;
    }
    processor.release();

    let out: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    tokio::fs::write(output, out)
        .await
        .with_context(|| format!("writing {}", output.display()))?;

    info!(
        frames = samples.len() / channels,
        channels,
        output = %output.display(),
        "Processed audio"
    );
    Ok(())
}
