//! phs - port-Hamiltonian model audio processor
//!
//! Streams mono audio through a model described in the core description
//! language: the signal drives the input of one port and the output of
//! another port is written back.
//!
//! # Usage
//!
//! ```bash
//! ffmpeg -i input.wav -f f32le -ac 1 -ar 48000 - | phs model.phs | ffmpeg -f f32le -ac 1 -ar 48000 -i - output.wav
//! ```
//!
//! Logs go to stderr; set `RUST_LOG=debug` for solver details.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use phs_core::{
    audio::process_audio, config::SimulationConfig, dsl, error::Result, method::Method, model::PhsCore,
    numerics::NumericalCore, processor::PortProcessor,
};

/// Port-Hamiltonian model audio processor
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the model description file
    #[arg(value_name = "MODEL")]
    model: PathBuf,

    /// JSON configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Sample rate in Hz (overrides the configuration file)
    #[arg(short, long)]
    sample_rate: Option<f64>,

    /// Port receiving the input signal
    #[arg(short, long, default_value_t = 0)]
    input: usize,

    /// Port whose output is written
    #[arg(short, long, default_value_t = 0)]
    output: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => SimulationConfig::from_path(path)?,
        None => SimulationConfig::default(),
    };
    if let Some(fs) = args.sample_rate {
        config = config.with_sample_rate(fs);
    }
    config.validate()?;

    let ast = dsl::parse_file(&args.model)?;
    let core = PhsCore::from_ast(&ast)?;
    let method = Method::new(&core, &config)?;
    info!(
        label = method.label(),
        nx = method.nx(),
        nw = method.nw(),
        ny = method.ny(),
        np = method.np(),
        "method derived"
    );

    let mut processor = PortProcessor::new(NumericalCore::new(&method)?, args.input, args.output)?;
    let samples = process_audio(&mut processor)?;
    info!(samples, "done");

    Ok(())
}
