//! Tape Render: offline renderer and measurement tool for the tape machine.
//!
//! Renders WAV files through `TapeMachine`, generates test tones, reports
//! harmonic levels and prints the designed loss filter response.

mod analysis;
mod config;
mod wav;

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use tapesim_dsp::TapeMachine;
use tapesim_dsp::loss_filter::{LOSS_FILTER_ORDER, LossFilterDesigner, loss_magnitude};
use tapesim_dsp::oversampler::OVERSAMPLE_FACTOR;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use analysis::HarmonicReport;
use config::MachineArgs;
use wav::Audio;

#[derive(Parser)]
#[command(name = "tape-render")]
#[command(version, about = "Reel-to-reel tape machine renderer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a WAV file through the tape machine
    Render(RenderArgs),

    /// Render a sine tone through the tape machine
    Tone(ToneArgs),

    /// Report fundamental and harmonic levels of a taped sine
    Harmonics(HarmonicsArgs),

    /// Print the loss filter's magnitude response
    LossResponse(LossResponseArgs),
}

#[derive(Args)]
struct RenderArgs {
    /// Input WAV file
    #[arg(short, long)]
    input: PathBuf,

    /// Output WAV file (24-bit, same channel count)
    #[arg(short, long)]
    output: PathBuf,

    #[arg(long, default_value_t = 512)]
    block_size: usize,

    #[command(flatten)]
    machine: MachineArgs,
}

#[derive(Args)]
struct ToneArgs {
    /// Output WAV file (mono, 24-bit)
    #[arg(short, long)]
    output: PathBuf,

    #[command(flatten)]
    tone: ToneSpec,

    #[command(flatten)]
    machine: MachineArgs,
}

#[derive(Args)]
struct HarmonicsArgs {
    #[command(flatten)]
    tone: ToneSpec,

    /// Exit with an error if the H1-H3 margin falls below this (dB)
    #[arg(long)]
    min_margin_db: Option<f64>,

    #[command(flatten)]
    machine: MachineArgs,
}

#[derive(Args)]
struct ToneSpec {
    /// Tone frequency (Hz)
    #[arg(short, long, default_value_t = 1000.0)]
    freq: f64,

    /// Peak amplitude (1.0 = full scale)
    #[arg(short, long, default_value_t = 0.5)]
    amplitude: f64,

    /// Duration (seconds)
    #[arg(short, long, default_value_t = 1.0)]
    duration: f64,

    #[arg(long, default_value_t = 44100)]
    sample_rate: u32,

    #[arg(long, default_value_t = 512)]
    block_size: usize,
}

#[derive(Args)]
struct LossResponseArgs {
    /// Number of log-spaced frequencies, 20 Hz up to 20 kHz
    #[arg(long, default_value_t = 16)]
    points: usize,

    /// Base sample rate; the filter runs at 4x this
    #[arg(long, default_value_t = 44100)]
    sample_rate: u32,

    #[command(flatten)]
    machine: MachineArgs,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Render(args) => render(args),
        Commands::Tone(args) => tone(args),
        Commands::Harmonics(args) => harmonics(args),
        Commands::LossResponse(args) => loss_response(args),
    }
}

fn prepared_machine(
    machine: &MachineArgs,
    sample_rate: f64,
    block_size: usize,
) -> Result<TapeMachine> {
    let params = machine.resolve()?;
    let mut tm = TapeMachine::with_parameters(&params);
    tm.prepare(sample_rate, block_size)?;
    Ok(tm)
}

fn report_instability(tm: &TapeMachine) {
    let unstable = tm.unstable_samples();
    if unstable > 0 {
        warn!(unstable, "hysteresis discarded non-finite steps; output has dropouts");
    }
}

fn render(args: RenderArgs) -> Result<()> {
    let mut audio = wav::read_wav(&args.input)?;
    let sr = audio.sample_rate as f64;
    info!(
        input = %args.input.display(),
        channels = audio.channels.len(),
        frames = audio.frames(),
        sample_rate = audio.sample_rate,
        "read input"
    );

    let mut tm = prepared_machine(&args.machine, sr, args.block_size)?;
    let frames = audio.frames();
    let mut start = 0;
    while start < frames {
        let end = (start + args.block_size).min(frames);
        let mut slices: Vec<&mut [f32]> = audio
            .channels
            .iter_mut()
            .map(|ch| &mut ch[start..end])
            .collect();
        tm.process_channels(&mut slices);
        start = end;
    }
    report_instability(&tm);

    wav::write_wav(&args.output, &audio)?;
    info!(output = %args.output.display(), "written");
    Ok(())
}

fn taped_tone(spec: &ToneSpec, machine: &MachineArgs) -> Result<Vec<f32>> {
    if spec.block_size == 0 {
        bail!("block size must be at least 1");
    }
    let sr = spec.sample_rate as f64;
    let mut tm = prepared_machine(machine, sr, spec.block_size)?;
    let mut samples = analysis::sine(spec.freq, spec.amplitude, spec.duration, sr);
    analysis::run_machine(&mut tm, &mut samples, spec.block_size);
    report_instability(&tm);
    Ok(samples)
}

fn tone(args: ToneArgs) -> Result<()> {
    let samples = taped_tone(&args.tone, &args.machine)?;
    let peak = samples.iter().map(|x| x.abs()).fold(0.0f32, f32::max);
    info!(
        freq = args.tone.freq,
        peak,
        peak_dbfs = analysis::to_db(peak as f64),
        "rendered tone"
    );

    let audio = Audio {
        channels: vec![samples],
        sample_rate: args.tone.sample_rate,
    };
    wav::write_wav(&args.output, &audio)?;
    info!(output = %args.output.display(), "written");
    Ok(())
}

fn harmonics(args: HarmonicsArgs) -> Result<()> {
    let samples = taped_tone(&args.tone, &args.machine)?;
    let report = HarmonicReport::measure(&samples, args.tone.freq, args.tone.sample_rate as f64);
    let margin = report.h1_h3_margin_db();

    println!("H1      {:>8.2} dBFS", analysis::to_db(report.h1));
    println!("H2      {:>8.2} dBFS", analysis::to_db(report.h2));
    println!("H3      {:>8.2} dBFS", analysis::to_db(report.h3));
    println!("H1-H3   {margin:>8.2} dB");

    if let Some(min) = args.min_margin_db {
        if margin < min {
            bail!("H1-H3 margin {margin:.2} dB is below the required {min:.2} dB");
        }
    }
    Ok(())
}

fn loss_response(args: LossResponseArgs) -> Result<()> {
    let params = args.machine.resolve()?;
    let os_rate = args.sample_rate as f64 * OVERSAMPLE_FACTOR as f64;

    let mut designer = LossFilterDesigner::new(os_rate);
    let mut taps = [0.0; LOSS_FILTER_ORDER];
    designer.design(&params, &mut taps);
    info!(
        speed_ips = params.tape_speed_ips,
        imaginary_residual = designer.imaginary_residual(),
        "designed loss filter"
    );

    let top = 20_000.0f64.min(0.45 * args.sample_rate as f64);
    println!("{:>10}  {:>10}  {:>10}", "freq Hz", "ideal dB", "fir dB");
    for f in analysis::log_sweep(20.0, top, args.points) {
        let ideal = analysis::to_db(loss_magnitude(f, &params));
        let fir = analysis::to_db(analysis::fir_magnitude(&taps, f, os_rate));
        println!("{f:>10.1}  {ideal:>10.2}  {fir:>10.2}");
    }
    Ok(())
}
