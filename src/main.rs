use std::f64::consts::PI;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Context;
use clap::{Parser, Subcommand};
use feedback_guard::{FeedbackSuppressor, SuppressorConfig};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Standard deviation of the simulated background hiss.
const NOISE_STD: f64 = 0.02;

#[derive(Parser, Debug)]
#[command(name = "feedback_guard", version, about = "Adaptive notch feedback suppressor")]
struct Cli {
    /// JSON config file; fields it leaves out keep their defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Microphone -> suppressor -> speakers
    #[cfg(feature = "device-cpal")]
    Loopback,

    /// Run a synthetic howl through the suppressor and report the cut
    Simulate {
        /// Frequency of the simulated feedback tone
        #[arg(long, default_value_t = 1500.0)]
        feedback_hz: f64,

        #[arg(long, default_value_t = 5.0)]
        duration_s: f64,

        /// Seed for the background noise
        #[arg(long, default_value_t = 7)]
        seed: u64,
    },
}

/// Log to stdout through a background writer thread, so events raised from
/// the audio callback only enqueue. Keep the guard alive to flush on exit.
fn init_logging() -> WorkerGuard {
    let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stdout());
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    guard
}

fn main() -> anyhow::Result<()> {
    let _guard = init_logging();

    let cli = Cli::parse();
    let file_config = match &cli.config {
        Some(path) => Some(
            SuppressorConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        ),
        None => None,
    };

    match cli.command {
        #[cfg(feature = "device-cpal")]
        Some(Command::Loopback) | None => loopback(file_config.unwrap_or_else(live_config)),
        #[cfg(not(feature = "device-cpal"))]
        None => simulate(file_config.unwrap_or_else(simulation_config), 1500.0, 5.0, 7),
        Some(Command::Simulate {
            feedback_hz,
            duration_s,
            seed,
        }) => simulate(
            file_config.unwrap_or_else(simulation_config),
            feedback_hz,
            duration_s,
            seed,
        ),
    }
}

#[cfg(feature = "device-cpal")]
fn live_config() -> SuppressorConfig {
    const SAMPLE_RATE: f64 = 48000.0;
    const BUFFER_SIZE: usize = 480;

    SuppressorConfig {
        sample_rate_hz: SAMPLE_RATE,
        block_size: BUFFER_SIZE,
        ..SuppressorConfig::default()
    }
}

fn simulation_config() -> SuppressorConfig {
    SuppressorConfig {
        num_bands: 20,
        freq_range: (500.0, 2000.0),
        filter_q: 80.0,
        max_gain_reduction_db: -20.0,
        ..SuppressorConfig::default()
    }
}

/// Hand a processed block to playback. Samples the ring can't take are
/// counted rather than logged; the audio thread never formats or writes.
#[cfg_attr(not(feature = "device-cpal"), allow(dead_code))]
fn forward_block(block: &[f32], mut push: impl FnMut(f32) -> bool, dropped: &AtomicUsize) {
    let lost = block.iter().filter(|&&s| !push(s)).count();
    if lost > 0 {
        dropped.fetch_add(lost, Ordering::Relaxed);
    }
}

/// Report and clear the drop count. Called off the audio thread.
#[cfg_attr(not(feature = "device-cpal"), allow(dead_code))]
fn report_dropped(dropped: &AtomicUsize) -> usize {
    let lost = dropped.swap(0, Ordering::Relaxed);
    if lost > 0 {
        warn!(dropped = lost, "playback can't keep up, dropped samples");
    }
    lost
}

#[cfg(feature = "device-cpal")]
fn loopback(config: SuppressorConfig) -> anyhow::Result<()> {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use std::sync::Arc;
    use std::time::Duration;

    use rtrb::RingBuffer;
    use tracing::error;

    // a few blocks of slack between capture and playback
    const RING_BLOCKS: usize = 4;

    let host = cpal::default_host();
    let input_device = host.default_input_device().context("no default input device")?;
    let output_device = host.default_output_device().context("no default output device")?;

    let stream_config = cpal::StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(config.sample_rate_hz as u32),
        buffer_size: cpal::BufferSize::Fixed(config.block_size as u32),
    };
    info!(?stream_config, config = %serde_json::to_string(&config)?, "opening default devices");

    let block_size = config.block_size;
    let mut suppressor = FeedbackSuppressor::new(config)?;
    let (mut producer, mut consumer) = RingBuffer::<f32>::new(block_size * RING_BLOCKS);
    let mut pending: Vec<f32> = Vec::with_capacity(block_size);
    let dropped = Arc::new(AtomicUsize::new(0));
    let dropped_in_callback = Arc::clone(&dropped);

    let input_stream = input_device.build_input_stream(
        &stream_config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            for &sample in data {
                pending.push(sample);
                if pending.len() == block_size {
                    suppressor.process_f32(&mut pending);
                    forward_block(&pending, |s| producer.push(s).is_ok(), &dropped_in_callback);
                    pending.clear();
                }
            }
        },
        move |err| {
            error!(%err, "input stream error");
        },
        None,
    )?;

    let output_stream = output_device.build_output_stream(
        &stream_config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            // underrun plays silence
            for sample in data.iter_mut() {
                *sample = consumer.pop().unwrap_or(0.0);
            }
        },
        move |err| {
            error!(%err, "output stream error");
        },
        None,
    )?;

    output_stream.play()?;
    input_stream.play()?;

    info!("Suppressing... Press Ctrl+C to stop.");

    loop {
        std::thread::sleep(Duration::from_secs(1));
        report_dropped(&dropped);
    }
}

/// Clean programme material plus a feedback tone that ramps 0 -> 0.8 between
/// 2 s and 4 s and then holds, normalized to a peak of 1/1.1.
fn synthesize(sample_rate_hz: f64, duration_s: f64, feedback_hz: f64, seed: u64) -> anyhow::Result<Vec<f64>> {
    let num_samples = (sample_rate_hz * duration_s) as usize;
    let mut rng = SmallRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, NOISE_STD).context("noise distribution")?;

    let ramp_start = (2.0 * sample_rate_hz) as usize;
    let ramp_end = (4.0 * sample_rate_hz) as usize;
    let amplitude = |n: usize| {
        if n < ramp_start {
            0.0
        } else if n < ramp_end {
            0.8 * (n - ramp_start) as f64 / (ramp_end - ramp_start) as f64
        } else {
            0.8
        }
    };

    let mut input: Vec<f64> = (0..num_samples)
        .map(|n| {
            let t = n as f64 / sample_rate_hz;
            let clean = 0.5 * (2.0 * PI * 500.0 * t).sin()
                + 0.3 * (2.0 * PI * 1200.0 * t).sin()
                + noise.sample(&mut rng);
            clean + amplitude(n) * (2.0 * PI * feedback_hz * t).sin()
        })
        .collect();

    let peak = input.iter().fold(0.0f64, |m, x| m.max(x.abs()));
    if peak > 0.0 {
        let scale = 1.0 / (peak * 1.1);
        input.iter_mut().for_each(|x| *x *= scale);
    }

    Ok(input)
}

/// Normalized power of one DFT bin at `frequency_hz`.
fn tone_energy(signal: &[f64], frequency_hz: f64, sample_rate_hz: f64) -> f64 {
    let w = -2.0 * PI * frequency_hz / sample_rate_hz;
    let (mut re, mut im) = (0.0, 0.0);
    for (k, &x) in signal.iter().enumerate() {
        let t = w * k as f64;
        re += x * t.cos();
        im += x * t.sin();
    }
    let n = signal.len().max(1) as f64;
    (re * re + im * im) / (n * n)
}

fn simulate(config: SuppressorConfig, feedback_hz: f64, duration_s: f64, seed: u64) -> anyhow::Result<()> {
    info!(config = %serde_json::to_string(&config)?, "simulating");
    let sample_rate_hz = config.sample_rate_hz;
    let block_size = config.block_size;
    let mut suppressor = FeedbackSuppressor::new(config)?;

    let input = synthesize(sample_rate_hz, duration_s, feedback_hz, seed)?;
    let mut output = vec![0.0; input.len()];
    let mut block = vec![0.0; block_size];

    for (chunk_in, chunk_out) in input.chunks(block_size).zip(output.chunks_mut(block_size)) {
        // the suppressor only takes whole blocks, pad the tail with silence
        block[..chunk_in.len()].copy_from_slice(chunk_in);
        block[chunk_in.len()..].fill(0.0);
        suppressor.process(&mut block);
        chunk_out.copy_from_slice(&block[..chunk_out.len()]);
    }

    // compare the last second, where the howl is loudest
    let start = (((duration_s - 1.0).max(0.0) * sample_rate_hz) as usize).min(input.len());
    let before = tone_energy(&input[start..], feedback_hz, sample_rate_hz);
    let after = tone_energy(&output[start..], feedback_hz, sample_rate_hz);
    let reduction_db = 10.0 * (before / after.max(1e-20)).log10();

    let bands: Vec<_> = suppressor.snapshot().collect();
    info!(bands = %serde_json::to_string(&bands)?, "band state");
    info!(feedback_hz, before, after, reduction_db, "energy at feedback frequency");

    Ok(())
}
