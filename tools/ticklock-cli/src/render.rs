//! Render command - mix a looping tone into a WAV file
//!
//! Runs in fast-forward: the output length only depends on the number of
//! frames and the frame rate.

use std::f64::consts::TAU;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow, bail};
use clap::Args;
use tracing::{info, warn};

use ticklock_core::{
    AudioContext, AudioSink, FrameBoundary, FrameConfig, FrameRate, MixedAudio, OutputFormat,
    OutputSample, SampleData, SystemWallClock, VirtualClock,
};

/// Arguments for the render command
#[derive(Args)]
pub struct RenderArgs {
    /// Number of frames to render
    #[arg(short, long, default_value = "600")]
    pub frames: u64,

    /// Output WAV file
    #[arg(short, long)]
    pub out: PathBuf,

    /// Frames per second (overrides the config file)
    #[arg(long)]
    pub fps: Option<u32>,

    /// Tone pitch in Hz
    #[arg(long, default_value = "440")]
    pub tone: u32,

    /// Sample rate of the generated tone, resampled to the output rate
    #[arg(long, default_value = "22050")]
    pub source_rate: u32,

    /// Source volume (0.0 - 1.0)
    #[arg(long, default_value = "0.5")]
    pub volume: f32,

    /// Config file (defaults to the platform config directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

type Writer = hound::WavWriter<BufWriter<File>>;

struct WavState {
    writer: Option<Writer>,
    error: Option<hound::Error>,
}

/// Sink appending every mixed period to a WAV file.
///
/// The first write error is kept and later periods are dropped.
struct WavSink {
    state: Arc<Mutex<WavState>>,
}

impl AudioSink for WavSink {
    fn push_samples(&mut self, audio: &MixedAudio, _format: &OutputFormat) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if state.error.is_some() {
            return;
        }
        let Some(writer) = state.writer.as_mut() else {
            return;
        };

        let result = match audio {
            MixedAudio::S16(samples) => samples.iter().try_for_each(|&s| writer.write_sample(s)),
            // 8-bit WAV is unsigned on disk, hound takes it signed
            MixedAudio::U8(samples) => samples
                .iter()
                .try_for_each(|&s| writer.write_sample((s as i16 - 128) as i8)),
        };
        if let Err(e) = result {
            warn!("Dropping audio after write error: {}", e);
            state.error = Some(e);
        }
    }
}

/// One second of a sine at `pitch` Hz, so it loops without a click
fn tone_samples(pitch: u32, rate: u32) -> Vec<i16> {
    (0..rate)
        .map(|i| {
            let phase = i as f64 * pitch as f64 * TAU / rate as f64;
            (phase.sin() * i16::MAX as f64 * 0.8) as i16
        })
        .collect()
}

/// Execute the render command
pub fn execute(args: RenderArgs) -> Result<()> {
    if args.source_rate == 0 {
        bail!("--source-rate must be greater than zero");
    }

    let config = crate::load_config(args.config.as_deref())?;
    let mut clock_config = config.clock_config()?;
    if let Some(fps) = args.fps {
        clock_config.frame_rate = FrameRate::per_second(fps)?;
    }
    let format = config.output_format()?;

    let pacing = Arc::new(config.pacing());
    pacing.set_fast_forward(true);
    let clock = Arc::new(VirtualClock::new(
        clock_config,
        Arc::new(SystemWallClock::new()),
        pacing,
    ));

    let audio = Arc::new(AudioContext::new(clock.clone(), format));
    audio.set_master_volume(config.audio.master_volume);
    let buffer = audio.create_buffer(
        SampleData::S16(tone_samples(args.tone, args.source_rate)),
        1,
        args.source_rate,
    );
    let source = audio.create_source();
    audio.queue_buffer(source, buffer.id())?;
    audio.with_source(source, |s| {
        s.set_volume(args.volume);
        s.set_looping(true);
        s.play();
    })?;

    let spec = hound::WavSpec {
        channels: format.channels,
        sample_rate: format.frequency,
        bits_per_sample: match format.sample {
            OutputSample::U8 => 8,
            OutputSample::S16 => 16,
        },
        sample_format: hound::SampleFormat::Int,
    };
    let writer = hound::WavWriter::create(&args.out, spec)
        .with_context(|| format!("Failed to create {}", args.out.display()))?;
    let state = Arc::new(Mutex::new(WavState {
        writer: Some(writer),
        error: None,
    }));

    let frame_config = FrameConfig {
        warn_over_budget: false,
        ..FrameConfig::default()
    };
    let mut boundary = FrameBoundary::new(clock, frame_config).with_audio(
        audio,
        Box::new(WavSink {
            state: state.clone(),
        }),
    );

    let mut mixed = 0usize;
    for _ in 0..args.frames {
        mixed += boundary.run(|| {}).mixed_frames;
    }
    drop(boundary);

    let mut state = state.lock().map_err(|_| anyhow!("WAV writer lock poisoned"))?;
    if let Some(e) = state.error.take() {
        return Err(e).with_context(|| format!("Failed to write {}", args.out.display()));
    }
    let writer = state.writer.take().context("WAV writer already finalized")?;
    writer
        .finalize()
        .with_context(|| format!("Failed to finalize {}", args.out.display()))?;

    info!(
        "Wrote {} audio frames ({} video frames) to {}",
        mixed,
        args.frames,
        args.out.display()
    );
    Ok(())
}
