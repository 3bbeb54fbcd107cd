//! Simulate command - scripted program over the real wall clock
//!
//! Every frame the script reads the clock, optionally spins on a tick
//! counter and sleeps. The printed checksum only depends on the flags, not
//! on how fast the machine is.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use anyhow::Result;
use clap::Args;
use tracing::{info, warn};

use ticklock_core::{
    DelayDiversion, DeterminismTrace, FrameBoundary, FrameConfig, FrameRate, QueryKind,
    SystemWallClock, VirtualClock, format_title,
};

/// Arguments for the simulate command
#[derive(Args)]
pub struct SimulateArgs {
    /// Number of frames to run
    #[arg(short, long, default_value = "600")]
    pub frames: u64,

    /// Frames per second (overrides the config file)
    #[arg(long)]
    pub fps: Option<u32>,

    /// Skip real-time pacing
    #[arg(long)]
    pub fast_forward: bool,

    /// Tick counter reads per frame
    #[arg(long, default_value = "0")]
    pub spin: u32,

    /// Sleep issued by the main thread each frame, in milliseconds
    #[arg(long, default_value = "0")]
    pub sleep_ms: u32,

    /// Also run a background thread whose sleeps are real
    #[arg(long)]
    pub worker: bool,

    /// Config file (defaults to the platform config directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Execute the simulate command
pub fn execute(args: SimulateArgs) -> Result<()> {
    let config = crate::load_config(args.config.as_deref())?;
    let mut clock_config = config.clock_config()?;
    if let Some(fps) = args.fps {
        clock_config.frame_rate = FrameRate::per_second(fps)?;
    }

    let pacing = Arc::new(config.pacing());
    if args.fast_forward {
        pacing.set_fast_forward(true);
    }
    let clock = Arc::new(VirtualClock::new(
        clock_config,
        Arc::new(SystemWallClock::new()),
        pacing,
    ));
    let trace = Arc::new(DeterminismTrace::new());
    clock.attach_trace(trace.clone());

    let delay = Arc::new(DelayDiversion::new(clock.clone()));
    delay.register_main_thread();

    let stop = Arc::new(AtomicBool::new(false));
    let worker = args.worker.then(|| {
        let delay = delay.clone();
        let stop = stop.clone();
        thread::spawn(move || {
            let mut waits = 0u64;
            while !stop.load(Ordering::Acquire) {
                delay.delay_ms(2);
                waits += 1;
            }
            waits
        })
    });

    info!(
        "Simulating {} frames at {}/{} fps",
        args.frames,
        clock_config.frame_rate.numerator(),
        clock_config.frame_rate.denominator()
    );

    let mut boundary = FrameBoundary::new(clock.clone(), FrameConfig::default());
    for _ in 0..args.frames {
        let report = boundary.run(|| {
            clock.query(QueryKind::Time);
            for _ in 0..args.spin {
                clock.query(QueryKind::GetTicks);
            }
            delay.delay_ms(args.sleep_ms);
        });
        if let Some(fps) = report.fps {
            info!("{}", format_title("simulate", &fps));
        }
    }

    stop.store(true, Ordering::Release);
    if let Some(handle) = worker {
        match handle.join() {
            Ok(waits) => info!("Worker thread slept {} times", waits),
            Err(_) => warn!("Worker thread panicked"),
        }
    }

    let snapshot = clock.snapshot();
    println!("frames:   {}", snapshot.frame_count);
    println!("virtual:  {}", snapshot.ticks);
    println!("queries:  {}", trace.total_queries());
    println!("checksum: {:016x}", trace.checksum());

    Ok(())
}
