//! Frame boundary tests

use std::sync::{Arc, Mutex};
use std::time::Duration;

use ticklock_shared::{RunFlags, WindowHandle};

use super::*;
use crate::audio::{AudioContext, AudioSink, MixedAudio, OutputFormat, SampleData};
use crate::companion::{CompanionError, CompanionLink};
use crate::test_utils::{RecordingLink, manual_clock};

/// Recording link that stays inspectable after being boxed
#[derive(Clone, Default)]
struct SharedLink(Arc<Mutex<RecordingLink>>);

impl CompanionLink for SharedLink {
    fn send_window_id(&mut self, handle: WindowHandle) -> Result<(), CompanionError> {
        self.0.lock().unwrap().send_window_id(handle)
    }

    fn poll_flags(&mut self) -> Option<RunFlags> {
        self.0.lock().unwrap().poll_flags()
    }
}

/// Link handing out one batch of updates per poll round; `None` ends a round.
struct RoundsLink(std::collections::VecDeque<Option<RunFlags>>);

impl CompanionLink for RoundsLink {
    fn send_window_id(&mut self, _handle: WindowHandle) -> Result<(), CompanionError> {
        Ok(())
    }

    fn poll_flags(&mut self) -> Option<RunFlags> {
        self.0.pop_front().flatten()
    }
}

fn paused() -> RunFlags {
    RunFlags {
        running: false,
        ..Default::default()
    }
}

#[derive(Clone, Default)]
struct CollectSink(Arc<Mutex<Vec<usize>>>);

impl AudioSink for CollectSink {
    fn push_samples(&mut self, audio: &MixedAudio, _format: &OutputFormat) {
        self.0.lock().unwrap().push(audio.len());
    }
}

// =============================================================
// Ordering
// =============================================================

#[test]
fn test_run_orders_hud_before_draw() {
    let (clock, _wall) = manual_clock();
    let mut frame = FrameBoundary::new(clock, FrameConfig::default());
    let events = Mutex::new(Vec::new());

    let report = frame.run_with_hud(
        || events.lock().unwrap().push("draw".to_string()),
        |hud| events.lock().unwrap().push(format!("hud {}", hud.frame)),
    );

    assert_eq!(*events.lock().unwrap(), vec!["hud 1", "draw"]);
    assert_eq!(report.frame, 1);
    assert_eq!(report.ticks, TimeSpec::from_nanos(16_666_666));
    assert_eq!(frame.frame_counter(), 1);
}

#[test]
fn test_hud_sees_advanced_ticks() {
    let (clock, _wall) = manual_clock();
    let mut frame = FrameBoundary::new(clock.clone(), FrameConfig::default());
    frame.run(|| {});

    let mut seen = None;
    frame.run_with_hud(|| {}, |hud| seen = Some(hud.ticks));
    assert_eq!(seen, Some(clock.query(QueryKind::Untracked)));
}

// =============================================================
// Flags
// =============================================================

#[test]
fn test_flags_applied_at_entry() {
    let (clock, wall) = manual_clock();
    let link = SharedLink::default();
    link.0.lock().unwrap().pending_flags.push(RunFlags {
        framerate: 30,
        fast_forward: true,
        ..Default::default()
    });
    let mut frame =
        FrameBoundary::new(clock.clone(), FrameConfig::default()).with_link(Box::new(link));

    // Rate change lands after this frame's advance
    let first = frame.run(|| {});
    assert_eq!(first.ticks.as_nanos(), 16_666_666);
    assert!(clock.pacing().fast_forward());

    let second = frame.run(|| {});
    assert_eq!((second.ticks - first.ticks).as_nanos(), 33_333_333);
    assert!(wall.sleeps().is_empty());
    assert!(frame.flags().fast_forward);
}

#[test]
fn test_invalid_frame_rate_flag_is_ignored() {
    let (clock, _wall) = manual_clock();
    let link = SharedLink::default();
    link.0.lock().unwrap().pending_flags.push(RunFlags {
        framerate: 0,
        ..Default::default()
    });
    let mut frame =
        FrameBoundary::new(clock.clone(), FrameConfig::default()).with_link(Box::new(link));
    frame.run(|| {});
    assert_eq!(clock.frame_rate(), FrameRate::default());
}

#[test]
fn test_only_latest_flags_apply() {
    let (clock, _wall) = manual_clock();
    let link = SharedLink::default();
    {
        let mut inner = link.0.lock().unwrap();
        inner.pending_flags.push(RunFlags {
            fast_forward: true,
            ..Default::default()
        });
        inner.pending_flags.push(RunFlags::default());
    }
    let mut frame =
        FrameBoundary::new(clock.clone(), FrameConfig::default()).with_link(Box::new(link));
    frame.run(|| {});
    assert!(!clock.pacing().fast_forward());
}

#[test]
fn test_pause_holds_frame_until_resumed() {
    let (clock, wall) = manual_clock();
    let link = RoundsLink(
        [Some(paused()), None, None, None, Some(RunFlags::default()), None]
            .into_iter()
            .collect(),
    );
    let mut frame =
        FrameBoundary::new(clock.clone(), FrameConfig::default()).with_link(Box::new(link));

    let drawn = std::cell::Cell::new(false);
    let report = frame.run(|| drawn.set(true));

    assert!(drawn.get());
    assert!(frame.flags().running);
    // Two empty rounds while paused, resumed on the third
    let period = FrameRate::default().period().to_duration();
    assert_eq!(wall.sleeps(), vec![period, period, period]);
    assert_eq!(report.ticks.as_nanos(), 16_666_666);
    assert_eq!(clock.query(QueryKind::Untracked).as_nanos(), 16_666_666);
}

#[test]
fn test_pause_released_when_link_closes() {
    let (clock, wall) = manual_clock();
    let (link, tx) = crate::companion::StreamLink::new(Vec::<u8>::new());
    tx.send(paused()).unwrap();
    drop(tx);
    let mut frame = FrameBoundary::new(clock, FrameConfig::default()).with_link(Box::new(link));

    frame.run(|| {});
    assert!(frame.flags().running);
    assert!(wall.sleeps().is_empty());
}

#[test]
fn test_pause_without_link_does_not_block() {
    let (clock, wall) = manual_clock();
    let mut frame = FrameBoundary::new(clock, FrameConfig::default());
    frame.apply_run_flags(paused());

    let report = frame.run(|| {});
    assert_eq!(report.frame, 1);
    assert!(frame.flags().running);
    assert!(wall.sleeps().is_empty());
}

// =============================================================
// Window
// =============================================================

#[test]
fn test_window_id_sent_once() {
    let (clock, _wall) = manual_clock();
    let link = SharedLink::default();
    let mut frame =
        FrameBoundary::new(clock, FrameConfig::default()).with_link(Box::new(link.clone()));

    frame.window_created();
    for _ in 0..3 {
        frame.announce_window(Some(0x500));
        frame.run(|| {});
    }
    frame.window_destroyed();
    frame.window_created();
    frame.announce_window(None);

    assert_eq!(link.0.lock().unwrap().sent_window_ids, vec![0x500, 0]);
}

// =============================================================
// Audio and pacing
// =============================================================

#[test]
fn test_audio_mixed_each_frame() {
    let (clock, _wall) = manual_clock();
    let ctx = Arc::new(AudioContext::new(clock.clone(), OutputFormat::stereo_s16(44_100)));
    let source = ctx.create_source();
    let buffer = ctx.create_buffer(SampleData::S16(vec![1000; 44_100]), 1, 44_100);
    ctx.with_source(source, |s| {
        s.set_buffer(Some(buffer)).unwrap();
        s.set_looping(true);
        s.play();
    })
    .unwrap();

    let sink = CollectSink::default();
    let mut frame = FrameBoundary::new(clock, FrameConfig::default())
        .with_audio(ctx, Box::new(sink.clone()));

    let mut total = 0;
    for _ in 0..60 {
        let report = frame.run(|| {});
        assert_eq!(report.mixed_frames, 735);
        total += report.mixed_frames;
    }
    assert_eq!(total, 44_100);
    assert_eq!(sink.0.lock().unwrap().len(), 60);
}

#[test]
fn test_pacing_sleeps_after_first_frame() {
    let (clock, wall) = manual_clock();
    let mut frame = FrameBoundary::new(clock, FrameConfig::default());

    frame.run(|| {});
    assert!(wall.sleeps().is_empty());

    frame.run(|| wall.advance(Duration::from_millis(10)));
    assert_eq!(wall.sleeps().len(), 1);
    assert!(wall.sleeps()[0] < Duration::from_millis(7));
}

#[test]
fn test_fps_samples() {
    let (clock, _wall) = manual_clock();
    let config = FrameConfig {
        stats_interval: 10,
        ..Default::default()
    };
    let mut frame = FrameBoundary::new(clock, config);

    let samples: Vec<FpsSample> = (0..21).filter_map(|_| frame.run(|| {}).fps).collect();
    assert_eq!(samples.len(), 2);
    for sample in &samples {
        assert!((sample.lfps - 60.0).abs() < 0.01);
    }
    // Every frame is paced to the period, so wall rate converges to 60
    assert!((samples[1].fps - 60.0).abs() < 0.01);
    assert_eq!(frame.latest_fps(), Some(samples[1]));
}
