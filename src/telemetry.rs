//! Telemetry Smoothing Adapter.
//! Converts noisy, possibly-missing hardware metrics into stable, clamped
//! render parameters. Visual continuity beats telemetry accuracy: an
//! unreachable collector degrades to "hold last known value", never to a
//! failed frame.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver};

/// EMA smoothing factor for utilization channels.
pub const EMA_ALPHA: f32 = 0.15;

/// Model load phase as reported by the serving layer.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ModelState {
    #[default]
    Idle,
    Warming,
    Running,
    Error,
}

/// One raw sample from the external metrics collector. Every field is
/// optional; an absent field means "hold the last known value", never zero.
#[derive(Clone, Copy, Debug, Default)]
pub struct TelemetrySnapshot {
    /// GPU utilization in percent (0..100 nominally, clamped on ingestion).
    pub gpu_util_pct: Option<f32>,
    pub vram_used_mb: Option<f32>,
    pub vram_total_mb: Option<f32>,
    pub ram_used_mb: Option<f32>,
    pub ram_total_mb: Option<f32>,
    pub model_state: Option<ModelState>,
    /// Load progress fraction, meaningful while warming.
    pub cold_start_progress: Option<f32>,
}

/// Anything that can hand the adapter a fresh snapshot on demand.
/// `sample` must never block the render path; return `None` when nothing
/// new is available.
pub trait TelemetrySource: Send {
    fn sample(&mut self) -> Option<TelemetrySnapshot>;

    /// Stop producing samples until `resume`. Queued samples are discarded;
    /// they would be stale by the time anyone reads them.
    fn pause(&mut self) {}

    /// Undo `pause`. Both are no-ops for sources without a background clock.
    fn resume(&mut self) {}

    /// Release any background resources. Must be idempotent.
    fn shutdown(&mut self) {}
}

/// Smoothed, clamped state handed to the rest of the renderer once per frame.
#[derive(Clone, Copy, Debug)]
pub struct RenderState {
    pub gpu_util01: f32,
    pub vram_util01: f32,
    pub ram_util01: f32,
    pub model_state: ModelState,
    pub cold_start_progress01: f32,
    /// Monotonic clock, seconds.
    pub time_sec: f32,
    /// Frame delta, already clamped to (0, DT_CEILING_SEC].
    pub dt_sec: f32,
    /// Seconds since the last successful telemetry sample.
    pub telemetry_age_sec: f32,
    /// True once `telemetry_age_sec` exceeds the configured staleness window.
    pub stale: bool,
}

impl RenderState {
    /// A neutral idle state, useful before the first frame and in tests.
    pub fn idle(time_sec: f32, dt_sec: f32) -> Self {
        Self {
            gpu_util01: 0.0,
            vram_util01: 0.0,
            ram_util01: 0.0,
            model_state: ModelState::Idle,
            cold_start_progress01: 0.0,
            time_sec,
            dt_sec,
            telemetry_age_sec: 0.0,
            stale: false,
        }
    }
}

fn ratio01(used: Option<f32>, total: Option<f32>) -> Option<f32> {
    match (used, total) {
        (Some(u), Some(t)) if t > 0.0 => Some((u / t).clamp(0.0, 1.0)),
        _ => None,
    }
}

/// Exponential smoothing with hold-last semantics for the three utilization
/// channels plus pass-through of the model phase.
pub struct TelemetryAdapter {
    source: Box<dyn TelemetrySource>,
    poll_interval_sec: f32,
    stale_after_sec: f32,

    // EMA accumulators, all kept in [0,1].
    gpu: f32,
    vram: f32,
    ram: f32,
    primed: bool,

    model_state: ModelState,
    progress: f32,

    last_poll: Option<f32>,
    last_fresh: Option<f32>,
    was_stale: bool,
}

impl TelemetryAdapter {
    pub fn new(
        source: Box<dyn TelemetrySource>,
        poll_interval_sec: f32,
        stale_after_sec: f32,
    ) -> Self {
        Self {
            source,
            poll_interval_sec,
            stale_after_sec,
            gpu: 0.0,
            vram: 0.0,
            ram: 0.0,
            primed: false,
            model_state: ModelState::Idle,
            progress: 0.0,
            last_poll: None,
            last_fresh: None,
            was_stale: false,
        }
    }

    fn smooth(current: &mut f32, raw01: f32, primed: bool) {
        if primed {
            *current += EMA_ALPHA * (raw01 - *current);
        } else {
            *current = raw01;
        }
    }

    /// Pull the latest raw sample if the poll cadence allows it and fold it
    /// into the smoothed accumulators. Defensively clamps every ingested
    /// value; the collector is not trusted to stay in range.
    pub fn update(&mut self, now: f32) {
        if let Some(last) = self.last_poll {
            if now - last < self.poll_interval_sec {
                return;
            }
        }
        self.last_poll = Some(now);

        let Some(snap) = self.source.sample() else {
            return;
        };

        if let Some(pct) = snap.gpu_util_pct {
            let raw = (pct / 100.0).clamp(0.0, 1.0);
            Self::smooth(&mut self.gpu, raw, self.primed);
        }
        if let Some(raw) = ratio01(snap.vram_used_mb, snap.vram_total_mb) {
            Self::smooth(&mut self.vram, raw, self.primed);
        }
        if let Some(raw) = ratio01(snap.ram_used_mb, snap.ram_total_mb) {
            Self::smooth(&mut self.ram, raw, self.primed);
        }
        if let Some(state) = snap.model_state {
            self.model_state = state;
        }
        if let Some(p) = snap.cold_start_progress {
            self.progress = p.clamp(0.0, 1.0);
        }

        self.primed = true;
        self.last_fresh = Some(now);
    }

    /// Current smoothed snapshot. Always in range; never blocks; never fails.
    pub fn state(&mut self, now: f32, dt_sec: f32) -> RenderState {
        let age = self.last_fresh.map(|t| now - t).unwrap_or(f32::INFINITY);
        let stale = age > self.stale_after_sec;

        if stale != self.was_stale {
            if stale {
                log::warn!("telemetry stale ({age:.1}s old), relaxing toward idle baseline");
            } else {
                log::info!("telemetry recovered");
            }
            self.was_stale = stale;
        }

        RenderState {
            gpu_util01: self.gpu.clamp(0.0, 1.0),
            vram_util01: self.vram.clamp(0.0, 1.0),
            ram_util01: self.ram.clamp(0.0, 1.0),
            model_state: self.model_state,
            cold_start_progress01: self.progress.clamp(0.0, 1.0),
            time_sec: now,
            dt_sec,
            telemetry_age_sec: age,
            stale,
        }
    }

    /// Suspend the source between runs. The smoothed accumulators survive,
    /// so a later `resume` picks up without a cold restart.
    pub fn pause(&mut self) {
        self.source.pause();
    }

    pub fn resume(&mut self) {
        self.source.resume();
    }

    pub fn shutdown(&mut self) {
        self.source.shutdown();
    }
}

// ============================================================================
// Threaded polled source
// ============================================================================

/// Samples a probe on a fixed-interval background thread and ships snapshots
/// over a bounded channel. The render side drains with `try_recv`, so the two
/// cadences (display refresh vs. poll timer) never couple.
pub struct ChannelSource {
    rx: Receiver<TelemetrySnapshot>,
    stop: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ChannelSource {
    pub fn spawn<F>(interval: Duration, mut probe: F) -> Self
    where
        F: FnMut() -> Option<TelemetrySnapshot> + Send + 'static,
    {
        let (tx, rx) = bounded(8);
        let stop = Arc::new(AtomicBool::new(false));
        let paused = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let gate = Arc::clone(&paused);

        let handle = std::thread::spawn(move || {
            while !flag.load(Ordering::Relaxed) {
                if !gate.load(Ordering::Relaxed) {
                    if let Some(snap) = probe() {
                        // A full channel means the renderer is behind; dropping
                        // the sample is correct, it would be stale by read time.
                        let _ = tx.try_send(snap);
                    }
                }
                std::thread::sleep(interval);
            }
        });

        Self {
            rx,
            stop,
            paused,
            handle: Some(handle),
        }
    }
}

impl TelemetrySource for ChannelSource {
    fn sample(&mut self) -> Option<TelemetrySnapshot> {
        // Keep only the newest queued snapshot.
        let mut latest = None;
        while let Ok(snap) = self.rx.try_recv() {
            latest = Some(snap);
        }
        latest
    }

    /// The probe thread stays alive, it just stops probing; the pre-pause
    /// queue is drained so a resumed run never sees stale samples.
    fn pause(&mut self) {
        self.paused.store(true, Ordering::Relaxed);
        while self.rx.try_recv().is_ok() {}
    }

    fn resume(&mut self) {
        self.paused.store(false, Ordering::Relaxed);
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ChannelSource {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Source that replays a scripted sequence of snapshots.
    struct Scripted {
        samples: Vec<Option<TelemetrySnapshot>>,
        cursor: usize,
    }

    impl Scripted {
        fn new(samples: Vec<Option<TelemetrySnapshot>>) -> Self {
            Self { samples, cursor: 0 }
        }
    }

    impl TelemetrySource for Scripted {
        fn sample(&mut self) -> Option<TelemetrySnapshot> {
            let out = self.samples.get(self.cursor).cloned().flatten();
            self.cursor += 1;
            out
        }
    }

    fn snap_gpu(pct: f32) -> TelemetrySnapshot {
        TelemetrySnapshot {
            gpu_util_pct: Some(pct),
            ..Default::default()
        }
    }

    #[test]
    fn clamps_out_of_range_input() {
        let source = Scripted::new(vec![Some(TelemetrySnapshot {
            gpu_util_pct: Some(150.0),
            vram_used_mb: Some(-200.0),
            vram_total_mb: Some(8192.0),
            ram_used_mb: Some(999_999.0),
            ram_total_mb: Some(16_384.0),
            cold_start_progress: Some(7.0),
            ..Default::default()
        })]);
        let mut adapter = TelemetryAdapter::new(Box::new(source), 0.1, 3.0);
        adapter.update(0.0);
        let state = adapter.state(0.0, 0.016);

        assert!((0.0..=1.0).contains(&state.gpu_util01));
        assert!((0.0..=1.0).contains(&state.vram_util01));
        assert!((0.0..=1.0).contains(&state.ram_util01));
        assert!((0.0..=1.0).contains(&state.cold_start_progress01));
        assert_eq!(state.gpu_util01, 1.0);
        assert_eq!(state.ram_util01, 1.0);
    }

    #[test]
    fn first_sample_primes_without_smoothing() {
        let source = Scripted::new(vec![Some(snap_gpu(60.0))]);
        let mut adapter = TelemetryAdapter::new(Box::new(source), 0.1, 3.0);
        adapter.update(0.0);
        let state = adapter.state(0.0, 0.016);
        assert!((state.gpu_util01 - 0.6).abs() < 1e-6);
    }

    #[test]
    fn ema_converges_with_alpha() {
        let source = Scripted::new(vec![Some(snap_gpu(0.0)), Some(snap_gpu(100.0))]);
        let mut adapter = TelemetryAdapter::new(Box::new(source), 0.1, 3.0);
        adapter.update(0.0);
        adapter.update(0.2);
        let state = adapter.state(0.2, 0.016);
        // 0 + 0.15 * (1 - 0)
        assert!((state.gpu_util01 - EMA_ALPHA).abs() < 1e-6);
    }

    #[test]
    fn missing_fields_hold_last_value() {
        let source = Scripted::new(vec![
            Some(snap_gpu(50.0)),
            Some(TelemetrySnapshot::default()),
            None,
        ]);
        let mut adapter = TelemetryAdapter::new(Box::new(source), 0.1, 3.0);
        adapter.update(0.0);
        adapter.update(0.2);
        adapter.update(0.4);
        let state = adapter.state(0.4, 0.016);
        assert!((state.gpu_util01 - 0.5).abs() < 1e-6);
    }

    #[test]
    fn staleness_tracks_last_fresh_sample() {
        let source = Scripted::new(vec![Some(snap_gpu(40.0)), None, None, None]);
        let mut adapter = TelemetryAdapter::new(Box::new(source), 0.1, 3.0);
        adapter.update(0.0);
        let state = adapter.state(0.5, 0.016);
        assert!(!state.stale);

        adapter.update(2.0);
        adapter.update(4.0);
        let state = adapter.state(4.0, 0.016);
        assert!(state.stale);
        assert!((state.telemetry_age_sec - 4.0).abs() < 1e-6);
        // Smoothed value survives the outage.
        assert!((state.gpu_util01 - 0.4).abs() < 1e-6);
    }

    #[test]
    fn poll_cadence_is_throttled() {
        let source = Scripted::new(vec![Some(snap_gpu(50.0)), Some(snap_gpu(100.0))]);
        let mut adapter = TelemetryAdapter::new(Box::new(source), 0.15, 3.0);
        adapter.update(0.0);
        // 10ms later: inside the poll interval, the second sample must not
        // be consumed yet.
        adapter.update(0.01);
        let state = adapter.state(0.01, 0.016);
        assert!((state.gpu_util01 - 0.5).abs() < 1e-6);
    }

    #[test]
    fn channel_source_delivers_and_shuts_down() {
        let mut source = ChannelSource::spawn(Duration::from_millis(5), || Some(snap_gpu(30.0)));
        std::thread::sleep(Duration::from_millis(40));
        let got = source.sample();
        assert!(got.is_some());
        source.shutdown();
        source.shutdown(); // idempotent
    }

    #[test]
    fn channel_source_pause_is_restartable() {
        let mut source = ChannelSource::spawn(Duration::from_millis(5), || Some(snap_gpu(30.0)));
        std::thread::sleep(Duration::from_millis(40));
        assert!(source.sample().is_some());

        source.pause();
        // One probe iteration may already be past the gate; let it land and
        // drain it, then the source must stay quiet.
        std::thread::sleep(Duration::from_millis(20));
        let _ = source.sample();
        std::thread::sleep(Duration::from_millis(40));
        assert!(source.sample().is_none(), "paused source must go quiet");

        source.resume();
        std::thread::sleep(Duration::from_millis(40));
        assert!(source.sample().is_some(), "resumed source must deliver again");
        source.shutdown();
    }
}
