//! Headless demo driver: runs the showcase against a synthetic telemetry
//! probe for a few scene rotations and writes the final frame to a PNG.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use glowfield::{ChannelSource, Engine, EngineConfig, ModelState, TelemetrySnapshot};

/// Synthetic load profile: a warm-up ramp followed by a slow sinusoidal GPU
/// load, enough to exercise every intensity path.
fn synthetic_probe(tick: &AtomicU64) -> TelemetrySnapshot {
    let n = tick.fetch_add(1, Ordering::Relaxed);
    let t = n as f32 * 0.15;

    if t < 6.0 {
        TelemetrySnapshot {
            gpu_util_pct: Some(25.0),
            model_state: Some(ModelState::Warming),
            cold_start_progress: Some((t / 6.0).min(1.0)),
            ..Default::default()
        }
    } else {
        TelemetrySnapshot {
            gpu_util_pct: Some(45.0 + 40.0 * (t * 0.12).sin()),
            vram_used_mb: Some(9_200.0),
            vram_total_mb: Some(24_576.0),
            ram_used_mb: Some(18_000.0),
            ram_total_mb: Some(65_536.0),
            model_state: Some(ModelState::Running),
            cold_start_progress: Some(1.0),
        }
    }
}

fn main() -> anyhow::Result<()> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()?;

    let config = EngineConfig::default();
    let seconds: f32 = std::env::args()
        .nth(1)
        .map(|s| s.parse().context("duration must be a number of seconds"))
        .transpose()?
        .unwrap_or(60.0);

    let tick = Arc::new(AtomicU64::new(0));
    let probe_tick = Arc::clone(&tick);
    let source = ChannelSource::spawn(Duration::from_millis(150), move || {
        Some(synthetic_probe(&probe_tick))
    });

    let mut engine = Engine::new(config, Box::new(source))?;
    engine.start(0.0);

    let frames = (seconds * 60.0) as u64;
    log::info!("rendering {frames} frames ({seconds:.0}s at 60 fps)");

    for i in 1..=frames {
        let now = i as f32 / 60.0;
        engine.tick(now)?;
        std::thread::sleep(Duration::from_millis(2));

        if i % 600 == 0 {
            if let Some(params) = engine.scene_params() {
                log::info!(
                    "t={now:>6.1}s scene={:?} accent={:.2}",
                    params.scene,
                    params.accent01
                );
            }
        }
    }

    let out = "glowfield.png";
    engine.frame().save(out).context("saving final frame")?;
    log::info!("wrote {out}");
    engine.stop();
    Ok(())
}
