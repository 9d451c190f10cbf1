//! Glowfield - Attract-Mode Showcase Renderer
//! Idle-triggered full-screen presentation: timed scenes, flow-field particles,
//! a glowing ring primitive and bloom post-processing, all modulated by live
//! hardware telemetry.
//!
//! The host owns scheduling: it calls [`Engine::tick`] once per display refresh
//! and reads the presentable frame back. Everything else (scene order, timing,
//! intensity mapping) is internal by design.

pub mod config;
pub mod director;
pub mod draw;
pub mod engine;
pub mod flowfield;
pub mod particles;
pub mod postprocess;
pub mod telemetry;

pub use config::{ColorScheme, EngineConfig, SceneSpec};
pub use director::{SceneDirector, SceneId, SceneParams, CROSSFADE_SEC};
pub use engine::{Engine, RunState};
pub use postprocess::FrameBuffer;
pub use telemetry::{
    ChannelSource, ModelState, RenderState, TelemetryAdapter, TelemetrySnapshot, TelemetrySource,
};

/// Frame delta ceiling in seconds. A tab/window stall must not turn into a
/// huge simulation jump.
pub const DT_CEILING_SEC: f32 = 0.05;

/// Frame delta floor in seconds; keeps `dt` strictly positive even when the
/// host hands us a non-advancing clock.
pub const DT_FLOOR_SEC: f32 = 1.0e-4;

/// Clamp a raw host-provided frame delta into the simulation-safe range.
pub fn clamp_dt(raw_dt: f32) -> f32 {
    raw_dt.clamp(DT_FLOOR_SEC, DT_CEILING_SEC)
}
