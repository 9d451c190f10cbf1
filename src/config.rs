//! Configuration for the Glowfield showcase engine.
//! All defaults are the product-locked values: scene durations, smoothing
//! constants and bloom bounds are part of the visual contract, not tuning
//! knobs for the host.

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::director::SceneId;

// ============================================================================
// Scene table
// ============================================================================

/// One entry of the fixed scene rotation. Read-only at runtime; the director
/// only advances an index into the table.
#[derive(Clone, Copy, Debug)]
pub struct SceneSpec {
    pub id: SceneId,
    pub label: &'static str,
    pub duration_ms: u32,
}

/// The fixed five-scene rotation, ~43 s per loop before crossfades.
pub const SCENES: [SceneSpec; 5] = [
    SceneSpec {
        id: SceneId::Drift,
        label: "Drift",
        duration_ms: 9_000,
    },
    SceneSpec {
        id: SceneId::Surge,
        label: "Surge",
        duration_ms: 11_000,
    },
    SceneSpec {
        id: SceneId::Converge,
        label: "Converge",
        duration_ms: 9_000,
    },
    SceneSpec {
        id: SceneId::Halo,
        label: "Halo",
        duration_ms: 7_000,
    },
    SceneSpec {
        id: SceneId::Ember,
        label: "Ember",
        duration_ms: 7_000,
    },
];

// ============================================================================
// Color Scheme
// ============================================================================

/// Linear-light colors (0..1). The particle field lerps from `base` toward
/// `accent` as the intensity scalar rises.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct ColorScheme {
    pub name: String,
    pub background: [f32; 3],
    pub base: [f32; 3],
    pub accent: [f32; 3],
    pub ring: [f32; 3],
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self::deep_space()
    }
}

impl ColorScheme {
    pub fn deep_space() -> Self {
        Self {
            name: "Deep Space".to_string(),
            background: [0.004, 0.005, 0.012],
            base: [0.25, 0.45, 0.95],
            accent: [1.0, 0.38, 0.2],
            ring: [0.55, 0.85, 1.0],
        }
    }

    pub fn furnace() -> Self {
        Self {
            name: "Furnace".to_string(),
            background: [0.01, 0.004, 0.002],
            base: [0.9, 0.55, 0.2],
            accent: [1.0, 0.15, 0.05],
            ring: [1.0, 0.8, 0.4],
        }
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct SimConfig {
    /// Flow-field advection strength at zero load (px/frame^2 scale).
    pub flow_strength: f32,
    /// Additional flow strength at full GPU load.
    pub flow_strength_load: f32,
    /// Turbulence amplitude at full GPU load. The primary "working harder" cue.
    pub turbulence: f32,
    /// Velocity damping rate at zero load (1/s).
    pub base_damping: f32,
    /// Extra damping rate at full load; dense, not erratic, under pressure.
    pub load_damping: f32,
    /// Centroid pull strength in the Converge scene.
    pub converge_pull: f32,
    /// Orbital bias strength in the Halo scene.
    pub orbit_strength: f32,
    /// Particle lifetime range in seconds.
    pub life_min: f32,
    pub life_max: f32,
    /// Particle radius range in pixels.
    pub size_min: f32,
    pub size_max: f32,
    /// Velocity magnitude ceiling (px/frame at the 60 fps baseline).
    pub max_speed: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            flow_strength: 0.35,
            flow_strength_load: 0.55,
            turbulence: 0.6,
            base_damping: 1.2,
            load_damping: 2.0,
            converge_pull: 0.05,
            orbit_strength: 0.04,
            life_min: 4.0,
            life_max: 10.0,
            size_min: 1.2,
            size_max: 3.6,
            max_speed: 5.0,
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct FlowConfig {
    /// Grid resolution of the vector field. Low on purpose; particles
    /// interpolate between cells.
    pub cols: usize,
    pub rows: usize,
    /// Regenerate the field every Nth frame.
    pub regen_interval_frames: u64,
    /// Spatial frequency of the driving noise.
    pub noise_scale: f32,
    /// Swirl magnitude at zero / full GPU load.
    pub base_swirl: f32,
    pub load_swirl: f32,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            cols: 48,
            rows: 27,
            regen_interval_frames: 3,
            noise_scale: 3.0,
            base_swirl: 0.6,
            load_swirl: 1.4,
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct PostConfig {
    /// Bright-pass luma threshold at accent 0.
    pub bloom_threshold: f32,
    /// How far the threshold drops at accent 1 (more bloom allowed under load).
    pub bloom_threshold_drop: f32,
    /// Composite intensity floor and span: intensity = floor + span * accent.
    pub bloom_floor: f32,
    pub bloom_span: f32,
    /// Film grain amplitude.
    pub grain: f32,
    /// Vignette strength.
    pub vignette: f32,
}

impl Default for PostConfig {
    fn default() -> Self {
        Self {
            bloom_threshold: 0.8,
            bloom_threshold_drop: 0.35,
            bloom_floor: 0.25,
            bloom_span: 0.9,
            grain: 0.018,
            vignette: 0.35,
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct RingConfig {
    /// Ring radius as a fraction of the shorter viewport edge.
    pub radius01: f32,
    /// Band thickness as a fraction of the shorter viewport edge.
    pub thickness01: f32,
    /// Radius breathing amplitude over the Halo scene.
    pub breathe: f32,
    /// Peak additive intensity.
    pub intensity: f32,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            radius01: 0.28,
            thickness01: 0.015,
            breathe: 0.05,
            intensity: 2.2,
        }
    }
}

// ============================================================================
// Engine config
// ============================================================================

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct EngineConfig {
    pub width: u32,
    pub height: u32,
    pub particle_count: usize,
    /// Seed for the initial pool layout. Respawns are hash-driven and do not
    /// consume this.
    pub seed: u64,
    /// Telemetry poll cadence in seconds (5-10 Hz target).
    pub poll_interval_sec: f32,
    /// Snapshot age beyond which visuals relax toward the idle baseline.
    pub stale_after_sec: f32,
    pub colors: ColorScheme,
    pub sim: SimConfig,
    pub flow: FlowConfig,
    pub post: PostConfig,
    pub ring: RingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            particle_count: 6_000,
            seed: 0x0610_ff1e,
            poll_interval_sec: 0.15,
            stale_after_sec: 3.0,
            colors: ColorScheme::default(),
            sim: SimConfig::default(),
            flow: FlowConfig::default(),
            post: PostConfig::default(),
            ring: RingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Reject configurations the engine cannot allocate resources for.
    /// Called synchronously at engine construction so failure never leaves
    /// partially-initialized state behind.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.width < 16 || self.height < 16 {
            anyhow::bail!("viewport too small: {}x{}", self.width, self.height);
        }
        if self.particle_count == 0 {
            anyhow::bail!("particle_count must be at least 1");
        }
        if self.poll_interval_sec <= 0.0 {
            anyhow::bail!("poll_interval_sec must be positive");
        }
        if self.flow.cols < 2 || self.flow.rows < 2 {
            anyhow::bail!(
                "flow field grid too small: {}x{}",
                self.flow.cols,
                self.flow.rows
            );
        }
        if self.flow.regen_interval_frames == 0 {
            anyhow::bail!("flow regen interval must be at least 1 frame");
        }
        Ok(())
    }

    pub fn save(&self, path: &str) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("writing config to {path}"))?;
        Ok(())
    }

    pub fn load(path: &str) -> anyhow::Result<Self> {
        let json =
            std::fs::read_to_string(path).with_context(|| format!("reading config from {path}"))?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }
}

/// Total wall-clock length of one full scene cycle including crossfades.
pub fn cycle_duration_sec() -> f32 {
    let scenes: f32 = SCENES.iter().map(|s| s.duration_ms as f32 / 1000.0).sum();
    scenes + SCENES.len() as f32 * crate::director::CROSSFADE_SEC
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_table_is_product_locked() {
        let total: u32 = SCENES.iter().map(|s| s.duration_ms).sum();
        assert_eq!(total, 43_000);
        assert_eq!(SCENES[0].id, SceneId::Drift);
        assert_eq!(SCENES[4].id, SceneId::Ember);
    }

    #[test]
    fn default_config_validates() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_degenerate_config() {
        let mut config = EngineConfig::default();
        config.particle_count = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.width = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn cycle_duration_includes_crossfades() {
        assert!((cycle_duration_sec() - 48.0).abs() < 1e-3);
    }
}
