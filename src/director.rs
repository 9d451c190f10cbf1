//! Scene Director: a timed finite-state machine over the five showcase
//! scenes. Telemetry modulates *intensity*, never sequence or timing — the
//! rotation is identical on an idle box and a saturated one.

use crate::config::{SCENES, SceneSpec};
use crate::telemetry::{ModelState, RenderState};

/// Fixed crossfade length between consecutive scenes.
pub const CROSSFADE_SEC: f32 = 1.0;

/// Camera jitter absolute ceiling. Tension, not nausea.
pub const JITTER_CEILING: f32 = 0.05;

/// The five scenes, entered in fixed cyclic order.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SceneId {
    /// Ambient baseline drift.
    Drift,
    /// Turbulence showcase; flow and noise pushed hardest.
    Surge,
    /// Load convergence; particles pulled toward screen center.
    Converge,
    /// The glowing ring.
    Halo,
    /// Wind-down; heavy damping, slow rise.
    Ember,
}

impl SceneId {
    pub fn next(self) -> SceneId {
        match self {
            SceneId::Drift => SceneId::Surge,
            SceneId::Surge => SceneId::Converge,
            SceneId::Converge => SceneId::Halo,
            SceneId::Halo => SceneId::Ember,
            SceneId::Ember => SceneId::Drift,
        }
    }
}

/// Per-frame output of the director, consumed by simulation, draw and
/// post-processing.
#[derive(Clone, Copy, Debug)]
pub struct SceneParams {
    pub scene: SceneId,
    /// Fraction of the current scene elapsed, capped at 1 during a crossfade.
    pub scene_t01: f32,
    /// Fraction through the active crossfade; 0 when not transitioning.
    pub transition_t01: f32,
    /// How hot the visuals should look overall.
    pub accent01: f32,
    /// Small whole-field perturbation, |value| <= JITTER_CEILING.
    pub camera_jitter: f32,
}

/// Intensity mapping: model activity imposes a floor independent of raw GPU
/// load. Monotone non-decreasing in `gpu_util01` for a fixed state.
pub fn accent_for(gpu_util01: f32, state: ModelState) -> f32 {
    let floor = match state {
        ModelState::Idle | ModelState::Error => 0.0,
        ModelState::Warming => 0.7,
        ModelState::Running => 0.8,
    };
    (0.5 * gpu_util01.clamp(0.0, 1.0)).max(floor).clamp(0.0, 1.0)
}

/// Camera jitter from the two tension sources: late-stage cold start and
/// sustained GPU pressure. Contributions sum, then clamp.
pub fn camera_jitter_for(state: &RenderState) -> f32 {
    let t = state.time_sec;
    let mut jitter = 0.0;

    if state.model_state == ModelState::Warming && state.cold_start_progress01 > 0.7 {
        jitter += (t * 10.0).sin() * 0.02 * state.cold_start_progress01;
    }
    if state.gpu_util01 > 0.6 {
        jitter += (t * 5.0).sin() * 0.01 * (state.gpu_util01 - 0.6) * 2.5;
    }

    jitter.clamp(-JITTER_CEILING, JITTER_CEILING)
}

/// Blend weight of `target` under the current crossfade. The outgoing scene
/// fades out as the incoming one fades in; weights of the pair sum to 1.
pub fn scene_weight(params: &SceneParams, target: SceneId) -> f32 {
    if params.transition_t01 > 0.0 {
        if params.scene == target {
            1.0 - params.transition_t01
        } else if params.scene.next() == target {
            params.transition_t01
        } else {
            0.0
        }
    } else if params.scene == target {
        1.0
    } else {
        0.0
    }
}

/// Owns the scene index and timers exclusively. Exactly one instance per
/// engine.
pub struct SceneDirector {
    index: usize,
    elapsed_sec: f32,
    in_transition: bool,
    transition_elapsed: f32,
    accent: f32,
}

impl SceneDirector {
    pub fn new() -> Self {
        Self {
            index: 0,
            elapsed_sec: 0.0,
            in_transition: false,
            transition_elapsed: 0.0,
            accent: 0.0,
        }
    }

    pub fn current_spec(&self) -> &'static SceneSpec {
        &SCENES[self.index]
    }

    /// Reset to the start of scene A. Used by `Engine::start`.
    pub fn reset(&mut self) {
        self.index = 0;
        self.elapsed_sec = 0.0;
        self.in_transition = false;
        self.transition_elapsed = 0.0;
        self.accent = 0.0;
    }

    pub fn update(&mut self, state: &RenderState) -> SceneParams {
        let dt = state.dt_sec;

        if self.in_transition {
            self.transition_elapsed += dt;
            if self.transition_elapsed >= CROSSFADE_SEC {
                self.index = (self.index + 1) % SCENES.len();
                self.elapsed_sec = 0.0;
                self.transition_elapsed = 0.0;
                self.in_transition = false;
                log::debug!("scene -> {}", SCENES[self.index].label);
            }
        } else {
            self.elapsed_sec += dt;
            let duration = SCENES[self.index].duration_ms as f32 / 1000.0;
            if self.elapsed_sec >= duration {
                self.in_transition = true;
                self.transition_elapsed = 0.0;
            }
        }

        // Stale telemetry: keep the rotation running but relax intensity
        // toward the idle mapping of the last-known load, so the show settles
        // instead of freezing mid-heat.
        if state.stale {
            let target = accent_for(state.gpu_util01, ModelState::Idle);
            let k = 1.0 - (-1.5 * dt).exp();
            self.accent += k * (target - self.accent);
        } else {
            self.accent = accent_for(state.gpu_util01, state.model_state);
        }

        let spec = &SCENES[self.index];
        let duration = spec.duration_ms as f32 / 1000.0;
        let scene_t01 = if self.in_transition {
            1.0
        } else {
            (self.elapsed_sec / duration).min(1.0)
        };
        let transition_t01 = if self.in_transition {
            (self.transition_elapsed / CROSSFADE_SEC).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let camera_jitter = if state.stale {
            0.0
        } else {
            camera_jitter_for(state)
        };

        SceneParams {
            scene: spec.id,
            scene_t01,
            transition_t01,
            accent01: self.accent,
            camera_jitter,
        }
    }
}

impl Default for SceneDirector {
    fn default() -> Self {
        Self::new()
    }
}
