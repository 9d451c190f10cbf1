//! Particle pool and simulation stage.
//! A fixed-size pool held in two independent buffers: the simulation reads
//! the whole previous frame and writes a disjoint output buffer; the
//! orchestrator swaps roles after each frame. Particles are never destroyed,
//! only respawned in place, so the pool size is invariant for the lifetime of
//! the engine.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::config::SimConfig;
use crate::director::{scene_weight, SceneId, SceneParams};
use crate::flowfield::{curl, hash21, FlowField};
use crate::telemetry::RenderState;

/// One simulation unit. Positions are in pixels, velocities in pixels per
/// frame at the 60 fps baseline.
#[derive(Clone, Copy, Debug)]
pub struct Particle {
    pub pos: [f32; 2],
    pub vel: [f32; 2],
    pub life: f32,
    pub max_life: f32,
    /// Stable per-particle pseudo-random source; drives respawn placement.
    pub seed: f32,
    pub size: f32,
}

/// Everything the per-particle step needs, borrowed for one frame.
pub struct SimInputs<'a> {
    pub state: &'a RenderState,
    pub params: &'a SceneParams,
    pub flow: &'a FlowField,
    pub config: &'a SimConfig,
}

/// Deterministic-but-varied respawn: the stable seed plus the current time
/// feed a hash, so resets look organic without visible pop patterns.
fn respawn(seed: f32, time_sec: f32, width: f32, height: f32, config: &SimConfig) -> Particle {
    let h1 = hash21(seed, time_sec);
    let h2 = hash21(seed + 17.0, time_sec);
    let h3 = hash21(seed + 41.0, time_sec);
    let h4 = hash21(seed + 73.0, time_sec);
    let h5 = hash21(seed + 113.0, time_sec);
    let h6 = hash21(seed + 151.0, time_sec);

    let life = config.life_min + h5 * (config.life_max - config.life_min);
    Particle {
        pos: [h1 * width, h2 * height],
        vel: [(h3 - 0.5) * 0.4, (h4 - 0.5) * 0.4],
        life,
        max_life: life,
        seed,
        size: config.size_min + h6 * (config.size_max - config.size_min),
    }
}

/// Double-buffered pool. Exclusively owned by the orchestrator; the two
/// buffers are never aliased and never mutated in place.
pub struct ParticlePool {
    buffers: [Vec<Particle>; 2],
    current: usize,
    width: f32,
    height: f32,
}

impl ParticlePool {
    pub fn new(count: usize, width: f32, height: f32, seed: u64, config: &SimConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut particles = Vec::with_capacity(count);
        for i in 0..count {
            let life = rng.gen_range(config.life_min..=config.life_max);
            particles.push(Particle {
                pos: [rng.gen_range(0.0..width), rng.gen_range(0.0..height)],
                vel: [rng.gen_range(-0.2..0.2), rng.gen_range(-0.2..0.2)],
                life,
                max_life: life,
                seed: i as f32 + rng.gen::<f32>(),
                size: rng.gen_range(config.size_min..=config.size_max),
            });
        }

        Self {
            buffers: [particles.clone(), particles],
            current: 0,
            width,
            height,
        }
    }

    pub fn len(&self) -> usize {
        self.buffers[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The buffer holding the most recently completed frame.
    pub fn current(&self) -> &[Particle] {
        &self.buffers[self.current]
    }

    /// Exchange buffer roles. Called by the orchestrator once per frame,
    /// after the simulation step.
    pub fn swap(&mut self) {
        self.current ^= 1;
    }

    /// Advance the full pool by one frame: read `current`, write the other
    /// buffer. Does not swap; ownership of the exchange stays with the
    /// orchestrator.
    pub fn step(&mut self, inputs: &SimInputs) {
        let width = self.width;
        let height = self.height;
        let config = inputs.config;
        let params = inputs.params;
        let flow = inputs.flow;

        let gpu = inputs.state.gpu_util01;
        let dt = inputs.state.dt_sec;
        let time = inputs.state.time_sec;

        let flow_strength = config.flow_strength + config.flow_strength_load * gpu;
        let turbulence_amp = config.turbulence * gpu;

        let surge_w = scene_weight(params, SceneId::Surge);
        let converge_w = scene_weight(params, SceneId::Converge);
        let halo_w = scene_weight(params, SceneId::Halo);
        let ember_w = scene_weight(params, SceneId::Ember);

        // Attractor ramps with scene progress while Converge is active; a
        // crossfade in or out scales it through the scene weight.
        let converge_progress = if params.scene == SceneId::Converge {
            params.scene_t01
        } else {
            0.0
        };
        let pull = config.converge_pull * converge_w * (0.25 + 0.75 * converge_progress);

        // Heavier load means more damping: the field reads dense, not erratic.
        let damping_rate = config.base_damping + config.load_damping * gpu + 1.5 * ember_w;
        let damping = (-damping_rate * dt).exp();

        let cx = width / 2.0;
        let cy = height / 2.0;
        let max_speed = config.max_speed;
        let orbit = config.orbit_strength * halo_w;

        let (a, b) = self.buffers.split_at_mut(1);
        let (src, dst): (&[Particle], &mut [Particle]) = if self.current == 0 {
            (&a[0], &mut b[0][..])
        } else {
            (&b[0], &mut a[0][..])
        };

        dst.par_iter_mut().enumerate().for_each(|(i, out)| {
            let mut p = src[i];

            let x01 = p.pos[0] / width;
            let y01 = p.pos[1] / height;

            // Flow advection; Surge leans into it.
            let fv = flow.sample(x01, y01);
            let surge_boost = 1.0 + 0.8 * surge_w;
            let mut acc = [
                fv[0] * flow_strength * surge_boost,
                fv[1] * flow_strength * surge_boost,
            ];

            // Load-scaled turbulence at a finer spatial frequency.
            if turbulence_amp > 0.0 {
                let n = curl(x01 * 7.0 + time * 0.31, y01 * 7.0 - time * 0.23);
                let amp = turbulence_amp * (1.0 + surge_w);
                acc[0] += n[0] * amp;
                acc[1] += n[1] * amp;
            }

            let dx = cx - p.pos[0];
            let dy = cy - p.pos[1];
            let dist = (dx * dx + dy * dy).sqrt().max(1.0);

            // Centroid attraction, Converge only.
            if pull > 0.0 {
                acc[0] += (dx / dist) * pull * 60.0;
                acc[1] += (dy / dist) * pull * 60.0;
            }

            // Orbital bias around the ring, Halo only.
            if orbit > 0.0 {
                acc[0] += (-dy / dist) * orbit * 60.0;
                acc[1] += (dx / dist) * orbit * 60.0;
            }

            // Slow upward lift in Ember.
            if ember_w > 0.0 {
                acc[1] -= 0.3 * ember_w;
            }

            p.vel[0] += acc[0] * dt;
            p.vel[1] += acc[1] * dt;

            p.vel[0] *= damping;
            p.vel[1] *= damping;

            let speed = (p.vel[0] * p.vel[0] + p.vel[1] * p.vel[1]).sqrt();
            if speed > max_speed {
                let scale = max_speed / speed;
                p.vel[0] *= scale;
                p.vel[1] *= scale;
            }

            // 60 fps baseline keeps behavior frame-rate independent.
            p.pos[0] += p.vel[0] * dt * 60.0;
            p.pos[1] += p.vel[1] * dt * 60.0;

            p.life -= dt;

            let out_of_bounds =
                p.pos[0] < 0.0 || p.pos[0] > width || p.pos[1] < 0.0 || p.pos[1] > height;
            if p.life <= 0.0 || out_of_bounds {
                p = respawn(p.seed, time, width, height, config);
            }

            *out = p;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FlowConfig, SimConfig};
    use crate::director::SceneParams;
    use crate::telemetry::RenderState;

    fn steady_params(scene: SceneId) -> SceneParams {
        SceneParams {
            scene,
            scene_t01: 0.5,
            transition_t01: 0.0,
            accent01: 0.0,
            camera_jitter: 0.0,
        }
    }

    fn run_frames(
        pool: &mut ParticlePool,
        flow: &FlowField,
        config: &SimConfig,
        params: &SceneParams,
        frames: usize,
        gpu: f32,
    ) {
        for i in 0..frames {
            let mut state = RenderState::idle(i as f32 / 60.0, 1.0 / 60.0);
            state.gpu_util01 = gpu;
            let inputs = SimInputs {
                state: &state,
                params,
                flow,
                config,
            };
            pool.step(&inputs);
            pool.swap();
        }
    }

    #[test]
    fn pool_size_is_invariant_under_respawn_churn() {
        let mut config = SimConfig::default();
        // Very short lives force constant respawning.
        config.life_min = 0.02;
        config.life_max = 0.05;

        let flow = FlowField::new(&FlowConfig::default());
        let mut pool = ParticlePool::new(512, 640.0, 360.0, 7, &config);
        let before = pool.len();

        run_frames(
            &mut pool,
            &flow,
            &config,
            &steady_params(SceneId::Drift),
            300,
            0.5,
        );

        assert_eq!(pool.len(), before);
        // Every respawn landed inside the viewport.
        for p in pool.current() {
            assert!((0.0..=640.0).contains(&p.pos[0]));
            assert!((0.0..=360.0).contains(&p.pos[1]));
            assert!(p.life > 0.0);
        }
    }

    #[test]
    fn initial_pool_respects_configured_ranges() {
        let mut config = SimConfig::default();
        config.life_min = 20.0;
        config.life_max = 30.0;
        config.size_min = 5.0;
        config.size_max = 6.0;

        // The configured ranges must shape the pool from frame zero, not
        // only after the first respawn churn.
        let pool = ParticlePool::new(128, 640.0, 360.0, 9, &config);
        for p in pool.current() {
            assert!((20.0..=30.0).contains(&p.life), "life {} out of range", p.life);
            assert!((5.0..=6.0).contains(&p.size), "size {} out of range", p.size);
            assert_eq!(p.life, p.max_life);
        }
    }

    #[test]
    fn step_never_mutates_the_read_buffer() {
        let config = SimConfig::default();
        let flow = FlowField::new(&FlowConfig::default());
        let mut pool = ParticlePool::new(64, 320.0, 240.0, 3, &config);

        let snapshot: Vec<Particle> = pool.current().to_vec();
        let state = RenderState::idle(0.0, 1.0 / 60.0);
        let params = steady_params(SceneId::Drift);
        let inputs = SimInputs {
            state: &state,
            params: &params,
            flow: &flow,
            config: &config,
        };
        pool.step(&inputs);

        // Before the swap, `current` is still the frame we read from.
        for (a, b) in snapshot.iter().zip(pool.current()) {
            assert_eq!(a.pos, b.pos);
            assert_eq!(a.vel, b.vel);
            assert_eq!(a.life, b.life);
        }
    }

    #[test]
    fn respawn_is_deterministic_for_seed_and_time() {
        let config = SimConfig::default();
        let a = respawn(42.5, 13.7, 1280.0, 720.0, &config);
        let b = respawn(42.5, 13.7, 1280.0, 720.0, &config);
        assert_eq!(a.pos, b.pos);
        assert_eq!(a.life, b.life);
        assert_eq!(a.size, b.size);

        // A different instant places the same particle elsewhere.
        let c = respawn(42.5, 13.8, 1280.0, 720.0, &config);
        assert!(a.pos != c.pos);
    }

    #[test]
    fn damping_tightens_with_load() {
        // Zero all forces so only damping acts on velocity.
        let mut config = SimConfig::default();
        config.flow_strength = 0.0;
        config.flow_strength_load = 0.0;
        config.turbulence = 0.0;
        config.converge_pull = 0.0;
        config.orbit_strength = 0.0;
        config.life_min = 100.0;
        config.life_max = 100.0;

        let flow = FlowField::new(&FlowConfig::default());
        let params = steady_params(SceneId::Drift);

        let speed_after = |gpu: f32| {
            let mut pool = ParticlePool::new(16, 10_000.0, 10_000.0, 11, &config);
            // Shove everything in one direction, then let damping work.
            for buffer in pool.buffers.iter_mut() {
                for p in buffer.iter_mut() {
                    p.pos = [5_000.0, 5_000.0];
                    p.vel = [3.0, 0.0];
                    p.life = 100.0;
                    p.max_life = 100.0;
                }
            }
            run_frames(&mut pool, &flow, &config, &params, 60, gpu);
            pool.current()[0].vel[0]
        };

        let idle = speed_after(0.0);
        let loaded = speed_after(1.0);
        assert!(loaded < idle, "full load should damp harder: {loaded} vs {idle}");
        assert!(idle > 0.0);
    }

    #[test]
    fn converge_scene_pulls_toward_center() {
        let mut config = SimConfig::default();
        config.flow_strength = 0.0;
        config.flow_strength_load = 0.0;
        config.turbulence = 0.0;
        config.life_min = 100.0;
        config.life_max = 100.0;

        let flow = FlowField::new(&FlowConfig::default());
        let mut params = steady_params(SceneId::Converge);
        params.scene_t01 = 1.0;

        let mut pool = ParticlePool::new(32, 1000.0, 1000.0, 5, &config);
        for buffer in pool.buffers.iter_mut() {
            for p in buffer.iter_mut() {
                p.pos = [100.0, 100.0];
                p.vel = [0.0, 0.0];
                p.life = 100.0;
                p.max_life = 100.0;
            }
        }

        let start_dist = {
            let p = pool.current()[0];
            ((p.pos[0] - 500.0).powi(2) + (p.pos[1] - 500.0).powi(2)).sqrt()
        };
        run_frames(&mut pool, &flow, &config, &params, 120, 0.0);
        let end_dist = {
            let p = pool.current()[0];
            ((p.pos[0] - 500.0).powi(2) + (p.pos[1] - 500.0).powi(2)).sqrt()
        };
        assert!(end_dist < start_dist, "{end_dist} should shrink from {start_dist}");
    }
}
