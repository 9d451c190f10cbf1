//! Render Loop Orchestrator. Owns every subsystem exclusively and runs the
//! fixed per-frame sequence: telemetry -> director -> flow field -> particle
//! step -> buffer swap -> draw -> post-processing. The host drives `tick`
//! once per display refresh with its monotonic clock; everything else is
//! internal.
//!
//! Failure semantics are fail-stop: a frame either completes all stages or
//! the engine stops and surfaces the error. There is no partial-frame
//! presentation path.

use crate::config::EngineConfig;
use crate::director::{SceneDirector, SceneParams};
use crate::draw::{draw_particles, draw_ring, HdrBuffer};
use crate::flowfield::FlowField;
use crate::particles::{ParticlePool, SimInputs};
use crate::postprocess::{FrameBuffer, PostProcessor};
use crate::telemetry::{RenderState, TelemetryAdapter, TelemetrySource};
use crate::clamp_dt;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RunState {
    Stopped,
    Running,
}

pub struct Engine {
    config: EngineConfig,
    adapter: TelemetryAdapter,
    director: SceneDirector,
    flow: FlowField,
    pool: ParticlePool,
    hdr: HdrBuffer,
    post: PostProcessor,
    frame: FrameBuffer,

    run_state: RunState,
    last_tick: Option<f32>,
    frame_index: u64,
    last_dt: f32,
    last_render_state: RenderState,
    last_params: Option<SceneParams>,
}

impl Engine {
    /// Validates the configuration and allocates every buffer up front.
    /// Construction either fully succeeds or leaves nothing behind.
    pub fn new(config: EngineConfig, source: Box<dyn TelemetrySource>) -> anyhow::Result<Self> {
        config.validate()?;

        let adapter = TelemetryAdapter::new(
            source,
            config.poll_interval_sec,
            config.stale_after_sec,
        );
        let flow = FlowField::new(&config.flow);
        let pool = ParticlePool::new(
            config.particle_count,
            config.width as f32,
            config.height as f32,
            config.seed,
            &config.sim,
        );
        let hdr = HdrBuffer::new(config.width, config.height);
        let post = PostProcessor::new(config.width, config.height, &config.post);
        let frame = FrameBuffer::new(config.width, config.height);

        Ok(Self {
            config,
            adapter,
            director: SceneDirector::new(),
            flow,
            pool,
            hdr,
            post,
            frame,
            run_state: RunState::Stopped,
            last_tick: None,
            frame_index: 0,
            last_dt: 1.0 / 60.0,
            last_render_state: RenderState::idle(0.0, 1.0 / 60.0),
            last_params: None,
        })
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    /// Begin (or restart) the show from the top of the rotation. Telemetry
    /// polling resumes with the run.
    pub fn start(&mut self, now: f32) {
        self.director.reset();
        self.adapter.resume();
        self.last_tick = Some(now);
        self.frame_index = 0;
        self.run_state = RunState::Running;
        log::info!(
            "engine started: {}x{}, {} particles",
            self.config.width,
            self.config.height,
            self.config.particle_count
        );
    }

    /// Stop rendering and pause telemetry polling. Idempotent; later `tick`
    /// calls are silent no-ops until the next `start`, which resumes polling.
    /// The source itself is only released when the engine is dropped.
    pub fn stop(&mut self) {
        if self.run_state == RunState::Stopped {
            return;
        }
        self.run_state = RunState::Stopped;
        self.adapter.pause();
        log::info!("engine stopped after {} frames", self.frame_index);
    }

    /// Advance one frame. `now` is the host's monotonic clock in seconds.
    pub fn tick(&mut self, now: f32) -> anyhow::Result<()> {
        if self.run_state != RunState::Running {
            return Ok(());
        }

        let raw_dt = self
            .last_tick
            .map(|last| now - last)
            .unwrap_or(1.0 / 60.0);
        self.last_tick = Some(now);
        let dt = clamp_dt(raw_dt);
        self.last_dt = dt;

        if let Err(err) = self.render_frame(now, dt) {
            log::error!("frame {} failed: {err:#}", self.frame_index);
            self.stop();
            return Err(err);
        }

        self.frame_index += 1;
        Ok(())
    }

    fn render_frame(&mut self, now: f32, dt: f32) -> anyhow::Result<()> {
        // Telemetry ingestion is throttled internally and never fails.
        self.adapter.update(now);
        let state = self.adapter.state(now, dt);

        let params = self.director.update(&state);

        // The field is regenerated on a fixed frame cadence, always before
        // the simulation consumes it.
        if self.frame_index % self.config.flow.regen_interval_frames == 0 {
            self.flow.regenerate(now, state.gpu_util01);
        }

        let inputs = SimInputs {
            state: &state,
            params: &params,
            flow: &self.flow,
            config: &self.config.sim,
        };
        self.pool.step(&inputs);
        self.pool.swap();

        self.hdr.clear(self.config.colors.background);
        draw_particles(&mut self.hdr, self.pool.current(), &params, &self.config.colors);
        draw_ring(&mut self.hdr, &params, &self.config.colors, &self.config.ring);

        self.post
            .process(&self.hdr, params.accent01, now, &mut self.frame)?;

        self.last_render_state = state;
        self.last_params = Some(params);
        Ok(())
    }

    /// Reallocate every size-dependent buffer. The pool is reseeded at the
    /// new dimensions; scene timing is untouched.
    pub fn resize(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        if width < 16 || height < 16 {
            anyhow::bail!("viewport too small: {width}x{height}");
        }
        if width == self.config.width && height == self.config.height {
            return Ok(());
        }

        self.config.width = width;
        self.config.height = height;
        self.hdr = HdrBuffer::new(width, height);
        self.post.resize(width, height);
        self.frame = FrameBuffer::new(width, height);
        self.pool = ParticlePool::new(
            self.config.particle_count,
            width as f32,
            height as f32,
            self.config.seed,
            &self.config.sim,
        );
        log::info!("resized to {width}x{height}");
        Ok(())
    }

    /// The most recently completed presentable frame.
    pub fn frame(&self) -> &FrameBuffer {
        &self.frame
    }

    pub fn render_state(&self) -> &RenderState {
        &self.last_render_state
    }

    pub fn scene_params(&self) -> Option<&SceneParams> {
        self.last_params.as_ref()
    }

    pub fn last_dt(&self) -> f32 {
        self.last_dt
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
        self.adapter.shutdown();
    }
}
