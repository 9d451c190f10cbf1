//! Procedural flow field: a low-resolution 2D vector grid regenerated from a
//! time-varying curl-noise function. Particles sample it bilinearly at their
//! normalized screen position. Regeneration is throttled by the orchestrator
//! (every 3rd frame) and always happens before the field is consumed, so
//! there is never a read/write overlap within a frame.

use crate::config::FlowConfig;

/// Deterministic 2D hash in [0, 1). Also drives particle respawn placement.
pub(crate) fn hash21(x: f32, y: f32) -> f32 {
    let n = (x * 127.1 + y * 311.7).sin() * 43758.5453;
    n - n.floor()
}

/// Smoothed value noise in [0, 1).
pub fn value_noise(x: f32, y: f32) -> f32 {
    let xi = x.floor();
    let yi = y.floor();
    let xf = x - xi;
    let yf = y - yi;

    // Hermite fade
    let u = xf * xf * (3.0 - 2.0 * xf);
    let v = yf * yf * (3.0 - 2.0 * yf);

    let a = hash21(xi, yi);
    let b = hash21(xi + 1.0, yi);
    let c = hash21(xi, yi + 1.0);
    let d = hash21(xi + 1.0, yi + 1.0);

    let top = a + (b - a) * u;
    let bottom = c + (d - c) * u;
    top + (bottom - top) * v
}

/// Divergence-free drift direction: the 2D curl of the noise potential.
pub fn curl(x: f32, y: f32) -> [f32; 2] {
    const EPS: f32 = 0.01;
    let dx = (value_noise(x + EPS, y) - value_noise(x - EPS, y)) / (2.0 * EPS);
    let dy = (value_noise(x, y + EPS) - value_noise(x, y - EPS)) / (2.0 * EPS);
    [dy, -dx]
}

/// The sampled vector grid. Written only by `regenerate`, read everywhere
/// else.
pub struct FlowField {
    cols: usize,
    rows: usize,
    vectors: Vec<[f32; 2]>,
    noise_scale: f32,
    base_swirl: f32,
    load_swirl: f32,
}

impl FlowField {
    pub fn new(config: &FlowConfig) -> Self {
        let mut field = Self {
            cols: config.cols,
            rows: config.rows,
            vectors: vec![[0.0, 0.0]; config.cols * config.rows],
            noise_scale: config.noise_scale,
            base_swirl: config.base_swirl,
            load_swirl: config.load_swirl,
        };
        field.regenerate(0.0, 0.0);
        field
    }

    /// Rebuild every cell from the analytic curl function at the given time.
    /// Swirl magnitude scales with GPU load.
    pub fn regenerate(&mut self, time_sec: f32, swirl01: f32) {
        let magnitude = self.base_swirl + self.load_swirl * swirl01.clamp(0.0, 1.0);
        let tx = time_sec * 0.13;
        let ty = time_sec * 0.09;

        for row in 0..self.rows {
            for col in 0..self.cols {
                let nx = col as f32 / (self.cols - 1) as f32 * self.noise_scale + tx;
                let ny = row as f32 / (self.rows - 1) as f32 * self.noise_scale - ty;
                let v = curl(nx, ny);
                self.vectors[row * self.cols + col] = [v[0] * magnitude, v[1] * magnitude];
            }
        }
    }

    /// Bilinear sample at a normalized screen position. Out-of-range
    /// coordinates clamp to the border cells.
    pub fn sample(&self, x01: f32, y01: f32) -> [f32; 2] {
        let fx = x01.clamp(0.0, 1.0) * (self.cols - 1) as f32;
        let fy = y01.clamp(0.0, 1.0) * (self.rows - 1) as f32;

        let x0 = fx as usize;
        let y0 = fy as usize;
        let x1 = (x0 + 1).min(self.cols - 1);
        let y1 = (y0 + 1).min(self.rows - 1);
        let u = fx - x0 as f32;
        let v = fy - y0 as f32;

        let p00 = self.vectors[y0 * self.cols + x0];
        let p10 = self.vectors[y0 * self.cols + x1];
        let p01 = self.vectors[y1 * self.cols + x0];
        let p11 = self.vectors[y1 * self.cols + x1];

        let top = [p00[0] + (p10[0] - p00[0]) * u, p00[1] + (p10[1] - p00[1]) * u];
        let bottom = [p01[0] + (p11[0] - p01[0]) * u, p01[1] + (p11[1] - p01[1]) * u];
        [
            top[0] + (bottom[0] - top[0]) * v,
            top[1] + (bottom[1] - top[1]) * v,
        ]
    }
}
