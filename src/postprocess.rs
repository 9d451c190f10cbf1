//! Multi-pass post-processing: bright-pass extraction, separable Gaussian
//! blur at half resolution, additive composite, then tonemap + grain +
//! vignette into the presentable frame.
//!
//! The pass order is load-bearing: the bright-pass reads the pre-tonemap HDR
//! buffer, because tonemapping first would flatten the highlight energy the
//! bloom depends on.

use image::{ImageBuffer, Rgb};

use crate::config::PostConfig;
use crate::draw::HdrBuffer;
use crate::flowfield::hash21;

/// The presentable surface handed back to the host.
pub type FrameBuffer = ImageBuffer<Rgb<u8>, Vec<u8>>;

/// Fixed 9-tap Gaussian kernel (sigma ~= 2), normalized.
pub const GAUSS9: [f32; 9] = [
    0.028532, 0.067234, 0.124009, 0.179044, 0.202360, 0.179044, 0.124009, 0.067234, 0.028532,
];

fn luma(rgb: [f32; 3]) -> f32 {
    0.2126 * rgb[0] + 0.7152 * rgb[1] + 0.0722 * rgb[2]
}

/// Owns the half-resolution working buffers and the cached vignette mask.
pub struct PostProcessor {
    width: u32,
    height: u32,
    half_w: u32,
    half_h: u32,

    bright: Vec<[f32; 3]>,
    scratch: Vec<[f32; 3]>,
    vignette_mask: Vec<f32>,

    config: PostConfig,
}

impl PostProcessor {
    pub fn new(width: u32, height: u32, config: &PostConfig) -> Self {
        let half_w = (width / 2).max(1);
        let half_h = (height / 2).max(1);
        Self {
            width,
            height,
            half_w,
            half_h,
            bright: vec![[0.0; 3]; (half_w * half_h) as usize],
            scratch: vec![[0.0; 3]; (half_w * half_h) as usize],
            vignette_mask: Self::vignette_mask(width, height),
            config: config.clone(),
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if self.width == width && self.height == height {
            return;
        }
        let config = self.config.clone();
        *self = Self::new(width, height, &config);
    }

    fn vignette_mask(width: u32, height: u32) -> Vec<f32> {
        let mut mask = vec![1.0f32; (width * height) as usize];
        let cx = width as f32 / 2.0;
        let cy = height as f32 / 2.0;

        for y in 0..height {
            for x in 0..width {
                let dx = (x as f32 - cx) / cx;
                let dy = (y as f32 - cy) / cy;
                let dist = (dx * dx + dy * dy).sqrt();
                let v = 1.0 - ((dist - 0.5) * 1.2).clamp(0.0, 1.0);
                mask[(y * width + x) as usize] = v.powf(1.5);
            }
        }
        mask
    }

    /// Bright-pass luma threshold for a given accent level. Drops as load
    /// rises: hotter system, more bloom allowed.
    pub fn threshold_for(&self, accent01: f32) -> f32 {
        (self.config.bloom_threshold - self.config.bloom_threshold_drop * accent01.clamp(0.0, 1.0))
            .max(0.05)
    }

    /// Composite intensity, bounded to [floor, floor + span].
    pub fn bloom_intensity_for(&self, accent01: f32) -> f32 {
        self.config.bloom_floor + self.config.bloom_span * accent01.clamp(0.0, 1.0)
    }

    /// Extract everything above the soft threshold into the half-res buffer.
    fn bright_pass(&mut self, hdr: &HdrBuffer, threshold: f32) {
        for hy in 0..self.half_h {
            for hx in 0..self.half_w {
                // 2x2 box average of the source.
                let x = (hx * 2).min(self.width - 1);
                let y = (hy * 2).min(self.height - 1);
                let x1 = (x + 1).min(self.width - 1);
                let y1 = (y + 1).min(self.height - 1);

                let mut avg = [0.0f32; 3];
                for &(sx, sy) in &[(x, y), (x1, y), (x, y1), (x1, y1)] {
                    let p = hdr.pixel(sx, sy);
                    avg[0] += p[0];
                    avg[1] += p[1];
                    avg[2] += p[2];
                }
                avg[0] *= 0.25;
                avg[1] *= 0.25;
                avg[2] *= 0.25;

                let l = luma(avg);
                let out = if l > threshold {
                    // Keep color, scale by how far past the threshold we are.
                    let factor = (l - threshold) / (l + 1e-4);
                    [avg[0] * factor, avg[1] * factor, avg[2] * factor]
                } else {
                    [0.0; 3]
                };
                self.bright[(hy * self.half_w + hx) as usize] = out;
            }
        }
    }

    fn blur_horizontal(src: &[[f32; 3]], dst: &mut [[f32; 3]], width: u32, height: u32) {
        let half = GAUSS9.len() as i32 / 2;
        for y in 0..height {
            for x in 0..width {
                let mut acc = [0.0f32; 3];
                for (k, &weight) in GAUSS9.iter().enumerate() {
                    let sx = (x as i32 + k as i32 - half).clamp(0, width as i32 - 1) as u32;
                    let p = src[(y * width + sx) as usize];
                    acc[0] += p[0] * weight;
                    acc[1] += p[1] * weight;
                    acc[2] += p[2] * weight;
                }
                dst[(y * width + x) as usize] = acc;
            }
        }
    }

    fn blur_vertical(src: &[[f32; 3]], dst: &mut [[f32; 3]], width: u32, height: u32) {
        let half = GAUSS9.len() as i32 / 2;
        for y in 0..height {
            for x in 0..width {
                let mut acc = [0.0f32; 3];
                for (k, &weight) in GAUSS9.iter().enumerate() {
                    let sy = (y as i32 + k as i32 - half).clamp(0, height as i32 - 1) as u32;
                    let p = src[(sy * width + x) as usize];
                    acc[0] += p[0] * weight;
                    acc[1] += p[1] * weight;
                    acc[2] += p[2] * weight;
                }
                dst[(y * width + x) as usize] = acc;
            }
        }
    }

    /// Bilinear sample of the blurred bright buffer at full-res coordinates.
    fn bloom_sample(&self, x: u32, y: u32) -> [f32; 3] {
        let fx = (x as f32 / 2.0).min(self.half_w as f32 - 1.0);
        let fy = (y as f32 / 2.0).min(self.half_h as f32 - 1.0);
        let x0 = fx as u32;
        let y0 = fy as u32;
        let x1 = (x0 + 1).min(self.half_w - 1);
        let y1 = (y0 + 1).min(self.half_h - 1);
        let u = fx - x0 as f32;
        let v = fy - y0 as f32;

        let mut out = [0.0f32; 3];
        for c in 0..3 {
            let p00 = self.bright[(y0 * self.half_w + x0) as usize][c];
            let p10 = self.bright[(y0 * self.half_w + x1) as usize][c];
            let p01 = self.bright[(y1 * self.half_w + x0) as usize][c];
            let p11 = self.bright[(y1 * self.half_w + x1) as usize][c];
            let top = p00 * (1.0 - u) + p10 * u;
            let bottom = p01 * (1.0 - u) + p11 * u;
            out[c] = top * (1.0 - v) + bottom * v;
        }
        out
    }

    /// Run the full chain into `out`. `time_sec` only drives the grain.
    pub fn process(
        &mut self,
        hdr: &HdrBuffer,
        accent01: f32,
        time_sec: f32,
        out: &mut FrameBuffer,
    ) -> anyhow::Result<()> {
        if hdr.width() != self.width || hdr.height() != self.height {
            anyhow::bail!(
                "HDR buffer {}x{} does not match post-processor {}x{}",
                hdr.width(),
                hdr.height(),
                self.width,
                self.height
            );
        }
        if out.width() != self.width || out.height() != self.height {
            anyhow::bail!(
                "output frame {}x{} does not match post-processor {}x{}",
                out.width(),
                out.height(),
                self.width,
                self.height
            );
        }

        // 1. Bright-pass on the pre-tonemap HDR buffer.
        let threshold = self.threshold_for(accent01);
        self.bright_pass(hdr, threshold);

        // 2. Separable blur at half resolution.
        Self::blur_horizontal(&self.bright, &mut self.scratch, self.half_w, self.half_h);
        Self::blur_vertical(&self.scratch, &mut self.bright, self.half_w, self.half_h);

        // 3+4. Composite, tonemap, grain, vignette in one sweep.
        let intensity = self.bloom_intensity_for(accent01);
        let grain_amp = self.config.grain;
        let vignette = self.config.vignette;

        for y in 0..self.height {
            for x in 0..self.width {
                let base = hdr.pixel(x, y);
                let bloom = self.bloom_sample(x, y);

                let mut c = [
                    base[0] + bloom[0] * intensity,
                    base[1] + bloom[1] * intensity,
                    base[2] + bloom[2] * intensity,
                ];

                // Reinhard keeps additive stacks out of clip.
                for ch in c.iter_mut() {
                    *ch /= 1.0 + *ch;
                }

                // Deterministic time-varying grain.
                let n = hash21(x as f32 * 12.9898 + time_sec, y as f32 * 78.233 - time_sec);
                let grain = (n * 2.0 - 1.0) * grain_amp;

                let mask = self.vignette_mask[(y * self.width + x) as usize];
                let vig = 1.0 - (1.0 - mask) * vignette;

                let px = out.get_pixel_mut(x, y);
                for ch in 0..3 {
                    let v = ((c[ch] + grain) * vig).clamp(0.0, 1.0);
                    px[ch] = (v * 255.0) as u8;
                }
            }
        }

        Ok(())
    }
}
