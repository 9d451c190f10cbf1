//! Particle draw stage: rasterizes the pool into a linear HDR scene buffer
//! as soft radial sprites with additive blending, plus the glowing ring
//! primitive. Additive-only blending keeps the pass order-insensitive and
//! gives the field its light-emitting look; everything here happens before
//! tonemapping so the bright-pass still sees real highlight energy.

use crate::config::{ColorScheme, RingConfig};
use crate::director::{scene_weight, SceneId, SceneParams};
use crate::particles::Particle;

/// Linear-light RGB scene buffer. 1.0 is nominal white; values above it are
/// highlight energy for the bloom chain.
pub struct HdrBuffer {
    width: u32,
    height: u32,
    data: Vec<[f32; 3]>,
}

impl HdrBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![[0.0; 3]; (width * height) as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[[f32; 3]] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> [f32; 3] {
        self.data[(y * self.width + x) as usize]
    }

    pub fn clear(&mut self, color: [f32; 3]) {
        for px in self.data.iter_mut() {
            *px = color;
        }
    }

    #[inline]
    fn add(&mut self, x: i32, y: i32, rgb: [f32; 3]) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        let idx = (y as u32 * self.width + x as u32) as usize;
        self.data[idx][0] += rgb[0];
        self.data[idx][1] += rgb[1];
        self.data[idx][2] += rgb[2];
    }

    /// Direct additive write, used by tests to stage synthetic content.
    pub fn add_pixel(&mut self, x: u32, y: u32, rgb: [f32; 3]) {
        self.add(x as i32, y as i32, rgb);
    }
}

fn lerp3(a: [f32; 3], b: [f32; 3], t: f32) -> [f32; 3] {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
    ]
}

/// Splat every particle as a soft radial sprite. The whole field shifts
/// toward the accent color as load rises; alpha is edge softness times the
/// remaining life fraction, so particles fade out instead of vanishing.
pub fn draw_particles(
    hdr: &mut HdrBuffer,
    particles: &[Particle],
    params: &SceneParams,
    colors: &ColorScheme,
) {
    let accent = params.accent01.clamp(0.0, 1.0);
    let color = lerp3(colors.base, colors.accent, accent);
    let brightness = 0.6 + 0.9 * accent;

    // Whole-field offset; the jitter value is already clamped tight, this
    // maps it to a handful of pixels.
    let short = hdr.width.min(hdr.height) as f32;
    let jitter_px = params.camera_jitter * 0.2 * short;

    for p in particles {
        let life_frac = (p.life / p.max_life.max(1e-6)).clamp(0.0, 1.0);
        if life_frac <= 0.0 {
            continue;
        }

        let cx = p.pos[0] + jitter_px;
        let cy = p.pos[1] + jitter_px * 0.6;
        let radius = p.size * (1.0 + 0.5 * accent);
        if radius < 0.3 {
            continue;
        }

        let min_x = (cx - radius).floor() as i32;
        let max_x = (cx + radius).ceil() as i32;
        let min_y = (cy - radius).floor() as i32;
        let max_y = (cy + radius).ceil() as i32;
        let radius_sq = radius * radius;

        for py in min_y..=max_y {
            for px in min_x..=max_x {
                let dx = px as f32 - cx;
                let dy = py as f32 - cy;
                let dist_sq = dx * dx + dy * dy;
                if dist_sq > radius_sq {
                    continue;
                }

                // Bright core, soft outer edge.
                let t = (dist_sq.sqrt() / radius).clamp(0.0, 1.0);
                let falloff = (1.0 - t).powf(1.8);
                let a = falloff * life_frac * brightness;

                hdr.add(px, py, [color[0] * a, color[1] * a, color[2] * a]);
            }
        }
    }
}

/// The glowing ring: an additive Gaussian band around a centered radius.
/// Intensity follows the Halo scene weight so the crossfade carries it in
/// and out; the radius breathes with scene progress.
pub fn draw_ring(hdr: &mut HdrBuffer, params: &SceneParams, colors: &ColorScheme, ring: &RingConfig) {
    let weight = scene_weight(params, SceneId::Halo);
    if weight <= 0.001 {
        return;
    }

    let w = hdr.width as f32;
    let h = hdr.height as f32;
    let short = w.min(h);
    let cx = w / 2.0;
    let cy = h / 2.0;

    let breathe = (params.scene_t01 * std::f32::consts::TAU).sin() * ring.breathe;
    let radius = ring.radius01 * short * (1.0 + breathe);
    let sigma = (ring.thickness01 * short).max(0.5);
    let intensity = ring.intensity * weight * (0.6 + 0.4 * params.accent01);

    // Only touch the annulus the band can reach.
    let reach = radius + 4.0 * sigma;
    let min_y = ((cy - reach).floor() as i32).max(0);
    let max_y = ((cy + reach).ceil() as i32).min(h as i32 - 1);
    let min_x = ((cx - reach).floor() as i32).max(0);
    let max_x = ((cx + reach).ceil() as i32).min(w as i32 - 1);
    let inner = (radius - 4.0 * sigma).max(0.0);

    for py in min_y..=max_y {
        for px in min_x..=max_x {
            let dx = px as f32 - cx;
            let dy = py as f32 - cy;
            let dist = (dx * dx + dy * dy).sqrt();
            if dist < inner || dist > reach {
                continue;
            }
            let d = dist - radius;
            let fall = (-d * d / (2.0 * sigma * sigma)).exp();
            let a = fall * intensity;
            hdr.add(
                px,
                py,
                [colors.ring[0] * a, colors.ring[1] * a, colors.ring[2] * a],
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(scene: SceneId, accent: f32) -> SceneParams {
        SceneParams {
            scene,
            scene_t01: 0.25,
            transition_t01: 0.0,
            accent01: accent,
            camera_jitter: 0.0,
        }
    }

    fn particle_at(x: f32, y: f32) -> Particle {
        Particle {
            pos: [x, y],
            vel: [0.0, 0.0],
            life: 5.0,
            max_life: 5.0,
            seed: 1.0,
            size: 3.0,
        }
    }

    fn total_energy(hdr: &HdrBuffer) -> f32 {
        hdr.pixels().iter().map(|p| p[0] + p[1] + p[2]).sum()
    }

    #[test]
    fn sprites_are_additive_and_centered() {
        let mut hdr = HdrBuffer::new(64, 64);
        hdr.clear([0.0; 3]);
        let colors = ColorScheme::default();
        draw_particles(
            &mut hdr,
            &[particle_at(32.0, 32.0)],
            &params(SceneId::Drift, 0.0),
            &colors,
        );

        let center = hdr.pixel(32, 32);
        let edge = hdr.pixel(35, 32);
        let far = hdr.pixel(50, 32);
        assert!(center[2] > edge[2], "soft falloff from core to edge");
        assert_eq!(far, [0.0; 3]);
        assert!(total_energy(&hdr) > 0.0);
    }

    #[test]
    fn aged_particles_fade_out() {
        let colors = ColorScheme::default();
        let p = params(SceneId::Drift, 0.0);

        let mut fresh = HdrBuffer::new(32, 32);
        fresh.clear([0.0; 3]);
        draw_particles(&mut fresh, &[particle_at(16.0, 16.0)], &p, &colors);

        let mut dying = HdrBuffer::new(32, 32);
        dying.clear([0.0; 3]);
        let mut old = particle_at(16.0, 16.0);
        old.life = 0.5;
        draw_particles(&mut dying, &[old], &p, &colors);

        assert!(total_energy(&dying) < total_energy(&fresh) * 0.2);
    }

    #[test]
    fn accent_shifts_field_toward_hot_color() {
        let colors = ColorScheme::default();

        let mut cold = HdrBuffer::new(32, 32);
        cold.clear([0.0; 3]);
        draw_particles(
            &mut cold,
            &[particle_at(16.0, 16.0)],
            &params(SceneId::Drift, 0.0),
            &colors,
        );

        let mut hot = HdrBuffer::new(32, 32);
        hot.clear([0.0; 3]);
        draw_particles(
            &mut hot,
            &[particle_at(16.0, 16.0)],
            &params(SceneId::Drift, 1.0),
            &colors,
        );

        // Default scheme: base is blue-heavy, accent is red-heavy.
        let c = cold.pixel(16, 16);
        let h = hot.pixel(16, 16);
        assert!(c[2] > c[0]);
        assert!(h[0] > h[2]);
    }

    #[test]
    fn ring_only_shows_around_halo() {
        let colors = ColorScheme::default();
        let ring = RingConfig::default();

        let mut off = HdrBuffer::new(128, 128);
        off.clear([0.0; 3]);
        draw_ring(&mut off, &params(SceneId::Drift, 0.5), &colors, &ring);
        assert_eq!(total_energy(&off), 0.0);

        let mut on = HdrBuffer::new(128, 128);
        on.clear([0.0; 3]);
        draw_ring(&mut on, &params(SceneId::Halo, 0.5), &colors, &ring);
        assert!(total_energy(&on) > 0.0);

        // Crossfading out of Halo keeps a weakened ring.
        let mut fading_params = params(SceneId::Halo, 0.5);
        fading_params.transition_t01 = 0.9;
        let mut fading = HdrBuffer::new(128, 128);
        fading.clear([0.0; 3]);
        draw_ring(&mut fading, &fading_params, &colors, &ring);
        let faded = total_energy(&fading);
        assert!(faded > 0.0 && faded < total_energy(&on));
    }

    #[test]
    fn ring_peaks_at_its_radius() {
        let colors = ColorScheme::default();
        let ring = RingConfig::default();
        let mut hdr = HdrBuffer::new(200, 200);
        hdr.clear([0.0; 3]);
        let mut p = params(SceneId::Halo, 0.0);
        p.scene_t01 = 0.0; // no breathing offset
        draw_ring(&mut hdr, &p, &colors, &ring);

        let radius = (ring.radius01 * 200.0) as u32;
        let on_band = hdr.pixel(100 + radius, 100);
        let center = hdr.pixel(100, 100);
        assert!(on_band[1] > center[1]);
    }
}
