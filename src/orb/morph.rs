//! Audio-reactive orb deformation.
//!
//! Each base vertex is pushed along its direction by the volume plus a
//! slowly drifting noise term. Output goes into a scratch buffer owned by
//! [`OrbMorph`], so the per-frame path never allocates.

use super::mesh::{icosphere, Vertex};
use super::noise::Simplex3;
use crate::audio::LiveMeter;
use crate::config::{
    AppConfig, DEFAULT_NOISE_TIME_FACTOR, DEFAULT_ORB_DETAIL, DEFAULT_ORB_INTENSITY,
    DEFAULT_ORB_RADIUS,
};
use std::f32::consts::TAU;

/// Radial push per unit of volume, before intensity.
pub const AMPLITUDE_GAIN: f32 = 4.0;
/// Noise amplitude per unit of intensity.
pub const NOISE_GAIN: f32 = 2.5;
/// Per-axis multipliers on the time offset fed to the noise field.
pub const NOISE_TIME_AXES: [f64; 3] = [7.0, 8.0, 9.0];
/// Uniform scale renderers apply to the orb.
pub const DRAWN_SCALE: f32 = 1.3;
/// Y rotation per frame on handheld targets.
pub const ROTATION_STEP_MOBILE: f32 = 0.04;
/// Y rotation per frame on desktop/browser targets.
pub const ROTATION_STEP_WEB: f32 = 0.005;
/// Hue span swept by volume while listening (degrees).
pub const LISTENING_HUE_SPAN: f32 = 120.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbConfig {
    pub radius: f32,
    pub detail: u32,
    pub intensity: f32,
    pub noise_time_factor: f64,
    pub seed: Option<u64>,
}

impl Default for OrbConfig {
    fn default() -> Self {
        Self {
            radius: DEFAULT_ORB_RADIUS,
            detail: DEFAULT_ORB_DETAIL,
            intensity: DEFAULT_ORB_INTENSITY,
            noise_time_factor: DEFAULT_NOISE_TIME_FACTOR,
            seed: None,
        }
    }
}

impl From<&AppConfig> for OrbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            radius: cfg.orb_radius,
            detail: cfg.orb_detail,
            intensity: cfg.orb_intensity,
            noise_time_factor: cfg.noise_time_factor,
            seed: cfg.orb_seed,
        }
    }
}

/// Which side of the conversation the orb is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrbMode {
    /// Input: hue follows volume from red to green.
    Listening,
    /// Output: fixed blue.
    Speaking,
}

impl OrbMode {
    pub fn color(self, volume: f32) -> Hsl {
        match self {
            OrbMode::Listening => Hsl::new(clamp_volume(volume) * LISTENING_HUE_SPAN, 1.0, 0.5),
            OrbMode::Speaking => Hsl::SPEAKING,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            OrbMode::Listening => "listening",
            OrbMode::Speaking => "speaking",
        }
    }
}

/// Hue in degrees, saturation and lightness in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsl {
    pub h: f32,
    pub s: f32,
    pub l: f32,
}

impl Hsl {
    pub const SPEAKING: Hsl = Hsl {
        h: 210.0,
        s: 1.0,
        l: 0.56,
    };

    pub const fn new(h: f32, s: f32, l: f32) -> Self {
        Self { h, s, l }
    }

    pub fn to_rgb(self) -> [f32; 3] {
        let h = self.h.rem_euclid(360.0) / 60.0;
        let s = self.s.clamp(0.0, 1.0);
        let l = self.l.clamp(0.0, 1.0);
        let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
        let x = c * (1.0 - (h.rem_euclid(2.0) - 1.0).abs());
        let (r, g, b) = match h as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };
        let m = l - c / 2.0;
        [r + m, g + m, b + m]
    }

    pub fn to_rgb8(self) -> [u8; 3] {
        self.to_rgb()
            .map(|channel| (channel.clamp(0.0, 1.0) * 255.0).round() as u8)
    }

    pub fn css(self) -> String {
        format!(
            "hsl({}, {}%, {}%)",
            self.h.round(),
            (self.s * 100.0).round(),
            (self.l * 100.0).round()
        )
    }
}

/// Seeded deformation over a fixed base mesh.
pub struct OrbMorph {
    cfg: OrbConfig,
    base: Vec<Vertex>,
    directions: Vec<Vertex>,
    base_radius: Vec<f32>,
    displaced: Vec<Vertex>,
    noise: Simplex3,
}

impl OrbMorph {
    /// Icosphere of the configured radius and detail.
    pub fn new(cfg: OrbConfig) -> Self {
        let mesh = icosphere(cfg.radius, cfg.detail);
        Self::from_vertices(mesh.vertices, cfg)
    }

    /// Deform an arbitrary base mesh. The noise field is seeded here, once.
    pub fn from_vertices(base: Vec<Vertex>, cfg: OrbConfig) -> Self {
        let noise = match cfg.seed {
            Some(seed) => Simplex3::new(seed),
            None => Simplex3::random(),
        };
        let directions = base.iter().map(|v| v.normalized()).collect();
        let base_radius = base.iter().map(|v| v.length()).collect();
        Self {
            displaced: base.clone(),
            cfg,
            base,
            directions,
            base_radius,
            noise,
        }
    }

    pub fn config(&self) -> &OrbConfig {
        &self.cfg
    }

    pub fn seed(&self) -> u64 {
        self.noise.seed()
    }

    pub fn base(&self) -> &[Vertex] {
        &self.base
    }

    /// Most recent output.
    pub fn vertices(&self) -> &[Vertex] {
        &self.displaced
    }

    /// Deform for this frame. Zero volume yields the base mesh bit for bit.
    pub fn morph(&mut self, volume: f32, time_ms: f64, mode: OrbMode) -> (&[Vertex], Hsl) {
        let volume = clamp_volume(volume);
        let color = mode.color(volume);
        if volume == 0.0 {
            return (self.reset(), color);
        }
        let intensity = self.cfg.intensity;
        let push = volume * AMPLITUDE_GAIN * intensity;
        let noise_amp = NOISE_GAIN * intensity * volume;
        let drift = time_ms * self.cfg.noise_time_factor;
        let offset = NOISE_TIME_AXES.map(|axis| drift * axis);

        for ((out, dir), radius) in self
            .displaced
            .iter_mut()
            .zip(&self.directions)
            .zip(&self.base_radius)
        {
            let n = self.noise.sample(
                f64::from(dir.x) + offset[0],
                f64::from(dir.y) + offset[1],
                f64::from(dir.z) + offset[2],
            ) as f32;
            *out = dir.scaled(radius + push + n * noise_amp);
        }
        (&self.displaced, color)
    }

    /// Restore the exact base positions.
    pub fn reset(&mut self) -> &[Vertex] {
        self.displaced.copy_from_slice(&self.base);
        &self.displaced
    }
}

/// One rendered frame.
#[derive(Debug, Clone, Copy)]
pub struct OrbFrame<'a> {
    pub vertices: &'a [Vertex],
    pub color: Hsl,
    pub rotation_y: f32,
    pub scale: f32,
}

/// Frame driver: rotates the orb group and picks morph or reset each tick.
pub struct OrbAnimator {
    morph: OrbMorph,
    rotation_y: f32,
    rotation_step: f32,
}

impl OrbAnimator {
    pub fn new(morph: OrbMorph, rotation_step: f32) -> Self {
        Self {
            morph,
            rotation_y: 0.0,
            rotation_step,
        }
    }

    pub fn morph(&self) -> &OrbMorph {
        &self.morph
    }

    pub fn rotation_y(&self) -> f32 {
        self.rotation_y
    }

    /// Advance one animation frame. Inactive frames snap back to the base mesh.
    pub fn frame(
        &mut self,
        active: bool,
        volume: f32,
        time_ms: f64,
        mode: OrbMode,
    ) -> OrbFrame<'_> {
        self.rotation_y = (self.rotation_y + self.rotation_step).rem_euclid(TAU);
        let (vertices, color) = if active {
            self.morph.morph(volume, time_ms, mode)
        } else {
            (self.morph.reset(), mode.color(0.0))
        };
        OrbFrame {
            vertices,
            color,
            rotation_y: self.rotation_y,
            scale: DRAWN_SCALE,
        }
    }

    /// Read the latest level from the meter, tolerating a one-frame lag.
    pub fn frame_from_meter(
        &mut self,
        meter: &LiveMeter,
        time_ms: f64,
        mode: OrbMode,
    ) -> OrbFrame<'_> {
        let active = meter.is_active();
        let volume = meter.visual_level();
        self.frame(active, volume, time_ms, mode)
    }
}

fn clamp_volume(volume: f32) -> f32 {
    if volume.is_finite() {
        volume.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(detail: u32) -> OrbMorph {
        OrbMorph::new(OrbConfig {
            detail,
            seed: Some(1234),
            ..OrbConfig::default()
        })
    }

    #[test]
    fn zero_volume_returns_exact_base_after_many_frames() {
        let mut orb = seeded(3);
        let base = orb.base().to_vec();
        for frame in 0..120 {
            orb.morph(0.8, f64::from(frame) * 16.7, OrbMode::Listening);
        }
        assert_ne!(orb.vertices(), base.as_slice());
        for frame in 120..240 {
            let (vertices, _) = orb.morph(0.0, f64::from(frame) * 16.7, OrbMode::Listening);
            assert_eq!(vertices, base.as_slice());
        }
    }

    #[test]
    fn displacement_stays_within_gain_envelope() {
        let mut orb = seeded(2);
        let cfg = *orb.config();
        let volume = 0.5;
        let centre = cfg.radius + volume * AMPLITUDE_GAIN * cfg.intensity;
        let spread = NOISE_GAIN * cfg.intensity * volume;
        let directions: Vec<_> = orb.base().iter().map(|v| v.normalized()).collect();
        let (vertices, _) = orb.morph(volume, 5_000.0, OrbMode::Listening);
        for (v, dir) in vertices.iter().zip(&directions) {
            let len = v.length();
            assert!((len - centre).abs() <= spread + 1e-3, "{len}");
            assert!(v.normalized().dot(*dir) > 0.9999);
        }
    }

    #[test]
    fn same_seed_gives_same_frames() {
        let mut a = seeded(2);
        let mut b = seeded(2);
        let (va, _) = a.morph(0.6, 1_234.0, OrbMode::Speaking);
        let va = va.to_vec();
        let (vb, _) = b.morph(0.6, 1_234.0, OrbMode::Speaking);
        assert_eq!(va, vb);
    }

    #[test]
    fn morph_reuses_its_output_buffer() {
        let mut orb = seeded(2);
        let first = orb.morph(0.4, 0.0, OrbMode::Listening).0.as_ptr();
        let second = orb.morph(0.7, 16.0, OrbMode::Listening).0.as_ptr();
        let reset = orb.reset().as_ptr();
        assert_eq!(first, second);
        assert_eq!(first, reset);
    }

    #[test]
    fn consecutive_frames_drift_smoothly() {
        let mut orb = seeded(2);
        let a = orb.morph(0.9, 10_000.0, OrbMode::Listening).0.to_vec();
        let b = orb.morph(0.9, 10_016.0, OrbMode::Listening).0.to_vec();
        for (p, q) in a.iter().zip(&b) {
            assert!((p.length() - q.length()).abs() < 0.05);
        }
    }

    #[test]
    fn colors_distinguish_listening_and_speaking() {
        assert_eq!(OrbMode::Listening.color(0.5).h, 60.0);
        assert_eq!(OrbMode::Listening.color(2.0).h, 120.0);
        assert_eq!(OrbMode::Listening.color(f32::NAN).h, 0.0);
        assert_eq!(OrbMode::Speaking.color(0.9), Hsl::SPEAKING);
        assert_eq!(Hsl::SPEAKING.css(), "hsl(210, 100%, 56%)");
    }

    #[test]
    fn hsl_converts_to_rgb() {
        let close = |a: [f32; 3], b: [f32; 3]| a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-4);
        assert!(close(Hsl::new(0.0, 1.0, 0.5).to_rgb(), [1.0, 0.0, 0.0]));
        assert!(close(Hsl::new(120.0, 1.0, 0.5).to_rgb(), [0.0, 1.0, 0.0]));
        assert!(close(Hsl::SPEAKING.to_rgb(), [0.12, 0.56, 1.0]));
        assert_eq!(Hsl::new(0.0, 0.0, 1.0).to_rgb8(), [255, 255, 255]);
    }

    #[test]
    fn animator_rotates_and_resets_when_idle() {
        let mut animator = OrbAnimator::new(seeded(1), ROTATION_STEP_MOBILE);
        let base = animator.morph().base().to_vec();
        let frame = animator.frame(true, 0.7, 100.0, OrbMode::Listening);
        assert_eq!(frame.scale, DRAWN_SCALE);
        assert_ne!(frame.vertices, base.as_slice());
        let frame = animator.frame(false, 0.7, 116.0, OrbMode::Listening);
        assert_eq!(frame.vertices, base.as_slice());
        assert!((animator.rotation_y() - 2.0 * ROTATION_STEP_MOBILE).abs() < 1e-6);
    }

    #[test]
    fn animator_follows_meter_activity() {
        let meter = LiveMeter::new();
        let mut animator = OrbAnimator::new(seeded(1), ROTATION_STEP_WEB);
        let base = animator.morph().base().to_vec();
        meter.publish(0.6, 0.6);
        let idle = animator.frame_from_meter(&meter, 0.0, OrbMode::Listening).vertices.to_vec();
        assert_eq!(idle, base);
        meter.set_active(true);
        let live = animator.frame_from_meter(&meter, 16.0, OrbMode::Listening);
        assert_ne!(live.vertices, base.as_slice());
        assert!((live.color.h - 72.0).abs() < 1e-3);
    }
}
