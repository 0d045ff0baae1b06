//! Loudness smoothing for the VAD and the orb.
//!
//! The VAD reads a symmetric average (EMA or fixed window). The orb reads an
//! attack/release envelope so it rises quickly and decays gently.

use crate::config::{
    AppConfig, SmoothingMode, DEFAULT_ATTACK, DEFAULT_EMA_ALPHA, DEFAULT_RELEASE,
    DEFAULT_SMOOTHING, DEFAULT_SMOOTHING_WINDOW,
};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmootherConfig {
    pub mode: SmoothingMode,
    pub alpha: f32,
    pub window: usize,
    pub attack: f32,
    pub release: f32,
}

impl Default for SmootherConfig {
    fn default() -> Self {
        Self {
            mode: DEFAULT_SMOOTHING,
            alpha: DEFAULT_EMA_ALPHA,
            window: DEFAULT_SMOOTHING_WINDOW,
            attack: DEFAULT_ATTACK,
            release: DEFAULT_RELEASE,
        }
    }
}

impl From<&AppConfig> for SmootherConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            mode: cfg.smoothing,
            alpha: cfg.ema_alpha,
            window: cfg.smoothing_window,
            attack: cfg.attack,
            release: cfg.release,
        }
    }
}

enum Strategy {
    Ema { alpha: f32 },
    Window { samples: VecDeque<f32>, size: usize },
}

/// Moving average over loudness samples. Owned by a single listener.
pub struct LoudnessSmoother {
    strategy: Strategy,
    value: f32,
}

impl LoudnessSmoother {
    pub fn new(cfg: &SmootherConfig) -> Self {
        let strategy = match cfg.mode {
            SmoothingMode::Ema => Strategy::Ema {
                alpha: cfg.alpha.clamp(f32::EPSILON, 1.0),
            },
            SmoothingMode::Window => {
                let size = cfg.window.max(1);
                Strategy::Window {
                    samples: VecDeque::with_capacity(size),
                    size,
                }
            }
        };
        Self {
            strategy,
            value: 0.0,
        }
    }

    pub fn ema(alpha: f32) -> Self {
        Self::new(&SmootherConfig {
            mode: SmoothingMode::Ema,
            alpha,
            ..SmootherConfig::default()
        })
    }

    pub fn window(size: usize) -> Self {
        Self::new(&SmootherConfig {
            mode: SmoothingMode::Window,
            window: size,
            ..SmootherConfig::default()
        })
    }

    /// Fold one sample in and return the new smoothed loudness.
    pub fn push(&mut self, sample: f32) -> f32 {
        let sample = if sample.is_finite() {
            sample.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.value = match &mut self.strategy {
            Strategy::Ema { alpha } => self.value + *alpha * (sample - self.value),
            Strategy::Window { samples, size } => {
                if samples.len() == *size {
                    samples.pop_front();
                }
                samples.push_back(sample);
                // Recomputed each time so float error never accumulates.
                samples.iter().sum::<f32>() / samples.len() as f32
            }
        };
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    /// Drop all history so a new session starts from silence.
    pub fn reset(&mut self) {
        self.value = 0.0;
        if let Strategy::Window { samples, .. } = &mut self.strategy {
            samples.clear();
        }
    }

    pub fn mode(&self) -> SmoothingMode {
        match self.strategy {
            Strategy::Ema { .. } => SmoothingMode::Ema,
            Strategy::Window { .. } => SmoothingMode::Window,
        }
    }
}

/// Asymmetric envelope follower used for visuals.
#[derive(Debug, Clone, Copy)]
pub struct AttackRelease {
    attack: f32,
    release: f32,
    value: f32,
}

impl AttackRelease {
    pub fn new(attack: f32, release: f32) -> Self {
        Self {
            attack: attack.clamp(f32::EPSILON, 1.0),
            release: release.clamp(f32::EPSILON, 1.0),
            value: 0.0,
        }
    }

    pub fn push(&mut self, sample: f32) -> f32 {
        let sample = if sample.is_finite() {
            sample.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let coeff = if sample > self.value {
            self.attack
        } else {
            self.release
        };
        self.value += coeff * (sample - self.value);
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
    }
}

impl From<&SmootherConfig> for AttackRelease {
    fn from(cfg: &SmootherConfig) -> Self {
        Self::new(cfg.attack, cfg.release)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_blends_towards_sample() {
        let mut smoother = LoudnessSmoother::ema(0.22);
        let first = smoother.push(1.0);
        assert!((first - 0.22).abs() < 1e-6);
        let second = smoother.push(1.0);
        assert!((second - (0.22 + 0.22 * 0.78)).abs() < 1e-6);
    }

    #[test]
    fn ema_converges_to_constant_input() {
        let mut smoother = LoudnessSmoother::ema(0.22);
        for _ in 0..200 {
            smoother.push(0.5);
        }
        assert!((smoother.value() - 0.5).abs() < 1e-4);
    }

    #[test]
    fn window_is_arithmetic_mean_of_last_n() {
        let mut smoother = LoudnessSmoother::window(4);
        for sample in [0.0, 0.0, 0.0, 0.0, 1.0, 1.0] {
            smoother.push(sample);
        }
        assert!((smoother.value() - 0.5).abs() < 1e-6);
        assert_eq!(smoother.mode(), SmoothingMode::Window);
    }

    #[test]
    fn reset_clears_stale_energy() {
        let mut ema = LoudnessSmoother::ema(0.5);
        ema.push(1.0);
        ema.reset();
        assert_eq!(ema.value(), 0.0);
        assert!((ema.push(0.2) - 0.1).abs() < 1e-6);

        let mut window = LoudnessSmoother::window(3);
        window.push(1.0);
        window.push(1.0);
        window.reset();
        assert!((window.push(0.3) - 0.3).abs() < 1e-6);
    }

    #[test]
    fn non_finite_samples_count_as_silence() {
        let mut smoother = LoudnessSmoother::ema(1.0);
        assert_eq!(smoother.push(f32::NAN), 0.0);
        assert_eq!(smoother.push(f32::INFINITY), 0.0);
    }

    #[test]
    fn envelope_rises_faster_than_it_falls() {
        let mut env = AttackRelease::new(0.5, 0.1);
        let up = env.push(1.0);
        assert!((up - 0.5).abs() < 1e-6);
        let down = env.push(0.0);
        assert!((down - 0.45).abs() < 1e-6);
        env.reset();
        assert_eq!(env.value(), 0.0);
    }
}
