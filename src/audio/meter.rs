use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Latest smoothed loudness, shared lock-free between the listening thread
/// (single writer) and any number of render-loop readers.
#[derive(Clone, Debug)]
pub struct LiveMeter {
    level_bits: Arc<AtomicU32>,
    visual_bits: Arc<AtomicU32>,
    active: Arc<AtomicBool>,
}

impl LiveMeter {
    pub fn new() -> Self {
        Self {
            level_bits: Arc::new(AtomicU32::new(0f32.to_bits())),
            visual_bits: Arc::new(AtomicU32::new(0f32.to_bits())),
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Publish the VAD-facing level and the envelope used for visuals.
    pub fn publish(&self, level: f32, visual: f32) {
        self.level_bits.store(level.to_bits(), Ordering::Relaxed);
        self.visual_bits.store(visual.to_bits(), Ordering::Relaxed);
    }

    pub fn level(&self) -> f32 {
        f32::from_bits(self.level_bits.load(Ordering::Relaxed))
    }

    pub fn visual_level(&self) -> f32 {
        f32::from_bits(self.visual_bits.load(Ordering::Relaxed))
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Relaxed);
    }

    /// Whether a capture session is currently feeding the meter.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// Zero both levels and mark the meter idle.
    pub fn reset(&self) {
        self.publish(0.0, 0.0);
        self.set_active(false);
    }
}

impl Default for LiveMeter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_meter_defaults_to_silence() {
        let meter = LiveMeter::new();
        assert_eq!(meter.level(), 0.0);
        assert_eq!(meter.visual_level(), 0.0);
        assert!(!meter.is_active());
    }

    #[test]
    fn clones_share_the_same_level() {
        let meter = LiveMeter::new();
        let reader = meter.clone();
        meter.set_active(true);
        meter.publish(0.4, 0.6);
        assert_eq!(reader.level(), 0.4);
        assert_eq!(reader.visual_level(), 0.6);
        assert!(reader.is_active());
        meter.reset();
        assert_eq!(reader.level(), 0.0);
        assert!(!reader.is_active());
    }

    #[test]
    fn readers_on_other_threads_see_updates() {
        let meter = LiveMeter::new();
        let writer = meter.clone();
        std::thread::spawn(move || writer.publish(0.25, 0.3))
            .join()
            .unwrap();
        assert_eq!(meter.level(), 0.25);
    }
}
