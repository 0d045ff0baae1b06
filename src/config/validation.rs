use super::defaults::{MAX_HINTS_CHARS, MAX_ORB_DETAIL, MAX_SMOOTHING_WINDOW};
use super::AppConfig;
use anyhow::{bail, Result};
use clap::Parser;
use std::env;
use std::path::PathBuf;

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values and normalize optional strings.
    pub fn validate(&mut self) -> Result<()> {
        if !(5..=120).contains(&self.frame_ms) {
            bail!("--frame-ms must be between 5 and 120, got {}", self.frame_ms);
        }
        if !(8..=1024).contains(&self.channel_capacity) {
            bail!(
                "--channel-capacity must be between 8 and 1024, got {}",
                self.channel_capacity
            );
        }
        if self.upload_segments && !self.listen {
            bail!("--upload-segments requires --listen");
        }
        let gain = self.loudness_gain;
        if !(gain.is_finite() && gain > 0.0 && gain <= 100.0) {
            bail!(
                "--loudness-gain must be in (0, 100], got {}",
                self.loudness_gain
            );
        }
        if !(self.ema_alpha > 0.0 && self.ema_alpha <= 1.0) {
            bail!("--ema-alpha must be in (0, 1], got {}", self.ema_alpha);
        }
        if !(1..=MAX_SMOOTHING_WINDOW).contains(&self.smoothing_window) {
            bail!(
                "--smoothing-window must be between 1 and {MAX_SMOOTHING_WINDOW}, got {}",
                self.smoothing_window
            );
        }
        for (flag, value) in [("--attack", self.attack), ("--release", self.release)] {
            if !(value > 0.0 && value <= 1.0) {
                bail!("{flag} must be in (0, 1], got {value}");
            }
        }

        // Hysteresis: the band between the thresholds is what prevents chatter.
        if !(self.vad_down_threshold > 0.0 && self.vad_up_threshold <= 1.0) {
            bail!(
                "VAD thresholds must lie in (0, 1], got up={} down={}",
                self.vad_up_threshold,
                self.vad_down_threshold
            );
        }
        if self.vad_up_threshold <= self.vad_down_threshold {
            bail!(
                "--vad-up-threshold ({}) must exceed --vad-down-threshold ({})",
                self.vad_up_threshold,
                self.vad_down_threshold
            );
        }
        if !(10..=10_000).contains(&self.vad_min_speech_ms) {
            bail!(
                "--vad-min-speech-ms must be between 10 and 10000, got {}",
                self.vad_min_speech_ms
            );
        }
        if !(50..=60_000).contains(&self.vad_min_silence_ms) {
            bail!(
                "--vad-min-silence-ms must be between 50 and 60000, got {}",
                self.vad_min_silence_ms
            );
        }

        if !(100..=120_000).contains(&self.dead_session_ms) {
            bail!(
                "--dead-session-ms must be between 100 and 120000, got {}",
                self.dead_session_ms
            );
        }
        if self.restart_delay_ms > self.dead_session_ms {
            bail!(
                "--restart-delay-ms ({}) cannot exceed --dead-session-ms ({})",
                self.restart_delay_ms,
                self.dead_session_ms
            );
        }
        if !(50..=self.dead_session_ms).contains(&self.watchdog_interval_ms) {
            bail!(
                "--watchdog-interval-ms must be between 50 and --dead-session-ms ({})",
                self.dead_session_ms
            );
        }
        if self.segment_lookback_ms > self.segment_max_ms {
            bail!(
                "--segment-lookback-ms ({}) cannot exceed --segment-max-ms ({})",
                self.segment_lookback_ms,
                self.segment_max_ms
            );
        }
        if !(1_000..=120_000).contains(&self.segment_max_ms) {
            bail!(
                "--segment-max-ms must be between 1000 and 120000, got {}",
                self.segment_max_ms
            );
        }

        if !(0.0..=2.0).contains(&self.orb_intensity) {
            bail!(
                "--orb-intensity must be between 0.0 and 2.0, got {}",
                self.orb_intensity
            );
        }
        if !(self.orb_radius.is_finite() && self.orb_radius > 0.0) {
            bail!("--orb-radius must be positive, got {}", self.orb_radius);
        }
        if self.orb_detail > MAX_ORB_DETAIL {
            bail!(
                "--orb-detail must be between 0 and {MAX_ORB_DETAIL}, got {}",
                self.orb_detail
            );
        }
        if !(self.noise_time_factor.is_finite() && self.noise_time_factor >= 0.0) {
            bail!(
                "--noise-time-factor must be non-negative, got {}",
                self.noise_time_factor
            );
        }

        let url = self.backend_url.trim().trim_end_matches('/').to_string();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!("--backend-url must start with http:// or https://, got '{url}'");
        }
        self.backend_url = url;
        if !(1_000..=600_000).contains(&self.upload_timeout_ms) {
            bail!(
                "--upload-timeout-ms must be between 1000 and 600000, got {}",
                self.upload_timeout_ms
            );
        }
        if self.profile_name.trim().is_empty() {
            bail!("--profile-name must not be empty");
        }
        self.profile_name = self.profile_name.trim().to_string();

        normalize_optional(&mut self.preferred_name);
        normalize_optional(&mut self.target_user_id);
        normalize_optional(&mut self.voice_id);
        normalize_optional(&mut self.hints);
        normalize_optional(&mut self.auth_token);
        normalize_optional(&mut self.conversation_id);
        if let Some(hints) = &self.hints {
            if hints.chars().count() > MAX_HINTS_CHARS {
                bail!("--hints must be at most {MAX_HINTS_CHARS} characters");
            }
        }
        if let Some(token) = &self.auth_token {
            if token.chars().any(|ch| ch.is_control() || ch.is_whitespace()) {
                bail!("--auth-token must not contain whitespace or control characters");
            }
        }

        if self.max_cache_files == 0 || self.max_cache_files > 1024 {
            bail!(
                "--max-cache-files must be between 1 and 1024, got {}",
                self.max_cache_files
            );
        }
        if !(1..=1_000).contains(&self.simulate_step_ms) {
            bail!(
                "--simulate-step-ms must be between 1 and 1000, got {}",
                self.simulate_step_ms
            );
        }

        Ok(())
    }

    /// Directory holding the conversation store and cached audio.
    pub fn resolved_state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(default_state_dir)
    }
}

fn normalize_optional(value: &mut Option<String>) {
    if let Some(text) = value.as_mut() {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            *value = None;
        } else if trimmed.len() != text.len() {
            *text = trimmed.to_string();
        }
    }
}

pub(super) fn default_state_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(env::temp_dir)
        .join("voxorb")
}
