//! Keeps a continuous speech-recognition session alive while listening.
//!
//! All entry points take the current time in milliseconds and run on the
//! owner's thread; restarts are deferred through a [`DelayedTask`] that the
//! owner drives by calling [`SessionSupervisor::tick`].

use super::clock::DelayedTask;
use crate::config::{
    AppConfig, DEFAULT_DEAD_SESSION_MS, DEFAULT_MAX_CONSECUTIVE_RESTARTS, DEFAULT_RESTART_DELAY_MS,
    DEFAULT_WATCHDOG_INTERVAL_MS,
};
use crate::error::{VoxError, VoxResult};
use crate::{log_debug, log_debug_content};

/// Downstream continuous recognizer driven by the supervisor.
pub trait SpeechRecognizer {
    fn start(&mut self) -> VoxResult<()>;
    fn stop(&mut self);

    fn name(&self) -> &str {
        "recognizer"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    pub restart_delay_ms: u64,
    pub dead_session_ms: u64,
    pub watchdog_interval_ms: u64,
    /// Failed restarts tolerated in a row; 0 never gives up.
    pub max_consecutive_restarts: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            restart_delay_ms: DEFAULT_RESTART_DELAY_MS,
            dead_session_ms: DEFAULT_DEAD_SESSION_MS,
            watchdog_interval_ms: DEFAULT_WATCHDOG_INTERVAL_MS,
            max_consecutive_restarts: DEFAULT_MAX_CONSECUTIVE_RESTARTS,
        }
    }
}

impl From<&AppConfig> for SupervisorConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            restart_delay_ms: cfg.restart_delay_ms,
            dead_session_ms: cfg.dead_session_ms,
            watchdog_interval_ms: cfg.watchdog_interval_ms,
            max_consecutive_restarts: cfg.max_consecutive_restarts,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Active,
    CoolingDown,
    /// Listening is wanted but the host app is in the background.
    Suspended,
    Faulted,
}

impl SupervisorState {
    pub fn label(self) -> &'static str {
        match self {
            SupervisorState::Idle => "idle",
            SupervisorState::Active => "active",
            SupervisorState::CoolingDown => "cooling_down",
            SupervisorState::Suspended => "suspended",
            SupervisorState::Faulted => "faulted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    Finalize,
    Watchdog,
    RecognizerError,
}

impl RestartReason {
    pub fn label(self) -> &'static str {
        match self {
            RestartReason::Finalize => "finalize",
            RestartReason::Watchdog => "watchdog",
            RestartReason::RecognizerError => "recognizer_error",
        }
    }

    fn counts_as_failure(self) -> bool {
        matches!(self, RestartReason::RecognizerError)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    SessionStarted { session: u64 },
    SessionStopped { reason: RestartReason },
    RestartScheduled { reason: RestartReason, due_at: u64 },
    Transcript { text: String, is_final: bool },
    /// The VAD closed a Speaking period; carries the transcript gathered so far.
    Finalized { transcript: String },
    Suspended,
    Resumed,
    Stopped,
    GaveUp { failures: u32 },
}

pub struct SessionSupervisor<R: SpeechRecognizer> {
    cfg: SupervisorConfig,
    recognizer: R,
    listening: bool,
    focused: bool,
    active: bool,
    faulted: bool,
    cooldown_until: Option<u64>,
    restart: DelayedTask,
    restart_reason: RestartReason,
    last_result_at: u64,
    last_watchdog_at: Option<u64>,
    session_starts: u64,
    consecutive_failures: u32,
    partial: String,
    events: Vec<SupervisorEvent>,
}

impl<R: SpeechRecognizer> SessionSupervisor<R> {
    pub fn new(cfg: SupervisorConfig, recognizer: R) -> Self {
        Self {
            cfg,
            recognizer,
            listening: false,
            focused: true,
            active: false,
            faulted: false,
            cooldown_until: None,
            restart: DelayedTask::new(),
            restart_reason: RestartReason::Finalize,
            last_result_at: 0,
            last_watchdog_at: None,
            session_starts: 0,
            consecutive_failures: 0,
            partial: String::new(),
            events: Vec::new(),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.cfg
    }

    pub fn recognizer(&self) -> &R {
        &self.recognizer
    }

    pub fn recognizer_mut(&mut self) -> &mut R {
        &mut self.recognizer
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn session_starts(&self) -> u64 {
        self.session_starts
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn partial_transcript(&self) -> &str {
        &self.partial
    }

    pub fn restart_pending(&self) -> bool {
        self.restart.is_pending()
    }

    pub fn in_cooldown(&self, now_ms: u64) -> bool {
        self.cooldown_until.is_some_and(|until| now_ms < until)
    }

    pub fn state(&self) -> SupervisorState {
        if self.faulted {
            SupervisorState::Faulted
        } else if !self.listening {
            SupervisorState::Idle
        } else if !self.focused {
            SupervisorState::Suspended
        } else if self.active {
            SupervisorState::Active
        } else {
            SupervisorState::CoolingDown
        }
    }

    /// Take everything emitted since the last call.
    pub fn drain_events(&mut self) -> Vec<SupervisorEvent> {
        std::mem::take(&mut self.events)
    }

    /// Enter listening mode and start the first session.
    pub fn start_listening(&mut self, now_ms: u64) {
        self.listening = true;
        self.faulted = false;
        self.consecutive_failures = 0;
        self.cooldown_until = None;
        self.restart.cancel();
        self.last_watchdog_at = None;
        if self.focused {
            self.start(now_ms);
        }
    }

    /// Begin a session. No-op while one is already active, while cooling
    /// down, or when listening is not wanted. Returns whether a session started.
    pub fn start(&mut self, now_ms: u64) -> bool {
        if !self.listening || !self.focused || self.active || self.faulted {
            return false;
        }
        if self.in_cooldown(now_ms) {
            return false;
        }
        match self.recognizer.start() {
            Ok(()) => {
                self.active = true;
                self.partial.clear();
                self.last_result_at = now_ms;
                self.session_starts += 1;
                tracing::info!(
                    target: "voxorb::session",
                    session = self.session_starts,
                    recognizer = self.recognizer.name(),
                    "session started"
                );
                self.events.push(SupervisorEvent::SessionStarted {
                    session: self.session_starts,
                });
                true
            }
            Err(err) => {
                self.on_recognizer_error(now_ms, &err);
                false
            }
        }
    }

    /// Any partial or final result proves the session is alive.
    pub fn on_result(&mut self, now_ms: u64, text: &str, is_final: bool) {
        if !self.active {
            return;
        }
        self.last_result_at = now_ms;
        self.consecutive_failures = 0;
        self.partial.clear();
        self.partial.push_str(text);
        log_debug_content(&format!("recognizer result (final={is_final}): {text}"));
        self.events.push(SupervisorEvent::Transcript {
            text: text.to_string(),
            is_final,
        });
    }

    /// The VAD saw Speaking give way to long silence.
    pub fn on_vad_finalize(&mut self, now_ms: u64) {
        if !self.listening || self.in_cooldown(now_ms) || self.restart.is_pending() {
            return;
        }
        let transcript = std::mem::take(&mut self.partial);
        self.events.push(SupervisorEvent::Finalized { transcript });
        self.stop_session(RestartReason::Finalize);
        self.schedule_restart(now_ms, RestartReason::Finalize);
    }

    /// Recognizer errors never end listening; they only delay the next session.
    pub fn on_recognizer_error(&mut self, now_ms: u64, err: &VoxError) {
        log_debug(&format!(
            "recognizer error ({}): {err}",
            self.recognizer.name()
        ));
        tracing::warn!(target: "voxorb::session", error = %err, "recognizer error");
        if !self.listening {
            return;
        }
        if self.active {
            self.stop_session(RestartReason::RecognizerError);
        }
        self.schedule_restart(now_ms, RestartReason::RecognizerError);
    }

    /// Drive pending restarts and the dead-session watchdog.
    pub fn tick(&mut self, now_ms: u64) {
        if self.restart.take_if_due(now_ms) {
            self.cooldown_until = None;
            self.run_restart(now_ms);
        }

        let watchdog_due = match self.last_watchdog_at {
            Some(last) => now_ms.saturating_sub(last) >= self.cfg.watchdog_interval_ms,
            None => true,
        };
        if !watchdog_due {
            return;
        }
        self.last_watchdog_at = Some(now_ms);
        if self.active
            && !self.in_cooldown(now_ms)
            && now_ms.saturating_sub(self.last_result_at) > self.cfg.dead_session_ms
        {
            log_debug(&format!(
                "watchdog: no recognizer result for {}ms; restarting session",
                now_ms.saturating_sub(self.last_result_at)
            ));
            self.stop_session(RestartReason::Watchdog);
            self.schedule_restart(now_ms, RestartReason::Watchdog);
        }
    }

    /// Foreground changes: losing focus stops the session, regaining it
    /// restarts one when listening is still wanted.
    pub fn on_focus_change(&mut self, now_ms: u64, focused: bool) {
        if self.focused == focused {
            return;
        }
        self.focused = focused;
        if !self.listening {
            return;
        }
        if focused {
            self.events.push(SupervisorEvent::Resumed);
            self.cooldown_until = None;
            self.restart.cancel();
            self.start(now_ms);
        } else {
            self.restart.cancel();
            self.cooldown_until = None;
            if self.active {
                self.stop_session(RestartReason::Finalize);
            }
            self.events.push(SupervisorEvent::Suspended);
        }
    }

    /// Leave listening mode. Pending restarts are dropped.
    pub fn stop_listening(&mut self) {
        let was_listening = self.listening;
        self.listening = false;
        self.restart.cancel();
        self.cooldown_until = None;
        if self.active {
            self.stop_session(RestartReason::Finalize);
        }
        self.partial.clear();
        if was_listening {
            tracing::info!(
                target: "voxorb::session",
                sessions = self.session_starts,
                "listening stopped"
            );
            self.events.push(SupervisorEvent::Stopped);
        }
    }

    fn stop_session(&mut self, reason: RestartReason) {
        if !self.active {
            return;
        }
        self.recognizer.stop();
        self.active = false;
        tracing::debug!(target: "voxorb::session", reason = reason.label(), "session stopped");
        self.events.push(SupervisorEvent::SessionStopped { reason });
    }

    fn schedule_restart(&mut self, now_ms: u64, reason: RestartReason) {
        let due_at = now_ms.saturating_add(self.cfg.restart_delay_ms);
        if !self.restart.schedule(due_at) {
            return;
        }
        self.cooldown_until = Some(due_at);
        self.restart_reason = reason;
        self.events
            .push(SupervisorEvent::RestartScheduled { reason, due_at });
    }

    fn run_restart(&mut self, now_ms: u64) {
        if !self.listening || !self.focused {
            return;
        }
        if self.restart_reason.counts_as_failure() {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            let ceiling = self.cfg.max_consecutive_restarts;
            if ceiling > 0 && self.consecutive_failures > ceiling {
                self.give_up();
                return;
            }
        }
        self.start(now_ms);
    }

    fn give_up(&mut self) {
        let failures = self.consecutive_failures;
        log_debug(&format!(
            "recognizer failed {failures} restarts in a row; giving up"
        ));
        tracing::error!(target: "voxorb::session", failures, "giving up on recognizer");
        self.stop_listening();
        self.faulted = true;
        self.events.push(SupervisorEvent::GaveUp { failures });
    }
}

impl SupervisorEvent {
    pub fn label(&self) -> &'static str {
        match self {
            SupervisorEvent::SessionStarted { .. } => "session_started",
            SupervisorEvent::SessionStopped { .. } => "session_stopped",
            SupervisorEvent::RestartScheduled { .. } => "restart_scheduled",
            SupervisorEvent::Transcript { .. } => "transcript",
            SupervisorEvent::Finalized { .. } => "finalized",
            SupervisorEvent::Suspended => "suspended",
            SupervisorEvent::Resumed => "resumed",
            SupervisorEvent::Stopped => "stopped",
            SupervisorEvent::GaveUp { .. } => "gave_up",
        }
    }
}
