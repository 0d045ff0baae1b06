use super::{
    Clock, ManualClock, RestartReason, SessionSupervisor, SpeechRecognizer, SupervisorConfig,
    SupervisorEvent, SupervisorState,
};
use crate::error::{VoxError, VoxResult};

#[derive(Default)]
struct FakeRecognizer {
    starts: u32,
    stops: u32,
    running: bool,
    fail_starts: u32,
}

impl SpeechRecognizer for FakeRecognizer {
    fn start(&mut self) -> VoxResult<()> {
        if self.fail_starts > 0 {
            self.fail_starts -= 1;
            return Err(VoxError::Recognizer("engine unavailable".to_string()));
        }
        assert!(!self.running, "recognizer started twice without a stop");
        self.starts += 1;
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.stops += 1;
        self.running = false;
    }

    fn name(&self) -> &str {
        "fake"
    }
}

fn supervisor() -> SessionSupervisor<FakeRecognizer> {
    SessionSupervisor::new(SupervisorConfig::default(), FakeRecognizer::default())
}

fn run_ticks<R: SpeechRecognizer>(
    sup: &mut SessionSupervisor<R>,
    clock: &ManualClock,
    until_ms: u64,
    step_ms: u64,
) {
    while clock.now_ms() < until_ms {
        clock.advance(step_ms);
        sup.tick(clock.now_ms());
    }
}

#[test]
fn start_while_active_is_a_no_op() {
    let mut sup = supervisor();
    sup.start_listening(0);
    assert!(!sup.start(10));
    assert!(!sup.start(20));
    assert_eq!(sup.session_starts(), 1);
    assert_eq!(sup.recognizer().starts, 1);
    assert_eq!(sup.state(), SupervisorState::Active);
}

#[test]
fn start_requires_listening_mode() {
    let mut sup = supervisor();
    assert!(!sup.start(0));
    assert_eq!(sup.session_starts(), 0);
    assert_eq!(sup.state(), SupervisorState::Idle);
}

#[test]
fn start_clears_partial_transcript() {
    let mut sup = supervisor();
    sup.start_listening(0);
    sup.on_result(100, "hello wor", false);
    assert_eq!(sup.partial_transcript(), "hello wor");
    sup.on_recognizer_error(200, &VoxError::Recognizer("dropped".into()));
    assert_eq!(sup.partial_transcript(), "hello wor");
    sup.tick(600);
    assert_eq!(sup.session_starts(), 2);
    assert_eq!(sup.partial_transcript(), "");
}

#[test]
fn finalize_restarts_after_cooldown() {
    let mut sup = supervisor();
    sup.start_listening(0);
    sup.on_result(500, "turn on the lights", true);
    sup.drain_events();

    sup.on_vad_finalize(1_000);
    assert!(!sup.is_active());
    assert!(sup.in_cooldown(1_000));
    assert_eq!(sup.state(), SupervisorState::CoolingDown);
    let events = sup.drain_events();
    assert_eq!(
        events[0],
        SupervisorEvent::Finalized {
            transcript: "turn on the lights".to_string()
        }
    );
    assert!(events.contains(&SupervisorEvent::RestartScheduled {
        reason: RestartReason::Finalize,
        due_at: 1_350
    }));

    // Starting during cooldown is suppressed.
    assert!(!sup.start(1_200));
    sup.tick(1_349);
    assert_eq!(sup.session_starts(), 1);
    sup.tick(1_350);
    assert_eq!(sup.session_starts(), 2);
    assert!(sup.is_active());
}

#[test]
fn finalize_during_cooldown_schedules_nothing_more() {
    let mut sup = supervisor();
    sup.start_listening(0);
    sup.on_vad_finalize(1_000);
    sup.drain_events();
    sup.on_vad_finalize(1_100);
    sup.on_vad_finalize(1_200);
    assert!(sup.drain_events().is_empty());
    sup.tick(1_350);
    sup.tick(1_400);
    assert_eq!(sup.session_starts(), 2);
    assert_eq!(sup.recognizer().stops, 1);
}

#[test]
fn watchdog_restarts_a_stuck_session_exactly_once() {
    let clock = ManualClock::new(0);
    let mut sup = supervisor();
    sup.start_listening(clock.now_ms());
    sup.tick(clock.now_ms());
    run_ticks(&mut sup, &clock, 4_000, 100);
    assert_eq!(sup.session_starts(), 1, "no restart before the dead window");

    run_ticks(&mut sup, &clock, 9_000, 100);
    assert_eq!(sup.session_starts(), 2);
    assert_eq!(sup.recognizer().stops, 1);
    let watchdog_stops = sup
        .drain_events()
        .into_iter()
        .filter(|e| {
            matches!(
                e,
                SupervisorEvent::SessionStopped {
                    reason: RestartReason::Watchdog
                }
            )
        })
        .count();
    assert_eq!(watchdog_stops, 1);
}

#[test]
fn results_keep_the_watchdog_quiet() {
    let clock = ManualClock::new(0);
    let mut sup = supervisor();
    sup.start_listening(0);
    while clock.now_ms() < 20_000 {
        clock.advance(100);
        if clock.now_ms() % 2_000 == 0 {
            sup.on_result(clock.now_ms(), "still talking", false);
        }
        sup.tick(clock.now_ms());
    }
    assert_eq!(sup.session_starts(), 1);
}

#[test]
fn idle_watchdog_restarts_never_give_up() {
    let clock = ManualClock::new(0);
    let mut sup = supervisor();
    sup.start_listening(0);
    run_ticks(&mut sup, &clock, 120_000, 100);
    assert!(sup.is_listening());
    assert!(sup.session_starts() > 10);
    assert_eq!(sup.consecutive_failures(), 0);
}

#[test]
fn recognizer_error_schedules_restart_without_failing() {
    let mut sup = supervisor();
    sup.start_listening(0);
    sup.on_recognizer_error(1_000, &VoxError::Recognizer("network".into()));
    assert!(!sup.is_active());
    assert!(sup.is_listening());
    assert!(sup.restart_pending());
    // A second error while the restart is pending does not stack.
    sup.on_recognizer_error(1_100, &VoxError::Recognizer("network".into()));
    sup.tick(1_350);
    assert!(sup.is_active());
    assert_eq!(sup.session_starts(), 2);
    assert_eq!(sup.consecutive_failures(), 1);
    sup.on_result(1_500, "ok", false);
    assert_eq!(sup.consecutive_failures(), 0);
}

#[test]
fn failed_starts_are_retried_until_the_ceiling() {
    let cfg = SupervisorConfig {
        max_consecutive_restarts: 3,
        ..SupervisorConfig::default()
    };
    let recognizer = FakeRecognizer {
        fail_starts: 100,
        ..FakeRecognizer::default()
    };
    let clock = ManualClock::new(0);
    let mut sup = SessionSupervisor::new(cfg, recognizer);
    sup.start_listening(0);
    assert!(!sup.is_active());
    run_ticks(&mut sup, &clock, 5_000, 50);
    assert_eq!(sup.state(), SupervisorState::Faulted);
    assert!(!sup.is_listening());
    let events = sup.drain_events();
    assert!(events.contains(&SupervisorEvent::GaveUp { failures: 4 }));
}

#[test]
fn unbounded_ceiling_keeps_retrying() {
    let cfg = SupervisorConfig {
        max_consecutive_restarts: 0,
        ..SupervisorConfig::default()
    };
    let recognizer = FakeRecognizer {
        fail_starts: 20,
        ..FakeRecognizer::default()
    };
    let clock = ManualClock::new(0);
    let mut sup = SessionSupervisor::new(cfg, recognizer);
    sup.start_listening(0);
    run_ticks(&mut sup, &clock, 10_000, 50);
    assert!(sup.is_active());
    assert_eq!(sup.session_starts(), 1);
}

#[test]
fn focus_loss_stops_and_regain_restarts() {
    let mut sup = supervisor();
    sup.start_listening(0);
    sup.on_vad_finalize(100);
    sup.on_focus_change(200, false);
    assert_eq!(sup.state(), SupervisorState::Suspended);
    assert!(!sup.restart_pending());
    // The cancelled restart never fires in the background.
    sup.tick(1_000);
    assert_eq!(sup.session_starts(), 1);

    sup.on_focus_change(5_000, true);
    assert!(sup.is_active());
    assert_eq!(sup.session_starts(), 2);
    let events = sup.drain_events();
    assert!(events.contains(&SupervisorEvent::Suspended));
    assert!(events.contains(&SupervisorEvent::Resumed));
}

#[test]
fn focus_regain_without_listening_does_nothing() {
    let mut sup = supervisor();
    sup.on_focus_change(0, false);
    sup.on_focus_change(10, true);
    assert_eq!(sup.session_starts(), 0);
}

#[test]
fn stop_listening_cancels_pending_restart() {
    let mut sup = supervisor();
    sup.start_listening(0);
    sup.on_vad_finalize(100);
    sup.stop_listening();
    sup.tick(10_000);
    assert_eq!(sup.session_starts(), 1);
    assert_eq!(sup.state(), SupervisorState::Idle);
    assert!(sup.drain_events().contains(&SupervisorEvent::Stopped));
    // Results after teardown are ignored.
    sup.on_result(10_100, "late", true);
    assert_eq!(sup.partial_transcript(), "");
}

#[test]
fn restart_after_fault_resets_failure_count() {
    let cfg = SupervisorConfig {
        max_consecutive_restarts: 1,
        ..SupervisorConfig::default()
    };
    let recognizer = FakeRecognizer {
        fail_starts: 3,
        ..FakeRecognizer::default()
    };
    let clock = ManualClock::new(0);
    let mut sup = SessionSupervisor::new(cfg, recognizer);
    sup.start_listening(0);
    run_ticks(&mut sup, &clock, 2_000, 50);
    assert_eq!(sup.state(), SupervisorState::Faulted);
    sup.recognizer_mut().fail_starts = 0;
    sup.start_listening(clock.now_ms());
    assert!(sup.is_active());
    assert_eq!(sup.consecutive_failures(), 0);
    assert_eq!(SupervisorState::Active.label(), "active");
}

mod worker {
    use crate::audio::{
        LiveMeter, LoudnessSampler, PcmBufferSource, SampleSource, SourceEvent, VadTransition,
    };
    use crate::config::AppConfig;
    use crate::error::VoxResult;
    use crate::session::{
        spawn_listen_worker, Clock, ListenMessage, ListenWorker, ManualClock, SpeechRecognizer,
        SupervisorEvent, WorkerConfig,
    };
    use clap::Parser;
    use crossbeam_channel::{bounded, Sender};
    use std::f32::consts::PI;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const FRAME_MS: u64 = 20;
    const RATE: u32 = 16_000;

    /// Advances the shared clock by one frame per delivered sample.
    struct SteppedSource {
        inner: PcmBufferSource,
        clock: ManualClock,
    }

    impl SampleSource for SteppedSource {
        fn next_event(&mut self, timeout: Duration) -> SourceEvent {
            let event = self.inner.next_event(timeout);
            if matches!(event, SourceEvent::Sample { .. }) {
                self.clock.advance(FRAME_MS);
            }
            event
        }
    }

    struct LoggingRecognizer {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl SpeechRecognizer for LoggingRecognizer {
        fn start(&mut self) -> VoxResult<()> {
            self.log.lock().unwrap().push("start".into());
            Ok(())
        }

        fn stop(&mut self) {
            self.log.lock().unwrap().push("stop".into());
        }
    }

    fn frame(amplitude: f32) -> Vec<i16> {
        let len = (RATE as u64 * FRAME_MS / 1000) as usize;
        (0..len)
            .map(|i| {
                let phase = 2.0 * PI * 200.0 * i as f32 / RATE as f32;
                (phase.sin() * amplitude * 32_767.0) as i16
            })
            .collect()
    }

    fn start(
        log: Arc<Mutex<Vec<String>>>,
    ) -> (Sender<Vec<i16>>, ListenWorker, ManualClock, LiveMeter) {
        let (tx, rx) = bounded(512);
        let clock = ManualClock::new(0);
        let source = SteppedSource {
            inner: PcmBufferSource::new(rx, LoudnessSampler::default()),
            clock: clock.clone(),
        };
        let mut cfg = WorkerConfig::from_app(&AppConfig::parse_from(["test-app"]), RATE);
        cfg.frame_ms = FRAME_MS;
        let meter = LiveMeter::new();
        let recognizer = LoggingRecognizer { log };
        let worker = spawn_listen_worker(cfg, source, recognizer, clock.clone(), meter.clone());
        (tx, worker, clock, meter)
    }

    #[test]
    fn worker_reports_speech_and_segment() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (tx, worker, clock, meter) = start(log.clone());
        for _ in 0..10 {
            tx.send(frame(0.0)).unwrap();
        }
        for _ in 0..30 {
            tx.send(frame(0.5)).unwrap();
        }
        for _ in 0..100 {
            tx.send(frame(0.0)).unwrap();
        }

        let mut transitions = Vec::new();
        let mut finalized = false;
        let mut segment = None;
        while segment.is_none() {
            match worker.messages.recv_timeout(Duration::from_secs(5)) {
                Ok(ListenMessage::Vad(t)) => transitions.push(t.transition),
                Ok(ListenMessage::Supervisor(SupervisorEvent::Finalized { .. })) => {
                    assert!(segment.is_none(), "finalize is reported before the segment");
                    finalized = true;
                }
                Ok(ListenMessage::Segment(s)) => segment = Some(s),
                Ok(_) => {}
                Err(err) => panic!("worker went quiet: {err}"),
            }
        }
        assert_eq!(
            transitions,
            vec![VadTransition::SpeechStarted, VadTransition::SpeechEnded]
        );
        assert!(finalized);
        let segment = segment.unwrap();
        assert!(segment.duration_ms() >= 600);
        assert!(clock.now_ms() >= 2_000);

        let metrics = worker.shutdown(|| 3);
        assert_eq!(metrics.frames_dropped, 3);
        assert_eq!(metrics.speech_segments, 1);
        assert!(metrics.frames_processed >= 100);
        assert_eq!(meter.level(), 0.0);
        assert!(!meter.is_active());
        drop(tx);
    }

    /// Collect messages until `stop` matches one, failing after five quiet seconds.
    fn collect_until(
        worker: &ListenWorker,
        stop: impl Fn(&ListenMessage) -> bool,
    ) -> Vec<ListenMessage> {
        let mut seen = Vec::new();
        loop {
            match worker.messages.recv_timeout(Duration::from_secs(5)) {
                Ok(message) if stop(&message) => return seen,
                Ok(message) => seen.push(message),
                Err(err) => panic!("worker went quiet: {err}"),
            }
        }
    }

    #[test]
    fn unfocused_worker_discards_captured_audio() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (tx, worker, _clock, meter) = start(log.clone());
        worker.set_focus(false);
        collect_until(&worker, |m| matches!(m, ListenMessage::CaptureSuspended));
        assert!(!meter.is_active());

        for _ in 0..30 {
            tx.send(frame(0.5)).unwrap();
        }
        for _ in 0..100 {
            tx.send(frame(0.0)).unwrap();
        }
        while !tx.is_empty() {
            std::thread::sleep(Duration::from_millis(2));
        }
        worker.set_focus(true);
        let while_unfocused =
            collect_until(&worker, |m| matches!(m, ListenMessage::CaptureResumed));
        for message in &while_unfocused {
            assert!(
                !matches!(
                    message,
                    ListenMessage::Vad(_)
                        | ListenMessage::Segment(_)
                        | ListenMessage::Supervisor(SupervisorEvent::Finalized { .. })
                        | ListenMessage::Supervisor(SupervisorEvent::RestartScheduled { .. })
                ),
                "unexpected message while unfocused: {message:?}"
            );
        }
        assert!(meter.is_active());

        for _ in 0..30 {
            tx.send(frame(0.5)).unwrap();
        }
        collect_until(&worker, |m| {
            matches!(m, ListenMessage::Vad(t) if t.transition == VadTransition::SpeechStarted)
        });

        let metrics = worker.shutdown(|| 0);
        assert_eq!(metrics.speech_segments, 1, "only the refocused burst counts");
        assert!(metrics.frames_processed <= 30);
        let log = log.lock().unwrap().clone();
        assert_eq!(log, vec!["start", "stop", "start", "stop"]);
        drop(tx);
    }

    #[test]
    fn shutdown_stops_supervisor_before_capture() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (tx, worker, _clock, _meter) = start(log.clone());
        for _ in 0..5 {
            tx.send(frame(0.0)).unwrap();
        }
        let capture_log = log.clone();
        worker.shutdown(move || {
            capture_log.lock().unwrap().push("capture_released".into());
            0
        });
        let log = log.lock().unwrap().clone();
        assert_eq!(log, vec!["start", "stop", "capture_released"]);
    }
}
