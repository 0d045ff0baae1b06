//! `--listen`: live VAD over the microphone with hands-free segments.

use anyhow::{bail, Result};
use crossbeam_channel::{RecvTimeoutError, TryRecvError};
use std::io::{self, Write};
use std::time::Duration;
use voxorb::audio::{
    write_clip, CaptureDevice, CaptureGuard, LiveMeter, LoudnessSampler, MicPermission,
    PcmBufferSource, PcmSegment, Recorder,
};
use voxorb::config::AppConfig;
use voxorb::controller::{ControllerEvent, RecordingController};
use voxorb::session::{
    spawn_listen_worker, ListenMessage, ListenWorker, SpeechRecognizer, SupervisorEvent,
    SystemClock, WorkerConfig,
};
use voxorb::upload::AudioCache;
use voxorb::{log_debug, VoxResult};

use crate::cli_utils::{level_bar, spawn_line_reader};

const UI_TICK: Duration = Duration::from_millis(100);

/// Stand-in recognizer that only tracks its lifecycle.
#[derive(Default)]
struct ConsoleRecognizer {
    sessions: u64,
}

impl SpeechRecognizer for ConsoleRecognizer {
    fn start(&mut self) -> VoxResult<()> {
        self.sessions += 1;
        log_debug(&format!("console recognizer session {} started", self.sessions));
        Ok(())
    }

    fn stop(&mut self) {
        log_debug(&format!("console recognizer session {} stopped", self.sessions));
    }

    fn name(&self) -> &str {
        "console"
    }
}

/// Where finished speech segments go.
enum SegmentSink {
    Disk(AudioCache),
    Upload(RecordingController<Recorder>),
}

impl SegmentSink {
    fn from_config(config: &AppConfig) -> Result<Self> {
        if config.upload_segments {
            let device = Recorder::new(config.input_device.as_deref())?;
            let controller = RecordingController::from_app(config, device, LiveMeter::new())?;
            return Ok(Self::Upload(controller));
        }
        Ok(Self::Disk(AudioCache::new(
            config.resolved_state_dir().join("segments"),
            config.max_cache_files,
        )))
    }

    fn accept(&mut self, segment: &PcmSegment) {
        match self {
            Self::Disk(cache) => match save_segment(segment, cache) {
                Ok(path) => println!(
                    "\nsegment saved: {} ({}ms, {})",
                    path,
                    segment.duration_ms(),
                    segment.end.label()
                ),
                Err(err) => eprintln!("\nfailed to save segment: {err}"),
            },
            Self::Upload(controller) => match controller.submit_segment(segment) {
                Ok(()) => println!("\n{} ({}ms)", controller.caption(), segment.duration_ms()),
                Err(err) => eprintln!("\n{}", err.caption()),
            },
        }
    }

    fn poll(&mut self) {
        let Self::Upload(controller) = self else {
            return;
        };
        match controller.poll() {
            Some(ControllerEvent::Replied { metadata, saved }) => {
                if let Some(transcript) = metadata.transcript {
                    println!("\nYou said: {transcript}");
                }
                println!("\n{} (reply saved to {})", controller.caption(), saved.display());
            }
            Some(ControllerEvent::Failed { caption, .. }) => println!("\n{caption}"),
            None => {}
        }
    }

    fn shutdown(self) {
        if let Self::Upload(mut controller) = self {
            controller.shutdown();
        }
    }
}

pub(crate) fn run_listen(config: &AppConfig) -> Result<()> {
    let mut recorder = Recorder::new(config.input_device.as_deref())?;
    if recorder.request_permission() == MicPermission::Denied {
        bail!("microphone permission denied");
    }
    let stream = recorder.open(config.frame_ms, config.channel_capacity)?;
    let sample_rate = stream.sample_rate();
    println!(
        "Listening on {} ({sample_rate} Hz). Enter p to pause/resume, Enter to stop.",
        stream.device_name()
    );
    let (frames, guard) = stream.split();

    let meter = LiveMeter::new();
    let source = PcmBufferSource::new(frames, LoudnessSampler::new(config.loudness_gain));
    let worker = spawn_listen_worker(
        WorkerConfig::from_app(config, sample_rate),
        source,
        ConsoleRecognizer::default(),
        SystemClock::new(),
        meter.clone(),
    );
    let mut sink = SegmentSink::from_config(config)?;
    let lines = spawn_line_reader();
    let mut focused = true;

    loop {
        match lines.try_recv() {
            Ok(line) if line.trim().eq_ignore_ascii_case("p") => {
                focused = !focused;
                worker.set_focus(focused);
            }
            Ok(_) | Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }
        match worker.messages.recv_timeout(UI_TICK) {
            Ok(message) => handle_message(message, &guard, &mut sink),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        sink.poll();
        if focused {
            print!("\r{}", level_bar(meter.visual_level()));
            io::stdout().flush().ok();
        }
    }
    println!();

    finish(worker, guard);
    sink.shutdown();
    Ok(())
}

fn finish(worker: ListenWorker, guard: CaptureGuard) {
    let metrics = worker.shutdown(move || guard.stop());
    println!(
        "frames={} dropped={} segments={} speech_ms={}",
        metrics.frames_processed,
        metrics.frames_dropped,
        metrics.speech_segments,
        metrics.speech_ms
    );
}

fn handle_message(message: ListenMessage, guard: &CaptureGuard, sink: &mut SegmentSink) {
    match message {
        ListenMessage::Vad(t) => {
            println!("\nt={}ms {} smoothed={:.3}", t.at_ms, t.transition.label(), t.smoothed);
        }
        ListenMessage::Supervisor(SupervisorEvent::GaveUp { failures }) => {
            println!("\nMic error (recognizer gave up after {failures} failed restarts)");
        }
        ListenMessage::Supervisor(event) => log_debug(&format!("supervisor: {}", event.label())),
        ListenMessage::Segment(segment) => sink.accept(&segment),
        ListenMessage::CaptureSuspended => {
            if let Err(err) = guard.pause() {
                log_debug(&format!("capture pause failed: {err}"));
            }
            println!("\npaused");
        }
        ListenMessage::CaptureResumed => {
            if let Err(err) = guard.resume() {
                log_debug(&format!("capture resume failed: {err}"));
            }
            println!("resumed");
        }
        ListenMessage::SupervisorStopped => {}
    }
}

fn save_segment(segment: &PcmSegment, cache: &AudioCache) -> VoxResult<String> {
    cache.ensure_dir()?;
    let clip = write_clip(cache.recording_path(), &segment.samples, segment.sample_rate)?;
    cache.evict()?;
    Ok(clip.path.display().to_string())
}
