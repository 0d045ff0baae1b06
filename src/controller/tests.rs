use super::*;
use crate::audio::{PcmSegment, ScriptedCapture, SegmentEnd};
use crate::upload::{ReplyFormat, UploadContext};
use std::sync::Mutex;

const RATE: u32 = 16_000;

#[derive(Default)]
struct UploadLog {
    contexts: Vec<UploadContext>,
    clip_existed: Vec<bool>,
    clip_paths: Vec<PathBuf>,
}

/// Uploader that returns a canned result, optionally held until released.
struct FakeUploader {
    log: Arc<Mutex<UploadLog>>,
    result: Box<dyn Fn() -> VoxResult<ReplyAudio> + Send + Sync>,
    gate: Option<crossbeam_channel::Receiver<()>>,
}

impl ClipUploader for FakeUploader {
    fn upload(&self, clip: &RecordingClip, ctx: &UploadContext) -> VoxResult<ReplyAudio> {
        if let Some(gate) = &self.gate {
            let _ = gate.recv();
        }
        let mut log = self.log.lock().unwrap();
        log.contexts.push(ctx.clone());
        log.clip_existed.push(clip.path.exists() && clip.samples > 0);
        log.clip_paths.push(clip.path.clone());
        (self.result)()
    }
}

#[derive(Clone, Default)]
struct SinkLog(Arc<Mutex<Vec<&'static str>>>);

impl SinkLog {
    fn ops(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().clone()
    }
}

struct RecordingSink {
    log: SinkLog,
    playing: bool,
}

impl PlaybackSink for RecordingSink {
    fn play(&mut self, _reply: &ReplyAudio) -> VoxResult<()> {
        self.stop();
        self.log.0.lock().unwrap().push("play");
        self.playing = true;
        Ok(())
    }

    fn stop(&mut self) {
        if self.playing {
            self.log.0.lock().unwrap().push("stop");
        }
        self.playing = false;
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

fn reply_ok() -> VoxResult<ReplyAudio> {
    Ok(ReplyAudio::new(
        b"RIFF-reply".to_vec(),
        Some("audio/wav"),
        ReplyMetadata {
            reply_text: Some("Hi there".to_string()),
            transcript: Some("hello".to_string()),
            language: Some("en".to_string()),
            voice_id: Some("v1".to_string()),
            conversation_id: Some("conv".to_string()),
        },
    ))
}

fn loud_frames(count: usize) -> Vec<Vec<i16>> {
    (0..count)
        .map(|i| {
            (0..320)
                .map(|n| if (n + i) % 2 == 0 { 12_000 } else { -12_000 })
                .collect()
        })
        .collect()
}

struct Harness {
    controller: RecordingController<ScriptedCapture>,
    uploads: Arc<Mutex<UploadLog>>,
    sink: SinkLog,
    _dir: tempfile::TempDir,
}

fn harness_with(
    device: ScriptedCapture,
    result: impl Fn() -> VoxResult<ReplyAudio> + Send + Sync + 'static,
    gate: Option<crossbeam_channel::Receiver<()>>,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = UploadSettings::with_state_dir(dir.path());
    settings.profile_name = "Alex".to_string();
    let uploads = Arc::new(Mutex::new(UploadLog::default()));
    let sink = SinkLog::default();
    let controller = RecordingController::new(
        device,
        ControllerConfig::default(),
        settings,
        Arc::new(FakeUploader {
            log: Arc::clone(&uploads),
            result: Box::new(result),
            gate,
        }),
        Box::new(RecordingSink {
            log: sink.clone(),
            playing: false,
        }),
        LiveMeter::new(),
    );
    Harness {
        controller,
        uploads,
        sink,
        _dir: dir,
    }
}

fn harness(device: ScriptedCapture) -> Harness {
    harness_with(device, reply_ok, None)
}

const WAIT: Duration = Duration::from_secs(5);

#[test]
fn toggle_records_uploads_and_plays_reply() {
    let mut h = harness(ScriptedCapture::new(loud_frames(10), RATE));
    assert_eq!(h.controller.caption(), "Tap the orb to start/stop.");

    assert_eq!(h.controller.toggle().unwrap(), ToggleOutcome::Started);
    assert!(h.controller.is_recording());
    assert_eq!(h.controller.caption(), "Recording… (tap to stop)");

    assert_eq!(h.controller.toggle().unwrap(), ToggleOutcome::Submitted);
    assert!(h.controller.is_busy());
    assert_eq!(h.controller.caption(), "Uploading to backend…");

    let event = h.controller.wait_for_upload(WAIT).expect("upload result");
    match event {
        ControllerEvent::Replied { metadata, saved } => {
            assert_eq!(metadata.reply_text.as_deref(), Some("Hi there"));
            assert_eq!(metadata.language.as_deref(), Some("en"));
            assert!(saved.exists());
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(!h.controller.is_busy());
    assert_eq!(h.controller.caption(), "Captions: Hi there");
    assert_eq!(h.sink.ops(), vec!["play"]);

    let log = h.uploads.lock().unwrap();
    assert_eq!(log.clip_existed, vec![true]);
    assert!(!log.clip_paths[0].exists(), "clip is deleted once uploaded");
    let ctx = &log.contexts[0];
    assert_eq!(ctx.profile_name, "Alex");
    assert_eq!(ctx.preferred_name, "Alex");
    assert!(!ctx.conversation_id.is_empty());
}

#[test]
fn conversation_id_is_reused_across_uploads() {
    let mut h = harness(ScriptedCapture::new(loud_frames(4), RATE));
    for _ in 0..2 {
        h.controller.toggle().unwrap();
        h.controller.toggle().unwrap();
        h.controller.wait_for_upload(WAIT).expect("upload result");
    }
    let log = h.uploads.lock().unwrap();
    assert_eq!(log.contexts.len(), 2);
    assert_eq!(log.contexts[0].conversation_id, log.contexts[1].conversation_id);
}

#[test]
fn new_recording_stops_previous_reply_first() {
    let mut h = harness(ScriptedCapture::new(loud_frames(4), RATE));
    h.controller.toggle().unwrap();
    h.controller.toggle().unwrap();
    h.controller.wait_for_upload(WAIT).expect("upload result");
    assert!(h.controller.playback().is_playing());

    h.controller.toggle().unwrap();
    assert!(!h.controller.playback().is_playing());
    assert_eq!(h.sink.ops(), vec!["play", "stop"]);
}

#[test]
fn denied_permission_never_opens_the_device() {
    let mut h = harness(ScriptedCapture::denied());
    let err = h.controller.toggle().unwrap_err();
    assert!(matches!(err, VoxError::PermissionDenied(_)));
    assert!(!h.controller.is_recording());
    assert_eq!(h.controller.caption(), "Mic error");
}

#[test]
fn capture_failure_rolls_back_to_idle() {
    let mut h = harness(ScriptedCapture::failing("device busy"));
    let err = h.controller.start_recording().unwrap_err();
    assert!(matches!(err, VoxError::Capture(_)));
    assert!(!h.controller.is_recording());
    assert!(!h.controller.meter().is_active());
}

#[test]
fn empty_recording_reports_missing_file() {
    let mut h = harness(ScriptedCapture::new(Vec::new(), RATE));
    h.controller.toggle().unwrap();
    let err = h.controller.toggle().unwrap_err();
    assert!(matches!(err, VoxError::FileMissing(_)));
    assert_eq!(h.controller.caption(), "Recorded file missing.");
    assert!(!h.controller.is_busy());
    assert!(h.uploads.lock().unwrap().contexts.is_empty());
    // Ready for another attempt.
    assert_eq!(h.controller.toggle().unwrap(), ToggleOutcome::Started);
}

#[test]
fn server_error_is_surfaced_and_controller_returns_to_idle() {
    let mut h = harness_with(
        ScriptedCapture::new(loud_frames(4), RATE),
        || Err(VoxError::server(500, "boom")),
        None,
    );
    h.controller.toggle().unwrap();
    h.controller.toggle().unwrap();
    let event = h.controller.wait_for_upload(WAIT).expect("upload result");
    assert_eq!(
        event,
        ControllerEvent::Failed {
            kind: "server",
            caption: "Server error: boom".to_string(),
        }
    );
    assert_eq!(h.controller.caption(), "Server error: boom");
    assert!(!h.controller.is_busy());
    assert!(h.sink.ops().is_empty());
    assert!(!h.uploads.lock().unwrap().clip_paths[0].exists());
    assert_eq!(h.controller.toggle().unwrap(), ToggleOutcome::Started);
}

#[test]
fn taps_during_upload_are_ignored() {
    let (release, gate) = crossbeam_channel::bounded(1);
    let mut h = harness_with(ScriptedCapture::new(loud_frames(4), RATE), reply_ok, Some(gate));
    h.controller.toggle().unwrap();
    h.controller.toggle().unwrap();
    assert_eq!(h.controller.toggle().unwrap(), ToggleOutcome::Busy);
    assert!(h.controller.poll().is_none());
    assert!(!h.controller.is_recording());

    release.send(()).unwrap();
    assert!(h.controller.wait_for_upload(WAIT).is_some());
    assert_eq!(h.controller.toggle().unwrap(), ToggleOutcome::Started);
}

#[test]
fn result_after_shutdown_is_discarded() {
    let (release, gate) = crossbeam_channel::bounded(1);
    let mut h = harness_with(ScriptedCapture::new(loud_frames(4), RATE), reply_ok, Some(gate));
    h.controller.toggle().unwrap();
    h.controller.toggle().unwrap();
    h.controller.shutdown();

    release.send(()).unwrap();
    assert!(h.controller.wait_for_upload(WAIT).is_none());
    assert!(!h.controller.is_busy());
    assert!(h.sink.ops().is_empty(), "no playback after teardown");
}

#[test]
fn meter_is_zeroed_when_recording_stops() {
    let mut h = harness(ScriptedCapture::new(loud_frames(20), RATE));
    h.controller.toggle().unwrap();
    h.controller.toggle().unwrap();
    assert_eq!(h.controller.meter().level(), 0.0);
    assert_eq!(h.controller.meter().visual_level(), 0.0);
    assert!(!h.controller.meter().is_active());
    h.controller.wait_for_upload(WAIT);
}

#[test]
fn hands_free_segment_is_uploaded_as_a_clip() {
    let mut h = harness(ScriptedCapture::new(Vec::new(), RATE));
    let segment = PcmSegment {
        samples: vec![900; 8_000],
        sample_rate: RATE,
        end: SegmentEnd::Silence,
    };
    h.controller.submit_segment(&segment).unwrap();
    assert!(h.controller.is_busy());
    assert!(matches!(
        h.controller.wait_for_upload(WAIT),
        Some(ControllerEvent::Replied { .. })
    ));
    assert_eq!(h.uploads.lock().unwrap().clip_existed, vec![true]);
}

#[test]
fn phase_captions_are_stable() {
    assert_eq!(Phase::Finishing.caption(), "Finishing…");
    assert_eq!(Phase::Downloading.caption(), "Downloading reply…");
    assert_eq!(
        Phase::Failed("Upload/Play failed: timeout".into()).caption(),
        "Upload/Play failed: timeout"
    );
    assert_eq!(ReplyFormat::Wav.extension(), "wav");
}
