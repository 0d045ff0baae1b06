//! `--talk`: Enter toggles recording; the clip is uploaded and the reply played.

use anyhow::Result;
use crossbeam_channel::RecvTimeoutError;
use std::io::{self, Write};
use std::time::{Duration, Instant};
use voxorb::audio::{LiveMeter, Recorder};
use voxorb::config::AppConfig;
use voxorb::controller::{ControllerEvent, RecordingController, ToggleOutcome};
use voxorb::log_debug;
use voxorb::orb::{OrbAnimator, OrbConfig, OrbMode, OrbMorph, ROTATION_STEP_WEB};

use crate::cli_utils::{level_bar, spawn_line_reader};

/// Roughly 30 frames per second for the console orb readout.
const FRAME_TICK: Duration = Duration::from_millis(33);

pub(crate) fn run_talk(config: &AppConfig) -> Result<()> {
    let recorder = Recorder::new(config.input_device.as_deref())?;
    let meter = LiveMeter::new();
    let mut controller = RecordingController::from_app(config, recorder, meter.clone())?;
    let mut animator = OrbAnimator::new(OrbMorph::new(OrbConfig::from(config)), ROTATION_STEP_WEB);
    log_debug(&format!("orb noise seed {}", animator.morph().seed()));

    println!("{}", controller.caption());
    println!("Press Enter to start/stop recording, q + Enter to quit.");
    let lines = spawn_line_reader();
    let started = Instant::now();
    let mut last_caption = controller.caption();

    loop {
        match lines.recv_timeout(FRAME_TICK) {
            Ok(line) if line.trim().eq_ignore_ascii_case("q") => break,
            Ok(_) => match controller.toggle() {
                Ok(ToggleOutcome::Busy) => println!("(busy, waiting for the reply)"),
                Ok(_) => {}
                Err(err) => log_debug(&format!("toggle failed: {err}")),
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if let Some(ControllerEvent::Replied { metadata, saved }) = controller.poll() {
            if let Some(transcript) = metadata.transcript {
                println!("You said: {transcript}");
            }
            println!(
                "Reply saved to {} (language={}, voice={})",
                saved.display(),
                metadata.language.as_deref().unwrap_or("?"),
                metadata.voice_id.as_deref().unwrap_or("?")
            );
        }

        let mode = if controller.playback().is_playing() {
            OrbMode::Speaking
        } else {
            OrbMode::Listening
        };
        let time_ms = started.elapsed().as_secs_f64() * 1000.0;
        let frame = animator.frame_from_meter(&meter, time_ms, mode);
        if controller.is_recording() {
            let mean_radius = frame.vertices.iter().map(|v| v.length()).sum::<f32>()
                / frame.vertices.len().max(1) as f32;
            print!(
                "\r{} orb r={mean_radius:.2} {}",
                level_bar(meter.visual_level()),
                frame.color.css()
            );
            io::stdout().flush().ok();
        }

        let caption = controller.caption();
        if caption != last_caption {
            println!("\n{caption}");
            last_caption = caption;
        }
    }

    controller.shutdown();
    Ok(())
}
