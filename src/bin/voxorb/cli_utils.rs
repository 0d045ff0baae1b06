use anyhow::{bail, Context, Result};
use crossbeam_channel::{unbounded, Receiver};
use std::io::{self, BufRead};
use std::thread;
use voxorb::audio::{self, simulate_levels, PipelineConfig};
use voxorb::config::AppConfig;

const BAR_WIDTH: usize = 30;

pub(crate) fn list_input_devices() -> Result<()> {
    // VOXORB_TEST_DEVICES stands in for the host's device list in tests.
    let devices = if let Ok(raw) = std::env::var("VOXORB_TEST_DEVICES") {
        parse_device_list(&raw)
    } else {
        audio::Recorder::list_devices().unwrap_or_else(|err| {
            eprintln!("Failed to list audio input devices: {err}");
            Vec::new()
        })
    };

    if devices.is_empty() {
        println!("No audio input devices detected.");
    } else {
        println!("Available audio input devices:");
        for name in devices {
            println!("  - {name}");
        }
    }
    Ok(())
}

fn parse_device_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Parse `0.1,0.2, 0.3` into loudness samples in [0, 1].
pub(crate) fn parse_levels(raw: &str) -> Result<Vec<f32>> {
    let mut levels = Vec::new();
    for (idx, item) in raw.split(',').map(str::trim).enumerate() {
        if item.is_empty() {
            continue;
        }
        // `0.2x15` repeats a level.
        let (value, repeat) = match item.split_once('x') {
            Some((value, count)) => (
                value.trim(),
                count
                    .trim()
                    .parse::<usize>()
                    .with_context(|| format!("bad repeat count in item {}: '{item}'", idx + 1))?,
            ),
            None => (item, 1),
        };
        let level: f32 = value
            .parse()
            .with_context(|| format!("bad loudness in item {}: '{item}'", idx + 1))?;
        if !(0.0..=1.0).contains(&level) {
            bail!("loudness must be within [0, 1], got {level}");
        }
        levels.extend(std::iter::repeat(level).take(repeat));
    }
    if levels.is_empty() {
        bail!("--simulate-vad needs at least one loudness value");
    }
    Ok(levels)
}

pub(crate) fn run_simulation(config: &AppConfig, raw: &str) -> Result<()> {
    let levels = parse_levels(raw)?;
    let (transitions, metrics) =
        simulate_levels(&levels, config.simulate_step_ms, PipelineConfig::from(config));
    for t in &transitions {
        println!(
            "t={}ms {} smoothed={:.3}",
            t.at_ms,
            t.transition.label(),
            t.smoothed
        );
    }
    println!(
        "transitions={} speech_segments={} frames={} speech_ms={}",
        transitions.len(),
        metrics.speech_segments,
        metrics.frames_processed,
        metrics.speech_ms
    );
    Ok(())
}

/// ASCII loudness bar, e.g. `[#####.........] 0.31`.
pub(crate) fn format_level_bar(level: f32, width: usize) -> String {
    let level = if level.is_finite() { level.clamp(0.0, 1.0) } else { 0.0 };
    let filled = (level * width as f32).round() as usize;
    format!(
        "[{}{}] {level:.2}",
        "#".repeat(filled),
        ".".repeat(width.saturating_sub(filled))
    )
}

pub(crate) fn level_bar(level: f32) -> String {
    format_level_bar(level, BAR_WIDTH)
}

/// Forward stdin lines on a channel. The sender drops at EOF.
pub(crate) fn spawn_line_reader() -> Receiver<String> {
    let (tx, rx) = unbounded();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}
