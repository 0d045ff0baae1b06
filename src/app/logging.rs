use crate::config::AppConfig;
use std::{
    env, fs,
    io::Write,
    panic,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, OnceLock,
    },
    time::{SystemTime, UNIX_EPOCH},
};

const LOG_MAX_BYTES: u64 = 5 * 1024 * 1024;
const CRASH_LOG_MAX_BYTES: u64 = 256 * 1024;
static LOG_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_CONTENT_ENABLED: AtomicBool = AtomicBool::new(false);
static CRASH_LOG_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_STATE: OnceLock<Mutex<LogState>> = OnceLock::new();

/// Path to the temp debug log, truncated once it grows past the size cap.
pub fn log_file_path() -> PathBuf {
    env::temp_dir().join("voxorb.log")
}

/// Path to the crash log file (metadata only).
pub fn crash_log_path() -> PathBuf {
    env::temp_dir().join("voxorb_crash.log")
}

struct LogWriter {
    path: PathBuf,
    file: fs::File,
    max_bytes: u64,
    bytes_written: u64,
}

impl LogWriter {
    fn new(path: PathBuf, max_bytes: u64) -> Option<Self> {
        let mut bytes_written = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        if bytes_written > max_bytes {
            let _ = fs::remove_file(&path);
            bytes_written = 0;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .ok()?;
        Some(Self {
            path,
            file,
            max_bytes,
            bytes_written,
        })
    }

    fn rotate_if_needed(&mut self, next_len: usize) {
        if self.bytes_written.saturating_add(next_len as u64) <= self.max_bytes {
            return;
        }
        if let Ok(file) = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)
        {
            self.file = file;
            self.bytes_written = 0;
        }
    }

    fn write_line(&mut self, line: &str) {
        self.rotate_if_needed(line.len());
        if self.file.write_all(line.as_bytes()).is_ok() {
            self.bytes_written = self.bytes_written.saturating_add(line.len() as u64);
        }
    }
}

#[derive(Default)]
struct LogState {
    writer: Option<LogWriter>,
}

fn log_state() -> &'static Mutex<LogState> {
    LOG_STATE.get_or_init(|| Mutex::new(LogState::default()))
}

fn apply_log_flags(enabled: bool, content_enabled: bool) {
    LOG_ENABLED.store(enabled, Ordering::Relaxed);
    LOG_CONTENT_ENABLED.store(enabled && content_enabled, Ordering::Relaxed);
    CRASH_LOG_ENABLED.store(enabled, Ordering::Relaxed);

    let mut state = log_state()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    state.writer = if enabled {
        LogWriter::new(log_file_path(), LOG_MAX_BYTES)
    } else {
        None
    };
}

/// Configure file logging and the JSON trace subscriber from CLI flags.
pub fn init_logging(config: &AppConfig) {
    let enabled = config.logs && !config.no_logs;
    apply_log_flags(enabled, config.log_content);
    crate::telemetry::init_tracing(config);
}

/// Append a debug line to the temp log. Never prints to the terminal.
pub fn log_debug(msg: &str) {
    if !LOG_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let line = format!("[{timestamp}] {msg}\n");
    let mut state = log_state()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(writer) = state.writer.as_mut() {
        writer.write_line(&line);
    }
}

/// Write logs that may contain user content (transcripts, reply captions).
pub fn log_debug_content(msg: &str) {
    if !LOG_CONTENT_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    log_debug(msg);
}

pub fn content_logging_enabled() -> bool {
    LOG_CONTENT_ENABLED.load(Ordering::Relaxed)
}

/// Write a minimal crash log entry, omitting user content unless explicitly enabled.
pub fn log_panic(info: &panic::PanicHookInfo<'_>) {
    if !CRASH_LOG_ENABLED.load(Ordering::Relaxed) {
        return;
    }

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let location = info
        .location()
        .map(|loc| format!("{}:{}", loc.file(), loc.line()))
        .unwrap_or_else(|| "unknown".to_string());

    let payload = if LOG_CONTENT_ENABLED.load(Ordering::Relaxed) {
        if let Some(text) = info.payload().downcast_ref::<&str>() {
            (*text).to_string()
        } else if let Some(text) = info.payload().downcast_ref::<String>() {
            text.clone()
        } else {
            "non-string panic payload".to_string()
        }
    } else {
        "panic payload omitted (log-content disabled)".to_string()
    };

    let line = format!(
        "[{timestamp}] panic at {location}: {payload} (v{})\n",
        env!("CARGO_PKG_VERSION")
    );
    append_capped(&crash_log_path(), &line, CRASH_LOG_MAX_BYTES);
}

/// Append `line`, starting the file over when it would grow past `max_bytes`.
fn append_capped(path: &Path, line: &str, max_bytes: u64) {
    let mut bytes_written = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    if bytes_written > max_bytes {
        let _ = fs::remove_file(path);
        bytes_written = 0;
    }
    if bytes_written.saturating_add(line.len() as u64) > max_bytes {
        if let Ok(mut file) = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
        {
            let _ = file.write_all(line.as_bytes());
        }
        return;
    }
    if let Ok(mut file) = fs::OpenOptions::new().create(true).append(true).open(path) {
        let _ = file.write_all(line.as_bytes());
    }
}

#[cfg(test)]
pub(crate) fn set_logging_for_tests(enabled: bool, content_enabled: bool) {
    apply_log_flags(enabled, content_enabled);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    static LOG_TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn init_logging_respects_no_logs() {
        let _guard = LOG_TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let config = AppConfig::parse_from(["voxorb-tests", "--logs", "--no-logs"]);
        init_logging(&config);
        assert!(!LOG_ENABLED.load(Ordering::Relaxed));
        assert!(!content_logging_enabled());
    }

    #[test]
    fn content_logging_requires_base_logging() {
        let _guard = LOG_TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        set_logging_for_tests(false, true);
        assert!(!content_logging_enabled());
        set_logging_for_tests(true, true);
        assert!(content_logging_enabled());
        set_logging_for_tests(false, false);
    }

    #[test]
    fn log_debug_writes_when_enabled() {
        let _guard = LOG_TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        set_logging_for_tests(true, false);
        let marker = format!("voxorb-log-marker-{}", std::process::id());
        log_debug(&marker);
        let contents = fs::read_to_string(log_file_path()).unwrap_or_default();
        set_logging_for_tests(false, false);
        assert!(contents.contains(&marker));
    }

    #[test]
    fn crash_log_append_never_exceeds_cap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crash.log");
        fs::write(&path, "x".repeat(90)).unwrap();

        append_capped(&path, &format!("{}\n", "y".repeat(30)), 100);
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.len() <= 100);
        assert!(contents.starts_with('y'));

        append_capped(&path, "short\n", 100);
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.ends_with("short\n"));
        assert!(contents.len() <= 100);
    }
}
