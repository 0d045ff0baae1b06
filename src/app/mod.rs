//! Process-wide plumbing: debug log, crash log, and tracing setup.

mod logging;

#[cfg(test)]
pub(crate) use logging::set_logging_for_tests;
pub use logging::{
    content_logging_enabled, crash_log_path, init_logging, log_debug, log_debug_content,
    log_file_path, log_panic,
};
