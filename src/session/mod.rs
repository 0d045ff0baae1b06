//! Speech session supervision: recognizer lifecycle, cooldown restarts,
//! the dead-session watchdog, and the background listening runtime.

mod clock;
mod supervisor;
#[cfg(test)]
mod tests;
mod worker;

pub use clock::{Clock, DelayedTask, ManualClock, SystemClock};
pub use supervisor::{
    RestartReason, SessionSupervisor, SpeechRecognizer, SupervisorConfig, SupervisorEvent,
    SupervisorState,
};
pub use worker::{
    log_listen_metrics, spawn_listen_worker, ListenCommand, ListenMessage, ListenWorker,
    WorkerConfig,
};
