use std::sync::{Mutex, MutexGuard};

/// Lock a mutex shared with a capture callback or worker, recovering the
/// guard if another thread panicked while holding it.
pub(crate) fn lock_or_recover<'a, T>(lock: &'a Mutex<T>, context: &str) -> MutexGuard<'a, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            crate::log_debug(&format!("Mutex poisoned in {context}; recovering"));
            poisoned.into_inner()
        }
    }
}
