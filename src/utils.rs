// Small shared helpers

use std::sync::{Mutex, MutexGuard};

/// Poison-tolerant locking for std mutexes
pub(crate) trait MutexExt<T> {
    /// Lock the mutex, recovering the inner data if a previous holder panicked
    fn lock_or_recover(&self) -> MutexGuard<'_, T>;
}

impl<T> MutexExt<T> for Mutex<T> {
    #[track_caller]
    fn lock_or_recover(&self) -> MutexGuard<'_, T> {
        match self.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                let loc = std::panic::Location::caller();
                tracing::error!(
                    mutex_type = std::any::type_name::<T>(),
                    file = loc.file(),
                    line = loc.line(),
                    "Mutex poisoned by a panicking holder, recovering inner state"
                );
                poisoned.into_inner()
            }
        }
    }
}

/// Shorten a secret for log output
pub fn redact(secret: &str) -> String {
    let visible: String = secret.chars().take(8).collect();
    if visible.len() < secret.len() {
        format!("{}...", visible)
    } else {
        visible
    }
}
