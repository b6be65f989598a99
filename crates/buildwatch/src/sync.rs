use std::sync::{Mutex, MutexGuard, PoisonError};

// Critical sections never leave their data half-written, so a poisoned lock is still usable.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
