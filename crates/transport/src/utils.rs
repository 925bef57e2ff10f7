/// Early return with an error when a condition does not hold.
///
/// Like `assert!` but produces an `Err` instead of a panic, which is the
/// only acceptable failure mode inside codec and stream state handling.
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;

/// Locks a mutex, recovering the guard if a panic poisoned it.
///
/// The protected state in this crate is only ever mutated through methods
/// that cannot unwind mid-update, so the data behind a poisoned lock is
/// still consistent.
pub(crate) fn lock_unpoisoned<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
