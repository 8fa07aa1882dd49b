use std::sync::{LockResult, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

/// Take a read guard, recovering the inner value if a writer panicked.
pub(crate) fn read_guard<'a, T>(
    lock: &'a RwLock<T>,
    store: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    recover(lock.read(), store, op, "rwlock.read")
}

/// Take a write guard, recovering the inner value if a writer panicked.
pub(crate) fn write_guard<'a, T>(
    lock: &'a RwLock<T>,
    store: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    recover(lock.write(), store, op, "rwlock.write")
}

fn recover<G>(
    result: LockResult<G>,
    store: &'static str,
    op: &'static str,
    lock_kind: &'static str,
) -> G {
    result.unwrap_or_else(|poisoned| {
        warn!(
            target = "freshline::cache",
            op,
            store,
            lock_kind,
            result = "poisoned_recovered",
            hint = "entries written before the panic are kept as-is",
            "Recovered from poisoned store lock"
        );
        poisoned.into_inner()
    })
}
