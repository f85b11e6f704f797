//! Process-wide disk lock.
//!
//! Conversion and tiling both hammer the disk and drive external tools; the
//! lock serialises them within one process. Functions that must only run
//! under the lock take a `&DiskGuard` argument as proof of acquisition.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::trace;

static DISK_LOCK: Mutex<()> = Mutex::new(());

/// Held for the duration of a disk-heavy critical section.
///
/// Released on drop, including when the section unwinds.
#[must_use = "the disk lock is released as soon as the guard is dropped"]
pub struct DiskGuard {
    _guard: MutexGuard<'static, ()>,
}

impl std::fmt::Debug for DiskGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DiskGuard")
    }
}

/// Block until the disk lock is available.
///
/// A panic in a previous holder does not poison the lock: the guarded
/// state is the disk itself, not data behind the mutex.
pub fn disk_lock() -> DiskGuard {
    trace!("waiting for disk lock");
    let guard = DISK_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    DiskGuard { _guard: guard }
}
