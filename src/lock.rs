//! Multimode granular lock (IS/IX/S/SIX/X) with a FIFO waiter queue
//! (spec.md §4.2), used by the 2PL lock table that maps resource
//! descriptors (the lock hierarchy in spec.md §5: DB, ROOT, FSTMBST,
//! MSLSN, VHP, VHPOS, VAR, VAR_NEXT, RPTREE) to a lock object.
//!
//! Grounded on the teacher's `transaction/concurrent_status.rs`
//! (`Lock`/`Permission` enums, per-transaction hold-set bookkeeping) but
//! replacing its busy-wait-with-sleep-and-timeout polling loop with a
//! proper condvar-based FIFO queue, since the spec calls for one waiter
//! list per lock rather than a global deadlock-detecting poll.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    IS,
    IX,
    S,
    SIX,
    X,
}

use LockMode::*;

/// Standard multigranularity compatibility matrix.
fn compatible(held: LockMode, want: LockMode) -> bool {
    matches!(
        (held, want),
        (IS, IS) | (IS, IX) | (IS, S) | (IS, SIX)
            | (IX, IS) | (IX, IX)
            | (S, IS) | (S, S)
            | (SIX, IS)
    )
}

struct Waiter {
    mode: LockMode,
    granted: bool,
}

struct Inner {
    /// Count of holders per mode (a lock can be held in more than one mode
    /// at once by distinct transactions, e.g. two S holders).
    holders: Vec<(LockMode, u32)>,
    waiters: VecDeque<Waiter>,
}

impl Inner {
    fn held_modes(&self) -> impl Iterator<Item = LockMode> + '_ {
        self.holders.iter().filter(|(_, n)| *n > 0).map(|(m, _)| *m)
    }

    fn compatible_with_all_held(&self, want: LockMode) -> bool {
        self.held_modes().all(|held| compatible(held, want))
    }

    fn bump(&mut self, mode: LockMode, delta: i64) {
        if let Some(entry) = self.holders.iter_mut().find(|(m, _)| *m == mode) {
            entry.1 = (entry.1 as i64 + delta).max(0) as u32;
        } else if delta > 0 {
            self.holders.push((mode, delta as u32));
        }
    }
}

/// A single lockable resource (one entry in the 2PL lock table).
pub struct GranularLock {
    inner: Mutex<Inner>,
    cv: Condvar,
}

impl Default for GranularLock {
    fn default() -> Self {
        Self::new()
    }
}

impl GranularLock {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                holders: Vec::new(),
                waiters: VecDeque::new(),
            }),
            cv: Condvar::new(),
        }
    }

    /// Blocking acquire. Enqueues as a FIFO waiter when incompatible with a
    /// currently held mode.
    pub fn lock(&self, mode: LockMode) {
        let mut guard = self.inner.lock().unwrap();
        if guard.waiters.is_empty() && guard.compatible_with_all_held(mode) {
            guard.bump(mode, 1);
            return;
        }

        guard.waiters.push_back(Waiter {
            mode,
            granted: false,
        });
        let idx = guard.waiters.len() - 1;

        loop {
            // Only the head of the queue may be granted, preserving FIFO
            // order; `unlock` wakes every waiter whose mode is now
            // compatible so batches of compatible waiters drain together.
            if guard.waiters[idx].granted {
                guard.waiters.remove(idx);
                guard.bump(mode, 1);
                return;
            }
            guard = self.cv.wait(guard).unwrap();
        }
    }

    /// Non-blocking acquire; never enqueues.
    pub fn try_lock(&self, mode: LockMode) -> bool {
        let mut guard = self.inner.lock().unwrap();
        if guard.waiters.is_empty() && guard.compatible_with_all_held(mode) {
            guard.bump(mode, 1);
            true
        } else {
            false
        }
    }

    /// Release one hold of `mode`. Returns true if this was the very last
    /// holder and the waiter queue is empty ("was-last").
    ///
    /// Only marks waiters granted here; the actual `holders` bump happens
    /// once in the woken `lock()` call (single bump per acquire, not one
    /// here and one there).
    pub fn unlock(&self, mode: LockMode) -> bool {
        let mut guard = self.inner.lock().unwrap();
        guard.bump(mode, -1);

        // Compatibility for each queued waiter must account for modes
        // already granted earlier in this same pass (and by prior unlocks,
        // still waiting to be dequeued by their own `lock()`), even though
        // none of those have bumped `holders` yet.
        let mut effective: Vec<LockMode> = guard.held_modes().collect();
        for waiter in guard.waiters.iter_mut() {
            if waiter.granted {
                effective.push(waiter.mode);
                continue;
            }
            if effective.iter().all(|&held| compatible(held, waiter.mode)) {
                waiter.granted = true;
                effective.push(waiter.mode);
            } else {
                break;
            }
        }
        self.cv.notify_all();

        guard.holders.iter().all(|(_, n)| *n == 0) && guard.waiters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn matrix_compatibility() {
        let modes = [IS, IX, S, SIX, X];
        let expect: [[bool; 5]; 5] = [
            // IS     IX     S      SIX    X
            [true, true, true, true, false],  // IS
            [true, true, false, false, false], // IX
            [true, false, true, false, false], // S
            [true, false, false, false, false], // SIX
            [false, false, false, false, false], // X
        ];
        for (i, held) in modes.iter().enumerate() {
            for (j, want) in modes.iter().enumerate() {
                assert_eq!(
                    compatible(*held, *want),
                    expect[i][j],
                    "{:?} held, {:?} wanted",
                    held,
                    want
                );
            }
        }
    }

    #[test]
    fn exclusive_blocks_until_released() {
        let lock = Arc::new(GranularLock::new());
        lock.lock(X);

        let l2 = Arc::clone(&lock);
        let handle = std::thread::spawn(move || {
            l2.lock(S);
        });

        std::thread::sleep(std::time::Duration::from_millis(50));
        let was_last = lock.unlock(X);
        assert!(was_last);
        handle.join().unwrap();
    }

    #[test]
    fn try_lock_never_blocks() {
        let lock = GranularLock::new();
        lock.lock(X);
        assert!(!lock.try_lock(S));
    }
}
