//! Shared/exclusive page latch with a pending bit (spec.md §4.1).
//!
//! A single atomic 32-bit word: bit 31 is `PENDING`, bits 0-30 are the
//! shared holder count. No OS blocking; callers spin with a periodic yield,
//! matching the teacher's preference for plain atomics over `parking_lot`
//! in the hot page-pin path (`transaction/concurrent_status.rs` uses a
//! coarse `sleep`-based retry loop for the same reason).

use std::sync::atomic::{AtomicU32, Ordering};

const PENDING: u32 = 1 << 31;
const COUNT_MASK: u32 = PENDING - 1;
const MAX_SHARED: u32 = COUNT_MASK;

pub struct Latch {
    state: AtomicU32,
}

impl Default for Latch {
    fn default() -> Self {
        Self::new()
    }
}

impl Latch {
    pub fn new() -> Self {
        Self {
            state: AtomicU32::new(0),
        }
    }

    fn spin_yield() {
        std::thread::yield_now();
    }

    /// Acquire a shared latch. Blocks while `PENDING` is set so a waiting
    /// writer is never starved by a steady stream of readers.
    pub fn acquire_shared(&self) {
        loop {
            let cur = self.state.load(Ordering::Acquire);
            if cur & PENDING == 0 && (cur & COUNT_MASK) < MAX_SHARED {
                if self
                    .state
                    .compare_exchange_weak(cur, cur + 1, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
                {
                    return;
                }
            }
            Self::spin_yield();
        }
    }

    pub fn try_acquire_shared(&self) -> bool {
        let cur = self.state.load(Ordering::Acquire);
        if cur & PENDING == 0 && (cur & COUNT_MASK) < MAX_SHARED {
            return self
                .state
                .compare_exchange(cur, cur + 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok();
        }
        false
    }

    pub fn release_shared(&self) {
        self.state.fetch_sub(1, Ordering::AcqRel);
    }

    /// Acquire an exclusive latch: first claim `PENDING` so new readers
    /// stop joining, then drain the existing readers.
    pub fn acquire_exclusive(&self) {
        loop {
            let cur = self.state.load(Ordering::Acquire);
            if cur & PENDING == 0
                && self
                    .state
                    .compare_exchange_weak(cur, cur | PENDING, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
            {
                break;
            }
            Self::spin_yield();
        }
        loop {
            let cur = self.state.load(Ordering::Acquire);
            if cur & COUNT_MASK == 0 {
                return;
            }
            Self::spin_yield();
        }
    }

    pub fn try_acquire_exclusive(&self) -> bool {
        self.state
            .compare_exchange(0, PENDING, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    pub fn release_exclusive(&self) {
        self.state.store(0, Ordering::Release);
    }

    /// Upgrade from a held shared latch to exclusive. Succeeds only when
    /// the caller holds the sole shared reference; the caller must already
    /// hold exactly one shared count.
    pub fn upgrade(&self) {
        loop {
            let cur = self.state.load(Ordering::Acquire);
            if cur & PENDING == 0
                && self
                    .state
                    .compare_exchange_weak(
                        cur,
                        (cur - 1) | PENDING,
                        Ordering::AcqRel,
                        Ordering::Relaxed,
                    )
                    .is_ok()
            {
                break;
            }
            Self::spin_yield();
        }
        loop {
            let cur = self.state.load(Ordering::Acquire);
            if cur & COUNT_MASK == 0 {
                return;
            }
            Self::spin_yield();
        }
    }

    pub fn downgrade(&self) {
        self.state.store(1, Ordering::Release);
    }

    #[cfg(test)]
    pub(crate) fn shared_count(&self) -> u32 {
        self.state.load(Ordering::Acquire) & COUNT_MASK
    }

    #[cfg(test)]
    pub(crate) fn is_pending(&self) -> bool {
        self.state.load(Ordering::Acquire) & PENDING != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn multiple_shared_coexist() {
        let latch = Latch::new();
        latch.acquire_shared();
        latch.acquire_shared();
        assert_eq!(latch.shared_count(), 2);
        latch.release_shared();
        latch.release_shared();
        assert_eq!(latch.shared_count(), 0);
    }

    #[test]
    fn exclusive_excludes_shared() {
        let latch = Arc::new(Latch::new());
        latch.acquire_exclusive();
        assert!(!latch.try_acquire_shared());
        latch.release_exclusive();
        assert!(latch.try_acquire_shared());
    }

    #[test]
    fn pending_blocks_new_shared() {
        let latch = Arc::new(Latch::new());
        latch.acquire_shared();

        let l2 = Arc::clone(&latch);
        let got_exclusive = Arc::new(AtomicBool::new(false));
        let got_exclusive2 = Arc::clone(&got_exclusive);
        let writer = std::thread::spawn(move || {
            l2.acquire_exclusive();
            got_exclusive2.store(true, Ordering::SeqCst);
            l2.release_exclusive();
        });

        // give the writer a chance to set PENDING
        std::thread::sleep(Duration::from_millis(50));
        assert!(latch.is_pending());
        assert!(!latch.try_acquire_shared());

        latch.release_shared();
        writer.join().unwrap();
        assert!(got_exclusive.load(Ordering::SeqCst));
    }

    #[test]
    fn upgrade_succeeds_with_sole_reader() {
        let latch = Latch::new();
        latch.acquire_shared();
        latch.upgrade();
        assert!(latch.is_pending());
        assert_eq!(latch.shared_count(), 0);
        latch.release_exclusive();
    }
}
