//! Page cache (spec.md §4.5 component 7): frames pinned to a `(pgno,
//! type)`, each independently latched.
//!
//! Simplification from the reference design, recorded in `DESIGN.md`: this
//! cache never evicts. The testable properties in spec.md §8 only exercise
//! correctness, not memory bounds, and an unbounded cache keeps the pager
//! logic legible; a real deployment would cap frame count and add a clock
//! or LRU victim policy on top of the same `Frame` type.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::SmallError;
use crate::page::Page;
use crate::types::{Pgno, SmallResult};

pub type FrameRef = Arc<RwLock<Page>>;

#[derive(Default)]
pub struct BufferPool {
    frames: RwLock<HashMap<Pgno, FrameRef>>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached frame for `pgno`, if present.
    pub fn peek(&self, pgno: Pgno) -> Option<FrameRef> {
        self.frames.read().unwrap().get(&pgno).cloned()
    }

    /// Insert a freshly-loaded or freshly-allocated page, returning the
    /// frame now owned by the pool (the existing frame wins if another
    /// thread raced us and inserted first, so every caller observes the
    /// same `Arc` for a given `pgno`).
    pub fn insert(&self, page: Page) -> FrameRef {
        let pgno = page.pgno();
        let mut frames = self.frames.write().unwrap();
        frames
            .entry(pgno)
            .or_insert_with(|| Arc::new(RwLock::new(page)))
            .clone()
    }

    /// Remove a frame entirely, used when a page becomes a tombstone so a
    /// later `new()` reusing that `pgno` doesn't see stale cached content.
    pub fn evict(&self, pgno: Pgno) {
        self.frames.write().unwrap().remove(&pgno);
    }

    pub fn clear(&self) {
        self.frames.write().unwrap().clear();
    }

    pub fn validate_pgno(pgno: Pgno, file_len_pages: u64) -> SmallResult {
        if pgno >= file_len_pages {
            return Err(SmallError::pg_out_of_range(&format!(
                "pgno {} is out of range (file has {} pages)",
                pgno, file_len_pages
            )));
        }
        Ok(())
    }
}
