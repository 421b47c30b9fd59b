//! Mapped-buffer lifetime discipline.
//!
//! Naive ownership says views borrow from the `Reader`; real consumers embed
//! views inside larger owned structures that outlive the `Reader`'s lexical
//! scope. This module re-architects around a shared lifetime token instead:
//! the mapping lives behind an `Arc`, the `Reader` holds one strong
//! reference, and each vended view holds a clone. `close()` doesn't drop the
//! mapping out from under a live view — it refuses, leaving both the
//! mapping and the caller's `Reader` intact.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use memmap2::Mmap;

/// Accounts for mapped views vended from a single mapping.
///
/// The counter only tracks views *beyond* the `Reader`'s own reference —
/// it answers "is it safe to drop the Reader's `Arc`", not "how many total
/// `Arc` clones exist". Incrementing always happens on the thread that
/// calls the vending operation; decrementing happens on whatever thread
/// drops the view, which is why the counter is atomic.
#[derive(Debug, Default)]
pub struct MappedBufferGovernor {
    live_views: AtomicUsize,
}

impl MappedBufferGovernor {
    pub fn new() -> Self {
        Self {
            live_views: AtomicUsize::new(0),
        }
    }

    pub fn live_count(&self) -> usize {
        self.live_views.load(Ordering::Acquire)
    }

    /// Vend a new token over `mapping`, incrementing the live count.
    pub fn vend(self: &Arc<Self>, mapping: Arc<Mmap>) -> MappingToken {
        self.live_views.fetch_add(1, Ordering::AcqRel);
        MappingToken {
            governor: Arc::clone(self),
            mapping,
        }
    }
}

/// A strong reference to a live mapping, held by every vended mapped
/// [`crate::reader::BufferView`]. Its `Drop` impl decrements the
/// governor's live count, which is what makes a later `close()` succeed.
pub struct MappingToken {
    governor: Arc<MappedBufferGovernor>,
    mapping: Arc<Mmap>,
}

impl MappingToken {
    pub fn mapping(&self) -> &Mmap {
        &self.mapping
    }
}

impl Drop for MappingToken {
    fn drop(&mut self) {
        self.governor.live_views.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Clone for MappingToken {
    fn clone(&self) -> Self {
        self.governor.live_views.fetch_add(1, Ordering::AcqRel);
        Self {
            governor: Arc::clone(&self.governor),
            mapping: Arc::clone(&self.mapping),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn make_mapping() -> Arc<Mmap> {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(&[0u8; 4096]).unwrap();
        file.sync_all().unwrap();
        let mmap = unsafe { Mmap::map(&file).unwrap() };
        Arc::new(mmap)
    }

    #[test]
    fn vend_and_drop_tracks_live_count() {
        let governor = Arc::new(MappedBufferGovernor::new());
        let mapping = make_mapping();
        assert_eq!(governor.live_count(), 0);

        let token = governor.vend(Arc::clone(&mapping));
        assert_eq!(governor.live_count(), 1);

        let cloned = token.clone();
        assert_eq!(governor.live_count(), 2);

        drop(token);
        assert_eq!(governor.live_count(), 1);

        drop(cloned);
        assert_eq!(governor.live_count(), 0);
    }

    #[test]
    fn concurrent_drops_are_consistent() {
        let governor = Arc::new(MappedBufferGovernor::new());
        let mapping = make_mapping();
        let tokens: Vec<_> = (0..8).map(|_| governor.vend(Arc::clone(&mapping))).collect();
        assert_eq!(governor.live_count(), 8);

        let handles: Vec<_> = tokens
            .into_iter()
            .map(|t| std::thread::spawn(move || drop(t)))
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(governor.live_count(), 0);
    }
}
