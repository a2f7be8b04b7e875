//! Bookkeeping of slots whose CPU state diverged from the GPU copy.
//!
//! A few changed slots are cheaper to upload one record at a time; once the number
//! of changes approaches the population, or the buffer has to be recreated anyway,
//! one write of the whole live range wins. [`DirtyTracker::plan`] makes that call.

use std::collections::BTreeSet;

/// What the next sync has to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncPlan {
    /// GPU state is current.
    Idle,
    /// Upload every pending slot as its own sub-range write.
    Patch,
    /// Upload `[0, len)` in one write, recreating the buffers first if `resize`.
    Full { resize: bool },
}

#[derive(Debug, Default)]
pub struct DirtyTracker {
    pending: BTreeSet<u32>,
    max_patch_count: usize,
    overflowed: bool,
    full_requested: bool,
}

impl DirtyTracker {
    pub fn new(max_patch_count: usize) -> Self {
        Self {
            max_patch_count,
            ..Default::default()
        }
    }

    pub fn max_patch_count(&self) -> usize {
        self.max_patch_count
    }

    pub fn mark(&mut self, slot: u32) {
        if self.overflowed {
            return;
        }
        self.pending.insert(slot);
        if self.pending.len() >= self.max_patch_count {
            // Past this point the individual ids no longer matter.
            self.overflowed = true;
            self.pending.clear();
        }
    }

    /// Forces the next sync to upload everything, regardless of the pending count.
    pub fn request_full(&mut self) {
        self.full_requested = true;
    }

    /// Number of distinct pending slots, saturating at `max_patch_count`.
    pub fn pending_count(&self) -> usize {
        if self.overflowed {
            self.max_patch_count
        } else {
            self.pending.len()
        }
    }

    pub fn is_pending(&self, slot: u32) -> bool {
        self.overflowed || self.full_requested || self.pending.contains(&slot)
    }

    pub fn is_clean(&self) -> bool {
        !self.overflowed && !self.full_requested && self.pending.is_empty()
    }

    /// Pending slots in ascending order. Empty once the tracker overflowed.
    pub fn pending(&self) -> impl Iterator<Item = u32> + '_ {
        self.pending.iter().copied()
    }

    /// Decides how to bring a buffer of `buffer_capacity` instances up to date with
    /// an arena that needs `required_capacity`. `None` means no buffer exists yet.
    pub fn plan(&self, buffer_capacity: Option<usize>, required_capacity: usize) -> SyncPlan {
        let fits = buffer_capacity.is_some_and(|capacity| capacity >= required_capacity);
        if !fits {
            SyncPlan::Full { resize: true }
        } else if self.overflowed || self.full_requested {
            SyncPlan::Full { resize: false }
        } else if self.pending.is_empty() {
            SyncPlan::Idle
        } else if self.pending.len() < self.max_patch_count {
            SyncPlan::Patch
        } else {
            SyncPlan::Full { resize: false }
        }
    }

    /// Forgets everything pending. Only a completed sync may call this.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.overflowed = false;
        self.full_requested = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_small_buffer_forces_resize() {
        let tracker = DirtyTracker::new(128);
        assert_eq!(tracker.plan(None, 64), SyncPlan::Full { resize: true });
        assert_eq!(tracker.plan(Some(32), 64), SyncPlan::Full { resize: true });
        assert_eq!(tracker.plan(Some(64), 64), SyncPlan::Idle);
    }

    #[test]
    fn threshold_switches_from_patch_to_full() {
        let mut tracker = DirtyTracker::new(4);
        for slot in 0..3 {
            tracker.mark(slot);
        }
        tracker.mark(1);
        assert_eq!(tracker.pending_count(), 3);
        assert_eq!(tracker.plan(Some(8), 8), SyncPlan::Patch);

        tracker.mark(3);
        assert_eq!(tracker.pending_count(), 4);
        assert_eq!(tracker.pending().count(), 0);
        assert_eq!(tracker.plan(Some(8), 8), SyncPlan::Full { resize: false });

        tracker.clear();
        assert!(tracker.is_clean());
    }

    #[test]
    fn zero_threshold_never_patches() {
        let mut tracker = DirtyTracker::new(0);
        tracker.mark(5);
        assert_eq!(tracker.plan(Some(8), 8), SyncPlan::Full { resize: false });
    }

    #[test]
    fn requested_full_sync_wins_over_patch() {
        let mut tracker = DirtyTracker::new(128);
        tracker.mark(2);
        tracker.request_full();
        assert!(tracker.is_pending(7));
        assert_eq!(tracker.plan(Some(8), 8), SyncPlan::Full { resize: false });
    }
}
