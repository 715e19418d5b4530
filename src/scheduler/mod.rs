//! Render Scheduler: a coalescing throttle for interactive edits and a frame-drop gate for
//! live preview, both built on [`AdmissionSlot`].

mod coalescing;
mod frame_drop;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use coalescing::{CoalescingScheduler, RequestOutcome, SchedulerStats};
pub use frame_drop::{Admission, FrameDropScheduler, FrameDropStats};

/// Single-slot, non-blocking admission. At most one [`SlotPermit`] exists at a time.
#[derive(Debug, Default)]
pub struct AdmissionSlot {
    busy: AtomicBool,
}

impl AdmissionSlot {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Takes the slot if it is free. Never waits.
    pub fn try_acquire(self: &Arc<Self>) -> Option<SlotPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SlotPermit { slot: Arc::clone(self) })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Proof of holding the slot. Dropping it releases the slot exactly once.
#[derive(Debug)]
pub struct SlotPermit {
    slot: Arc<AdmissionSlot>,
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        self.slot.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_permit_at_a_time() {
        let slot = AdmissionSlot::new();
        let permit = slot.try_acquire().unwrap();
        assert!(slot.is_busy());
        assert!(slot.try_acquire().is_none());
        drop(permit);
        assert!(!slot.is_busy());
        assert!(slot.try_acquire().is_some());
    }

    #[test]
    fn contended_acquire_admits_exactly_one() {
        let slot = AdmissionSlot::new();
        let barrier = Arc::new(std::sync::Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let slot = Arc::clone(&slot);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    // Hold the permit until every thread has tried
                    let permit = slot.try_acquire();
                    let won = permit.is_some();
                    barrier.wait();
                    won
                })
            })
            .collect();
        let winners = handles.into_iter().map(|h| h.join().unwrap()).filter(|w| *w).count();
        assert_eq!(winners, 1);
    }
}
