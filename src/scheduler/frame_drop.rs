use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;

use super::{AdmissionSlot, SlotPermit};
use crate::errors::{FxError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    Dropped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameDropStats {
    pub offered: u64,
    pub accepted: u64,
    pub dropped: u64,
    pub processed: u64,
}

#[derive(Default)]
struct Counters {
    offered: AtomicU64,
    accepted: AtomicU64,
    dropped: AtomicU64,
    processed: AtomicU64,
}

/// Processes an item only when the single slot is free; anything arriving while busy is
/// dropped, never queued. Processed items are an increasing subsequence of offered ones.
pub struct FrameDropScheduler<T: Send + 'static> {
    slot: Arc<AdmissionSlot>,
    items: Option<Sender<(T, SlotPermit)>>,
    worker: Option<thread::JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl<T: Send + 'static> FrameDropScheduler<T> {
    pub fn spawn<F>(name: &str, mut process: F) -> Result<Self>
    where
        F: FnMut(T) + Send + 'static,
    {
        let (items, rx) = mpsc::channel::<(T, SlotPermit)>();
        let counters = Arc::new(Counters::default());
        let worker_counters = Arc::clone(&counters);
        let worker = thread::Builder::new().name(name.to_string()).spawn(move || {
            while let Ok((item, permit)) = rx.recv() {
                process(item);
                worker_counters.processed.fetch_add(1, Ordering::Relaxed);
                drop(permit);
            }
            tracing::debug!("frame-drop worker stopped");
        })?;

        Ok(Self {
            slot: AdmissionSlot::new(),
            items: Some(items),
            worker: Some(worker),
            counters,
        })
    }

    /// Non-blocking admit-or-drop.
    pub fn offer(&self, item: T) -> Result<Admission> {
        self.counters.offered.fetch_add(1, Ordering::Relaxed);
        let Some(permit) = self.slot.try_acquire() else {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return Ok(Admission::Dropped);
        };
        let items = self.items.as_ref().ok_or(FxError::WorkerStopped { worker: "live" })?;
        items
            .send((item, permit))
            .map_err(|_| FxError::WorkerStopped { worker: "live" })?;
        self.counters.accepted.fetch_add(1, Ordering::Relaxed);
        Ok(Admission::Accepted)
    }

    pub fn is_busy(&self) -> bool {
        self.slot.is_busy()
    }

    pub fn stats(&self) -> FrameDropStats {
        FrameDropStats {
            offered: self.counters.offered.load(Ordering::Relaxed),
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            processed: self.counters.processed.load(Ordering::Relaxed),
        }
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.items.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Frame-drop worker panicked");
            }
        }
    }
}

impl<T: Send + 'static> Drop for FrameDropScheduler<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    #[test]
    fn slow_processing_drops_excess_frames() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (a, p, s) = (Arc::clone(&active), Arc::clone(&peak), Arc::clone(&seen));
        let scheduler = FrameDropScheduler::spawn("test-live", move |seq: u32| {
            let now = a.fetch_add(1, Ordering::SeqCst) + 1;
            p.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(50));
            s.lock().unwrap().push(seq);
            a.fetch_sub(1, Ordering::SeqCst);
        })
        .unwrap();

        let start = Instant::now();
        let mut accepted = 0u64;
        for seq in 0..30 {
            if scheduler.offer(seq).unwrap() == Admission::Accepted {
                accepted += 1;
            }
            thread::sleep(Duration::from_millis(16));
        }
        let elapsed_ms = start.elapsed().as_millis() as u64;
        scheduler.shutdown();

        assert!(accepted >= 1);
        assert!(accepted <= elapsed_ms.div_ceil(50));
        assert_eq!(peak.load(Ordering::SeqCst), 1);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len() as u64, accepted);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn fast_processing_drops_nothing() {
        let scheduler = FrameDropScheduler::spawn("test-fast", |_: u32| {}).unwrap();
        for seq in 0..10 {
            while scheduler.is_busy() {
                thread::yield_now();
            }
            assert_eq!(scheduler.offer(seq).unwrap(), Admission::Accepted);
        }
        while scheduler.is_busy() {
            thread::yield_now();
        }
        let stats = scheduler.stats();
        assert_eq!((stats.offered, stats.accepted, stats.dropped, stats.processed), (10, 10, 0, 10));
    }
}
