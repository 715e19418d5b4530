use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use super::{AdmissionSlot, SlotPermit};
use crate::errors::{FxError, Result};

/// What happened to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The slot was free and the render started on the worker
    Started,
    /// A render is in flight; this state is parked as the pending request
    Pending,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub requested: u64,
    pub rendered: u64,
    /// Pending requests overwritten by a newer one before they ran
    pub superseded: u64,
}

#[derive(Default)]
struct Counters {
    requested: AtomicU64,
    rendered: AtomicU64,
    superseded: AtomicU64,
}

/// At most one render in flight; while it runs, only the latest request is kept and it
/// runs as soon as the current render finishes.
///
/// The pending slot and the admission slot change together under the pending lock, so a
/// request can never be parked after the worker has decided to go idle.
pub struct CoalescingScheduler<S: Send + 'static> {
    slot: Arc<AdmissionSlot>,
    pending: Arc<Mutex<Option<S>>>,
    jobs: Option<Sender<(S, SlotPermit)>>,
    worker: Option<thread::JoinHandle<()>>,
    counters: Arc<Counters>,
}

fn lock<S>(pending: &Mutex<Option<S>>) -> MutexGuard<'_, Option<S>> {
    pending.lock().unwrap_or_else(|p| p.into_inner())
}

impl<S: Send + 'static> CoalescingScheduler<S> {
    /// Starts the worker thread that runs `render` for every admitted state.
    pub fn spawn<F>(name: &str, mut render: F) -> Result<Self>
    where
        F: FnMut(S) + Send + 'static,
    {
        let (jobs, rx) = mpsc::channel::<(S, SlotPermit)>();
        let slot = AdmissionSlot::new();
        let pending: Arc<Mutex<Option<S>>> = Arc::new(Mutex::new(None));
        let counters = Arc::new(Counters::default());

        let worker_pending = Arc::clone(&pending);
        let worker_counters = Arc::clone(&counters);
        let worker = thread::Builder::new().name(name.to_string()).spawn(move || {
            while let Ok((state, permit)) = rx.recv() {
                let mut permit = Some(permit);
                let mut next = Some(state);
                while let Some(state) = next.take() {
                    render(state);
                    worker_counters.rendered.fetch_add(1, Ordering::Relaxed);

                    let mut pending = lock(&worker_pending);
                    next = pending.take();
                    if next.is_none() {
                        // Released under the lock: a request either sees the slot busy
                        // and parks before this point, or sees it free after.
                        drop(permit.take());
                    }
                }
            }
            tracing::debug!("coalescing worker stopped");
        })?;

        Ok(Self {
            slot,
            pending,
            jobs: Some(jobs),
            worker: Some(worker),
            counters,
        })
    }

    /// Non-blocking: starts `state` now or parks it as the pending request, replacing
    /// any earlier pending one.
    pub fn request(&self, state: S) -> Result<RequestOutcome> {
        self.counters.requested.fetch_add(1, Ordering::Relaxed);
        let mut pending = lock(&self.pending);
        match self.slot.try_acquire() {
            Some(permit) => {
                drop(pending);
                let jobs = self.jobs.as_ref().ok_or(FxError::WorkerStopped { worker: "interactive" })?;
                jobs.send((state, permit))
                    .map_err(|_| FxError::WorkerStopped { worker: "interactive" })?;
                Ok(RequestOutcome::Started)
            }
            None => {
                if pending.replace(state).is_some() {
                    self.counters.superseded.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!("pending render superseded");
                }
                Ok(RequestOutcome::Pending)
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        self.slot.is_busy()
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            requested: self.counters.requested.load(Ordering::Relaxed),
            rendered: self.counters.rendered.load(Ordering::Relaxed),
            superseded: self.counters.superseded.load(Ordering::Relaxed),
        }
    }

    /// Lets the in-flight render and any pending request finish, then joins the worker.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Coalescing worker panicked");
            }
        }
    }
}

impl<S: Send + 'static> Drop for CoalescingScheduler<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn five_requests_during_a_render_coalesce_into_one() {
        let (tx, rx) = mpsc::channel();
        let scheduler = CoalescingScheduler::spawn("test-coalesce", move |state: u32| {
            thread::sleep(Duration::from_millis(100));
            let _ = tx.send(state);
        })
        .unwrap();

        assert_eq!(scheduler.request(0).unwrap(), RequestOutcome::Started);
        for state in 1..=5 {
            thread::sleep(Duration::from_millis(10));
            assert_eq!(scheduler.request(state).unwrap(), RequestOutcome::Pending);
        }

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 0);
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 5);
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());

        let stats = scheduler.stats();
        assert_eq!((stats.requested, stats.rendered, stats.superseded), (6, 2, 4));
        assert!(!scheduler.is_busy());
    }

    #[test]
    fn idle_scheduler_starts_immediately() {
        let (tx, rx) = mpsc::channel();
        let scheduler = CoalescingScheduler::spawn("test-idle", move |state: &'static str| {
            let _ = tx.send(state);
        })
        .unwrap();
        scheduler.request("a").unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), "a");
        // Wait for the slot to come back before the next request
        while scheduler.is_busy() {
            thread::yield_now();
        }
        assert_eq!(scheduler.request("b").unwrap(), RequestOutcome::Started);
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), "b");
        scheduler.shutdown();
    }

    #[test]
    fn never_renders_concurrently() {
        use std::sync::atomic::AtomicUsize;
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (a, p) = (Arc::clone(&active), Arc::clone(&peak));
        let scheduler = CoalescingScheduler::spawn("test-serial", move |_: u32| {
            let now = a.fetch_add(1, Ordering::SeqCst) + 1;
            p.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(2));
            a.fetch_sub(1, Ordering::SeqCst);
        })
        .unwrap();

        let scheduler = Arc::new(scheduler);
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let s = Arc::clone(&scheduler);
                thread::spawn(move || {
                    for i in 0..50 {
                        s.request(t * 100 + i).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        while scheduler.is_busy() {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        let stats = scheduler.stats();
        assert_eq!(stats.requested, 200);
        assert!(stats.rendered >= 1);
    }
}
