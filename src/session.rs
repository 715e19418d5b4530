//! Interactive editing: one owner of the edit state, a proxy of the loaded source, and a
//! coalescing scheduler in front of the interactive render context.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::context::GpuContext;
use crate::edit_state::EditState;
use crate::errors::Result;
use crate::export::ExportRequest;
use crate::frame::Frame;
use crate::graph::FilterGraph;
use crate::profiler::{Profiler, ProfilerStats, RenderTrace};
use crate::proxy::{make_proxy, SourceImage};
use crate::scheduler::{CoalescingScheduler, RequestOutcome, SchedulerStats};

/// A published interactive render. Generations increase with every request, so a
/// consumer can always tell which edit a frame reflects.
#[derive(Debug, Clone)]
pub struct RenderedFrame {
    pub generation: u64,
    pub frame: Frame,
    pub trace: RenderTrace,
}

struct RenderJob {
    generation: u64,
    proxy: SourceImage,
    state: EditState,
}

pub struct EditingSession {
    source: SourceImage,
    proxy: SourceImage,
    proxy_max_dimension: u32,
    state: EditState,
    generation: u64,
    scheduler: CoalescingScheduler<RenderJob>,
    results: Receiver<RenderedFrame>,
    profiler: Arc<Mutex<Profiler>>,
}

impl EditingSession {
    /// Materializes the proxy and starts the interactive worker, which owns its own
    /// kernel service.
    pub fn new(
        graph: Arc<FilterGraph>,
        context: &GpuContext,
        source: SourceImage,
        proxy_max_dimension: u32,
    ) -> Result<Self> {
        let proxy = make_proxy(&source, proxy_max_dimension);
        let render_context = Arc::clone(context.interactive());
        let mut kernels = context.kernel_service();
        let (tx, results) = mpsc::channel();
        let profiler = Arc::new(Mutex::new(Profiler::new()));
        let worker_profiler = Arc::clone(&profiler);

        let scheduler = CoalescingScheduler::spawn("lume-interactive", move |job: RenderJob| {
            let rendered = graph.render(&job.proxy, &job.state, &mut kernels, &render_context);
            if let Ok(mut profiler) = worker_profiler.lock() {
                profiler.record(&rendered.trace);
                if rendered.prefix_cached {
                    profiler.increment_counter("prefix_cache_hits");
                }
            }
            let _ = tx.send(RenderedFrame {
                generation: job.generation,
                frame: rendered.frame,
                trace: rendered.trace,
            });
        })?;

        log::info!(
            "Editing session opened: {}x{} source, {}x{} proxy",
            source.width(),
            source.height(),
            proxy.width(),
            proxy.height()
        );
        Ok(Self {
            source,
            proxy,
            proxy_max_dimension,
            state: EditState::default(),
            generation: 0,
            scheduler,
            results,
            profiler,
        })
    }

    pub fn source(&self) -> &SourceImage {
        &self.source
    }

    pub fn proxy(&self) -> &SourceImage {
        &self.proxy
    }

    pub fn state(&self) -> &EditState {
        &self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Replaces the edit state and schedules a render of it. Out-of-range values are
    /// clamped. Returns without waiting for the render.
    pub fn update(&mut self, state: EditState) -> Result<RequestOutcome> {
        if let Err(e) = state.validate() {
            tracing::debug!(error = %e, "clamping edit state");
        }
        self.state = state.clamped();
        self.schedule()
    }

    /// Applies `change` to the current state and schedules a render.
    pub fn modify<F>(&mut self, change: F) -> Result<RequestOutcome>
    where
        F: FnOnce(&mut EditState),
    {
        let mut state = self.state.clone();
        change(&mut state);
        self.update(state)
    }

    /// Swaps in a newly loaded source: fresh proxy, default state, first render scheduled.
    pub fn load_source(&mut self, source: SourceImage) -> Result<RequestOutcome> {
        self.proxy = make_proxy(&source, self.proxy_max_dimension);
        self.source = source;
        self.state = EditState::default();
        self.schedule()
    }

    fn schedule(&mut self) -> Result<RequestOutcome> {
        self.generation += 1;
        self.scheduler.request(RenderJob {
            generation: self.generation,
            proxy: self.proxy.clone(),
            state: self.state.clone(),
        })
    }

    /// Newest published frame, discarding older ones. Never blocks.
    pub fn try_latest(&self) -> Option<RenderedFrame> {
        self.results.try_iter().last()
    }

    /// Blocks until a frame for `generation` or later arrives.
    pub fn wait_for(&self, generation: u64, timeout: Duration) -> Option<RenderedFrame> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.results.recv_timeout(remaining) {
                Ok(frame) if frame.generation >= generation => return Some(frame),
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    /// Blocks until the current state has been rendered.
    pub fn wait_current(&self, timeout: Duration) -> Option<RenderedFrame> {
        self.wait_for(self.generation, timeout)
    }

    pub fn scheduler_stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    /// Per-stage timings accumulated over every interactive render so far.
    pub fn profile(&self) -> ProfilerStats {
        self.profiler.lock().map(|p| p.get_stats()).unwrap_or_else(|p| p.into_inner().get_stats())
    }

    /// Full-resolution export of the current state, for the export worker.
    pub fn export_request(&self, path: impl Into<std::path::PathBuf>) -> ExportRequest {
        ExportRequest::new(self.source.clone(), self.state.clone(), path)
    }
}
