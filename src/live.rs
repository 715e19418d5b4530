//! Live preview: camera-style frame streams rendered through the non-caching live context.
//! Frames that arrive while one is rendering are dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::context::GpuContext;
use crate::edit_state::EditState;
use crate::errors::Result;
use crate::frame::Frame;
use crate::graph::FilterGraph;
use crate::proxy::SourceImage;
use crate::scheduler::{Admission, FrameDropScheduler, FrameDropStats};

#[derive(Debug, Clone)]
pub struct PreviewFrame {
    /// Position of the input frame in the offered stream
    pub sequence: u64,
    pub frame: Frame,
}

struct LiveJob {
    sequence: u64,
    frame: Frame,
}

pub struct LivePreview {
    scheduler: FrameDropScheduler<LiveJob>,
    state: Arc<RwLock<EditState>>,
    next_sequence: AtomicU64,
}

impl LivePreview {
    /// Starts the live worker. `publish` runs on the worker for every rendered frame.
    pub fn start<F>(graph: Arc<FilterGraph>, context: &GpuContext, state: EditState, mut publish: F) -> Result<Self>
    where
        F: FnMut(PreviewFrame) + Send + 'static,
    {
        let state = Arc::new(RwLock::new(state.clamped()));
        let worker_state = Arc::clone(&state);
        let render_context = Arc::clone(context.live());
        let mut kernels = context.kernel_service();

        let scheduler = FrameDropScheduler::spawn("lume-live", move |job: LiveJob| {
            let state = worker_state.read().map(|s| s.clone()).unwrap_or_else(|p| p.into_inner().clone());
            let source = SourceImage::new(job.frame);
            let rendered = graph.render(&source, &state, &mut kernels, &render_context);
            publish(PreviewFrame { sequence: job.sequence, frame: rendered.frame });
        })?;

        Ok(Self {
            scheduler,
            state,
            next_sequence: AtomicU64::new(0),
        })
    }

    /// Edits apply from the next admitted frame on.
    pub fn set_state(&self, state: EditState) {
        let state = state.clamped();
        match self.state.write() {
            Ok(mut guard) => *guard = state,
            Err(poisoned) => *poisoned.into_inner() = state,
        }
    }

    /// Non-blocking: renders `frame` if the worker is idle, drops it otherwise.
    pub fn offer(&self, frame: Frame) -> Result<Admission> {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let admission = self.scheduler.offer(LiveJob { sequence, frame })?;
        if admission == Admission::Dropped {
            tracing::trace!(sequence, "live frame dropped");
        }
        Ok(admission)
    }

    pub fn is_busy(&self) -> bool {
        self.scheduler.is_busy()
    }

    pub fn stats(&self) -> FrameDropStats {
        self.scheduler.stats()
    }

    pub fn stop(self) {
        let stats = self.scheduler.stats();
        log::info!(
            "Live preview stopped: {} offered, {} rendered, {} dropped",
            stats.offered,
            stats.processed,
            stats.dropped
        );
        self.scheduler.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::OverlayStore;
    use crate::lut::LutEngine;
    use crate::presets::PresetCatalog;
    use crate::settings::EngineSettings;
    use std::sync::mpsc;
    use std::time::Duration;

    fn graph_and_context() -> (Arc<FilterGraph>, GpuContext) {
        let luts = Arc::new(LutEngine::new(None, 4));
        let context = GpuContext::cpu_only(&EngineSettings::default(), Arc::clone(&luts));
        let graph = Arc::new(FilterGraph::new(
            luts,
            Arc::new(PresetCatalog::builtin()),
            Arc::new(OverlayStore::new(None)),
        ));
        (graph, context)
    }

    #[test]
    fn renders_offered_frames_with_current_state() {
        let (graph, context) = graph_and_context();
        let (tx, rx) = mpsc::channel();
        let preview = LivePreview::start(graph, &context, EditState::default(), move |f| {
            let _ = tx.send(f);
        })
        .unwrap();

        preview.set_state(EditState { brightness: -0.25, ..Default::default() });
        assert_eq!(preview.offer(Frame::solid(8, 8, [0.5, 0.5, 0.5, 1.0])).unwrap(), Admission::Accepted);
        let out = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(out.sequence, 0);
        assert!((out.frame.get(3, 3)[0] - 0.25).abs() < 1e-5);
        assert!(context.live().stats().entries == 0);
        preview.stop();
    }

    #[test]
    fn busy_worker_drops_frames() {
        let (graph, context) = graph_and_context();
        let (tx, rx) = mpsc::channel::<PreviewFrame>();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let preview = LivePreview::start(graph, &context, EditState::default(), move |f| {
            let _ = release_rx.recv_timeout(Duration::from_secs(5));
            let _ = tx.send(f);
        })
        .unwrap();

        assert_eq!(preview.offer(Frame::solid(4, 4, [0.1; 4])).unwrap(), Admission::Accepted);
        for _ in 0..3 {
            assert_eq!(preview.offer(Frame::solid(4, 4, [0.1; 4])).unwrap(), Admission::Dropped);
        }
        release_tx.send(()).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap().sequence, 0);

        let stats = preview.stats();
        assert_eq!((stats.offered, stats.accepted, stats.dropped), (4, 1, 3));
        preview.stop();
    }
}
