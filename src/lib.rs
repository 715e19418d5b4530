//! Lume FX: a non-destructive photo effects engine. An [`EditState`] is turned into a fixed
//! filter chain that runs on a bounded proxy for interactive edits, on camera frames for
//! live preview, and on the full-resolution source for export.

pub mod context;
pub mod edit_state;
pub mod engine;
pub mod errors;
pub mod export;
pub mod frame;
pub mod graph;
pub mod kernels;
pub mod live;
pub mod logging;
pub mod lut;
pub mod ops;
pub mod presets;
pub mod profiler;
pub mod proxy;
pub mod scheduler;
pub mod session;
pub mod settings;

#[cfg(test)]
mod tests;

pub use context::{GpuContext, RenderContext};
pub use edit_state::{CropRect, EditState, SpatialEffect};
pub use engine::Engine;
pub use errors::{FxError, Result};
pub use export::{ExportOutcome, ExportRequest, Exporter};
pub use frame::{Frame, Rect};
pub use graph::FilterGraph;
pub use kernels::ComputeKernelService;
pub use live::{LivePreview, PreviewFrame};
pub use lut::LutEngine;
pub use presets::PresetCatalog;
pub use proxy::{make_proxy, SourceImage};
pub use session::{EditingSession, RenderedFrame};
pub use settings::EngineSettings;
