//! Composition root. Builds every long-lived service once and hands out sessions,
//! live previews and exporters that share them.

use std::sync::Arc;

use crate::context::GpuContext;
use crate::edit_state::EditState;
use crate::errors::Result;
use crate::export::Exporter;
use crate::frame::Frame;
use crate::graph::{FilterGraph, OverlayStore};
use crate::live::{LivePreview, PreviewFrame};
use crate::lut::authoring::{FeaturedLook, FEATURED_CUBE_SIZE};
use crate::lut::LutEngine;
use crate::presets::PresetCatalog;
use crate::proxy::SourceImage;
use crate::session::EditingSession;
use crate::settings::EngineSettings;

pub struct Engine {
    settings: EngineSettings,
    presets: Arc<PresetCatalog>,
    graph: Arc<FilterGraph>,
    context: GpuContext,
}

impl Engine {
    /// Opens a GPU device when the settings allow one.
    pub fn new(settings: EngineSettings) -> Self {
        Self::with_catalog(settings, PresetCatalog::builtin(), GpuContext::new)
    }

    pub fn cpu_only(settings: EngineSettings) -> Self {
        Self::with_catalog(settings, PresetCatalog::builtin(), GpuContext::cpu_only)
    }

    pub fn with_catalog<F>(settings: EngineSettings, catalog: PresetCatalog, open_context: F) -> Self
    where
        F: FnOnce(&EngineSettings, Arc<LutEngine>) -> GpuContext,
    {
        let luts = Arc::new(LutEngine::new(settings.lut_directory.clone(), settings.lut_cache_capacity));
        if settings.lut_directory.is_none() {
            // Without a LUT folder the featured looks are generated in memory
            for look in FeaturedLook::all() {
                luts.register_bundled(&look.file_name(), look.build(FEATURED_CUBE_SIZE).to_cube_string());
            }
        }

        let presets = Arc::new(catalog);
        let overlays = Arc::new(OverlayStore::new(settings.overlay_directory.clone()));
        let graph = Arc::new(
            FilterGraph::new(Arc::clone(&luts), Arc::clone(&presets), overlays)
                .with_letterbox_aspect(settings.letterbox_aspect),
        );
        let context = open_context(&settings, luts);

        log::info!(
            "Engine ready: {} presets, kernels on {}",
            presets.all().len(),
            context.adapter_name().unwrap_or("cpu")
        );
        Self { settings, presets, graph, context }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn presets(&self) -> &PresetCatalog {
        &self.presets
    }

    pub fn graph(&self) -> &Arc<FilterGraph> {
        &self.graph
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    pub fn open_session(&self, source: SourceImage) -> Result<EditingSession> {
        EditingSession::new(Arc::clone(&self.graph), &self.context, source, self.settings.proxy_max_dimension)
    }

    pub fn live_preview<F>(&self, state: EditState, publish: F) -> Result<LivePreview>
    where
        F: FnMut(PreviewFrame) + Send + 'static,
    {
        LivePreview::start(Arc::clone(&self.graph), &self.context, state, publish)
    }

    pub fn exporter(&self) -> Result<Exporter> {
        Exporter::spawn(Arc::clone(&self.graph), &self.context, &self.settings)
    }

    /// One-off full-chain render on the calling thread.
    pub fn render(&self, source: &Frame, state: &EditState) -> Frame {
        let mut kernels = self.context.kernel_service();
        self.graph.apply_edits(source, &state.clamped(), &mut kernels)
    }

    pub fn clear_caches(&self) {
        self.context.clear_caches();
        self.graph.overlays().clear();
    }

    pub fn teardown(mut self) {
        self.graph.overlays().clear();
        self.context.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn featured_looks_resolve_without_a_lut_folder() {
        let engine = Engine::cpu_only(EngineSettings::default());
        let source = Frame::solid(8, 8, [0.5, 0.5, 0.5, 1.0]);
        let state = EditState { preset_id: Some("ft_mood".into()), ..Default::default() };
        let graded = engine.render(&source, &state);
        assert!(graded.max_abs_diff(&source) > 1e-3);
        assert!(engine.context().luts().cache_stats().entries >= 1);
    }

    #[test]
    fn render_clamps_out_of_range_state() {
        let engine = Engine::cpu_only(EngineSettings::default());
        let source = Frame::solid(4, 4, [0.5, 0.5, 0.5, 1.0]);
        let state = EditState { brightness: 5.0, ..Default::default() };
        let out = engine.render(&source, &state);
        assert_eq!(out.get(0, 0)[0], 1.0);
        assert!(!engine.context().has_device());
        engine.teardown();
    }
}
