use std::sync::Arc;

use image::imageops::FilterType;

use super::{plan, prefix_key, OverlayStore, PresetStage, Stage, StageKind};
use crate::context::RenderContext;
use crate::edit_state::{EditState, SpatialEffect};
use crate::errors::{FxError, Result};
use crate::frame::{Frame, Rect};
use crate::kernels::{BloomParams, ComputeKernelService, GrainParams, KernelParams, LightLeakParams};
use crate::lut::LutEngine;
use crate::ops::blend::{dissolve, source_over, with_opacity};
use crate::ops::blur::sharpen;
use crate::ops::effects::{
    procedural_grain, ChromaticAberration, Dust, FilmBurn, Fisheye, Glitch, Halation, Letterbox, SoftDiffusion,
    Solarize, Threshold, Vignette,
};
use crate::ops::{color, geometry};
use crate::presets::{BatchedParams, PresetCatalog};
use crate::profiler::RenderTrace;
use crate::proxy::SourceImage;

/// Output of one render together with its trace.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub frame: Frame,
    pub trace: RenderTrace,
    /// The rotation/crop/preset prefix came from the render context's cache
    pub prefix_cached: bool,
}

/// Evaluates edit states against a source. Holds only shared, read-only collaborators;
/// the kernel service is passed in by the worker that owns it.
pub struct FilterGraph {
    luts: Arc<LutEngine>,
    presets: Arc<PresetCatalog>,
    overlays: Arc<OverlayStore>,
    letterbox_aspect: f32,
    grain_seed: Option<f32>,
}

impl FilterGraph {
    pub fn new(luts: Arc<LutEngine>, presets: Arc<PresetCatalog>, overlays: Arc<OverlayStore>) -> Self {
        Self {
            luts,
            presets,
            overlays,
            letterbox_aspect: 2.39,
            grain_seed: None,
        }
    }

    pub fn with_letterbox_aspect(mut self, aspect: f32) -> Self {
        self.letterbox_aspect = aspect;
        self
    }

    /// Fixes the grain seed. By default every render draws a fresh one.
    pub fn with_grain_seed(mut self, seed: f32) -> Self {
        self.grain_seed = Some(seed);
        self
    }

    pub fn presets(&self) -> &PresetCatalog {
        &self.presets
    }

    pub fn luts(&self) -> &Arc<LutEngine> {
        &self.luts
    }

    pub fn overlays(&self) -> &Arc<OverlayStore> {
        &self.overlays
    }

    pub fn plan(&self, state: &EditState) -> Vec<Stage> {
        plan(state, &self.presets)
    }

    /// `apply_edits(source, state, presets)`: the full chain with no intermediate caching.
    /// Never fails; stages that cannot run pass their input through.
    pub fn apply_edits(&self, source: &Frame, state: &EditState, kernels: &mut ComputeKernelService) -> Frame {
        let stages = self.plan(state);
        let mut trace = RenderTrace::new();
        let prefix = self.run_prefix(source, &stages, &mut trace);
        self.run_rest(prefix, &stages, kernels, &mut trace)
    }

    /// Renders through `context`, reusing a cached prefix when the context caches one.
    pub fn render(
        &self,
        source: &SourceImage,
        state: &EditState,
        kernels: &mut ComputeKernelService,
        context: &RenderContext,
    ) -> Rendered {
        let stages = self.plan(state);
        let mut trace = RenderTrace::new();
        let has_prefix = stages.iter().any(|s| s.kind().is_prefix());

        let (prefix, prefix_cached) = if context.is_caching() && has_prefix {
            let key = prefix_key(source.id(), state);
            match context.cached_prefix(key) {
                Some(frame) => (frame, true),
                None => {
                    let frame = Arc::new(self.run_prefix(source.frame(), &stages, &mut trace));
                    // Degraded prefixes are never cached
                    if trace.degraded().is_empty() {
                        context.store_prefix(key, Arc::clone(&frame));
                    }
                    (frame, false)
                }
            }
        } else {
            (Arc::new(self.run_prefix(source.frame(), &stages, &mut trace)), false)
        };

        let frame = self.run_rest(Arc::unwrap_or_clone(prefix), &stages, kernels, &mut trace);
        tracing::debug!(
            context = context.label(),
            stages = stages.len(),
            prefix_cached,
            elapsed_ms = trace.total().as_millis() as u64,
            "render complete"
        );
        Rendered { frame, trace, prefix_cached }
    }

    fn run_prefix(&self, source: &Frame, stages: &[Stage], trace: &mut RenderTrace) -> Frame {
        let mut frame = source.clone();
        for stage in stages.iter().filter(|s| s.kind().is_prefix()) {
            trace.start_stage(stage.kind());
            frame = match stage {
                Stage::Rotation { degrees } => geometry::rotate(&frame, *degrees),
                Stage::Crop(rect) => geometry::crop(&frame, rect),
                Stage::Preset(preset) => match self.apply_preset(&frame, preset) {
                    Ok(out) => out,
                    Err(e) => {
                        e.log_degraded(StageKind::Preset.name());
                        trace.mark_degraded(StageKind::Preset);
                        frame
                    }
                },
                _ => frame,
            };
            trace.end_stage();
        }
        frame
    }

    fn run_rest(
        &self,
        mut frame: Frame,
        stages: &[Stage],
        kernels: &mut ComputeKernelService,
        trace: &mut RenderTrace,
    ) -> Frame {
        // Everything after the prefix is measured against the processed source
        let reference = frame.extent();

        for stage in stages.iter().filter(|s| !s.kind().is_prefix()) {
            let kind = stage.kind();
            trace.start_stage(kind);
            frame = match self.apply_stage(&frame, stage, reference, kernels) {
                Ok(out) => out,
                Err(e) => {
                    e.log_degraded(kind.name());
                    trace.mark_degraded(kind);
                    frame
                }
            };
            trace.end_stage();
        }

        if frame.extent() != reference {
            trace.start_stage(StageKind::Clamp);
            frame = frame.fitted_to(reference);
            trace.end_stage();
        }
        frame
    }

    fn apply_preset(&self, frame: &Frame, preset: &PresetStage) -> Result<Frame> {
        match preset {
            PresetStage::Lut { file, intensity, .. } => {
                // Resolve here so an unusable cube is reported through the trace
                let lut = self.luts.resolve(file)?;
                Ok(LutEngine::apply_resolved(&lut, frame, *intensity))
            }
            PresetStage::Procedural { preset_id, look, params, intensity } => {
                let looked = look.apply(frame).ok_or_else(|| FxError::KernelUnavailable {
                    kernel: "builtin_look",
                    message: format!("look '{}' of preset '{}' is not supported", look.name(), preset_id),
                })?;
                let filtered = apply_batched(&looked, params);
                Ok(if *intensity < 1.0 { dissolve(frame, &filtered, *intensity) } else { filtered })
            }
            PresetStage::Missing { preset_id } => Err(FxError::AssetNotFound { name: preset_id.clone() }),
        }
    }

    fn apply_stage(
        &self,
        frame: &Frame,
        stage: &Stage,
        reference: Rect,
        kernels: &mut ComputeKernelService,
    ) -> Result<Frame> {
        let out = match stage {
            Stage::ColorControls(controls) => color::color_controls(frame, *controls),
            Stage::Exposure { ev } => color::exposure(frame, *ev),
            Stage::WhiteBalance { temperature, tint } => color::white_balance(frame, *temperature, *tint),
            Stage::Vibrance { amount } => color::vibrance(frame, *amount),
            Stage::Sharpness { amount } => {
                let sigma = (reference.max_dimension() as f32 / 1000.0).clamp(0.8, 3.0);
                sharpen(frame, *amount, sigma)
            }
            Stage::Effect { effect, intensity } => self.apply_effect(frame, *effect, *intensity, reference, kernels)?,
            Stage::Overlay { id, intensity } => {
                let texture = self.overlays.get(id)?;
                let scaled = texture
                    .resized(reference.width, reference.height, FilterType::Triangle)
                    .reanchored()
                    .translated(reference.x, reference.y);
                source_over(frame, &with_opacity(&scaled, *intensity))
            }
            Stage::Rotation { .. } | Stage::Crop(_) | Stage::Preset(_) => frame.clone(),
        };
        Ok(out)
    }

    fn apply_effect(
        &self,
        frame: &Frame,
        effect: SpatialEffect,
        intensity: f32,
        reference: Rect,
        kernels: &mut ComputeKernelService,
    ) -> Result<Frame> {
        let out = match effect {
            SpatialEffect::Vignette => Vignette::new(intensity).apply(frame),
            SpatialEffect::Bloom => {
                kernels.apply_kernel(&KernelParams::Bloom(BloomParams::for_extent(intensity, reference)), frame)?
            }
            SpatialEffect::Solarize => Solarize::new(intensity).apply(frame),
            SpatialEffect::LightLeak => {
                kernels.apply_kernel(&KernelParams::LightLeak(LightLeakParams::new(intensity)), frame)?
            }
            SpatialEffect::Glitch => Glitch::new(intensity, reference).apply(frame),
            SpatialEffect::Fisheye => Fisheye::new(intensity, reference).apply(frame),
            SpatialEffect::Threshold => Threshold::new(intensity).apply(frame),
            SpatialEffect::Grain => {
                let seed = self.grain_seed.unwrap_or_else(|| rand::random::<f32>() * 1000.0);
                let params = GrainParams::for_extent(intensity, reference, seed);
                match kernels.apply_kernel(&KernelParams::Grain(params), frame) {
                    Ok(out) => out,
                    Err(e) => {
                        tracing::debug!(error = %e, "grain kernel unavailable, using procedural noise");
                        procedural_grain(frame, params.amplitude, seed)
                    }
                }
            }
            SpatialEffect::ChromaticAberration => ChromaticAberration::new(intensity, reference).apply(frame),
            SpatialEffect::Halation => Halation::new(intensity, reference).apply(frame),
            SpatialEffect::FilmBurn => FilmBurn::new(intensity).apply(frame),
            SpatialEffect::SoftDiffusion => SoftDiffusion::new(intensity, reference).apply(frame),
            SpatialEffect::Dust => Dust { intensity }.apply(frame, &self.overlays.dust_texture()),
            SpatialEffect::Letterbox => Letterbox { intensity, aspect: self.letterbox_aspect }.apply(frame),
        };
        Ok(out)
    }
}

/// Declared preset parameters, one call per kind.
fn apply_batched(frame: &Frame, params: &BatchedParams) -> Frame {
    let mut out = if params.controls.is_identity() {
        frame.clone()
    } else {
        color::color_controls(frame, params.controls)
    };
    if params.exposure != 0.0 {
        out = color::exposure(&out, params.exposure);
    }
    if params.vibrance != 0.0 {
        out = color::vibrance(&out, params.vibrance);
    }
    if let Some(temperature) = params.temperature {
        out = color::white_balance(&out, temperature, 0.0);
    }
    if params.fade > 0.0 {
        let lift = params.fade;
        out = out.map_pixels(|px| {
            [
                lift + px[0] * (1.0 - lift),
                lift + px[1] * (1.0 - lift),
                lift + px[2] * (1.0 - lift),
                px[3],
            ]
        });
    }
    out
}
