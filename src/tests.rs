//! End-to-end properties of the effects pipeline.

use std::sync::Arc;

use crate::context::RenderContext;
use crate::edit_state::{CropRect, EditState, SpatialEffect};
use crate::frame::{Frame, Rect};
use crate::graph::{FilterGraph, OverlayStore, StageKind};
use crate::kernels::{ComputeKernelService, KernelParams, LightLeakParams};
use crate::lut::authoring::CubeBuilder;
use crate::lut::LutEngine;
use crate::presets::PresetCatalog;
use crate::proxy::SourceImage;

fn graph_with(luts: LutEngine) -> FilterGraph {
    FilterGraph::new(Arc::new(luts), Arc::new(PresetCatalog::builtin()), Arc::new(OverlayStore::new(None)))
        .with_grain_seed(11.0)
}

fn graph() -> FilterGraph {
    graph_with(LutEngine::new(None, 4))
}

/// A smooth color ramp; every channel stays inside (0, 1).
fn ramp(width: u32, height: u32) -> Frame {
    Frame::generate(Rect::new(0, 0, width, height), |x, y| {
        let u = x / width as f32;
        let v = y / height as f32;
        [0.1 + 0.8 * u, 0.1 + 0.8 * v, 0.5 - 0.3 * u * v, 1.0]
    })
}

#[test]
fn default_state_is_exact_identity() {
    let source = ramp(37, 23);
    let out = graph().apply_edits(&source, &EditState::default(), &mut ComputeKernelService::cpu());
    assert_eq!(out.extent(), source.extent());
    assert_eq!(out.pixels().as_raw(), source.pixels().as_raw());
}

#[test]
fn identity_cube_leaves_image_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    CubeBuilder::identity(2).write(&dir.path().join("identity.cube")).unwrap();
    let luts = LutEngine::new(Some(dir.path().to_path_buf()), 4);

    let source = ramp(16, 16);
    let out = luts.apply_lut("identity.cube", &source, 1.0);
    assert!(out.max_abs_diff(&source) < 1e-5);
}

#[test]
fn preset_intensity_sweeps_monotonically() {
    let graph = graph();
    let source = ramp(24, 24);
    let mut kernels = ComputeKernelService::cpu();
    let render = |intensity: f32, kernels: &mut ComputeKernelService| {
        let state = EditState { preset_id: Some("noir".into()), preset_intensity: intensity, ..Default::default() };
        graph.apply_edits(&source, &state, kernels)
    };

    let at_zero = render(0.0, &mut kernels);
    assert_eq!(at_zero.pixels().as_raw(), source.pixels().as_raw());

    let lumas: Vec<f32> = (0..=10).map(|i| render(i as f32 / 10.0, &mut kernels).mean_luma()).collect();
    let increasing = lumas.windows(2).all(|w| w[1] >= w[0] - 1e-6);
    let decreasing = lumas.windows(2).all(|w| w[1] <= w[0] + 1e-6);
    assert!(increasing || decreasing, "not monotonic: {:?}", lumas);

    let step = (lumas[10] - lumas[0]).abs() / 10.0;
    assert!(lumas.windows(2).all(|w| (w[1] - w[0]).abs() <= step * 1.5 + 1e-6), "not continuous: {:?}", lumas);
}

#[test]
fn grain_variance_grows_with_intensity() {
    let graph = graph();
    let source = Frame::solid(256, 256, [0.5, 0.5, 0.5, 1.0]);
    let mut kernels = ComputeKernelService::cpu();

    let variances: Vec<f64> = [0.0f32, 0.25, 0.5, 1.0]
        .iter()
        .map(|&intensity| {
            let mut state = EditState::default();
            state.effects.set(SpatialEffect::Grain, intensity);
            graph.apply_edits(&source, &state, &mut kernels).color_variance()
        })
        .collect();

    assert_eq!(variances[0], 0.0);
    assert!(variances.windows(2).all(|w| w[1] > w[0]), "{:?}", variances);
}

#[test]
fn every_effect_keeps_a_finite_extent() {
    let graph = graph();
    let source = ramp(48, 32);
    let mut kernels = ComputeKernelService::cpu();

    let mut everything = EditState::default();
    for effect in SpatialEffect::ALL {
        let mut single = EditState::default();
        single.effects.set(effect, 1.0);
        let out = graph.apply_edits(&source, &single, &mut kernels);
        assert_eq!(out.extent(), source.extent(), "{}", effect.name());
        assert!(out.is_finite(), "{}", effect.name());
        everything.effects.set(effect, 1.0);
    }

    let out = graph.apply_edits(&source, &everything, &mut kernels);
    assert_eq!(out.extent(), source.extent());
    assert!(out.is_finite());
}

#[test]
fn geometry_sets_the_reference_extent() {
    let graph = graph();
    let source = ramp(60, 40);
    let state = EditState {
        crop: Some(CropRect::new(0.25, 0.25, 0.5, 0.5)),
        effects: {
            let mut e = crate::edit_state::EffectIntensities::default();
            e.set(SpatialEffect::Bloom, 1.0);
            e.set(SpatialEffect::Glitch, 1.0);
            e
        },
        ..Default::default()
    };
    let out = graph.apply_edits(&source, &state, &mut ComputeKernelService::cpu());
    assert_eq!((out.width(), out.height()), (30, 20));
    assert_eq!(out.origin(), (0, 0));
}

#[test]
fn brightness_and_contrast_scenario() {
    let gray = 128.0 / 255.0;
    let source = Frame::solid(4, 4, [gray, gray, gray, 1.0]);
    let state = EditState { brightness: 0.2, contrast: 1.1, saturation: 1.0, ..Default::default() };
    let out = graph().apply_edits(&source, &state, &mut ComputeKernelService::cpu());

    let px = out.to_rgba8().get_pixel(1, 1).0;
    for c in &px[..3] {
        assert!((*c as i32 - 179).abs() <= 1, "got {}", c);
    }
    assert_eq!(px[3], 255);
}

#[test]
fn malformed_cube_passes_input_through() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("ft_vintage.cube"),
        "LUT_3D_SIZE 2\n0 0 0\n1 0 0\n0 1 0\n",
    )
    .unwrap();
    let luts = LutEngine::new(Some(dir.path().to_path_buf()), 4);
    let source = ramp(8, 8);

    let out = luts.apply_lut("ft_vintage.cube", &source, 1.0);
    assert_eq!(out.pixels().as_raw(), source.pixels().as_raw());
    assert_eq!(luts.cache_stats().entries, 0);

    // Through the graph the preset stage is reported as degraded
    let graph = graph_with(luts);
    let state = EditState { preset_id: Some("ft_vintage".into()), ..Default::default() };
    let rendered = graph.render(
        &SourceImage::new(source.clone()),
        &state,
        &mut ComputeKernelService::cpu(),
        &RenderContext::live(),
    );
    assert_eq!(rendered.trace.degraded(), &[StageKind::Preset]);
    assert_eq!(rendered.frame.pixels().as_raw(), source.pixels().as_raw());
}

#[test]
fn cached_prefix_matches_uncached_render() {
    let graph = graph();
    let source = SourceImage::new(ramp(40, 30));
    let context = RenderContext::interactive(4);
    let mut kernels = ComputeKernelService::cpu();
    let mut state = EditState {
        rotation_degrees: 90.0,
        crop: Some(CropRect::new(0.1, 0.1, 0.8, 0.7)),
        preset_id: Some("noir".into()),
        preset_intensity: 0.7,
        brightness: 0.05,
        contrast: 1.2,
        vibrance: 0.3,
        ..Default::default()
    };
    state.effects.set(SpatialEffect::Vignette, 0.4);
    state.effects.set(SpatialEffect::Bloom, 0.5);

    let first = graph.render(&source, &state, &mut kernels, &context);
    let second = graph.render(&source, &state, &mut kernels, &context);
    let uncached = graph.apply_edits(source.frame(), &state, &mut kernels);
    assert!(!first.prefix_cached);
    assert!(second.prefix_cached);
    assert_eq!(first.frame.pixels().as_raw(), uncached.pixels().as_raw());
    assert_eq!(second.frame.pixels().as_raw(), uncached.pixels().as_raw());

    // Slider changes keep the prefix
    state.brightness = -0.1;
    state.effects.set(SpatialEffect::Vignette, 0.8);
    let third = graph.render(&source, &state, &mut kernels, &context);
    assert!(third.prefix_cached);
    let uncached = graph.apply_edits(source.frame(), &state, &mut kernels);
    assert_eq!(third.frame.pixels().as_raw(), uncached.pixels().as_raw());
}

#[test]
fn degraded_prefix_is_not_cached() {
    let dir = tempfile::tempdir().unwrap();
    let cube = dir.path().join("ft_vintage.cube");
    std::fs::write(&cube, "LUT_3D_SIZE 2\n0 0 0\n1 0 0\n0 1 0\n").unwrap();
    let graph = graph_with(LutEngine::new(Some(dir.path().to_path_buf()), 4));
    let source = SourceImage::new(ramp(8, 8));
    let context = RenderContext::interactive(4);
    let mut kernels = ComputeKernelService::cpu();
    let state = EditState { preset_id: Some("ft_vintage".into()), ..Default::default() };

    let broken = graph.render(&source, &state, &mut kernels, &context);
    assert_eq!(broken.trace.degraded(), &[StageKind::Preset]);
    assert_eq!(context.stats().entries, 0);

    CubeBuilder::identity(3).exposure(0.5).write(&cube).unwrap();
    let repaired = graph.render(&source, &state, &mut kernels, &context);
    assert!(!repaired.prefix_cached);
    assert!(repaired.trace.degraded().is_empty());
    assert!(repaired.frame.mean_luma() > source.frame().mean_luma() + 0.01);

    let again = graph.render(&source, &state, &mut kernels, &context);
    assert!(again.prefix_cached);
    assert_eq!(again.frame, repaired.frame);
}

#[test]
fn kernels_agree_across_backends() {
    let Ok(gpu) = pollster::block_on(crate::context::GpuDevice::request()) else {
        eprintln!("no GPU adapter; skipping");
        return;
    };
    let Ok(backend) = crate::kernels::gpu::WgpuBackend::new(gpu.device, gpu.queue) else {
        eprintln!("compute pipelines unavailable; skipping");
        return;
    };
    let mut gpu_kernels = ComputeKernelService::new(Box::new(backend));
    let mut cpu_kernels = ComputeKernelService::cpu();

    let source = ramp(64, 48);
    let params = KernelParams::LightLeak(LightLeakParams::new(0.8));
    let on_gpu = gpu_kernels.apply_kernel(&params, &source).unwrap();
    let on_cpu = cpu_kernels.apply_kernel(&params, &source).unwrap();
    assert_eq!(on_gpu.extent(), on_cpu.extent());
    assert!(on_gpu.max_abs_diff(&on_cpu) < 1e-3);
}
