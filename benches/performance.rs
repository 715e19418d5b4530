use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lume_fx::graph::OverlayStore;
use lume_fx::kernels::{BloomParams, ComputeKernelService, GrainParams, KernelParams};
use lume_fx::lut::authoring::FeaturedLook;
use lume_fx::{make_proxy, EditState, FilterGraph, Frame, LutEngine, PresetCatalog, Rect, SourceImage, SpatialEffect};

fn test_frame(width: u32, height: u32) -> Frame {
    Frame::generate(Rect::new(0, 0, width, height), |x, y| {
        [x / width as f32, y / height as f32, 0.5, 1.0]
    })
}

fn bench_apply_edits(c: &mut Criterion) {
    let luts = Arc::new(LutEngine::new(None, 4));
    let mood = FeaturedLook::Mood;
    luts.register_bundled(&mood.file_name(), mood.build(33).to_cube_string());
    let graph = FilterGraph::new(luts, Arc::new(PresetCatalog::builtin()), Arc::new(OverlayStore::new(None)))
        .with_grain_seed(1.0);
    let source = test_frame(1200, 800);
    let mut state = EditState {
        preset_id: Some("ft_mood".into()),
        brightness: 0.05,
        contrast: 1.1,
        vibrance: 0.2,
        ..Default::default()
    };
    state.effects.set(SpatialEffect::Vignette, 0.5);
    state.effects.set(SpatialEffect::Grain, 0.3);
    let mut kernels = ComputeKernelService::cpu();

    c.bench_function("apply_edits_proxy_1200x800", |b| {
        b.iter(|| black_box(graph.apply_edits(&source, &state, &mut kernels)))
    });
}

fn bench_lut(c: &mut Criterion) {
    let luts = LutEngine::new(None, 4);
    let vintage = FeaturedLook::Vintage;
    luts.register_bundled(&vintage.file_name(), vintage.build(33).to_cube_string());
    let frame = test_frame(1000, 1000);

    c.bench_function("apply_lut_1000x1000", |b| {
        b.iter(|| black_box(luts.apply_lut(&vintage.file_name(), &frame, 0.8)))
    });
}

fn bench_kernels(c: &mut Criterion) {
    let frame = test_frame(1200, 800);
    let mut kernels = ComputeKernelService::cpu();
    let grain = KernelParams::Grain(GrainParams::for_extent(0.5, frame.extent(), 3.0));
    let bloom = KernelParams::Bloom(BloomParams::for_extent(0.6, frame.extent()));

    c.bench_function("cpu_grain_1200x800", |b| {
        b.iter(|| black_box(kernels.apply_kernel(&grain, &frame)))
    });
    c.bench_function("cpu_bloom_1200x800", |b| {
        b.iter(|| black_box(kernels.apply_kernel(&bloom, &frame)))
    });
}

fn bench_proxy(c: &mut Criterion) {
    let source = SourceImage::new(test_frame(4000, 3000));

    c.bench_function("make_proxy_4000x3000", |b| {
        b.iter(|| black_box(make_proxy(&source, 1200)))
    });
}

criterion_group!(benches, bench_apply_edits, bench_lut, bench_kernels, bench_proxy);
criterion_main!(benches);
