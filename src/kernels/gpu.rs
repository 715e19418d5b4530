use std::sync::Arc;

use wgpu::util::DeviceExt;

use super::pool::{PoolKey, PoolStats, TexturePool, TexturePurpose};
use super::{BloomParams, GrainParams, KernelBackend, KernelParams, LightLeakParams};
use crate::errors::{FxError, Result};
use crate::frame::Frame;

const WORKGROUP: u32 = 16;
const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;
const BYTES_PER_PIXEL: u32 = 16;

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct GrainUniform {
    width: u32,
    height: u32,
    amplitude: f32,
    grain_size: f32,
    seed: f32,
    _pad: [f32; 3],
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct ThresholdUniform {
    width: u32,
    height: u32,
    threshold: f32,
    knee: f32,
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct BlurUniform {
    width: u32,
    height: u32,
    radius: u32,
    sigma: f32,
    direction: [i32; 2],
    _pad: [u32; 2],
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct CompositeUniform {
    width: u32,
    height: u32,
    intensity: f32,
    _pad: f32,
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct LeakUniform {
    width: u32,
    height: u32,
    center_x: f32,
    center_y: f32,
    radius: f32,
    opacity: f32,
    power: f32,
    _pad: f32,
    color: [f32; 4],
}

struct KernelPipelines {
    single_input: wgpu::BindGroupLayout,
    dual_input: wgpu::BindGroupLayout,
    grain: wgpu::ComputePipeline,
    bloom_threshold: wgpu::ComputePipeline,
    bloom_blur: wgpu::ComputePipeline,
    bloom_composite: wgpu::ComputePipeline,
    light_leak: wgpu::ComputePipeline,
}

/// Compute-shader implementation of the kernels on an `Rgba32Float` texture path.
///
/// Every dispatch is submitted and waited on before `run` returns, so the caller's
/// worker thread sees results in submission order.
pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    pipelines: KernelPipelines,
    textures: TexturePool<wgpu::Texture>,
    readback: TexturePool<wgpu::Buffer>,
}

impl WgpuBackend {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Result<Self> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipelines = create_pipelines(&device);
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(FxError::KernelUnavailable {
                kernel: "all",
                message: err.to_string(),
            });
        }
        log::info!("Compute kernels compiled");
        Ok(Self {
            device,
            queue,
            pipelines,
            textures: TexturePool::new(),
            readback: TexturePool::new(),
        })
    }

    fn texture(&mut self, purpose: TexturePurpose, width: u32, height: u32) -> (PoolKey, wgpu::Texture) {
        let key = PoolKey::new(purpose, width, height);
        let device = &self.device;
        let texture = self.textures.acquire(key, |k| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some("kernel_texture"),
                size: extent3d(k.width, k.height),
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: TEXTURE_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::STORAGE_BINDING
                    | wgpu::TextureUsages::COPY_DST
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            })
        });
        (key, texture)
    }

    fn uniform<T: bytemuck::Pod>(&self, label: &str, value: &T) -> wgpu::Buffer {
        self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::bytes_of(value),
            usage: wgpu::BufferUsages::UNIFORM,
        })
    }

    fn bind_group(
        &self,
        input: &wgpu::Texture,
        output: &wgpu::Texture,
        params: &wgpu::Buffer,
        secondary: Option<&wgpu::Texture>,
    ) -> wgpu::BindGroup {
        let input_view = input.create_view(&wgpu::TextureViewDescriptor::default());
        let output_view = output.create_view(&wgpu::TextureViewDescriptor::default());
        let secondary_view = secondary.map(|t| t.create_view(&wgpu::TextureViewDescriptor::default()));

        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&input_view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&output_view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: params.as_entire_binding(),
            },
        ];
        let layout = match &secondary_view {
            Some(view) => {
                entries.push(wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(view),
                });
                &self.pipelines.dual_input
            }
            None => &self.pipelines.single_input,
        };
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("kernel_bind_group"),
            layout,
            entries: &entries,
        })
    }

    fn dispatch(
        encoder: &mut wgpu::CommandEncoder,
        label: &str,
        pipeline: &wgpu::ComputePipeline,
        bind_group: &wgpu::BindGroup,
        width: u32,
        height: u32,
    ) {
        let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(label),
            timestamp_writes: None,
        });
        cpass.set_pipeline(pipeline);
        cpass.set_bind_group(0, bind_group, &[]);
        cpass.dispatch_workgroups(width.div_ceil(WORKGROUP), height.div_ceil(WORKGROUP), 1);
    }

    fn upload(&mut self, frame: &Frame) -> (PoolKey, wgpu::Texture) {
        let (w, h) = (frame.width(), frame.height());
        let (key, texture) = self.texture(TexturePurpose::Input, w, h);
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(frame.pixels().as_raw().as_slice()),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(w * BYTES_PER_PIXEL),
                rows_per_image: Some(h),
            },
            extent3d(w, h),
        );
        (key, texture)
    }

    fn encode_grain(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        params: &GrainParams,
        input: &wgpu::Texture,
        w: u32,
        h: u32,
    ) -> Vec<(PoolKey, wgpu::Texture)> {
        let (out_key, output) = self.texture(TexturePurpose::GrainOutput, w, h);
        let uniform = self.uniform(
            "grain_params",
            &GrainUniform {
                width: w,
                height: h,
                amplitude: params.amplitude,
                grain_size: params.grain_size,
                seed: params.seed,
                _pad: [0.0; 3],
            },
        );
        let bg = self.bind_group(input, &output, &uniform, None);
        Self::dispatch(encoder, "grain_pass", &self.pipelines.grain, &bg, w, h);
        vec![(out_key, output)]
    }

    fn encode_bloom(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        params: &BloomParams,
        input: &wgpu::Texture,
        w: u32,
        h: u32,
    ) -> Vec<(PoolKey, wgpu::Texture)> {
        let (bright_key, bright) = self.texture(TexturePurpose::BloomBright, w, h);
        let (scratch_key, scratch) = self.texture(TexturePurpose::BloomScratch, w, h);
        let (out_key, output) = self.texture(TexturePurpose::BloomOutput, w, h);

        let threshold = self.uniform(
            "bloom_threshold_params",
            &ThresholdUniform { width: w, height: h, threshold: params.threshold, knee: params.knee },
        );
        let blur = |direction: [i32; 2]| BlurUniform {
            width: w,
            height: h,
            radius: params.radius,
            sigma: params.sigma(),
            direction,
            _pad: [0; 2],
        };
        let horizontal = self.uniform("bloom_blur_h_params", &blur([1, 0]));
        let vertical = self.uniform("bloom_blur_v_params", &blur([0, 1]));
        let composite = self.uniform(
            "bloom_composite_params",
            &CompositeUniform { width: w, height: h, intensity: params.intensity, _pad: 0.0 },
        );

        let bg = self.bind_group(input, &bright, &threshold, None);
        Self::dispatch(encoder, "bloom_threshold_pass", &self.pipelines.bloom_threshold, &bg, w, h);
        let bg = self.bind_group(&bright, &scratch, &horizontal, None);
        Self::dispatch(encoder, "bloom_blur_h_pass", &self.pipelines.bloom_blur, &bg, w, h);
        let bg = self.bind_group(&scratch, &bright, &vertical, None);
        Self::dispatch(encoder, "bloom_blur_v_pass", &self.pipelines.bloom_blur, &bg, w, h);
        let bg = self.bind_group(input, &output, &composite, Some(&bright));
        Self::dispatch(encoder, "bloom_composite_pass", &self.pipelines.bloom_composite, &bg, w, h);

        // Output last; readback takes it from the end
        vec![(bright_key, bright), (scratch_key, scratch), (out_key, output)]
    }

    fn encode_light_leak(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        params: &LightLeakParams,
        input: &wgpu::Texture,
        w: u32,
        h: u32,
    ) -> Vec<(PoolKey, wgpu::Texture)> {
        let (out_key, output) = self.texture(TexturePurpose::LightLeakOutput, w, h);
        let [r, g, b] = params.color;
        let uniform = self.uniform(
            "light_leak_params",
            &LeakUniform {
                width: w,
                height: h,
                center_x: params.center.0,
                center_y: params.center.1,
                radius: params.radius,
                opacity: params.opacity,
                power: params.power,
                _pad: 0.0,
                color: [r, g, b, 1.0],
            },
        );
        let bg = self.bind_group(input, &output, &uniform, None);
        Self::dispatch(encoder, "light_leak_pass", &self.pipelines.light_leak, &bg, w, h);
        vec![(out_key, output)]
    }

    /// Copies `texture` into a pooled staging buffer and waits for the mapped rows.
    fn read_back(&mut self, mut encoder: wgpu::CommandEncoder, texture: &wgpu::Texture, w: u32, h: u32) -> Result<Vec<f32>> {
        let unpadded = w * BYTES_PER_PIXEL;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let key = PoolKey::new(TexturePurpose::Readback, w, h);
        let device = &self.device;
        let staging = self.readback.acquire(key, |k| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("kernel_readback"),
                size: padded as u64 * k.height as u64,
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                mapped_at_creation: false,
            })
        });

        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(h),
                },
            },
            extent3d(w, h),
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        self.device.poll(wgpu::Maintain::Wait);

        let mapped = match pollster::block_on(rx.receive()) {
            Some(Ok(())) => true,
            Some(Err(e)) => {
                log::warn!("Readback map failed: {}", e);
                false
            }
            None => false,
        };
        if !mapped {
            return Err(FxError::Gpu { message: "readback buffer could not be mapped".to_string() });
        }

        let mut pixels = Vec::with_capacity((w * h * 4) as usize);
        {
            let data = slice.get_mapped_range();
            for row in data.chunks(padded as usize).take(h as usize) {
                pixels.extend(
                    row[..unpadded as usize]
                        .chunks_exact(4)
                        .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]])),
                );
            }
        }
        staging.unmap();
        self.readback.release(key, staging);
        Ok(pixels)
    }
}

impl KernelBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn run(&mut self, params: &KernelParams, frame: &Frame) -> Result<Frame> {
        let (w, h) = (frame.width(), frame.height());
        let max_dim = self.device.limits().max_texture_dimension_2d;
        if w > max_dim || h > max_dim {
            return Err(FxError::KernelUnavailable {
                kernel: params.kind().name(),
                message: format!("{}x{} exceeds texture limit {}", w, h, max_dim),
            });
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let (input_key, input) = self.upload(frame);
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("kernel_encoder"),
        });
        let mut textures = match params {
            KernelParams::Grain(p) => self.encode_grain(&mut encoder, p, &input, w, h),
            KernelParams::Bloom(p) => self.encode_bloom(&mut encoder, p, &input, w, h),
            KernelParams::LightLeak(p) => self.encode_light_leak(&mut encoder, p, &input, w, h),
        };

        let result = match textures.last() {
            Some((_, output)) => self.read_back(encoder, output, w, h),
            None => Err(FxError::Gpu { message: "kernel produced no output".to_string() }),
        };
        let scope_error = pollster::block_on(self.device.pop_error_scope());

        textures.push((input_key, input));
        for (key, texture) in textures {
            self.textures.release(key, texture);
        }

        if let Some(err) = scope_error {
            return Err(FxError::Gpu { message: err.to_string() });
        }
        let data = result?;
        let (ox, oy) = frame.origin();
        let pixels = image::ImageBuffer::from_raw(w, h, data)
            .ok_or_else(|| FxError::Gpu { message: "readback size mismatch".to_string() })?;
        Ok(Frame::with_origin(pixels, ox, oy))
    }

    fn pool_stats(&self) -> PoolStats {
        let t = self.textures.stats();
        let r = self.readback.stats();
        PoolStats {
            hits: t.hits + r.hits,
            allocations: t.allocations + r.allocations,
            pooled: t.pooled + r.pooled,
        }
    }

    fn clear_pool(&mut self) {
        self.textures.clear();
        self.readback.clear();
    }
}

fn extent3d(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d { width, height, depth_or_array_layers: 1 }
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn kernel_layout(device: &wgpu::Device, label: &str, dual_input: bool) -> wgpu::BindGroupLayout {
    let mut entries = vec![
        texture_entry(0),
        wgpu::BindGroupLayoutEntry {
            binding: 1,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::StorageTexture {
                access: wgpu::StorageTextureAccess::WriteOnly,
                format: TEXTURE_FORMAT,
                view_dimension: wgpu::TextureViewDimension::D2,
            },
            count: None,
        },
        wgpu::BindGroupLayoutEntry {
            binding: 2,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        },
    ];
    if dual_input {
        entries.push(texture_entry(3));
    }
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &entries,
    })
}

fn kernel_pipeline(
    device: &wgpu::Device,
    label: &str,
    source: &str,
    layout: &wgpu::BindGroupLayout,
) -> wgpu::ComputePipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        module: &shader,
        entry_point: Some("main"),
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
    })
}

fn create_pipelines(device: &wgpu::Device) -> KernelPipelines {
    let single_input = kernel_layout(device, "kernel_single_input_layout", false);
    let dual_input = kernel_layout(device, "kernel_dual_input_layout", true);
    KernelPipelines {
        grain: kernel_pipeline(device, "grain", include_str!("shaders/grain.wgsl"), &single_input),
        bloom_threshold: kernel_pipeline(
            device,
            "bloom_threshold",
            include_str!("shaders/bloom_threshold.wgsl"),
            &single_input,
        ),
        bloom_blur: kernel_pipeline(device, "bloom_blur", include_str!("shaders/bloom_blur.wgsl"), &single_input),
        bloom_composite: kernel_pipeline(
            device,
            "bloom_composite",
            include_str!("shaders/bloom_composite.wgsl"),
            &dual_input,
        ),
        light_leak: kernel_pipeline(device, "light_leak", include_str!("shaders/light_leak.wgsl"), &single_input),
        single_input,
        dual_input,
    }
}
