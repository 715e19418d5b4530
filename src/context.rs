//! GPU Context: the device handle, the two render contexts and cache lifecycle.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context as _};

use crate::frame::Frame;
use crate::kernels::cpu::CpuBackend;
use crate::kernels::gpu::WgpuBackend;
use crate::kernels::ComputeKernelService;
use crate::lut::LutEngine;
use crate::settings::{EngineSettings, KernelBackendChoice};

/// Whether a render context keeps intermediates between renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Keep up to `max_entries` rendered prefixes
    Intermediates { max_entries: usize },
    /// Every frame is new; keep nothing
    Never,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderCacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Render-time state for one class of work. The interactive context caches the
/// rotation/crop/preset prefix across slider edits; the live context never caches.
pub struct RenderContext {
    label: &'static str,
    policy: CachePolicy,
    entries: Mutex<VecDeque<(u64, Arc<Frame>)>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RenderContext {
    pub fn new(label: &'static str, policy: CachePolicy) -> Self {
        Self {
            label,
            policy,
            entries: Mutex::new(VecDeque::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn interactive(max_entries: usize) -> Self {
        Self::new("interactive", CachePolicy::Intermediates { max_entries })
    }

    pub fn live() -> Self {
        Self::new("live", CachePolicy::Never)
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    pub fn is_caching(&self) -> bool {
        matches!(self.policy, CachePolicy::Intermediates { max_entries } if max_entries > 0)
    }

    pub fn cached_prefix(&self, key: u64) -> Option<Arc<Frame>> {
        if !self.is_caching() {
            return None;
        }
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        match entries.iter().position(|(k, _)| *k == key) {
            Some(index) => {
                // Most recently used lives at the back
                let entry = entries.remove(index)?;
                let frame = Arc::clone(&entry.1);
                entries.push_back(entry);
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(frame)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn store_prefix(&self, key: u64, frame: Arc<Frame>) {
        let CachePolicy::Intermediates { max_entries } = self.policy else {
            return;
        };
        if max_entries == 0 {
            return;
        }
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.retain(|(k, _)| *k != key);
        while entries.len() >= max_entries {
            entries.pop_front();
        }
        entries.push_back((key, frame));
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        if !entries.is_empty() {
            tracing::debug!(context = self.label, dropped = entries.len(), "render cache cleared");
        }
        entries.clear();
    }

    pub fn stats(&self) -> RenderCacheStats {
        RenderCacheStats {
            entries: self.entries.lock().map(|e| e.len()).unwrap_or(0),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// An opened wgpu device and queue.
pub struct GpuDevice {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub adapter_info: wgpu::AdapterInfo,
}

impl GpuDevice {
    pub async fn request() -> anyhow::Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| anyhow!("No suitable GPU adapter found"))?;
        let adapter_info = adapter.get_info();

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("lume_fx_device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .with_context(|| format!("Failed to open device on {}", adapter_info.name))?;

        log::info!("GPU initialized: {} ({})", adapter_info.name, adapter_info.backend.to_str());
        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_info,
        })
    }
}

/// Explicitly constructed replacement for a process-wide GPU singleton. Owns the device
/// (when there is one), both render contexts and the cache lifecycle.
pub struct GpuContext {
    device: Option<GpuDevice>,
    backend: KernelBackendChoice,
    interactive: Arc<RenderContext>,
    live: Arc<RenderContext>,
    luts: Arc<LutEngine>,
}

impl GpuContext {
    /// Opens a device unless the settings force the CPU back end. A missing adapter is
    /// logged and leaves the context without a device.
    pub fn new(settings: &EngineSettings, luts: Arc<LutEngine>) -> Self {
        let device = match settings.kernel_backend {
            KernelBackendChoice::Cpu => None,
            KernelBackendChoice::Auto | KernelBackendChoice::Gpu => match pollster::block_on(GpuDevice::request()) {
                Ok(device) => Some(device),
                Err(e) => {
                    log::warn!("GPU unavailable, kernels run on {}: {:#}", fallback_name(settings.kernel_backend), e);
                    None
                }
            },
        };
        Self::with_device(device, settings, luts)
    }

    pub fn cpu_only(settings: &EngineSettings, luts: Arc<LutEngine>) -> Self {
        let settings = EngineSettings { kernel_backend: KernelBackendChoice::Cpu, ..settings.clone() };
        Self::with_device(None, &settings, luts)
    }

    fn with_device(device: Option<GpuDevice>, settings: &EngineSettings, luts: Arc<LutEngine>) -> Self {
        Self {
            device,
            backend: settings.kernel_backend,
            interactive: Arc::new(RenderContext::interactive(settings.interactive_cache_entries)),
            live: Arc::new(RenderContext::live()),
            luts,
        }
    }

    pub fn has_device(&self) -> bool {
        self.device.is_some()
    }

    pub fn adapter_name(&self) -> Option<&str> {
        self.device.as_ref().map(|d| d.adapter_info.name.as_str())
    }

    pub fn interactive(&self) -> &Arc<RenderContext> {
        &self.interactive
    }

    pub fn live(&self) -> &Arc<RenderContext> {
        &self.live
    }

    pub fn luts(&self) -> &Arc<LutEngine> {
        &self.luts
    }

    /// A kernel service for one owning worker. Pipelines and pools are never shared
    /// between workers.
    pub fn kernel_service(&self) -> ComputeKernelService {
        if let Some(gpu) = &self.device {
            match WgpuBackend::new(Arc::clone(&gpu.device), Arc::clone(&gpu.queue)) {
                Ok(backend) => return ComputeKernelService::new(Box::new(backend)),
                Err(e) => log::warn!("Compute kernels unavailable: {}", e),
            }
        }
        match self.backend {
            KernelBackendChoice::Gpu => ComputeKernelService::unavailable(),
            KernelBackendChoice::Auto | KernelBackendChoice::Cpu => ComputeKernelService::new(Box::new(CpuBackend::new())),
        }
    }

    /// Drops every cached intermediate and parsed LUT, e.g. under memory pressure.
    pub fn clear_caches(&self) {
        self.interactive.clear();
        self.live.clear();
        self.luts.clear_cache();
        log::info!("Render caches cleared");
    }

    /// Waits for outstanding GPU work and releases the device.
    pub fn teardown(&mut self) {
        self.clear_caches();
        if let Some(gpu) = self.device.take() {
            gpu.device.poll(wgpu::Maintain::Wait);
            log::info!("GPU context released: {}", gpu.adapter_info.name);
        }
    }
}

fn fallback_name(choice: KernelBackendChoice) -> &'static str {
    match choice {
        KernelBackendChoice::Gpu => "nothing (kernels disabled)",
        _ => "the CPU",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(v: f32) -> Arc<Frame> {
        Arc::new(Frame::solid(2, 2, [v, v, v, 1.0]))
    }

    #[test]
    fn interactive_context_is_bounded_lru() {
        let ctx = RenderContext::interactive(2);
        ctx.store_prefix(1, frame(0.1));
        ctx.store_prefix(2, frame(0.2));
        assert!(ctx.cached_prefix(1).is_some());
        ctx.store_prefix(3, frame(0.3));

        assert!(ctx.cached_prefix(2).is_none());
        assert!(ctx.cached_prefix(1).is_some());
        assert!(ctx.cached_prefix(3).is_some());
        let stats = ctx.stats();
        assert_eq!((stats.entries, stats.hits, stats.misses), (2, 3, 1));
    }

    #[test]
    fn live_context_never_caches() {
        let ctx = RenderContext::live();
        ctx.store_prefix(1, frame(0.5));
        assert!(ctx.cached_prefix(1).is_none());
        assert_eq!(ctx.stats().entries, 0);
    }

    #[test]
    fn cpu_only_context_clears_every_cache() {
        let luts = Arc::new(LutEngine::new(None, 4));
        luts.register_bundled("id.cube", crate::lut::authoring::CubeBuilder::identity(2).to_cube_string());
        luts.resolve("id.cube").unwrap();

        let mut ctx = GpuContext::cpu_only(&EngineSettings::default(), Arc::clone(&luts));
        assert!(!ctx.has_device());
        assert_eq!(ctx.kernel_service().backend_name(), "cpu");
        ctx.interactive().store_prefix(9, frame(0.4));

        ctx.clear_caches();
        assert_eq!(ctx.interactive().stats().entries, 0);
        assert_eq!(luts.cache_stats().entries, 0);
        ctx.teardown();
    }
}
