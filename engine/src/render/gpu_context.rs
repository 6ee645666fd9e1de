//! GPU Context
//!
//! Headless device and queue for the clustered lighting core. The rendering
//! harness that owns a window and swapchain can hand its own device and queue
//! straight to `ClusteredLighting`; this context exists for tools and tests
//! that need compute without a surface.

use crate::error::{ClusterError, ClusterResult};

/// Shared GPU resources
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: wgpu::AdapterInfo,
}

/// Configuration for GPU context creation
#[derive(Clone, Debug)]
pub struct GpuContextConfig {
    /// Prefer high-performance GPU
    pub high_performance: bool,
    /// Accept only a software adapter (CI machines without a GPU)
    pub force_fallback_adapter: bool,
    /// Enable debug validation
    pub debug: bool,
}

impl Default for GpuContextConfig {
    fn default() -> Self {
        Self {
            high_performance: true,
            force_fallback_adapter: false,
            debug: cfg!(debug_assertions),
        }
    }
}

impl GpuContext {
    /// Create a device without a surface. Fails if no adapter can run compute shaders.
    pub fn new_headless(config: &GpuContextConfig) -> ClusterResult<Self> {
        let flags = if config.debug {
            wgpu::InstanceFlags::debugging()
        } else {
            wgpu::InstanceFlags::empty()
        };
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags,
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: if config.high_performance {
                wgpu::PowerPreference::HighPerformance
            } else {
                wgpu::PowerPreference::LowPower
            },
            compatible_surface: None,
            force_fallback_adapter: config.force_fallback_adapter,
        }))
        .map_err(|e| ClusterError::AdapterUnavailable(e.to_string()))?;

        let adapter_info = adapter.get_info();
        let downlevel = adapter.get_downlevel_capabilities();
        if !downlevel.flags.contains(wgpu::DownlevelFlags::COMPUTE_SHADERS) {
            return Err(ClusterError::AdapterUnavailable(format!(
                "{} ({:?}) does not support compute shaders",
                adapter_info.name, adapter_info.backend
            )));
        }

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Cluster Forward Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults(),
            memory_hints: wgpu::MemoryHints::Performance,
            ..Default::default()
        }))
        .map_err(|e| ClusterError::DeviceRequest(e.to_string()))?;

        log::info!(
            "[GpuContext] using {} ({:?}, {:?})",
            adapter_info.name,
            adapter_info.backend,
            adapter_info.device_type
        );

        Ok(Self {
            device,
            queue,
            adapter_info,
        })
    }

    /// Submit one encoder and block until the GPU is idle.
    pub fn submit_and_wait(&self, encoder: wgpu::CommandEncoder) -> ClusterResult<()> {
        let index = self.queue.submit(std::iter::once(encoder.finish()));
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: Some(index),
                timeout: None,
            })
            .map_err(|e| ClusterError::Readback(e.to_string()))?;
        Ok(())
    }
}
