use anyhow::{Context as AnyhowContext, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GpuPowerPreference {
    #[default]
    High,
    Low,
}

/// What the renderer learned about the adapter it picked.
#[derive(Clone, Debug)]
pub struct AdapterProfile {
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
    pub driver: String,
    pub max_texture_dimension: u32,
}

impl AdapterProfile {
    fn from_wgpu(info: &wgpu::AdapterInfo, limits: &wgpu::Limits) -> Self {
        Self {
            name: info.name.clone(),
            backend: info.backend,
            device_type: info.device_type,
            driver: format!("{} {}", info.driver, info.driver_info)
                .trim()
                .to_string(),
            max_texture_dimension: limits.max_texture_dimension_2d,
        }
    }

    pub fn is_software(&self) -> bool {
        matches!(self.device_type, wgpu::DeviceType::Cpu)
    }
}

/// Device and queue with no presentation surface; frames leave the GPU
/// through a readback buffer instead of a swapchain.
pub(crate) struct GpuContext {
    pub _instance: wgpu::Instance,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_profile: AdapterProfile,
}

impl GpuContext {
    pub(crate) fn new(width: u32, height: u32, power: GpuPowerPreference) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });

        let power_preference = match power {
            GpuPowerPreference::Low => wgpu::PowerPreference::LowPower,
            GpuPowerPreference::High => wgpu::PowerPreference::HighPerformance,
        };
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .context("failed to find a suitable GPU adapter")?;

        let limits = adapter.limits();
        let adapter_profile = AdapterProfile::from_wgpu(&adapter.get_info(), &limits);
        tracing::info!(
            name = %adapter_profile.name,
            backend = ?adapter_profile.backend,
            device_type = ?adapter_profile.device_type,
            driver = %adapter_profile.driver,
            "selected GPU adapter"
        );
        if adapter_profile.is_software() {
            tracing::warn!("software rasterizer selected; frame rate will be limited");
        }

        let max_dimension = limits.max_texture_dimension_2d;
        if width > max_dimension || height > max_dimension {
            anyhow::bail!(
                "GPU max texture dimension is {max_dimension}, display mode is {width}x{height}"
            );
        }

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("scanshade device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits,
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        }))
        .context("failed to create GPU device")?;

        device.on_uncaptured_error(Box::new(|error| {
            tracing::error!(error = %error, "uncaptured GPU error");
        }));

        Ok(Self {
            _instance: instance,
            device,
            queue,
            adapter_profile,
        })
    }
}
