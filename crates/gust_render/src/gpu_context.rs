use std::sync::Arc;
use winit::window::Window;

pub struct GpuContext {
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub surface_format: wgpu::TextureFormat,
    pub size: (u32, u32),
}

impl GpuContext {
    pub fn new(window: Arc<Window>) -> Result<Self, String> {
        let size = window.inner_size();
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::DX12 | wgpu::Backends::VULKAN,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .map_err(|e| format!("Failed to create surface: {e}"))?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| "Failed to find a suitable GPU adapter".to_string())?;

        log::info!("GPU adapter: {:?}", adapter.get_info().name);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Gust Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                ..Default::default()
            },
            None,
        ))
        .map_err(|e| format!("Failed to create device: {e}"))?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        Ok(Self {
            surface,
            device,
            queue,
            config,
            surface_format,
            size: (size.width, size.height),
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.size = (width, height);
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
    }

    pub fn begin_frame(&self) -> Option<(wgpu::SurfaceTexture, wgpu::TextureView)> {
        let output = match self.surface.get_current_texture() {
            Ok(tex) => tex,
            Err(wgpu::SurfaceError::Lost) => {
                self.surface.configure(&self.device, &self.config);
                return None;
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                log::error!("GPU out of memory");
                return None;
            }
            Err(e) => {
                log::warn!("Surface error: {:?}", e);
                return None;
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        Some((output, view))
    }
}

/// Ordered collection of GPU contexts plus the active selection. Contexts are
/// only ever appended; handles returned by `create` stay valid for the life
/// of the registry. Nothing is active until `set_active` is called, so a
/// caller that creates a context for offscreen work does not steal the main
/// window's slot.
#[derive(Default)]
pub struct ContextRegistry {
    contexts: Vec<GpuContext>,
    active: Option<usize>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, window: Arc<Window>) -> Result<usize, String> {
        let context = GpuContext::new(window)?;
        self.contexts.push(context);
        Ok(self.contexts.len() - 1)
    }

    /// Activate a context and hand it back so callers can use it without a
    /// follow-up `get`.
    pub fn set_active(&mut self, index: usize) -> Result<&GpuContext, String> {
        if index >= self.contexts.len() {
            return Err(format!(
                "No GPU context with handle {index} (have {})",
                self.contexts.len()
            ));
        }
        self.active = Some(index);
        Ok(&self.contexts[index])
    }

    pub fn get(&self) -> Result<&GpuContext, String> {
        self.active
            .and_then(|i| self.contexts.get(i))
            .ok_or_else(|| "No active GPU context".to_string())
    }

    pub fn get_mut(&mut self) -> Result<&mut GpuContext, String> {
        match self.active {
            Some(i) => self
                .contexts
                .get_mut(i)
                .ok_or_else(|| "No active GPU context".to_string()),
            None => Err("No active GPU context".to_string()),
        }
    }

    pub fn active_handle(&self) -> Option<usize> {
        self.active
    }
}
