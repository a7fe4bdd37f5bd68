use std::sync::Arc;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window, WindowAttributes};

use gust_core::scheduler::TickScheduler;

pub struct PlatformConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            title: "Gust Engine".to_string(),
            width: 640,
            height: 960,
        }
    }
}

pub fn create_window(
    event_loop: &ActiveEventLoop,
    config: &PlatformConfig,
) -> Result<Arc<Window>, String> {
    let attrs = WindowAttributes::default()
        .with_title(&config.title)
        .with_inner_size(winit::dpi::LogicalSize::new(config.width, config.height));

    let window = event_loop
        .create_window(attrs)
        .map_err(|e| format!("Failed to create window: {e}"))?;
    Ok(Arc::new(window))
}

/// Tick continuation backed by the window's redraw request. Each engine tick
/// runs from `RedrawRequested`, so requesting another redraw is the native
/// equivalent of scheduling the next animation frame.
pub struct WindowScheduler {
    window: Arc<Window>,
}

impl WindowScheduler {
    pub fn new(window: Arc<Window>) -> Self {
        Self { window }
    }
}

impl TickScheduler for WindowScheduler {
    fn request_tick(&mut self) {
        self.window.request_redraw();
    }
}
