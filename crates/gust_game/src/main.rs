//! Gust Engine -- application entry point.
//!
//! winit drives the event loop via `ApplicationHandler`. Every service the
//! engine depends on (asset store, material table, component builders, zone
//! manager, font provider, collision system, tick scheduler) is constructed
//! explicitly in `resumed` and handed to the engine; nothing lives in
//! globals. Simulation and rendering run from `RedrawRequested`, and the
//! engine requests the next redraw itself after each successful tick, so a
//! failed frame stops the loop.

mod engine;
mod material;
mod registry;
mod sprite;
mod zone;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use winit::application::ApplicationHandler;
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use gust_core::assets::{AssetStore, FileAssetStore};
use gust_core::shapes::NoCollision;
use gust_platform::window::{PlatformConfig, WindowScheduler};

use engine::{AssetFontProvider, Engine, EngineConfig};
use material::MaterialRegistry;
use registry::ComponentRegistry;
use zone::ZoneManager;

struct App {
    config: PlatformConfig,
    engine: Option<Engine>,
    started_at: Instant,
}

impl App {
    fn new() -> Self {
        Self {
            config: PlatformConfig::default(),
            engine: None,
            started_at: Instant::now(),
        }
    }

    fn build_engine(&mut self, event_loop: &ActiveEventLoop) -> Result<Engine, String> {
        let window = gust_platform::window::create_window(event_loop, &self.config)?;
        log::info!(
            "Window created: {}x{}",
            self.config.width,
            self.config.height
        );

        let assets: Rc<RefCell<dyn AssetStore>> =
            Rc::new(RefCell::new(FileAssetStore::new("assets")));

        let mut materials = MaterialRegistry::new();
        materials.register("duck", "textures/duck.png")?;
        let materials = Rc::new(RefCell::new(materials));

        let components = Rc::new(ComponentRegistry::with_builtin());
        let zones = ZoneManager::create(assets.clone(), materials, components);

        let engine_config = EngineConfig::default();
        let fonts = Box::new(AssetFontProvider::new(
            engine_config.font_assets.clone(),
            assets.clone(),
        ));

        let mut engine = Engine::new(
            engine_config,
            assets,
            zones,
            fonts,
            Box::new(NoCollision),
            Box::new(WindowScheduler::new(window.clone())),
        );
        engine.start(window)?;
        Ok(engine)
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.engine.is_some() {
            return;
        }
        match self.build_engine(event_loop) {
            Ok(engine) => self.engine = Some(engine),
            Err(e) => {
                log::error!("Engine startup failed: {e}");
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let engine = match self.engine.as_mut() {
            Some(engine) => engine,
            None => return,
        };

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, exiting.");
                event_loop.exit();
            }

            WindowEvent::Resized(physical_size) => {
                engine.resize(physical_size.width, physical_size.height);
            }

            WindowEvent::CursorMoved { position, .. } => {
                engine.pointer_moved(position.x as f32, position.y as f32);
            }

            WindowEvent::MouseInput {
                state: ElementState::Released,
                button: MouseButton::Left,
                ..
            } => {
                engine.pointer_released();
            }

            WindowEvent::RedrawRequested => {
                let now_ms = self.started_at.elapsed().as_secs_f64() * 1000.0;
                if let Err(e) = engine.tick(now_ms) {
                    log::error!("Engine tick failed: {e}");
                    event_loop.exit();
                }
            }

            _ => {}
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Gust Engine starting...");

    let event_loop = EventLoop::new().expect("Failed to create event loop");
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App::new();
    event_loop.run_app(&mut app).expect("Event loop error");
}
