//! Engine orchestration: startup, the preload gate, and the per-frame tick.
//!
//! Phases run Created -> Starting -> Preloading -> Running. `start` wires the
//! GPU context and kicks off the shader load; the engine then stays in
//! Preloading, re-requesting ticks, until the shader asset and every font
//! asset are loaded. Only then does it build the sprite pipeline, activate
//! the boot zone, and begin simulating.
//!
//! Each Running tick updates the bus, the active zone, and the collision
//! system (in that order), renders, then asks the scheduler for the next
//! tick. Any error propagates out of `tick` before the reschedule, so a
//! failing frame halts the loop instead of spinning on a broken state.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use glam::{Mat4, Vec2};
use winit::window::Window;

use gust_core::assets::{AssetPayload, AssetStore};
use gust_core::bus::{Message, MessageBus, MessageContext, MessageHandler};
use gust_core::input::{InputState, MSG_MOUSE_UP};
use gust_core::scheduler::TickScheduler;
use gust_core::shapes::CollisionSystem;
use gust_render::{
    compute_letterbox, ortho_projection, ContextRegistry, LetterboxLayout, ProjectionUniform,
    SpritePipeline, SpriteVertex, Texture,
};

use crate::sprite::SpriteQuad;
use crate::zone::ZoneManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Created,
    Starting,
    Preloading,
    Running,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Logical game width. When either dimension is absent the viewport
    /// tracks the window 1:1 instead of letterboxing.
    pub game_width: Option<u32>,
    /// Logical game height.
    pub game_height: Option<u32>,
    pub zone_asset: String,
    pub shader_asset: String,
    pub font_assets: Vec<String>,
    pub clear_color: [f64; 4],
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            game_width: Some(320),
            game_height: Some(480),
            zone_asset: "zones/test_zone.json".to_string(),
            shader_asset: "shaders/sprite.wgsl".to_string(),
            font_assets: vec!["fonts/text.txt".to_string()],
            clear_color: [146.0 / 255.0, 206.0 / 255.0, 247.0 / 255.0, 1.0],
        }
    }
}

impl EngineConfig {
    /// Configured logical size, or `None` for windows that render 1:1.
    pub fn game_size(&self) -> Option<(f32, f32)> {
        match (self.game_width, self.game_height) {
            (Some(w), Some(h)) => Some((w as f32, h as f32)),
            _ => None,
        }
    }
}

/// Preload dependency beyond the shader: bitmap fonts (or anything else a
/// game wants ready before the first frame).
pub trait FontProvider {
    /// Kick off loads on first call, then report whether everything the
    /// provider needs is ready.
    fn update_ready(&mut self, bus: &mut MessageBus) -> Result<bool, String>;
}

/// Fonts backed by the asset store.
pub struct AssetFontProvider {
    fonts: Vec<String>,
    started: bool,
    assets: Rc<RefCell<dyn AssetStore>>,
}

impl AssetFontProvider {
    pub fn new(fonts: Vec<String>, assets: Rc<RefCell<dyn AssetStore>>) -> Self {
        Self {
            fonts,
            started: false,
            assets,
        }
    }
}

impl FontProvider for AssetFontProvider {
    fn update_ready(&mut self, bus: &mut MessageBus) -> Result<bool, String> {
        if !self.started {
            for font in &self.fonts {
                self.assets.borrow_mut().load_asset(font, bus)?;
            }
            self.started = true;
        }
        let assets = self.assets.borrow();
        Ok(self.fonts.iter().all(|f| assets.is_asset_loaded(f)))
    }
}

/// Bus subscriber that remembers the most recent pointer release so the
/// engine can react during its own update instead of inside bus delivery.
pub struct PointerWatcher {
    last_release: Option<(f32, f32)>,
}

impl PointerWatcher {
    pub fn new() -> Rc<RefCell<PointerWatcher>> {
        Rc::new(RefCell::new(PointerWatcher { last_release: None }))
    }

    pub fn take_release(&mut self) -> Option<(f32, f32)> {
        self.last_release.take()
    }
}

impl MessageHandler for PointerWatcher {
    fn on_message(&mut self, message: &Message, _bus: &mut MessageBus) -> Result<(), String> {
        if message.code == MSG_MOUSE_UP {
            if let MessageContext::Pointer { x, y } = message.context {
                self.last_release = Some((x, y));
            }
        }
        Ok(())
    }
}

struct GpuTexture {
    _texture: Texture,
    bind_group: wgpu::BindGroup,
}

struct DrawRun {
    texture: String,
    start: u32,
    count: u32,
}

pub struct Engine {
    phase: EnginePhase,
    config: EngineConfig,
    contexts: ContextRegistry,
    window: Option<Arc<Window>>,
    bus: MessageBus,
    assets: Rc<RefCell<dyn AssetStore>>,
    zones: Rc<RefCell<ZoneManager>>,
    fonts: Box<dyn FontProvider>,
    collision: Box<dyn CollisionSystem>,
    input: InputState,
    pointer_watcher: Rc<RefCell<PointerWatcher>>,
    scheduler: Box<dyn TickScheduler>,
    pipeline: Option<SpritePipeline>,
    projection: Mat4,
    viewport: Option<LetterboxLayout>,
    previous_ms: f64,
    first_update: bool,
    textures: HashMap<String, GpuTexture>,
    vertex_buffer: Option<wgpu::Buffer>,
    vertex_capacity: usize,
    projection_buffer: Option<wgpu::Buffer>,
    projection_bind_group: Option<wgpu::BindGroup>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        assets: Rc<RefCell<dyn AssetStore>>,
        zones: Rc<RefCell<ZoneManager>>,
        fonts: Box<dyn FontProvider>,
        collision: Box<dyn CollisionSystem>,
        scheduler: Box<dyn TickScheduler>,
    ) -> Self {
        Self {
            phase: EnginePhase::Created,
            projection: Mat4::IDENTITY,
            config,
            contexts: ContextRegistry::new(),
            window: None,
            bus: MessageBus::new(),
            assets,
            zones,
            fonts,
            collision,
            input: InputState::new(),
            pointer_watcher: PointerWatcher::new(),
            scheduler,
            pipeline: None,
            viewport: None,
            previous_ms: 0.0,
            first_update: true,
            textures: HashMap::new(),
            vertex_buffer: None,
            vertex_capacity: 0,
            projection_buffer: None,
            projection_bind_group: None,
        }
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    pub fn viewport(&self) -> Option<LetterboxLayout> {
        self.viewport
    }

    pub fn bus_mut(&mut self) -> &mut MessageBus {
        &mut self.bus
    }

    /// Bring up the GPU context, register the boot zone, and enter the
    /// preload gate.
    pub fn start(&mut self, window: Arc<Window>) -> Result<(), String> {
        if self.phase != EnginePhase::Created {
            return Err("Engine has already been started.".to_string());
        }
        self.phase = EnginePhase::Starting;

        let handle = self.contexts.create(window.clone())?;
        let (width, height) = self.contexts.set_active(handle)?.size;
        self.window = Some(window);

        self.zones.borrow_mut().initialize(&self.config.zone_asset);

        let as_handler: Rc<RefCell<dyn MessageHandler>> = self.pointer_watcher.clone();
        self.bus.subscribe(MSG_MOUSE_UP, Rc::downgrade(&as_handler));

        let shader_asset = self.config.shader_asset.clone();
        self.assets
            .borrow_mut()
            .load_asset(&shader_asset, &mut self.bus)?;

        self.apply_layout(width, height);

        self.phase = EnginePhase::Preloading;
        self.scheduler.request_tick();
        Ok(())
    }

    /// One frame. `now_ms` is wall-clock milliseconds from any stable epoch.
    pub fn tick(&mut self, now_ms: f64) -> Result<(), String> {
        match self.phase {
            EnginePhase::Preloading => {
                self.bus.update(0.0)?;
                let shader_ready = self
                    .assets
                    .borrow()
                    .is_asset_loaded(&self.config.shader_asset);
                let fonts_ready = self.fonts.update_ready(&mut self.bus)?;

                if shader_ready && fonts_ready {
                    self.activate_pipeline()?;
                    let zones = self.zones.clone();
                    zones.borrow_mut().change_zone(0, &mut self.bus)?;
                    self.phase = EnginePhase::Running;
                    log::info!("preload complete, engine running");
                }

                self.previous_ms = now_ms;
                self.scheduler.request_tick();
                Ok(())
            }
            EnginePhase::Running => {
                let dt = if self.first_update {
                    0.0
                } else {
                    now_ms - self.previous_ms
                };
                self.first_update = false;

                self.update(dt)?;
                self.render()?;

                self.previous_ms = now_ms;
                self.scheduler.request_tick();
                Ok(())
            }
            _ => Err("Engine tick before start.".to_string()),
        }
    }

    fn update(&mut self, dt_ms: f64) -> Result<(), String> {
        self.bus.update(dt_ms)?;
        self.zones.borrow_mut().update(dt_ms);
        self.collision.update(dt_ms);

        if let Some((x, y)) = self.pointer_watcher.borrow_mut().take_release() {
            if let Some(window) = &self.window {
                window.set_title(&format!("Gust Engine ({x:.0}, {y:.0})"));
            }
        }
        Ok(())
    }

    fn activate_pipeline(&mut self) -> Result<(), String> {
        let payload = self
            .assets
            .borrow()
            .get_asset(&self.config.shader_asset)
            .ok_or_else(|| {
                format!("Shader asset '{}' missing after preload.", self.config.shader_asset)
            })?;
        let source = match payload.as_ref() {
            AssetPayload::Text(source) => source.clone(),
            _ => {
                return Err(format!(
                    "Shader asset '{}' is not text.",
                    self.config.shader_asset
                ))
            }
        };

        let ctx = self.contexts.get()?;
        let pipeline = SpritePipeline::new(&ctx.device, ctx.surface_format, &source);
        let buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Projection Buffer"),
            size: std::mem::size_of::<ProjectionUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = pipeline.create_projection_bind_group(&ctx.device, &buffer);

        self.pipeline = Some(pipeline);
        self.projection_buffer = Some(buffer);
        self.projection_bind_group = Some(bind_group);
        Ok(())
    }

    fn ensure_textures(&mut self, quads: &[SpriteQuad]) -> Result<(), String> {
        let pipeline = match &self.pipeline {
            Some(pipeline) => pipeline,
            None => return Ok(()),
        };
        let ctx = self.contexts.get()?;

        for quad in quads {
            if self.textures.contains_key(&quad.texture) {
                continue;
            }
            let payload = match self.assets.borrow().get_asset(&quad.texture) {
                Some(payload) => payload,
                None => continue,
            };
            match payload.as_ref() {
                AssetPayload::Image { width, height, rgba } => {
                    let texture = Texture::from_rgba8(
                        &ctx.device,
                        &ctx.queue,
                        &quad.texture,
                        *width,
                        *height,
                        rgba,
                    )?;
                    let bind_group = pipeline.create_texture_bind_group(
                        &ctx.device,
                        &texture.view,
                        &texture.sampler,
                    );
                    self.textures.insert(
                        quad.texture.clone(),
                        GpuTexture {
                            _texture: texture,
                            bind_group,
                        },
                    );
                }
                _ => log::warn!("texture asset '{}' is not an image, skipping", quad.texture),
            }
        }
        Ok(())
    }

    fn ensure_vertex_capacity(&mut self, needed: usize) -> Result<(), String> {
        if self.vertex_buffer.is_some() && needed <= self.vertex_capacity {
            return Ok(());
        }
        let mut capacity = self.vertex_capacity.max(64);
        while capacity < needed {
            capacity *= 2;
        }
        let ctx = self.contexts.get()?;
        self.vertex_buffer = Some(ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Sprite Vertex Buffer"),
            size: (capacity * std::mem::size_of::<SpriteVertex>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }));
        self.vertex_capacity = capacity;
        Ok(())
    }

    fn render(&mut self) -> Result<(), String> {
        let mut quads = Vec::new();
        self.zones.borrow().collect_sprites(&mut quads);
        self.ensure_textures(&quads)?;

        // Stream vertices for quads whose textures are resident; merge
        // consecutive quads that share a texture into one draw.
        let mut vertices: Vec<SpriteVertex> = Vec::new();
        let mut runs: Vec<DrawRun> = Vec::new();
        for quad in &quads {
            if !self.textures.contains_key(&quad.texture) {
                log::warn!("texture '{}' not resident yet, skipping quad", quad.texture);
                continue;
            }
            push_draw_run(&mut runs, &quad.texture, vertices.len() as u32);
            vertices.extend_from_slice(&quad.vertices);
        }

        if !vertices.is_empty() {
            self.ensure_vertex_capacity(vertices.len())?;
        }

        let ctx = self.contexts.get()?;

        if let Some(buffer) = &self.projection_buffer {
            let uniform = ProjectionUniform::from_matrix(self.projection);
            ctx.queue.write_buffer(buffer, 0, bytemuck::bytes_of(&uniform));
        }
        if !vertices.is_empty() {
            if let Some(vb) = &self.vertex_buffer {
                ctx.queue.write_buffer(vb, 0, bytemuck::cast_slice(&vertices));
            }
        }

        let (surface_texture, view) = match ctx.begin_frame() {
            Some(frame) => frame,
            None => return Ok(()),
        };

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        {
            let [r, g, b, a] = self.config.clear_color;
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Sprite Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            if let (Some(pipeline), Some(bind_group), Some(vb)) = (
                &self.pipeline,
                &self.projection_bind_group,
                &self.vertex_buffer,
            ) {
                if !runs.is_empty() {
                    if let Some(layout) = self.viewport {
                        if layout.width >= 1.0 && layout.height >= 1.0 {
                            pass.set_viewport(
                                layout.margin_x,
                                layout.margin_y,
                                layout.width,
                                layout.height,
                                0.0,
                                1.0,
                            );
                        }
                    }
                    pass.set_pipeline(&pipeline.pipeline);
                    pass.set_bind_group(0, bind_group, &[]);
                    pass.set_vertex_buffer(0, vb.slice(..));
                    for run in &runs {
                        if let Some(texture) = self.textures.get(&run.texture) {
                            pass.set_bind_group(1, &texture.bind_group, &[]);
                            pass.draw(run.start..run.start + run.count, 0..1);
                        }
                    }
                }
            }
        }

        ctx.queue.submit(std::iter::once(encoder.finish()));
        surface_texture.present();
        Ok(())
    }

    /// Window resize: reconfigure the surface and refit the letterbox.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        if let Ok(ctx) = self.contexts.get_mut() {
            ctx.resize(width, height);
        }
        self.apply_layout(width, height);
    }

    fn apply_layout(&mut self, width: u32, height: u32) {
        match self.config.game_size() {
            Some((game_w, game_h)) => {
                let layout = compute_letterbox(width as f32, height as f32, game_w / game_h);
                self.projection = ortho_projection(game_w, game_h);
                self.input.set_resolution_scale(Vec2::new(
                    layout.width / game_w,
                    layout.height / game_h,
                ));
                self.viewport = Some(layout);
            }
            None => {
                // No logical size: content coordinates track the window.
                self.projection = ortho_projection(width as f32, height as f32);
                self.input.set_resolution_scale(Vec2::ONE);
                self.viewport = None;
            }
        }
    }

    /// Pointer position in window space; the letterbox margins are removed
    /// so downstream coordinates are relative to the game box.
    pub fn pointer_moved(&mut self, x: f32, y: f32) {
        let (margin_x, margin_y) = match self.viewport {
            Some(layout) => (layout.margin_x, layout.margin_y),
            None => (0.0, 0.0),
        };
        self.input.pointer_moved(x - margin_x, y - margin_y);
    }

    pub fn pointer_released(&mut self) {
        self.input.pointer_released(&mut self.bus);
    }

    pub fn logical_pointer(&self) -> Vec2 {
        self.input.logical_position()
    }
}

fn push_draw_run(runs: &mut Vec<DrawRun>, texture: &str, start: u32) {
    if let Some(last) = runs.last_mut() {
        if last.texture == texture {
            last.count += 6;
            return;
        }
    }
    runs.push(DrawRun {
        texture: texture.to_string(),
        start,
        count: 6,
    });
}
