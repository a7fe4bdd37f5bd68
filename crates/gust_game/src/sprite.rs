//! Frame-animated sprite over a texture atlas.
//!
//! A sprite is authored against a material; the atlas texture behind the
//! material loads asynchronously, so the sprite stays unresolved (zero UVs,
//! not yet animating) until the asset-loaded message for its texture arrives.
//! Frame rectangles are laid out row-major in the atlas: frames fill a row
//! left to right, then continue at the left edge of the next row down.
//!
//! Playback walks `frame_sequence`, which indexes into the atlas frames; the
//! same atlas frame may appear multiple times in a sequence (ping-pong walks,
//! held frames).

use std::cell::RefCell;
use std::rc::Rc;

use glam::Vec2;
use serde::Deserialize;
use serde_json::Value;

use gust_core::assets::{asset_loaded_code, AssetStore};
use gust_core::bus::{Message, MessageBus, MessageContext, MessageHandler};
use gust_render::SpriteVertex;

use crate::material::MaterialRegistry;

/// CPU-side quad handed to the renderer: six vertices plus the texture that
/// binds them.
#[derive(Debug, Clone)]
pub struct SpriteQuad {
    pub texture: String,
    pub vertices: [SpriteVertex; 6],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvWindow {
    pub min: Vec2,
    pub max: Vec2,
}

#[derive(Debug, Clone)]
pub struct AnimatedSpriteInfo {
    pub name: String,
    pub material_name: String,
    pub width: f32,
    pub height: f32,
    pub frame_width: f32,
    pub frame_height: f32,
    pub frame_count: usize,
    pub frame_sequence: Vec<usize>,
    pub frame_time_ms: f64,
    pub auto_play: bool,
}

#[derive(Debug, Deserialize)]
struct AnimatedSpriteJson {
    name: Option<String>,
    #[serde(rename = "materialName")]
    material_name: Option<String>,
    width: Option<f32>,
    height: Option<f32>,
    #[serde(rename = "frameWidth")]
    frame_width: Option<f32>,
    #[serde(rename = "frameHeight")]
    frame_height: Option<f32>,
    #[serde(rename = "frameCount")]
    frame_count: Option<usize>,
    #[serde(rename = "frameSequence")]
    frame_sequence: Option<Vec<usize>>,
    #[serde(rename = "frameTime")]
    frame_time: Option<f64>,
    #[serde(rename = "autoPlay")]
    auto_play: Option<bool>,
}

impl AnimatedSpriteInfo {
    pub fn from_json(value: &Value) -> Result<Self, String> {
        let raw: AnimatedSpriteJson = serde_json::from_value(value.clone())
            .map_err(|e| format!("Animated sprite JSON error: {e}"))?;
        validate_sprite_info(raw)
    }
}

fn validate_sprite_info(raw: AnimatedSpriteJson) -> Result<AnimatedSpriteInfo, String> {
    let name = raw
        .name
        .ok_or_else(|| "Animated sprite requires a 'name'.".to_string())?;
    let material_name = raw
        .material_name
        .ok_or_else(|| format!("Animated sprite '{name}' requires a 'materialName'."))?;
    let frame_width = raw
        .frame_width
        .ok_or_else(|| format!("Animated sprite '{name}' requires a numeric 'frameWidth'."))?;
    let frame_height = raw
        .frame_height
        .ok_or_else(|| format!("Animated sprite '{name}' requires a numeric 'frameHeight'."))?;
    let frame_count = raw
        .frame_count
        .ok_or_else(|| format!("Animated sprite '{name}' requires a numeric 'frameCount'."))?;
    let frame_sequence = raw
        .frame_sequence
        .ok_or_else(|| format!("Animated sprite '{name}' requires a 'frameSequence' array."))?;

    if frame_sequence.is_empty() {
        return Err(format!("Animated sprite '{name}' has an empty 'frameSequence'."));
    }
    for &index in &frame_sequence {
        if index >= frame_count {
            return Err(format!(
                "Animated sprite '{name}' sequence entry {index} exceeds frame count {frame_count}."
            ));
        }
    }

    Ok(AnimatedSpriteInfo {
        width: raw.width.unwrap_or(frame_width),
        height: raw.height.unwrap_or(frame_height),
        frame_time_ms: raw.frame_time.unwrap_or(33.0),
        auto_play: raw.auto_play.unwrap_or(true),
        name,
        material_name,
        frame_width,
        frame_height,
        frame_count,
        frame_sequence,
    })
}

pub struct AnimatedSprite {
    pub name: String,
    texture_key: String,
    frame_width: f32,
    frame_height: f32,
    frame_count: usize,
    frame_sequence: Vec<usize>,
    frame_time_ms: f64,
    frame_uvs: Vec<UvWindow>,
    current_frame: usize,
    current_time: f64,
    atlas_resolved: bool,
    playing: bool,
    vertices: [SpriteVertex; 6],
    assets: Rc<RefCell<dyn AssetStore>>,
}

impl AnimatedSprite {
    /// Build the sprite and wire it to the bus. If the atlas texture is
    /// already cached the sprite resolves immediately; otherwise it waits for
    /// the asset-loaded message (and, as a fallback, polls the store on
    /// update in case the message fired before the subscription existed).
    pub fn create(
        info: &AnimatedSpriteInfo,
        materials: &MaterialRegistry,
        assets: Rc<RefCell<dyn AssetStore>>,
        bus: &mut MessageBus,
    ) -> Result<Rc<RefCell<AnimatedSprite>>, String> {
        let texture_key = materials.diffuse_texture(&info.material_name)?;

        let w = info.width;
        let h = info.height;
        let positions = [
            [0.0, 0.0],
            [0.0, h],
            [w, h],
            [w, h],
            [w, 0.0],
            [0.0, 0.0],
        ];
        let vertices = positions.map(|position| SpriteVertex {
            position,
            tex_coords: [0.0, 0.0],
        });

        let sprite = Rc::new(RefCell::new(AnimatedSprite {
            name: info.name.clone(),
            texture_key: texture_key.clone(),
            frame_width: info.frame_width,
            frame_height: info.frame_height,
            frame_count: info.frame_count,
            frame_sequence: info.frame_sequence.clone(),
            frame_time_ms: info.frame_time_ms,
            frame_uvs: Vec::new(),
            current_frame: 0,
            current_time: 0.0,
            atlas_resolved: false,
            playing: info.auto_play,
            vertices,
            assets,
        }));

        let as_handler: Rc<RefCell<dyn MessageHandler>> = sprite.clone();
        bus.subscribe(&asset_loaded_code(&texture_key), Rc::downgrade(&as_handler));

        let cached = sprite.borrow().assets.borrow().get_asset(&texture_key);
        if let Some(payload) = cached {
            if let Some((aw, ah)) = payload.image_size() {
                sprite.borrow_mut().resolve_atlas(aw, ah);
            }
        }

        Ok(sprite)
    }

    pub fn texture_key(&self) -> &str {
        &self.texture_key
    }

    pub fn is_resolved(&self) -> bool {
        self.atlas_resolved
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    pub fn stop(&mut self) {
        self.playing = false;
    }

    /// Position in the playback sequence (not the atlas frame index).
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn frame_uvs(&self) -> &[UvWindow] {
        &self.frame_uvs
    }

    /// Jump the playback cursor. Bounded by the atlas frame count.
    pub fn set_frame(&mut self, frame: usize) -> Result<(), String> {
        if frame >= self.frame_count {
            return Err(format!(
                "Frame is out of range: {frame}, frame count: {}",
                self.frame_count
            ));
        }
        self.current_frame = frame;
        self.current_time = 0.0;
        if self.atlas_resolved {
            self.apply_frame_uvs();
        }
        Ok(())
    }

    /// Ask the engine to kick off the atlas texture load. A missing texture
    /// file is reported, not fatal; the sprite just stays unresolved.
    pub fn request_texture(&mut self, bus: &mut MessageBus) {
        let key = self.texture_key.clone();
        if let Err(e) = self.assets.borrow_mut().load_asset(&key, bus) {
            log::warn!("sprite '{}': {e}", self.name);
        }
    }

    pub fn update(&mut self, dt_ms: f64) {
        if !self.atlas_resolved {
            // The completion message may have been delivered before this
            // sprite subscribed; fall back to the store's cache.
            let size = self
                .assets
                .borrow()
                .get_asset(&self.texture_key)
                .and_then(|p| p.image_size());
            if let Some((aw, ah)) = size {
                self.resolve_atlas(aw, ah);
            }
            return;
        }
        if !self.playing {
            return;
        }

        self.current_time += dt_ms;
        if self.current_time > self.frame_time_ms {
            self.current_time = 0.0;
            self.current_frame = (self.current_frame + 1) % self.frame_sequence.len();
            self.apply_frame_uvs();
        }
    }

    /// Renderer-facing quad, translated to the owning object's position.
    pub fn quad(&self, offset: Vec2) -> SpriteQuad {
        let mut vertices = self.vertices;
        for vertex in &mut vertices {
            vertex.position[0] += offset.x;
            vertex.position[1] += offset.y;
        }
        SpriteQuad {
            texture: self.texture_key.clone(),
            vertices,
        }
    }

    fn resolve_atlas(&mut self, asset_width: u32, asset_height: u32) {
        if asset_width == 0 || asset_height == 0 {
            log::warn!("sprite '{}': atlas texture has zero size", self.name);
            return;
        }
        self.calculate_uvs(asset_width as f32, asset_height as f32);
        self.atlas_resolved = true;
        self.apply_frame_uvs();
    }

    /// Row-major frame layout: `per_row` full frames fit across the atlas,
    /// frame i sits at column `i % per_row`, row `i / per_row`.
    fn calculate_uvs(&mut self, asset_width: f32, asset_height: f32) {
        let per_row = ((asset_width / self.frame_width).floor() as usize).max(1);
        let u_span = self.frame_width / asset_width;
        let v_span = self.frame_height / asset_height;

        self.frame_uvs.clear();
        for i in 0..self.frame_count {
            let col = (i % per_row) as f32;
            let row = (i / per_row) as f32;
            let min = Vec2::new(col * u_span, row * v_span);
            self.frame_uvs.push(UvWindow {
                min,
                max: min + Vec2::new(u_span, v_span),
            });
        }
    }

    fn apply_frame_uvs(&mut self) {
        let sequence_pos = self.current_frame % self.frame_sequence.len();
        let frame = self.frame_sequence[sequence_pos];
        let uv = match self.frame_uvs.get(frame) {
            Some(uv) => *uv,
            None => return,
        };
        let coords = [
            [uv.min.x, uv.min.y],
            [uv.min.x, uv.max.y],
            [uv.max.x, uv.max.y],
            [uv.max.x, uv.max.y],
            [uv.max.x, uv.min.y],
            [uv.min.x, uv.min.y],
        ];
        for (vertex, tex) in self.vertices.iter_mut().zip(coords) {
            vertex.tex_coords = tex;
        }
    }
}

impl MessageHandler for AnimatedSprite {
    fn on_message(&mut self, message: &Message, _bus: &mut MessageBus) -> Result<(), String> {
        if let MessageContext::AssetLoaded { key, payload } = &message.context {
            if *key == self.texture_key {
                if let Some((aw, ah)) = payload.image_size() {
                    self.resolve_atlas(aw, ah);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use gust_core::assets::AssetPayload;

    struct MemoryAssets {
        cache: HashMap<String, Arc<AssetPayload>>,
    }

    impl MemoryAssets {
        fn new() -> Rc<RefCell<Self>> {
            Rc::new(RefCell::new(Self { cache: HashMap::new() }))
        }

        fn insert_image(&mut self, key: &str, width: u32, height: u32) {
            self.cache.insert(
                key.to_string(),
                Arc::new(AssetPayload::Image {
                    width,
                    height,
                    rgba: vec![0; (width * height * 4) as usize],
                }),
            );
        }
    }

    impl AssetStore for MemoryAssets {
        fn load_asset(&mut self, key: &str, bus: &mut MessageBus) -> Result<(), String> {
            let payload = self
                .cache
                .get(key)
                .cloned()
                .ok_or_else(|| format!("no such asset '{key}'"))?;
            bus.post(
                &asset_loaded_code(key),
                MessageContext::AssetLoaded {
                    key: key.to_string(),
                    payload,
                },
            );
            Ok(())
        }

        fn is_asset_loaded(&self, key: &str) -> bool {
            self.cache.contains_key(key)
        }

        fn get_asset(&self, key: &str) -> Option<Arc<AssetPayload>> {
            self.cache.get(key).cloned()
        }
    }

    fn duck_materials() -> MaterialRegistry {
        let mut materials = MaterialRegistry::new();
        materials
            .register("duck", "textures/duck.png")
            .expect("register material");
        materials
    }

    fn sprite_info(frame_count: usize, sequence: Vec<usize>) -> AnimatedSpriteInfo {
        AnimatedSpriteInfo {
            name: "walker".to_string(),
            material_name: "duck".to_string(),
            width: 10.0,
            height: 10.0,
            frame_width: 10.0,
            frame_height: 10.0,
            frame_count,
            frame_sequence: sequence,
            frame_time_ms: 33.0,
            auto_play: true,
        }
    }

    #[test]
    fn uvs_walk_a_single_row() {
        let assets = MemoryAssets::new();
        assets.borrow_mut().insert_image("textures/duck.png", 40, 10);
        let mut bus = MessageBus::new();
        let sprite = AnimatedSprite::create(
            &sprite_info(4, vec![0, 1, 2, 3]),
            &duck_materials(),
            assets,
            &mut bus,
        )
        .expect("create");

        let sprite = sprite.borrow();
        assert!(sprite.is_resolved());
        let uvs = sprite.frame_uvs();
        assert_eq!(uvs.len(), 4);
        for (i, expected) in [0.0, 0.25, 0.5, 0.75].iter().enumerate() {
            assert!((uvs[i].min.x - expected).abs() < 1e-6, "frame {i} min.x");
            assert!(uvs[i].min.y.abs() < 1e-6, "frame {i} stays on row 0");
            assert!((uvs[i].max.x - (expected + 0.25)).abs() < 1e-6);
            assert!((uvs[i].max.y - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn uvs_wrap_to_the_next_row() {
        let assets = MemoryAssets::new();
        assets.borrow_mut().insert_image("textures/duck.png", 20, 20);
        let mut bus = MessageBus::new();
        let sprite = AnimatedSprite::create(
            &sprite_info(4, vec![0, 1, 2, 3]),
            &duck_materials(),
            assets,
            &mut bus,
        )
        .expect("create");

        let sprite = sprite.borrow();
        let uvs = sprite.frame_uvs();
        // Two frames per row; frames 2 and 3 restart at the left edge.
        assert!((uvs[2].min.x).abs() < 1e-6);
        assert!((uvs[2].min.y - 0.5).abs() < 1e-6);
        assert!((uvs[3].min.x - 0.5).abs() < 1e-6);
        assert!((uvs[3].min.y - 0.5).abs() < 1e-6);
        assert!(uvs[1].max.x <= 1.0 + 1e-6 && uvs[3].max.x <= 1.0 + 1e-6);
    }

    #[test]
    fn playback_cycles_the_sequence() {
        let assets = MemoryAssets::new();
        assets.borrow_mut().insert_image("textures/duck.png", 40, 10);
        let mut bus = MessageBus::new();
        let sprite = AnimatedSprite::create(
            &sprite_info(4, vec![0, 1, 2]),
            &duck_materials(),
            assets,
            &mut bus,
        )
        .expect("create");

        let mut sprite = sprite.borrow_mut();
        assert_eq!(sprite.current_frame(), 0);
        sprite.update(34.0);
        assert_eq!(sprite.current_frame(), 1);
        sprite.update(34.0);
        assert_eq!(sprite.current_frame(), 2);
        sprite.update(34.0);
        assert_eq!(sprite.current_frame(), 0, "wraps at sequence length");
    }

    #[test]
    fn frame_advances_only_past_frame_time() {
        let assets = MemoryAssets::new();
        assets.borrow_mut().insert_image("textures/duck.png", 40, 10);
        let mut bus = MessageBus::new();
        let sprite = AnimatedSprite::create(
            &sprite_info(4, vec![0, 1]),
            &duck_materials(),
            assets,
            &mut bus,
        )
        .expect("create");

        let mut sprite = sprite.borrow_mut();
        sprite.update(20.0);
        assert_eq!(sprite.current_frame(), 0, "accumulator below frame time");
        sprite.update(20.0);
        assert_eq!(sprite.current_frame(), 1, "accumulated past frame time");
    }

    #[test]
    fn stopped_sprite_does_not_advance() {
        let assets = MemoryAssets::new();
        assets.borrow_mut().insert_image("textures/duck.png", 40, 10);
        let mut bus = MessageBus::new();
        let sprite = AnimatedSprite::create(
            &sprite_info(4, vec![0, 1, 2, 3]),
            &duck_materials(),
            assets,
            &mut bus,
        )
        .expect("create");

        let mut sprite = sprite.borrow_mut();
        sprite.stop();
        sprite.update(100.0);
        sprite.update(100.0);
        assert_eq!(sprite.current_frame(), 0);
        sprite.play();
        sprite.update(100.0);
        assert_eq!(sprite.current_frame(), 1);
    }

    #[test]
    fn set_frame_is_bounds_checked() {
        let assets = MemoryAssets::new();
        assets.borrow_mut().insert_image("textures/duck.png", 40, 10);
        let mut bus = MessageBus::new();
        let sprite = AnimatedSprite::create(
            &sprite_info(4, vec![0, 1, 2, 3]),
            &duck_materials(),
            assets,
            &mut bus,
        )
        .expect("create");

        let mut sprite = sprite.borrow_mut();
        sprite.set_frame(3).expect("last frame is valid");
        assert_eq!(sprite.current_frame(), 3);
        let err = sprite.set_frame(4).expect_err("out of range");
        assert!(err.contains("out of range"));
        assert_eq!(sprite.current_frame(), 3, "cursor unchanged on error");
    }

    #[test]
    fn resolves_through_bus_delivery() {
        let assets = MemoryAssets::new();
        assets.borrow_mut().insert_image("textures/duck.png", 40, 10);
        let mut bus = MessageBus::new();

        // Create before any load; the sprite waits on the message.
        let empty_assets = MemoryAssets::new();
        let sprite = AnimatedSprite::create(
            &sprite_info(4, vec![0, 1]),
            &duck_materials(),
            empty_assets,
            &mut bus,
        )
        .expect("create");
        assert!(!sprite.borrow().is_resolved());

        assets
            .borrow_mut()
            .load_asset("textures/duck.png", &mut bus)
            .expect("load");
        bus.update(0.0).expect("delivery");
        assert!(sprite.borrow().is_resolved());
    }

    #[test]
    fn resolves_by_polling_the_store() {
        let assets = MemoryAssets::new();
        let mut bus = MessageBus::new();
        let sprite = AnimatedSprite::create(
            &sprite_info(4, vec![0, 1]),
            &duck_materials(),
            assets.clone(),
            &mut bus,
        )
        .expect("create");
        assert!(!sprite.borrow().is_resolved());

        // Asset appears in the cache without a message reaching the sprite.
        assets.borrow_mut().insert_image("textures/duck.png", 40, 10);
        sprite.borrow_mut().update(16.0);
        assert!(sprite.borrow().is_resolved());
    }

    #[test]
    fn quad_uses_the_diagonal_vertex_order() {
        let assets = MemoryAssets::new();
        assets.borrow_mut().insert_image("textures/duck.png", 40, 10);
        let mut bus = MessageBus::new();
        let sprite = AnimatedSprite::create(
            &sprite_info(4, vec![1]),
            &duck_materials(),
            assets,
            &mut bus,
        )
        .expect("create");

        let quad = sprite.borrow().quad(Vec2::new(5.0, 7.0));
        assert_eq!(quad.texture, "textures/duck.png");
        let uv: Vec<[f32; 2]> = quad.vertices.iter().map(|v| v.tex_coords).collect();
        assert_eq!(uv[0], [0.25, 0.0]);
        assert_eq!(uv[1], [0.25, 1.0]);
        assert_eq!(uv[2], [0.5, 1.0]);
        assert_eq!(uv[3], [0.5, 1.0]);
        assert_eq!(uv[4], [0.5, 0.0]);
        assert_eq!(uv[5], [0.25, 0.0]);
        assert_eq!(quad.vertices[0].position, [5.0, 7.0]);
        assert_eq!(quad.vertices[2].position, [15.0, 17.0]);
    }

    #[test]
    fn info_from_json_validates_required_fields() {
        let good = serde_json::json!({
            "name": "walker",
            "materialName": "duck",
            "frameWidth": 10.0,
            "frameHeight": 10.0,
            "frameCount": 4,
            "frameSequence": [0, 1, 2, 3]
        });
        let info = AnimatedSpriteInfo::from_json(&good).expect("valid info");
        assert_eq!(info.width, 10.0, "width defaults to frame width");
        assert_eq!(info.frame_time_ms, 33.0);
        assert!(info.auto_play);

        let missing = serde_json::json!({
            "name": "walker",
            "materialName": "duck",
            "frameHeight": 10.0,
            "frameCount": 4,
            "frameSequence": [0]
        });
        let err = AnimatedSpriteInfo::from_json(&missing).expect_err("frameWidth required");
        assert!(err.contains("frameWidth"));

        let bad_sequence = serde_json::json!({
            "name": "walker",
            "materialName": "duck",
            "frameWidth": 10.0,
            "frameHeight": 10.0,
            "frameCount": 2,
            "frameSequence": [0, 5]
        });
        let err = AnimatedSpriteInfo::from_json(&bad_sequence).expect_err("entry out of range");
        assert!(err.contains("exceeds frame count"));
    }

    #[test]
    fn unknown_material_fails_creation() {
        let assets = MemoryAssets::new();
        let mut bus = MessageBus::new();
        let mut info = sprite_info(4, vec![0]);
        info.material_name = "ghost".to_string();
        let err = AnimatedSprite::create(&info, &duck_materials(), assets, &mut bus)
            .map(|_| ())
            .expect_err("unknown material");
        assert!(err.contains("ghost"));
    }
}
