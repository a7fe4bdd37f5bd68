//! Component construction from zone JSON.
//!
//! Builders are registered under the "type" string a zone file uses. Keys
//! are validated for uniqueness at registration, so a colliding builder is
//! caught at startup instead of silently shadowing an earlier one.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use glam::Vec2;
use serde_json::Value;

use gust_core::assets::AssetStore;
use gust_core::bus::MessageBus;

use crate::material::MaterialRegistry;
use crate::sprite::{AnimatedSprite, AnimatedSpriteInfo, SpriteQuad};

/// Services a builder may need while constructing a component.
pub struct BuildContext<'a> {
    pub materials: &'a MaterialRegistry,
    pub assets: &'a Rc<RefCell<dyn AssetStore>>,
    pub bus: &'a mut MessageBus,
}

pub enum Component {
    AnimatedSprite(Rc<RefCell<AnimatedSprite>>),
}

impl Component {
    pub fn load(&self, bus: &mut MessageBus) {
        match self {
            Component::AnimatedSprite(sprite) => sprite.borrow_mut().request_texture(bus),
        }
    }

    pub fn update(&self, dt_ms: f64) {
        match self {
            Component::AnimatedSprite(sprite) => sprite.borrow_mut().update(dt_ms),
        }
    }

    pub fn collect(&self, offset: Vec2, out: &mut Vec<SpriteQuad>) {
        match self {
            Component::AnimatedSprite(sprite) => {
                let sprite = sprite.borrow();
                if sprite.is_resolved() {
                    out.push(sprite.quad(offset));
                }
            }
        }
    }
}

pub type ComponentBuilder = fn(&Value, &mut BuildContext) -> Result<Component, String>;

#[derive(Default)]
pub struct ComponentRegistry {
    builders: HashMap<String, ComponentBuilder>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in component types.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        // Keys are unique in a fresh registry.
        let _ = registry.register("animatedSprite", build_animated_sprite);
        registry
    }

    pub fn register(&mut self, key: &str, builder: ComponentBuilder) -> Result<(), String> {
        if self.builders.contains_key(key) {
            return Err(format!("Component builder '{key}' is already registered."));
        }
        self.builders.insert(key.to_string(), builder);
        Ok(())
    }

    pub fn build(&self, value: &Value, ctx: &mut BuildContext) -> Result<Component, String> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| "Component is missing a 'type' field.".to_string())?;
        let builder = self
            .builders
            .get(kind)
            .ok_or_else(|| format!("No component builder registered for type '{kind}'."))?;
        builder(value, ctx)
    }
}

fn build_animated_sprite(value: &Value, ctx: &mut BuildContext) -> Result<Component, String> {
    let info = AnimatedSpriteInfo::from_json(value)?;
    let sprite = AnimatedSprite::create(&info, ctx.materials, ctx.assets.clone(), ctx.bus)?;
    Ok(Component::AnimatedSprite(sprite))
}
