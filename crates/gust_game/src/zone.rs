//! Zone (scene) lifecycle management.
//!
//! Zones are described by JSON assets and registered by numeric id. Changing
//! zones always finishes tearing down the outgoing zone before the incoming
//! one is touched: deactivate, unload, clear, then load. If the incoming
//! zone's asset is not cached yet the manager subscribes itself to that
//! asset's completion message and finishes the change during a later bus
//! update; the subscription is one-shot and removed as soon as it fires.
//!
//! Overlapping `change_zone` calls are not guarded. The pending asset key
//! means a completion for a superseded request is simply ignored.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use glam::Vec2;
use serde::Deserialize;
use serde_json::Value;

use gust_core::assets::{asset_loaded_code, AssetPayload, AssetStore};
use gust_core::bus::{Message, MessageBus, MessageContext, MessageHandler};

use crate::material::MaterialRegistry;
use crate::registry::{BuildContext, Component, ComponentRegistry};
use crate::sprite::SpriteQuad;

pub const MSG_ZONE_ACTIVATED: &str = "ZONE_ACTIVATED";
pub const MSG_ZONE_DEACTIVATED: &str = "ZONE_DEACTIVATED";

#[derive(Debug, Deserialize)]
struct ZoneFileJson {
    id: Option<u32>,
    name: Option<String>,
    description: Option<String>,
    #[serde(default)]
    objects: Vec<GameObjectJson>,
}

#[derive(Debug, Deserialize)]
struct GameObjectJson {
    name: Option<String>,
    position: Option<PointJson>,
    #[serde(default)]
    components: Vec<Value>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct PointJson {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZonePhase {
    Created,
    Active,
    Unloaded,
}

pub struct GameObject {
    pub name: String,
    pub position: Vec2,
    pub components: Vec<Component>,
}

pub struct Zone {
    pub id: u32,
    pub name: String,
    pub description: String,
    phase: ZonePhase,
    objects: Vec<GameObject>,
}

impl Zone {
    fn new(id: u32, name: String, description: String) -> Self {
        Self {
            id,
            name,
            description,
            phase: ZonePhase::Created,
            objects: Vec::new(),
        }
    }

    pub fn phase(&self) -> ZonePhase {
        self.phase
    }

    fn initialize(
        &mut self,
        objects: Vec<GameObjectJson>,
        registry: &ComponentRegistry,
        ctx: &mut BuildContext,
    ) -> Result<(), String> {
        for object_json in objects {
            let mut components = Vec::new();
            for component_json in &object_json.components {
                components.push(registry.build(component_json, ctx)?);
            }
            self.objects.push(GameObject {
                name: object_json.name.unwrap_or_else(|| "object".to_string()),
                position: object_json
                    .position
                    .map(|p| Vec2::new(p.x, p.y))
                    .unwrap_or(Vec2::ZERO),
                components,
            });
        }
        Ok(())
    }

    fn on_activated(&mut self, bus: &mut MessageBus) {
        self.phase = ZonePhase::Active;
        bus.post(MSG_ZONE_ACTIVATED, MessageContext::Zone { id: self.id });
    }

    fn on_deactivated(&mut self, bus: &mut MessageBus) {
        bus.post(MSG_ZONE_DEACTIVATED, MessageContext::Zone { id: self.id });
    }

    /// Kick off the asset loads the zone's components depend on.
    fn load(&mut self, bus: &mut MessageBus) {
        for object in &self.objects {
            for component in &object.components {
                component.load(bus);
            }
        }
    }

    fn unload(&mut self) {
        self.phase = ZonePhase::Unloaded;
        // Dropping the objects drops their sprites; the bus prunes the dead
        // subscriptions on its next update.
        self.objects.clear();
    }

    pub fn update(&mut self, dt_ms: f64) {
        for object in &self.objects {
            for component in &object.components {
                component.update(dt_ms);
            }
        }
    }

    pub fn collect_sprites(&self, out: &mut Vec<SpriteQuad>) {
        for object in &self.objects {
            for component in &object.components {
                component.collect(object.position, out);
            }
        }
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }
}

pub struct ZoneManager {
    registered: HashMap<u32, String>,
    active: Option<Zone>,
    pending: Option<(u32, String)>,
    assets: Rc<RefCell<dyn AssetStore>>,
    materials: Rc<RefCell<MaterialRegistry>>,
    components: Rc<ComponentRegistry>,
    self_weak: Option<Weak<RefCell<ZoneManager>>>,
    zones_built: u64,
}

impl ZoneManager {
    pub fn create(
        assets: Rc<RefCell<dyn AssetStore>>,
        materials: Rc<RefCell<MaterialRegistry>>,
        components: Rc<ComponentRegistry>,
    ) -> Rc<RefCell<ZoneManager>> {
        let manager = Rc::new(RefCell::new(ZoneManager {
            registered: HashMap::new(),
            active: None,
            pending: None,
            assets,
            materials,
            components,
            self_weak: None,
            zones_built: 0,
        }));
        manager.borrow_mut().self_weak = Some(Rc::downgrade(&manager));
        manager
    }

    /// Register the boot zone under id 0.
    pub fn initialize(&mut self, zone_asset: &str) {
        self.register_zone(0, zone_asset);
    }

    pub fn register_zone(&mut self, id: u32, asset_key: &str) {
        if let Some(previous) = self.registered.insert(id, asset_key.to_string()) {
            log::warn!("zone id {id} re-registered (was '{previous}', now '{asset_key}')");
        }
    }

    pub fn active_zone_id(&self) -> Option<u32> {
        self.active.as_ref().map(|z| z.id)
    }

    /// Total zones constructed over the manager's lifetime.
    pub fn zones_built(&self) -> u64 {
        self.zones_built
    }

    /// Switch to a registered zone. The outgoing zone is deactivated and
    /// unloaded before the incoming one is loaded; if the incoming zone's
    /// asset is not cached the switch completes asynchronously on a later
    /// bus update.
    pub fn change_zone(&mut self, id: u32, bus: &mut MessageBus) -> Result<(), String> {
        if let Some(mut outgoing) = self.active.take() {
            outgoing.on_deactivated(bus);
            outgoing.unload();
        }

        let asset_key = self
            .registered
            .get(&id)
            .cloned()
            .ok_or_else(|| format!("No zone registered with id {id}."))?;

        let cached = self.assets.borrow().get_asset(&asset_key);
        if let Some(payload) = cached {
            return self.load_zone(&payload, bus);
        }

        let code = asset_loaded_code(&asset_key);
        self.subscribe_self(&code, bus);
        self.pending = Some((id, asset_key.clone()));
        self.assets.borrow_mut().load_asset(&asset_key, bus)
    }

    /// Build and activate a zone from its decoded asset.
    fn load_zone(&mut self, payload: &AssetPayload, bus: &mut MessageBus) -> Result<(), String> {
        let value = match payload {
            AssetPayload::Json(value) => value,
            _ => return Err("Zone file format error: zone asset is not JSON.".to_string()),
        };
        let file: ZoneFileJson = serde_json::from_value(value.clone())
            .map_err(|e| format!("Zone file format error: {e}"))?;

        let id = file
            .id
            .ok_or_else(|| "Zone file format error: zone id not present.".to_string())?;
        let name = file
            .name
            .ok_or_else(|| "Zone file format error: zone name not present.".to_string())?;
        let description = file.description.unwrap_or_default();

        log::info!("loading zone {id} '{name}'");
        let mut zone = Zone::new(id, name, description);
        {
            let materials = self.materials.borrow();
            let components = self.components.clone();
            let mut ctx = BuildContext {
                materials: &materials,
                assets: &self.assets,
                bus,
            };
            zone.initialize(file.objects, &components, &mut ctx)?;
        }
        zone.on_activated(bus);
        zone.load(bus);
        self.active = Some(zone);
        self.zones_built += 1;
        Ok(())
    }

    pub fn update(&mut self, dt_ms: f64) {
        if let Some(zone) = &mut self.active {
            zone.update(dt_ms);
        }
    }

    pub fn collect_sprites(&self, out: &mut Vec<SpriteQuad>) {
        if let Some(zone) = &self.active {
            zone.collect_sprites(out);
        }
    }

    fn subscribe_self(&self, code: &str, bus: &mut MessageBus) {
        let rc = self.self_weak.as_ref().and_then(|weak| weak.upgrade());
        if let Some(rc) = rc {
            let as_handler: Rc<RefCell<dyn MessageHandler>> = rc;
            bus.subscribe(code, Rc::downgrade(&as_handler));
        }
    }
}

impl MessageHandler for ZoneManager {
    fn on_message(&mut self, message: &Message, bus: &mut MessageBus) -> Result<(), String> {
        let (key, payload) = match &message.context {
            MessageContext::AssetLoaded { key, payload } => (key.clone(), payload.clone()),
            _ => return Ok(()),
        };
        let pending_key = match &self.pending {
            Some((_, pending_key)) => pending_key.clone(),
            None => return Ok(()),
        };
        if key != pending_key {
            // Completion for a superseded zone change.
            return Ok(());
        }

        bus.remove_code(&message.code);
        self.pending = None;
        self.load_zone(&payload, bus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use gust_core::assets::FileAssetStore;

    fn temp_asset_root() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "gust_zones_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.subsec_nanos())
                .unwrap_or(0)
        ));
        std::fs::create_dir_all(&dir).expect("temp zone dir");
        dir
    }

    fn write_zone(root: &PathBuf, key: &str, body: &str) {
        let path = root.join(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("zone parent dir");
        }
        std::fs::write(path, body).expect("write zone file");
    }

    fn services(root: &PathBuf) -> (
        Rc<RefCell<dyn AssetStore>>,
        Rc<RefCell<MaterialRegistry>>,
        Rc<ComponentRegistry>,
    ) {
        let assets: Rc<RefCell<dyn AssetStore>> =
            Rc::new(RefCell::new(FileAssetStore::new(root)));
        let mut materials = MaterialRegistry::new();
        materials
            .register("duck", "textures/duck.png")
            .expect("register material");
        (
            assets,
            Rc::new(RefCell::new(materials)),
            Rc::new(ComponentRegistry::with_builtin()),
        )
    }

    const ZONE_BODY: &str = r#"{
        "id": 0,
        "name": "test zone",
        "description": "boot zone",
        "objects": [
            {
                "name": "walker",
                "position": { "x": 20.0, "y": 30.0 },
                "components": [
                    {
                        "type": "animatedSprite",
                        "name": "walker sprite",
                        "materialName": "duck",
                        "frameWidth": 10.0,
                        "frameHeight": 10.0,
                        "frameCount": 4,
                        "frameSequence": [0, 1, 2, 3]
                    }
                ]
            }
        ]
    }"#;

    #[test]
    fn uncached_zone_builds_during_bus_update() {
        let root = temp_asset_root();
        write_zone(&root, "zones/test_zone.json", ZONE_BODY);
        let (assets, materials, components) = services(&root);
        let manager = ZoneManager::create(assets, materials, components);
        let mut bus = MessageBus::new();

        manager.borrow_mut().initialize("zones/test_zone.json");
        manager
            .borrow_mut()
            .change_zone(0, &mut bus)
            .expect("change starts");
        assert_eq!(manager.borrow().active_zone_id(), None, "asynchronous");

        bus.update(0.0).expect("delivery");
        assert_eq!(manager.borrow().active_zone_id(), Some(0));
        assert_eq!(manager.borrow().zones_built(), 1);

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn cached_zone_loads_synchronously() {
        let root = temp_asset_root();
        write_zone(&root, "zones/test_zone.json", ZONE_BODY);
        let (assets, materials, components) = services(&root);
        let manager = ZoneManager::create(assets.clone(), materials, components);
        let mut bus = MessageBus::new();

        // Warm the cache first.
        assets
            .borrow_mut()
            .load_asset("zones/test_zone.json", &mut bus)
            .expect("warm cache");
        bus.update(0.0).expect("drain");

        manager.borrow_mut().initialize("zones/test_zone.json");
        manager
            .borrow_mut()
            .change_zone(0, &mut bus)
            .expect("change");
        assert_eq!(manager.borrow().active_zone_id(), Some(0), "synchronous");

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn loader_subscription_is_one_shot() {
        let root = temp_asset_root();
        write_zone(&root, "zones/test_zone.json", ZONE_BODY);
        let (assets, materials, components) = services(&root);
        let manager = ZoneManager::create(assets, materials, components);
        let mut bus = MessageBus::new();

        manager.borrow_mut().initialize("zones/test_zone.json");
        manager
            .borrow_mut()
            .change_zone(0, &mut bus)
            .expect("change starts");
        let code = asset_loaded_code("zones/test_zone.json");
        assert_eq!(bus.subscriber_count(&code), 1);

        bus.update(0.0).expect("delivery");
        assert_eq!(bus.subscriber_count(&code), 0, "removed after firing");

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn deactivation_precedes_the_next_activation() {
        struct LifecycleRecorder {
            events: Vec<(String, u32)>,
        }
        impl MessageHandler for LifecycleRecorder {
            fn on_message(&mut self, message: &Message, _bus: &mut MessageBus) -> Result<(), String> {
                if let MessageContext::Zone { id } = message.context {
                    self.events.push((message.code.clone(), id));
                }
                Ok(())
            }
        }

        let root = temp_asset_root();
        write_zone(&root, "zones/test_zone.json", ZONE_BODY);
        write_zone(
            &root,
            "zones/second.json",
            r#"{ "id": 1, "name": "second zone" }"#,
        );
        let (assets, materials, components) = services(&root);
        let manager = ZoneManager::create(assets, materials, components);
        let mut bus = MessageBus::new();

        let recorder = Rc::new(RefCell::new(LifecycleRecorder { events: Vec::new() }));
        let as_handler: Rc<RefCell<dyn MessageHandler>> = recorder.clone();
        bus.subscribe(MSG_ZONE_ACTIVATED, Rc::downgrade(&as_handler));
        bus.subscribe(MSG_ZONE_DEACTIVATED, Rc::downgrade(&as_handler));

        manager.borrow_mut().initialize("zones/test_zone.json");
        manager.borrow_mut().register_zone(1, "zones/second.json");

        manager.borrow_mut().change_zone(0, &mut bus).expect("first");
        bus.update(0.0).expect("drain");
        manager.borrow_mut().change_zone(1, &mut bus).expect("second");
        bus.update(0.0).expect("drain");
        bus.update(0.0).expect("drain follow-up");

        let events = recorder.borrow().events.clone();
        assert_eq!(
            events,
            vec![
                (MSG_ZONE_ACTIVATED.to_string(), 0),
                (MSG_ZONE_DEACTIVATED.to_string(), 0),
                (MSG_ZONE_ACTIVATED.to_string(), 1),
            ]
        );
        assert_eq!(manager.borrow().zones_built(), 2);

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn repeated_change_to_the_same_zone_rebuilds_it() {
        let root = temp_asset_root();
        write_zone(&root, "zones/test_zone.json", ZONE_BODY);
        let (assets, materials, components) = services(&root);
        let manager = ZoneManager::create(assets, materials, components);
        let mut bus = MessageBus::new();

        manager.borrow_mut().initialize("zones/test_zone.json");
        manager.borrow_mut().change_zone(0, &mut bus).expect("first");
        bus.update(0.0).expect("drain");
        assert_eq!(manager.borrow().zones_built(), 1);

        // The asset is cached now, so the second change is synchronous and
        // still constructs a fresh zone.
        manager.borrow_mut().change_zone(0, &mut bus).expect("second");
        assert_eq!(manager.borrow().zones_built(), 2);
        assert_eq!(manager.borrow().active_zone_id(), Some(0));

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn unregistered_zone_id_is_an_error() {
        let root = temp_asset_root();
        let (assets, materials, components) = services(&root);
        let manager = ZoneManager::create(assets, materials, components);
        let mut bus = MessageBus::new();

        let err = manager
            .borrow_mut()
            .change_zone(7, &mut bus)
            .expect_err("unregistered id");
        assert!(err.contains("7"));

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn zone_without_name_fails_and_leaves_no_active_zone() {
        let root = temp_asset_root();
        write_zone(&root, "zones/bad.json", r#"{ "id": 0 }"#);
        let (assets, materials, components) = services(&root);
        let manager = ZoneManager::create(assets, materials, components);
        let mut bus = MessageBus::new();

        manager.borrow_mut().initialize("zones/bad.json");
        manager
            .borrow_mut()
            .change_zone(0, &mut bus)
            .expect("load starts");
        let err = bus.update(0.0).expect_err("name required");
        assert!(err.contains("zone name not present"));
        assert_eq!(manager.borrow().active_zone_id(), None);

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn zone_without_id_fails() {
        let root = temp_asset_root();
        write_zone(&root, "zones/bad.json", r#"{ "name": "nameless" }"#);
        let (assets, materials, components) = services(&root);
        let manager = ZoneManager::create(assets, materials, components);
        let mut bus = MessageBus::new();

        manager.borrow_mut().initialize("zones/bad.json");
        manager
            .borrow_mut()
            .change_zone(0, &mut bus)
            .expect("load starts");
        let err = bus.update(0.0).expect_err("id required");
        assert!(err.contains("zone id not present"));

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn active_zone_objects_update_and_collect() {
        let root = temp_asset_root();
        write_zone(&root, "zones/test_zone.json", ZONE_BODY);
        let (assets, materials, components) = services(&root);
        let manager = ZoneManager::create(assets, materials, components);
        let mut bus = MessageBus::new();

        manager.borrow_mut().initialize("zones/test_zone.json");
        manager.borrow_mut().change_zone(0, &mut bus).expect("change");
        bus.update(0.0).expect("drain");

        {
            let manager = manager.borrow();
            let zone = manager.active.as_ref().expect("active zone");
            assert_eq!(zone.phase(), ZonePhase::Active);
            assert_eq!(zone.object_count(), 1);
            assert_eq!(zone.description, "boot zone");
        }

        // Texture never loads (no file), so the sprite stays unresolved and
        // contributes no quads; updating must still be safe.
        manager.borrow_mut().update(16.0);
        let mut quads = Vec::new();
        manager.borrow().collect_sprites(&mut quads);
        assert!(quads.is_empty());

        std::fs::remove_dir_all(&root).ok();
    }
}
