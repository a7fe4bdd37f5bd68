//! Material table: sprite-facing names mapped to diffuse texture asset keys.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub diffuse_texture: String,
}

#[derive(Default)]
pub struct MaterialRegistry {
    materials: HashMap<String, Material>,
}

impl MaterialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, diffuse_texture: &str) -> Result<(), String> {
        if self.materials.contains_key(name) {
            return Err(format!("Material '{name}' is already registered."));
        }
        self.materials.insert(
            name.to_string(),
            Material {
                name: name.to_string(),
                diffuse_texture: diffuse_texture.to_string(),
            },
        );
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Option<&Material> {
        self.materials.get(name)
    }

    pub fn diffuse_texture(&self, name: &str) -> Result<String, String> {
        self.materials
            .get(name)
            .map(|m| m.diffuse_texture.clone())
            .ok_or_else(|| format!("Unknown material '{name}'."))
    }
}
