//! Asset loading contract and the file-backed store.
//!
//! Loads announce completion through the bus rather than returning payloads
//! directly, so consumers that requested an asset earlier (or that subscribe
//! later and re-request) all observe the same `ASSET_LOADED::<key>` message
//! during a bus update.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::bus::{MessageBus, MessageContext};

/// Completion message prefix. The full code is `ASSET_LOADED::<key>` so
/// subscribers can filter per asset without inspecting the context.
pub const ASSET_LOADED_PREFIX: &str = "ASSET_LOADED::";

pub fn asset_loaded_code(key: &str) -> String {
    format!("{ASSET_LOADED_PREFIX}{key}")
}

/// Decoded asset data, shared by reference between the store's cache and any
/// number of completion messages.
#[derive(Debug)]
pub enum AssetPayload {
    Json(serde_json::Value),
    Text(String),
    Image {
        width: u32,
        height: u32,
        rgba: Vec<u8>,
    },
}

impl AssetPayload {
    pub fn image_size(&self) -> Option<(u32, u32)> {
        match self {
            AssetPayload::Image { width, height, .. } => Some((*width, *height)),
            _ => None,
        }
    }
}

/// Capability the engine and zone manager depend on. Implementations decide
/// where bytes come from; completions always travel through the bus.
pub trait AssetStore {
    /// Begin (or replay) a load. If the asset is already cached the
    /// completion message is re-posted so late subscribers still hear it.
    fn load_asset(&mut self, key: &str, bus: &mut MessageBus) -> Result<(), String>;

    fn is_asset_loaded(&self, key: &str) -> bool;

    fn get_asset(&self, key: &str) -> Option<Arc<AssetPayload>>;
}

/// Disk-backed store rooted at a directory. Decoding is keyed on the file
/// extension: `.json` parses, `.png` decodes to RGBA8, anything else is text.
pub struct FileAssetStore {
    root: PathBuf,
    cache: HashMap<String, Arc<AssetPayload>>,
}

impl FileAssetStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            cache: HashMap::new(),
        }
    }

    fn decode(&self, key: &str, bytes: Vec<u8>) -> Result<AssetPayload, String> {
        let extension = Path::new(key)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        match extension.as_str() {
            "json" => {
                let value: serde_json::Value = serde_json::from_slice(&bytes)
                    .map_err(|e| format!("Failed to parse asset '{key}' as JSON: {e}"))?;
                Ok(AssetPayload::Json(value))
            }
            "png" => {
                let decoded = image::load_from_memory(&bytes)
                    .map_err(|e| format!("Failed to decode image asset '{key}': {e}"))?;
                let rgba = decoded.to_rgba8();
                Ok(AssetPayload::Image {
                    width: rgba.width(),
                    height: rgba.height(),
                    rgba: rgba.into_raw(),
                })
            }
            _ => {
                let text = String::from_utf8(bytes)
                    .map_err(|e| format!("Asset '{key}' is not valid UTF-8: {e}"))?;
                Ok(AssetPayload::Text(text))
            }
        }
    }
}

impl AssetStore for FileAssetStore {
    fn load_asset(&mut self, key: &str, bus: &mut MessageBus) -> Result<(), String> {
        if let Some(payload) = self.cache.get(key) {
            bus.post(
                &asset_loaded_code(key),
                MessageContext::AssetLoaded {
                    key: key.to_string(),
                    payload: payload.clone(),
                },
            );
            return Ok(());
        }

        let path = self.root.join(key);
        let bytes = std::fs::read(&path)
            .map_err(|e| format!("Failed to read asset '{key}' from {path:?}: {e}"))?;
        let size = bytes.len();
        let payload = Arc::new(self.decode(key, bytes)?);
        self.cache.insert(key.to_string(), payload.clone());
        log::info!("loaded asset '{key}' ({size} bytes)");
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
