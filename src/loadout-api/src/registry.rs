//! Per-(language, game-mode) catalog registry.
//!
//! Catalog entries are populated lazily with a single-flight guarantee and
//! shared read-only behind `Arc`s. Each entry carries its own per-weapon
//! compatibility-map cache, likewise built once on first use.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use loadout::{build_compatibility_map, build_item_lookup, CompatibilityMap, ItemLookup};
use tokio::sync::{Mutex, RwLock};

use crate::fetch::CatalogClient;

pub const SUPPORTED_LANGUAGES: [&str; 16] = [
    "en", "ru", "zh", "es", "de", "fr", "it", "ja", "ko", "pl", "pt", "tr", "cs", "hu", "ro", "sk",
];
pub const SUPPORTED_GAME_MODES: [&str; 2] = ["regular", "pve"];

/// Normalize a language code; region suffixes are stripped and unknown
/// codes fall back to `en`.
pub fn normalize_lang(lang: &str) -> &'static str {
    let short = lang.split('-').next().unwrap_or(lang);
    SUPPORTED_LANGUAGES
        .iter()
        .find(|l| **l == short)
        .copied()
        .unwrap_or("en")
}

/// Normalize a game mode; unknown modes fall back to `regular`.
pub fn normalize_game_mode(mode: &str) -> &'static str {
    SUPPORTED_GAME_MODES
        .iter()
        .find(|m| **m == mode)
        .copied()
        .unwrap_or("regular")
}

/// One loaded catalog with its per-weapon compatibility cache.
pub struct CatalogEntry {
    pub lookup: Arc<ItemLookup>,
    compat: RwLock<HashMap<String, Arc<CompatibilityMap>>>,
    compat_build: Mutex<()>,
}

impl CatalogEntry {
    pub fn new(lookup: ItemLookup) -> Self {
        Self {
            lookup: Arc::new(lookup),
            compat: RwLock::new(HashMap::new()),
            compat_build: Mutex::new(()),
        }
    }

    /// Get or build the compatibility map for a weapon. Builds are
    /// serialized; reads are concurrent.
    pub async fn compatibility(
        &self,
        weapon_id: &str,
    ) -> Result<Arc<CompatibilityMap>, loadout::Error> {
        if let Some(map) = self.compat.read().await.get(weapon_id) {
            return Ok(map.clone());
        }
        let _guard = self.compat_build.lock().await;
        if let Some(map) = self.compat.read().await.get(weapon_id) {
            return Ok(map.clone());
        }
        let map = Arc::new(build_compatibility_map(weapon_id, &self.lookup)?);
        self.compat
            .write()
            .await
            .insert(weapon_id.to_string(), map.clone());
        Ok(map)
    }
}

/// Registry of catalog entries keyed by (language, game mode).
pub struct CatalogRegistry {
    client: CatalogClient,
    entries: RwLock<HashMap<(String, String), Arc<CatalogEntry>>>,
    load_lock: Mutex<()>,
}

impl CatalogRegistry {
    pub fn new(client: CatalogClient) -> Self {
        Self {
            client,
            entries: RwLock::new(HashMap::new()),
            load_lock: Mutex::new(()),
        }
    }

    /// Get or load the entry for a language/game mode. A failed load falls
    /// back to the resident `en`/`regular` entry when available.
    pub async fn entry(&self, lang: &str, game_mode: &str) -> Result<Arc<CatalogEntry>> {
        let lang = normalize_lang(lang);
        let game_mode = normalize_game_mode(game_mode);
        let key = (lang.to_string(), game_mode.to_string());

        if let Some(entry) = self.entries.read().await.get(&key) {
            return Ok(entry.clone());
        }

        let _guard = self.load_lock.lock().await;
        if let Some(entry) = self.entries.read().await.get(&key) {
            return Ok(entry.clone());
        }

        tracing::info!(lang, game_mode, "loading catalog on demand");
        match self.load(lang, game_mode).await {
            Ok(entry) => {
                self.entries.write().await.insert(key, entry.clone());
                Ok(entry)
            }
            Err(e) => {
                tracing::error!(lang, game_mode, error = %e, "catalog load failed");
                let fallback = ("en".to_string(), "regular".to_string());
                if let Some(entry) = self.entries.read().await.get(&fallback) {
                    return Ok(entry.clone());
                }
                Err(e)
            }
        }
    }

    async fn load(&self, lang: &str, game_mode: &str) -> Result<Arc<CatalogEntry>> {
        if let Some(lookup) = self.client.load_processed(lang, game_mode) {
            tracing::info!(lang, game_mode, items = lookup.len(), "loaded from processed cache");
            return Ok(Arc::new(CatalogEntry::new(lookup)));
        }

        let (guns, mods) = self.client.fetch_catalog(lang, game_mode).await?;
        let lookup = build_item_lookup(&guns, &mods);
        if let Err(e) = self.client.save_processed(lang, game_mode, &lookup) {
            tracing::warn!(error = %e, "failed to write processed cache");
        }
        Ok(Arc::new(CatalogEntry::new(lookup)))
    }

    /// Warm up English in both game modes; other combinations load on
    /// demand. Failures are logged, not fatal.
    pub async fn preload(&self) {
        for game_mode in SUPPORTED_GAME_MODES {
            match self.entry("en", game_mode).await {
                Ok(entry) => {
                    tracing::info!(game_mode, items = entry.lookup.len(), "catalog ready");
                }
                Err(e) => {
                    tracing::error!(game_mode, error = %e, "startup load failed");
                }
            }
        }
    }

    /// Resident `lang/mode` keys, for the liveness endpoint.
    pub async fn loaded_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .await
            .keys()
            .map(|(lang, mode)| format!("{lang}/{mode}"))
            .collect();
        keys.sort();
        keys
    }
}
