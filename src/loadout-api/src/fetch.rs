//! Upstream catalog fetching with a disk cache.
//!
//! Two GraphQL queries (weapons, mods) parameterized by language and game
//! mode. Raw responses and processed lookups are cached to disk under a
//! versioned `{timestamp, version, data}` envelope with a 1 hour TTL.

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use loadout::catalog::RawItem;
use loadout::ItemLookup;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Cache entries older than this are refetched.
pub const CACHE_TTL: Duration = Duration::from_secs(3600);
/// Bumping this invalidates every cached entry.
pub const CACHE_VERSION: u32 = 1;

const API_URL: &str = "https://api.tarkov.dev/graphql";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);
const MAX_RETRIES: u32 = 3;

pub const GUNS_QUERY: &str = r#"
query Guns($lang: LanguageCode, $gameMode: GameMode) {
  items(lang: $lang, gameMode: $gameMode, types: [gun]) {
    id
    name
    shortName
    weight
    iconLink
    imageLink
    image512pxLink
    bsgCategory { id name }
    buyFor {
      priceRUB
      source
      vendor { name normalizedName ... on TraderOffer { minTraderLevel } }
    }
    conflictingItems { id }
    properties {
      ... on ItemPropertiesWeapon {
        caliber
        ergonomics
        recoilVertical
        recoilHorizontal
        defaultErgonomics
        defaultRecoilVertical
        defaultRecoilHorizontal
        sightingRange
        defaultPreset { iconLink imageLink image512pxLink gridImageLink }
        presets {
          id
          name
          shortName
          iconLink
          imageLink
          image512pxLink
          gridImageLink
          baseImageLink
          containsItems { item { id } }
          buyFor {
            priceRUB
            source
            vendor { name normalizedName ... on TraderOffer { minTraderLevel } }
          }
        }
        slots { id name nameId required filters { allowedItems { id } } }
      }
    }
  }
}
"#;

pub const MODS_QUERY: &str = r#"
query Mods($lang: LanguageCode, $gameMode: GameMode) {
  items(lang: $lang, gameMode: $gameMode, types: [mods]) {
    id
    name
    shortName
    weight
    iconLink
    imageLink
    image512pxLink
    ergonomicsModifier
    recoilModifier
    minLevelForFlea
    bsgCategory { id name }
    buyFor {
      priceRUB
      source
      vendor { name normalizedName ... on TraderOffer { minTraderLevel } }
    }
    conflictingItems { id }
    properties {
      ... on ItemPropertiesWeaponMod {
        ergonomics
        recoilModifier
        slots { id name nameId required filters { allowedItems { id } } }
      }
      ... on ItemPropertiesMagazine {
        capacity
        ergonomics
        slots { id name nameId required filters { allowedItems { id } } }
      }
      ... on ItemPropertiesScope {
        ergonomics
        sightingRange
        recoilModifier
        slots { id name nameId required filters { allowedItems { id } } }
      }
      ... on ItemPropertiesBarrel {
        ergonomics
        recoilModifier
        slots { id name nameId required filters { allowedItems { id } } }
      }
    }
  }
}
"#;

#[derive(Debug, Serialize, Deserialize)]
struct CacheEnvelope {
    timestamp: u64,
    version: u32,
    data: Value,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ItemsPayload {
    items: Vec<RawItem>,
}

/// GraphQL catalog client with a file-backed cache.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    cache_dir: PathBuf,
}

impl CatalogClient {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            http: reqwest::Client::new(),
            cache_dir: cache_dir.into(),
        }
    }

    /// Fetch the raw weapon and mod catalogs for one language/game mode.
    pub async fn fetch_catalog(
        &self,
        lang: &str,
        game_mode: &str,
    ) -> Result<(Vec<RawItem>, Vec<RawItem>)> {
        let variables = json!({ "lang": lang, "gameMode": game_mode });
        let guns: ItemsPayload = serde_json::from_value(self.run_query(GUNS_QUERY, &variables).await?)
            .context("malformed weapons payload")?;
        let mods: ItemsPayload = serde_json::from_value(self.run_query(MODS_QUERY, &variables).await?)
            .context("malformed mods payload")?;
        Ok((guns.items, mods.items))
    }

    /// Execute one GraphQL query, serving from the disk cache when fresh.
    pub async fn run_query(&self, query: &str, variables: &Value) -> Result<Value> {
        let cache_path = self.query_cache_path(query, variables);
        if let Some(data) = load_envelope(&cache_path) {
            return Ok(data);
        }

        tracing::info!("fetching catalog data from upstream API");
        let mut last_error = None;
        for attempt in 1..=MAX_RETRIES {
            match self.post_query(query, variables).await {
                Ok(data) => {
                    if let Err(e) = save_envelope(&cache_path, &data) {
                        tracing::warn!(error = %e, "failed to write query cache");
                    }
                    return Ok(data);
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "API request failed");
                    last_error = Some(e);
                    if attempt < MAX_RETRIES {
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                    }
                }
            }
        }
        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("failed to fetch data from API")))
    }

    async fn post_query(&self, query: &str, variables: &Value) -> Result<Value> {
        let response = self
            .http
            .post(API_URL)
            .timeout(REQUEST_TIMEOUT)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?
            .error_for_status()?;
        let body: GraphQlResponse = response.json().await?;
        if !body.errors.is_empty() {
            bail!("GraphQL errors: {:?}", body.errors);
        }
        body.data.context("GraphQL response carried no data")
    }

    /// Load a processed lookup from the cache, if fresh.
    pub fn load_processed(&self, lang: &str, game_mode: &str) -> Option<ItemLookup> {
        let data = load_envelope(&self.processed_cache_path(lang, game_mode))?;
        serde_json::from_value(data).ok()
    }

    /// Persist a processed lookup.
    pub fn save_processed(&self, lang: &str, game_mode: &str, lookup: &ItemLookup) -> Result<()> {
        let data = serde_json::to_value(lookup)?;
        save_envelope(&self.processed_cache_path(lang, game_mode), &data)
    }

    fn query_cache_path(&self, query: &str, variables: &Value) -> PathBuf {
        // serde_json maps are ordered by key, so the digest is stable.
        let canonical = variables.to_string();
        let digest = md5::compute(format!("{query}{canonical}"));
        self.cache_dir.join(format!("{digest:x}.json"))
    }

    fn processed_cache_path(&self, lang: &str, game_mode: &str) -> PathBuf {
        let digest = md5::compute(format!("processed_{lang}_{game_mode}_v{CACHE_VERSION}"));
        self.cache_dir.join(format!("processed_{digest:x}.json"))
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Read a cache file; `None` on miss, version mismatch or expiry.
fn load_envelope(path: &std::path::Path) -> Option<Value> {
    let raw = std::fs::read_to_string(path).ok()?;
    let envelope: CacheEnvelope = serde_json::from_str(&raw).ok()?;
    if envelope.version != CACHE_VERSION {
        return None;
    }
    if now_secs().saturating_sub(envelope.timestamp) >= CACHE_TTL.as_secs() {
        return None;
    }
    Some(envelope.data)
}

fn save_envelope(path: &std::path::Path, data: &Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let envelope = CacheEnvelope {
        timestamp: now_secs(),
        version: CACHE_VERSION,
        data: data.clone(),
    };
    std::fs::write(path, serde_json::to_string(&envelope)?)?;
    Ok(())
}
