//! Loadout optimizer API server.
//!
//! JSON/HTTP surface over the `loadout` core: weapon listings, per-weapon
//! mod listings, constrained loadout optimization and Pareto exploration,
//! backed by a lazily-populated per-language catalog registry.

mod fetch;
mod registry;

use std::sync::Arc;

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use loadout::{Constraints, OptimizeStatus, ParetoAxis, TraderLevels};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::{IntoParams, OpenApi, ToSchema};
use utoipa_scalar::{Scalar, Servable};

use crate::fetch::CatalogClient;
use crate::registry::{CatalogRegistry, SUPPORTED_GAME_MODES};

// =============================================================================
// CLI
// =============================================================================

#[derive(Parser)]
#[command(name = "loadout-api")]
#[command(about = "HTTP API server for the loadout weapon modification optimizer")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Start the API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8000")]
        port: u16,

        /// Bind address
        #[arg(short, long, default_value = "0.0.0.0")]
        bind: String,

        /// Directory for the catalog disk cache
        #[arg(short, long, env = "LOADOUT_CACHE_DIR", default_value = ".cache")]
        cache_dir: String,
    },
}

// =============================================================================
// App State
// =============================================================================

pub struct AppState {
    pub registry: CatalogRegistry,
}

// =============================================================================
// OpenAPI Schema
// =============================================================================

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Loadout Optimizer API",
        description = "Weapon modification loadout optimization",
        version = "0.1.0",
        license(name = "BSD-2-Clause"),
    ),
    paths(
        root,
        get_info,
        get_weapon_mods,
        run_optimization,
        run_exploration,
    ),
    components(schemas(
        RootResponse,
        GunSummary,
        InfoResponse,
        ModSummary,
        ModsResponse,
        TraderLevelsRequest,
        OptimizeRequest,
        ExploreRequest,
        ItemDetailResponse,
        PresetDetailResponse,
        FinalStatsResponse,
        OptimizeResponse,
        ExplorePointResponse,
        ExploreResponse,
    ))
)]
struct ApiDoc;

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Deserialize, IntoParams)]
pub struct LangQuery {
    /// Language code (en, ru, zh, ...); defaults to en.
    pub lang: Option<String>,
    /// Game mode (regular or pve); defaults to regular.
    pub game_mode: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RootResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub loaded: Vec<String>,
    pub game_modes: Vec<&'static str>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GunSummary {
    pub id: String,
    pub name: String,
    pub image: Option<String>,
    pub category: String,
    pub caliber: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InfoResponse {
    pub guns: Vec<GunSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ModSummary {
    pub id: String,
    pub name: String,
    pub category: String,
    pub icon: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ModsResponse {
    pub mods: Vec<ModSummary>,
}

fn default_trader_level() -> u8 {
    4
}

fn default_weight_one() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

fn default_ignore() -> String {
    "price".to_string()
}

fn default_steps() -> usize {
    10
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TraderLevelsRequest {
    #[serde(default = "default_trader_level")]
    pub prapor: u8,
    #[serde(default = "default_trader_level")]
    pub skier: u8,
    #[serde(default = "default_trader_level")]
    pub peacekeeper: u8,
    #[serde(default = "default_trader_level")]
    pub mechanic: u8,
    #[serde(default = "default_trader_level")]
    pub jaeger: u8,
}

impl From<TraderLevelsRequest> for TraderLevels {
    fn from(req: TraderLevelsRequest) -> Self {
        Self {
            prapor: req.prapor,
            skier: req.skier,
            peacekeeper: req.peacekeeper,
            mechanic: req.mechanic,
            jaeger: req.jaeger,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct OptimizeRequest {
    pub weapon_id: String,
    #[serde(default)]
    pub max_price: Option<u64>,
    #[serde(default)]
    pub min_ergonomics: Option<i64>,
    #[serde(default)]
    pub max_recoil_v: Option<f64>,
    #[serde(default)]
    pub max_recoil_sum: Option<f64>,
    #[serde(default)]
    pub min_mag_capacity: Option<i64>,
    #[serde(default)]
    pub min_sighting_range: Option<i64>,
    #[serde(default)]
    pub max_weight: Option<f64>,
    #[serde(default)]
    pub include_items: Vec<String>,
    #[serde(default)]
    pub exclude_items: Vec<String>,
    #[serde(default)]
    pub include_categories: Vec<Vec<String>>,
    #[serde(default)]
    pub exclude_categories: Vec<String>,
    #[serde(default = "default_weight_one")]
    pub ergo_weight: f64,
    #[serde(default = "default_weight_one")]
    pub recoil_weight: f64,
    #[serde(default)]
    pub price_weight: f64,
    #[serde(default)]
    pub trader_levels: Option<TraderLevelsRequest>,
    #[serde(default = "default_true")]
    pub flea_available: bool,
    #[serde(default)]
    pub player_level: Option<i64>,
}

impl OptimizeRequest {
    fn constraints(&self) -> Constraints {
        Constraints {
            max_price: self.max_price,
            min_ergonomics: self.min_ergonomics,
            max_recoil_v: self.max_recoil_v,
            max_recoil_sum: self.max_recoil_sum,
            min_mag_capacity: self.min_mag_capacity,
            min_sighting_range: self.min_sighting_range,
            max_weight: self.max_weight,
            include_items: self.include_items.clone(),
            exclude_items: self.exclude_items.clone(),
            include_categories: self.include_categories.clone(),
            exclude_categories: self.exclude_categories.clone(),
            ergo_weight: self.ergo_weight,
            recoil_weight: self.recoil_weight,
            price_weight: self.price_weight,
            trader_levels: self.trader_levels.clone().map(TraderLevels::from),
            flea_available: self.flea_available,
            player_level: self.player_level,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ExploreRequest {
    #[serde(flatten)]
    pub optimize: OptimizeRequest,
    /// Axis to sweep against: price, recoil or ergo.
    #[serde(default = "default_ignore")]
    pub ignore: String,
    #[serde(default = "default_steps")]
    pub steps: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ItemDetailResponse {
    pub id: String,
    pub name: String,
    pub price: u64,
    pub icon: Option<String>,
    pub source: Option<String>,
    pub ergonomics: f64,
    pub recoil_modifier: f64,
}

impl From<loadout::ItemDetail> for ItemDetailResponse {
    fn from(d: loadout::ItemDetail) -> Self {
        Self {
            id: d.id,
            name: d.name,
            price: d.price,
            icon: d.icon,
            source: d.source,
            ergonomics: d.ergonomics,
            recoil_modifier: d.recoil_modifier,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PresetDetailResponse {
    pub id: String,
    pub name: String,
    pub price: u64,
    pub items: Vec<String>,
    pub icon: Option<String>,
    pub source: Option<String>,
}

impl From<loadout::PresetDetail> for PresetDetailResponse {
    fn from(p: loadout::PresetDetail) -> Self {
        Self {
            id: p.id,
            name: p.name,
            price: p.price,
            items: p.items,
            icon: p.icon,
            source: p.source,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FinalStatsResponse {
    pub ergonomics: f64,
    pub recoil_vertical: f64,
    pub recoil_horizontal: f64,
    pub recoil_multiplier: f64,
    pub total_price: u64,
    pub total_weight: f64,
}

impl From<loadout::FinalStats> for FinalStatsResponse {
    fn from(s: loadout::FinalStats) -> Self {
        Self {
            ergonomics: s.ergonomics,
            recoil_vertical: s.recoil_vertical,
            recoil_horizontal: s.recoil_horizontal,
            recoil_multiplier: s.recoil_multiplier,
            total_price: s.total_price,
            total_weight: s.total_weight,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OptimizeResponse {
    /// optimal, feasible or infeasible.
    pub status: String,
    pub selected_items: Vec<ItemDetailResponse>,
    pub selected_preset: Option<PresetDetailResponse>,
    #[schema(value_type = Option<Object>)]
    pub fallback_base: Option<serde_json::Value>,
    pub objective_value: f64,
    pub reason: Option<String>,
    pub final_stats: Option<FinalStatsResponse>,
}

impl From<loadout::OptimizeResult> for OptimizeResponse {
    fn from(r: loadout::OptimizeResult) -> Self {
        Self {
            status: status_str(r.status).to_string(),
            selected_items: r.selected_items.into_iter().map(Into::into).collect(),
            selected_preset: r.selected_preset.map(Into::into),
            fallback_base: r.fallback_base.and_then(|fb| serde_json::to_value(fb).ok()),
            objective_value: r.objective_value,
            reason: r.reason,
            final_stats: r.final_stats.map(Into::into),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ExplorePointResponse {
    pub ergo: i64,
    pub recoil_pct: f64,
    pub recoil_v: f64,
    pub recoil_h: f64,
    pub price: u64,
    pub selected_items: Vec<ItemDetailResponse>,
    pub selected_preset: Option<PresetDetailResponse>,
    pub status: String,
}

impl From<loadout::FrontierPoint> for ExplorePointResponse {
    fn from(p: loadout::FrontierPoint) -> Self {
        Self {
            ergo: p.ergo,
            recoil_pct: p.recoil_pct,
            recoil_v: p.recoil_v,
            recoil_h: p.recoil_h,
            price: p.price,
            selected_items: p.selected_items.into_iter().map(Into::into).collect(),
            selected_preset: p.selected_preset.map(Into::into),
            status: status_str(p.status).to_string(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ExploreResponse {
    pub points: Vec<ExplorePointResponse>,
}

fn status_str(status: OptimizeStatus) -> &'static str {
    match status {
        OptimizeStatus::Optimal => "optimal",
        OptimizeStatus::Feasible => "feasible",
        OptimizeStatus::Infeasible => "infeasible",
    }
}

fn parse_axis(ignore: &str) -> ParetoAxis {
    match ignore {
        "recoil" => ParetoAxis::Recoil,
        "ergo" => ParetoAxis::Ergo,
        _ => ParetoAxis::Price,
    }
}

// =============================================================================
// Handlers
// =============================================================================

type HandlerError = (StatusCode, String);

async fn catalog_entry(
    state: &AppState,
    query: &LangQuery,
) -> Result<Arc<registry::CatalogEntry>, HandlerError> {
    let lang = query.lang.as_deref().unwrap_or("en");
    let game_mode = query.game_mode.as_deref().unwrap_or("regular");
    state.registry.entry(lang, game_mode).await.map_err(|e| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("Server data not loaded: {e}"),
        )
    })
}

#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Service status", body = RootResponse)),
    tag = "System"
)]
async fn root(State(state): State<Arc<AppState>>) -> Json<RootResponse> {
    Json(RootResponse {
        status: "ok",
        message: "Loadout Optimizer API is running",
        loaded: state.registry.loaded_keys().await,
        game_modes: SUPPORTED_GAME_MODES.to_vec(),
    })
}

#[utoipa::path(
    get,
    path = "/api/info",
    params(LangQuery),
    responses((status = 200, description = "Available weapons", body = InfoResponse)),
    tag = "Catalog"
)]
async fn get_info(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LangQuery>,
) -> Result<Json<InfoResponse>, HandlerError> {
    let entry = catalog_entry(&state, &query).await?;

    let mut guns: Vec<GunSummary> = entry
        .lookup
        .weapons()
        .map(|weapon| {
            let caliber = weapon
                .weapon_stats()
                .map(|s| s.caliber.replace("Caliber", "").trim().to_string())
                .unwrap_or_default();
            GunSummary {
                id: weapon.id.clone(),
                name: weapon.name.clone(),
                image: weapon.image.clone().or_else(|| weapon.icon.clone()),
                category: weapon.category().to_string(),
                caliber,
            }
        })
        .collect();
    guns.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(Json(InfoResponse { guns }))
}

#[utoipa::path(
    get,
    path = "/api/info/{weapon_id}/mods",
    params(
        ("weapon_id" = String, Path, description = "Base weapon id"),
        LangQuery,
    ),
    responses(
        (status = 200, description = "Mods reachable from the weapon", body = ModsResponse),
        (status = 404, description = "Weapon not found")
    ),
    tag = "Catalog"
)]
async fn get_weapon_mods(
    State(state): State<Arc<AppState>>,
    AxumPath(weapon_id): AxumPath<String>,
    Query(query): Query<LangQuery>,
) -> Result<Json<ModsResponse>, HandlerError> {
    let entry = catalog_entry(&state, &query).await?;
    if !entry.lookup.contains(&weapon_id) {
        return Err((StatusCode::NOT_FOUND, "Weapon not found".to_string()));
    }
    let compat = entry
        .compatibility(&weapon_id)
        .await
        .map_err(|e| (StatusCode::NOT_FOUND, e.to_string()))?;

    let mut mods: Vec<ModSummary> = compat
        .reachable
        .iter()
        .filter_map(|id| entry.lookup.get(id))
        .map(|item| ModSummary {
            id: item.id.clone(),
            name: item.name.clone(),
            category: item.category().to_string(),
            icon: item.icon.clone(),
        })
        .collect();
    mods.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(Json(ModsResponse { mods }))
}

#[utoipa::path(
    post,
    path = "/api/optimize",
    params(LangQuery),
    request_body = OptimizeRequest,
    responses(
        (status = 200, description = "Optimization result", body = OptimizeResponse),
        (status = 404, description = "Weapon not found"),
        (status = 503, description = "Catalog not loaded")
    ),
    tag = "Optimizer"
)]
async fn run_optimization(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LangQuery>,
    Json(req): Json<OptimizeRequest>,
) -> Result<Json<OptimizeResponse>, HandlerError> {
    let entry = catalog_entry(&state, &query).await?;
    if !entry.lookup.contains(&req.weapon_id) {
        return Err((
            StatusCode::NOT_FOUND,
            format!("Weapon {} not found", req.weapon_id),
        ));
    }
    let compat = entry
        .compatibility(&req.weapon_id)
        .await
        .map_err(|e| (StatusCode::NOT_FOUND, e.to_string()))?;

    let lookup = entry.lookup.clone();
    let constraints = req.constraints();
    let weapon_id = req.weapon_id.clone();
    let result =
        tokio::task::spawn_blocking(move || loadout::optimize(&weapon_id, &lookup, &compat, &constraints))
            .await
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
            .map_err(|e| (StatusCode::NOT_FOUND, e.to_string()))?;

    Ok(Json(result.into()))
}

#[utoipa::path(
    post,
    path = "/api/explore",
    params(LangQuery),
    request_body = ExploreRequest,
    responses(
        (status = 200, description = "Pareto frontier points", body = ExploreResponse),
        (status = 404, description = "Weapon not found"),
        (status = 503, description = "Catalog not loaded")
    ),
    tag = "Optimizer"
)]
async fn run_exploration(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LangQuery>,
    Json(req): Json<ExploreRequest>,
) -> Result<Json<ExploreResponse>, HandlerError> {
    let entry = catalog_entry(&state, &query).await?;
    if !entry.lookup.contains(&req.optimize.weapon_id) {
        return Err((
            StatusCode::NOT_FOUND,
            format!("Weapon {} not found", req.optimize.weapon_id),
        ));
    }
    let compat = entry
        .compatibility(&req.optimize.weapon_id)
        .await
        .map_err(|e| (StatusCode::NOT_FOUND, e.to_string()))?;

    let lookup = entry.lookup.clone();
    let constraints = req.optimize.constraints();
    let weapon_id = req.optimize.weapon_id.clone();
    let axis = parse_axis(&req.ignore);
    let steps = req.steps;
    let points = tokio::task::spawn_blocking(move || {
        loadout::explore(&weapon_id, &lookup, &compat, &constraints, axis, steps)
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
    .map_err(|e| (StatusCode::NOT_FOUND, e.to_string()))?;

    Ok(Json(ExploreResponse {
        points: points.into_iter().map(Into::into).collect(),
    }))
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            port,
            bind,
            cache_dir,
        } => {
            // Initialize tracing
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| "loadout_api=info,loadout=info,tower_http=debug".into()),
                )
                .with(tracing_subscriber::fmt::layer())
                .init();

            let client = CatalogClient::new(&cache_dir);
            let registry = CatalogRegistry::new(client);

            // Warm up English for both game modes; everything else is
            // loaded on demand.
            registry.preload().await;

            let state = Arc::new(AppState { registry });

            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);

            let app = Router::new()
                .route("/", get(root))
                .route("/api/info", get(get_info))
                .route("/api/info/{weapon_id}/mods", get(get_weapon_mods))
                .route("/api/optimize", post(run_optimization))
                .route("/api/explore", post(run_exploration))
                .merge(Scalar::with_url("/scalar", ApiDoc::openapi()))
                .route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
                .with_state(state)
                .layer(cors)
                .layer(TraceLayer::new_for_http());

            let bind_addr = format!("{bind}:{port}");
            tracing::info!("Starting server on {}", bind_addr);
            tracing::info!("OpenAPI spec available at /openapi.json");
            tracing::info!("Interactive docs at /scalar");

            let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
