mod config;
mod connect;
mod error;
mod metrics;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use extract::{OllamaClient, RetryCoordinator, ShapeValidator};
use index::{
    ChannelListener, MemoryStore, Neo4jStore, OccurrenceSearch, QdrantIndex, RankedSearch,
    SearchResponse, SearchService, SearchStrategy, StoreEvent, TripleStore,
};
use resolve::{EntityResolver, Pipeline, PipelineOutput};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};

use crate::config::{AppConfig, StoreBackend};
use crate::connect::ConnectPolicy;
use crate::error::ApiError;
use crate::metrics::{Metrics, MetricsSnapshot, TimedOperation};

#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
    metrics: Arc<Metrics>,
    request_timeout: Duration,
}

#[derive(Serialize)]
struct HealthResponse {
    store: String,
}

#[derive(Deserialize)]
struct GenerateRequest {
    text: String,
    /// Turtle shapes the generated graph must conform to.
    #[serde(default)]
    shapes: Option<String>,
}

#[derive(Serialize)]
struct EntityResponse {
    id: String,
    name: String,
    subject: String,
}

#[derive(Serialize)]
struct GenerateResponse {
    graph: String,
    entities: Vec<EntityResponse>,
    attempts: usize,
}

impl From<PipelineOutput> for GenerateResponse {
    fn from(output: PipelineOutput) -> Self {
        Self {
            graph: output.graph,
            entities: output
                .entities
                .into_iter()
                .map(|resolved| EntityResponse {
                    id: resolved.entity.id,
                    name: resolved.entity.name,
                    subject: resolved.subject,
                })
                .collect(),
            attempts: output.attempts,
        }
    }
}

#[derive(Deserialize)]
struct SearchBody {
    text: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::load()?;
    info!(mode = ?config.mode, store = ?config.store, strategy = ?config.search.strategy, "Configuration loaded");

    let state = build_state(&config).await?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

    info!("Server listening on http://{}", config.bind_addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

/// Plain text logs, or JSON lines when `LOG_FORMAT=json`.
fn init_tracing() {
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt().json().init();
    } else {
        tracing_subscriber::fmt::init();
    }
}

async fn build_state(config: &AppConfig) -> Result<AppState> {
    let policy = ConnectPolicy::new(&config.connect);

    // Ranked search reads from Qdrant, which follows the store through a listener.
    let (ranked_index, listener) = match config.search.strategy {
        SearchStrategy::Ranked => {
            let index = Arc::new(QdrantIndex::new(&config.qdrant));
            policy
                .retry("qdrant", || index.init_collection())
                .await
                .context("Failed to initialize Qdrant collection")?;
            let (listener, rx) = ChannelListener::new();
            (Some((index, rx)), Some(Arc::new(listener)))
        }
        SearchStrategy::Occurrence => (None, None),
    };

    let store: Arc<dyn TripleStore> = match config.store {
        StoreBackend::Memory => {
            let mut store = MemoryStore::new();
            if let Some(listener) = &listener {
                store.subscribe(listener.clone());
            }
            Arc::new(store)
        }
        StoreBackend::Neo4j => {
            let mut store = policy
                .retry("neo4j", || Neo4jStore::connect(&config.neo4j))
                .await?;
            store.init_schema().await?;
            if let Some(listener) = &listener {
                store.subscribe(listener.clone());
            }
            Arc::new(store)
        }
    };

    let search: Arc<dyn SearchService> = match ranked_index {
        Some((index, rx)) => {
            let existing = store.triples().await?;
            let backfilled = index
                .index_triples(&existing)
                .await
                .context("Failed to index existing triples")?;
            info!(backfilled, "Ranked index ready");
            spawn_index_sync(index.clone(), rx);
            Arc::new(RankedSearch::new(
                index,
                config.search.limit,
                config.search.min_score,
            ))
        }
        None => Arc::new(OccurrenceSearch::new(store.clone(), config.search.limit)),
    };

    let retry = RetryCoordinator::new(
        Arc::new(OllamaClient::new(&config.llm)),
        Arc::new(ShapeValidator),
        &config.retry,
    );
    let resolver = EntityResolver::from_config(search, &config.resolver);

    Ok(AppState {
        pipeline: Arc::new(Pipeline::new(retry, resolver, store)),
        metrics: Metrics::new(),
        request_timeout: Duration::from_secs(config.request_timeout_secs),
    })
}

/// Keep the ranked index in step with store mutations.
fn spawn_index_sync(index: Arc<QdrantIndex>, mut rx: UnboundedReceiver<StoreEvent>) {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let result = match &event {
                StoreEvent::Inserted(triples) => index.index_triples(triples).await,
                StoreEvent::Removed(triples) => index.remove_triples(triples).await,
            };
            match result {
                Ok(count) => debug!(count, "Synced ranked index"),
                Err(e) => warn!(error = %e, "Failed to sync ranked index"),
            }
        }
    });
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/generate", post(generate))
        .route("/search", post(search))
        .route("/export", get(export))
        .route("/metrics", get(get_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    match state.pipeline.store().health().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                store: "ok".to_string(),
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                store: format!("error: {e}"),
            }),
        ),
    }
}

async fn generate(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let timer = TimedOperation::start();
    let run = state.pipeline.run(&req.text, req.shapes.as_deref());

    match tokio::time::timeout(state.request_timeout, run).await {
        Ok(Ok(output)) => {
            state.metrics.record_run(timer.elapsed(), &output);
            Ok(Json(output.into()))
        }
        Ok(Err(e)) => {
            state.metrics.record_failure(timer.elapsed(), false);
            Err(e.into())
        }
        Err(_) => {
            warn!(timeout_secs = state.request_timeout.as_secs(), "Generate request timed out");
            state.metrics.record_failure(timer.elapsed(), true);
            Err(ApiError::Timeout(state.request_timeout))
        }
    }
}

async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchBody>,
) -> Result<Json<SearchResponse>, ApiError> {
    let timer = TimedOperation::start();
    let response = state.pipeline.search(&req.text).await?;
    state.metrics.record_search(timer.elapsed());
    Ok(Json(response))
}

async fn export(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let body = state.pipeline.store().export_all().await?;
    Ok(([(header::CONTENT_TYPE, "application/n-triples")], body))
}

async fn get_metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
