use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use defiopt_core::domain::document::Document;
use defiopt_core::domain::recommendation::Recommendation;
use defiopt_core::ingest::{DataQuery, MarketDataProvider, Page};
use defiopt_core::pipeline::GenerationPipeline;
use defiopt_core::storage::DocumentStore;
use defiopt_core::PipelineError;

#[derive(Clone)]
pub struct AppState {
    pub data: Arc<dyn MarketDataProvider>,
    pub pipeline: GenerationPipeline,
    pub documents: Arc<DocumentStore>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route("/get_pool_metadata", get(get_pool_metadata))
        .route("/get_pool_metric", get(get_pool_metric))
        .route("/get_dex_pool_metrics", get(get_dex_pool_metrics))
        .route("/get_pool_by_protocol", get(get_pool_by_protocol))
        .route("/get_protocol_metadata", get(get_protocol_metadata))
        .route("/get_defi_protocols", get(get_defi_protocols))
        .route("/documents", get(list_documents))
        .route("/stream_chat", post(stream_chat))
        .route("/stream_rag_output", post(stream_rag_output))
        .route("/recommendation", post(recommendation))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Pipeline failure mapped to a distinct status per error kind.
#[derive(Debug)]
pub struct ApiError(PipelineError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            PipelineError::UpstreamFetch { .. } => StatusCode::BAD_GATEWAY,
            PipelineError::UpstreamTimeout { .. } | PipelineError::GenerationTimeout { .. } => {
                StatusCode::GATEWAY_TIMEOUT
            }
            PipelineError::Generation(_) => StatusCode::SERVICE_UNAVAILABLE,
            PipelineError::SchemaNonconformance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            sentry::capture_error(&self.0);
            tracing::error!(%status, kind = self.0.kind(), error = %self.0, "request failed");
        } else {
            tracing::warn!(%status, kind = self.0.kind(), error = %self.0, "request failed");
        }

        let body = Json(json!({
            "error": self.0.kind(),
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "Hello World" }))
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct PoolParams {
    blockchain: String,
    pair_address: String,
}

#[derive(Debug, Deserialize)]
struct PairParams {
    pair_address: String,
}

#[derive(Debug, Deserialize)]
struct ProtocolParams {
    protocol: String,
    offset: Option<u32>,
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChainProtocolParams {
    blockchain: String,
    protocol: String,
    offset: Option<u32>,
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChainParams {
    blockchain: String,
}

async fn fetch_and_record(state: &AppState, query: DataQuery) -> Result<Json<Value>, ApiError> {
    let value = state.data.fetch_and_record(&query, &state.documents).await?;
    Ok(Json(value))
}

async fn get_pool_metadata(
    State(state): State<AppState>,
    Query(params): Query<PoolParams>,
) -> Result<Json<Value>, ApiError> {
    let query = DataQuery::PoolMetadata {
        blockchain: params.blockchain,
        pair_address: params.pair_address,
    };
    fetch_and_record(&state, query).await
}

async fn get_pool_metric(
    State(state): State<AppState>,
    Query(params): Query<PairParams>,
) -> Result<Json<Value>, ApiError> {
    tracing::warn!(
        pair_address = %params.pair_address,
        "/get_pool_metric is deprecated; use /get_dex_pool_metrics with a blockchain"
    );
    let query = DataQuery::PoolMetricsAnyChain {
        pair_address: params.pair_address,
    };
    fetch_and_record(&state, query).await
}

async fn get_dex_pool_metrics(
    State(state): State<AppState>,
    Query(params): Query<PoolParams>,
) -> Result<Json<Value>, ApiError> {
    let query = DataQuery::PoolMetrics {
        blockchain: params.blockchain,
        pair_address: params.pair_address,
    };
    fetch_and_record(&state, query).await
}

async fn get_pool_by_protocol(
    State(state): State<AppState>,
    Query(params): Query<ProtocolParams>,
) -> Result<Json<Value>, ApiError> {
    let query = DataQuery::PoolsByProtocol {
        protocol: params.protocol,
        page: Page {
            offset: params.offset,
            limit: params.limit,
        },
    };
    fetch_and_record(&state, query).await
}

async fn get_protocol_metadata(
    State(state): State<AppState>,
    Query(params): Query<ChainProtocolParams>,
) -> Result<Json<Value>, ApiError> {
    let query = DataQuery::ProtocolMetadata {
        blockchain: params.blockchain,
        protocol: params.protocol,
        page: Page {
            offset: params.offset,
            limit: params.limit,
        },
    };
    fetch_and_record(&state, query).await
}

async fn get_defi_protocols(
    State(state): State<AppState>,
    Query(params): Query<ChainParams>,
) -> Result<Json<Value>, ApiError> {
    let query = DataQuery::SupportedProtocols {
        blockchain: params.blockchain,
    };
    fetch_and_record(&state, query).await
}

#[derive(Debug, Serialize)]
struct DocumentsResponse {
    count: usize,
    documents: Vec<Document>,
}

async fn list_documents(State(state): State<AppState>) -> Json<DocumentsResponse> {
    let documents = state.documents.snapshot().await;
    Json(DocumentsResponse {
        count: documents.len(),
        documents,
    })
}

#[derive(Debug, Deserialize)]
struct PromptBody {
    prompt: String,
}

/// Raw model text, returned as a JSON string.
async fn stream_chat(
    State(state): State<AppState>,
    Json(body): Json<PromptBody>,
) -> Result<Json<String>, ApiError> {
    let text = state.pipeline.generate_direct(&body.prompt).await?;
    Ok(Json(text))
}

/// Raw model text grounded in every recorded document, returned as a JSON string.
async fn stream_rag_output(
    State(state): State<AppState>,
    Json(body): Json<PromptBody>,
) -> Result<Json<String>, ApiError> {
    let text = state
        .pipeline
        .generate_grounded(&body.prompt, &state.documents)
        .await?;
    Ok(Json(text))
}

#[derive(Debug, Deserialize)]
struct RecommendationBody {
    prompt: String,
    #[serde(default = "default_grounded")]
    grounded: bool,
}

fn default_grounded() -> bool {
    true
}

async fn recommendation(
    State(state): State<AppState>,
    Json(body): Json<RecommendationBody>,
) -> Result<Json<Recommendation>, ApiError> {
    let context = body.grounded.then_some(state.documents.as_ref());
    let recommendation = state.pipeline.recommend(&body.prompt, context).await?;
    Ok(Json(recommendation))
}
