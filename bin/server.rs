// Election Act Auditor - Web Server
// REST API with Axum over an in-memory data lake

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use election_auditor::{
    classify, export_filename, log_filter, AlterationEvent, AnalyzeRequest, AnalyzedRecord,
    ClientConfig, DataLake, ExportConfig, ImpactResult, LakeSummary, VisionExtraction,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

const DEFAULT_PORT: u16 = 3001;
const VISION_URL_ENV: &str = "AUDITOR_VISION_URL";
const VISION_KEY_ENV: &str = "AUDITOR_VISION_KEY";

/// Vision backend the analyze endpoint forwards to
#[derive(Clone)]
struct VisionBackend {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl VisionBackend {
    fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            api_key: api_key.into(),
        }
    }

    /// Both URL and key must be set, otherwise analysis is unavailable
    fn from_env() -> Option<Self> {
        let url = std::env::var(VISION_URL_ENV).ok().filter(|v| !v.is_empty());
        let key = std::env::var(VISION_KEY_ENV).ok().filter(|v| !v.is_empty());
        match (url, key) {
            (Some(url), Some(key)) => Some(Self::new(url, key)),
            _ => {
                warn!("{} / {} not set, /api/analyze is disabled", VISION_URL_ENV, VISION_KEY_ENV);
                None
            }
        }
    }

    /// Send the image and return the raw extraction text
    async fn extract(&self, request: &AnalyzeRequest) -> Result<String> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .context("Vision backend unreachable")?;

        let status = response.status();
        let text = response
            .text()
            .await
            .context("Failed to read vision backend response")?;
        if !status.is_success() {
            anyhow::bail!("Vision backend returned {}: {}", status, text);
        }
        Ok(text)
    }
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    config: Arc<ClientConfig>,
    lake: Arc<RwLock<DataLake>>,
    vision: Option<VisionBackend>,
}

impl AppState {
    fn new(config: ClientConfig, lake: DataLake) -> Self {
        Self {
            config: Arc::new(config),
            lake: Arc::new(RwLock::new(lake)),
            vision: None,
        }
    }

    fn with_vision(mut self, vision: Option<VisionBackend>) -> Self {
        self.vision = vision;
        self
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
}

/// Search hits plus counters over the whole lake
#[derive(Serialize)]
struct ActsPage {
    summary: LakeSummary,
    acts: Vec<AnalyzedRecord>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ApiResponse::<AnalyzedRecord>::err(message))).into_response()
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/classify - Classify a list of alteration events
async fn classify_events(
    State(state): State<AppState>,
    Json(events): Json<Vec<AlterationEvent>>,
) -> Json<ApiResponse<ImpactResult>> {
    Json(ApiResponse::ok(classify(&events, &state.config)))
}

/// POST /api/analyze - Send an act image to the vision backend, classify and ingest it
async fn analyze_act(State(state): State<AppState>, body: String) -> Response {
    let Some(backend) = state.vision.as_ref() else {
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Server misconfigured: vision backend key missing",
        );
    };

    let request: AnalyzeRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("Unreadable analyze request: {}", e);
            return error_response(StatusCode::BAD_REQUEST, "Missing image or mimeType");
        }
    };
    if let Err(e) = request.validate() {
        return error_response(StatusCode::BAD_REQUEST, e.to_string());
    }

    let extraction = match backend.extract(&request).await {
        Ok(text) => VisionExtraction::parse(&text),
        Err(e) => Err(e),
    };
    let extraction = match extraction {
        Ok(extraction) => extraction,
        Err(e) => {
            warn!("Analysis failed: {:#}", e);
            return error_response(StatusCode::BAD_GATEWAY, format!("{:#}", e));
        }
    };

    let record = extraction.into_record(&state.config, Utc::now());
    state.lake.write().await.ingest(record.clone());

    Json(ApiResponse::ok(record)).into_response()
}

/// POST /api/acts - Ingest a vision extraction as a classified act
async fn ingest_act(State(state): State<AppState>, body: String) -> Response {
    let extraction = match VisionExtraction::parse(&body) {
        Ok(extraction) => extraction,
        Err(e) => {
            warn!("Rejected act: {:#}", e);
            return error_response(StatusCode::BAD_REQUEST, format!("{:#}", e));
        }
    };

    let record = extraction.into_record(&state.config, Utc::now());
    state.lake.write().await.ingest(record.clone());

    (StatusCode::CREATED, Json(ApiResponse::ok(record))).into_response()
}

/// GET /api/acts?q=term - List acts matching the search term
async fn list_acts(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Json<ApiResponse<ActsPage>> {
    let lake = state.lake.read().await;
    let page = ActsPage {
        summary: lake.summary(),
        acts: lake.search(&query.q).into_iter().cloned().collect(),
    };

    Json(ApiResponse::ok(page))
}

/// POST /api/export - Download the data lake as CSV
async fn export_acts(
    State(state): State<AppState>,
    Json(export): Json<ExportConfig>,
) -> Response {
    let today = Utc::now().date_naive();
    let body = state.lake.read().await.export(&export, today).concat();

    let disposition = format!("attachment; filename=\"{}\"", export_filename(today));
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response()
}

fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/classify", post(classify_events))
        .route("/analyze", post(analyze_act))
        .route("/acts", get(list_acts).post(ingest_act))
        .route("/export", post(export_acts))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(log_filter()).init();

    info!("Election Act Auditor - Web Server v{}", election_auditor::VERSION);

    let config = ClientConfig::load(None)?;
    info!(client = %config.client_name, "Client config ready");

    let port = match std::env::var("AUDITOR_PORT") {
        Ok(value) => value
            .parse::<u16>()
            .with_context(|| format!("Invalid AUDITOR_PORT: {}", value))?,
        Err(_) => DEFAULT_PORT,
    };

    let state = AppState::new(config, DataLake::new()).with_vision(VisionBackend::from_env());
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Server running on http://localhost:{}", port);

    axum::serve(listener, app)
        .await
        .context("Server stopped unexpectedly")?;
    Ok(())
}
