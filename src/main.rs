//! docai-reader - HTTP front end for Google Cloud Document AI.
//!
//! Uploads go through online processing and come back as OCR or entity
//! reports; Cloud Storage inputs go through batch processing.

mod auth;
mod batch;
mod config;
mod documentai;
mod report;
mod resolver;
mod storage;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use batch::BatchProcessor;
use config::{ConfigStore, ProcessorKind, ProcessorProfile, Settings};
use documentai::document::Document;
use documentai::operation::{BatchError, BatchRequest, GcsDocument};
use documentai::DocumentAiClient;
use report::{BatchReport, EntityReport, OcrReport, Source};
use serde::Serialize;
use std::fmt::Display;
use std::sync::Arc;
use storage::GcsClient;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    settings: Arc<Settings>,
    configs: Arc<ConfigStore>,
    docai: DocumentAiClient,
    batch: Arc<BatchProcessor>,
}

type ApiError = (StatusCode, String);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "docai_reader=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;
    let configs = ConfigStore::load_from_dir(&settings.config_dir)?;
    info!("Loaded {} processor profiles: {:?}", configs.list().len(), configs.list());

    let http = reqwest::Client::new();
    let tokens = auth::from_env(http.clone())?;

    let mut docai = DocumentAiClient::new(
        http.clone(),
        tokens.clone(),
        settings.project_id.clone(),
        settings.location.clone(),
    );
    if let Some(endpoint) = &settings.endpoint {
        docai = docai.with_endpoint(endpoint.clone());
    }
    let mut gcs = GcsClient::new(http, tokens);
    if let Some(url) = &settings.storage_url {
        gcs = gcs.with_base_url(url.clone());
    }
    let batch = BatchProcessor::new(docai.clone(), Arc::new(gcs))
        .with_timeout(settings.batch_timeout)
        .with_poll_interval(settings.poll_interval);

    info!(
        "Document AI client ready for project {} in {}",
        settings.project_id, settings.location
    );

    let bind_addr = settings.bind_addr.clone();
    let state = AppState {
        settings: Arc::new(settings),
        configs: Arc::new(configs),
        docai,
        batch: Arc::new(batch),
    };

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/processors", get(list_processors))
        .route("/processors/:name", get(get_processor))
        .route("/ocr", post(process_ocr))
        .route("/entities", post(process_entities))
        .route("/batch", post(process_batch))
        .layer(DefaultBodyLimit::max(100 * 1024 * 1024)) // 100MB
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// List configured processor profiles.
async fn list_processors(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.configs.list())
}

/// Get a specific processor profile.
async fn get_processor(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ProcessorProfile>, StatusCode> {
    state
        .configs
        .get(&name)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

#[derive(serde::Deserialize)]
struct ReportQuery {
    processor: Option<String>,
    format: Option<String>,
}

/// Run a document through an OCR processor and summarise its layout.
async fn process_ocr(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let format = OutputFormat::parse(query.format.as_deref())?;
    let profile = pick_profile(&state, query.processor.as_deref(), ProcessorKind::Ocr)?;
    let (document, source) = process_upload(&state, &profile, multipart).await?;

    let report = OcrReport::from_document(&document).with_source(source);
    info!("OCR report {}: {} page(s)", report.id, report.page_count);
    Ok(format.render(report))
}

/// Run a document through a specialized processor and list its entities.
async fn process_entities(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let format = OutputFormat::parse(query.format.as_deref())?;
    let profile = pick_profile(&state, query.processor.as_deref(), ProcessorKind::Specialized)?;
    let (document, source) = process_upload(&state, &profile, multipart).await?;

    let report = EntityReport::from_document(&document).with_source(source);
    info!("Entity report {}: {} entities", report.id, report.count);
    Ok(format.render(report))
}

#[derive(serde::Deserialize)]
struct BatchBody {
    inputs: Vec<String>,
    mime_type: Option<String>,
    output_prefix: Option<String>,
}

/// Batch-process Cloud Storage inputs and report the fetched results.
async fn process_batch(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
    Json(body): Json<BatchBody>,
) -> Result<Response, ApiError> {
    let format = OutputFormat::parse(query.format.as_deref())?;
    let profile = pick_profile(&state, query.processor.as_deref(), ProcessorKind::Ocr)?;

    let output_bucket = state.settings.output_bucket.as_deref().ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            "DOCAI_OUTPUT_BUCKET is not configured".to_string(),
        )
    })?;

    if body.inputs.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No inputs given".to_string()));
    }
    if let Some(bad) = body.inputs.iter().find(|uri| storage::parse_gcs_uri(uri).is_none()) {
        return Err((StatusCode::BAD_REQUEST, format!("Not a gs:// URI: {}", bad)));
    }

    let mime_type = body.mime_type.unwrap_or_else(|| profile.mime_type.clone());
    let documents = body
        .inputs
        .into_iter()
        .map(|gcs_uri| GcsDocument {
            gcs_uri,
            mime_type: mime_type.clone(),
        })
        .collect();
    let prefix = body
        .output_prefix
        .unwrap_or_else(|| state.settings.output_prefix.clone());
    let request = BatchRequest::new(documents, output_bucket, &prefix);

    let outcome = state
        .batch
        .run(&profile.processor_id, &request)
        .await
        .map_err(remote_error)?;

    Ok(format.render(BatchReport::from_outcome(&outcome)))
}

// ============================================================================
// Helper functions
// ============================================================================

enum OutputFormat {
    Json,
    Text,
}

impl OutputFormat {
    fn parse(format: Option<&str>) -> Result<Self, ApiError> {
        match format.unwrap_or("json") {
            "json" => Ok(Self::Json),
            "text" => Ok(Self::Text),
            other => Err((
                StatusCode::BAD_REQUEST,
                format!("Unknown format: {} (expected json or text)", other),
            )),
        }
    }

    fn render<T: Serialize + Display>(&self, report: T) -> Response {
        match self {
            Self::Json => Json(report).into_response(),
            Self::Text => report.to_string().into_response(),
        }
    }
}

/// Resolve the named profile, or the default one of `kind` when none is named.
fn pick_profile(
    state: &AppState,
    name: Option<&str>,
    kind: ProcessorKind,
) -> Result<ProcessorProfile, ApiError> {
    let profile = match name {
        Some(name) => state.configs.get(name),
        None => state.configs.default_for(kind),
    };

    profile.cloned().ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            format!(
                "Unknown processor: {}. Available: {:?}",
                name.unwrap_or("<default>"),
                state.configs.list()
            ),
        )
    })
}

/// Read the uploaded `file` field and send it through online processing.
async fn process_upload(
    state: &AppState,
    profile: &ProcessorProfile,
    mut multipart: Multipart,
) -> Result<(Document, Source), ApiError> {
    let mut filename = String::new();
    let mut file_data = Vec::new();
    let mut mime_type = profile.mime_type.clone();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (StatusCode::BAD_REQUEST, format!("Multipart error: {}", e))
    })? {
        if field.name() == Some("file") {
            filename = field.file_name().unwrap_or("document").to_string();
            if let Some(ct) = field.content_type().filter(|ct| *ct != "application/octet-stream") {
                mime_type = ct.to_string();
            }
            file_data = field.bytes().await.map_err(|e| {
                (StatusCode::BAD_REQUEST, format!("Failed to read file: {}", e))
            })?.to_vec();
            break;
        }
    }

    if file_data.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No file uploaded".to_string()));
    }

    info!(
        "Received file: {} ({} bytes, {}) for processor: {}",
        filename,
        file_data.len(),
        mime_type,
        profile.name
    );

    let processed = state
        .docai
        .process_document(&profile.processor_id, &file_data, &mime_type)
        .await
        .map_err(remote_error)?;

    if let Some(dir) = &state.settings.dump_dir {
        dump_document(dir, &profile.name, &processed.raw).await;
    }

    Ok((processed.document, Source::new(filename, &file_data)))
}

/// Write the document JSON as returned by Document AI; failures are only logged.
async fn dump_document(dir: &std::path::Path, name: &str, document: &serde_json::Value) {
    let path = dir.join(format!("{}.json", name));
    let json = match serde_json::to_vec_pretty(document) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to serialize document for {:?}: {}", path, e);
            return;
        }
    };

    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        warn!("Failed to create dump directory {:?}: {}", dir, e);
        return;
    }
    match tokio::fs::write(&path, json).await {
        Ok(()) => info!("Wrote document JSON to {:?}", path),
        Err(e) => warn!("Failed to write {:?}: {}", path, e),
    }
}

fn remote_error(e: anyhow::Error) -> ApiError {
    error!("Document AI call failed: {:#}", e);
    let status = match e.downcast_ref::<BatchError>() {
        Some(BatchError::TimedOut { .. }) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::BAD_GATEWAY,
    };
    (status, format!("{:#}", e))
}
