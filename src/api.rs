use axum::{
    extract::{DefaultBodyLimit, Json, Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    app_state::AppState,
    error::RagError,
    ingest::DocumentFormat,
    models::UploadedFile,
    session::{read_status, ProcessSummary, RenderedAnswer, SessionStatus},
};

// --- Payloads de la API ---

#[derive(Deserialize)]
pub struct CredentialPayload {
    api_key: String,
}

#[derive(Deserialize)]
pub struct QueryPayload {
    question: String,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    let body_limit = app_state.config.max_upload_bytes;
    Router::new()
        .route(
            "/api/credential",
            post(set_credential_handler).delete(clear_credential_handler),
        )
        .route("/api/process", post(process_handler))
        .route("/api/query", post(query_handler))
        .route("/api/status", get(status_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(app_state)
}

// --- Handlers ---

#[axum::debug_handler]
async fn set_credential_handler(
    State(state): State<AppState>,
    Json(payload): Json<CredentialPayload>,
) -> Result<Json<SessionStatus>, RagError> {
    let mut session = state.session.lock().await;
    session.set_credential(&payload.api_key).map(Json)
}

#[axum::debug_handler]
async fn clear_credential_handler(State(state): State<AppState>) -> Json<SessionStatus> {
    Json(state.session.lock().await.clear_credential())
}

/// Recibe los ficheros del formulario (campo `files`), descarta los de
/// extensión no reconocida y procesa el resto como un lote nuevo.
/// Si no queda ningún fichero aceptado, la sesión no se toca.
#[axum::debug_handler]
async fn process_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ProcessSummary>, RagError> {
    let mut files = Vec::new();
    let mut rejected = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| RagError::InvalidUpload(e.to_string()))?
    {
        if field.name() != Some("files") {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| RagError::InvalidUpload(e.to_string()))?;

        if DocumentFormat::from_file_name(&name).is_none() {
            warn!("Fichero rechazado en la subida: '{}'", name);
            rejected.push(name);
            continue;
        }
        files.push(UploadedFile::new(name, data.to_vec()));
    }

    info!(
        "Subida recibida: {} ficheros válidos, {} rechazados.",
        files.len(),
        rejected.len()
    );

    let mut session = state.session.lock().await;
    if files.is_empty() && !rejected.is_empty() {
        return Err(session.reject(RagError::UnsupportedFormat(rejected.join(", "))));
    }
    let mut summary = session.process(files).await?;
    summary.rejected.extend(
        rejected
            .into_iter()
            .map(|name| RagError::UnsupportedFormat(name).to_string()),
    );
    Ok(Json(summary))
}

#[axum::debug_handler]
async fn query_handler(
    State(state): State<AppState>,
    Json(payload): Json<QueryPayload>,
) -> Result<Json<RenderedAnswer>, RagError> {
    let mut session = state.session.lock().await;
    session.query(&payload.question).await.map(Json)
}

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Json<SessionStatus> {
    Json(read_status(&state.status))
}

// --- Handler de Apagado ---

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    if let Some(sender) = state
        .shutdown_sender
        .lock()
        .ok()
        .and_then(|mut sender| sender.take())
    {
        let _ = sender.send(());
    }
    StatusCode::OK
}
