//! Controlador de sesión: secuencia carga → índice → motor de consultas y
//! guarda el motor activo para las consultas siguientes.
//!
//! Estados:
//!   AwaitingCredential → AwaitingUpload → Processing → Indexed
//!   Indexed → Querying → Indexed (en bucle)
//! Un fallo en Processing vuelve a AwaitingUpload descartando el índice
//! anterior; un fallo en Querying vuelve a Indexed.
//!
//! Cada cambio se publica en un `SessionStatus` compartido, que se puede leer
//! sin esperar a que termine la operación en curso.

use std::{
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::RagError,
    index,
    ingest::{self, LoadOutcome},
    models::{Response, UploadedFile},
    provider::{ProviderFactory, RagProvider},
    rag::QueryEngine,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum SessionState {
    #[default]
    AwaitingCredential,
    AwaitingUpload,
    Processing,
    Indexed,
    Querying,
}

/// Parámetros de la sesión que salen de la configuración.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub top_k: usize,
    pub similarity_cutoff: f64,
    pub staging_dir: Option<PathBuf>,
}

impl From<&AppConfig> for SessionSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            top_k: cfg.top_k,
            similarity_cutoff: cfg.similarity_cutoff,
            staging_dir: cfg.staging_dir.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessSummary {
    pub index_id: Uuid,
    pub documents: usize,
    pub files_loaded: usize,
    pub rejected: Vec<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderedSource {
    pub label: String,
    pub text: String,
    pub file_name: String,
    pub page_label: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderedAnswer {
    pub answer: String,
    pub sources: Vec<RenderedSource>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub has_credential: bool,
    pub indexed_documents: usize,
    pub message: String,
    pub updated_at: DateTime<Utc>,
}

/// Último estado publicado por la sesión.
pub type StatusBoard = Arc<Mutex<SessionStatus>>;

pub fn read_status(board: &StatusBoard) -> SessionStatus {
    board.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

/// Estado de una sesión de usuario. Se pasa explícitamente a los handlers.
pub struct Session {
    settings: SessionSettings,
    factory: Arc<dyn ProviderFactory>,
    state: SessionState,
    credential: Option<String>,
    provider: Option<Arc<dyn RagProvider>>,
    engine: Option<QueryEngine>,
    message: String,
    updated_at: DateTime<Utc>,
    board: StatusBoard,
}

impl Session {
    pub fn new(settings: SessionSettings, factory: Arc<dyn ProviderFactory>) -> Self {
        let session = Self {
            settings,
            factory,
            state: SessionState::AwaitingCredential,
            credential: None,
            provider: None,
            engine: None,
            message: RagError::MissingCredential.to_string(),
            updated_at: Utc::now(),
            board: StatusBoard::default(),
        };
        session.publish();
        session
    }

    pub fn status_board(&self) -> StatusBoard {
        self.board.clone()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn engine(&self) -> Option<&QueryEngine> {
        self.engine.as_ref()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.state(),
            has_credential: self.credential.is_some(),
            indexed_documents: self
                .engine()
                .map(|e| e.index().document_count())
                .unwrap_or(0),
            message: self.message.clone(),
            updated_at: self.updated_at,
        }
    }

    fn publish(&self) {
        *self.board.lock().unwrap_or_else(PoisonError::into_inner) = self.status();
    }

    fn transition(&mut self, state: SessionState, message: impl Into<String>) {
        self.state = state;
        self.message = message.into();
        self.updated_at = Utc::now();
        self.publish();
    }

    /// Registra el error como último mensaje visible sin cambiar de estado.
    pub fn reject(&mut self, err: RagError) -> RagError {
        warn!("{}", err);
        self.message = err.to_string();
        self.updated_at = Utc::now();
        self.publish();
        err
    }

    /// Fija la API Key de la sesión (sólo en memoria).
    pub fn set_credential(&mut self, api_key: &str) -> Result<SessionStatus, RagError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            self.clear_credential();
            return Err(self.reject(RagError::MissingCredential));
        }
        if self.credential.as_deref() == Some(api_key) {
            return Ok(self.status());
        }

        let provider = match self.factory.connect(api_key) {
            Ok(provider) => provider,
            Err(e) => {
                error!("No se pudo inicializar el proveedor: {:#}", e);
                self.clear_credential();
                return Err(self.reject(RagError::MissingCredential));
            }
        };

        // Un índice creado con otra clave no se reutiliza.
        self.engine = None;
        self.credential = Some(api_key.to_string());
        self.provider = Some(provider);
        self.transition(
            SessionState::AwaitingUpload,
            "API Key configurada. Sube documentos y pulsa \"Procesar documentos\".",
        );
        info!("API Key configurada para la sesión.");
        Ok(self.status())
    }

    pub fn clear_credential(&mut self) -> SessionStatus {
        self.credential = None;
        self.provider = None;
        self.engine = None;
        self.transition(
            SessionState::AwaitingCredential,
            RagError::MissingCredential.to_string(),
        );
        self.status()
    }

    /// Carga, indexa y configura el motor de consultas para un lote nuevo.
    /// Si todo va bien, el motor nuevo sustituye por completo al anterior.
    /// Sin ficheros no hay lote: el índice actual se conserva.
    pub async fn process(&mut self, files: Vec<UploadedFile>) -> Result<ProcessSummary, RagError> {
        let Some(provider) = self.provider.clone() else {
            return Err(self.reject(RagError::MissingCredential));
        };
        if files.is_empty() {
            return Err(self.reject(RagError::InvalidUpload(
                "no se ha subido ningún fichero".to_string(),
            )));
        }

        self.transition(SessionState::Processing, "Cargando e indexando documentos...");
        info!("Procesando lote de {} ficheros.", files.len());

        match self.run_pipeline(provider, files).await {
            Ok((engine, outcome)) => {
                let documents = outcome.documents.len();
                let message = format!("¡{} documentos procesados correctamente!", documents);
                let summary = ProcessSummary {
                    index_id: engine.index().id(),
                    documents,
                    files_loaded: outcome.files_loaded(),
                    rejected: outcome.rejected.iter().map(ToString::to_string).collect(),
                    message: message.clone(),
                };
                self.engine = Some(engine);
                self.transition(SessionState::Indexed, message);
                info!("{}", summary.message);
                Ok(summary)
            }
            Err(err) => {
                error!("Error procesando documentos: {}", err);
                self.engine = None;
                self.transition(SessionState::AwaitingUpload, err.to_string());
                Err(err)
            }
        }
    }

    async fn run_pipeline(
        &self,
        provider: Arc<dyn RagProvider>,
        files: Vec<UploadedFile>,
    ) -> Result<(QueryEngine, LoadOutcome), RagError> {
        let staging_dir = self.settings.staging_dir.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            ingest::load_documents(files, staging_dir.as_deref())
        })
        .await
        .map_err(|e| RagError::Staging(std::io::Error::other(e)))??;

        let index = index::build_index(provider.as_ref(), &outcome.documents).await?;
        let engine = QueryEngine::configure(
            provider,
            index,
            self.settings.top_k,
            self.settings.similarity_cutoff,
        )?;
        Ok((engine, outcome))
    }

    /// Responde una pregunta con el motor activo. Sin motor no se llama al proveedor.
    pub async fn query(&mut self, question: &str) -> Result<RenderedAnswer, RagError> {
        if self.provider.is_none() {
            return Err(self.reject(RagError::MissingCredential));
        }
        let Some(engine) = self.engine.clone() else {
            return Err(self.reject(RagError::NotIndexed));
        };
        if question.trim().is_empty() {
            return Err(self.reject(RagError::EmptyQuery));
        }

        self.transition(SessionState::Querying, "Procesando consulta...");
        let result = engine.answer(question).await;

        match result {
            Ok(response) => {
                let rendered = render_response(&response);
                self.transition(
                    SessionState::Indexed,
                    format!("Consulta respondida con {} fuentes.", rendered.sources.len()),
                );
                Ok(rendered)
            }
            Err(err) => {
                self.transition(SessionState::Indexed, err.to_string());
                Err(err)
            }
        }
    }
}

/// Prepara la respuesta para mostrarla: texto y fuentes etiquetadas con su similitud.
pub fn render_response(response: &Response) -> RenderedAnswer {
    RenderedAnswer {
        answer: response.text.clone(),
        sources: response
            .sources
            .iter()
            .map(|node| RenderedSource {
                label: format!("Fuente - Similitud: {:.2}", node.score),
                text: node.text.clone(),
                file_name: node.metadata.file_name.clone(),
                page_label: node.metadata.page_label.clone(),
            })
            .collect(),
    }
}
