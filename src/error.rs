//! Taxonomía de errores del pipeline (carga → índice → consulta) y su
//! traducción a respuestas HTTP.
//!
//! Ningún error termina el proceso: todos llegan hasta el controlador de
//! sesión, que los registra y los muestra al usuario.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("Formato de fichero no soportado: '{0}' (sólo .txt, .pdf, .docx y .md)")]
    UnsupportedFormat(String),

    #[error("No se pudo extraer texto de '{file}': {reason}")]
    DecodeFailed { file: String, reason: String },

    #[error("¡No hay documentos que indexar!")]
    EmptyCorpus,

    #[error("Error creando el índice: {0}")]
    IndexBuildFailed(String),

    #[error("Error procesando la consulta: {0}")]
    QueryFailed(String),

    #[error("Por favor, introduce tu API Key de OpenAI para continuar.")]
    MissingCredential,

    #[error("Todavía no hay documentos procesados. Sube y procesa documentos antes de consultar.")]
    NotIndexed,

    #[error("La consulta está vacía.")]
    EmptyQuery,

    #[error("Parámetros de recuperación no válidos: {0}")]
    InvalidParameters(String),

    #[error("Petición de subida no válida: {0}")]
    InvalidUpload(String),

    #[error("Error preparando los ficheros subidos: {0}")]
    Staging(#[from] std::io::Error),
}

impl RagError {
    pub fn decode_failed(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DecodeFailed {
            file: file.into(),
            reason: reason.into(),
        }
    }

    /// Nombre estable del tipo de error, expuesto al frontend.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat(_) => "UnsupportedFormat",
            Self::DecodeFailed { .. } => "DecodeFailed",
            Self::EmptyCorpus => "EmptyCorpus",
            Self::IndexBuildFailed(_) => "IndexBuildFailed",
            Self::QueryFailed(_) => "QueryFailed",
            Self::MissingCredential => "MissingCredential",
            Self::NotIndexed => "NotIndexed",
            Self::EmptyQuery => "EmptyQuery",
            Self::InvalidParameters(_) => "InvalidParameters",
            Self::InvalidUpload(_) => "InvalidUpload",
            Self::Staging(_) => "Staging",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UnsupportedFormat(_)
            | Self::DecodeFailed { .. }
            | Self::EmptyCorpus
            | Self::EmptyQuery
            | Self::InvalidParameters(_)
            | Self::InvalidUpload(_)
            | Self::MissingCredential => StatusCode::BAD_REQUEST,
            Self::NotIndexed => StatusCode::CONFLICT,
            Self::IndexBuildFailed(_) | Self::QueryFailed(_) => StatusCode::BAD_GATEWAY,
            Self::Staging(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RagError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.to_string(),
            "kind": self.kind(),
        }));
        (self.status_code(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_errors_map_to_client_status_codes() {
        assert_eq!(RagError::EmptyCorpus.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(RagError::NotIndexed.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            RagError::MissingCredential.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RagError::QueryFailed("timeout".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn messages_carry_the_provider_reason() {
        let err = RagError::IndexBuildFailed("401 Unauthorized".into());
        assert_eq!(err.kind(), "IndexBuildFailed");
        assert!(err.to_string().contains("401 Unauthorized"));

        let err = RagError::decode_failed("informe.pdf", "sin texto");
        assert!(err.to_string().contains("informe.pdf"));
    }
}
