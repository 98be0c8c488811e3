//! Modelos de dominio: ficheros subidos, documentos normalizados y respuestas.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fichero tal y como llega del formulario de subida.
/// Sólo vive hasta que se escribe en el directorio temporal.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub data: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

/// Metadatos de origen que acompañan a cada documento y a cada fuente citada.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub file_name: String,
    pub file_type: Option<String>,
    pub file_size: u64,
    /// Número de página (sólo PDF).
    pub page_label: Option<String>,
}

/// Unidad de texto normalizada extraída de un fichero.
/// Un PDF produce un registro por página; el resto, uno por fichero.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    /// Prefijo de los identificadores de sus chunks en el índice.
    pub id: Uuid,
    pub text: String,
    pub metadata: DocumentMetadata,
}

/// Fragmento recuperado del índice junto con su puntuación de similitud.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceNode {
    pub text: String,
    pub score: f64,
    pub metadata: DocumentMetadata,
}

/// Resultado de una consulta: respuesta en lenguaje natural y fuentes
/// ordenadas por similitud descendente.
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub text: String,
    pub sources: Vec<SourceNode>,
}
