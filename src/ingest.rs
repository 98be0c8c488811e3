//! Carga de los ficheros subidos: se copian a un directorio temporal, se
//! recorren y se convierten en `DocumentRecord`s de texto normalizado.
//!
//! El directorio temporal se elimina siempre antes de devolver el control,
//! también cuando falla la extracción de algún fichero.

use std::{fs, path::Path};

use mime_guess::MimeGuess;
use tempfile::TempDir;
use tracing::{info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::{
    error::RagError,
    models::{DocumentMetadata, DocumentRecord, UploadedFile},
};

/// Formatos aceptados por el cargador.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Text,
    Markdown,
    Pdf,
    Docx,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension().and_then(std::ffi::OsStr::to_str)?;
        match extension.to_lowercase().as_str() {
            "txt" => Some(Self::Text),
            "md" => Some(Self::Markdown),
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            _ => None,
        }
    }

    pub fn from_file_name(name: &str) -> Option<Self> {
        Self::from_path(Path::new(name))
    }
}

/// Resultado de cargar un lote: documentos extraídos y ficheros descartados.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub documents: Vec<DocumentRecord>,
    pub rejected: Vec<RagError>,
}

impl LoadOutcome {
    /// Número de ficheros distintos de los que se obtuvo al menos un documento.
    pub fn files_loaded(&self) -> usize {
        let mut names: Vec<&str> = self
            .documents
            .iter()
            .map(|d| d.metadata.file_name.as_str())
            .collect();
        names.sort_unstable();
        names.dedup();
        names.len()
    }
}

/// Carga un lote de ficheros subidos.
///
/// Los ficheros con extensión no soportada o que no producen texto se
/// registran en `rejected` y no detienen al resto del lote. Un lote vacío
/// produce una lista vacía de documentos.
pub fn load_documents(
    files: Vec<UploadedFile>,
    staging_root: Option<&Path>,
) -> Result<LoadOutcome, RagError> {
    let staging = create_staging_dir(staging_root)?;
    let mut outcome = LoadOutcome::default();

    for file in files {
        let Some(name) = sanitize_file_name(&file.name) else {
            warn!("Nombre de fichero no válido en la subida: '{}'", file.name);
            outcome.rejected.push(RagError::UnsupportedFormat(file.name));
            continue;
        };
        if DocumentFormat::from_file_name(&name).is_none() {
            info!("Saltando fichero con extensión no soportada: {}", name);
            outcome.rejected.push(RagError::UnsupportedFormat(name));
            continue;
        }
        fs::write(staging.path().join(&name), &file.data)?;
    }

    for entry in WalkDir::new(staging.path())
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        match load_file(entry.path()) {
            Ok(records) => outcome.documents.extend(records),
            Err(err) => {
                warn!("{}", err);
                outcome.rejected.push(err);
            }
        }
    }

    staging.close()?;

    info!(
        "Cargados {} documentos de {} ficheros ({} descartados).",
        outcome.documents.len(),
        outcome.files_loaded(),
        outcome.rejected.len()
    );
    Ok(outcome)
}

fn create_staging_dir(root: Option<&Path>) -> Result<TempDir, RagError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("rag-upload-");
    let dir = match root {
        Some(root) => {
            fs::create_dir_all(root)?;
            builder.tempdir_in(root)?
        }
        None => builder.tempdir()?,
    };
    Ok(dir)
}

/// Se queda sólo con el último componente para que una subida no pueda
/// escribir fuera del directorio temporal.
fn sanitize_file_name(raw: &str) -> Option<String> {
    let name = Path::new(raw.trim()).file_name()?.to_string_lossy().to_string();
    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name)
    }
}

fn load_file(path: &Path) -> Result<Vec<DocumentRecord>, RagError> {
    let file_name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string());
    let format = DocumentFormat::from_path(path)
        .ok_or_else(|| RagError::UnsupportedFormat(file_name.clone()))?;
    let file_size = fs::metadata(path)?.len();
    let file_type = MimeGuess::from_path(path).first().map(|m| m.to_string());

    let pages: Vec<(Option<String>, String)> = match format {
        DocumentFormat::Text | DocumentFormat::Markdown => {
            let bytes = fs::read(path)?;
            vec![(None, String::from_utf8_lossy(&bytes).into_owned())]
        }
        DocumentFormat::Pdf => pdf_extract::extract_text_by_pages(path)
            .map_err(|e| RagError::decode_failed(&file_name, e.to_string()))?
            .into_iter()
            .enumerate()
            .map(|(idx, text)| (Some((idx + 1).to_string()), text))
            .collect(),
        DocumentFormat::Docx => {
            let bytes = fs::read(path)?;
            vec![(None, extract_docx_text(&bytes).map_err(|reason| {
                RagError::decode_failed(&file_name, reason)
            })?)]
        }
    };

    let records: Vec<DocumentRecord> = pages
        .into_iter()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(page_label, text)| DocumentRecord {
            id: Uuid::new_v4(),
            text: normalize_text(&text),
            metadata: DocumentMetadata {
                file_name: file_name.clone(),
                file_type: file_type.clone(),
                file_size,
                page_label,
            },
        })
        .collect();

    if records.is_empty() {
        return Err(RagError::decode_failed(file_name, "el fichero no contiene texto"));
    }
    Ok(records)
}

fn extract_docx_text(bytes: &[u8]) -> Result<String, String> {
    let docx = docx_rs::read_docx(bytes).map_err(|e| e.to_string())?;

    let mut paragraphs = Vec::new();
    for child in docx.document.children {
        if let docx_rs::DocumentChild::Paragraph(paragraph) = child {
            let mut line = String::new();
            for p_child in &paragraph.children {
                if let docx_rs::ParagraphChild::Run(run) = p_child {
                    for r_child in &run.children {
                        if let docx_rs::RunChild::Text(t) = r_child {
                            line.push_str(&t.text);
                        }
                    }
                }
            }
            paragraphs.push(line);
        }
    }
    Ok(paragraphs.join("\n"))
}

// Quita los NUL y los espacios sobrantes que deja la extracción de PDF.
fn normalize_text(text: &str) -> String {
    text.replace('\0', "")
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
