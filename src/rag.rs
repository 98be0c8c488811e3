//! Motor de consultas RAG sobre un índice ya construido.
//!
//! Flujo:
//!   1. Recuperación de los `top_k` chunks más parecidos a la pregunta.
//!   2. Orden por similitud descendente y descarte de los que no llegan al corte.
//!   3. Si queda alguna fuente, el LLM responde usando sólo ese contexto.
//!
//! Cada consulta es todo-o-nada: ante un fallo no hay respuesta ni fuentes.

use std::sync::Arc;

use tracing::{error, info};

use crate::{
    error::RagError,
    index::IndexHandle,
    models::{Response, SourceNode},
    provider::RagProvider,
};

pub const DEFAULT_TOP_K: usize = 4;
pub const DEFAULT_SIMILARITY_CUTOFF: f64 = 0.75;

/// Respuesta cuando ninguna fuente supera el corte de similitud.
pub const NO_RELEVANT_INFO: &str =
    "No se encontró información relevante en los documentos para responder a esta pregunta.";

/// Índice + parámetros de recuperación. No guarda estado entre consultas.
#[derive(Clone)]
pub struct QueryEngine {
    provider: Arc<dyn RagProvider>,
    index: IndexHandle,
    top_k: usize,
    similarity_cutoff: f64,
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("index", &self.index.id())
            .field("top_k", &self.top_k)
            .field("similarity_cutoff", &self.similarity_cutoff)
            .finish()
    }
}

impl QueryEngine {
    pub fn configure(
        provider: Arc<dyn RagProvider>,
        index: IndexHandle,
        top_k: usize,
        similarity_cutoff: f64,
    ) -> Result<Self, RagError> {
        if top_k == 0 {
            return Err(RagError::InvalidParameters(
                "top_k debe ser mayor que 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&similarity_cutoff) {
            return Err(RagError::InvalidParameters(format!(
                "el corte de similitud debe estar entre 0 y 1 (recibido {similarity_cutoff})"
            )));
        }
        Ok(Self {
            provider,
            index,
            top_k,
            similarity_cutoff,
        })
    }

    pub fn index(&self) -> &IndexHandle {
        &self.index
    }

    /// Lanza una consulta RAG y devuelve la respuesta con sus fuentes.
    pub async fn answer(&self, question: &str) -> Result<Response, RagError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::EmptyQuery);
        }

        let retrieved = self
            .provider
            .retrieve(&self.index, question, self.top_k)
            .await
            .map_err(query_failed)?;
        let sources = postprocess(retrieved, self.top_k, self.similarity_cutoff);

        if sources.is_empty() {
            info!("Ninguna fuente supera el corte de {:.2}.", self.similarity_cutoff);
            return Ok(Response {
                text: NO_RELEVANT_INFO.to_string(),
                sources,
            });
        }

        let text = self
            .provider
            .generate(question, &sources)
            .await
            .map_err(query_failed)?;

        info!("Consulta respondida con {} fuentes.", sources.len());
        Ok(Response { text, sources })
    }
}

fn query_failed(e: anyhow::Error) -> RagError {
    error!("Error de consulta: {:#}", e);
    RagError::QueryFailed(format!("{:#}", e))
}

/// Orden por score DESC, recorte a `top_k` y después el corte de similitud.
fn postprocess(mut nodes: Vec<SourceNode>, top_k: usize, cutoff: f64) -> Vec<SourceNode> {
    nodes.sort_by(|a, b| b.score.total_cmp(&a.score));
    nodes.truncate(top_k);
    nodes.retain(|node| node.score >= cutoff);
    nodes
}
