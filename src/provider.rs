//! Interfaz estrecha con el proveedor externo de embeddings, índice y LLM.
//!
//! El pipeline sólo conoce estas tres operaciones; la implementación real
//! (OpenAI vía Rig) vive en `llm.rs`.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::{
    index::IndexHandle,
    models::{DocumentRecord, SourceNode},
};

#[async_trait]
pub trait RagProvider: Send + Sync {
    /// Trocea, vectoriza y almacena un lote de documentos.
    async fn build(&self, documents: &[DocumentRecord]) -> Result<IndexHandle>;

    /// Devuelve hasta `top_k` chunks del índice con su similitud respecto a la consulta.
    async fn retrieve(
        &self,
        index: &IndexHandle,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SourceNode>>;

    /// Sintetiza una respuesta a partir de la consulta y las fuentes filtradas.
    async fn generate(&self, query: &str, sources: &[SourceNode]) -> Result<String>;
}

/// Crea un proveedor a partir de la API Key introducida por el usuario.
pub trait ProviderFactory: Send + Sync {
    fn connect(&self, api_key: &str) -> Result<Arc<dyn RagProvider>>;
}
