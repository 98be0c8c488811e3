//! Construcción del índice a partir de un lote de documentos.

use std::sync::Arc;

use anyhow::Result;
use rig::vector_store::VectorStoreIndexDyn;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    error::RagError,
    models::{DocumentRecord, SourceNode},
    provider::RagProvider,
    vector_store,
};

/// Índice opaco devuelto por el proveedor. Se sustituye entero cada vez que
/// se procesa un lote nuevo.
#[derive(Clone)]
pub struct IndexHandle {
    id: Uuid,
    document_count: usize,
    chunk_count: usize,
    search: Arc<dyn VectorStoreIndexDyn>,
}

impl std::fmt::Debug for IndexHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexHandle")
            .field("id", &self.id)
            .field("document_count", &self.document_count)
            .field("chunk_count", &self.chunk_count)
            .finish_non_exhaustive()
    }
}

impl IndexHandle {
    pub fn new(
        document_count: usize,
        chunk_count: usize,
        search: impl VectorStoreIndexDyn + 'static,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_count,
            chunk_count,
            search: Arc::new(search),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn document_count(&self) -> usize {
        self.document_count
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    /// Los `top_k` chunks más parecidos a la consulta, sin orden garantizado.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SourceNode>> {
        vector_store::top_chunks(self.search.as_ref(), query, top_k).await
    }
}

/// Entrega los documentos al proveedor y devuelve el índice resultante.
///
/// Un lote vacío se rechaza con `EmptyCorpus` sin llamar al proveedor.
/// Cualquier fallo del proveedor se devuelve como `IndexBuildFailed`; no se
/// reintenta ni se conserva nada parcial.
pub async fn build_index(
    provider: &dyn RagProvider,
    documents: &[DocumentRecord],
) -> Result<IndexHandle, RagError> {
    if documents.is_empty() {
        return Err(RagError::EmptyCorpus);
    }

    match provider.build(documents).await {
        Ok(index) => {
            info!(
                "Índice {} creado: {} documentos, {} chunks.",
                index.id(),
                index.document_count(),
                index.chunk_count()
            );
            Ok(index)
        }
        Err(e) => {
            error!("Error de creación del índice: {:#}", e);
            Err(RagError::IndexBuildFailed(format!("{:#}", e)))
        }
    }
}

/// Agrupa párrafos en chunks de como mucho `max_chars` caracteres.
/// Un párrafo más largo que el límite se corta en trozos de `max_chars`.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }

        let paragraph_len = paragraph.chars().count();
        if paragraph_len > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            let chars: Vec<char> = paragraph.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        if current.chars().count() + paragraph_len + 2 > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{record, FakeProvider};
    use tokio_test::assert_err;

    #[test]
    fn paragraphs_are_packed_up_to_the_limit() {
        let text = "uno\n\ndos\n\n\n\ntres";
        assert_eq!(split_into_chunks(text, 100), vec!["uno\n\ndos\n\ntres"]);
        assert_eq!(split_into_chunks(text, 8), vec!["uno\n\ndos", "tres"]);
        assert!(split_into_chunks("  \n\n ", 10).is_empty());
    }

    #[test]
    fn oversized_paragraphs_are_cut() {
        let text = format!("corto\n\n{}", "x".repeat(25));
        let chunks = split_into_chunks(&text, 10);
        assert_eq!(chunks[0], "corto");
        assert_eq!(chunks[1..], ["x".repeat(10), "x".repeat(10), "x".repeat(5)]);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
    }

    #[tokio::test]
    async fn empty_corpus_never_reaches_the_provider() {
        let provider = FakeProvider::default();
        let err = assert_err!(build_index(&provider, &[]).await);
        assert!(matches!(err, RagError::EmptyCorpus));
        assert_eq!(provider.build_calls(), 0);
    }

    #[tokio::test]
    async fn provider_failures_become_index_build_failed() {
        let provider = FakeProvider::failing_build("429 Too Many Requests");
        let err = assert_err!(build_index(&provider, &[record("a.txt", "texto")]).await);
        match err {
            RagError::IndexBuildFailed(reason) => assert!(reason.contains("429")),
            other => panic!("error inesperado: {other:?}"),
        }
        assert_eq!(provider.build_calls(), 1);
    }

    #[tokio::test]
    async fn successful_build_keeps_every_chunk() {
        let provider = FakeProvider::default();
        let docs = [record("a.txt", "The sky is blue."), record("b.txt", "Grass is green.")];
        let index = build_index(&provider, &docs).await.unwrap();
        assert_eq!(index.document_count(), 2);
        assert_eq!(index.chunk_count(), 2);
    }
}
