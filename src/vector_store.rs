//! Almacén vectorial en memoria para los chunks de un índice, sobre
//! `InMemoryVectorStore` de Rig.
//!
//! API pública:
//!   - `in_memory_store(Vec<(id, StoredChunk, embedding)>)`
//!   - `top_chunks(&dyn VectorStoreIndexDyn, query, top_k)`
//!
//! El índice de Rig vectoriza la consulta y puntúa por similitud coseno;
//! no devuelve los resultados ordenados.

use anyhow::Result;
use rig::{
    embeddings::Embedding,
    vector_store::{
        in_memory_store::InMemoryVectorStore,
        request::{Filter, VectorSearchRequest},
        VectorStoreIndexDyn,
    },
    OneOrMany,
};
use serde::{Deserialize, Serialize};

use crate::models::{DocumentMetadata, SourceNode};

/// Chunk de texto con los metadatos del documento de origen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredChunk {
    pub text: String,
    pub metadata: DocumentMetadata,
}

/// Construye el almacén a partir de chunks ya vectorizados.
pub fn in_memory_store(
    chunks: Vec<(String, StoredChunk, Vec<f64>)>,
) -> InMemoryVectorStore<StoredChunk> {
    InMemoryVectorStore::from_documents_with_ids(chunks.into_iter().map(|(id, chunk, vec)| {
        let embedding = Embedding {
            document: chunk.text.clone(),
            vec,
        };
        (id, chunk, OneOrMany::one(embedding))
    }))
}

/// Búsqueda semántica: como mucho `top_k` chunks con su similitud.
pub async fn top_chunks(
    index: &dyn VectorStoreIndexDyn,
    query: &str,
    top_k: usize,
) -> Result<Vec<SourceNode>> {
    let request = VectorSearchRequest::<Filter<serde_json::Value>>::builder()
        .query(query)
        .samples(top_k as u64)
        .build()?;

    let mut hits = Vec::new();
    for (score, _id, document) in index.top_n(request).await? {
        let chunk: StoredChunk = serde_json::from_value(document)?;
        hits.push(SourceNode {
            text: chunk.text,
            score,
            metadata: chunk.metadata,
        });
    }
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rig::embeddings::{EmbeddingError, EmbeddingModel};

    // Modelo de embeddings fijo: cada texto conocido tiene su vector.
    #[derive(Clone)]
    struct AxisModel;

    impl AxisModel {
        fn vector(text: &str) -> Vec<f64> {
            match text {
                "exacto" | "consulta" => vec![1.0, 0.0],
                "cercano" => vec![0.9, 0.1],
                _ => vec![0.0, 1.0],
            }
        }
    }

    impl EmbeddingModel for AxisModel {
        const MAX_DOCUMENTS: usize = 16;

        fn ndims(&self) -> usize {
            2
        }

        async fn embed_texts(
            &self,
            texts: impl IntoIterator<Item = String>,
        ) -> Result<Vec<Embedding>, EmbeddingError> {
            Ok(texts
                .into_iter()
                .map(|text| Embedding {
                    vec: Self::vector(&text),
                    document: text,
                })
                .collect())
        }
    }

    fn chunk(id: &str, text: &str) -> (String, StoredChunk, Vec<f64>) {
        let stored = StoredChunk {
            text: text.to_string(),
            metadata: DocumentMetadata {
                file_name: "doc.txt".to_string(),
                file_type: Some("text/plain".to_string()),
                file_size: text.len() as u64,
                page_label: None,
            },
        };
        (id.to_string(), stored, AxisModel::vector(text))
    }

    #[tokio::test]
    async fn search_keeps_the_best_chunks_within_top_k() {
        let store = in_memory_store(vec![
            chunk("a-0", "lejano"),
            chunk("a-1", "exacto"),
            chunk("b-0", "cercano"),
        ]);
        assert_eq!(store.len(), 3);
        let index = store.index(AxisModel);

        let mut hits = top_chunks(&index, "consulta", 2).await.unwrap();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "exacto");
        assert!((hits[0].score - 1.0).abs() < 1e-9);
        assert_eq!(hits[1].text, "cercano");
        assert_eq!(hits[1].metadata.file_name, "doc.txt");

        assert_eq!(top_chunks(&index, "consulta", 10).await.unwrap().len(), 3);
    }
}
