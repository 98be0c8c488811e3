//! Proveedor determinista para los tests: puntúa por palabras clave y
//! cuenta las llamadas que recibe.

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rig::{
    vector_store::{
        request::{Filter, VectorSearchRequest},
        VectorStoreError, VectorStoreIndex,
    },
    wasm_compat::WasmCompatSend,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    index::{split_into_chunks, IndexHandle},
    models::{DocumentMetadata, DocumentRecord, SourceNode},
    provider::{ProviderFactory, RagProvider},
    vector_store::StoredChunk,
};

const STOPWORDS: &[&str] = &[
    "the", "is", "a", "an", "of", "what", "which", "who", "how", "to", "in", "and", "are",
    "el", "la", "de", "es", "que", "y",
];

pub fn record(file_name: &str, text: &str) -> DocumentRecord {
    DocumentRecord {
        id: Uuid::new_v4(),
        text: text.to_string(),
        metadata: DocumentMetadata {
            file_name: file_name.to_string(),
            file_type: Some("text/plain".to_string()),
            file_size: text.len() as u64,
            page_label: None,
        },
    }
}

fn keywords(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| !w.is_empty() && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Una coincidencia da 0.8, dos 0.89, tres 0.92...; ninguna, 0.
fn keyword_score(query: &HashSet<String>, text: &str) -> f64 {
    let hits = keywords(text).intersection(query).count() as f64;
    hits / (hits + 0.25)
}

/// Índice que puntúa por palabras clave. Devuelve todos los chunks, sin
/// ordenar ni truncar: eso es responsabilidad del motor de consultas.
struct KeywordIndex {
    chunks: Vec<StoredChunk>,
}

impl VectorStoreIndex for KeywordIndex {
    type Filter = Filter<serde_json::Value>;

    async fn top_n<T: for<'a> Deserialize<'a> + WasmCompatSend>(
        &self,
        req: VectorSearchRequest<Self::Filter>,
    ) -> Result<Vec<(f64, String, T)>, VectorStoreError> {
        let query = keywords(req.query());
        let mut hits = Vec::with_capacity(self.chunks.len());
        for (i, chunk) in self.chunks.iter().enumerate() {
            let document: T = serde_json::from_value(serde_json::to_value(chunk)?)?;
            hits.push((keyword_score(&query, &chunk.text), format!("chunk{i}"), document));
        }
        Ok(hits)
    }

    async fn top_n_ids(
        &self,
        req: VectorSearchRequest<Self::Filter>,
    ) -> Result<Vec<(f64, String)>, VectorStoreError> {
        let query = keywords(req.query());
        Ok(self
            .chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| (keyword_score(&query, &chunk.text), format!("chunk{i}")))
            .collect())
    }
}

#[derive(Default)]
pub struct FakeProvider {
    build_error: Option<String>,
    query_error: Option<String>,
    builds: AtomicUsize,
    retrievals: AtomicUsize,
    generations: AtomicUsize,
}

impl FakeProvider {
    pub fn failing_build(reason: &str) -> Self {
        Self {
            build_error: Some(reason.to_string()),
            ..Self::default()
        }
    }

    pub fn failing_query(reason: &str) -> Self {
        Self {
            query_error: Some(reason.to_string()),
            ..Self::default()
        }
    }

    pub fn build_calls(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn retrieve_calls(&self) -> usize {
        self.retrievals.load(Ordering::SeqCst)
    }

    pub fn generate_calls(&self) -> usize {
        self.generations.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.build_calls() + self.retrieve_calls() + self.generate_calls()
    }
}

#[async_trait]
impl RagProvider for FakeProvider {
    async fn build(&self, documents: &[DocumentRecord]) -> Result<IndexHandle> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = &self.build_error {
            return Err(anyhow!(reason.clone()));
        }
        let chunks: Vec<StoredChunk> = documents
            .iter()
            .flat_map(|doc| {
                split_into_chunks(&doc.text, 1200)
                    .into_iter()
                    .map(|text| StoredChunk {
                        text,
                        metadata: doc.metadata.clone(),
                    })
            })
            .collect();
        Ok(IndexHandle::new(
            documents.len(),
            chunks.len(),
            KeywordIndex { chunks },
        ))
    }

    async fn retrieve(
        &self,
        index: &IndexHandle,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SourceNode>> {
        self.retrievals.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = &self.query_error {
            return Err(anyhow!(reason.clone()));
        }
        index.search(query, top_k).await
    }

    async fn generate(&self, query: &str, sources: &[SourceNode]) -> Result<String> {
        self.generations.fetch_add(1, Ordering::SeqCst);
        let context: Vec<&str> = sources.iter().map(|s| s.text.as_str()).collect();
        Ok(format!("Pregunta: {query}\nSegún las fuentes: {}", context.join(" ")))
    }
}

/// Devuelve siempre el mismo proveedor para poder inspeccionarlo desde el test.
pub struct FakeFactory {
    pub provider: Arc<FakeProvider>,
    pub keys: std::sync::Mutex<Vec<String>>,
}

impl FakeFactory {
    pub fn new(provider: FakeProvider) -> Self {
        Self {
            provider: Arc::new(provider),
            keys: std::sync::Mutex::new(Vec::new()),
        }
    }
}

impl ProviderFactory for FakeFactory {
    fn connect(&self, api_key: &str) -> Result<Arc<dyn RagProvider>> {
        self.keys.lock().unwrap().push(api_key.to_string());
        let provider: Arc<dyn RagProvider> = self.provider.clone();
        Ok(provider)
    }
}
