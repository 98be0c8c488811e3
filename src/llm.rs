//! Proveedor OpenAI sobre Rig: embeddings para construir el índice y para
//! las consultas, y modelo de chat (temperatura 0) para sintetizar respuestas.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rig::completion::Prompt;
use rig::embeddings::EmbeddingModel; // <- para .embed_texts
use rig::providers::openai;
use tracing::{debug, info};

use crate::{
    config::AppConfig,
    index::{split_into_chunks, IndexHandle},
    models::{DocumentRecord, SourceNode},
    provider::{ProviderFactory, RagProvider},
    vector_store::{in_memory_store, StoredChunk},
};

// La API de embeddings admite lotes grandes, pero no ilimitados.
const EMBEDDING_BATCH_SIZE: usize = 256;

const SYSTEM_PROMPT: &str = r#"
You are an expert Q&A system that is trusted around the world.
Always answer the query using the provided context information, and not prior knowledge.
Never directly reference the given context in your answer.
"#;

/// Gestor de LLMs y embeddings para una API Key concreta.
#[derive(Clone)]
pub struct LlmManager {
    api_key: String,
    pub embedding_model: String,
    pub chat_model: String,
    pub temperature: f64,
    pub chunk_max_chars: usize,
}

// La API Key nunca aparece en los logs.
impl std::fmt::Debug for LlmManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmManager")
            .field("embedding_model", &self.embedding_model)
            .field("chat_model", &self.chat_model)
            .field("temperature", &self.temperature)
            .field("chunk_max_chars", &self.chunk_max_chars)
            .finish_non_exhaustive()
    }
}

impl LlmManager {
    /// Construye el manager a partir de la configuración y la API Key del usuario.
    pub fn from_config(cfg: &AppConfig, api_key: &str) -> Result<Self> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(anyhow!("La API Key de OpenAI está vacía"));
        }
        Ok(Self {
            api_key: api_key.to_string(),
            embedding_model: cfg.llm_embedding_model.clone(),
            chat_model: cfg.llm_chat_model.clone(),
            temperature: 0.0,
            chunk_max_chars: cfg.chunk_max_chars,
        })
    }

    fn client(&self) -> openai::Client {
        openai::Client::new(&self.api_key)
    }

    // ---------------------------------------------------------------------
    // EMBEDDINGS
    // ---------------------------------------------------------------------

    /// Calcula embeddings para una lista de textos, en lotes, conservando el orden.
    pub async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f64>>> {
        // Trait para client.embedding_model(...)
        use rig::client::EmbeddingsClient as _;

        let embedding_model = self.client().embedding_model(&self.embedding_model);

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBEDDING_BATCH_SIZE) {
            let embeddings = embedding_model.embed_texts(batch.to_vec()).await?;
            if embeddings.len() != batch.len() {
                return Err(anyhow!(
                    "Número de embeddings ({}) distinto al número de chunks ({})",
                    embeddings.len(),
                    batch.len()
                ));
            }
            vectors.extend(embeddings.into_iter().map(|e| e.vec));
        }
        Ok(vectors)
    }

    // ---------------------------------------------------------------------
    // CHAT / COMPLETION
    // ---------------------------------------------------------------------

    /// Genera una respuesta a partir de una pregunta y un contexto
    /// (concatenación de chunks relevantes).
    pub async fn answer_with_context(&self, question: &str, context: &str) -> Result<String> {
        // Trait para client.agent(...)
        use rig::client::CompletionClient as _;

        let agent = self
            .client()
            .agent(&self.chat_model)
            .preamble(SYSTEM_PROMPT)
            .temperature(self.temperature)
            .build();

        let answer = agent.prompt(build_qa_prompt(question, context)).await?;
        Ok(answer.trim().to_string())
    }
}

/// Plantilla de pregunta-respuesta con contexto.
pub fn build_qa_prompt(question: &str, context: &str) -> String {
    format!(
        "Context information is below.\n\
         ---------------------\n\
         {context}\n\
         ---------------------\n\
         Given the context information and not prior knowledge, answer the query.\n\
         Query: {question}\n\
         Answer: "
    )
}

fn join_sources(sources: &[SourceNode]) -> String {
    sources
        .iter()
        .map(|s| format!("file_name: {}\n\n{}", s.metadata.file_name, s.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl RagProvider for LlmManager {
    async fn build(&self, documents: &[DocumentRecord]) -> Result<IndexHandle> {
        // Trait para client.embedding_model(...)
        use rig::client::EmbeddingsClient as _;

        let mut ids = Vec::new();
        let mut chunks = Vec::new();
        for doc in documents {
            for (n, text) in split_into_chunks(&doc.text, self.chunk_max_chars)
                .into_iter()
                .enumerate()
            {
                ids.push(format!("{}-{}", doc.id, n));
                chunks.push(StoredChunk {
                    text,
                    metadata: doc.metadata.clone(),
                });
            }
        }
        if chunks.is_empty() {
            return Err(anyhow!("Los documentos no contienen texto indexable"));
        }

        info!(
            "Generando embeddings de {} chunks con '{}'...",
            chunks.len(),
            self.embedding_model
        );
        let texts = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embed_texts(texts).await?;

        let chunk_count = chunks.len();
        let store = in_memory_store(
            ids.into_iter()
                .zip(chunks)
                .zip(vectors)
                .map(|((id, chunk), embedding)| (id, chunk, embedding))
                .collect(),
        );

        // El índice conserva el modelo para vectorizar las consultas.
        let model = self.client().embedding_model(&self.embedding_model);
        Ok(IndexHandle::new(documents.len(), chunk_count, store.index(model)))
    }

    async fn retrieve(
        &self,
        index: &IndexHandle,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SourceNode>> {
        let hits = index.search(query, top_k).await?;
        debug!("Recuperados {} chunks del índice {}", hits.len(), index.id());
        Ok(hits)
    }

    async fn generate(&self, query: &str, sources: &[SourceNode]) -> Result<String> {
        self.answer_with_context(query, &join_sources(sources)).await
    }
}

/// Crea un `LlmManager` de OpenAI por cada API Key introducida.
#[derive(Debug, Clone)]
pub struct OpenAiConnector {
    config: AppConfig,
}

impl OpenAiConnector {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }
}

impl ProviderFactory for OpenAiConnector {
    fn connect(&self, api_key: &str) -> Result<Arc<dyn RagProvider>> {
        let manager = LlmManager::from_config(&self.config, api_key)?;
        info!(
            "Proveedor OpenAI listo (chat: {}, embeddings: {}).",
            manager.chat_model, manager.embedding_model
        );
        Ok(Arc::new(manager))
    }
}
