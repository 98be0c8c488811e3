//! Carga y gestión de configuración de la aplicación (servidor + LLM + recuperación).
//!
//! La API Key de OpenAI NO forma parte de la configuración: la introduce el
//! usuario en tiempo de ejecución y sólo vive en memoria durante la sesión.

use std::{env, path::PathBuf, str::FromStr};

use anyhow::{anyhow, Result};

use crate::rag::{DEFAULT_SIMILARITY_CUTOFF, DEFAULT_TOP_K};

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,
    pub open_browser: bool,

    pub llm_chat_model: String,
    pub llm_embedding_model: String,

    pub top_k: usize,
    pub similarity_cutoff: f64,
    pub chunk_max_chars: usize,

    pub staging_dir: Option<PathBuf>,
    pub max_upload_bytes: usize,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Igual que `from_env`, pero leyendo de una fuente arbitraria.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let server_addr = lookup("SERVER_ADDR").unwrap_or_else(|| "127.0.0.1:3322".to_string());
        let open_browser = parse_or(&lookup, "OPEN_BROWSER", true)?;

        let llm_chat_model =
            lookup("LLM_CHAT_MODEL").unwrap_or_else(|| "gpt-3.5-turbo".to_string());
        let llm_embedding_model = lookup("LLM_EMBEDDING_MODEL")
            .unwrap_or_else(|| "text-embedding-ada-002".to_string());

        let top_k: usize = parse_or(&lookup, "RAG_TOP_K", DEFAULT_TOP_K)?;
        if top_k == 0 {
            return Err(anyhow!("RAG_TOP_K debe ser mayor que 0"));
        }
        let similarity_cutoff: f64 = parse_or(&lookup, "RAG_SIMILARITY_CUTOFF", DEFAULT_SIMILARITY_CUTOFF)?;
        if !(0.0..=1.0).contains(&similarity_cutoff) {
            return Err(anyhow!(
                "RAG_SIMILARITY_CUTOFF debe estar entre 0 y 1 (recibido {similarity_cutoff})"
            ));
        }
        let chunk_max_chars: usize = parse_or(&lookup, "CHUNK_MAX_CHARS", 1200)?;
        if chunk_max_chars == 0 {
            return Err(anyhow!("CHUNK_MAX_CHARS debe ser mayor que 0"));
        }

        let staging_dir = lookup("STAGING_DIR")
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from);
        let max_upload_mb: usize = parse_or(&lookup, "MAX_UPLOAD_MB", 200)?;
        let max_upload_bytes = max_upload_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| anyhow!("MAX_UPLOAD_MB es demasiado grande ({max_upload_mb})"))?;

        Ok(Self {
            server_addr,
            open_browser,
            llm_chat_model,
            llm_embedding_model,
            top_k,
            similarity_cutoff,
            chunk_max_chars,
            staging_dir,
            max_upload_bytes,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("Valor no válido para {key} ('{raw}'): {e}")),
        None => Ok(default),
    }
}
