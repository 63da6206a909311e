use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where the vector snapshot and book state are stored
    pub data_dir: PathBuf,
    /// Server bind address
    pub bind_addr: String,
    /// LLM backend configuration
    pub llm: LlmConfig,
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Overlap between adjacent chunks in characters (must be < chunk_size)
    pub chunk_overlap: usize,
    /// Number of passages retrieved per question
    pub top_k: usize,
    /// Maximum upload size in MB
    pub max_upload_mb: u64,
    /// Maximum chat history messages forwarded to the model
    /// (20 messages = 10 user/assistant exchanges)
    pub max_history_turns: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the local Ollama instance
    pub base_url: String,
    /// Model name for answer generation
    pub chat_model: String,
    /// Model name for embeddings
    pub embedding_model: String,
    /// Embedding vector dimension
    pub embedding_dim: usize,
    /// Bounded wait for a (non-streaming) generation call
    pub generation_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            bind_addr: "127.0.0.1:8080".to_string(),
            llm: LlmConfig::default(),
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 5,
            max_upload_mb: 100,
            max_history_turns: 20,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            chat_model: "llama3.2".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            embedding_dim: 768,
            generation_timeout_secs: 120,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("BOOK_CHAT_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(addr) = std::env::var("BOOK_CHAT_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_CHAT_MODEL") {
            config.llm.chat_model = model;
        }
        if let Ok(model) = std::env::var("LLM_EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }
        if let Ok(dim) = std::env::var("LLM_EMBEDDING_DIM") {
            if let Ok(d) = dim.parse() {
                config.llm.embedding_dim = d;
            }
        }
        if let Ok(val) = std::env::var("LLM_GENERATION_TIMEOUT_SECS") {
            if let Ok(v) = val.parse() {
                config.llm.generation_timeout_secs = v;
            }
        }
        if let Ok(val) = std::env::var("BOOK_CHAT_CHUNK_SIZE") {
            if let Ok(v) = val.parse() {
                config.chunk_size = v;
            }
        }
        if let Ok(val) = std::env::var("BOOK_CHAT_CHUNK_OVERLAP") {
            if let Ok(v) = val.parse() {
                config.chunk_overlap = v;
            }
        }
        if let Ok(val) = std::env::var("BOOK_CHAT_TOP_K") {
            if let Ok(v) = val.parse() {
                config.top_k = v;
            }
        }
        if let Ok(val) = std::env::var("BOOK_CHAT_MAX_UPLOAD_MB") {
            if let Ok(v) = val.parse() {
                config.max_upload_mb = v;
            }
        }
        if let Ok(val) = std::env::var("BOOK_CHAT_MAX_HISTORY_TURNS") {
            if let Ok(v) = val.parse() {
                config.max_history_turns = v;
            }
        }

        config
    }

    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join("index")
    }

    pub fn book_path(&self) -> PathBuf {
        self.data_dir.join("book.json")
    }
}
