use parking_lot::RwLock;
use std::sync::Arc;

use crate::config::{Config, LlmConfig};
use crate::engine::RagEngine;
use crate::llm::{Embedder, Generator, OllamaChat, OllamaEmbedder};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub engine: Arc<RagEngine>,
    pub llm_config: Arc<RwLock<LlmConfig>>,
    pub ingest_semaphore: Arc<tokio::sync::Semaphore>,
    pub chat_semaphore: Arc<tokio::sync::Semaphore>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(120))
            .build()?;

        // The clients read model names through the same lock the config
        // API writes, so updates apply without rebuilding them
        let llm_config = Arc::new(RwLock::new(config.llm.clone()));
        let embedder = Arc::new(OllamaEmbedder::new(http_client.clone(), llm_config.clone()));
        let generator = Arc::new(OllamaChat::new(http_client, llm_config.clone()));

        Self::build(config, llm_config, embedder, generator)
    }

    /// Build state over explicit backends; used directly by tests that
    /// run the API handlers without a live model.
    pub fn with_backends(
        config: Config,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> anyhow::Result<Self> {
        let llm_config = Arc::new(RwLock::new(config.llm.clone()));
        Self::build(config, llm_config, embedder, generator)
    }

    fn build(
        config: Config,
        llm_config: Arc<RwLock<LlmConfig>>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        std::fs::create_dir_all(config.index_dir())?;

        let engine = RagEngine::new(config.clone(), embedder, generator)?;

        Ok(Self {
            config,
            engine: Arc::new(engine),
            llm_config,
            // One ingest at a time: the index swap is whole-book
            ingest_semaphore: Arc::new(tokio::sync::Semaphore::new(1)),
            chat_semaphore: Arc::new(tokio::sync::Semaphore::new(3)),
        })
    }
}
