use axum::extract::State;
use axum::Json;

use crate::models::{LlmConfigUpdate, ModelsResponse};
use crate::state::AppState;

/// GET /api/config - Current LLM config.
pub async fn get_config(State(state): State<AppState>) -> Json<crate::config::LlmConfig> {
    Json(state.llm_config.read().clone())
}

/// PUT /api/config - Update LLM config.
pub async fn update_config(
    State(state): State<AppState>,
    Json(update): Json<LlmConfigUpdate>,
) -> Json<crate::config::LlmConfig> {
    let mut config = state.llm_config.write();

    // base_url is immutable at runtime (set via LLM_BASE_URL env var only)
    // to prevent SSRF from a compromised browser session
    if let Some(chat_model) = update.chat_model {
        config.chat_model = chat_model;
    }
    if let Some(embedding_model) = update.embedding_model {
        config.embedding_model = embedding_model;
    }
    if let Some(embedding_dim) = update.embedding_dim {
        config.embedding_dim = embedding_dim;
    }

    Json(config.clone())
}

/// GET /api/models - Backend reachability and installed model names.
pub async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    match state.engine.available_models().await {
        Ok(models) => Json(ModelsResponse {
            available: true,
            models,
        }),
        Err(e) => {
            tracing::warn!("Model listing failed: {e}");
            Json(ModelsResponse {
                available: false,
                models: Vec::new(),
            })
        }
    }
}
