use axum::extract::DefaultBodyLimit;
use axum::response::Html;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tracing_subscriber::EnvFilter;

use book_chat::api;
use book_chat::config::Config;
use book_chat::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!(
        "LLM backend: {} (chat: {}, embeddings: {})",
        config.llm.base_url,
        config.llm.chat_model,
        config.llm.embedding_model
    );

    let max_body = config.max_upload_mb as usize * 1024 * 1024 + 1024;
    let state = AppState::new(config.clone())?;

    // No CORS layer: the SPA is served from the same origin so cross-origin
    // access is unnecessary. This prevents drive-by attacks from malicious pages.
    let app = Router::new()
        // Serve frontend
        .route("/", get(serve_index))
        // API routes
        .route("/api/book", post(api::book::upload_book))
        .route("/api/book", get(api::book::book_status))
        .route("/api/book", delete(api::book::delete_book))
        .route("/api/book/pages/{index}", get(api::book::get_page))
        .route("/api/ask", post(api::ask::ask))
        .route("/api/chat", post(api::chat::chat))
        .route("/api/models", get(api::config::list_models))
        .route("/api/config", get(api::config::get_config))
        .route("/api/config", put(api::config::update_config))
        .layer(DefaultBodyLimit::max(max_body))
        .with_state(state)
        .fallback(get(serve_index));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn serve_index() -> Html<&'static str> {
    Html(include_str!("../static/index.html"))
}
