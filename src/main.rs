mod commands;
mod config;
mod error;
mod format;
mod session;
mod ssh;
mod state;
#[cfg(test)]
mod testing;
mod websocket;
mod wire;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::Dispatcher;
use crate::config::Config;
use crate::session::SessionManager;
use crate::ssh::{RusshBackend, SshBackend};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fluxui=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        "SSH target {}@{}:{}",
        config.target.username,
        config.target.host,
        config.target.port
    );

    let backend = RusshBackend::new(tokio::runtime::Handle::current());
    let sessions = SessionManager::new(backend, config.target.clone());
    let app_state = AppState::new(Dispatcher::new(sessions));

    let app = app(app_state);

    tracing::info!("Listening on {}", config.listen);

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen))?;
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

fn app<B>(state: AppState<B>) -> Router
where
    B: SshBackend + Send + 'static,
    B::Handle: Send,
{
    Router::new()
        .route("/", get(root_handler))
        .route("/ws", get(websocket::command_ws_handler::<B>))
        .route("/api/call", post(websocket::call_handler::<B>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root_handler() -> axum::response::Html<&'static str> {
    axum::response::Html(include_str!("../static/index.html"))
}
