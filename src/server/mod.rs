//! Development Server
//!
//! HTTP layer for bdlog, built with Axum.
//!
//! Every request goes through a single dispatcher:
//!
//! 1. If the path starts with a proxy prefix, the request is forwarded to the
//!    backend (WebSocket handshakes are bridged when the rule allows it).
//! 2. Otherwise the built page is served from the output directory under the
//!    public path, with `index.html` as the history-mode fallback.
//!
//! The configured extra headers (`Access-Control-Allow-Origin: *` by default)
//! are added to every response that does not already carry them.
//!
//! # Example
//!
//! ```rust,ignore
//! use bdlog::config::Config;
//! use bdlog::server::{serve, AppState};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let state = AppState::from_config(&config)?;
//!     serve(state, &config.server.addr()).await?;
//!     Ok(())
//! }
//! ```

pub mod assets;
pub mod error;
pub mod state;

pub use assets::SiteAssets;
pub use error::{ServerError, ServerResult};
pub use state::AppState;

use axum::{
    extract::{ws::WebSocketUpgrade, FromRequestParts, Request, State},
    response::{IntoResponse, Response},
    Router,
};
use std::sync::Arc;
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};

use crate::proxy::{self, is_websocket_upgrade};

/// Build the router: one dispatcher plus the response header and trace layers
pub fn build_router(state: AppState) -> Router {
    let headers = Arc::clone(&state.response_headers);

    let mut router = Router::new()
        .fallback(dispatch)
        .with_state(Arc::new(state));

    for (name, value) in headers.iter() {
        router = router.layer(SetResponseHeaderLayer::if_not_present(
            name.clone(),
            value.clone(),
        ));
    }

    router.layer(TraceLayer::new_for_http())
}

/// Route a request to the backend or to the built page
async fn dispatch(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let Some(rule) = state.table.route(request.uri().path()) else {
        return state.assets.serve(request).await;
    };

    let result = if rule.ws && is_websocket_upgrade(request.headers()) {
        let (mut parts, _body) = request.into_parts();
        match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
            Ok(upgrade) => proxy::bridge(rule, &parts, upgrade).await,
            Err(rejection) => return rejection.into_response(),
        }
    } else {
        proxy::forward(&state.client, rule, request, state.max_body_size).await
    };

    result.unwrap_or_else(IntoResponse::into_response)
}

/// Log what the server is about to serve
fn log_startup(state: &AppState) {
    for rule in state.table.rules() {
        tracing::info!(route = %rule, "Proxy route");
    }

    if state.assets.is_mounted() {
        tracing::info!(
            output_dir = %state.assets.output_dir().display(),
            public_path = %state.assets.public_path(),
            "Serving built page"
        );
    } else {
        tracing::warn!(
            index = %state.assets.index_file().display(),
            "Built page not found; page requests will return 404 until it is built"
        );
    }
}

/// Start the dev server
pub async fn serve(state: AppState, addr: &str) -> ServerResult<()> {
    log_startup(&state);
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("bdlog dev server listening on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("bdlog dev server shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
