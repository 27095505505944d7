//! # bdlog
//!
//! Development server for the bdatalog table log viewer. It serves the built
//! page and forwards the viewer's API calls to the bdatalog backend so the
//! browser only ever talks to one origin.
//!
//! ## Features
//!
//! - **Literal prefix routing**: each bdatalog endpoint is proxied by its own rule
//! - **WebSocket bridging**: upgrade handshakes on proxied paths reach the backend
//! - **Origin rewriting**: `Host`/`Origin` match the backend when enabled
//! - **SPA serving**: built assets under the public path, `index.html` fallback
//!
//! ## Modules
//!
//! - [`proxy`]: Proxy table, HTTP forwarding and WebSocket bridging
//! - [`server`]: Axum router, dispatcher and built page serving
//! - [`config`]: TOML configuration with environment overrides
//! - [`logging`]: Tracing subscriber setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bdlog::{AppState, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     bdlog::logging::init_tracing(&config.logging);
//!
//!     let state = AppState::from_config(&config)?;
//!     bdlog::serve(state, &config.server.addr()).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod logging;
pub mod proxy;
pub mod server;

pub use config::{
    BuildConfig, Config, ConfigError, LogFormat, LoggingConfig, ProxyConfig, RouteConfig,
    ServerConfig,
};

pub use proxy::{ProxyError, ProxyResult, ProxyRule, ProxyTable};

pub use server::{build_router, serve, AppState, ServerError, ServerResult, SiteAssets};
