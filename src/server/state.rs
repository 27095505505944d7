//! Application State
//!
//! Shared state accessible by the request dispatcher.
//! Everything here is read-only once the server starts.

use axum::http::{HeaderName, HeaderValue};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use super::assets::SiteAssets;
use super::error::ServerResult;
use crate::config::Config;
use crate::proxy::{build_client, ProxyTable};

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Prefix rules consulted before local serving
    pub table: Arc<ProxyTable>,
    /// Built page served for everything the table does not claim
    pub assets: Arc<SiteAssets>,
    /// Pooled client for forwarded requests
    pub client: Client,
    /// Largest request body forwarded upstream
    pub max_body_size: usize,
    /// Headers added to every response
    pub response_headers: Arc<Vec<(HeaderName, HeaderValue)>>,
}

impl AppState {
    pub fn new(table: ProxyTable, assets: SiteAssets, client: Client) -> Self {
        Self {
            table: Arc::new(table),
            assets: Arc::new(assets),
            client,
            max_body_size: 10 * 1024 * 1024,
            response_headers: Arc::new(Vec::new()),
        }
    }

    /// Build the full state from validated configuration
    pub fn from_config(config: &Config) -> ServerResult<Self> {
        let table = config.proxy_table()?;
        let assets = SiteAssets::new(
            &config.build.output_dir,
            config.build.normalized_public_path(),
        );
        let client = build_client(Duration::from_secs(config.proxy.timeout_secs))?;

        Ok(Self::new(table, assets, client)
            .with_max_body_size(config.server.max_body_size)
            .with_response_headers(config.response_headers()?))
    }

    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    pub fn with_response_headers(mut self, headers: Vec<(HeaderName, HeaderValue)>) -> Self {
        self.response_headers = Arc::new(headers);
        self
    }
}
