//! Development Proxy
//!
//! Routes requests whose path starts with a configured literal prefix to the
//! backend origin.
//!
//! ## Architecture
//!
//! - **ProxyTable**: ordered prefix rules, first match wins
//! - **forward**: plain HTTP forwarding through a pooled `reqwest` client
//! - **websocket**: upgrade bridging through `tokio-tungstenite`
//!
//! ## Example
//!
//! ```rust
//! use bdlog::proxy::{ProxyTable, DEFAULT_TARGET};
//! use reqwest::Url;
//!
//! let table = ProxyTable::bdatalog(Url::parse(DEFAULT_TARGET).unwrap());
//! let rule = table.route("/bdatalog/list_table").unwrap();
//! let url = rule.upstream_url("/bdatalog/list_table", Some("name=foo"));
//! assert_eq!(url.as_str(), "http://127.0.0.1:8080/bdatalog/list_table?name=foo");
//! ```

mod error;
mod forward;
mod headers;
mod table;
mod websocket;

pub use error::{ErrorBody, ErrorResponse, ProxyError, ProxyResult};
pub use forward::{build_client, forward, probe};
pub use headers::is_websocket_upgrade;
pub use table::{ProxyRule, ProxyTable, BDATALOG_PREFIXES, DEFAULT_TARGET};
pub use websocket::bridge;
