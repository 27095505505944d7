//! Proxy Table
//!
//! Static mapping from literal path prefixes to a backend origin. The table is
//! built once at startup and shared read-only by every request handler.

use reqwest::Url;
use std::fmt;

use super::error::{ProxyError, ProxyResult};

/// Backend origin the bdatalog endpoints live on during development
pub const DEFAULT_TARGET: &str = "http://127.0.0.1:8080";

/// The bdatalog endpoints, each proxied as its own literal prefix.
///
/// `/bdatalog/list_table_field` is declared ahead of `/bdatalog/list_table`
/// so the longer path is reported by the rule that names it.
pub const BDATALOG_PREFIXES: [&str; 7] = [
    "/bdatalog/list_history_all",
    "/bdatalog/modify_table_policy",
    "/bdatalog/list_table_field",
    "/bdatalog/list_table",
    "/bdatalog/list_history_by_name",
    "/bdatalog/unregister_table",
    "/bdatalog/register_table",
];

/// A single proxy rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRule {
    /// Literal prefix matched against the request path
    pub prefix: String,
    /// Backend origin receiving the forwarded request
    pub target: Url,
    /// Bridge WebSocket handshakes on this prefix
    pub ws: bool,
    /// Rewrite `Host`/`Origin` to the target
    pub change_origin: bool,
}

impl ProxyRule {
    /// Create a rule with WebSocket bridging and origin rewriting enabled
    pub fn new(prefix: impl Into<String>, target: Url) -> Self {
        Self {
            prefix: prefix.into(),
            target,
            ws: true,
            change_origin: true,
        }
    }

    /// Set WebSocket bridging
    pub fn ws(mut self, enabled: bool) -> Self {
        self.ws = enabled;
        self
    }

    /// Set origin rewriting
    pub fn change_origin(mut self, enabled: bool) -> Self {
        self.change_origin = enabled;
        self
    }

    /// Whether the request path starts with this rule's prefix.
    ///
    /// `path` must not include the query string.
    pub fn matches(&self, path: &str) -> bool {
        path.starts_with(&self.prefix)
    }

    /// Upstream URL for a request path and query.
    pub fn upstream_url(&self, path: &str, query: Option<&str>) -> Url {
        let mut url = self.target.clone();
        url.set_path(path);
        url.set_query(query);
        url
    }

    /// Upstream WebSocket URL (`ws://` or `wss://`) for a request path and query.
    pub fn upstream_ws_url(&self, path: &str, query: Option<&str>) -> ProxyResult<Url> {
        let mut url = self.upstream_url(path, query);
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme).map_err(|_| {
            ProxyError::InvalidTarget(format!("cannot derive {} URL from {}", scheme, self.target))
        })?;
        Ok(url)
    }

    /// `host[:port]` of the target, as sent in a rewritten `Host` header
    pub fn authority(&self) -> String {
        let host = self.target.host_str().unwrap_or_default();
        match self.target.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    /// `scheme://host[:port]` of the target, as sent in a rewritten `Origin` header
    pub fn origin(&self) -> String {
        self.target.origin().ascii_serialization()
    }
}

impl fmt::Display for ProxyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.prefix, self.origin())?;

        let mut flags = Vec::new();
        if self.ws {
            flags.push("ws");
        }
        if self.change_origin {
            flags.push("change-origin");
        }
        if !flags.is_empty() {
            write!(f, " ({})", flags.join(", "))?;
        }
        Ok(())
    }
}

/// Ordered set of proxy rules; the first matching rule wins
#[derive(Debug, Clone, Default)]
pub struct ProxyTable {
    rules: Vec<ProxyRule>,
}

impl ProxyTable {
    /// Table with `rules` in match order
    pub fn new(rules: Vec<ProxyRule>) -> Self {
        Self { rules }
    }

    /// The seven bdatalog endpoints, all pointing at `target`
    pub fn bdatalog(target: Url) -> Self {
        let rules = BDATALOG_PREFIXES
            .iter()
            .map(|prefix| ProxyRule::new(*prefix, target.clone()))
            .collect();
        Self { rules }
    }

    /// Find the rule handling a request path, if any
    pub fn route(&self, path: &str) -> Option<&ProxyRule> {
        self.rules.iter().find(|rule| rule.matches(path))
    }

    /// Rules in match order
    pub fn rules(&self) -> &[ProxyRule] {
        &self.rules
    }

    /// Distinct target origins, in declaration order
    pub fn targets(&self) -> Vec<&Url> {
        let mut targets: Vec<&Url> = Vec::new();
        for rule in &self.rules {
            if !targets.iter().any(|t| t.origin() == rule.target.origin()) {
                targets.push(&rule.target);
            }
        }
        targets
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the table has no rules
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_table() -> ProxyTable {
        ProxyTable::bdatalog(Url::parse(DEFAULT_TARGET).unwrap())
    }

    #[test]
    fn test_every_bdatalog_prefix_is_proxied() {
        let table = default_table();
        assert_eq!(table.len(), 7);

        for prefix in BDATALOG_PREFIXES {
            let rule = table.route(prefix).expect("prefix should be routed");
            assert_eq!(rule.prefix, prefix);
            assert_eq!(rule.origin(), "http://127.0.0.1:8080");
            assert!(rule.ws);
            assert!(rule.change_origin);
        }
    }

    #[test]
    fn test_unlisted_paths_are_not_proxied() {
        let table = default_table();

        assert!(table.route("/").is_none());
        assert!(table.route("/bdlog/").is_none());
        assert!(table.route("/bdatalog/").is_none());
        assert!(table.route("/bdatalog/list").is_none());
        assert!(table.route("/bdatalog/resigter_table").is_none());
        assert!(table.route("/api/bdatalog/list_table").is_none());
    }

    #[test]
    fn test_prefixes_match_literally() {
        let table = default_table();

        let rule = table.route("/bdatalog/list_table_field").unwrap();
        assert_eq!(rule.prefix, "/bdatalog/list_table_field");

        let rule = table.route("/bdatalog/list_table/extra").unwrap();
        assert_eq!(rule.prefix, "/bdatalog/list_table");

        // Literal prefix, not a path segment match
        let rule = table.route("/bdatalog/register_tables").unwrap();
        assert_eq!(rule.prefix, "/bdatalog/register_table");
    }

    #[test]
    fn test_upstream_url_preserves_path_and_query() {
        let table = default_table();
        let rule = table.route("/bdatalog/list_table").unwrap();

        let url = rule.upstream_url("/bdatalog/list_table", Some("name=foo"));
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/bdatalog/list_table?name=foo");

        let url = rule.upstream_url("/bdatalog/list_table", None);
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/bdatalog/list_table");
    }

    #[test]
    fn test_upstream_ws_url() {
        let rule = ProxyRule::new(
            "/bdatalog/list_table",
            Url::parse("http://127.0.0.1:8080").unwrap(),
        );
        let url = rule.upstream_ws_url("/bdatalog/list_table", Some("a=1")).unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:8080/bdatalog/list_table?a=1");

        let rule = ProxyRule::new("/x", Url::parse("https://backend.internal").unwrap());
        let url = rule.upstream_ws_url("/x", None).unwrap();
        assert_eq!(url.as_str(), "wss://backend.internal/x");
    }

    #[test]
    fn test_authority_and_origin() {
        let rule = ProxyRule::new("/x", Url::parse("http://127.0.0.1:8080").unwrap());
        assert_eq!(rule.authority(), "127.0.0.1:8080");
        assert_eq!(rule.origin(), "http://127.0.0.1:8080");

        let rule = ProxyRule::new("/x", Url::parse("http://backend").unwrap());
        assert_eq!(rule.authority(), "backend");
        assert_eq!(rule.origin(), "http://backend");
    }

    #[test]
    fn test_distinct_targets() {
        let table = default_table();
        assert_eq!(table.targets().len(), 1);

        let mut rules = table.rules().to_vec();
        rules.push(ProxyRule::new("/other", Url::parse("http://10.0.0.1:9000").unwrap()));
        let table = ProxyTable::new(rules);
        assert_eq!(table.targets().len(), 2);
    }

    #[test]
    fn test_display() {
        let rule = ProxyRule::new("/a", Url::parse(DEFAULT_TARGET).unwrap());
        assert_eq!(rule.to_string(), "/a -> http://127.0.0.1:8080 (ws, change-origin)");

        let rule = rule.ws(false).change_origin(false);
        assert_eq!(rule.to_string(), "/a -> http://127.0.0.1:8080");
    }
}
