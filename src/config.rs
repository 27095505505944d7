//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use axum::http::{HeaderName, HeaderValue};
use reqwest::Url;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::proxy::{ProxyRule, ProxyTable, BDATALOG_PREFIXES, DEFAULT_TARGET};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Extra headers added to every response
    #[serde(default = "default_headers")]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    // 8080 belongs to the backend
    8081
}

fn default_max_body_size() -> usize {
    10 * 1024 * 1024 // 10MB
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_size: default_max_body_size(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Where the built page lives and the URL base it is served under
#[derive(Debug, Clone, Deserialize)]
pub struct BuildConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_public_path")]
    pub public_path: String,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("../bdlog")
}

fn default_public_path() -> String {
    "/bdlog/".to_string()
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            public_path: default_public_path(),
        }
    }
}

impl BuildConfig {
    /// Public path with exactly one leading and one trailing `/`
    pub fn normalized_public_path(&self) -> String {
        let trimmed = self.public_path.trim().trim_matches('/');
        if trimmed.is_empty() {
            "/".to_string()
        } else {
            format!("/{}/", trimmed)
        }
    }
}

/// Proxy defaults and the route list
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_target")]
    pub target: String,

    #[serde(default = "default_true")]
    pub ws: bool,

    #[serde(default = "default_true")]
    pub change_origin: bool,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_routes")]
    pub routes: Vec<RouteConfig>,
}

/// A single proxied prefix; unset fields inherit from `[proxy]`
#[derive(Debug, Clone, Deserialize)]
pub struct RouteConfig {
    pub prefix: String,
    pub target: Option<String>,
    pub ws: Option<bool>,
    pub change_origin: Option<bool>,
}

impl RouteConfig {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            target: None,
            ws: None,
            change_origin: None,
        }
    }
}

fn default_target() -> String {
    DEFAULT_TARGET.to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

fn default_routes() -> Vec<RouteConfig> {
    BDATALOG_PREFIXES.iter().map(|p| RouteConfig::new(*p)).collect()
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            target: default_target(),
            ws: default_true(),
            change_origin: default_true(),
            timeout_secs: default_timeout(),
            routes: default_routes(),
        }
    }
}

fn default_headers() -> BTreeMap<String, String> {
    BTreeMap::from([("Access-Control-Allow-Origin".to_string(), "*".to_string())])
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl LoggingConfig {
    /// `EnvFilter` directive for the configured level.
    ///
    /// A bare level applies to this crate and the HTTP trace layer; anything
    /// containing `=` or `,` is used verbatim.
    pub fn filter_directive(&self) -> String {
        if self.level.contains('=') || self.level.contains(',') {
            self.level.clone()
        } else {
            format!("bdlog={0},tower_http={0}", self.level)
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Default locations searched when no file is given explicitly
    pub fn default_paths() -> Vec<PathBuf> {
        [
            dirs::config_dir().map(|p| p.join("bdlog").join("config.toml")),
            Some(PathBuf::from("./bdlog.toml")),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Load from `explicit`, else the first existing default location, else
    /// defaults. Environment overrides apply in every case.
    ///
    /// Returns the file the configuration came from, if any.
    pub fn discover(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        if let Some(path) = explicit {
            return Ok((Self::load_with_env(path)?, Some(path.to_path_buf())));
        }

        for path in Self::default_paths() {
            if path.exists() {
                let config = Self::load_with_env(&path)?;
                return Ok((config, Some(path)));
            }
        }

        Ok((Self::from_env()?, None))
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any `BDLOG_*` lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Server overrides
        if let Some(host) = lookup("BDLOG_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("BDLOG_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                key: "BDLOG_PORT".to_string(),
                value: port,
            })?;
        }

        // Build overrides
        if let Some(output_dir) = lookup("BDLOG_OUTPUT_DIR") {
            self.build.output_dir = PathBuf::from(output_dir);
        }
        if let Some(public_path) = lookup("BDLOG_PUBLIC_PATH") {
            self.build.public_path = public_path;
        }

        // Proxy overrides
        if let Some(target) = lookup("BDLOG_PROXY_TARGET") {
            self.proxy.target = target;
        }

        // Logging overrides
        if let Some(level) = lookup("BDLOG_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("BDLOG_LOG_FORMAT") {
            self.logging.format = format.parse().map_err(|_| ConfigError::InvalidValue {
                key: "BDLOG_LOG_FORMAT".to_string(),
                value: format,
            })?;
        }

        Ok(())
    }

    /// Build the proxy table, validating every target and prefix
    pub fn proxy_table(&self) -> Result<ProxyTable, ConfigError> {
        let default_target = parse_target(&self.proxy.target)?;

        let mut rules = Vec::with_capacity(self.proxy.routes.len());
        for route in &self.proxy.routes {
            if !route.prefix.starts_with('/') {
                return Err(ConfigError::InvalidPrefix(route.prefix.clone()));
            }

            let target = match &route.target {
                Some(target) => parse_target(target)?,
                None => default_target.clone(),
            };

            rules.push(
                ProxyRule::new(route.prefix.clone(), target)
                    .ws(route.ws.unwrap_or(self.proxy.ws))
                    .change_origin(route.change_origin.unwrap_or(self.proxy.change_origin)),
            );
        }

        Ok(ProxyTable::new(rules))
    }

    /// Parse the configured extra response headers
    pub fn response_headers(&self) -> Result<Vec<(HeaderName, HeaderValue)>, ConfigError> {
        self.headers
            .iter()
            .map(|(name, value)| {
                let header_name =
                    HeaderName::from_bytes(name.as_bytes()).map_err(|e| ConfigError::InvalidHeader {
                        name: name.clone(),
                        error: e.to_string(),
                    })?;
                let header_value =
                    HeaderValue::from_str(value).map_err(|e| ConfigError::InvalidHeader {
                        name: name.clone(),
                        error: e.to_string(),
                    })?;
                Ok((header_name, header_value))
            })
            .collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            build: BuildConfig::default(),
            proxy: ProxyConfig::default(),
            headers: default_headers(),
            logging: LoggingConfig::default(),
        }
    }
}

fn parse_target(target: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidTarget {
        target: target.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(target).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host"));
    }
    Ok(url)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid proxy target {target:?}: {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("Proxy prefix must start with '/': {0:?}")]
    InvalidPrefix(String),

    #[error("Invalid response header {name:?}: {error}")]
    InvalidHeader { name: String, error: String },

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    let routes: String = BDATALOG_PREFIXES
        .iter()
        .map(|prefix| format!("\n[[proxy.routes]]\nprefix = \"{}\"\n", prefix))
        .collect();

    format!(
        r#"# bdlog dev server configuration
#
# Environment variables override these settings:
# - BDLOG_HOST
# - BDLOG_PORT
# - BDLOG_OUTPUT_DIR
# - BDLOG_PUBLIC_PATH
# - BDLOG_PROXY_TARGET
# - BDLOG_LOG_LEVEL
# - BDLOG_LOG_FORMAT

[server]
# Address the dev server listens on
host = "0.0.0.0"
port = 8081

# Largest request body forwarded to the backend (bytes)
max_body_size = 10485760

[build]
# Directory holding the built page
output_dir = "../bdlog"

# URL base the page is served under
public_path = "/bdlog/"

[proxy]
# Backend origin for every route without its own target
target = "{target}"

# Bridge WebSocket handshakes
ws = true

# Rewrite Host/Origin to the target
change_origin = true

# Upstream request timeout in seconds
timeout_secs = 30

[headers]
# Added to every response
"Access-Control-Allow-Origin" = "*"

[logging]
# Log level: trace, debug, info, warn, error (or a full filter directive)
level = "info"

# Log format: pretty (for development) or json
format = "pretty"

# Proxied prefixes. Each may override target, ws and change_origin.
{routes}"#,
        target = DEFAULT_TARGET,
        routes = routes,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.addr(), "0.0.0.0:8081");
        assert_eq!(config.build.normalized_public_path(), "/bdlog/");
        assert_eq!(config.build.output_dir, PathBuf::from("../bdlog"));
        assert_eq!(config.proxy.routes.len(), 7);
        assert_eq!(config.headers.get("Access-Control-Allow-Origin").unwrap(), "*");
    }

    #[test]
    fn test_default_proxy_table() {
        let table = Config::default().proxy_table().unwrap();
        assert_eq!(table.len(), 7);
        for (rule, prefix) in table.rules().iter().zip(BDATALOG_PREFIXES) {
            assert_eq!(rule.prefix, prefix);
            assert_eq!(rule.origin(), "http://127.0.0.1:8080");
            assert!(rule.ws && rule.change_origin);
        }
    }

    #[test]
    fn test_generated_config_parses_to_defaults() {
        let config = Config::parse(&generate_default_config()).unwrap();
        let defaults = Config::default();

        assert_eq!(config.server.addr(), defaults.server.addr());
        assert_eq!(config.build.public_path, defaults.build.public_path);
        assert_eq!(config.proxy.target, defaults.proxy.target);
        assert_eq!(config.headers, defaults.headers);

        let prefixes: Vec<_> = config.proxy.routes.iter().map(|r| r.prefix.as_str()).collect();
        assert_eq!(prefixes, BDATALOG_PREFIXES);
    }

    #[test]
    fn test_route_overrides() {
        let config = Config::parse(
            r#"
[proxy]
target = "http://10.0.0.5:9000"
ws = false

[[proxy.routes]]
prefix = "/bdatalog/list_table"

[[proxy.routes]]
prefix = "/bdatalog/register_table"
target = "http://10.0.0.6:9001"
ws = true
change_origin = false
"#,
        )
        .unwrap();

        let table = config.proxy_table().unwrap();
        assert_eq!(table.len(), 2);

        let list = table.route("/bdatalog/list_table").unwrap();
        assert_eq!(list.origin(), "http://10.0.0.5:9000");
        assert!(!list.ws);
        assert!(list.change_origin);

        let register = table.route("/bdatalog/register_table").unwrap();
        assert_eq!(register.origin(), "http://10.0.0.6:9001");
        assert!(register.ws);
        assert!(!register.change_origin);
    }

    #[test]
    fn test_invalid_target() {
        let mut config = Config::default();
        config.proxy.target = "ftp://127.0.0.1".to_string();
        assert!(matches!(
            config.proxy_table(),
            Err(ConfigError::InvalidTarget { .. })
        ));

        config.proxy.target = "not a url".to_string();
        assert!(matches!(
            config.proxy_table(),
            Err(ConfigError::InvalidTarget { .. })
        ));
    }

    #[test]
    fn test_invalid_prefix() {
        let mut config = Config::default();
        config.proxy.routes = vec![RouteConfig::new("bdatalog/list_table")];
        assert!(matches!(
            config.proxy_table(),
            Err(ConfigError::InvalidPrefix(_))
        ));
    }

    #[test]
    fn test_response_headers() {
        let headers = Config::default().response_headers().unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].0, "access-control-allow-origin");
        assert_eq!(headers[0].1, "*");

        let mut config = Config::default();
        config.headers.insert("bad header".to_string(), "x".to_string());
        assert!(matches!(
            config.response_headers(),
            Err(ConfigError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn test_public_path_normalization() {
        let mut build = BuildConfig::default();
        for (raw, expected) in [("bdlog", "/bdlog/"), ("/bdlog", "/bdlog/"), ("", "/"), ("/", "/")] {
            build.public_path = raw.to_string();
            assert_eq!(build.normalized_public_path(), expected);
        }
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("BDLOG_PORT", "9999"),
            ("BDLOG_PROXY_TARGET", "http://backend:8080"),
            ("BDLOG_PUBLIC_PATH", "/"),
            ("BDLOG_LOG_FORMAT", "json"),
        ]);

        let mut config = Config::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.port, 9999);
        assert_eq!(config.proxy.target, "http://backend:8080");
        assert_eq!(config.build.normalized_public_path(), "/");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_port_override() {
        let mut config = Config::default();
        let result = config.apply_overrides(|key| {
            (key == "BDLOG_PORT").then(|| "eighty".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/bdlog.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bdlog.toml");
        std::fs::write(&path, "[server]\nport = 7000\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.proxy.routes.len(), 7);
    }

    #[test]
    fn test_filter_directive() {
        let mut logging = LoggingConfig::default();
        assert_eq!(logging.filter_directive(), "bdlog=info,tower_http=info");

        logging.level = "bdlog=trace,hyper=warn".to_string();
        assert_eq!(logging.filter_directive(), "bdlog=trace,hyper=warn");
    }
}
