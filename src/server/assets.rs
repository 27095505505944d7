//! Built Page Serving
//!
//! Serves the built page from the output directory under the public path,
//! with history-mode fallback to `index.html`.

use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Redirect, Response},
};
use std::path::{Path, PathBuf};
use tower::ServiceExt;
use tower_http::services::{ServeDir, ServeFile};

/// The built page and the URL base it is mounted at
#[derive(Debug, Clone)]
pub struct SiteAssets {
    output_dir: PathBuf,
    public_path: String,
    service: ServeDir<ServeFile>,
}

impl SiteAssets {
    /// `public_path` must carry a leading and trailing `/`.
    pub fn new(output_dir: impl Into<PathBuf>, public_path: impl Into<String>) -> Self {
        let output_dir = output_dir.into();
        let service = ServeDir::new(&output_dir)
            .append_index_html_on_directories(true)
            .fallback(ServeFile::new(output_dir.join("index.html")));

        Self {
            output_dir,
            public_path: public_path.into(),
            service,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn public_path(&self) -> &str {
        &self.public_path
    }

    pub fn index_file(&self) -> PathBuf {
        self.output_dir.join("index.html")
    }

    /// Whether the built page is present
    pub fn is_mounted(&self) -> bool {
        self.index_file().is_file()
    }

    /// Serve a request that no proxy rule claimed
    pub async fn serve(&self, mut request: Request) -> Response {
        let path = request.uri().path();

        let Some(rest) = path.strip_prefix(self.public_path.as_str()) else {
            let mount = self.public_path.trim_end_matches('/');
            if path == "/" || path == mount {
                return Redirect::temporary(&self.public_path).into_response();
            }
            return StatusCode::NOT_FOUND.into_response();
        };

        let local = match request.uri().query() {
            Some(query) => format!("/{}?{}", rest, query),
            None => format!("/{}", rest),
        };
        match local.parse::<Uri>() {
            Ok(uri) => *request.uri_mut() = uri,
            Err(_) => return StatusCode::BAD_REQUEST.into_response(),
        }

        let mut response = match self.service.clone().oneshot(request).await {
            Ok(response) => response.map(Body::new),
            Err(never) => match never {},
        };

        // Directory redirects are computed against the stripped path
        if response.status().is_redirection() {
            let mount = self.public_path.trim_end_matches('/');
            let location = response
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .filter(|location| location.starts_with('/'))
                .and_then(|location| HeaderValue::from_str(&format!("{}{}", mount, location)).ok());
            if let Some(location) = location {
                response.headers_mut().insert(header::LOCATION, location);
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn site() -> (SiteAssets, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<div id=\"app\"></div>").unwrap();
        std::fs::create_dir(dir.path().join("js")).unwrap();
        std::fs::write(dir.path().join("js/app.js"), "console.log(1)").unwrap();
        (SiteAssets::new(dir.path(), "/bdlog/"), dir)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_serves_index_at_public_path() {
        let (site, _dir) = site();
        assert!(site.is_mounted());

        let response = site.serve(get("/bdlog/")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "<div id=\"app\"></div>");
    }

    #[tokio::test]
    async fn test_serves_asset() {
        let (site, _dir) = site();

        let response = site.serve(get("/bdlog/js/app.js?v=3")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "console.log(1)");
    }

    #[tokio::test]
    async fn test_unknown_route_falls_back_to_index() {
        let (site, _dir) = site();

        let response = site.serve(get("/bdlog/tables/history")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "<div id=\"app\"></div>");
    }

    #[tokio::test]
    async fn test_redirects_to_public_path() {
        let (site, _dir) = site();

        for uri in ["/", "/bdlog"] {
            let response = site.serve(get(uri)).await;
            assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
            assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/bdlog/");
        }
    }

    #[tokio::test]
    async fn test_directory_redirect_keeps_public_path() {
        let (site, _dir) = site();

        let response = site.serve(get("/bdlog/js")).await;
        assert!(response.status().is_redirection());
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/bdlog/js/");
    }

    #[tokio::test]
    async fn test_outside_public_path_is_not_found() {
        let (site, _dir) = site();

        let response = site.serve(get("/other/page")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_root_public_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "root").unwrap();
        let site = SiteAssets::new(dir.path(), "/");

        let response = site.serve(get("/anything")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "root");
    }

    #[tokio::test]
    async fn test_missing_output_dir() {
        let site = SiteAssets::new("/nonexistent/bdlog", "/bdlog/");
        assert!(!site.is_mounted());

        let response = site.serve(get("/bdlog/")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
