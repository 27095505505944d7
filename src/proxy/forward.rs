//! HTTP Forwarding
//!
//! Sends a matched request to the backend with `reqwest` and streams the
//! backend's response back to the client.

use axum::{
    body::Body,
    extract::Request,
    http::{header, StatusCode},
    response::Response,
};
use http_body_util::LengthLimitError;
use reqwest::{Client, Url};
use std::time::Duration;

use super::error::{ProxyError, ProxyResult};
use super::headers::{apply_origin, end_to_end};
use super::table::ProxyRule;

/// Build the pooled client used for every forwarded request.
///
/// Redirects are handed back to the browser rather than followed, and
/// system proxy settings are ignored.
pub fn build_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .build()
}

/// Forward `request` to the backend named by `rule`.
///
/// The body is buffered up to `max_body_size` bytes; method, query and
/// end-to-end headers are passed through as-is.
pub async fn forward(
    client: &Client,
    rule: &ProxyRule,
    request: Request,
    max_body_size: usize,
) -> ProxyResult<Response> {
    let (parts, body) = request.into_parts();
    let url = rule.upstream_url(parts.uri.path(), parts.uri.query());

    if let Some(length) = parts
        .headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
    {
        if length > max_body_size {
            return Err(ProxyError::BodyTooLarge {
                limit: max_body_size,
            });
        }
    }

    let body = axum::body::to_bytes(body, max_body_size)
        .await
        .map_err(|e| {
            if exceeds_limit(&e) {
                ProxyError::BodyTooLarge {
                    limit: max_body_size,
                }
            } else {
                ProxyError::Body(e.to_string())
            }
        })?;

    let mut headers = end_to_end(&parts.headers, &[header::HOST, header::CONTENT_LENGTH]);
    apply_origin(&mut headers, &parts.headers, rule)?;

    tracing::debug!(
        method = %parts.method,
        prefix = %rule.prefix,
        upstream = %url,
        "Forwarding request"
    );

    let upstream = client
        .request(parts.method.clone(), url.clone())
        .headers(headers)
        .body(body)
        .send()
        .await?;

    let status = upstream.status();
    let upstream_headers = end_to_end(upstream.headers(), &[]);

    tracing::debug!(
        method = %parts.method,
        upstream = %url,
        status = status.as_u16(),
        "Upstream responded"
    );

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = upstream_headers;

    Ok(response)
}

/// Whether a body read failed because the body ran past the size limit
fn exceeds_limit(error: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}

/// Check that a backend origin answers HTTP at all.
///
/// Any response counts as reachable; the status is returned for reporting.
pub async fn probe(client: &Client, target: &Url) -> ProxyResult<StatusCode> {
    let response = client.get(target.clone()).send().await?;
    Ok(response.status())
}
