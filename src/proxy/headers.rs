//! Header handling shared by the HTTP and WebSocket forwarders.

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

use super::error::{ProxyError, ProxyResult};
use super::table::ProxyRule;

/// Headers that only apply to a single connection hop
static HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Whether `name` is a hop-by-hop header, either a standard one or one listed
/// in the message's own `Connection` header.
pub fn is_hop_by_hop(name: &HeaderName, headers: &HeaderMap) -> bool {
    if HOP_BY_HOP.contains(name) {
        return true;
    }

    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|token| name.as_str().eq_ignore_ascii_case(token.trim()))
}

/// Whether the request is a WebSocket upgrade handshake
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    let upgrade = headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);

    let connection = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));

    upgrade && connection
}

/// Copy end-to-end headers from `source`, skipping hop-by-hop headers and
/// anything in `skip`.
pub fn end_to_end(source: &HeaderMap, skip: &[HeaderName]) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(source.len());
    for (name, value) in source {
        if is_hop_by_hop(name, source) || skip.contains(name) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

/// Set `Host` (and `Origin`, when the client sent one) for the upstream request.
///
/// With origin rewriting the target's own values are used, otherwise the
/// client's `Host` is passed through.
pub fn apply_origin(
    headers: &mut HeaderMap,
    original: &HeaderMap,
    rule: &ProxyRule,
) -> ProxyResult<()> {
    if rule.change_origin {
        headers.insert(header::HOST, header_value(&rule.authority())?);
        if headers.contains_key(header::ORIGIN) {
            headers.insert(header::ORIGIN, header_value(&rule.origin())?);
        }
    } else if let Some(host) = original.get(header::HOST) {
        headers.insert(header::HOST, host.clone());
    }
    Ok(())
}

fn header_value(value: &str) -> ProxyResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| ProxyError::InvalidTarget(format!("{}: {}", value, e)))
}
