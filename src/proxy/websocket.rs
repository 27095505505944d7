//! WebSocket Bridging
//!
//! Connects to the backend first, then accepts the client's upgrade and
//! relays frames between the two sockets until either side closes.

use axum::{
    extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    http::{header, request::Parts, HeaderName},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    tungstenite::{
        self,
        client::IntoClientRequest,
        protocol::{frame::coding::CloseCode, CloseFrame as UpstreamCloseFrame},
    },
    MaybeTlsStream, WebSocketStream,
};

use super::error::ProxyResult;
use super::headers::{apply_origin, end_to_end};
use super::table::ProxyRule;

type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Handshake headers regenerated for the upstream connection
static HANDSHAKE_HEADERS: [HeaderName; 5] = [
    header::HOST,
    header::SEC_WEBSOCKET_KEY,
    header::SEC_WEBSOCKET_VERSION,
    header::SEC_WEBSOCKET_EXTENSIONS,
    header::SEC_WEBSOCKET_ACCEPT,
];

/// Open the upstream socket for the handshake in `parts` and return the
/// client's upgrade response.
///
/// If the backend cannot be reached the client gets an error response and is
/// never upgraded.
pub async fn bridge(
    rule: &ProxyRule,
    parts: &Parts,
    upgrade: WebSocketUpgrade,
) -> ProxyResult<Response> {
    let url = rule.upstream_ws_url(parts.uri.path(), parts.uri.query())?;

    let mut request = url.as_str().into_client_request()?;
    let forwarded = end_to_end(&parts.headers, &HANDSHAKE_HEADERS);
    for (name, value) in &forwarded {
        request.headers_mut().append(name.clone(), value.clone());
    }
    apply_origin(request.headers_mut(), &parts.headers, rule)?;

    let (upstream, handshake) = tokio_tungstenite::connect_async(request).await?;

    tracing::info!(prefix = %rule.prefix, upstream = %url, "WebSocket bridge opened");

    let protocol = handshake
        .headers()
        .get(header::SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let upgrade = match protocol {
        Some(protocol) => upgrade.protocols([protocol]),
        None => upgrade,
    };

    let path = parts.uri.path().to_string();
    Ok(upgrade.on_upgrade(move |socket| relay(socket, upstream, path)))
}

/// How long the other direction gets to pass the answering close frame
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Relay frames in both directions.
///
/// Each direction reports whether it ended by passing a close frame. In that
/// case the other direction is given `CLOSE_TIMEOUT` to relay the reply so
/// both peers see a complete closing handshake; otherwise it is aborted.
async fn relay(client: WebSocket, upstream: UpstreamSocket, path: String) {
    let (mut client_tx, mut client_rx) = client.split();
    let (mut upstream_tx, mut upstream_rx) = upstream.split();

    let mut to_upstream = tokio::spawn(async move {
        while let Some(Ok(message)) = client_rx.next().await {
            let Some(message) = to_upstream_message(message) else {
                continue;
            };
            let closing = message.is_close();
            if upstream_tx.send(message).await.is_err() {
                return false;
            }
            if closing {
                return true;
            }
        }
        false
    });

    let mut to_client = tokio::spawn(async move {
        while let Some(Ok(message)) = upstream_rx.next().await {
            let Some(message) = to_client_message(message) else {
                continue;
            };
            let closing = matches!(message, Message::Close(_));
            if client_tx.send(message).await.is_err() {
                return false;
            }
            if closing {
                return true;
            }
        }
        false
    });

    let (closed, mut remaining) = tokio::select! {
        closed = &mut to_upstream => (closed, to_client),
        closed = &mut to_client => (closed, to_upstream),
    };

    if matches!(closed, Ok(true)) {
        if tokio::time::timeout(CLOSE_TIMEOUT, &mut remaining).await.is_err() {
            tracing::debug!(path = %path, "No close reply, dropping bridge");
            remaining.abort();
        }
    } else {
        remaining.abort();
    }

    tracing::info!(path = %path, "WebSocket bridge closed");
}

/// Client frame to upstream frame. Ping/pong stay on their own hop.
fn to_upstream_message(message: Message) -> Option<tungstenite::Message> {
    match message {
        Message::Text(text) => Some(tungstenite::Message::Text(text)),
        Message::Binary(data) => Some(tungstenite::Message::Binary(data)),
        Message::Close(frame) => Some(tungstenite::Message::Close(frame.map(|f| {
            UpstreamCloseFrame {
                code: CloseCode::from(f.code),
                reason: f.reason,
            }
        }))),
        Message::Ping(_) | Message::Pong(_) => None,
    }
}

/// Upstream frame to client frame. Ping/pong stay on their own hop.
fn to_client_message(message: tungstenite::Message) -> Option<Message> {
    match message {
        tungstenite::Message::Text(text) => Some(Message::Text(text)),
        tungstenite::Message::Binary(data) => Some(Message::Binary(data)),
        tungstenite::Message::Close(frame) => Some(Message::Close(frame.map(|f| CloseFrame {
            code: f.code.into(),
            reason: f.reason,
        }))),
        tungstenite::Message::Ping(_)
        | tungstenite::Message::Pong(_)
        | tungstenite::Message::Frame(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_frames_cross_both_ways() {
        assert_eq!(
            to_upstream_message(Message::Text("hi".into())),
            Some(tungstenite::Message::Text("hi".into()))
        );
        assert!(matches!(
            to_client_message(tungstenite::Message::Binary(vec![1, 2])),
            Some(Message::Binary(data)) if data == vec![1, 2]
        ));
    }

    #[test]
    fn test_close_code_is_preserved() {
        let frame = CloseFrame {
            code: 4001,
            reason: "bye".into(),
        };
        match to_upstream_message(Message::Close(Some(frame))) {
            Some(tungstenite::Message::Close(Some(f))) => {
                assert_eq!(u16::from(f.code), 4001);
                assert_eq!(f.reason, "bye");
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_control_frames_are_not_relayed() {
        assert!(to_upstream_message(Message::Ping(vec![1])).is_none());
        assert!(to_client_message(tungstenite::Message::Pong(vec![1])).is_none());
    }
}
