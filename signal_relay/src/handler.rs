//! WebSocket transport for the signaling relay
//!
//! Each upgraded socket gets a writer task draining the peer's outbound
//! queue and a reader loop feeding inbound frames to [`ServerState`]. When
//! the socket closes or fails, the peer is torn down through the same path.

use crate::config::{HEALTH_PATH, ServerConfig};
use crate::error::{ClientRequestError, SignalingError};
use crate::state::{PeerSender, ServerState, TransportEvent};
use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    response::{IntoResponse, Response},
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Plain GET on the WebSocket route, for liveness checks that probe `/`.
pub const LIVENESS_TEXT: &str = "Signaling server alive";

/// How long the writer gets to flush queued frames and the close reply.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

#[derive(Clone)]
struct AppState {
    relay: ServerState,
    outbound_queue: usize,
}

/// Build the HTTP router: the WebSocket endpoint plus `GET /health`.
///
/// `config.ws_path` must start with `/` and must not be `/health`;
/// [`RelayConfig::load`](crate::config::RelayConfig::load) rejects anything else.
pub fn router(relay: ServerState, config: &ServerConfig) -> Router {
    let state = AppState {
        relay,
        outbound_queue: config.outbound_queue.max(1),
    };
    Router::new()
        .route(HEALTH_PATH, get(health))
        .route(&config.ws_path, get(upgrade))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn upgrade(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<AppState>,
) -> Response {
    match ws {
        Ok(ws) => {
            ws.on_upgrade(move |socket| handle_socket(socket, state.relay, state.outbound_queue))
        }
        Err(_) => LIVENESS_TEXT.into_response(),
    }
}

/// Serve one peer until its socket goes away.
pub async fn handle_socket(socket: WebSocket, relay: ServerState, outbound_queue: usize) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(outbound_queue);
    let peer = relay.connect(PeerSender::new(tx));

    let writer_peer = peer.clone();
    let mut writer = tokio::spawn(async move {
        // Ends once the registry drops the peer's sender.
        while let Some(frame) = rx.recv().await {
            if let Err(err) = sink.send(Message::Text(frame.into())).await {
                let err = SignalingError::WebSocket(err.to_string());
                debug!(peer = %writer_peer, "stopping writer: {err}");
                return;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
        let _ = sink.close().await;
    });

    let event = loop {
        match stream.next().await {
            Some(Ok(message)) => match frame_text(message) {
                Ok(Some(text)) => relay.dispatch(&peer, TransportEvent::Frame(text)),
                Ok(None) => {}
                Err(ClientRequestError::Close) => break TransportEvent::Closed,
                Err(err) => debug!(peer = %peer, "ignoring frame: {err}"),
            },
            Some(Err(err)) => break TransportEvent::Errored(err.to_string()),
            None => break TransportEvent::Closed,
        }
    };

    relay.dispatch(&peer, event);
    if tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
        debug!(peer = %peer, "writer did not finish, aborting");
        writer.abort();
    }
}

/// Extract the text payload of a frame. Control frames yield `None`.
fn frame_text(message: Message) -> Result<Option<String>, ClientRequestError> {
    match message {
        Message::Text(text) => Ok(Some(text.as_str().to_owned())),
        Message::Binary(bytes) => String::from_utf8(bytes.to_vec())
            .map(Some)
            .map_err(|_| ClientRequestError::NotText),
        Message::Close(_) => Err(ClientRequestError::Close),
        Message::Ping(_) | Message::Pong(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_and_utf8_binary_frames_are_dispatched() {
        let text = frame_text(Message::Text("{}".into())).unwrap();
        assert_eq!(text.as_deref(), Some("{}"));

        let binary = frame_text(Message::Binary(b"{\"type\":\"leave\"}".to_vec().into())).unwrap();
        assert_eq!(binary.as_deref(), Some("{\"type\":\"leave\"}"));
    }

    #[test]
    fn invalid_binary_is_rejected() {
        let result = frame_text(Message::Binary(vec![0xff, 0xfe].into()));
        assert!(matches!(result, Err(ClientRequestError::NotText)));
    }

    #[test]
    fn control_frames_are_skipped() {
        assert!(frame_text(Message::Ping(Vec::new().into())).unwrap().is_none());
        assert!(matches!(
            frame_text(Message::Close(None)),
            Err(ClientRequestError::Close)
        ));
    }
}
