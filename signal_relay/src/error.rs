//! Error types for the signaling relay

use thiserror::Error;

/// Errors that can occur while delivering signaling traffic
#[derive(Error, Debug)]
pub enum SignalingError {
    /// The peer's outbound queue is full
    #[error("Outbound queue full")]
    QueueFull,

    /// The peer's socket writer has gone away
    #[error("Peer connection closed")]
    Closed,

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from client requests
#[derive(Error, Debug)]
pub enum ClientRequestError {
    /// Connection was closed
    #[error("Connection closed")]
    Close,

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unsupported message type
    #[error("Unsupported message type")]
    UnsupportedType,

    /// Frame was not valid UTF-8
    #[error("Frame is not valid UTF-8")]
    NotText,
}
