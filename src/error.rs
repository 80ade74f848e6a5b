//! Error types for the `deribit-gateway` crate.
//!
//! All fallible operations return [`Result<T>`], an alias for
//! `std::result::Result<T, GatewayError>`.
//!
//! [`GatewayError`] covers:
//! - **Venue errors** — a JSON-RPC `error` object in a venue reply
//! - **Transport errors** — network, TLS, or WebSocket failures
//! - **JSON errors** — deserialization failures on a frame or response body
//! - **NotAuthenticated / RefreshFailed** — token-lifecycle failures
//! - **Invalid arguments** — client-side precondition violations
//! - **Protocol errors** — a malformed upstream push or downstream frame

use std::fmt;

/// Error body shape returned by the venue on a JSON-RPC failure.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct VenueErrorBody {
    /// Venue-assigned error code.
    #[serde(default)]
    pub code: Option<i64>,
    /// Human-readable description of the error.
    #[serde(default)]
    pub message: Option<String>,
}

impl fmt::Display for VenueErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}",
            self.code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "?".into()),
            self.message.as_deref().unwrap_or("no message"),
        )
    }
}

/// All possible errors produced by the `deribit-gateway` crate.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The venue replied with a JSON-RPC `error` object.
    #[error("venue error: {0}")]
    Venue(VenueErrorBody),

    /// A network or transport-level error from `reqwest`.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A WebSocket-level error on the upstream duplex channel.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Failed to (de)serialize a JSON body or frame.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An error building or parsing a URL.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// A local I/O failure, e.g. binding the broadcast server's TCP listener.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A private call was attempted before `authenticate()` succeeded, or
    /// after a refresh failure flipped the session back to unauthenticated.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The access-token refresh round trip failed.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    /// The caller provided an invalid argument (empty instrument, a
    /// non-positive amount, etc.).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An inbound frame (upstream push or downstream client message) was not
    /// valid JSON or lacked a required field.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GatewayError>;
