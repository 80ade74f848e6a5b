//! Upstream venue session (C2).
//!
//! [`UpstreamSession`] owns the credentials and the persistent WebSocket
//! duplex channel to the venue. It exposes three layers:
//!
//! - the raw JSON-RPC transport (`public_request` / `private_request`),
//!   used both by this module's own `authenticate`/`get_instruments` and by
//!   [`crate::store::Store`]'s read-through calls;
//! - the duplex-channel lifecycle (`connect_websocket` / `disconnect_websocket`
//!   / `subscribe` / `unsubscribe`), which demuxes inbound pushes to
//!   registered [`PushHandler`]s off a dedicated dispatch task;
//! - [`api`], typed convenience wrappers over the above (mirrors the
//!   teacher's split between a generic `client.rs` and per-endpoint
//!   `api/*.rs` modules).

pub mod api;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Once};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::constants::base_urls;
use crate::error::{GatewayError, Result};
use crate::types::credentials::Credentials;
use crate::types::rpc::{ApiResponse, JsonRpcFrame, JsonRpcRequest};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type HandlerMap = Arc<StdMutex<HashMap<String, Arc<dyn PushHandler>>>>;

/// Receives upstream subscription pushes for one channel.
///
/// Implementations must be cheap to clone or cheaply shareable: the dispatch
/// task invokes `on_message` without holding any session lock, so a slow
/// handler only blocks itself, not the I/O path.
pub trait PushHandler: Send + Sync {
    fn on_message(&self, channel: &str, data: Value);
}

/// Authenticated duplex JSON-RPC connection to the venue.
pub struct UpstreamSession {
    http: reqwest::Client,
    https_base: &'static str,
    ws_url: &'static str,
    credentials: StdMutex<Credentials>,
    next_id: AtomicU64,
    handlers: HandlerMap,
    ws_write: AsyncMutex<Option<WsSink>>,
    io_task: StdMutex<Option<JoinHandle<()>>>,
    dispatch_task: StdMutex<Option<JoinHandle<()>>>,
    connected: AtomicBool,
}

static CRYPTO_PROVIDER: Once = Once::new();

/// Installs the process-wide rustls `CryptoProvider` exactly once.
///
/// Both `reqwest`'s and `tokio-tungstenite`'s `rustls-tls*` features pull in
/// rustls 0.23, which panics on its first real handshake if no provider has
/// been installed and more than one provider crate is reachable in the
/// dependency graph. Installing `ring` explicitly up front makes this
/// deterministic regardless of feature-unification order.
fn ensure_crypto_provider() {
    CRYPTO_PROVIDER.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

impl UpstreamSession {
    /// Prepares the HTTPS transport and internal dispatch plumbing. Does not
    /// open the WebSocket duplex channel — see [`Self::connect_websocket`].
    pub fn new(
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        test_mode: bool,
    ) -> Arc<Self> {
        ensure_crypto_provider();
        let (https_base, ws_url) = base_urls(test_mode);
        Arc::new(Self {
            http: reqwest::Client::new(),
            https_base,
            ws_url,
            credentials: StdMutex::new(Credentials::new(api_key, api_secret)),
            next_id: AtomicU64::new(1),
            handlers: Arc::new(StdMutex::new(HashMap::new())),
            ws_write: AsyncMutex::new(None),
            io_task: StdMutex::new(None),
            dispatch_task: StdMutex::new(None),
            connected: AtomicBool::new(false),
        })
    }

    /// Idempotent readiness step: validates the HTTPS transport is usable.
    /// Exists as its own call so the transport can be checked before the
    /// (heavier) duplex channel is opened; it performs no I/O today.
    pub fn initialize(&self) -> Result<()> {
        Ok(())
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    // -----------------------------------------------------------------------
    // Token lifecycle
    // -----------------------------------------------------------------------

    /// Exchanges `(api_key, api_secret)` for a fresh access/refresh token
    /// pair via `public/auth` with `grant_type=client_credentials`.
    pub async fn authenticate(&self) -> Result<()> {
        let (client_id, client_secret) = {
            let creds = self.credentials.lock().unwrap();
            (creds.api_key.clone(), creds.api_secret.clone())
        };
        let params = json!({
            "grant_type": "client_credentials",
            "client_id": client_id,
            "client_secret": client_secret,
        });
        let resp = self.public_request("public/auth", params).await;
        self.apply_auth_response(resp)
    }

    async fn refresh(&self) -> Result<()> {
        let refresh_token = {
            let creds = self.credentials.lock().unwrap();
            creds.refresh_token.clone()
        };
        let Some(refresh_token) = refresh_token else {
            self.credentials.lock().unwrap().invalidate();
            return Err(GatewayError::RefreshFailed(
                "no refresh token on file".into(),
            ));
        };
        let params = json!({
            "grant_type": "refresh_token",
            "refresh_token": refresh_token,
        });
        let resp = self.public_request("public/auth", params).await;
        self.apply_auth_response(resp)
    }

    fn apply_auth_response(&self, resp: ApiResponse) -> Result<()> {
        if !resp.success {
            self.credentials.lock().unwrap().invalidate();
            return Err(GatewayError::RefreshFailed(
                resp.error_message.unwrap_or_else(|| "unknown auth failure".into()),
            ));
        }
        let result = resp.result.unwrap_or(Value::Null);
        let access_token = result
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::Protocol("auth result missing access_token".into()))?
            .to_owned();
        let refresh_token = result
            .get("refresh_token")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::Protocol("auth result missing refresh_token".into()))?
            .to_owned();
        let expires_in = result.get("expires_in").and_then(Value::as_u64).unwrap_or(0);
        self.credentials
            .lock()
            .unwrap()
            .apply_grant(access_token, refresh_token, expires_in);
        Ok(())
    }

    /// Whether `authenticate`/`refresh` last succeeded.
    pub fn is_authenticated(&self) -> bool {
        self.credentials.lock().unwrap().authenticated
    }

    // -----------------------------------------------------------------------
    // HTTPS one-shot requests
    // -----------------------------------------------------------------------

    /// One-shot HTTPS POST of a JSON-RPC envelope. Never propagates a
    /// transport/JSON error — failures are returned as `ApiResponse` data.
    pub async fn public_request(&self, method: &str, params: Value) -> ApiResponse {
        let req = JsonRpcRequest::new(self.next_id(), method, params);
        let url = format!("{}/api/v2/{}", self.https_base, method);
        tracing::debug!(%url, "POST");

        let resp = match self
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&req)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, %method, "transport failure");
                return ApiResponse::failure(e.to_string());
            }
        };

        let bytes = match resp.bytes().await {
            Ok(b) => b,
            Err(e) => return ApiResponse::failure(e.to_string()),
        };

        let frame: JsonRpcFrame = match serde_json::from_slice(&bytes) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(error = %e, %method, "malformed JSON-RPC reply");
                return ApiResponse::failure(format!("invalid JSON: {e}"));
            }
        };

        match frame.error {
            Some(err) => ApiResponse::failure(err.message.unwrap_or_else(|| "venue error".into())),
            None => ApiResponse::ok(frame.result.unwrap_or(Value::Null)),
        }
    }

    /// Authenticated one-shot request. Refreshes the token first if expired;
    /// a refresh failure flips the session unauthenticated and surfaces as a
    /// failed `ApiResponse` rather than propagating.
    pub async fn private_request(&self, method: &str, mut params: Value) -> ApiResponse {
        let (authenticated, expired) = {
            let creds = self.credentials.lock().unwrap();
            (creds.authenticated, creds.is_expired())
        };
        if !authenticated {
            return ApiResponse::failure("Not authenticated");
        }
        if expired {
            if let Err(e) = self.refresh().await {
                return ApiResponse::failure(e.to_string());
            }
        }
        let access_token = {
            let creds = self.credentials.lock().unwrap();
            creds.access_token.clone().unwrap_or_default()
        };
        if let Value::Object(map) = &mut params {
            map.insert("access_token".into(), Value::String(access_token));
        }
        self.public_request(method, params).await
    }

    // -----------------------------------------------------------------------
    // Duplex channel lifecycle
    // -----------------------------------------------------------------------

    /// Establishes the persistent duplex channel, installs the demux, and
    /// launches the I/O and dispatch tasks. Idempotent: a no-op if already
    /// connected.
    pub async fn connect_websocket(self: &Arc<Self>) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }
        let (ws, _response) = connect_async(self.ws_url).await?;
        let (write, read) = ws.split();
        *self.ws_write.lock().await = Some(write);

        let (tx, rx) = mpsc::unbounded_channel();

        let dispatch_task = tokio::spawn(Self::run_dispatch_worker(Arc::clone(&self.handlers), rx));
        *self.dispatch_task.lock().unwrap() = Some(dispatch_task);

        let io_task = tokio::spawn(Self::run_io_worker(read, tx));
        *self.io_task.lock().unwrap() = Some(io_task);

        self.connected.store(true, Ordering::SeqCst);

        if self.is_authenticated() {
            let refresh_token = {
                let creds = self.credentials.lock().unwrap();
                creds.refresh_token.clone()
            };
            if let Some(refresh_token) = refresh_token {
                let _ = self
                    .send_ws_request(
                        "public/auth",
                        json!({"grant_type": "refresh_token", "refresh_token": refresh_token}),
                    )
                    .await;
            }
        }

        Ok(())
    }

    /// Sends a normal close frame and joins both background tasks.
    pub async fn disconnect_websocket(&self) -> Result<()> {
        if let Some(mut write) = self.ws_write.lock().await.take() {
            let _ = write.send(Message::Close(None)).await;
        }
        if let Some(task) = self.io_task.lock().unwrap().take() {
            task.abort();
        }
        if let Some(task) = self.dispatch_task.lock().unwrap().take() {
            task.abort();
        }
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn run_io_worker(
        mut read: SplitStream<WsStream>,
        dispatch_tx: mpsc::UnboundedSender<(String, Value)>,
    ) {
        while let Some(msg) = read.next().await {
            let msg = match msg {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(error = %e, "upstream WebSocket error");
                    break;
                }
            };
            let Message::Text(text) = msg else {
                continue;
            };
            let frame: JsonRpcFrame = match serde_json::from_str(&text) {
                Ok(f) => f,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping malformed upstream frame");
                    continue;
                }
            };
            if frame.is_subscription_push() {
                if let (Some(channel), Some(data)) = (frame.push_channel(), frame.push_data()) {
                    let _ = dispatch_tx.send((channel.to_owned(), data));
                }
            } else if let Some(err) = frame.error {
                tracing::warn!(code = ?err.code, message = ?err.message, "upstream error frame");
            }
        }
    }

    async fn run_dispatch_worker(
        handlers: HandlerMap,
        mut rx: mpsc::UnboundedReceiver<(String, Value)>,
    ) {
        while let Some((channel, data)) = rx.recv().await {
            let handler = handlers.lock().unwrap().get(&channel).cloned();
            if let Some(handler) = handler {
                handler.on_message(&channel, data);
            }
        }
    }

    /// Registers `channel → handler` locally, then sends `public/subscribe`.
    pub async fn subscribe(&self, channel: &str, handler: Arc<dyn PushHandler>) -> Result<()> {
        self.handlers
            .lock()
            .unwrap()
            .insert(channel.to_owned(), handler);
        self.send_ws_request("public/subscribe", json!({"channels": [channel]}))
            .await
    }

    /// Sends `public/unsubscribe`, then removes the local mapping.
    pub async fn unsubscribe(&self, channel: &str) -> Result<()> {
        let result = self
            .send_ws_request("public/unsubscribe", json!({"channels": [channel]}))
            .await;
        self.handlers.lock().unwrap().remove(channel);
        result
    }

    async fn send_ws_request(&self, method: &str, params: Value) -> Result<()> {
        let req = JsonRpcRequest::new(self.next_id(), method, params);
        let text = serde_json::to_string(&req)?;
        let mut write = self.ws_write.lock().await;
        let Some(write) = write.as_mut() else {
            return Err(GatewayError::Protocol("duplex channel not connected".into()));
        };
        write.send(Message::Text(text.into())).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn private_request_without_authentication_is_a_soft_failure() {
        let session = UpstreamSession::new("key", "secret", true);
        let resp = session.private_request("private/get_order_state", json!({})).await;
        assert!(!resp.success);
        assert_eq!(resp.error_message.as_deref(), Some("Not authenticated"));
    }
}
