//! Downstream pub/sub broadcast server (C4).
//!
//! Accepts plain-text JSON-framed TCP connections (newline-delimited), tracks
//! per-channel subscriptions under a single subscriptions lock, and fans
//! upstream book updates out to subscribers. The connections set and the
//! subscriptions tables are guarded by separate locks; the subscriptions
//! lock is never held while writing to a socket.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::mpsc;

use crate::constants::{instrument_from_orderbook_channel, orderbook_channel};
use crate::error::Result;
use crate::store::Store;
use crate::types::orderbook::OrderBook;

/// Opaque identity for one accepted downstream peer.
pub type ConnectionId = u64;

struct Connection {
    outbox: mpsc::UnboundedSender<String>,
}

/// The pub/sub fan-out server that downstream peers connect to.
pub struct BroadcastServer {
    store: Arc<Store>,
    next_id: AtomicU64,
    connections: AsyncMutex<HashMap<ConnectionId, Connection>>,
    forward: AsyncMutex<HashMap<String, HashSet<ConnectionId>>>,
    inverse: AsyncMutex<HashMap<ConnectionId, HashSet<String>>>,
}

impl BroadcastServer {
    pub fn new(store: Arc<Store>) -> Arc<Self> {
        Arc::new(Self {
            store,
            next_id: AtomicU64::new(1),
            connections: AsyncMutex::new(HashMap::new()),
            forward: AsyncMutex::new(HashMap::new()),
            inverse: AsyncMutex::new(HashMap::new()),
        })
    }

    /// Binds `port` and runs the accept loop until the listener errors or
    /// the task is aborted by the coordinator.
    pub async fn serve(self: Arc<Self>, port: u16) -> Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        tracing::info!(%port, "broadcast server listening");
        self.serve_listener(listener).await;
        Ok(())
    }

    /// Runs the accept loop against an already-bound listener. Exposed
    /// separately so callers (including tests) can bind an ephemeral port
    /// and learn its address before the accept loop starts.
    pub async fn serve_listener(self: Arc<Self>, listener: TcpListener) {
        loop {
            let (socket, peer_addr) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    continue;
                }
            };
            tracing::debug!(%peer_addr, "peer connected");
            let this = Arc::clone(&self);
            tokio::spawn(this.handle_connection(socket));
        }
    }

    async fn handle_connection(self: Arc<Self>, socket: TcpStream) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (read_half, mut write_half) = socket.into_split();
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        self.connections
            .lock()
            .await
            .insert(id, Connection { outbox: tx.clone() });

        let writer = tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                if write_half.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if write_half.write_all(b"\n").await.is_err() {
                    break;
                }
            }
        });

        let welcome = json!({"type": "welcome", "message": "connected"}).to_string();
        let _ = tx.send(welcome);

        let mut lines = BufReader::new(read_half).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Err(e) = self.handle_inbound(id, &line).await {
                        tracing::warn!(error = %e, conn = id, "failed to reply to peer");
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, conn = id, "read error");
                    break;
                }
            }
        }

        self.on_disconnect(id).await;
        drop(tx);
        let _ = writer.await;
    }

    async fn handle_inbound(&self, id: ConnectionId, line: &str) -> Result<()> {
        let parsed: std::result::Result<Value, _> = serde_json::from_str(line);
        let frame = match parsed {
            Ok(frame) => frame,
            Err(e) => {
                return self
                    .send(id, &json!({"type": "error", "message": format!("Invalid JSON: {e}")}))
                    .await;
            }
        };
        let Some(msg_type) = frame.get("type").and_then(Value::as_str) else {
            return self
                .send(id, &json!({"type": "error", "message": "missing 'type' field"}))
                .await;
        };
        match msg_type {
            "subscribe" => {
                let Some(channel) = frame.get("channel").and_then(Value::as_str) else {
                    return self
                        .send(id, &json!({"type": "error", "message": "missing 'channel' field"}))
                        .await;
                };
                self.subscribe(id, channel).await?;
                self.send(id, &json!({"type": "subscribed", "channel": channel}))
                    .await?;
                if let Some(instrument) = instrument_from_orderbook_channel(channel) {
                    if let Some(book) = self.store.get_orderbook(instrument, 10).await {
                        self.send(id, &orderbook_frame(&book)).await?;
                    }
                }
                Ok(())
            }
            "unsubscribe" => {
                let Some(channel) = frame.get("channel").and_then(Value::as_str) else {
                    return self
                        .send(id, &json!({"type": "error", "message": "missing 'channel' field"}))
                        .await;
                };
                self.unsubscribe(id, channel).await;
                self.send(id, &json!({"type": "unsubscribed", "channel": channel}))
                    .await
            }
            other => {
                self.send(id, &json!({"type": "error", "message": format!("unknown type '{other}'")}))
                    .await
            }
        }
    }

    async fn subscribe(&self, id: ConnectionId, channel: &str) -> Result<()> {
        self.forward
            .lock()
            .await
            .entry(channel.to_owned())
            .or_default()
            .insert(id);
        self.inverse
            .lock()
            .await
            .entry(id)
            .or_default()
            .insert(channel.to_owned());
        Ok(())
    }

    async fn unsubscribe(&self, id: ConnectionId, channel: &str) {
        if let Some(set) = self.forward.lock().await.get_mut(channel) {
            set.remove(&id);
        }
        if let Some(set) = self.inverse.lock().await.get_mut(&id) {
            set.remove(channel);
        }
    }

    async fn on_disconnect(&self, id: ConnectionId) {
        self.connections.lock().await.remove(&id);
        let channels = self.inverse.lock().await.remove(&id).unwrap_or_default();
        let mut forward = self.forward.lock().await;
        for channel in channels {
            if let Some(set) = forward.get_mut(&channel) {
                set.remove(&id);
            }
        }
    }

    /// Direct unicast to one connection. A missing connection is a silent
    /// no-op (the peer disconnected between lookup and send).
    pub async fn send(&self, id: ConnectionId, message: &Value) -> Result<()> {
        let connections = self.connections.lock().await;
        if let Some(conn) = connections.get(&id) {
            let _ = conn.outbox.send(message.to_string());
        }
        Ok(())
    }

    /// Sends `message` to every live connection.
    pub async fn broadcast(&self, message: &Value) {
        let text = message.to_string();
        let connections = self.connections.lock().await;
        for conn in connections.values() {
            let _ = conn.outbox.send(text.clone());
        }
    }

    /// Sends `message` only to connections subscribed to `channel`. A
    /// channel with no subscribers is a silent no-op.
    pub async fn broadcast_to_channel(&self, channel: &str, message: &Value) {
        let recipients: Vec<ConnectionId> = {
            let forward = self.forward.lock().await;
            match forward.get(channel) {
                Some(set) => set.iter().copied().collect(),
                None => return,
            }
        };
        let text = message.to_string();
        let connections = self.connections.lock().await;
        for id in recipients {
            if let Some(conn) = connections.get(&id) {
                let _ = conn.outbox.send(text.clone());
            }
        }
    }

    /// Serializes `book` into an `{type:"orderbook",...}` frame and
    /// broadcasts it to `orderbook.<instrument_name>`.
    pub async fn handle_orderbook_update(&self, instrument_name: &str, book: &OrderBook) {
        let channel = orderbook_channel(instrument_name);
        self.broadcast_to_channel(&channel, &orderbook_frame(book)).await;
    }
}

fn orderbook_frame(book: &OrderBook) -> Value {
    json!({
        "type": "orderbook",
        "instrument_name": book.instrument_name,
        "timestamp": book.timestamp,
        "bids": book.bids.iter().map(|l| json!([l.price, l.size])).collect::<Vec<_>>(),
        "asks": book.asks.iter().map(|l| json!([l.price, l.size])).collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::UpstreamSession;
    use tokio::io::BufReader as TestBufReader;
    use tokio::net::TcpStream;

    async fn spawn_server() -> (Arc<BroadcastServer>, Arc<Store>, u16) {
        let upstream = UpstreamSession::new("key", "secret", true);
        let store = Arc::new(Store::new(upstream));
        let server = BroadcastServer::new(Arc::clone(&store));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server_clone = Arc::clone(&server);
        tokio::spawn(async move {
            loop {
                let (socket, _) = listener.accept().await.unwrap();
                let this = Arc::clone(&server_clone);
                tokio::spawn(this.handle_connection(socket));
            }
        });
        (server, store, port)
    }

    async fn read_json_line(reader: &mut TestBufReader<tokio::net::tcp::OwnedReadHalf>) -> Value {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        serde_json::from_str(line.trim()).unwrap()
    }

    #[tokio::test]
    async fn subscribe_then_unsubscribe_round_trips_indices() {
        let (server, _store, port) = spawn_server().await;
        let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = TestBufReader::new(read_half);

        let welcome = read_json_line(&mut reader).await;
        assert_eq!(welcome["type"], "welcome");

        write_half
            .write_all(b"{\"type\":\"subscribe\",\"channel\":\"orderbook.BTC-PERPETUAL\"}\n")
            .await
            .unwrap();
        let subscribed = read_json_line(&mut reader).await;
        assert_eq!(subscribed["type"], "subscribed");

        // No cached book yet, so no orderbook snapshot frame follows.
        write_half
            .write_all(b"{\"type\":\"unsubscribe\",\"channel\":\"orderbook.BTC-PERPETUAL\"}\n")
            .await
            .unwrap();
        let unsubscribed = read_json_line(&mut reader).await;
        assert_eq!(unsubscribed["type"], "unsubscribed");

        assert!(server.forward.lock().await.get("orderbook.BTC-PERPETUAL").map(|s| s.is_empty()).unwrap_or(true));
    }

    #[tokio::test]
    async fn malformed_frame_gets_error_reply_connection_stays_open() {
        let (_server, _store, port) = spawn_server().await;
        let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = TestBufReader::new(read_half);
        let _welcome = read_json_line(&mut reader).await;

        write_half.write_all(b"not json\n").await.unwrap();
        let error = read_json_line(&mut reader).await;
        assert_eq!(error["type"], "error");

        write_half
            .write_all(b"{\"type\":\"subscribe\",\"channel\":\"x\"}\n")
            .await
            .unwrap();
        let subscribed = read_json_line(&mut reader).await;
        assert_eq!(subscribed["type"], "subscribed");
    }

    #[tokio::test]
    async fn fan_out_reaches_only_subscribers_of_the_matching_channel() {
        let (server, _store, port) = spawn_server().await;

        // No cached book for either instrument, so subscribing yields only
        // the "subscribed" ack — no snapshot frame to account for below.
        let mut peers = Vec::new();
        for channel in ["orderbook.BTC-PERPETUAL", "orderbook.BTC-PERPETUAL", "orderbook.ETH-PERPETUAL"] {
            let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = TestBufReader::new(read_half);
            let _welcome = read_json_line(&mut reader).await;
            write_half
                .write_all(format!("{{\"type\":\"subscribe\",\"channel\":\"{channel}\"}}\n").as_bytes())
                .await
                .unwrap();
            let _subscribed = read_json_line(&mut reader).await;
            // Keep write_half alive for the lifetime of the connection —
            // dropping it half-closes the socket and the server sees EOF.
            peers.push((channel, reader, write_half));
        }

        let book = OrderBook::from_levels("BTC-PERPETUAL", 1, vec![(10000.0, 1.0)], vec![(10100.0, 1.0)]);
        server.handle_orderbook_update("BTC-PERPETUAL", &book).await;

        for (channel, mut reader, _write_half) in peers {
            if channel == "orderbook.BTC-PERPETUAL" {
                let frame = read_json_line(&mut reader).await;
                assert_eq!(frame["type"], "orderbook");
                assert_eq!(frame["instrument_name"], "BTC-PERPETUAL");
            } else {
                let result = tokio::time::timeout(
                    std::time::Duration::from_millis(100),
                    read_json_line(&mut reader),
                )
                .await;
                assert!(result.is_err(), "ETH peer should not receive a BTC update");
            }
        }
    }
}
