//! Trading coordinator (C5): composes C2-C4 and owns process lifecycle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;

use crate::broadcast::BroadcastServer;
use crate::constants::book_channel;
use crate::error::Result;
use crate::latency::Registry;
use crate::session::{PushHandler, UpstreamSession};
use crate::store::Store;
use crate::types::orderbook::OrderBook;

/// Bridges an upstream `book.<instrument>.100ms` push into a downstream
/// `orderbook.<instrument>` broadcast. Deliberately does **not** write into
/// the store's book cache — see the design note on staleness in the spec.
///
/// `on_message` runs synchronously on the dispatch worker and cannot await,
/// so parsed books are forwarded over an unbounded channel to a single
/// per-subscription forwarding task that awaits the broadcast in order —
/// this keeps delivery FIFO per channel instead of racing one spawned task
/// per push.
struct MarketDataHandler {
    instrument_name: String,
    latency: Registry,
    tx: mpsc::UnboundedSender<OrderBook>,
}

impl PushHandler for MarketDataHandler {
    fn on_message(&self, _channel: &str, data: Value) {
        let guard = self.latency.get_tracker("market_data_push", true, 4096).start();
        if let Some(book) = parse_push_book(&self.instrument_name, &data) {
            let _ = self.tx.send(book);
        }
        guard.stop();
    }
}

fn parse_push_book(instrument_name: &str, data: &Value) -> Option<OrderBook> {
    let timestamp = match data.get("timestamp") {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    };
    let bids = parse_levels(data.get("bids")?);
    let asks = parse_levels(data.get("asks")?);
    let instrument_name = data
        .get("instrument_name")
        .and_then(Value::as_str)
        .unwrap_or(instrument_name);
    Some(OrderBook::from_levels(instrument_name, timestamp, bids, asks))
}

fn parse_levels(value: &Value) -> Vec<(f64, f64)> {
    value
        .as_array()
        .map(|levels| {
            levels
                .iter()
                .filter_map(|level| {
                    let pair = level.as_array()?;
                    Some((pair.first()?.as_f64()?, pair.get(1)?.as_f64()?))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Configuration passed directly to [`Coordinator::new`] — no config-file
/// parser; the embedder constructs this with explicit values.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_key: String,
    pub api_secret: String,
    pub test_mode: bool,
    pub broadcast_port: u16,
}

/// Owns the upstream session, the caches, and the broadcast server, and
/// wires upstream pushes into downstream broadcasts.
pub struct Coordinator {
    upstream: Arc<UpstreamSession>,
    store: Arc<Store>,
    broadcast: Arc<BroadcastServer>,
    latency: Registry,
    running: AtomicBool,
    stopped_notify: Notify,
    server_task: std::sync::Mutex<Option<JoinHandle<()>>>,
    port: u16,
}

impl Coordinator {
    /// Constructs C2, C3, and C4 from `config`, but performs no I/O yet.
    pub fn new(config: GatewayConfig) -> Arc<Self> {
        let upstream = UpstreamSession::new(config.api_key, config.api_secret, config.test_mode);
        let store = Arc::new(Store::new(Arc::clone(&upstream)));
        let broadcast = BroadcastServer::new(Arc::clone(&store));
        Arc::new(Self {
            upstream,
            store,
            broadcast,
            latency: Registry::new(),
            running: AtomicBool::new(false),
            stopped_notify: Notify::new(),
            server_task: std::sync::Mutex::new(None),
            port: config.broadcast_port,
        })
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn upstream(&self) -> &Arc<UpstreamSession> {
        &self.upstream
    }

    pub fn broadcast(&self) -> &Arc<BroadcastServer> {
        &self.broadcast
    }

    pub fn latency(&self) -> &Registry {
        &self.latency
    }

    /// Authenticates, opens the upstream duplex channel, and starts the
    /// broadcast server. Idempotent.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.upstream.initialize()?;
        self.upstream.authenticate().await?;
        self.upstream.connect_websocket().await?;

        let broadcast = Arc::clone(&self.broadcast);
        let port = self.port;
        let task = tokio::spawn(async move {
            if let Err(e) = broadcast.serve(port).await {
                tracing::error!(error = %e, "broadcast server exited");
            }
        });
        *self.server_task.lock().unwrap() = Some(task);
        Ok(())
    }

    /// Stops the upstream duplex channel and the broadcast server. Safe to
    /// call more than once (e.g. re-entrant `ctrl_c` handling).
    pub async fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.upstream.disconnect_websocket().await?;
        if let Some(task) = self.server_task.lock().unwrap().take() {
            task.abort();
        }
        self.stopped_notify.notify_waiters();
        Ok(())
    }

    /// Blocks until [`Self::stop`] is called.
    pub async fn wait(&self) {
        self.stopped_notify.notified().await;
    }

    /// Subscribes to the upstream `book.<instrument>.100ms` channel and
    /// forwards pushes to `orderbook.<instrument>` downstream. Does not
    /// populate the store's book cache — see [`MarketDataHandler`].
    pub async fn subscribe_market_data(self: &Arc<Self>, instrument_name: &str) -> Result<()> {
        let channel = book_channel(instrument_name);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler = Arc::new(MarketDataHandler {
            instrument_name: instrument_name.to_owned(),
            latency: self.latency.clone(),
            tx,
        });

        let broadcast = Arc::clone(&self.broadcast);
        let forward_instrument = instrument_name.to_owned();
        tokio::spawn(async move {
            while let Some(book) = rx.recv().await {
                broadcast.handle_orderbook_update(&forward_instrument, &book).await;
            }
        });

        self.upstream.subscribe(&channel, handler).await
    }

    /// Unsubscribes from the upstream market-data channel for `instrument_name`.
    pub async fn unsubscribe_market_data(&self, instrument_name: &str) -> Result<()> {
        let channel = book_channel(instrument_name);
        self.upstream.unsubscribe(&channel).await
    }
}
