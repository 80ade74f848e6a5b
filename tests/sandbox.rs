//! Integration tests for the gateway's downstream broadcast protocol and,
//! when credentials are supplied, the live Deribit Test venue.
//!
//! # Running against the live venue
//!
//! ```sh
//! export DERIBIT_TEST_API_KEY="your-key"
//! export DERIBIT_TEST_API_SECRET="your-secret"
//! cargo test --test sandbox -- --nocapture
//! ```
//!
//! Without these env vars, venue-backed tests are silently skipped. The
//! downstream broadcast-protocol tests below need no live venue and always
//! run — they exercise a real `TcpListener`-backed [`BroadcastServer`] over
//! loopback.

use std::env;
use std::sync::Arc;

use deribit_gateway::broadcast::BroadcastServer;
use deribit_gateway::session::UpstreamSession;
use deribit_gateway::store::Store;
use deribit_gateway::types::OrderBook;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

async fn spawn_loopback_server() -> (Arc<BroadcastServer>, Arc<Store>, u16) {
    let upstream = UpstreamSession::new("key", "secret", true);
    let store = Arc::new(Store::new(upstream));
    let server = BroadcastServer::new(Arc::clone(&store));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let accept_server = Arc::clone(&server);
    tokio::spawn(async move { accept_server.serve_listener(listener).await });
    (server, store, port)
}

async fn connect(port: u16) -> (tokio::net::tcp::OwnedWriteHalf, BufReader<tokio::net::tcp::OwnedReadHalf>) {
    let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let (read_half, write_half) = stream.into_split();
    (write_half, BufReader::new(read_half))
}

async fn read_frame(reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>) -> Value {
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    serde_json::from_str(line.trim()).unwrap()
}

/// Scenario 1: boot -> subscribe -> snapshot.
#[tokio::test]
async fn boot_subscribe_yields_welcome_then_subscribed_then_snapshot() {
    let (_server, store, port) = spawn_loopback_server().await;
    store.handle_orderbook_update(
        "BTC-PERPETUAL",
        OrderBook::from_levels("BTC-PERPETUAL", 1, vec![(10000.0, 1.0)], vec![(10100.0, 1.0)]),
    );

    let (mut write, mut read) = connect(port).await;
    let welcome = read_frame(&mut read).await;
    assert_eq!(welcome["type"], "welcome");

    write
        .write_all(b"{\"type\":\"subscribe\",\"channel\":\"orderbook.BTC-PERPETUAL\"}\n")
        .await
        .unwrap();
    let subscribed = read_frame(&mut read).await;
    assert_eq!(subscribed["type"], "subscribed");
    assert_eq!(subscribed["channel"], "orderbook.BTC-PERPETUAL");

    let snapshot = read_frame(&mut read).await;
    assert_eq!(snapshot["type"], "orderbook");
    assert_eq!(snapshot["instrument_name"], "BTC-PERPETUAL");
}

/// Scenario 2/3: upstream push fan-out reaches only matching subscribers,
/// and unsubscribing isolates a peer from further pushes.
#[tokio::test]
async fn unsubscribe_isolates_peer_from_further_pushes() {
    let (server, _store, port) = spawn_loopback_server().await;

    let (mut write_a, mut read_a) = connect(port).await;
    let _ = read_frame(&mut read_a).await; // welcome
    write_a
        .write_all(b"{\"type\":\"subscribe\",\"channel\":\"orderbook.BTC-PERPETUAL\"}\n")
        .await
        .unwrap();
    let _ = read_frame(&mut read_a).await; // subscribed

    let (mut write_b, mut read_b) = connect(port).await;
    let _ = read_frame(&mut read_b).await; // welcome
    write_b
        .write_all(b"{\"type\":\"subscribe\",\"channel\":\"orderbook.BTC-PERPETUAL\"}\n")
        .await
        .unwrap();
    let _ = read_frame(&mut read_b).await; // subscribed

    let book = OrderBook::from_levels("BTC-PERPETUAL", 1, vec![(10000.0, 1.0)], vec![(10100.0, 1.0)]);
    server.handle_orderbook_update("BTC-PERPETUAL", &book).await;
    let _ = read_frame(&mut read_a).await;
    let _ = read_frame(&mut read_b).await;

    write_a
        .write_all(b"{\"type\":\"unsubscribe\",\"channel\":\"orderbook.BTC-PERPETUAL\"}\n")
        .await
        .unwrap();
    let _ = read_frame(&mut read_a).await; // unsubscribed

    server.handle_orderbook_update("BTC-PERPETUAL", &book).await;

    let b_result = read_frame(&mut read_b).await;
    assert_eq!(b_result["type"], "orderbook");

    let a_result = tokio::time::timeout(std::time::Duration::from_millis(150), read_frame(&mut read_a)).await;
    assert!(a_result.is_err(), "unsubscribed peer must not receive further pushes");
}

/// Scenario 6: a malformed downstream frame gets an error reply and the
/// connection stays open and subscribed.
#[tokio::test]
async fn malformed_frame_does_not_close_the_connection() {
    let (_server, _store, port) = spawn_loopback_server().await;
    let (mut write, mut read) = connect(port).await;
    let _ = read_frame(&mut read).await; // welcome

    write.write_all(b"not json\n").await.unwrap();
    let error = read_frame(&mut read).await;
    assert_eq!(error["type"], "error");

    write
        .write_all(b"{\"type\":\"subscribe\",\"channel\":\"orderbook.ETH-PERPETUAL\"}\n")
        .await
        .unwrap();
    let subscribed = read_frame(&mut read).await;
    assert_eq!(subscribed["type"], "subscribed");
}

/// Scenario 4: live venue authentication and token refresh, gated on real
/// Deribit Test credentials.
#[tokio::test]
async fn authenticate_against_live_venue() {
    let (Ok(api_key), Ok(api_secret)) = (
        env::var("DERIBIT_TEST_API_KEY"),
        env::var("DERIBIT_TEST_API_SECRET"),
    ) else {
        eprintln!("skipping: DERIBIT_TEST_API_KEY / DERIBIT_TEST_API_SECRET not set");
        return;
    };

    let session = UpstreamSession::new(api_key, api_secret, true);
    session.authenticate().await.expect("authenticate should succeed with valid credentials");
    assert!(session.is_authenticated());

    let resp = session.get_order_state("nonexistent-order-id").await;
    assert!(!resp.success);
}
