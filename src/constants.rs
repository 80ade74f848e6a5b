//! Constants for talking to the Deribit venue.
//!
//! Contains the test/production base URLs and the default downstream
//! broadcast port. These are used internally by [`crate::session`] and
//! [`crate::broadcast`], but are also exported for advanced usage.

// ---------------------------------------------------------------------------
// Venue base URLs
// ---------------------------------------------------------------------------

/// HTTPS base URL for the Deribit Test environment.
pub const TEST_HTTPS_BASE_URL: &str = "https://test.deribit.com";

/// WebSocket base URL for the Deribit Test environment.
pub const TEST_WS_URL: &str = "wss://test.deribit.com/ws/api/v2";

/// HTTPS base URL for the Deribit production environment.
pub const PROD_HTTPS_BASE_URL: &str = "https://www.deribit.com";

/// WebSocket base URL for the Deribit production environment.
pub const PROD_WS_URL: &str = "wss://www.deribit.com/ws/api/v2";

/// Path prefix under which every JSON-RPC method is POSTed.
pub const API_PATH_PREFIX: &str = "/api/v2";

// ---------------------------------------------------------------------------
// Downstream broadcast server
// ---------------------------------------------------------------------------

/// Default TCP port for the local broadcast gateway.
pub const DEFAULT_BROADCAST_PORT: u16 = 9000;

/// Returns the `(https_base, ws_base)` pair for the given test-mode flag.
pub fn base_urls(test_mode: bool) -> (&'static str, &'static str) {
    if test_mode {
        (TEST_HTTPS_BASE_URL, TEST_WS_URL)
    } else {
        (PROD_HTTPS_BASE_URL, PROD_WS_URL)
    }
}

/// Builds the upstream subscription channel name for an instrument's 100ms
/// order-book stream, e.g. `book.BTC-PERPETUAL.100ms`.
pub fn book_channel(instrument_name: &str) -> String {
    format!("book.{instrument_name}.100ms")
}

/// Builds the downstream broadcast channel name for an instrument's order
/// book, e.g. `orderbook.BTC-PERPETUAL`.
pub fn orderbook_channel(instrument_name: &str) -> String {
    format!("orderbook.{instrument_name}")
}

/// Strips the `orderbook.` prefix from a downstream channel name, returning
/// the trailing instrument name if present.
pub fn instrument_from_orderbook_channel(channel: &str) -> Option<&str> {
    channel.strip_prefix("orderbook.")
}
