//! Data model shared across the session, store, and broadcast layers.
//!
//! ## Organization
//!
//! - [`enums`] — `OrderType`, `Direction`, `TimeInForce`, `InstrumentKind`
//! - [`credentials`] — bearer-token lifecycle state for the upstream session
//! - [`order`] — the `Order` cache entry and its wire-serializable enums
//! - [`position`] — the `Position` cache entry
//! - [`orderbook`] — the `OrderBook` snapshot type
//! - [`rpc`] — the JSON-RPC envelope and `ApiResponse`

pub mod credentials;
pub mod enums;
pub mod order;
pub mod orderbook;
pub mod position;
pub mod rpc;

pub use credentials::Credentials;
pub use enums::{Direction, InstrumentKind, OrderType, TimeInForce};
pub use order::Order;
pub use orderbook::{Level, OrderBook};
pub use position::Position;
pub use rpc::{ApiResponse, JsonRpcFrame, JsonRpcRequest};
