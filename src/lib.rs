//! # deribit-gateway
//!
//! A low-latency client and local order-book distribution gateway for a
//! crypto derivatives venue's JSON-RPC v2 API (Deribit Test).
//!
//! Five components tie together: a process-wide [`latency`] registry, the
//! [`session`] that holds the venue's bearer-token lifecycle and duplex
//! channel, the [`store`] of open orders/positions/books, the downstream
//! [`broadcast`] server, and the [`coordinator`] that composes all of them.
//!
//! ## Quick Start
//!
//! ```no_run
//! use deribit_gateway::coordinator::{Coordinator, GatewayConfig};
//!
//! #[tokio::main]
//! async fn main() -> deribit_gateway::error::Result<()> {
//!     let coordinator = Coordinator::new(GatewayConfig {
//!         api_key: "your-api-key".into(),
//!         api_secret: "your-api-secret".into(),
//!         test_mode: true,
//!         broadcast_port: deribit_gateway::constants::DEFAULT_BROADCAST_PORT,
//!     });
//!     coordinator.start().await?;
//!     coordinator.subscribe_market_data("BTC-PERPETUAL").await?;
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod constants;
pub mod coordinator;
pub mod error;
pub mod latency;
pub mod session;
pub mod store;
pub mod types;

/// Re-export the coordinator type at crate root for convenience.
pub use coordinator::{Coordinator, GatewayConfig};
/// Re-export the error type and Result alias.
pub use error::{GatewayError, Result};
