//! Thin CLI entry point for the gateway.
//!
//! # Usage
//!
//! ```sh
//! cargo run --bin gateway --features cli -- <api_key> <api_secret> [port]
//! ```
//!
//! Exits 0 on clean shutdown (Ctrl-C), 1 on initialization or startup
//! failure. Carries no business logic — everything here delegates straight
//! to [`deribit_gateway::Coordinator`].

use std::env;
use std::process::ExitCode;

use deribit_gateway::constants::DEFAULT_BROADCAST_PORT;
use deribit_gateway::{Coordinator, GatewayConfig};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let (Some(api_key), Some(api_secret)) = (args.get(1), args.get(2)) else {
        eprintln!("usage: gateway <api_key> <api_secret> [port]");
        return ExitCode::FAILURE;
    };
    let port = args
        .get(3)
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_BROADCAST_PORT);

    let coordinator = Coordinator::new(GatewayConfig {
        api_key: api_key.clone(),
        api_secret: api_secret.clone(),
        test_mode: true,
        broadcast_port: port,
    });

    if let Err(e) = coordinator.start().await {
        eprintln!("startup failed: {e}");
        return ExitCode::FAILURE;
    }
    tracing::info!(%port, "gateway started");

    if tokio::signal::ctrl_c().await.is_err() {
        eprintln!("failed to listen for ctrl-c");
        return ExitCode::FAILURE;
    }

    if let Err(e) = coordinator.stop().await {
        eprintln!("shutdown failed: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
