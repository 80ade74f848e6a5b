//! Typed convenience wrappers over [`super::UpstreamSession`]'s raw
//! `public_request`/`private_request`, mirroring the teacher's split between
//! a generic transport (`client.rs`) and per-endpoint helpers (`api/*.rs`).

use serde_json::json;

use super::UpstreamSession;
use crate::types::rpc::ApiResponse;

impl UpstreamSession {
    /// `public/get_instruments`, projected down to instrument names.
    pub async fn get_instruments(&self, currency: &str, kind: &str) -> Vec<String> {
        let resp = self
            .public_request(
                "public/get_instruments",
                json!({"currency": currency, "kind": kind, "expired": false}),
            )
            .await;
        let Some(result) = resp.result else {
            return Vec::new();
        };
        result
            .as_array()
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|e| e.get("instrument_name")?.as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// `public/get_order_book`.
    pub async fn get_order_book(&self, instrument_name: &str, depth: u32) -> ApiResponse {
        self.public_request(
            "public/get_order_book",
            json!({"instrument_name": instrument_name, "depth": depth}),
        )
        .await
    }

    /// `private/buy`, used for both BUY and SELL via the `side` field.
    pub async fn buy(&self, params: serde_json::Value) -> ApiResponse {
        self.private_request("private/buy", params).await
    }

    /// `private/cancel`.
    pub async fn cancel(&self, order_id: &str) -> ApiResponse {
        self.private_request("private/cancel", json!({"order_id": order_id}))
            .await
    }

    /// `private/edit`.
    pub async fn edit(&self, params: serde_json::Value) -> ApiResponse {
        self.private_request("private/edit", params).await
    }

    /// `private/get_positions`.
    pub async fn get_positions(&self, currency: &str) -> ApiResponse {
        self.private_request("private/get_positions", json!({"currency": currency}))
            .await
    }

    /// `private/get_position`.
    pub async fn get_position(&self, instrument_name: &str) -> ApiResponse {
        self.private_request(
            "private/get_position",
            json!({"instrument_name": instrument_name}),
        )
        .await
    }

    /// `private/get_open_orders_by_currency`.
    pub async fn get_open_orders_by_currency(&self, currency: &str) -> ApiResponse {
        self.private_request(
            "private/get_open_orders_by_currency",
            json!({"currency": currency}),
        )
        .await
    }

    /// `private/get_order_state`.
    pub async fn get_order_state(&self, order_id: &str) -> ApiResponse {
        self.private_request("private/get_order_state", json!({"order_id": order_id}))
            .await
    }
}
