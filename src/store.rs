//! Order, position, and order-book caches (C3).
//!
//! [`Store`] holds three independently-locked caches and performs
//! read-through calls against the upstream session on cache miss. Never
//! holds two of its own locks at once, and never holds a cache lock while
//! awaiting the upstream session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};

use crate::session::UpstreamSession;
use crate::types::enums::{Direction, OrderType, TimeInForce, is_open_status};
use crate::types::order::Order;
use crate::types::orderbook::OrderBook;
use crate::types::position::Position;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Thread-safe caches for open orders, positions, and per-instrument books.
pub struct Store {
    upstream: Arc<UpstreamSession>,
    open_orders: Mutex<HashMap<String, Order>>,
    positions: Mutex<HashMap<String, Position>>,
    books: Mutex<HashMap<String, OrderBook>>,
}

impl Store {
    pub fn new(upstream: Arc<UpstreamSession>) -> Self {
        Self {
            upstream,
            open_orders: Mutex::new(HashMap::new()),
            positions: Mutex::new(HashMap::new()),
            books: Mutex::new(HashMap::new()),
        }
    }

    /// Submits a new order via `private/buy`. Returns the empty string on a
    /// precondition violation or venue failure; never mutates the cache in
    /// that case.
    pub async fn place_order(
        &self,
        instrument_name: &str,
        order_type: OrderType,
        direction: Direction,
        amount: f64,
        price: f64,
        time_in_force: TimeInForce,
    ) -> String {
        if instrument_name.is_empty() || amount <= 0.0 {
            return String::new();
        }
        if order_type.requires_price() && price <= 0.0 {
            return String::new();
        }

        let mut params = json!({
            "instrument_name": instrument_name,
            "amount": amount,
            "type": order_type.as_venue_str(),
            "side": direction.as_venue_str(),
            "label": "",
            "time_in_force": time_in_force.as_venue_str(),
        });
        if order_type.requires_price() {
            params["price"] = json!(price);
        }

        let resp = self.upstream.buy(params).await;
        if !resp.success {
            return String::new();
        }
        let Some(result) = resp.result else {
            return String::new();
        };
        let Some(order_id) = result
            .get("order")
            .and_then(|o| o.get("order_id"))
            .and_then(Value::as_str)
        else {
            return String::new();
        };
        let created_at = result
            .get("order")
            .and_then(|o| o.get("creation_timestamp"))
            .and_then(Value::as_i64)
            .unwrap_or_else(now_ms);

        let order = Order {
            order_id: order_id.to_owned(),
            instrument_name: instrument_name.to_owned(),
            order_type: order_type.into(),
            direction: direction.into(),
            price,
            amount,
            time_in_force: time_in_force.into(),
            status: "open".to_owned(),
            created_at,
            last_updated_at: created_at,
        };
        self.open_orders
            .lock()
            .unwrap()
            .insert(order_id.to_owned(), order);
        order_id.to_owned()
    }

    /// Cancels an order via `private/cancel`; evicts it from the cache on
    /// success.
    pub async fn cancel_order(&self, order_id: &str) -> bool {
        if order_id.is_empty() {
            return false;
        }
        let resp = self.upstream.cancel(order_id).await;
        if !resp.success {
            return false;
        }
        self.open_orders.lock().unwrap().remove(order_id);
        true
    }

    /// Patches amount and/or price via `private/edit`. At least one of
    /// `amount`/`price` must be positive.
    pub async fn modify_order(&self, order_id: &str, amount: f64, price: f64) -> bool {
        if order_id.is_empty() || (amount <= 0.0 && price <= 0.0) {
            return false;
        }
        let mut params = json!({"order_id": order_id});
        if amount > 0.0 {
            params["amount"] = json!(amount);
        }
        if price > 0.0 {
            params["price"] = json!(price);
        }
        let resp = self.upstream.edit(params).await;
        if !resp.success {
            return false;
        }
        let mut orders = self.open_orders.lock().unwrap();
        if let Some(order) = orders.get_mut(order_id) {
            if amount > 0.0 {
                order.amount = amount;
            }
            if price > 0.0 {
                order.price = price;
            }
            order.last_updated_at = now_ms();
        }
        true
    }

    /// Read-through order-book lookup. Once cached, an instrument's book is
    /// never re-fetched here — only [`Self::handle_orderbook_update`]
    /// (driven by C5) replaces it.
    pub async fn get_orderbook(&self, instrument_name: &str, depth: u32) -> Option<OrderBook> {
        if let Some(book) = self.books.lock().unwrap().get(instrument_name).cloned() {
            return Some(book);
        }
        let resp = self.upstream.get_order_book(instrument_name, depth).await;
        let result = resp.result?;
        let book = parse_book(instrument_name, &result)?;
        self.books
            .lock()
            .unwrap()
            .insert(instrument_name.to_owned(), book.clone());
        Some(book)
    }

    /// Wholesale-replaces the cached book for `instrument_name`, independent
    /// of any read-through path. Used by the coordinator's push callback.
    pub fn handle_orderbook_update(&self, instrument_name: &str, book: OrderBook) {
        self.books
            .lock()
            .unwrap()
            .insert(instrument_name.to_owned(), book);
    }

    /// Read-through positions-by-currency lookup.
    pub async fn get_positions(&self, currency: &str) -> Vec<Position> {
        let resp = self.upstream.get_positions(currency).await;
        let Some(result) = resp.result else {
            return self.positions.lock().unwrap().values().cloned().collect();
        };
        let Some(entries) = result.as_array() else {
            return Vec::new();
        };
        let mut positions = self.positions.lock().unwrap();
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(position) = parse_position(entry) {
                positions.insert(position.instrument_name.clone(), position.clone());
                out.push(position);
            }
        }
        out
    }

    /// Cache-first single-instrument position lookup.
    pub async fn get_position(&self, instrument_name: &str) -> Option<Position> {
        if let Some(position) = self.positions.lock().unwrap().get(instrument_name).cloned() {
            return Some(position);
        }
        let resp = self.upstream.get_position(instrument_name).await;
        let position = parse_position(&resp.result?)?;
        self.positions
            .lock()
            .unwrap()
            .insert(instrument_name.to_owned(), position.clone());
        Some(position)
    }

    /// Wholesale-replaces a position, driven by an upstream push.
    pub fn handle_position_update(&self, position: Position) {
        self.positions
            .lock()
            .unwrap()
            .insert(position.instrument_name.clone(), position);
    }

    /// Cache-first lookup of all open orders for `currency`. On an empty
    /// cache, fetches via `private/get_open_orders_by_currency` and
    /// populates the cache.
    pub async fn get_open_orders(&self, currency: &str) -> Vec<Order> {
        {
            let orders = self.open_orders.lock().unwrap();
            if !orders.is_empty() {
                return orders.values().cloned().collect();
            }
        }
        let resp = self.upstream.get_open_orders_by_currency(currency).await;
        let Some(entries) = resp.result.as_ref().and_then(Value::as_array) else {
            return Vec::new();
        };
        let mut orders = self.open_orders.lock().unwrap();
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(order) = parse_order(entry) {
                orders.insert(order.order_id.clone(), order.clone());
                out.push(order);
            }
        }
        out
    }

    /// Cache-first single-order lookup, falling back to
    /// `private/get_order_state` on miss.
    pub async fn get_order(&self, order_id: &str) -> Option<Order> {
        if let Some(order) = self.open_orders.lock().unwrap().get(order_id).cloned() {
            return Some(order);
        }
        let resp = self.upstream.get_order_state(order_id).await;
        let order = parse_order(&resp.result?)?;
        if is_open_status(&order.status) {
            self.open_orders
                .lock()
                .unwrap()
                .insert(order.order_id.clone(), order.clone());
        }
        Some(order)
    }

    /// Applies an upstream order-state push: upserts if the new status is
    /// open/untriggered, otherwise evicts. This is the only path by which
    /// the open-orders cache shrinks without an explicit `cancel_order`.
    pub fn handle_order_update(&self, push: &Value) -> Option<()> {
        let order = parse_order(push)?;
        let mut orders = self.open_orders.lock().unwrap();
        if is_open_status(&order.status) {
            orders.insert(order.order_id.clone(), order);
        } else {
            orders.remove(&order.order_id);
        }
        Some(())
    }
}

fn parse_book(instrument_name: &str, result: &Value) -> Option<OrderBook> {
    let timestamp = result.get("timestamp").and_then(Value::as_i64).unwrap_or(0);
    let bids = parse_levels(result.get("bids")?);
    let asks = parse_levels(result.get("asks")?);
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
                    let price = pair.first()?.as_f64()?;
                    let size = pair.get(1)?.as_f64()?;
                    Some((price, size))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_position(value: &Value) -> Option<Position> {
    Some(Position {
        instrument_name: value.get("instrument_name")?.as_str()?.to_owned(),
        size: value.get("size").and_then(Value::as_f64).unwrap_or(0.0),
        entry_price: value.get("average_price").and_then(Value::as_f64).unwrap_or(0.0),
        mark_price: value.get("mark_price").and_then(Value::as_f64).unwrap_or(0.0),
        liquidation_price: value
            .get("estimated_liquidation_price")
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
        unrealized_pnl: value
            .get("floating_profit_loss")
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
        realized_pnl: value
            .get("realized_profit_loss")
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
    })
}

fn parse_order(value: &Value) -> Option<Order> {
    use crate::types::order::{DirectionWire, OrderTypeWire, TimeInForceWire};

    let order_type = match value.get("order_type")?.as_str()? {
        "market" => OrderTypeWire::MARKET,
        "limit" => OrderTypeWire::LIMIT,
        "stop_market" => OrderTypeWire::STOP_MARKET,
        "stop_limit" => OrderTypeWire::STOP_LIMIT,
        _ => return None,
    };
    let direction = match value.get("direction")?.as_str()? {
        "buy" => DirectionWire::BUY,
        "sell" => DirectionWire::SELL,
        _ => return None,
    };
    let time_in_force = match value.get("time_in_force").and_then(Value::as_str) {
        Some("fill_or_kill") => TimeInForceWire::FOK,
        Some("immediate_or_cancel") => TimeInForceWire::IOC,
        _ => TimeInForceWire::GTC,
    };

    Some(Order {
        order_id: value.get("order_id")?.as_str()?.to_owned(),
        instrument_name: value.get("instrument_name")?.as_str()?.to_owned(),
        order_type,
        direction,
        price: value.get("price").and_then(Value::as_f64).unwrap_or(0.0),
        amount: value.get("amount").and_then(Value::as_f64).unwrap_or(0.0),
        time_in_force,
        status: value.get("order_state")?.as_str()?.to_owned(),
        created_at: value
            .get("creation_timestamp")
            .and_then(Value::as_i64)
            .unwrap_or_else(now_ms),
        last_updated_at: value
            .get("last_update_timestamp")
            .and_then(Value::as_i64)
            .unwrap_or_else(now_ms),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn place_order_rejects_non_positive_amount() {
        let upstream = UpstreamSession::new("key", "secret", true);
        let store = Store::new(upstream);
        let id = store
            .place_order(
                "BTC-PERPETUAL",
                OrderType::LIMIT,
                Direction::BUY,
                0.0,
                10_000.0,
                TimeInForce::GTC,
            )
            .await;
        assert!(id.is_empty());
        assert!(store.get_open_orders("BTC").await.is_empty());
    }

    #[tokio::test]
    async fn place_order_rejects_limit_without_price() {
        let upstream = UpstreamSession::new("key", "secret", true);
        let store = Store::new(upstream);
        let id = store
            .place_order(
                "BTC-PERPETUAL",
                OrderType::LIMIT,
                Direction::BUY,
                1.0,
                0.0,
                TimeInForce::GTC,
            )
            .await;
        assert!(id.is_empty());
    }

    #[tokio::test]
    async fn modify_order_rejects_all_zero_fields() {
        let upstream = UpstreamSession::new("key", "secret", true);
        let store = Store::new(upstream);
        assert!(!store.modify_order("abc", 0.0, 0.0).await);
    }

    #[test]
    fn handle_order_update_removes_on_terminal_status() {
        let upstream = UpstreamSession::new("key", "secret", true);
        let store = Store::new(upstream);
        store.open_orders.lock().unwrap().insert(
            "o1".into(),
            Order {
                order_id: "o1".into(),
                instrument_name: "BTC-PERPETUAL".into(),
                order_type: crate::types::order::OrderTypeWire::LIMIT,
                direction: crate::types::order::DirectionWire::BUY,
                price: 1.0,
                amount: 1.0,
                time_in_force: crate::types::order::TimeInForceWire::GTC,
                status: "open".into(),
                created_at: 0,
                last_updated_at: 0,
            },
        );
        let push = json!({
            "order_id": "o1",
            "instrument_name": "BTC-PERPETUAL",
            "order_type": "limit",
            "direction": "buy",
            "price": 1.0,
            "amount": 1.0,
            "order_state": "filled",
        });
        store.handle_order_update(&push);
        assert!(store.open_orders.lock().unwrap().is_empty());
    }

    #[test]
    fn handle_orderbook_update_replaces_wholesale() {
        let upstream = UpstreamSession::new("key", "secret", true);
        let store = Store::new(upstream);
        let book = OrderBook::from_levels("BTC-PERPETUAL", 1, vec![(1.0, 1.0)], vec![(2.0, 1.0)]);
        store.handle_orderbook_update("BTC-PERPETUAL", book);
        assert_eq!(store.books.lock().unwrap().len(), 1);
    }
}
