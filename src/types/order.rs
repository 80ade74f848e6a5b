//! Order request/response and cache-entry types.

use serde::{Deserialize, Serialize};

use crate::types::enums::{Direction, OrderType, TimeInForce};

/// A cached open order, tracked by the order store (C3).
///
/// Invariant: every `Order` present in the open-orders cache has a `status`
/// for which [`crate::types::enums::is_open_status`] returns `true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub instrument_name: String,
    pub order_type: OrderTypeWire,
    pub direction: DirectionWire,
    pub price: f64,
    pub amount: f64,
    pub time_in_force: TimeInForceWire,
    pub status: String,
    pub created_at: i64,
    pub last_updated_at: i64,
}

/// Serializable mirror of [`OrderType`] (the enum itself has no `serde` impl
/// since its variants map to lowercase venue strings via `as_venue_str`).
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderTypeWire {
    MARKET,
    LIMIT,
    STOP_MARKET,
    STOP_LIMIT,
}

impl From<OrderType> for OrderTypeWire {
    fn from(t: OrderType) -> Self {
        match t {
            OrderType::MARKET => Self::MARKET,
            OrderType::LIMIT => Self::LIMIT,
            OrderType::STOP_MARKET => Self::STOP_MARKET,
            OrderType::STOP_LIMIT => Self::STOP_LIMIT,
        }
    }
}

/// Serializable mirror of [`Direction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectionWire {
    BUY,
    SELL,
}

impl From<Direction> for DirectionWire {
    fn from(d: Direction) -> Self {
        match d {
            Direction::BUY => Self::BUY,
            Direction::SELL => Self::SELL,
        }
    }
}

/// Serializable mirror of [`TimeInForce`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForceWire {
    GTC,
    FOK,
    IOC,
}

impl From<TimeInForce> for TimeInForceWire {
    fn from(t: TimeInForce) -> Self {
        match t {
            TimeInForce::GTC => Self::GTC,
            TimeInForce::FOK => Self::FOK,
            TimeInForce::IOC => Self::IOC,
        }
    }
}

/// A single fill/trade record, not currently cached but parsed from venue
/// order-state replies for completeness.
#[derive(Debug, Clone, Deserialize)]
pub struct TradeDetail {
    pub trade_id: String,
    pub order_id: String,
    pub instrument_name: String,
    pub price: f64,
    pub amount: f64,
    pub direction: String,
    pub timestamp: i64,
}
