//! Order-book snapshot type shared by the store (C3) and the broadcast
//! server (C4).

use serde::{Deserialize, Serialize};

/// A price/size level in an order book.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub price: f64,
    pub size: f64,
}

impl From<(f64, f64)> for Level {
    fn from((price, size): (f64, f64)) -> Self {
        Self { price, size }
    }
}

/// A wholesale order-book snapshot for one instrument.
///
/// Bids are sorted descending by price, asks ascending; the venue is trusted
/// to preserve tie order. Replaced wholesale per update — the core never
/// merges deltas into an existing book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBook {
    pub instrument_name: String,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
    pub timestamp: i64,
}

impl OrderBook {
    /// Parses a book out of the venue's `[[price, size], ...]` array shape,
    /// as found in both `public/get_order_book` results and `book.*.100ms`
    /// push payloads.
    pub fn from_levels(
        instrument_name: impl Into<String>,
        timestamp: i64,
        bids: Vec<(f64, f64)>,
        asks: Vec<(f64, f64)>,
    ) -> Self {
        Self {
            instrument_name: instrument_name.into(),
            timestamp,
            bids: bids.into_iter().map(Level::from).collect(),
            asks: asks.into_iter().map(Level::from).collect(),
        }
    }

    /// The best (highest) bid price, if any.
    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|l| l.price)
    }

    /// The best (lowest) ask price, if any.
    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|l| l.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_levels_preserves_order_and_values() {
        let book = OrderBook::from_levels(
            "BTC-PERPETUAL",
            1,
            vec![(10000.0, 1.0), (9990.0, 2.0)],
            vec![(10100.0, 1.5)],
        );
        assert_eq!(book.best_bid(), Some(10000.0));
        assert_eq!(book.best_ask(), Some(10100.0));
        assert_eq!(book.bids[1], Level { price: 9990.0, size: 2.0 });
    }
}
