//! Shared enum types that map to the venue's JSON-RPC string values.
//!
//! Variant names use `SCREAMING_SNAKE_CASE` to mirror the Rust-side naming
//! used throughout this crate; `as_venue_str` / `FromStr` handle the mapping
//! to and from the lowercase strings the wire format expects.

use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Order Type
// ---------------------------------------------------------------------------

/// The kind of order being placed.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderType {
    MARKET,
    LIMIT,
    STOP_MARKET,
    STOP_LIMIT,
}

impl OrderType {
    /// The venue's wire string for this order type.
    pub fn as_venue_str(self) -> &'static str {
        match self {
            Self::LIMIT => "limit",
            Self::MARKET => "market",
            Self::STOP_LIMIT => "stop_limit",
            Self::STOP_MARKET => "stop_market",
        }
    }

    /// Whether this order type requires a positive limit price.
    pub fn requires_price(self) -> bool {
        matches!(self, Self::LIMIT | Self::STOP_LIMIT)
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_venue_str())
    }
}

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// Buy or sell side of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    BUY,
    SELL,
}

impl Direction {
    /// The venue's wire string (`side`) for this direction.
    pub fn as_venue_str(self) -> &'static str {
        match self {
            Self::BUY => "buy",
            Self::SELL => "sell",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_venue_str())
    }
}

// ---------------------------------------------------------------------------
// Time In Force
// ---------------------------------------------------------------------------

/// Order validity / time-in-force policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeInForce {
    GTC,
    FOK,
    IOC,
}

impl TimeInForce {
    /// The venue's wire string for this time-in-force value.
    pub fn as_venue_str(self) -> &'static str {
        match self {
            Self::GTC => "good_til_cancelled",
            Self::FOK => "fill_or_kill",
            Self::IOC => "immediate_or_cancel",
        }
    }
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_venue_str())
    }
}

// ---------------------------------------------------------------------------
// Instrument Kind (for get_instruments)
// ---------------------------------------------------------------------------

/// Instrument kind passed to `public/get_instruments`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrumentKind {
    Spot,
    Future,
    Option,
}

impl InstrumentKind {
    /// The venue's wire string for this instrument kind.
    pub fn as_venue_str(self) -> &'static str {
        match self {
            Self::Spot => "spot",
            Self::Future => "future",
            Self::Option => "option",
        }
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_venue_str())
    }
}

/// Order status strings that keep an order present in the open-orders cache.
///
/// Any other status value is treated as terminal.
pub fn is_open_status(status: &str) -> bool {
    matches!(status, "open" | "untriggered")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseEnumError;

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unrecognized enum string")
    }
}

impl std::error::Error for ParseEnumError {}

impl FromStr for OrderType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "limit" => Ok(Self::LIMIT),
            "market" => Ok(Self::MARKET),
            "stop_limit" => Ok(Self::STOP_LIMIT),
            "stop_market" => Ok(Self::STOP_MARKET),
            _ => Err(ParseEnumError),
        }
    }
}

impl FromStr for Direction {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "buy" => Ok(Self::BUY),
            "sell" => Ok(Self::SELL),
            _ => Err(ParseEnumError),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_type_round_trips_through_venue_string() {
        for ty in [
            OrderType::MARKET,
            OrderType::LIMIT,
            OrderType::STOP_MARKET,
            OrderType::STOP_LIMIT,
        ] {
            assert_eq!(ty.as_venue_str().parse::<OrderType>().unwrap(), ty);
        }
    }

    #[test]
    fn only_limit_family_requires_price() {
        assert!(OrderType::LIMIT.requires_price());
        assert!(OrderType::STOP_LIMIT.requires_price());
        assert!(!OrderType::MARKET.requires_price());
        assert!(!OrderType::STOP_MARKET.requires_price());
    }

    #[test]
    fn open_status_set_matches_spec() {
        assert!(is_open_status("open"));
        assert!(is_open_status("untriggered"));
        assert!(!is_open_status("filled"));
        assert!(!is_open_status("cancelled"));
    }
}
