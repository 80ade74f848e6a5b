//! Position cache-entry type.

use serde::{Deserialize, Serialize};

/// A cached position snapshot for one instrument.
///
/// Positions are always replaced wholesale — never partially patched — by
/// [`crate::store::Store::handle_position_update`] or a refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub instrument_name: String,
    pub size: f64,
    pub entry_price: f64,
    pub mark_price: f64,
    pub liquidation_price: f64,
    pub unrealized_pnl: f64,
    pub realized_pnl: f64,
}
