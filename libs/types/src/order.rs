//! Book side types

use serde::{Deserialize, Serialize};

/// Book side: bids are `BUY`, asks are `SELL`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy side (bid)
    BUY,
    /// Sell side (ask)
    SELL,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::BUY => Side::SELL,
            Side::SELL => Side::BUY,
        }
    }

    /// Parse the side labels exchanges use (`buy`/`bid`, `sell`/`ask`)
    pub fn from_wire(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "buy" | "bid" | "bids" => Some(Side::BUY),
            "sell" | "ask" | "asks" => Some(Side::SELL),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::BUY.opposite(), Side::SELL);
        assert_eq!(Side::SELL.opposite(), Side::BUY);
    }

    #[test]
    fn test_side_from_wire() {
        assert_eq!(Side::from_wire("buy"), Some(Side::BUY));
        assert_eq!(Side::from_wire("ASK"), Some(Side::SELL));
        assert_eq!(Side::from_wire("hold"), None);
    }
}
