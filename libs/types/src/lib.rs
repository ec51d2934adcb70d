//! Types library for the market-data and arbitrage services
//!
//! Core type definitions shared by the feed connectors and the cross
//! detector. All prices, volumes and amounts are `rust_decimal::Decimal`.
//!
//! # Modules
//! - `ids`: Exchange and trading pair identifiers
//! - `currency`: Currency codes, `Money`, conversion rates
//! - `numeric`: Decimal parsing for wire payloads
//! - `order`: Book sides
//! - `book`: Price levels and immutable book snapshots
//! - `account`: Available balances
//! - `fee`: Taker fee schedule
//! - `errors`: Error taxonomy

// Public modules
pub mod account;
pub mod book;
pub mod currency;
pub mod errors;
pub mod fee;
pub mod ids;
pub mod numeric;
pub mod order;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::account::*;
    pub use crate::book::*;
    pub use crate::currency::*;
    pub use crate::errors::*;
    pub use crate::fee::*;
    pub use crate::ids::*;
    pub use crate::numeric::*;
    pub use crate::order::*;
}
