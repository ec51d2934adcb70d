//! Arbitrage Service
//!
//! Finds crosses between reconciled exchange books: asks on one exchange
//! priced below bids on another, after converting price currencies and
//! paying taker fees on both legs.
//!
//! - `detector`: directional, pairwise and many-book cross detection
//! - `sizing`: how much of a cross the available balances can execute
//! - `monitor`: loading live books back from the market-data sink
//!
//! Everything here works on immutable `BookSnapshot`s; nothing holds a
//! reference into a connector's live book.

pub mod config;
pub mod cross;
pub mod detector;
pub mod error;
pub mod monitor;
pub mod sizing;

pub use cross::Cross;
pub use detector::CrossDetector;
pub use error::CrossError;
