pub mod config;
pub mod error;
pub mod exchange;
pub mod ledger;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use exchange::{AccountProvider, MarketDataProvider, OrderExecutionProvider};
pub use ledger::TradeLedger;
pub use types::*;
