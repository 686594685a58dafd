pub mod api;
pub mod arbitrage;
pub mod bot;
pub mod config;
pub mod database;
pub mod error;
pub mod exchange;
pub mod types;

pub use config::Config;
pub use error::{ArbResult, ArbitrageError};
pub use types::*;
