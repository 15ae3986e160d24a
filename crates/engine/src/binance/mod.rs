mod rest;

pub use rest::{interval_code, BinanceClient};
