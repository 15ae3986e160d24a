pub mod binance;
pub mod config;
pub mod lifecycle;
pub mod orchestrator;
pub mod surface;

pub use binance::BinanceClient;
pub use config::{MarketConfig, TradingConfig};
pub use lifecycle::{Engine, EngineHandle, EngineStatus};
pub use orchestrator::{Collaborators, CycleReport, MonitorController, TradeOrchestrator};
pub use surface::ControlSurface;
