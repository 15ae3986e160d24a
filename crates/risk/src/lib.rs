pub mod monitor;

pub use monitor::{
    recover_open_position, MonitorControl, MonitorState, PollOutcome, PositionMonitor,
    RiskConfig, WatchOutcome,
};
