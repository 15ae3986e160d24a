pub mod alerts;
pub mod commands;

pub use alerts::{alert_text, forward_events, send_alert};
pub use commands::{start_bot, BotDeps, Command};
