use teloxide::prelude::*;
use tokio::sync::mpsc;
use tracing::{info, warn};

use common::{ExitReason, TradeEvent};

/// Chat text for a trade event.
pub fn alert_text(event: &TradeEvent) -> String {
    match event {
        TradeEvent::PositionOpened { position } => format!(
            "📈 BUY executed: {} {} at {:.4}. Stop-loss {:.4}, take-profit {:.4}. Monitoring.",
            position.quantity,
            position.symbol,
            position.entry_price,
            position.stop_loss_price,
            position.take_profit_price
        ),
        TradeEvent::ExitTriggered {
            symbol,
            reason,
            trigger_price,
        } => {
            let label = match reason {
                ExitReason::StopLoss => "⚠️ Stop-loss",
                ExitReason::TakeProfit => "✅ Take-profit",
                ExitReason::Manual => "✋ Manual exit",
            };
            format!("{label} triggered on {symbol} at {trigger_price:.4}. Selling.")
        }
        TradeEvent::CycleCompleted { summary } => summary.clone(),
        TradeEvent::CycleFailed { error } => format!("🚨 Trade cycle failed: {error}"),
        TradeEvent::LedgerFailed { record, error } => {
            format!("🚨 Trade filled but not recorded: {record}. Error: {error}")
        }
    }
}

/// Send a proactive alert to all configured chat IDs.
pub async fn send_alert(bot: &Bot, chat_ids: &[ChatId], message: &str) {
    for &chat_id in chat_ids {
        if let Err(e) = bot.send_message(chat_id, message).await {
            warn!(chat_id = ?chat_id, error = %e, "Failed to send Telegram alert");
        }
    }
}

/// Push every trade event to the operators until the channel closes.
pub async fn forward_events(bot: Bot, chat_ids: Vec<ChatId>, mut events: mpsc::Receiver<TradeEvent>) {
    while let Some(event) = events.recv().await {
        send_alert(&bot, &chat_ids, &alert_text(&event)).await;
    }
    info!("Trade event channel closed, alert forwarder exiting");
}
