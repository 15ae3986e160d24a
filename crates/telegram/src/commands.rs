use std::sync::Arc;

use teloxide::{dispatching::UpdateHandler, prelude::*, utils::command::BotCommands};
use tracing::{info, warn};

use engine::ControlSurface;

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Dependencies injected into every handler via `dptree`.
#[derive(Clone)]
pub struct BotDeps {
    pub surface: ControlSurface,
    pub allowed_user_ids: Arc<Vec<i64>>,
}

/// Telegram bot commands exposed to the operator.
#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "TradeBot commands:")]
pub enum Command {
    #[command(description = "Start scheduled trading")]
    Start,
    #[command(description = "Stop scheduled trading (open positions stay open)")]
    Stop,
    #[command(description = "Run one trade cycle now")]
    Trade,
    #[command(description = "Sell the open position at market")]
    Flatten,
    #[command(description = "Show the base asset balance")]
    Balance,
    #[command(description = "Show recent trades")]
    History,
    #[command(description = "Show engine status and the open position")]
    Status,
    #[command(description = "Show this help")]
    Help,
}

/// Start the Telegram bot in long-polling mode.
pub async fn start_bot(bot: Bot, deps: BotDeps) {
    let deps = Arc::new(deps);

    info!("Telegram bot starting (long-polling)");

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![deps])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

fn schema() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync>> {
    let command_handler = teloxide::filter_command::<Command, _>().endpoint(handle_command);

    Update::filter_message()
        .filter_map(|msg: Message| msg.from().map(|u| u.id))
        .filter_async(auth_filter)
        .branch(command_handler)
}

/// Silently drop messages from users not in the allowed list.
async fn auth_filter(user_id: UserId, deps: Arc<BotDeps>) -> bool {
    let uid = user_id.0 as i64;
    let allowed = is_allowed(&deps.allowed_user_ids, uid);
    if !allowed {
        warn!(user_id = uid, "Unauthorized Telegram access attempt");
    }
    allowed
}

fn is_allowed(allowed_user_ids: &[i64], uid: i64) -> bool {
    allowed_user_ids.contains(&uid)
}

async fn handle_command(bot: Bot, msg: Message, cmd: Command, deps: Arc<BotDeps>) -> HandlerResult {
    info!(command = ?cmd, chat_id = msg.chat.id.0, "Operator command");
    let surface = &deps.surface;
    let reply = match cmd {
        Command::Start => surface.start().await,
        Command::Stop => surface.stop().await,
        Command::Trade => surface.trigger_trade().await,
        Command::Flatten => surface.flatten().await,
        Command::Balance => surface.query_balance().await,
        Command::History => surface.query_history().await,
        Command::Status => surface.status().await,
        Command::Help => Command::descriptions().to_string(),
    };
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}
