use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use teloxide::types::ChatId;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use common::{
    AccountProvider, Config, MarketDataProvider, OrderExecutionProvider, TradeEvent, TradeLedger,
    TradingMode,
};
use engine::{BinanceClient, Collaborators, ControlSurface, Engine, TradeOrchestrator, TradingConfig};
use ledger::SqliteLedger;
use paper::PaperClient;
use risk::PositionMonitor;
use strategy::CrossoverStrategy;
use telegram_ctrl::{forward_events, start_bot, BotDeps};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Config ───────────────────────────────────────────────────────────────
    let cfg = Config::from_env().context("Failed to load environment configuration")?;
    let trading = TradingConfig::load(&cfg.trading_config_path)?;
    info!(
        mode = %cfg.trading_mode,
        symbol = %trading.market.symbol,
        config = %cfg.trading_config_path,
        "TradeBot starting"
    );

    // ── Trade ledger ─────────────────────────────────────────────────────────
    let trade_ledger: Arc<dyn TradeLedger> = Arc::new(
        SqliteLedger::connect(&cfg.database_url)
            .await
            .context("Failed to open trade ledger")?,
    );
    info!("Trade ledger ready");

    // ── Exchange collaborators (chosen by TRADING_MODE) ──────────────────────
    let (market, orders, account, paper): (
        Arc<dyn MarketDataProvider>,
        Arc<dyn OrderExecutionProvider>,
        Arc<dyn AccountProvider>,
        Option<Arc<PaperClient>>,
    ) = match cfg.trading_mode {
        TradingMode::Live => {
            info!("Live trading mode, using BinanceClient");
            let key = cfg.binance_api_key.clone().unwrap_or_default();
            let secret = cfg.binance_secret.clone().unwrap_or_default();
            let client = Arc::new(BinanceClient::new(key, secret)?);
            let market: Arc<dyn MarketDataProvider> = client.clone();
            let orders: Arc<dyn OrderExecutionProvider> = client.clone();
            let account: Arc<dyn AccountProvider> = client;
            (market, orders, account, None)
        }
        TradingMode::Paper => {
            info!(
                slippage_bps = cfg.paper_slippage_bps,
                balance = cfg.paper_initial_balance,
                "Paper trading mode, using PaperClient on live market data"
            );
            let market: Arc<dyn MarketDataProvider> = Arc::new(BinanceClient::public()?);
            let paper = Arc::new(PaperClient::new(
                market.clone(),
                &trading.market.base_asset,
                &trading.market.quote_asset,
                cfg.paper_initial_balance,
                cfg.paper_slippage_bps,
            ));
            let orders: Arc<dyn OrderExecutionProvider> = paper.clone();
            let account: Arc<dyn AccountProvider> = paper.clone();
            (market, orders, account, Some(paper))
        }
    };

    // ── Trade orchestrator ───────────────────────────────────────────────────
    let (event_tx, event_rx) = mpsc::channel::<TradeEvent>(64);
    let strategy = CrossoverStrategy::new(trading.strategy.clone())?;
    let mut orchestrator = TradeOrchestrator::new(
        trading.market.clone(),
        Box::new(strategy),
        PositionMonitor::new(trading.risk.clone()),
        Collaborators {
            market,
            orders,
            ledger: trade_ledger.clone(),
        },
        event_tx.clone(),
    );
    if let Some(position) = orchestrator.restore().await? {
        warn!("Open position restored from the trade ledger; the next cycle resumes monitoring it");
        // Simulated balances start empty; the recovered holding must be sellable
        if let Some(paper) = &paper {
            paper.credit(&trading.market.base_asset, position.quantity).await;
        }
    }

    let (engine, engine_handle) = Engine::new(
        orchestrator,
        Duration::from_secs(trading.market.candle_interval_secs),
        event_tx,
    );

    // ── Telegram C2 ──────────────────────────────────────────────────────────
    let bot = teloxide::Bot::new(cfg.telegram_token.clone());
    let chat_ids: Vec<ChatId> = cfg
        .telegram_allowed_user_ids
        .iter()
        .map(|&id| ChatId(id))
        .collect();
    let bot_deps = BotDeps {
        surface: ControlSurface::new(
            engine_handle,
            account,
            trade_ledger,
            &trading.market.symbol,
            &trading.market.base_asset,
            cfg.trading_mode,
        ),
        allowed_user_ids: Arc::new(cfg.telegram_allowed_user_ids.clone()),
    };

    // ── Spawn all tasks ──────────────────────────────────────────────────────
    tokio::spawn(engine.run());
    tokio::spawn(forward_events(bot.clone(), chat_ids, event_rx));
    tokio::spawn(start_bot(bot, bot_deps));

    info!("All subsystems started. Send /start to begin trading.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received. Exiting.");
    Ok(())
}
