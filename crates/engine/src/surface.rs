use std::sync::Arc;

use tracing::warn;

use common::{AccountProvider, EngineCommand, EngineState, TradeLedger, TradingMode};

use crate::lifecycle::EngineHandle;

/// Most recent trades listed by `/history`.
const HISTORY_LIMIT: usize = 20;

/// Operator commands, independent of the chat transport.
///
/// Every method returns the reply text. Long-running work (a trade cycle, a
/// flatten) is handed to the engine; its outcome arrives later as a
/// `TradeEvent`.
#[derive(Clone)]
pub struct ControlSurface {
    engine: EngineHandle,
    account: Arc<dyn AccountProvider>,
    ledger: Arc<dyn TradeLedger>,
    symbol: String,
    base_asset: String,
    mode: TradingMode,
}

impl ControlSurface {
    pub fn new(
        engine: EngineHandle,
        account: Arc<dyn AccountProvider>,
        ledger: Arc<dyn TradeLedger>,
        symbol: impl Into<String>,
        base_asset: impl Into<String>,
        mode: TradingMode,
    ) -> Self {
        Self {
            engine,
            account,
            ledger,
            symbol: symbol.into(),
            base_asset: base_asset.into(),
            mode,
        }
    }

    pub async fn start(&self) -> String {
        if self.engine.state().await == EngineState::Running {
            return format!("Engine is already running on {}.", self.symbol);
        }
        self.engine.send(EngineCommand::Start).await;
        format!(
            "Welcome! Trading {} in {} mode with a moving-average crossover confirmed by RSI and \
             Bollinger Bands. Every position has a stop-loss and a take-profit. Engine started.",
            self.symbol, self.mode
        )
    }

    pub async fn stop(&self) -> String {
        let status = self.engine.status().await;
        if status.state == EngineState::Stopped && !status.cycle_active {
            return "Engine is already stopped.".into();
        }
        self.engine.send(EngineCommand::Stop).await;
        if status.cycle_active {
            "Engine stopping. Monitoring of any open position ends now; the position stays open \
             until /flatten."
                .into()
        } else {
            "Engine stopped.".into()
        }
    }

    pub async fn trigger_trade(&self) -> String {
        if self.engine.status().await.cycle_active {
            return "A trade cycle is already in progress.".into();
        }
        self.engine.send(EngineCommand::TriggerTrade).await;
        format!("Trade cycle started for {}. The result will be posted here.", self.symbol)
    }

    pub async fn flatten(&self) -> String {
        let status = self.engine.status().await;
        if status.position.is_none() && !status.cycle_active {
            return "No open position.".into();
        }
        self.engine.send(EngineCommand::Flatten).await;
        format!("Flatten requested for {}.", self.symbol)
    }

    pub async fn query_balance(&self) -> String {
        match self.account.balance(&self.base_asset).await {
            Ok(balance) => format!("Your {0} balance: {balance} {0}", self.base_asset),
            Err(e) => {
                warn!(asset = %self.base_asset, error = %e, "Balance query failed");
                format!("Balance unavailable: {e}")
            }
        }
    }

    pub async fn query_history(&self) -> String {
        let records = match self.ledger.read_all().await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Trade history query failed");
                return format!("Trade history unavailable: {e}");
            }
        };
        if records.is_empty() {
            return "No trade history found.".into();
        }

        let shown = records.len().min(HISTORY_LIMIT);
        let mut reply = if shown < records.len() {
            format!("Last {shown} of {} trades:", records.len())
        } else {
            "Trade history:".to_string()
        };
        for record in &records[records.len() - shown..] {
            reply.push('\n');
            reply.push_str(&record.to_string());
        }
        reply
    }

    pub async fn status(&self) -> String {
        let status = self.engine.status().await;
        let position = match &status.position {
            Some(p) => format!(
                "{} {} @ {:.4} (SL {:.4}, TP {:.4})",
                p.quantity, p.symbol, p.entry_price, p.stop_loss_price, p.take_profit_price
            ),
            None => "none".into(),
        };
        format!(
            "Engine: {}\nMode: {}\nSymbol: {}\nCycle: {}\nPosition: {}\nLast result: {}",
            status.state,
            self.mode,
            self.symbol,
            if status.cycle_active { "in progress" } else { "idle" },
            position,
            status.last_report.as_deref().unwrap_or("none"),
        )
    }
}
