use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use common::{
    Error, ExitReason, MarketDataProvider, OrderSide, Position, PositionStatus, Result,
    TradeRecord,
};

/// User-configurable exit parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Loss below entry that closes the position (e.g. 0.05 = 5%).
    pub stop_loss_pct: f64,
    /// Gain above entry that closes the position (e.g. 0.10 = 10%).
    pub take_profit_pct: f64,
    /// Seconds between price polls while a position is open.
    pub poll_interval_secs: u64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            stop_loss_pct: 0.05,
            take_profit_pct: 0.10,
            poll_interval_secs: 60,
        }
    }
}

impl RiskConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.stop_loss_pct > 0.0 && self.stop_loss_pct < 1.0) {
            return Err(Error::Config(format!(
                "stop_loss_pct must be in (0, 1), got {}",
                self.stop_loss_pct
            )));
        }
        if !(self.take_profit_pct > 0.0 && self.take_profit_pct.is_finite()) {
            return Err(Error::Config(format!(
                "take_profit_pct must be positive, got {}",
                self.take_profit_pct
            )));
        }
        if self.poll_interval_secs == 0 {
            return Err(Error::Config("poll_interval_secs must be at least 1".into()));
        }
        Ok(())
    }
}

/// Lifecycle of a monitored position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitorState {
    /// No position.
    Idle,
    /// Position held, polling price.
    Open,
    /// Exit triggered, waiting for the sell to fill.
    Closing,
    /// Exit order confirmed.
    Closed,
}

/// Result of checking one price against an open position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollOutcome {
    pub next_state: MonitorState,
    pub exit_reason: Option<ExitReason>,
}

/// Out-of-band instruction for a running `watch` loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MonitorControl {
    #[default]
    Run,
    /// Exit now at market with `ExitReason::Manual`.
    Flatten,
    /// Stop watching and leave the position open.
    Abort,
}

/// How a `watch` loop ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WatchOutcome {
    Exit {
        reason: ExitReason,
        trigger_price: f64,
    },
    /// Aborted before any exit trigger; the position is still open.
    Cancelled { last_price: Option<f64> },
}

/// Stop-loss / take-profit state machine for a single long position.
///
/// Between polls the only state is the `Position` itself: each poll is a
/// pure function of (position, price).
#[derive(Debug, Clone)]
pub struct PositionMonitor {
    config: RiskConfig,
}

impl PositionMonitor {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Stop-loss and take-profit prices for an entry.
    pub fn bounds(&self, entry_price: f64) -> (f64, f64) {
        (
            entry_price * (1.0 - self.config.stop_loss_pct),
            entry_price * (1.0 + self.config.take_profit_pct),
        )
    }

    /// Idle → Open, from a filled buy.
    pub fn open(
        &self,
        symbol: &str,
        entry_price: f64,
        quantity: f64,
        opened_at: DateTime<Utc>,
    ) -> Result<Position> {
        if !(entry_price > 0.0 && entry_price.is_finite()) || !(quantity > 0.0) {
            return Err(Error::InvariantViolation(format!(
                "cannot open {symbol} position with entry {entry_price} and quantity {quantity}"
            )));
        }
        let (stop_loss_price, take_profit_price) = self.bounds(entry_price);
        Ok(Position {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            entry_price,
            quantity,
            opened_at,
            stop_loss_price,
            take_profit_price,
            status: PositionStatus::Open,
        })
    }

    /// Open → Closing when `price` crosses a bound, otherwise stay Open.
    pub fn poll(position: &Position, price: f64) -> PollOutcome {
        if !position.is_open() {
            return PollOutcome {
                next_state: MonitorState::Closed,
                exit_reason: None,
            };
        }
        let exit_reason = if price <= position.stop_loss_price {
            Some(ExitReason::StopLoss)
        } else if price >= position.take_profit_price {
            Some(ExitReason::TakeProfit)
        } else {
            None
        };
        PollOutcome {
            next_state: if exit_reason.is_some() {
                MonitorState::Closing
            } else {
                MonitorState::Open
            },
            exit_reason,
        }
    }

    /// Closing → Closed, once the exit order is confirmed.
    pub fn close(mut position: Position) -> Position {
        position.status = PositionStatus::Closed;
        position
    }

    /// Poll the market every `poll_interval_secs` until an exit triggers or
    /// `control` says otherwise.
    ///
    /// A failed price fetch is logged and retried on the next tick; it never
    /// moves the position out of Open.
    pub async fn watch(
        &self,
        position: &Position,
        market: &dyn MarketDataProvider,
        control: &mut watch::Receiver<MonitorControl>,
    ) -> WatchOutcome {
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_price = None;
        let mut control_open = true;

        info!(
            symbol = %position.symbol,
            entry = position.entry_price,
            stop_loss = position.stop_loss_price,
            take_profit = position.take_profit_price,
            "Monitoring position"
        );

        loop {
            let command = *control.borrow_and_update();
            match command {
                MonitorControl::Run => {}
                MonitorControl::Flatten => {
                    let trigger_price = self.manual_exit_price(position, market, last_price).await;
                    info!(symbol = %position.symbol, price = trigger_price, "Manual flatten requested");
                    return WatchOutcome::Exit {
                        reason: ExitReason::Manual,
                        trigger_price,
                    };
                }
                MonitorControl::Abort => {
                    warn!(symbol = %position.symbol, "Monitoring aborted, position left open");
                    return WatchOutcome::Cancelled { last_price };
                }
            }

            tokio::select! {
                _ = ticker.tick() => {
                    match market.latest_price(&position.symbol).await {
                        Ok(price) => {
                            last_price = Some(price);
                            let outcome = Self::poll(position, price);
                            if let Some(reason) = outcome.exit_reason {
                                info!(symbol = %position.symbol, price, reason = %reason, "Exit triggered");
                                return WatchOutcome::Exit { reason, trigger_price: price };
                            }
                            debug!(symbol = %position.symbol, price, "Position within bounds");
                        }
                        Err(e) => {
                            warn!(symbol = %position.symbol, error = %e, "Price poll failed, retrying on next tick");
                        }
                    }
                }
                changed = control.changed(), if control_open => {
                    if changed.is_err() {
                        // Nobody can send commands any more; keep polling.
                        control_open = false;
                    }
                }
            }
        }
    }

    async fn manual_exit_price(
        &self,
        position: &Position,
        market: &dyn MarketDataProvider,
        last_price: Option<f64>,
    ) -> f64 {
        match market.latest_price(&position.symbol).await {
            Ok(price) => price,
            Err(e) => {
                let fallback = last_price.unwrap_or(position.entry_price);
                warn!(symbol = %position.symbol, error = %e, fallback, "No fresh price for flatten");
                fallback
            }
        }
    }
}

/// Rebuild the open position, if any, from the trade log: the last buy on
/// `symbol` with no sell after it.
pub fn recover_open_position(
    records: &[TradeRecord],
    symbol: &str,
    monitor: &PositionMonitor,
) -> Result<Option<Position>> {
    let mut open: Option<&TradeRecord> = None;
    for record in records.iter().filter(|r| r.symbol == symbol) {
        match record.action {
            OrderSide::Buy => open = Some(record),
            OrderSide::Sell => open = None,
        }
    }
    open.map(|buy| monitor.open(symbol, buy.price, buy.quantity, buy.timestamp))
        .transpose()
}
