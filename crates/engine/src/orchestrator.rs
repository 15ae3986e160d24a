use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use common::{
    Error, ExitReason, MarketDataProvider, Order, OrderConfirmation, OrderExecutionProvider,
    OrderSide, Position, Result, SignalKind, TradeEvent, TradeLedger, TradeRecord,
};
use risk::{recover_open_position, MonitorControl, PositionMonitor, WatchOutcome};
use strategy::Strategy;

use crate::config::MarketConfig;

/// External services a trade cycle talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub market: Arc<dyn MarketDataProvider>,
    pub orders: Arc<dyn OrderExecutionProvider>,
    pub ledger: Arc<dyn TradeLedger>,
}

/// What one cycle (or a flatten) did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleReport {
    /// Signal was None.
    NoTrade { price: f64 },
    /// Sell signal with nothing held and shorting disabled.
    SellIgnored { price: f64 },
    /// Sell signal acted on without a position.
    Sold { record: TradeRecord },
    /// A monitored position was exited and the sell confirmed.
    Closed {
        position: Position,
        exit: TradeRecord,
        reason: ExitReason,
        fill_price: f64,
    },
    /// Monitoring was cancelled; the position is still held.
    LeftOpen { position: Position },
    /// Flatten or stop arrived before the signal was acted on; no order
    /// was placed.
    Cancelled { signal: SignalKind, price: f64 },
    /// Flatten requested with nothing held.
    NothingToFlatten,
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleReport::NoTrade { price } => write!(f, "No trade executed (last close {price:.4})."),
            CycleReport::SellIgnored { price } => write!(
                f,
                "Sell signal at {price:.4} ignored: no open position to sell."
            ),
            CycleReport::Sold { record } => write!(f, "SELL executed: {record}"),
            CycleReport::Closed {
                position,
                exit,
                reason,
                fill_price,
            } => write!(
                f,
                "Closed {} {} bought at {:.4}: {reason} triggered at {:.4}, SELL filled at {fill_price:.4}.",
                position.quantity, position.symbol, position.entry_price, exit.price
            ),
            CycleReport::LeftOpen { position } => write!(
                f,
                "Monitoring stopped; {} {} bought at {:.4} is still open. Use /flatten to close it.",
                position.quantity, position.symbol, position.entry_price
            ),
            CycleReport::Cancelled { signal, price } => write!(
                f,
                "Cycle cancelled before acting on the {signal} signal at {price:.4}; no order placed."
            ),
            CycleReport::NothingToFlatten => write!(f, "No open position to flatten."),
        }
    }
}

/// Sends `MonitorControl` instructions to a running cycle.
#[derive(Clone)]
pub struct MonitorController {
    tx: Arc<watch::Sender<MonitorControl>>,
}

impl MonitorController {
    /// Exit the monitored position at market.
    pub fn flatten(&self) {
        self.tx.send_replace(MonitorControl::Flatten);
    }

    /// Stop monitoring, leaving the position open.
    pub fn abort(&self) {
        self.tx.send_replace(MonitorControl::Abort);
    }

    /// Clear any previous instruction before the next cycle.
    pub fn reset(&self) {
        self.tx.send_replace(MonitorControl::Run);
    }
}

/// Runs trade cycles for one symbol: evaluate the strategy, buy on a buy
/// signal, monitor the position to its exit, record every fill.
///
/// At most one position is held. A cycle that finds a position already held
/// resumes monitoring it instead of evaluating the strategy.
pub struct TradeOrchestrator {
    market_config: MarketConfig,
    strategy: Box<dyn Strategy>,
    monitor: PositionMonitor,
    services: Collaborators,
    events: mpsc::Sender<TradeEvent>,
    control_tx: Arc<watch::Sender<MonitorControl>>,
    control_rx: watch::Receiver<MonitorControl>,
    position: Option<Position>,
    /// Set when an exit sell timed out; blocks cycles until a flatten.
    unconfirmed_exit: Option<String>,
}

impl TradeOrchestrator {
    pub fn new(
        market_config: MarketConfig,
        strategy: Box<dyn Strategy>,
        monitor: PositionMonitor,
        services: Collaborators,
        events: mpsc::Sender<TradeEvent>,
    ) -> Self {
        let (control_tx, control_rx) = watch::channel(MonitorControl::Run);
        Self {
            market_config,
            strategy,
            monitor,
            services,
            events,
            control_tx: Arc::new(control_tx),
            control_rx,
            position: None,
            unconfirmed_exit: None,
        }
    }

    pub fn controller(&self) -> MonitorController {
        MonitorController {
            tx: self.control_tx.clone(),
        }
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn symbol(&self) -> &str {
        &self.market_config.symbol
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    /// Reload the open position, if any, from the trade ledger.
    pub async fn restore(&mut self) -> Result<Option<Position>> {
        let records = self.services.ledger.read_all().await?;
        let recovered = recover_open_position(&records, &self.market_config.symbol, &self.monitor)?;
        if let Some(position) = &recovered {
            warn!(
                symbol = %position.symbol,
                entry = position.entry_price,
                qty = position.quantity,
                "Recovered open position from trade history"
            );
        }
        self.position = recovered.clone();
        Ok(recovered)
    }

    /// One full cycle. Returns once the cycle reaches a terminal outcome:
    /// no trade, a closed round trip, or a position left open by an abort.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        if let Some(description) = &self.unconfirmed_exit {
            return Err(Error::InvariantViolation(format!(
                "exit order {description} has unknown status; check the exchange and /flatten"
            )));
        }

        if let Some(position) = self.position.clone() {
            info!(symbol = %position.symbol, entry = position.entry_price, "Position already held, resuming monitoring");
            return self.monitor_until_exit(position).await;
        }

        let market = &self.market_config;
        let series = self
            .services
            .market
            .series(&market.symbol, market.candle_interval_secs, market.lookback_candles)
            .await?;
        let signal = self.strategy.evaluate(&series)?;
        info!(symbol = %market.symbol, signal = %signal.kind, price = signal.price, "Strategy evaluated");

        let control = *self.control_rx.borrow();
        if control != MonitorControl::Run && signal.kind != SignalKind::None {
            info!(symbol = %market.symbol, ?control, signal = %signal.kind, "Cycle cancelled before placing an order");
            return Ok(CycleReport::Cancelled {
                signal: signal.kind,
                price: signal.price,
            });
        }

        match signal.kind {
            SignalKind::None => Ok(CycleReport::NoTrade {
                price: signal.price,
            }),
            SignalKind::Buy => {
                let position = self.open_long().await?;
                self.monitor_until_exit(position).await
            }
            SignalKind::Sell if self.market_config.allow_short => {
                let confirmation = self
                    .place(OrderSide::Sell, self.market_config.trade_amount)
                    .await?;
                let record = TradeRecord::from_confirmation(&confirmation);
                self.record(&record).await;
                Ok(CycleReport::Sold { record })
            }
            SignalKind::Sell => {
                info!(symbol = %self.market_config.symbol, "Sell signal with no open position, ignoring");
                Ok(CycleReport::SellIgnored {
                    price: signal.price,
                })
            }
        }
    }

    /// Buy `trade_amount` at market and start tracking the position.
    pub async fn open_long(&mut self) -> Result<Position> {
        if let Some(open) = &self.position {
            return Err(Error::InvariantViolation(format!(
                "position {} on {} is already open; refusing a second buy",
                open.id, open.symbol
            )));
        }

        let confirmation = self
            .place(OrderSide::Buy, self.market_config.trade_amount)
            .await?;

        // Only a fill that can be tracked goes into the ledger, so an
        // unmatched buy there always means a held position.
        let position = self
            .monitor
            .open(
                &confirmation.symbol,
                confirmation.filled_price,
                confirmation.filled_quantity,
                confirmation.timestamp,
            )
            .map_err(|e| {
                error!(order_id = %confirmation.order_id, error = %e, "Buy filled with unusable confirmation");
                Error::InvariantViolation(format!(
                    "buy order {} reported filled at {} for {} {}; check the exchange: {e}",
                    confirmation.order_id,
                    confirmation.filled_price,
                    confirmation.filled_quantity,
                    confirmation.symbol
                ))
            })?;
        self.record(&TradeRecord::from_confirmation(&confirmation))
            .await;
        self.position = Some(position.clone());
        self.emit(TradeEvent::PositionOpened {
            position: position.clone(),
        });
        Ok(position)
    }

    /// Sell the held position at market now.
    ///
    /// Clears a pending unconfirmed exit: the operator is asserting the
    /// position should be closed.
    pub async fn flatten(&mut self) -> Result<CycleReport> {
        let Some(position) = self.position.clone() else {
            return Ok(CycleReport::NothingToFlatten);
        };
        self.unconfirmed_exit = None;

        let trigger_price = match self.services.market.latest_price(&position.symbol).await {
            Ok(price) => price,
            Err(e) => {
                warn!(symbol = %position.symbol, error = %e, "No fresh price for flatten, using entry price");
                position.entry_price
            }
        };
        self.close_position(position, ExitReason::Manual, trigger_price)
            .await
    }

    async fn monitor_until_exit(&mut self, position: Position) -> Result<CycleReport> {
        let outcome = self
            .monitor
            .watch(&position, self.services.market.as_ref(), &mut self.control_rx)
            .await;

        match outcome {
            WatchOutcome::Exit {
                reason,
                trigger_price,
            } => self.close_position(position, reason, trigger_price).await,
            WatchOutcome::Cancelled { last_price } => {
                info!(symbol = %position.symbol, ?last_price, "Cycle cancelled with position open");
                Ok(CycleReport::LeftOpen { position })
            }
        }
    }

    /// Closing → Closed. A rejected sell keeps the position open; a sell with
    /// unknown status blocks further cycles until a flatten.
    async fn close_position(
        &mut self,
        position: Position,
        reason: ExitReason,
        trigger_price: f64,
    ) -> Result<CycleReport> {
        self.emit(TradeEvent::ExitTriggered {
            symbol: position.symbol.clone(),
            reason,
            trigger_price,
        });

        let confirmation = match self.place(OrderSide::Sell, position.quantity).await {
            Ok(confirmation) => confirmation,
            Err(e @ Error::OrderTimeout { .. }) => {
                self.unconfirmed_exit = Some(format!(
                    "SELL {} {} ({reason})",
                    position.quantity, position.symbol
                ));
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let exit = TradeRecord {
            timestamp: confirmation.timestamp,
            symbol: position.symbol.clone(),
            action: OrderSide::Sell,
            price: trigger_price,
            quantity: confirmation.filled_quantity,
            reason: Some(reason),
        };
        self.record(&exit).await;

        self.position = None;
        Ok(CycleReport::Closed {
            position: PositionMonitor::close(position),
            exit,
            reason,
            fill_price: confirmation.filled_price,
        })
    }

    async fn place(&self, side: OrderSide, quantity: f64) -> Result<OrderConfirmation> {
        let order = Order::market(&self.market_config.symbol, side, quantity);
        info!(symbol = %order.symbol, side = %side, qty = quantity, "Placing market order");

        match self.services.orders.place_market_order(&order).await {
            Ok(confirmation) => {
                info!(
                    symbol = %confirmation.symbol,
                    side = %confirmation.side,
                    price = confirmation.filled_price,
                    qty = confirmation.filled_quantity,
                    "Order filled"
                );
                Ok(confirmation)
            }
            Err(e) => {
                error!(symbol = %order.symbol, side = %side, error = %e, "Order failed");
                Err(e)
            }
        }
    }

    /// A fill that cannot be recorded is still a fill: log, alert, go on.
    async fn record(&self, record: &TradeRecord) {
        if let Err(e) = self.services.ledger.append(record).await {
            error!(record = %record, error = %e, "Failed to record trade");
            self.emit(TradeEvent::LedgerFailed {
                record: record.clone(),
                error: e.to_string(),
            });
        }
    }

    fn emit(&self, event: TradeEvent) {
        if let Err(e) = self.events.try_send(event) {
            warn!(error = %e, "Trade event dropped");
        }
    }
}
