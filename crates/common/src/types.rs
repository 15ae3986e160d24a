use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One OHLCV candle. Immutable once recorded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceSample {
    /// Candle with every price field set to `close`.
    pub fn flat(timestamp: DateTime<Utc>, close: f64) -> Self {
        Self {
            timestamp,
            open: close,
            high: close,
            low: close,
            close,
            volume: 0.0,
        }
    }
}

/// Chronologically ordered candles for one symbol.
///
/// Timestamps are strictly ascending: no duplicates, gaps allowed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSeries(Vec<PriceSample>);

impl PriceSeries {
    pub fn new(samples: Vec<PriceSample>) -> Result<Self> {
        if let Some(pos) = samples
            .windows(2)
            .position(|w| w[1].timestamp <= w[0].timestamp)
        {
            return Err(Error::InvalidSeries(format!(
                "sample {} at {} is not after {}",
                pos + 1,
                samples[pos + 1].timestamp,
                samples[pos].timestamp
            )));
        }
        Ok(Self(samples))
    }

    pub fn samples(&self) -> &[PriceSample] {
        &self.0
    }

    pub fn closes(&self) -> Vec<f64> {
        self.0.iter().map(|s| s.close).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&PriceSample> {
        self.0.last()
    }
}

/// Side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

impl std::str::FromStr for OrderSide {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Ok(OrderSide::Buy),
            "SELL" => Ok(OrderSide::Sell),
            other => Err(Error::Other(format!("unknown order side '{other}'"))),
        }
    }
}

/// A market order to be submitted to the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Client order id. Fresh per order so a resubmission is never mistaken
    /// for the original.
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
}

impl Order {
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            symbol: symbol.into(),
            side,
            quantity,
        }
    }
}

/// Confirmation of a filled market order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderConfirmation {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub filled_price: f64,
    pub filled_quantity: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    None,
    Buy,
    Sell,
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalKind::None => write!(f, "none"),
            SignalKind::Buy => write!(f, "buy"),
            SignalKind::Sell => write!(f, "sell"),
        }
    }
}

/// Trading decision plus the close price it was made at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub kind: SignalKind,
    pub price: f64,
}

impl Signal {
    pub fn none(price: f64) -> Self {
        Self { kind: SignalKind::None, price }
    }

    pub fn buy(price: f64) -> Self {
        Self { kind: SignalKind::Buy, price }
    }

    pub fn sell(price: f64) -> Self {
        Self { kind: SignalKind::Sell, price }
    }
}

/// Why an open position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    /// Operator flattened the position by hand.
    Manual,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::Manual => "manual",
        }
    }
}

impl std::str::FromStr for ExitReason {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "stop_loss" => Ok(ExitReason::StopLoss),
            "take_profit" => Ok(ExitReason::TakeProfit),
            "manual" => Ok(ExitReason::Manual),
            other => Err(Error::Other(format!("unknown exit reason '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Open,
    Closed,
}

/// A long position held from a filled buy until its exit order is confirmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub symbol: String,
    pub entry_price: f64,
    pub quantity: f64,
    pub opened_at: DateTime<Utc>,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
    pub status: PositionStatus,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }
}

/// Append-only log entry for one filled order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub action: OrderSide,
    pub price: f64,
    pub quantity: f64,
    /// Set on the sell leg that closed a monitored position.
    pub reason: Option<ExitReason>,
}

impl TradeRecord {
    pub fn from_confirmation(confirmation: &OrderConfirmation) -> Self {
        Self {
            timestamp: confirmation.timestamp,
            symbol: confirmation.symbol.clone(),
            action: confirmation.side,
            price: confirmation.filled_price,
            quantity: confirmation.filled_quantity,
            reason: None,
        }
    }
}

impl std::fmt::Display for TradeRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} {} @ {:.4}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.action,
            self.quantity,
            self.symbol,
            self.price
        )?;
        if let Some(reason) = self.reason {
            write!(f, " ({reason})")?;
        }
        Ok(())
    }
}

/// Whether the bot is running against the real exchange or simulating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Live,
    Paper,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Live => write!(f, "live"),
            TradingMode::Paper => write!(f, "paper"),
        }
    }
}

/// Reason the exchange refused an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RejectionReason {
    InsufficientBalance,
    Exchange(String),
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionReason::InsufficientBalance => write!(f, "insufficient balance"),
            RejectionReason::Exchange(s) => write!(f, "{s}"),
        }
    }
}

/// Scheduling state of the trading engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    /// No scheduled cycles. Manual `/trade` still works.
    #[default]
    Stopped,
    /// A cycle runs every candle interval.
    Running,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Stopped => write!(f, "stopped"),
            EngineState::Running => write!(f, "running"),
        }
    }
}

/// Commands sent to the engine via the command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCommand {
    Start,
    Stop,
    TriggerTrade,
    Flatten,
}

/// Notifications pushed to the operator outside a request/response exchange.
#[derive(Debug, Clone)]
pub enum TradeEvent {
    PositionOpened {
        position: Position,
    },
    ExitTriggered {
        symbol: String,
        reason: ExitReason,
        trigger_price: f64,
    },
    CycleCompleted {
        summary: String,
    },
    CycleFailed {
        error: String,
    },
    LedgerFailed {
        record: TradeRecord,
        error: String,
    },
}

impl std::fmt::Display for TradeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeEvent::PositionOpened { position } => write!(
                f,
                "Opened {} {} at {:.4} (stop-loss {:.4}, take-profit {:.4})",
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
            } => write!(f, "Exit triggered on {symbol}: {reason} at {trigger_price:.4}"),
            TradeEvent::CycleCompleted { summary } => write!(f, "{summary}"),
            TradeEvent::CycleFailed { error } => write!(f, "Trade cycle failed: {error}"),
            TradeEvent::LedgerFailed { record, error } => {
                write!(f, "Trade filled but not recorded ({record}): {error}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn series_accepts_ascending_with_gaps() {
        let series = PriceSeries::new(vec![
            PriceSample::flat(at(0), 1.0),
            PriceSample::flat(at(60), 2.0),
            PriceSample::flat(at(600), 3.0),
        ])
        .unwrap();
        assert_eq!(series.closes(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn series_rejects_duplicate_timestamps() {
        let result = PriceSeries::new(vec![
            PriceSample::flat(at(0), 1.0),
            PriceSample::flat(at(0), 2.0),
        ]);
        assert!(matches!(result, Err(Error::InvalidSeries(_))));
    }

    #[test]
    fn series_rejects_descending_timestamps() {
        let result = PriceSeries::new(vec![
            PriceSample::flat(at(60), 1.0),
            PriceSample::flat(at(0), 2.0),
        ]);
        assert!(matches!(result, Err(Error::InvalidSeries(_))));
    }

    #[test]
    fn exit_reason_round_trips_through_str() {
        for reason in [ExitReason::StopLoss, ExitReason::TakeProfit, ExitReason::Manual] {
            assert_eq!(reason.as_str().parse::<ExitReason>().unwrap(), reason);
        }
        assert!("later".parse::<ExitReason>().is_err());
    }

    #[test]
    fn market_orders_get_distinct_ids() {
        let a = Order::market("ETHUSDT", OrderSide::Buy, 0.01);
        let b = Order::market("ETHUSDT", OrderSide::Buy, 0.01);
        assert_ne!(a.id, b.id);
    }
}
