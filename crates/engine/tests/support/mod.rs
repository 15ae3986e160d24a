#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::mpsc;

use common::{
    AccountProvider, Error, MarketDataProvider, Order, OrderConfirmation, OrderExecutionProvider,
    PriceSample, PriceSeries, RejectionReason, Result, Signal, SignalKind, TradeEvent,
    TradeLedger, TradeRecord,
};
use engine::{Collaborators, MarketConfig, TradeOrchestrator};
use ledger::MemoryLedger;
use risk::{PositionMonitor, RiskConfig};
use strategy::Strategy;

pub fn series(closes: &[f64]) -> PriceSeries {
    let samples = closes
        .iter()
        .enumerate()
        .map(|(i, &c)| PriceSample::flat(Utc.timestamp_opt(i as i64 * 3600, 0).unwrap(), c))
        .collect();
    PriceSeries::new(samples).unwrap()
}

/// Always returns the same signal kind at the last close.
pub struct FixedStrategy {
    kind: SignalKind,
    pub evaluations: Arc<AtomicUsize>,
}

impl FixedStrategy {
    pub fn new(kind: SignalKind) -> Self {
        Self {
            kind,
            evaluations: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Strategy for FixedStrategy {
    fn name(&self) -> &str {
        "fixed"
    }

    fn min_history(&self) -> usize {
        1
    }

    fn evaluate(&self, series: &PriceSeries) -> Result<Signal> {
        self.evaluations.fetch_add(1, Ordering::SeqCst);
        let price = series.last().map(|s| s.close).unwrap_or_default();
        Ok(Signal { kind: self.kind, price })
    }
}

/// Fixed candle history; latest prices replayed from a script, then the
/// last one repeated.
pub struct ScriptedMarket {
    series: PriceSeries,
    prices: Mutex<VecDeque<f64>>,
    last: Mutex<f64>,
}

impl ScriptedMarket {
    pub fn new(closes: &[f64], prices: &[f64]) -> Self {
        Self {
            series: series(closes),
            prices: Mutex::new(prices.iter().copied().collect()),
            last: Mutex::new(closes.last().copied().unwrap_or(0.0)),
        }
    }
}

#[async_trait]
impl MarketDataProvider for ScriptedMarket {
    async fn series(&self, _: &str, _: u64, _: usize) -> Result<PriceSeries> {
        Ok(self.series.clone())
    }

    async fn latest_price(&self, _: &str) -> Result<f64> {
        let mut last = self.last.lock().unwrap();
        if let Some(price) = self.prices.lock().unwrap().pop_front() {
            *last = price;
        }
        Ok(*last)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Fill {
    At(f64),
    Reject,
    Timeout,
}

/// Fills orders per script and keeps every order it was asked to place.
pub struct ScriptedExecutor {
    script: Mutex<VecDeque<Fill>>,
    default_price: f64,
    pub placed: Mutex<Vec<Order>>,
}

impl ScriptedExecutor {
    pub fn new(default_price: f64, script: &[Fill]) -> Self {
        Self {
            script: Mutex::new(script.iter().copied().collect()),
            default_price,
            placed: Mutex::new(Vec::new()),
        }
    }

    pub fn placed(&self) -> Vec<Order> {
        self.placed.lock().unwrap().clone()
    }
}

#[async_trait]
impl OrderExecutionProvider for ScriptedExecutor {
    async fn place_market_order(&self, order: &Order) -> Result<OrderConfirmation> {
        self.placed.lock().unwrap().push(order.clone());
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Fill::At(self.default_price));
        match next {
            Fill::At(price) => Ok(OrderConfirmation {
                order_id: order.id.clone(),
                symbol: order.symbol.clone(),
                side: order.side,
                filled_price: price,
                filled_quantity: order.quantity,
                timestamp: Utc::now(),
            }),
            Fill::Reject => Err(Error::OrderRejected {
                symbol: order.symbol.clone(),
                side: order.side,
                quantity: order.quantity,
                reason: RejectionReason::InsufficientBalance,
            }),
            Fill::Timeout => Err(Error::OrderTimeout {
                symbol: order.symbol.clone(),
                side: order.side,
                quantity: order.quantity,
            }),
        }
    }
}

/// Candle fetch takes `delay`; prices come from the wrapped market.
pub struct SlowSeries {
    pub inner: ScriptedMarket,
    pub delay: Duration,
}

#[async_trait]
impl MarketDataProvider for SlowSeries {
    async fn series(&self, symbol: &str, interval_secs: u64, lookback: usize) -> Result<PriceSeries> {
        tokio::time::sleep(self.delay).await;
        self.inner.series(symbol, interval_secs, lookback).await
    }

    async fn latest_price(&self, symbol: &str) -> Result<f64> {
        self.inner.latest_price(symbol).await
    }
}

/// Market data endpoint that is always down.
pub struct UnreachableMarket;

#[async_trait]
impl MarketDataProvider for UnreachableMarket {
    async fn series(&self, _: &str, _: u64, _: usize) -> Result<PriceSeries> {
        Err(Error::DataUnavailable("connection refused".into()))
    }

    async fn latest_price(&self, _: &str) -> Result<f64> {
        Err(Error::DataUnavailable("connection refused".into()))
    }
}

pub struct FailingLedger;

#[async_trait]
impl TradeLedger for FailingLedger {
    async fn append(&self, _: &TradeRecord) -> Result<()> {
        Err(Error::Other("disk full".into()))
    }

    async fn read_all(&self) -> Result<Vec<TradeRecord>> {
        Ok(Vec::new())
    }
}

pub struct FixedBalance(pub f64);

#[async_trait]
impl AccountProvider for FixedBalance {
    async fn balance(&self, _: &str) -> Result<f64> {
        Ok(self.0)
    }
}

pub struct Harness {
    pub orchestrator: TradeOrchestrator,
    pub executor: Arc<ScriptedExecutor>,
    pub ledger: Arc<dyn TradeLedger>,
    pub market: Arc<dyn MarketDataProvider>,
    pub events: mpsc::Receiver<TradeEvent>,
    pub events_tx: mpsc::Sender<TradeEvent>,
    pub evaluations: Arc<AtomicUsize>,
}

pub struct HarnessBuilder {
    strategy: Box<dyn Strategy>,
    evaluations: Arc<AtomicUsize>,
    market: Arc<dyn MarketDataProvider>,
    executor: Arc<ScriptedExecutor>,
    ledger: Arc<dyn TradeLedger>,
    market_config: MarketConfig,
}

impl HarnessBuilder {
    pub fn new(kind: SignalKind) -> Self {
        let strategy = FixedStrategy::new(kind);
        Self {
            evaluations: strategy.evaluations.clone(),
            strategy: Box::new(strategy),
            market: Arc::new(ScriptedMarket::new(&[2000.0], &[])),
            executor: Arc::new(ScriptedExecutor::new(2000.0, &[])),
            ledger: Arc::new(MemoryLedger::new()),
            market_config: MarketConfig::default(),
        }
    }

    pub fn strategy(mut self, strategy: Box<dyn Strategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn market(mut self, market: impl MarketDataProvider + 'static) -> Self {
        self.market = Arc::new(market);
        self
    }

    pub fn prices(self, prices: &[f64]) -> Self {
        self.market(ScriptedMarket::new(&[2000.0], prices))
    }

    pub fn fills(mut self, script: &[Fill]) -> Self {
        self.executor = Arc::new(ScriptedExecutor::new(2000.0, script));
        self
    }

    pub fn ledger(mut self, ledger: Arc<dyn TradeLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn allow_short(mut self) -> Self {
        self.market_config.allow_short = true;
        self
    }

    pub fn build(self) -> Harness {
        let (events_tx, events) = mpsc::channel(64);
        let orchestrator = TradeOrchestrator::new(
            self.market_config,
            self.strategy,
            PositionMonitor::new(RiskConfig::default()),
            Collaborators {
                market: self.market.clone(),
                orders: self.executor.clone(),
                ledger: self.ledger.clone(),
            },
            events_tx.clone(),
        );
        Harness {
            orchestrator,
            executor: self.executor,
            ledger: self.ledger,
            market: self.market,
            events,
            events_tx,
            evaluations: self.evaluations,
        }
    }
}

/// Next event, failing the test if none arrives within a simulated day.
pub async fn next_event(events: &mut mpsc::Receiver<TradeEvent>) -> TradeEvent {
    tokio::time::timeout(Duration::from_secs(86_400), events.recv())
        .await
        .expect("no event within a day")
        .expect("event channel closed")
}
