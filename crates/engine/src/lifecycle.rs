use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use common::{EngineCommand, EngineState, Position, Result, TradeEvent};

use crate::orchestrator::{CycleReport, MonitorController, TradeOrchestrator};

/// Snapshot of the engine shared with the command surface.
#[derive(Debug, Clone, Default)]
pub struct EngineStatus {
    pub state: EngineState,
    /// A trade cycle (or flatten) is in progress.
    pub cycle_active: bool,
    pub position: Option<Position>,
    pub last_report: Option<String>,
}

/// Cloneable handle passed to other crates (Telegram).
#[derive(Clone)]
pub struct EngineHandle {
    command_tx: mpsc::Sender<EngineCommand>,
    status: Arc<RwLock<EngineStatus>>,
}

impl EngineHandle {
    pub async fn send(&self, cmd: EngineCommand) {
        if self.command_tx.send(cmd).await.is_err() {
            warn!(?cmd, "Engine is gone, command dropped");
        }
    }

    pub async fn status(&self) -> EngineStatus {
        self.status.read().await.clone()
    }

    pub async fn state(&self) -> EngineState {
        self.status.read().await.state
    }
}

/// The main engine: schedules trade cycles and processes commands.
///
/// Commands keep flowing while a cycle runs: Flatten and Stop reach the
/// position monitor through the orchestrator's `MonitorController`.
pub struct Engine {
    orchestrator: TradeOrchestrator,
    controller: MonitorController,
    cycle_interval: Duration,
    state: EngineState,
    status: Arc<RwLock<EngineStatus>>,
    events: mpsc::Sender<TradeEvent>,
    command_rx: mpsc::Receiver<EngineCommand>,
    commands_open: bool,
}

impl Engine {
    pub fn new(
        orchestrator: TradeOrchestrator,
        cycle_interval: Duration,
        events: mpsc::Sender<TradeEvent>,
    ) -> (Self, EngineHandle) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let status = Arc::new(RwLock::new(EngineStatus {
            position: orchestrator.position().cloned(),
            ..EngineStatus::default()
        }));

        let handle = EngineHandle {
            command_tx,
            status: status.clone(),
        };

        let engine = Engine {
            controller: orchestrator.controller(),
            orchestrator,
            cycle_interval,
            state: EngineState::Stopped,
            status,
            events,
            command_rx,
            commands_open: true,
        };

        (engine, handle)
    }

    /// Run the engine until every `EngineHandle` is dropped.
    /// Call from `tokio::spawn`.
    pub async fn run(mut self) {
        info!(
            symbol = self.orchestrator.symbol(),
            strategy = self.orchestrator.strategy_name(),
            "Engine initialized in Stopped state. Waiting for Start command."
        );

        let mut ticker = tokio::time::interval(self.cycle_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => match cmd {
                    Some(EngineCommand::Start) => {
                        if self.state == EngineState::Running {
                            info!("Engine already running");
                            continue;
                        }
                        info!(interval = ?self.cycle_interval, "Engine starting scheduled trade cycles");
                        self.set_state(EngineState::Running).await;
                        ticker.reset();
                        self.run_cycle(false).await;
                    }
                    Some(EngineCommand::Stop) => {
                        if self.state == EngineState::Running {
                            info!("Engine stopping scheduled trade cycles");
                        }
                        self.set_state(EngineState::Stopped).await;
                    }
                    Some(EngineCommand::TriggerTrade) => {
                        info!("Manual trade cycle requested");
                        self.run_cycle(true).await;
                    }
                    Some(EngineCommand::Flatten) => self.flatten().await,
                    None => {
                        warn!("Engine command channel closed, shutting down");
                        break;
                    }
                },
                _ = ticker.tick(), if self.state == EngineState::Running => {
                    self.run_cycle(false).await;
                }
            }
        }
    }

    async fn run_cycle(&mut self, manual: bool) {
        self.controller.reset();
        self.status.write().await.cycle_active = true;

        let result = {
            let cycle = self.orchestrator.run_cycle();
            tokio::pin!(cycle);
            loop {
                tokio::select! {
                    result = &mut cycle => break result,
                    cmd = self.command_rx.recv(), if self.commands_open => match cmd {
                        Some(EngineCommand::Flatten) => {
                            info!("Flatten requested during trade cycle");
                            self.controller.flatten();
                        }
                        Some(EngineCommand::Stop) => {
                            info!("Stop requested during trade cycle, aborting monitoring");
                            self.state = EngineState::Stopped;
                            self.status.write().await.state = EngineState::Stopped;
                            self.controller.abort();
                        }
                        Some(EngineCommand::Start) => {
                            self.state = EngineState::Running;
                            self.status.write().await.state = EngineState::Running;
                        }
                        Some(EngineCommand::TriggerTrade) => {
                            info!("Trade cycle already in progress, trigger ignored");
                        }
                        None => {
                            self.commands_open = false;
                            self.controller.abort();
                        }
                    },
                }
            }
        };

        self.finish(result, manual).await;
    }

    async fn flatten(&mut self) {
        info!("Manual flatten requested");
        self.status.write().await.cycle_active = true;
        let result = self.orchestrator.flatten().await;
        self.finish(result, true).await;
    }

    async fn finish(&mut self, result: Result<CycleReport>, manual: bool) {
        let summary = match result {
            Ok(report) => {
                info!(report = %report, "Trade cycle finished");
                let summary = report.to_string();
                if manual || !matches!(report, CycleReport::NoTrade { .. }) {
                    self.emit(TradeEvent::CycleCompleted {
                        summary: summary.clone(),
                    });
                }
                summary
            }
            Err(e) if e.is_transient() && !manual => {
                warn!(error = %e, "Trade cycle skipped, retrying next interval");
                format!("Cycle skipped: {e}")
            }
            Err(e) => {
                error!(error = %e, "Trade cycle failed");
                self.emit(TradeEvent::CycleFailed {
                    error: e.to_string(),
                });
                format!("Cycle failed: {e}")
            }
        };

        let mut status = self.status.write().await;
        status.cycle_active = false;
        status.position = self.orchestrator.position().cloned();
        status.last_report = Some(summary);
    }

    async fn set_state(&mut self, state: EngineState) {
        self.state = state;
        self.status.write().await.state = state;
    }

    fn emit(&self, event: TradeEvent) {
        if let Err(e) = self.events.try_send(event) {
            warn!(error = %e, "Trade event dropped");
        }
    }
}
