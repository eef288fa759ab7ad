//! 翻译服务驱动
//!
//! 在当前线程上按固定节奏驱动引擎，同时响应宿主发来的命令。
//! 最多一个请求在途；在途期间到期的节奏被忙碌守卫丢弃。

use std::future::Future;
use std::pin::Pin;

use markup5ever_rcdom::Handle;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::translation::client::{TranslatedItem, TranslationClient};
use crate::translation::core::dispatcher::InFlightBatch;
use crate::translation::core::engine::{LanguageChange, TickOutcome, TickStart, TranslationEngine};
use crate::translation::error::{TranslationError, TranslationResult};

type RequestFuture = Pin<Box<dyn Future<Output = TranslationResult<Vec<TranslatedItem>>>>>;

/// 宿主发给服务的命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCommand {
    SwitchLanguage(String),
    Navigated,
    Restore,
    Shutdown,
}

/// 服务句柄，可以在任意位置克隆和发送命令
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    tx: mpsc::UnboundedSender<ServiceCommand>,
}

impl ServiceHandle {
    fn send(&self, command: ServiceCommand) -> TranslationResult<()> {
        self.tx
            .send(command)
            .map_err(|e| TranslationError::TransportError(format!("翻译服务已停止: {:?}", e.0)))
    }

    pub fn switch_language(&self, language: &str) -> TranslationResult<()> {
        self.send(ServiceCommand::SwitchLanguage(language.to_string()))
    }

    pub fn navigated(&self) -> TranslationResult<()> {
        self.send(ServiceCommand::Navigated)
    }

    pub fn restore(&self) -> TranslationResult<()> {
        self.send(ServiceCommand::Restore)
    }

    pub fn shutdown(&self) -> TranslationResult<()> {
        self.send(ServiceCommand::Shutdown)
    }
}

/// 服务运行统计
#[derive(Debug, Clone, Default)]
pub struct ServiceStats {
    pub cadence_ticks: u64,
    pub commands: u64,
    pub batches_completed: u64,
    pub batches_failed: u64,
}

struct InFlight {
    batch: InFlightBatch,
    request: RequestFuture,
}

/// 翻译服务
pub struct TranslationService<C: TranslationClient + 'static> {
    engine: TranslationEngine<C>,
    commands: mpsc::UnboundedReceiver<ServiceCommand>,
    stats: ServiceStats,
}

impl<C: TranslationClient + 'static> TranslationService<C> {
    pub fn new(engine: TranslationEngine<C>) -> (Self, ServiceHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                engine,
                commands: rx,
                stats: ServiceStats::default(),
            },
            ServiceHandle { tx },
        )
    }

    /// 运行直到收到 `Shutdown` 或所有句柄都被丢弃，返回引擎
    ///
    /// 首先执行 `init`。在途请求在停止时被丢弃，结果不会写入缓存。
    pub async fn run(mut self, root: &Handle) -> (TranslationEngine<C>, ServiceStats) {
        let initial = self.engine.init(root).await;
        self.record(&initial);

        let mut cadence = tokio::time::interval(self.engine.config().tick_interval());
        cadence.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // interval 的第一次 tick 立即完成，init 已经协调过一轮
        cadence.tick().await;

        let mut in_flight: Option<InFlight> = None;

        loop {
            tokio::select! {
                result = poll_in_flight(&mut in_flight), if in_flight.is_some() => {
                    if let Some(flight) = in_flight.take() {
                        let outcome = self.engine.complete(root, flight.batch, result);
                        self.record(&outcome);
                    }
                }
                command = self.commands.recv() => {
                    self.stats.commands += 1;
                    match command {
                        Some(ServiceCommand::SwitchLanguage(language)) => {
                            if let LanguageChange::NeedsTick = self.engine.set_language(root, &language) {
                                self.start_tick(root, &mut in_flight);
                            }
                        }
                        Some(ServiceCommand::Navigated) => self.start_tick(root, &mut in_flight),
                        Some(ServiceCommand::Restore) => {
                            self.engine.restore(root);
                        }
                        Some(ServiceCommand::Shutdown) | None => break,
                    }
                }
                _ = cadence.tick() => {
                    self.stats.cadence_ticks += 1;
                    self.start_tick(root, &mut in_flight);
                }
            }
        }

        drop(in_flight);
        tracing::info!(
            "翻译服务停止: {} 次节奏, {} 个命令, {} 个批次完成, {} 个批次失败",
            self.stats.cadence_ticks,
            self.stats.commands,
            self.stats.batches_completed,
            self.stats.batches_failed
        );
        (self.engine, self.stats)
    }

    fn start_tick(&mut self, root: &Handle, in_flight: &mut Option<InFlight>) {
        match self.engine.begin_tick(root) {
            TickStart::InFlight(batch) => {
                let request = Box::pin(self.engine.request(&batch));
                *in_flight = Some(InFlight { batch, request });
            }
            TickStart::Done(outcome) => self.record(&outcome),
        }
    }

    fn record(&mut self, outcome: &TickOutcome) {
        match outcome {
            TickOutcome::Translated { .. } | TickOutcome::Superseded { .. } => {
                self.stats.batches_completed += 1
            }
            TickOutcome::Failed(_) => self.stats.batches_failed += 1,
            _ => {}
        }
    }
}

async fn poll_in_flight(in_flight: &mut Option<InFlight>) -> TranslationResult<Vec<TranslatedItem>> {
    match in_flight {
        Some(flight) => flight.request.as_mut().await,
        None => std::future::pending().await,
    }
}
