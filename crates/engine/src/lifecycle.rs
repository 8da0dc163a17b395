use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use common::{EngineState, Error, ExecutionEvent, MarketEvent, OrderRequest, Result, StopFlag};

use crate::guard::ExecutionGuard;
use crate::pipeline::SymbolPipeline;

const FEED_CAPACITY: usize = 1024;

/// Cloneable handle for whoever feeds market data and controls shutdown.
#[derive(Clone)]
pub struct EngineHandle {
    feeds: HashMap<String, mpsc::Sender<MarketEvent>>,
    state: Arc<RwLock<EngineState>>,
    stop: StopFlag,
}

impl EngineHandle {
    /// Route an event to its symbol's task.
    pub async fn publish(&self, event: MarketEvent) -> Result<()> {
        let feed = self
            .feeds
            .get(&event.symbol)
            .ok_or_else(|| Error::UnknownSymbol(event.symbol.clone()))?;
        feed.send(event)
            .await
            .map_err(|e| Error::Exchange(format!("feed for {} closed", e.0.symbol)))
    }

    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }

    /// Raise the stop flag. Symbol tasks finish the event in hand and exit;
    /// the guard refuses anything submitted afterwards.
    pub fn stop(&self) {
        info!("Stop requested");
        self.stop.raise();
    }
}

/// Runs one task per symbol. Each task exclusively owns its pipeline, gets
/// every proposed order admitted by the shared guard before committing it to
/// the position, and pushes admitted orders onto the submission channel.
pub struct Engine {
    tasks: Vec<(SymbolPipeline, mpsc::Receiver<MarketEvent>)>,
    guard: Arc<ExecutionGuard>,
    order_tx: mpsc::Sender<OrderRequest>,
    event_tx: mpsc::Sender<ExecutionEvent>,
    state: Arc<RwLock<EngineState>>,
    stop: StopFlag,
}

impl Engine {
    pub fn new(
        pipelines: Vec<SymbolPipeline>,
        guard: Arc<ExecutionGuard>,
        order_tx: mpsc::Sender<OrderRequest>,
        event_tx: mpsc::Sender<ExecutionEvent>,
        stop: StopFlag,
    ) -> (Self, EngineHandle) {
        let state = Arc::new(RwLock::new(EngineState::Stopped));
        let mut feeds = HashMap::new();
        let mut tasks = Vec::with_capacity(pipelines.len());
        for pipeline in pipelines {
            let (tx, rx) = mpsc::channel(FEED_CAPACITY);
            feeds.insert(pipeline.symbol().to_string(), tx);
            tasks.push((pipeline, rx));
        }

        let handle = EngineHandle {
            feeds,
            state: state.clone(),
            stop: stop.clone(),
        };
        let engine = Engine {
            tasks,
            guard,
            order_tx,
            event_tx,
            state,
            stop,
        };
        (engine, handle)
    }

    /// Run until every symbol task has exited. Call from `tokio::spawn`.
    pub async fn run(self) {
        let symbols: Vec<&str> = self.tasks.iter().map(|(p, _)| p.symbol()).collect();
        info!(symbols = ?symbols, "Engine starting symbol tasks");
        *self.state.write().await = EngineState::Running;

        let mut set = JoinSet::new();
        for (pipeline, feed) in self.tasks {
            set.spawn(symbol_task(
                pipeline,
                feed,
                self.guard.clone(),
                self.order_tx.clone(),
                self.event_tx.clone(),
                self.stop.clone(),
            ));
        }
        drop(self.order_tx);
        drop(self.event_tx);

        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Symbol task ended abnormally");
            }
        }

        *self.state.write().await = EngineState::Stopped;
        info!("Engine stopped — all symbol tasks finished");
    }
}

async fn symbol_task(
    mut pipeline: SymbolPipeline,
    mut feed: mpsc::Receiver<MarketEvent>,
    guard: Arc<ExecutionGuard>,
    order_tx: mpsc::Sender<OrderRequest>,
    event_tx: mpsc::Sender<ExecutionEvent>,
    stop: StopFlag,
) {
    let symbol = pipeline.symbol().to_string();
    info!(symbol = %symbol, "Symbol task running");

    while !stop.is_raised() {
        let Some(event) = feed.recv().await else {
            break;
        };

        let orders = match event.closed_bar() {
            Some(bar) => pipeline.on_bar(&bar).orders,
            None => pipeline.on_tick(event.price, event.timestamp),
        };

        // A flip's entry only goes out if its close was admitted.
        for order in orders {
            let admitted = match guard.submit_async(&order).await {
                Ok(admitted) => admitted,
                Err(e) => {
                    if e.is_transient() {
                        warn!(
                            symbol = %symbol,
                            side = %order.side,
                            reason = %order.reason,
                            error = %e,
                            "Order rejected by guard — position unchanged"
                        );
                    } else {
                        error!(
                            symbol = %symbol,
                            side = %order.side,
                            reason = %order.reason,
                            error = %e,
                            "Order refused — position unchanged"
                        );
                    }
                    let _ = event_tx
                        .send(ExecutionEvent::OrderRejected {
                            order,
                            reason: e.to_string(),
                        })
                        .await;
                    break;
                }
            };

            pipeline.confirm(&order);
            if order_tx.send(admitted).await.is_err() {
                warn!(symbol = %symbol, "Order channel closed — symbol task exiting");
                return;
            }
        }
    }

    info!(symbol = %symbol, position = %pipeline.side(), "Symbol task finished");
}
