use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info};

use common::{ExecutionEvent, ExecutionSink, OrderRequest};

/// Drains the shared order channel and hands each guard-admitted order to
/// the sink.
///
/// This is the ONLY component that calls `ExecutionSink::submit_order`.
pub struct OrderExecutor {
    order_rx: mpsc::Receiver<OrderRequest>,
    event_tx: mpsc::Sender<ExecutionEvent>,
    sink: Arc<dyn ExecutionSink>,
}

impl OrderExecutor {
    pub fn new(
        order_rx: mpsc::Receiver<OrderRequest>,
        event_tx: mpsc::Sender<ExecutionEvent>,
        sink: Arc<dyn ExecutionSink>,
    ) -> Self {
        Self {
            order_rx,
            event_tx,
            sink,
        }
    }

    /// Run until the order channel closes. Call from `tokio::spawn`.
    pub async fn run(mut self) {
        info!("OrderExecutor running");
        while let Some(order) = self.order_rx.recv().await {
            let event = self.execute(order).await;
            let _ = self.event_tx.send(event).await;
        }
        info!("OrderExecutor: order channel closed");
    }

    async fn execute(&self, admitted: OrderRequest) -> ExecutionEvent {
        info!(
            symbol = %admitted.symbol,
            side = %admitted.side,
            price = admitted.price,
            size = admitted.size,
            reason = %admitted.reason,
            "Executing order"
        );

        match self.sink.submit_order(&admitted).await {
            Ok(fill) => {
                info!(
                    symbol = %fill.symbol,
                    order_id = %fill.order_id,
                    price = fill.fill_price,
                    size = fill.size,
                    "Order filled"
                );
                ExecutionEvent::OrderFilled(fill)
            }
            Err(e) => {
                error!(symbol = %admitted.symbol, error = %e, "Order submission failed");
                ExecutionEvent::OrderFailed {
                    order: admitted,
                    error: e.to_string(),
                }
            }
        }
    }
}
