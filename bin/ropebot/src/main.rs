use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use backtest::{load_bars, BacktestRunner};
use common::{Bar, Config, ExecutionEvent, MarketEvent, RunMode, StopFlag};
use engine::{Engine, EngineHandle, ExecutionGuard, OrderExecutor, SymbolPipeline};
use paper::PaperClient;
use strategy::TradingFileConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env().context("invalid process environment")?;
    let trading = TradingFileConfig::load(&cfg.config_path)
        .with_context(|| format!("loading {}", cfg.config_path))?;
    info!(
        mode = %cfg.run_mode,
        pairs = trading.pairs.len(),
        timeframe = %trading.strategy.timeframe,
        "ropebot starting"
    );

    // ── Historical bars, one CSV per pair ─────────────────────────────────────
    let mut series = Vec::with_capacity(trading.pairs.len());
    for pair in &trading.pairs {
        let path = Path::new(&cfg.data_dir).join(format!("{}.csv", pair.symbol));
        let bars = load_bars(&path, &pair.symbol)
            .with_context(|| format!("loading bars from {}", path.display()))?;
        series.push(bars);
    }

    match cfg.run_mode {
        RunMode::Backtest => run_backtest(&trading, &series),
        RunMode::Paper => run_paper(&cfg, &trading, series).await,
    }
}

fn run_backtest(trading: &TradingFileConfig, series: &[Vec<Bar>]) -> anyhow::Result<()> {
    for (pair, bars) in trading.pairs.iter().zip(series) {
        let runner = BacktestRunner::from_config(trading, &pair.symbol)?;
        let report = runner.run(bars);
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

async fn run_paper(
    cfg: &Config,
    trading: &TradingFileConfig,
    series: Vec<Vec<Bar>>,
) -> anyhow::Result<()> {
    let stop = StopFlag::new();

    // ── Execution ─────────────────────────────────────────────────────────────
    let paper = Arc::new(PaperClient::new(
        trading.backtest.initial_capital,
        trading.strategy.slippage,
    ));
    let guard = Arc::new(ExecutionGuard::new(
        trading.pairs.iter().cloned(),
        &trading.rate,
        stop.clone(),
    ));

    // ── Channels ──────────────────────────────────────────────────────────────
    let (order_tx, order_rx) = mpsc::channel(128);
    let (event_tx, mut event_rx) = mpsc::channel::<ExecutionEvent>(128);

    let pipelines = trading
        .pairs
        .iter()
        .map(|pair| SymbolPipeline::new(pair, &trading.strategy))
        .collect();
    let (engine, handle) = Engine::new(
        pipelines,
        guard.clone(),
        order_tx,
        event_tx.clone(),
        stop.clone(),
    );
    let executor = OrderExecutor::new(order_rx, event_tx, paper.clone());

    // ── Spawn ─────────────────────────────────────────────────────────────────
    let engine_task = tokio::spawn(engine.run());
    let executor_task = tokio::spawn(executor.run());
    let events_task = tokio::spawn(async move {
        let (mut filled, mut rejected, mut failed) = (0u64, 0u64, 0u64);
        while let Some(event) = event_rx.recv().await {
            match event {
                ExecutionEvent::OrderFilled(_) => filled += 1,
                ExecutionEvent::OrderRejected { .. } => rejected += 1,
                ExecutionEvent::OrderFailed { .. } => failed += 1,
            }
        }
        (filled, rejected, failed)
    });

    let pace = trading.strategy.timeframe.refresh_interval() / cfg.replay_speedup;
    info!(pace_ms = pace.as_millis() as u64, "Paper replay starting");

    let mut feeds = JoinSet::new();
    for bars in series {
        feeds.spawn(replay(bars, handle.clone(), paper.clone(), stop.clone(), pace));
    }
    drop(handle);

    // ── Shutdown ──────────────────────────────────────────────────────────────
    let interrupted = tokio::select! {
        _ = async { while feeds.join_next().await.is_some() {} } => false,
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                warn!(error = %e, "Failed to listen for shutdown signal");
            }
            true
        }
    };
    if interrupted {
        info!("Shutdown signal received — raising stop flag");
        stop.raise();
        while feeds.join_next().await.is_some() {}
    } else {
        info!("Replay finished");
    }

    engine_task.await?;
    executor_task.await?;
    let (filled, rejected, failed) = events_task.await?;

    let stats = guard.stats();
    info!(
        filled,
        rejected,
        failed,
        delayed = stats.delayed,
        balance = paper.balance().await,
        "Paper session complete"
    );
    for pair in &trading.pairs {
        info!(symbol = %pair.symbol, net = paper.net_position(&pair.symbol).await, "Paper holdings");
    }
    Ok(())
}

/// Publish a symbol's bars as a live feed, keeping the paper sink's price
/// current.
async fn replay(
    bars: Vec<Bar>,
    handle: EngineHandle,
    paper: Arc<PaperClient>,
    stop: StopFlag,
    pace: std::time::Duration,
) {
    for bar in bars {
        if stop.is_raised() {
            break;
        }
        paper.update_price(&bar.symbol, bar.close).await;
        if let Err(e) = handle.publish(MarketEvent::from(&bar)).await {
            error!(symbol = %bar.symbol, error = %e, "Replay feed failed");
            break;
        }
        if !pace.is_zero() {
            tokio::time::sleep(pace).await;
        }
    }
}
