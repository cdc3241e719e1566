//! CLI command implementations

use anyhow::Result;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use crate::chain::Chain;
use crate::config::Config;
use crate::engine::{EngineEvent, TradingOrchestrator};
use crate::paper;
use crate::position::{exit, Position, TradeStats, WalletRef};

const STATUS_INTERVAL: Duration = Duration::from_secs(30);

/// Run the engine against the paper collaborators
pub async fn start(config: &Config, duration_secs: Option<u64>, json: bool) -> Result<()> {
    warn!("Running in PAPER mode - no real trades will be executed");

    let collaborators = paper::collaborators(config)?;
    let orchestrator = TradingOrchestrator::new(config.clone(), collaborators);
    let mut events = orchestrator.subscribe_events();

    orchestrator.start().await?;

    let mut stats = TradeStats::new();
    let deadline = async {
        match duration_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    let mut status_interval = tokio::time::interval(STATUS_INTERVAL);
    status_interval.tick().await;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => handle_event(&event, &mut stats, json)?,
                Err(RecvError::Lagged(missed)) => warn!("Event reporting fell behind, {} events dropped", missed),
                Err(RecvError::Closed) => break,
            },
            _ = status_interval.tick() => {
                for status in orchestrator.status().await {
                    info!(
                        "{}: {:?}, {}/{} positions, {} ticks, feed {}",
                        status.chain,
                        status.state,
                        status.open_positions,
                        status.max_positions,
                        status.ticks,
                        if status.feed_connected { "connected" } else { "down" }
                    );
                }
            }
            _ = &mut deadline => {
                info!("Session duration reached");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    orchestrator.stop().await;

    // Events emitted during shutdown
    while let Ok(event) = events.try_recv() {
        handle_event(&event, &mut stats, json)?;
    }

    print_summary(&stats, &orchestrator.positions());
    Ok(())
}

fn handle_event(event: &EngineEvent, stats: &mut TradeStats, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
    }

    match event {
        EngineEvent::PositionOpened { position } => {
            info!(
                "OPENED {} {} @ {} ({})",
                position.chain,
                position.token_address,
                position.entry_price,
                position.chain.tx_url(&position.open_tx_ref)
            );
        }
        EngineEvent::PositionClosed {
            position,
            fill_price,
            realized_pnl_percent,
            decision,
            tx_ref,
        } => {
            stats.record_trade(position.chain, *decision, *realized_pnl_percent);
            info!(
                "CLOSED {} {} @ {} [{}] P&L {:+.2}% ({})",
                position.chain,
                position.token_address,
                fill_price,
                decision,
                realized_pnl_percent,
                position.chain.tx_url(tx_ref)
            );
        }
        EngineEvent::SecurityWarning {
            chain,
            token_address,
            reasons,
        } => {
            info!("{} rejected {}: {}", chain, token_address, reasons.join(", "));
        }
        EngineEvent::OpenFailed { .. }
        | EngineEvent::ExitFailed { .. }
        | EngineEvent::PriceFetchFailed { .. }
        | EngineEvent::FeedDisconnected { .. } => {
            warn!("{:?}", event);
        }
        EngineEvent::Error { chain, cause } => {
            error!("Engine error on {:?}: {}", chain, cause);
        }
        _ => debug!("{}", event.name()),
    }
    Ok(())
}

fn print_summary(stats: &TradeStats, open: &[Position]) {
    println!("\n=== SESSION SUMMARY ===\n");
    println!("Started: {}", stats.started);
    println!("Trades: {}", stats.total_trades);
    println!(
        "Wins / Losses: {} / {} (win rate {:.1}%)",
        stats.winning_trades,
        stats.losing_trades,
        stats.win_rate()
    );
    println!("Cumulative P&L: {:+.2}%", stats.cumulative_pnl_percent);
    println!("Average P&L: {:+.2}%", stats.average_pnl_percent());
    if let (Some(best), Some(worst)) = (stats.best_trade_percent, stats.worst_trade_percent) {
        println!("Best / Worst: {:+.2}% / {:+.2}%", best, worst);
    }
    for (reason, count) in &stats.exits_by_reason {
        println!("  {}: {}", reason, count);
    }
    for (chain, count) in &stats.trades_by_chain {
        println!("  {} trades: {}", chain, count);
    }

    println!("\nOpen positions: {}", open.len());
    for position in open {
        println!(
            "  {} {} qty {} @ {} (held {}s)",
            position.chain,
            position.token_address,
            position.quantity,
            position.entry_price,
            position.held_for().num_seconds()
        );
    }
}

/// Show current configuration
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.summary());
    Ok(())
}

/// Run the exit policy once, offline, for a hypothetical position
pub fn evaluate(
    config: &Config,
    chain: Chain,
    entry: f64,
    price: f64,
    highest: Option<f64>,
) -> Result<()> {
    let policy = &config.trading;
    let trailing_pct = policy.trailing_stop_percent;
    let mut position = Position::open(
        chain,
        "offline",
        1.0,
        entry,
        WalletRef::new("offline"),
        "offline",
        policy.trailing_stop_enabled.then_some(trailing_pct),
    )?;

    if policy.trailing_stop_enabled {
        if let Some(highest) = highest {
            exit::trail(&mut position, highest, trailing_pct);
        }
        exit::trail(&mut position, price, trailing_pct);
    }

    let chain_config = config.chain(chain);
    let decision = exit::evaluate(&position, price, chain_config, policy);

    println!("\n=== EXIT EVALUATION ({}) ===\n", chain);
    println!("Entry: {}", entry);
    println!("Price: {} ({:+.2}%)", price, position.pnl_percent(price));
    println!(
        "Take profit: +{}% / Stop loss: -{}%",
        chain_config.min_profit_percent, chain_config.max_loss_percent
    );
    if policy.trailing_stop_enabled {
        println!(
            "Trailing stop: {} (high {}, {}%)",
            position.stop_price, position.highest_price_seen, trailing_pct
        );
    }
    println!("Decision: {}", decision);
    Ok(())
}
