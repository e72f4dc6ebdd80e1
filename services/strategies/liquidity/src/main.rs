//! Meridian Liquidity Engine
//!
//! Cross-venue liquidity service: aggregates order book tops across every
//! enabled venue, routes orders through the cheapest combination of books,
//! and scans venue pairs for fee-adjusted arbitrage spreads. Market data
//! arrives through the adapter layer's hub; this binary owns lifecycle,
//! configuration and the periodic status heartbeat.

mod aggregator;
mod config;
mod engine;
mod router;
mod scanner;
#[cfg(test)]
mod testutil;

use anyhow::Context;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::EngineConfig;
use engine::LiquidityEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("🚀 Starting Meridian Liquidity Engine...");

    let config = match std::env::var("MERIDIAN_CONFIG") {
        Ok(path) => {
            info!("📂 Loading configuration from {}", path);
            EngineConfig::from_file(&path)
                .with_context(|| format!("failed to load config from {path}"))?
        }
        Err(_) => EngineConfig::from_env(),
    };
    config.validate().context("invalid configuration")?;

    let engine = LiquidityEngine::build(config).context("failed to build engine")?;
    engine.start().await.context("failed to start engine")?;
    info!("✅ Liquidity engine running");

    let mut status_interval = tokio::time::interval(Duration::from_secs(60));
    status_interval.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("🛑 Shutdown signal received");
                break;
            }
            _ = status_interval.tick() => {
                let stats = engine.hub().stats();
                info!(
                    shards = stats.shards,
                    connections = stats.pool.active,
                    venues = ?stats.venue_status,
                    "📊 hub status"
                );
            }
        }
    }

    engine.shutdown().await;
    info!("👋 Liquidity engine stopped");
    Ok(())
}
