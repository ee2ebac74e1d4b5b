//! Kalshi watch binary.
//!
//! Follows one or more order books and logs top of book on every update.
//!
//! Environment:
//! - `KALSHI_API_KEY_ID`, `KALSHI_PRIVATE_KEY` or `KALSHI_PRIVATE_KEY_PATH`
//! - `KALSHI_ENV` (`prod` or `demo`)
//! - `KALSHI_TICKERS` (comma separated)

use std::env;

use kalshi_sdk::ws::{Channel, FeedEvent, KalshiFeed, SubscriptionHandle, WsConfig};
use kalshi_sdk::{BookView, Credentials, Environment};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,kalshi_sdk=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let environment = Environment::from_env()?;
    let credentials = Credentials::from_env()?;
    let tickers: Vec<String> = env::var("KALSHI_TICKERS")
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|ticker| !ticker.is_empty())
        .map(str::to_string)
        .collect();
    if tickers.is_empty() {
        anyhow::bail!("KALSHI_TICKERS must name at least one market");
    }

    tracing::info!("Starting Kalshi watch");
    tracing::info!("Environment: {}", environment);
    tracing::info!("Markets: {}", tickers.join(","));

    let feed = KalshiFeed::start(WsConfig::for_environment(environment), Some(credentials))?;

    let mut watchers = Vec::with_capacity(tickers.len());
    for ticker in &tickers {
        let handle = feed.subscribe(ticker, Channel::OrderbookDelta).await?;
        watchers.push(tokio::spawn(follow(handle)));
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down Kalshi watch");

    feed.shutdown().await;
    for watcher in watchers {
        let _ = watcher.await;
    }

    let metrics = feed.metrics();
    tracing::info!(
        messages = metrics.messages_received,
        reconnects = metrics.reconnects,
        resyncs = metrics.resyncs,
        dropped = metrics.dropped_events,
        "Feed summary"
    );

    Ok(())
}

/// Logs top of book until the subscription is released.
async fn follow(handle: SubscriptionHandle) {
    while let Some(event) = handle.recv().await {
        match event {
            FeedEvent::Snapshot(book) => log_top(&book, "snapshot"),
            FeedEvent::Delta { book, .. } => log_top(&book, "delta"),
            FeedEvent::Error { code, message } => {
                tracing::error!(ticker = handle.ticker(), code, "Subscription refused: {}", message);
                return;
            }
            _ => {}
        }
    }
}

fn log_top(book: &BookView, source: &str) {
    let bid = book.best_yes_bid().map(|price| price.cents());
    let ask = book.best_yes_ask().map(|price| price.cents());
    tracing::info!(
        ticker = %book.ticker,
        seq = book.sequence,
        source,
        "yes bid {:?} / ask {:?}",
        bid,
        ask
    );
}
