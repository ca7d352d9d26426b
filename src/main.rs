//! OKX Market Relay
//!
//! Streams OKX tickers into the price store and broadcasts the market report
//! to the configured Telegram chats, under supervision, until SIGINT/SIGTERM.

use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use market_relay::heartbeat::run_heartbeat;
use market_relay::publisher::TelegramSink;
use market_relay::rest::RestClient;
use market_relay::shutdown::{self, listen_for_shutdown};
use market_relay::websocket::{FeedSettings, OkxTransport};
use market_relay::{
    server, AppState, BroadcastScheduler, Broadcaster, Config, Destinations, FeedConnector,
    MarketRelay, MessageSink, Metrics, PriceStore, Supervisor,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting OKX Market Relay");

    // Load configuration
    let config = Arc::new(Config::load()?);
    info!(
        symbols = ?config.symbols,
        destinations = config.destinations.len(),
        interval_secs = config.broadcast_interval_secs,
        "Configuration loaded"
    );

    let metrics = Arc::new(Metrics::new()?);
    let store = Arc::new(PriceStore::new(config.symbols.iter().map(String::as_str)));
    let destinations = Arc::new(Destinations::new(config.initial_destinations()?));

    let sink: Arc<dyn MessageSink> = Arc::new(TelegramSink::new(
        &config.telegram_api,
        &config.bot_token,
        config.delivery_timeout(),
    )?);
    let rest = RestClient::new(&config.rest_endpoint, config.delivery_timeout())?;

    let broadcaster = Arc::new(Broadcaster::new(
        Arc::clone(&store),
        Arc::clone(&destinations),
        Arc::clone(&sink),
        Arc::clone(&metrics),
        config.delivery_timeout(),
    ));
    let relay = Arc::new(MarketRelay::new(
        Arc::clone(&store),
        destinations,
        Arc::clone(&broadcaster),
        Some(rest),
    ));

    // Seed the store so the first report is not all N/A
    tokio::spawn({
        let relay = Arc::clone(&relay);
        async move {
            relay.refresh_from_rest().await;
        }
    });

    let feed = Arc::new(FeedConnector::new(
        Box::new(OkxTransport::new(config.ws_endpoint.clone())),
        Arc::clone(&store),
        Arc::clone(&metrics),
        FeedSettings::from(config.as_ref()),
    ));
    let scheduler = Arc::new(BroadcastScheduler::new(
        broadcaster,
        Arc::clone(&metrics),
        config.broadcast_interval(),
    ));

    let (trigger, shutdown) = shutdown::channel();
    tokio::spawn(listen_for_shutdown(trigger.clone()));

    let supervisor = Supervisor::new(
        shutdown.clone(),
        config.restart_delay(),
        config.shutdown_grace(),
        Arc::clone(&metrics),
    );

    let mut tasks = Vec::new();

    tasks.push({
        let shutdown = shutdown.clone();
        supervisor.spawn("feed", move || {
            let feed = Arc::clone(&feed);
            let shutdown = shutdown.clone();
            async move { feed.run(shutdown).await }
        })
    });

    tasks.push({
        let shutdown = shutdown.clone();
        supervisor.spawn("broadcast", move || {
            let scheduler = Arc::clone(&scheduler);
            let shutdown = shutdown.clone();
            async move { scheduler.run(shutdown).await }
        })
    });

    tasks.push({
        let shutdown = shutdown.clone();
        let interval = config.heartbeat_interval();
        supervisor.spawn("heartbeat", move || {
            run_heartbeat(Arc::clone(&sink), interval, shutdown.clone())
        })
    });

    let state = Arc::new(AppState {
        relay,
        metrics: Arc::clone(&metrics),
        config: Arc::clone(&config),
    });
    tasks.push({
        let shutdown = shutdown.clone();
        let addr = config.health_socket_addr()?;
        supervisor.spawn("health-server", move || {
            server::serve(Arc::clone(&state), addr, shutdown.clone())
        })
    });

    info!(tasks = tasks.len(), "All tasks supervised");

    shutdown.wait().await;
    info!("Shutting down");

    for task in tasks {
        let name = task.health.name();
        if let Err(e) = task.handle.await {
            warn!(task = name, error = %e, "Supervisor did not stop cleanly");
        }
    }

    drop(trigger);
    info!("Market relay stopped");
    Ok(())
}
