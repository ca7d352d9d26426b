//! Liveness heartbeat
//!
//! Periodically calls the messaging service so a dead bot session shows up
//! in the logs long before the next broadcast.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::publisher::MessageSink;
use crate::shutdown::Shutdown;

/// Ping the sink every `interval` until shutdown; failures are only logged
pub async fn run_heartbeat(
    sink: Arc<dyn MessageSink>,
    interval: Duration,
    shutdown: Shutdown,
) -> Result<()> {
    info!(interval_secs = interval.as_secs(), "Starting heartbeat");

    loop {
        match sink.ping().await {
            Ok(()) => debug!("Heartbeat OK"),
            Err(e) => warn!(error = %e, "Heartbeat failed, will continue"),
        }

        tokio::select! {
            _ = sleep(interval) => {}
            _ = shutdown.wait() => break,
        }
    }

    info!("Heartbeat stopped");
    Ok(())
}
