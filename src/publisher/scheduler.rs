//! Broadcasting
//!
//! `Broadcaster` runs one fetch-format-deliver cycle; `BroadcastScheduler`
//! repeats it on a fixed interval until shutdown.

use futures_util::future::join_all;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use super::{DestinationId, Destinations, MessageSink};
use crate::error::Result;
use crate::format::format_snapshot;
use crate::metrics::Metrics;
use crate::shutdown::Shutdown;
use crate::store::PriceStore;
use crate::supervisor::panic_message;

/// Outcome of one broadcast cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: Vec<DestinationId>,
    pub failed: Vec<(DestinationId, String)>,
}

impl DeliveryReport {
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Renders the store and delivers it to every destination
pub struct Broadcaster {
    store: Arc<PriceStore>,
    destinations: Arc<Destinations>,
    sink: Arc<dyn MessageSink>,
    metrics: Arc<Metrics>,
    delivery_timeout: Duration,
}

impl Broadcaster {
    pub fn new(
        store: Arc<PriceStore>,
        destinations: Arc<Destinations>,
        sink: Arc<dyn MessageSink>,
        metrics: Arc<Metrics>,
        delivery_timeout: Duration,
    ) -> Self {
        Self {
            store,
            destinations,
            sink,
            metrics,
            delivery_timeout,
        }
    }

    /// Current report text
    pub fn render(&self) -> String {
        format_snapshot(&self.store.snapshot_all())
    }

    /// Run one cycle now.
    ///
    /// The destination list is copied first, so concurrent changes apply
    /// from the next cycle. Each delivery is bounded by the delivery timeout
    /// and a failure never stops the others.
    pub async fn push_now(&self) -> DeliveryReport {
        let text = self.render();
        let targets = self.destinations.list();
        let mut report = DeliveryReport::default();

        if targets.is_empty() {
            debug!("No destinations configured, nothing to push");
            return report;
        }

        let attempts = targets.into_iter().map(|destination| {
            let text = text.as_str();
            async move {
                let outcome = timeout(self.delivery_timeout, self.sink.deliver(&destination, text)).await;
                (destination, outcome)
            }
        });

        for (destination, outcome) in join_all(attempts).await {
            match outcome {
                Ok(Ok(())) => {
                    self.metrics.deliveries.with_label_values(&["ok"]).inc();
                    report.delivered.push(destination);
                }
                Ok(Err(e)) => {
                    self.metrics.deliveries.with_label_values(&["failed"]).inc();
                    warn!(destination = %destination, error = %e, "Delivery failed");
                    report.failed.push((destination, e.to_string()));
                }
                Err(_) => {
                    self.metrics.deliveries.with_label_values(&["timeout"]).inc();
                    warn!(
                        destination = %destination,
                        timeout_ms = self.delivery_timeout.as_millis() as u64,
                        "Delivery timed out"
                    );
                    report.failed.push((destination, "timed out".to_string()));
                }
            }
        }

        report
    }
}

/// Pushes the report on a fixed interval
pub struct BroadcastScheduler {
    broadcaster: Arc<Broadcaster>,
    metrics: Arc<Metrics>,
    interval: Duration,
}

impl BroadcastScheduler {
    pub fn new(broadcaster: Arc<Broadcaster>, metrics: Arc<Metrics>, interval: Duration) -> Self {
        Self {
            broadcaster,
            metrics,
            interval,
        }
    }

    /// Cycle, then sleep, until shutdown
    pub async fn run(&self, shutdown: Shutdown) -> Result<()> {
        info!(interval_secs = self.interval.as_secs(), "Starting broadcast scheduler");

        loop {
            if shutdown.is_triggered() {
                break;
            }

            self.run_cycle().await;

            tokio::select! {
                _ = sleep(self.interval) => {}
                _ = shutdown.wait() => break,
            }
        }

        info!("Broadcast scheduler stopped");
        Ok(())
    }

    /// One cycle; a panic inside it is logged and swallowed
    async fn run_cycle(&self) {
        let cycle = AssertUnwindSafe(self.broadcaster.push_now())
            .catch_unwind()
            .await;

        match cycle {
            Ok(report) => {
                let outcome = if report.is_complete() { "ok" } else { "partial" };
                self.metrics.broadcast_cycles.with_label_values(&[outcome]).inc();
                info!(
                    delivered = report.delivered.len(),
                    failed = report.failed.len(),
                    "Broadcast cycle finished"
                );
            }
            Err(panic) => {
                self.metrics.broadcast_cycles.with_label_values(&["panicked"]).inc();
                error!(panic = %panic_message(panic.as_ref()), "Broadcast cycle panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelayError;
    use crate::publisher::MockMessageSink;
    use crate::shutdown;
    use crate::store::{PricePoint, Symbol};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn store() -> Arc<PriceStore> {
        Arc::new(PriceStore::new(["BTC-USDT", "ETH-USDT"]))
    }

    fn destinations(ids: &[i64]) -> Arc<Destinations> {
        Arc::new(Destinations::new(ids.iter().map(|id| DestinationId::Chat(*id))))
    }

    fn broadcaster(sink: Arc<dyn MessageSink>, ids: &[i64]) -> Arc<Broadcaster> {
        Arc::new(Broadcaster::new(
            store(),
            destinations(ids),
            sink,
            Arc::new(Metrics::new().unwrap()),
            Duration::from_secs(10),
        ))
    }

    /// Records deliveries; fails for one chat
    #[derive(Default)]
    struct RecordingSink {
        delivered: Mutex<Vec<DestinationId>>,
        fail_for: Option<DestinationId>,
        hang_for: Option<DestinationId>,
    }

    #[async_trait]
    impl MessageSink for RecordingSink {
        async fn deliver(&self, destination: &DestinationId, _text: &str) -> Result<()> {
            if self.hang_for.as_ref() == Some(destination) {
                sleep(Duration::from_secs(3600)).await;
            }
            if self.fail_for.as_ref() == Some(destination) {
                return Err(RelayError::Delivery {
                    destination: destination.to_string(),
                    reason: "chat not found".to_string(),
                });
            }
            self.delivered.lock().unwrap().push(destination.clone());
            Ok(())
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }
    }

    impl RecordingSink {
        fn count_for(&self, id: i64) -> usize {
            self.delivered
                .lock()
                .unwrap()
                .iter()
                .filter(|d| **d == DestinationId::Chat(id))
                .count()
        }
    }

    /// Counts calls, then panics
    #[derive(Default)]
    struct PanickingSink {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MessageSink for PanickingSink {
        async fn deliver(&self, _destination: &DestinationId, _text: &str) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            panic!("sink exploded");
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_one_failing_destination_does_not_block_others() {
        let mut sink = MockMessageSink::new();
        sink.expect_deliver()
            .withf(|d, _| *d == DestinationId::Chat(2))
            .times(1)
            .returning(|d, _| {
                Err(RelayError::Delivery {
                    destination: d.to_string(),
                    reason: "bot was blocked".to_string(),
                })
            });
        sink.expect_deliver()
            .withf(|d, text| *d != DestinationId::Chat(2) && text.contains("BTC-USDT"))
            .times(2)
            .returning(|_, _| Ok(()));

        let report = broadcaster(Arc::new(sink), &[1, 2, 3]).push_now().await;

        assert_eq!(report.delivered, vec![DestinationId::Chat(1), DestinationId::Chat(3)]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, DestinationId::Chat(2));
        assert!(report.failed[0].1.contains("bot was blocked"));
    }

    #[tokio::test]
    async fn test_no_destinations_is_a_noop() {
        let mut sink = MockMessageSink::new();
        sink.expect_deliver().never();
        let report = broadcaster(Arc::new(sink), &[]).push_now().await;
        assert_eq!(report.attempted(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_destination_is_timed_out() {
        let sink = Arc::new(RecordingSink {
            hang_for: Some(DestinationId::Chat(2)),
            ..RecordingSink::default()
        });
        let started = tokio::time::Instant::now();
        let report = broadcaster(sink.clone(), &[1, 2, 3]).push_now().await;

        assert!(started.elapsed() < Duration::from_secs(11));
        assert_eq!(report.delivered.len(), 2);
        assert_eq!(report.failed, vec![(DestinationId::Chat(2), "timed out".to_string())]);
    }

    #[tokio::test]
    async fn test_render_shows_current_prices() {
        let store = store();
        store
            .set(
                &Symbol::from("ETH-USDT"),
                PricePoint {
                    last: Some(dec!(3000)),
                    ..PricePoint::unknown()
                },
            )
            .unwrap();
        let broadcaster = Broadcaster::new(
            store,
            destinations(&[]),
            Arc::new(RecordingSink::default()),
            Arc::new(Metrics::new().unwrap()),
            Duration::from_secs(10),
        );
        let text = broadcaster.render();
        assert!(text.contains("3000.00"));
        assert!(text.contains("N/A"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_keeps_cycling_after_failures() {
        let sink = Arc::new(RecordingSink {
            fail_for: Some(DestinationId::Chat(2)),
            ..RecordingSink::default()
        });
        let metrics = Arc::new(Metrics::new().unwrap());
        let scheduler = Arc::new(BroadcastScheduler::new(
            broadcaster(sink.clone(), &[1, 2, 3]),
            Arc::clone(&metrics),
            Duration::from_secs(60),
        ));
        let (trigger, shutdown) = shutdown::channel();
        let handle = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.run(shutdown).await })
        };

        // cycles at 0s, 60s, 120s
        sleep(Duration::from_secs(130)).await;
        trigger.trigger();
        handle.await.unwrap().unwrap();

        assert_eq!(sink.count_for(1), 3);
        assert_eq!(sink.count_for(3), 3);
        assert_eq!(sink.count_for(2), 0);
        assert_eq!(metrics.broadcast_cycles.with_label_values(&["partial"]).get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_survives_panicking_cycle() {
        let sink = Arc::new(PanickingSink::default());
        let scheduler = BroadcastScheduler::new(
            broadcaster(sink.clone(), &[1]),
            Arc::new(Metrics::new().unwrap()),
            Duration::from_secs(60),
        );
        let (trigger, shutdown) = shutdown::channel();

        let run = scheduler.run(shutdown);
        let stop = async {
            sleep(Duration::from_secs(130)).await;
            trigger.trigger();
        };
        let (result, ()) = tokio::join!(run, stop);

        assert!(result.is_ok());
        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_long_interval() {
        let scheduler = BroadcastScheduler::new(
            broadcaster(Arc::new(RecordingSink::default()), &[1]),
            Arc::new(Metrics::new().unwrap()),
            Duration::from_secs(600),
        );
        let (trigger, shutdown) = shutdown::channel();
        let started = tokio::time::Instant::now();

        let run = scheduler.run(shutdown);
        let stop = async {
            sleep(Duration::from_secs(1)).await;
            trigger.trigger();
        };
        let (result, ()) = tokio::join!(run, stop);

        assert!(result.is_ok());
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
