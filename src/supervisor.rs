//! Task supervisor
//!
//! Runs each long-lived task in its own tokio task and restarts it after a
//! fixed delay whenever it returns, fails or panics. Stops only on shutdown.

use std::any::Any;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

use crate::error::Result;
use crate::metrics::Metrics;
use crate::shutdown::Shutdown;

/// Health of one supervised task
#[derive(Debug)]
pub struct TaskHealth {
    /// Task name for logging
    name: &'static str,
    /// Whether an instance is currently running
    running: AtomicBool,
    /// Restarts since the supervisor started it
    restarts: AtomicU32,
}

impl TaskHealth {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            running: AtomicBool::new(false),
            restarts: AtomicU32::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn restarts(&self) -> u32 {
        self.restarts.load(Ordering::Relaxed)
    }
}

/// Handle to a supervised task
pub struct SupervisedTask {
    pub handle: JoinHandle<()>,
    pub health: Arc<TaskHealth>,
}

/// Restarts tasks until shutdown
#[derive(Clone)]
pub struct Supervisor {
    shutdown: Shutdown,
    restart_delay: Duration,
    shutdown_grace: Duration,
    metrics: Arc<Metrics>,
}

impl Supervisor {
    pub fn new(
        shutdown: Shutdown,
        restart_delay: Duration,
        shutdown_grace: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            shutdown,
            restart_delay,
            shutdown_grace,
            metrics,
        }
    }

    /// Spawn `factory()` under supervision.
    ///
    /// A running instance that has not finished `shutdown_grace` after
    /// shutdown is aborted.
    pub fn spawn<F, Fut>(&self, name: &'static str, factory: F) -> SupervisedTask
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let health = Arc::new(TaskHealth::new(name));
        let supervisor = self.clone();
        let task_health = Arc::clone(&health);

        let handle = tokio::spawn(async move {
            supervisor.supervise(factory, task_health).await;
        });

        SupervisedTask { handle, health }
    }

    async fn supervise<F, Fut>(&self, factory: F, health: Arc<TaskHealth>)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let name = health.name;
        info!(task = name, "Supervised task started");

        loop {
            if self.shutdown.is_triggered() {
                break;
            }

            health.running.store(true, Ordering::Relaxed);
            let mut instance = tokio::spawn(factory());

            let outcome = tokio::select! {
                outcome = &mut instance => Some(outcome),
                _ = self.shutdown.wait() => None,
            };

            let Some(outcome) = outcome else {
                if timeout(self.shutdown_grace, &mut instance).await.is_err() {
                    warn!(task = name, "Task did not stop in time, aborting");
                    instance.abort();
                }
                health.running.store(false, Ordering::Relaxed);
                break;
            };
            health.running.store(false, Ordering::Relaxed);

            if self.shutdown.is_triggered() {
                break;
            }

            match outcome {
                Ok(Ok(())) => warn!(task = name, "Task returned unexpectedly"),
                Ok(Err(e)) => error!(task = name, error = %e, "Task failed"),
                Err(join_error) if join_error.is_panic() => {
                    let panic = join_error.into_panic();
                    error!(task = name, panic = %panic_message(panic.as_ref()), "Task panicked");
                }
                Err(join_error) => error!(task = name, error = %join_error, "Task was cancelled"),
            }

            let restarts = health.restarts.fetch_add(1, Ordering::Relaxed) + 1;
            self.metrics.task_restarts.with_label_values(&[name]).inc();
            warn!(
                task = name,
                restarts,
                delay_ms = self.restart_delay.as_millis() as u64,
                "Restarting task after delay"
            );

            tokio::select! {
                _ = sleep(self.restart_delay) => {}
                _ = self.shutdown.wait() => break,
            }
        }

        info!(task = name, "Supervised task stopped");
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelayError;
    use crate::shutdown;
    use std::sync::atomic::AtomicUsize;

    fn supervisor(shutdown: Shutdown) -> Supervisor {
        Supervisor::new(
            shutdown,
            Duration::from_secs(5),
            Duration::from_secs(3),
            Arc::new(Metrics::new().unwrap()),
        )
    }

    async fn count_and_fail(runs: Arc<AtomicUsize>) -> Result<()> {
        runs.fetch_add(1, Ordering::SeqCst);
        Err(RelayError::ConnectionTimeout)
    }

    async fn count_and_panic(runs: Arc<AtomicUsize>) -> Result<()> {
        runs.fetch_add(1, Ordering::SeqCst);
        panic!("boom")
    }

    async fn count_and_return(runs: Arc<AtomicUsize>) -> Result<()> {
        runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn tick_until_shutdown(ticks: Arc<AtomicUsize>, shutdown: Shutdown) -> Result<()> {
        loop {
            tokio::select! {
                _ = sleep(Duration::from_secs(1)) => {
                    ticks.fetch_add(1, Ordering::SeqCst);
                }
                _ = shutdown.wait() => return Ok(()),
            }
        }
    }

    async fn never_finish() -> Result<()> {
        std::future::pending::<()>().await;
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_task_is_restarted_repeatedly() {
        let (trigger, shutdown) = shutdown::channel();
        let runs = Arc::new(AtomicUsize::new(0));

        let task = {
            let runs = Arc::clone(&runs);
            supervisor(shutdown).spawn("always-fails", move || count_and_fail(Arc::clone(&runs)))
        };

        // runs at 0s, 5s, ..., 30s
        sleep(Duration::from_millis(32_500)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 7);
        assert_eq!(task.health.restarts(), 7);
        assert!(!task.handle.is_finished());

        trigger.trigger();
        task.handle.await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_and_returning_tasks_are_restarted() {
        let (trigger, shutdown) = shutdown::channel();
        let supervisor = supervisor(shutdown);
        let panics = Arc::new(AtomicUsize::new(0));
        let returns = Arc::new(AtomicUsize::new(0));

        let panicking = {
            let panics = Arc::clone(&panics);
            supervisor.spawn("panics", move || count_and_panic(Arc::clone(&panics)))
        };
        let returning = {
            let returns = Arc::clone(&returns);
            supervisor.spawn("returns", move || count_and_return(Arc::clone(&returns)))
        };

        sleep(Duration::from_millis(26_000)).await;
        trigger.trigger();
        panicking.handle.await.unwrap();
        returning.handle.await.unwrap();

        assert!(panics.load(Ordering::SeqCst) >= 5);
        assert!(returns.load(Ordering::SeqCst) >= 5);
        assert!(panicking.health.restarts() >= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_task_does_not_affect_healthy_one() {
        let (trigger, shutdown) = shutdown::channel();
        let supervisor = supervisor(shutdown.clone());
        let ticks = Arc::new(AtomicUsize::new(0));

        let failing = {
            let runs = Arc::new(AtomicUsize::new(0));
            supervisor.spawn("fails", move || count_and_fail(Arc::clone(&runs)))
        };
        let healthy = {
            let ticks = Arc::clone(&ticks);
            supervisor.spawn("healthy", move || {
                tick_until_shutdown(Arc::clone(&ticks), shutdown.clone())
            })
        };

        sleep(Duration::from_millis(30_500)).await;
        assert!(failing.health.restarts() >= 5);
        assert_eq!(healthy.health.restarts(), 0);
        assert!(healthy.health.is_running());
        assert_eq!(ticks.load(Ordering::SeqCst), 30);

        trigger.trigger();
        failing.handle.await.unwrap();
        healthy.handle.await.unwrap();
        assert!(!healthy.health.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_task_is_aborted_after_grace() {
        let (trigger, shutdown) = shutdown::channel();
        let task = supervisor(shutdown).spawn("stuck", never_finish);

        sleep(Duration::from_secs(1)).await;
        let stopped_at = tokio::time::Instant::now();
        trigger.trigger();
        task.handle.await.unwrap();

        let waited = stopped_at.elapsed();
        assert!(waited >= Duration::from_secs(3));
        assert!(waited < Duration::from_secs(5));
        assert!(!task.health.is_running());
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
