//! Background dispatch loop.
//!
//! Periodically sweeps the work-item population: times out overdue running
//! tasks, releases retrying tasks whose backoff elapsed, re-evaluates the
//! edges gating parked tasks, and promotes startable pending tasks to
//! queued. The sweep also runs on every audit event, so dependency state
//! changes propagate without waiting for the next poll.

use crate::error::{OrchestrationError, Result};
use crate::executor::TaskExecutor;
use crate::resolver::DependencyResolver;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, info, warn};
use warden_core::config::DispatcherConfig;
use warden_core::events::EventBus;
use warden_core::models::TaskStatus;
use warden_core::storage::Store;

/// Counts of what one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Running tasks moved to timeout.
    pub timed_out: usize,
    /// Retrying tasks released back to queued.
    pub released: usize,
    /// Pending tasks promoted to queued.
    pub promoted: usize,
}

/// Background loop driving parked tasks forward.
pub struct Dispatcher {
    store: Arc<dyn Store>,
    executor: Arc<TaskExecutor>,
    resolver: Arc<DependencyResolver>,
    events: EventBus,
    config: DispatcherConfig,
    shutdown_tx: Mutex<Option<watch::Sender<()>>>,
    paused: AtomicBool,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("paused", &self.paused.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Creates a dispatcher; the loop does not run until [`start`](Self::start).
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        executor: Arc<TaskExecutor>,
        resolver: Arc<DependencyResolver>,
        events: EventBus,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            store,
            executor,
            resolver,
            events,
            config,
            shutdown_tx: Mutex::new(None),
            paused: AtomicBool::new(false),
        }
    }

    /// Runs one sweep over all tasks.
    ///
    /// # Errors
    /// Returns the first storage failure; per-item resolution errors are
    /// logged and skipped so one broken item cannot stall the rest.
    pub async fn run_tick_once(&self) -> Result<TickSummary> {
        let mut summary = TickSummary {
            timed_out: self.executor.check_timeouts().await?.len(),
            released: self.executor.release_retries().await?.len(),
            promoted: 0,
        };

        for item in self.store.list_work_items().await? {
            let Some(task) = item.as_task() else { continue };
            if !matches!(task.status, TaskStatus::Pending | TaskStatus::Queued) {
                continue;
            }
            if let Err(e) = self.resolver.check_dependencies_for(&item.id).await {
                warn!(item_id = %item.id, error = %e, "Dependency re-evaluation failed");
                continue;
            }
            if task.status == TaskStatus::Pending {
                match self.executor.try_queue(&item.id).await {
                    Ok(Some(_)) => summary.promoted += 1,
                    Ok(None) => {}
                    Err(e) => warn!(item_id = %item.id, error = %e, "Promotion failed"),
                }
            }
        }

        debug!(
            timed_out = summary.timed_out,
            released = summary.released,
            promoted = summary.promoted,
            "Dispatch tick"
        );
        Ok(summary)
    }

    /// Starts the background loop.
    ///
    /// # Errors
    /// Returns `Validation` if already running.
    ///
    /// # Panics
    /// Panics if the shutdown lock is poisoned.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut guard = self.shutdown_tx.lock().expect("shutdown lock poisoned");
        if guard.is_some() {
            return Err(OrchestrationError::Validation(
                "dispatcher is already running".to_string(),
            ));
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        *guard = Some(shutdown_tx);
        drop(guard);

        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            dispatcher.run_loop(shutdown_rx).await;
        });
        Ok(())
    }

    async fn run_loop(&self, mut shutdown_rx: watch::Receiver<()>) {
        info!("Dispatcher started");
        let mut interval = time::interval(Duration::from_millis(self.config.poll_interval_ms));
        let mut events = self.events.subscribe();
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!("Dispatcher shutdown signal received");
                    break;
                }
                _ = interval.tick() => {
                    self.sweep().await;
                }
                event = events.recv() => {
                    // Lagged subscriptions just mean extra sweeps were
                    // coalesced; a closed bus falls back to polling.
                    if event.is_ok() {
                        self.sweep().await;
                    }
                }
            }
        }
        info!("Dispatcher stopped");
    }

    async fn sweep(&self) {
        if self.paused.load(Ordering::Relaxed) {
            debug!("Dispatcher paused, skipping sweep");
            return;
        }
        if let Err(e) = self.run_tick_once().await {
            warn!(error = %e, "Dispatch sweep failed");
        }
    }

    /// Stops the background loop.
    ///
    /// # Errors
    /// Returns `Validation` if not running.
    ///
    /// # Panics
    /// Panics if the shutdown lock is poisoned.
    pub fn stop(&self) -> Result<()> {
        match self.shutdown_tx.lock().expect("shutdown lock poisoned").take() {
            Some(shutdown_tx) => {
                let _ = shutdown_tx.send(());
                Ok(())
            }
            None => Err(OrchestrationError::Validation("dispatcher is not running".to_string())),
        }
    }

    /// Whether the background loop is running.
    ///
    /// # Panics
    /// Panics if the shutdown lock is poisoned.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shutdown_tx.lock().expect("shutdown lock poisoned").is_some()
    }

    /// Pauses sweeps; the loop keeps ticking but does nothing.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
        info!("Dispatcher paused");
    }

    /// Resumes sweeps.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
        info!("Dispatcher resumed");
    }

    /// Whether sweeps are currently paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }
}
