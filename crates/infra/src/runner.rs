use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::engine::{AlertEngine, EngineError, TickReport};
use crate::reconcile::InboundEvent;

/// Handle to feed events into, and stop, a running engine loop.
#[derive(Debug)]
pub struct EngineHandle {
    events: mpsc::Sender<InboundEvent>,
    shutdown: watch::Sender<bool>,
    join: Option<JoinHandle<()>>,
}

impl EngineHandle {
    /// Queue an event, waiting for buffer space.
    pub async fn submit(&self, event: InboundEvent) -> Result<(), EngineError> {
        self.events
            .send(event)
            .await
            .map_err(|_| EngineError::ShuttingDown)
    }

    /// Queue an event without waiting; a full buffer is reported to the caller.
    pub fn try_submit(&self, event: InboundEvent) -> Result<(), EngineError> {
        self.events.try_send(event).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => EngineError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => EngineError::ShuttingDown,
        })
    }

    /// Stop starting tick work, let shop cycles already running and queued
    /// events finish, then wait for the loop to exit. Shops of a tick that are
    /// still waiting for a concurrency permit are released unprocessed.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(join) = self.join.take() {
            if let Err(err) = join.await {
                error!(error = %err, "engine loop terminated abnormally");
            }
        }
    }
}

/// Drives an [`AlertEngine`] from a fixed tick and an inbound event queue.
#[derive(Debug, Clone)]
pub struct EngineRunner {
    pub name: &'static str,
    /// Cap on the failure backoff delay.
    pub max_backoff: Duration,
}

impl Default for EngineRunner {
    fn default() -> Self {
        Self {
            name: "stockpulse-engine",
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl EngineRunner {
    /// Spawn the loop on the current tokio runtime. The first tick runs
    /// immediately.
    pub fn spawn(&self, engine: Arc<AlertEngine>) -> EngineHandle {
        let (events_tx, events_rx) = mpsc::channel(engine.config().event_buffer);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runner = self.clone();
        let join = tokio::spawn(async move { runner.run(engine, events_rx, shutdown_rx).await });

        EngineHandle {
            events: events_tx,
            shutdown: shutdown_tx,
            join: Some(join),
        }
    }

    async fn run(
        self,
        engine: Arc<AlertEngine>,
        mut events: mpsc::Receiver<InboundEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let name = self.name;
        let cfg = engine.config().clone();
        info!(runner = name, tick = ?cfg.tick_interval, "engine loop started");

        let mut interval = tokio::time::interval(cfg.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut ticks: JoinSet<Result<TickReport, EngineError>> = JoinSet::new();
        let mut handlers: JoinSet<()> = JoinSet::new();
        let mut failures: u32 = 0;
        let mut retry_at: Option<Instant> = None;

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }

                Some(event) = events.recv(), if handlers.len() < cfg.max_concurrent_events => {
                    handlers.spawn(handle_event(Arc::clone(&engine), event, name));
                }

                Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                    if let Err(err) = joined {
                        error!(runner = name, error = %err, "event task aborted");
                    }
                }

                Some(joined) = ticks.join_next(), if !ticks.is_empty() => {
                    match joined {
                        Ok(Ok(report)) => {
                            failures = 0;
                            debug!(
                                runner = name,
                                shops = report.shops.len(),
                                skipped = report.skipped_busy.len(),
                                "tick finished"
                            );
                        }
                        Ok(Err(err)) => {
                            failures += 1;
                            let delay =
                                backoff(cfg.failure_backoff, failures).min(self.max_backoff);
                            warn!(
                                runner = name,
                                error = %err,
                                attempt = failures,
                                retry_in = ?delay,
                                "tick failed"
                            );
                            retry_at = Some(Instant::now() + delay);
                        }
                        Err(err) => error!(runner = name, error = %err, "tick task aborted"),
                    }
                }

                _ = sleep_until_retry(retry_at), if retry_at.is_some() => {
                    retry_at = None;
                    spawn_tick(&mut ticks, &engine, &shutdown);
                }

                _ = interval.tick() => {
                    if retry_at.is_none() {
                        spawn_tick(&mut ticks, &engine, &shutdown);
                    }
                }
            }
        }

        info!(
            runner = name,
            ticks = ticks.len(),
            events = handlers.len(),
            "shutdown requested, draining"
        );
        while let Some(joined) = ticks.join_next().await {
            match joined {
                Ok(Ok(report)) if !report.cancelled.is_empty() => {
                    info!(
                        runner = name,
                        cancelled = report.cancelled.len(),
                        "queued shops released"
                    );
                }
                Ok(_) => {}
                Err(err) => {
                    error!(runner = name, error = %err, "tick task aborted during shutdown");
                }
            }
        }

        events.close();
        while let Ok(event) = events.try_recv() {
            handlers.spawn(handle_event(Arc::clone(&engine), event, name));
        }
        while let Some(joined) = handlers.join_next().await {
            if let Err(err) = joined {
                error!(runner = name, error = %err, "event task aborted during shutdown");
            }
        }
        info!(runner = name, "engine loop stopped");
    }
}

async fn handle_event(engine: Arc<AlertEngine>, event: InboundEvent, name: &'static str) {
    match engine.handle_event(&event, Utc::now()).await {
        Ok(report) => debug!(
            runner = name,
            shop = %event.shop_id,
            alerts = report.alerts.len(),
            errors = report.errors.len(),
            "event handled"
        ),
        Err(err) => warn!(runner = name, shop = %event.shop_id, error = %err, "event dropped"),
    }
}

fn spawn_tick(
    ticks: &mut JoinSet<Result<TickReport, EngineError>>,
    engine: &Arc<AlertEngine>,
    shutdown: &watch::Receiver<bool>,
) {
    let engine = Arc::clone(engine);
    let stop = shutdown.clone();
    ticks.spawn(async move { engine.run_tick_until(Utc::now(), stop).await });
}

async fn sleep_until_retry(retry_at: Option<Instant>) {
    tokio::time::sleep_until(retry_at.unwrap_or_else(Instant::now)).await;
}

fn backoff(base: Duration, attempt: u32) -> Duration {
    // base * 2^(attempt-1)
    let pow = 1u32 << attempt.saturating_sub(1).min(10);
    base.saturating_mul(pow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff(base, 1), Duration::from_millis(100));
        assert_eq!(backoff(base, 2), Duration::from_millis(200));
        assert_eq!(backoff(base, 4), Duration::from_millis(800));
        assert_eq!(backoff(base, 50), Duration::from_millis(100 * 1024));
    }
}
