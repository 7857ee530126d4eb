//! Background drain task.
//!
//! Pulls events off the channel, batches them and hands each batch to the
//! sink. A batch is flushed when it reaches `batch_size` or when the flush
//! interval elapses, whichever comes first. On shutdown the channel is
//! closed and everything still buffered is flushed, bounded by the drain
//! timeout.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, info, warn};

use super::emitter::EventReceiver;
use super::sink::TelemetrySink;
use super::types::UsageEvent;

/// Counters shared between the drain task and the pipeline.
#[derive(Debug, Default)]
pub struct DrainStats {
    delivered: AtomicU64,
    failed_batches: AtomicU64,
    /// Events abandoned when the final flush timed out
    lost: AtomicU64,
}

impl DrainStats {
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn failed_batches(&self) -> u64 {
        self.failed_batches.load(Ordering::Relaxed)
    }

    pub fn lost(&self) -> u64 {
        self.lost.load(Ordering::Relaxed)
    }

    /// Count what a timed-out final flush never got to. `handled` covers
    /// both delivered and failed events, which are already accounted for.
    fn record_lost(&self, total: usize, handled: usize) -> u64 {
        let lost = total.saturating_sub(handled) as u64;
        self.lost.fetch_add(lost, Ordering::Relaxed);
        lost
    }
}

pub struct EventDrain {
    receiver: EventReceiver,
    sink: TelemetrySink,
    batch_size: usize,
    flush_interval: Duration,
    drain_timeout: Duration,
    stats: Arc<DrainStats>,
}

impl EventDrain {
    pub fn new(
        receiver: EventReceiver,
        sink: TelemetrySink,
        batch_size: usize,
        flush_interval: Duration,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            receiver,
            sink,
            batch_size: batch_size.max(1),
            flush_interval,
            drain_timeout,
            stats: Arc::new(DrainStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<DrainStats> {
        Arc::clone(&self.stats)
    }

    /// Run until `shutdown` flips to `true` (or its sender is dropped), then
    /// flush what is left.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            sink = self.sink.name(),
            batch_size = self.batch_size,
            flush_interval_ms = self.flush_interval.as_millis() as u64,
            "Telemetry drain started"
        );

        let mut batch: Vec<UsageEvent> = Vec::with_capacity(self.batch_size);
        let mut deadline = Instant::now() + self.flush_interval;

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                event = self.receiver.recv() => {
                    match event {
                        Some(e) => {
                            batch.push(e);
                            if batch.len() >= self.batch_size {
                                self.flush(&mut batch).await;
                                deadline = Instant::now() + self.flush_interval;
                            }
                        }
                        None => break,
                    }
                }
                _ = sleep_until(deadline) => {
                    if !batch.is_empty() {
                        self.flush(&mut batch).await;
                    }
                    deadline = Instant::now() + self.flush_interval;
                }
            }
        }

        self.drain_remaining(batch).await;
    }

    /// Close the channel and flush everything buffered, within the drain
    /// timeout.
    async fn drain_remaining(&mut self, mut batch: Vec<UsageEvent>) {
        self.receiver.close();
        while let Ok(event) = self.receiver.try_recv() {
            batch.push(event);
        }
        let total = batch.len();
        let mut handled = 0usize;

        let drain_timeout = self.drain_timeout;
        let result = timeout(drain_timeout, async {
            let mut remaining = batch;
            while !remaining.is_empty() {
                let rest = remaining.split_off(self.batch_size.min(remaining.len()));
                let chunk = remaining.len();
                self.flush(&mut remaining).await;
                handled += chunk;
                remaining = rest;
            }
        })
        .await;

        if result.is_err() {
            let lost = self.stats.record_lost(total, handled);
            warn!(
                lost = lost,
                timeout_ms = drain_timeout.as_millis() as u64,
                "Telemetry drain timed out; remaining events lost"
            );
        }
        info!(
            flushed = total,
            delivered = self.stats.delivered(),
            "Telemetry drain stopped"
        );
    }

    /// Deliver and clear `batch`. Failures are logged and the batch dropped.
    async fn flush(&mut self, batch: &mut Vec<UsageEvent>) {
        let count = batch.len();
        match self.sink.deliver(batch).await {
            Ok(()) => {
                self.stats
                    .delivered
                    .fetch_add(count as u64, Ordering::Relaxed);
                debug!(count = count, sink = self.sink.name(), "Telemetry batch flushed");
            }
            Err(e) => {
                self.stats.failed_batches.fetch_add(1, Ordering::Relaxed);
                warn!(
                    error = %e,
                    sink = self.sink.name(),
                    events = count,
                    "Telemetry batch delivery failed; batch dropped"
                );
            }
        }
        batch.clear();
    }
}
