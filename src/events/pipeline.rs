//! Telemetry pipeline lifecycle: `Stopped → Running → Draining → Stopped`.
//!
//! A pipeline runs once. After `shutdown` the channel is closed, later
//! emits count as drops, and `start` reports an invalid state.

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::config::TelemetryConfig;
use super::drain::{DrainStats, EventDrain};
use super::emitter::{EventEmitter, EventReceiver};
use super::sink::TelemetrySink;
use super::types::UsageEvent;
use crate::error::TelemetryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Stopped,
    Running,
    Draining,
}

/// Health snapshot of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PipelineStats {
    pub state: PipelineState,
    pub enabled: bool,
    /// Accepted into the buffer
    pub emitted: u64,
    /// Dropped at emit time (buffer full or pipeline stopped)
    pub dropped: u64,
    /// Handed to the sink successfully
    pub delivered: u64,
    pub failed_batches: u64,
    /// Abandoned by a timed-out shutdown
    pub lost: u64,
    /// Waiting in the buffer
    pub pending: usize,
    pub drop_rate: f64,
}

pub struct TelemetryPipeline {
    config: TelemetryConfig,
    emitter: Arc<EventEmitter>,
    receiver: Mutex<Option<EventReceiver>>,
    state: Mutex<PipelineState>,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
    drain_stats: Mutex<Option<Arc<DrainStats>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl TelemetryPipeline {
    /// Validate `config` and set up the channel. Nothing runs until
    /// [`start`](Self::start).
    pub fn new(config: TelemetryConfig) -> Result<Self, TelemetryError> {
        config.validate()?;
        let (emitter, receiver) = if config.enabled {
            let (emitter, receiver) = EventEmitter::new(config.buffer_size);
            (emitter, Some(receiver))
        } else {
            (EventEmitter::disabled(), None)
        };
        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            config,
            emitter: Arc::new(emitter),
            receiver: Mutex::new(receiver),
            state: Mutex::new(PipelineState::Stopped),
            shutdown_tx,
            task: Mutex::new(None),
            drain_stats: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    pub fn state(&self) -> PipelineState {
        *lock(&self.state)
    }

    /// Shared handle for emitting from other components.
    pub fn emitter(&self) -> Arc<EventEmitter> {
        Arc::clone(&self.emitter)
    }

    #[inline]
    pub fn emit(&self, event: UsageEvent) {
        self.emitter.emit(event);
    }

    /// Build the sink and spawn the drain task. A disabled pipeline stays
    /// `Stopped` and returns `Ok`.
    pub async fn start(&self) -> Result<(), TelemetryError> {
        if !self.config.enabled {
            return Ok(());
        }
        if self.state() != PipelineState::Stopped {
            return Err(TelemetryError::InvalidState("already running".to_string()));
        }
        let Some(receiver) = lock(&self.receiver).take() else {
            return Err(TelemetryError::InvalidState(
                "stopped and cannot be restarted".to_string(),
            ));
        };

        let sink = match TelemetrySink::from_config(&self.config).await {
            Ok(sink) => sink,
            Err(e) => {
                *lock(&self.receiver) = Some(receiver);
                return Err(e);
            }
        };
        let sink_name = sink.name();

        let drain = EventDrain::new(
            receiver,
            sink,
            self.config.batch_size,
            self.config.flush_interval_duration(),
            self.config.drain_timeout_duration(),
        );
        *lock(&self.drain_stats) = Some(drain.stats());
        let handle = tokio::spawn(drain.run(self.shutdown_tx.subscribe()));
        *lock(&self.task) = Some(handle);
        *lock(&self.state) = PipelineState::Running;

        info!(sink = sink_name, "Telemetry pipeline started");
        Ok(())
    }

    /// Signal the drain task, wait for its final flush and stop. Safe to
    /// call more than once.
    pub async fn shutdown(&self) {
        {
            let mut state = lock(&self.state);
            if *state != PipelineState::Running {
                return;
            }
            *state = PipelineState::Draining;
        }
        self.shutdown_tx.send_replace(true);

        let handle = lock(&self.task).take();
        if let Some(mut handle) = handle {
            // The drain bounds its own final flush; the margin covers
            // scheduling and sink teardown.
            let wait = self.config.drain_timeout_duration() + Duration::from_secs(1);
            match tokio::time::timeout(wait, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Telemetry drain task failed"),
                Err(_) => {
                    handle.abort();
                    warn!("Telemetry drain task did not stop in time; aborted");
                }
            }
        }

        *lock(&self.state) = PipelineState::Stopped;
        let stats = self.stats();
        info!(
            delivered = stats.delivered,
            dropped = stats.dropped,
            lost = stats.lost,
            "Telemetry pipeline stopped"
        );
    }

    pub fn stats(&self) -> PipelineStats {
        let emitter = self.emitter.stats();
        let drain = lock(&self.drain_stats).clone();
        PipelineStats {
            state: self.state(),
            enabled: self.config.enabled,
            emitted: emitter.emitted,
            dropped: emitter.dropped,
            delivered: drain.as_ref().map_or(0, |d| d.delivered()),
            failed_batches: drain.as_ref().map_or(0, |d| d.failed_batches()),
            lost: drain.as_ref().map_or(0, |d| d.lost()),
            pending: self.emitter.pending(),
            drop_rate: emitter.drop_rate(),
        }
    }
}
