//! Usage telemetry.
//!
//! Resolve and access events flow from a non-blocking emitter through a
//! bounded channel to a single drain task, which batches them to one sink.
//!
//! ```text
//! resolve() ── emit() ──► [bounded mpsc] ──► EventDrain ──► TelemetrySink
//!              (try_send,                    (batch_size /   (console, file,
//!               drop newest)                  interval)       broadcast)
//! ```

pub mod config;
pub mod drain;
pub mod emitter;
pub mod pipeline;
pub mod sink;
pub mod types;

pub use config::{BroadcastSinkConfig, FileSinkConfig, RotationPolicy, SinkType, TelemetryConfig};
pub use drain::{DrainStats, EventDrain};
pub use emitter::{EmitterStats, EventEmitter, EventReceiver};
pub use pipeline::{PipelineState, PipelineStats, TelemetryPipeline};
pub use sink::{BroadcastSink, ConsoleSink, RotatingFileSink, TelemetrySink};
pub use types::{truncate_error, Operation, Outcome, UsageEvent, MAX_ERROR_LEN};
