//! Telemetry configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Longest accepted flush interval or drain timeout, in seconds (one day).
pub const MAX_INTERVAL_SECONDS: f64 = 86_400.0;

/// Where batches are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkType {
    #[default]
    Console,
    File,
    Broadcast,
}

/// When the file sink starts a new file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RotationPolicy {
    /// Roll over once the active file reaches `max_bytes`; rotated files
    /// are numbered `.1` (newest) upward.
    Size { max_bytes: u64 },
    /// One file per UTC day, suffixed `.YYYY-MM-DD`.
    Daily,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        RotationPolicy::Size {
            max_bytes: 100 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSinkConfig {
    pub path: PathBuf,
    pub rotation: RotationPolicy,
    /// Rotated files kept besides the active one
    pub max_files: usize,
}

impl Default for FileSinkConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/telemetry.jsonl"),
            rotation: RotationPolicy::default(),
            max_files: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastSinkConfig {
    /// `host:port` receiving the UDP datagrams
    pub endpoint: String,
    /// Prefix of every datagram; subscribers filter on it
    pub topic: String,
}

impl Default for BroadcastSinkConfig {
    fn default() -> Self {
        Self {
            endpoint: "127.0.0.1:5556".to_string(),
            topic: "moniker.usage".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub sink_type: SinkType,

    /// Flush once this many events are buffered
    pub batch_size: usize,
    /// Flush at least this often
    pub flush_interval_seconds: f64,
    /// Channel capacity; events beyond it are dropped
    pub buffer_size: usize,
    /// Upper bound on the final flush during shutdown
    pub drain_timeout_seconds: f64,

    pub file: Option<FileSinkConfig>,
    pub broadcast: Option<BroadcastSinkConfig>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sink_type: SinkType::Console,
            batch_size: 100,
            flush_interval_seconds: 1.0,
            buffer_size: 10_000,
            drain_timeout_seconds: 5.0,
            file: None,
            broadcast: None,
        }
    }
}

impl TelemetryConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn with_file_sink(file: FileSinkConfig) -> Self {
        Self {
            sink_type: SinkType::File,
            file: Some(file),
            ..Default::default()
        }
    }

    pub fn with_broadcast_sink(broadcast: BroadcastSinkConfig) -> Self {
        Self {
            sink_type: SinkType::Broadcast,
            broadcast: Some(broadcast),
            ..Default::default()
        }
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval_seconds = interval.as_secs_f64();
        self
    }

    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout_seconds = timeout.as_secs_f64();
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Flush interval, clamped to [`MAX_INTERVAL_SECONDS`]. An unusable
    /// value falls back to the default.
    pub fn flush_interval_duration(&self) -> Duration {
        seconds_to_duration(self.flush_interval_seconds, Duration::from_secs(1))
    }

    /// Drain timeout, clamped like [`flush_interval_duration`](Self::flush_interval_duration).
    pub fn drain_timeout_duration(&self) -> Duration {
        seconds_to_duration(self.drain_timeout_seconds, Duration::from_secs(5))
    }

    /// Check limits and that the selected sink has its settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::invalid(
                "telemetry.batch_size",
                "must be greater than zero",
            ));
        }
        if self.buffer_size == 0 {
            return Err(ConfigError::invalid(
                "telemetry.buffer_size",
                "must be greater than zero",
            ));
        }
        positive_seconds("telemetry.flush_interval_seconds", self.flush_interval_seconds)?;
        positive_seconds("telemetry.drain_timeout_seconds", self.drain_timeout_seconds)?;

        match self.sink_type {
            SinkType::Console => {}
            SinkType::File => {
                let file = self.file.as_ref().ok_or_else(|| {
                    ConfigError::invalid("telemetry.file", "required for the file sink")
                })?;
                if file.path.as_os_str().is_empty() {
                    return Err(ConfigError::invalid("telemetry.file.path", "must not be empty"));
                }
                if file.max_files == 0 {
                    return Err(ConfigError::invalid(
                        "telemetry.file.max_files",
                        "must be at least 1",
                    ));
                }
                if let RotationPolicy::Size { max_bytes: 0 } = file.rotation {
                    return Err(ConfigError::invalid(
                        "telemetry.file.rotation.max_bytes",
                        "must be greater than zero",
                    ));
                }
            }
            SinkType::Broadcast => {
                let broadcast = self.broadcast.as_ref().ok_or_else(|| {
                    ConfigError::invalid("telemetry.broadcast", "required for the broadcast sink")
                })?;
                match broadcast.endpoint.rsplit_once(':') {
                    Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {}
                    _ => {
                        return Err(ConfigError::invalid(
                            "telemetry.broadcast.endpoint",
                            format!("expected host:port, got '{}'", broadcast.endpoint),
                        ))
                    }
                }
                if broadcast.topic.is_empty() || broadcast.topic.contains(char::is_whitespace) {
                    return Err(ConfigError::invalid(
                        "telemetry.broadcast.topic",
                        "must be non-empty and contain no whitespace",
                    ));
                }
            }
        }
        Ok(())
    }
}

fn positive_seconds(field: &str, value: f64) -> Result<(), ConfigError> {
    if !(value.is_finite() && value > 0.0) {
        return Err(ConfigError::invalid(
            field,
            "must be a positive number of seconds",
        ));
    }
    if value > MAX_INTERVAL_SECONDS {
        return Err(ConfigError::invalid(
            field,
            format!("must be at most {} seconds", MAX_INTERVAL_SECONDS),
        ));
    }
    Ok(())
}

fn seconds_to_duration(value: f64, fallback: Duration) -> Duration {
    Duration::try_from_secs_f64(value.min(MAX_INTERVAL_SECONDS))
        .ok()
        .filter(|d| !d.is_zero())
        .unwrap_or(fallback)
}
