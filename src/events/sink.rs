//! Telemetry sinks.
//!
//! Each sink receives whole batches from the drain task. A failed delivery
//! is reported to the caller, which logs it and drops the batch.

use chrono::{DateTime, NaiveDate, Utc};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::net::UdpSocket;
use tracing::{debug, info};

use super::config::{
    BroadcastSinkConfig, FileSinkConfig, RotationPolicy, SinkType, TelemetryConfig,
};
use super::types::UsageEvent;
use crate::error::{ConfigError, TelemetryError};

/// Closed set of delivery targets.
#[derive(Debug)]
pub enum TelemetrySink {
    Console(ConsoleSink),
    File(RotatingFileSink),
    Broadcast(BroadcastSink),
}

impl TelemetrySink {
    /// Build the sink selected by `config.sink_type`.
    pub async fn from_config(config: &TelemetryConfig) -> Result<Self, TelemetryError> {
        match config.sink_type {
            SinkType::Console => Ok(TelemetrySink::Console(ConsoleSink::default())),
            SinkType::File => {
                let file = config.file.as_ref().ok_or_else(|| {
                    ConfigError::invalid("telemetry.file", "required for the file sink")
                })?;
                Ok(TelemetrySink::File(RotatingFileSink::new(file.clone())))
            }
            SinkType::Broadcast => {
                let broadcast = config.broadcast.as_ref().ok_or_else(|| {
                    ConfigError::invalid("telemetry.broadcast", "required for the broadcast sink")
                })?;
                Ok(TelemetrySink::Broadcast(
                    BroadcastSink::connect(broadcast.clone()).await?,
                ))
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TelemetrySink::Console(_) => "console",
            TelemetrySink::File(_) => "file",
            TelemetrySink::Broadcast(_) => "broadcast",
        }
    }

    pub async fn deliver(&mut self, batch: &[UsageEvent]) -> Result<(), TelemetryError> {
        if batch.is_empty() {
            return Ok(());
        }
        match self {
            TelemetrySink::Console(sink) => sink.deliver(batch).await,
            TelemetrySink::File(sink) => sink.deliver_at(batch, Utc::now()).await,
            TelemetrySink::Broadcast(sink) => sink.deliver(batch).await,
        }
    }
}

fn json_line(event: &UsageEvent) -> Result<Vec<u8>, TelemetryError> {
    let mut line = serde_json::to_vec(event)?;
    line.push(b'\n');
    Ok(line)
}

/// JSON lines on stdout.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    async fn deliver(&mut self, batch: &[UsageEvent]) -> Result<(), TelemetryError> {
        let mut buf = Vec::new();
        for event in batch {
            buf.extend(json_line(event)?);
        }
        let mut stdout = tokio::io::stdout();
        stdout.write_all(&buf).await?;
        stdout.flush().await?;
        Ok(())
    }
}

/// JSON lines appended to a file, rotated by size or by day.
#[derive(Debug)]
pub struct RotatingFileSink {
    config: FileSinkConfig,
    file: Option<File>,
    active_path: PathBuf,
    written: u64,
    current_day: Option<NaiveDate>,
}

impl RotatingFileSink {
    pub fn new(config: FileSinkConfig) -> Self {
        Self {
            active_path: config.path.clone(),
            config,
            file: None,
            written: 0,
            current_day: None,
        }
    }

    /// Path currently being appended to.
    pub fn active_path(&self) -> &Path {
        &self.active_path
    }

    /// Append a batch as if the clock read `now`.
    pub async fn deliver_at(
        &mut self,
        batch: &[UsageEvent],
        now: DateTime<Utc>,
    ) -> Result<(), TelemetryError> {
        if let RotationPolicy::Daily = self.config.rotation {
            let today = now.date_naive();
            if self.current_day != Some(today) {
                self.roll_daily(today).await?;
            }
        }

        let mut pending: Vec<u8> = Vec::new();
        for event in batch {
            let line = json_line(event)?;
            if let RotationPolicy::Size { max_bytes } = self.config.rotation {
                let size = self.written + pending.len() as u64;
                if size > 0 && size + line.len() as u64 > max_bytes {
                    self.write(&pending).await?;
                    pending.clear();
                    self.roll_numbered().await?;
                }
            }
            pending.extend(line);
        }
        self.write(&pending).await?;
        if let Some(file) = self.file.as_mut() {
            file.flush().await?;
        }
        Ok(())
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), TelemetryError> {
        if bytes.is_empty() {
            return Ok(());
        }
        if self.file.is_none() {
            self.open().await?;
        }
        if let Some(file) = self.file.as_mut() {
            file.write_all(bytes).await?;
            self.written += bytes.len() as u64;
        }
        Ok(())
    }

    async fn open(&mut self) -> Result<(), TelemetryError> {
        if let Some(parent) = self.active_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.active_path)
            .await?;
        self.written = file.metadata().await?.len();
        self.file = Some(file);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TelemetryError> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
        }
        Ok(())
    }

    /// `path` → `path.1` → `path.2` ... keeping `max_files` rotated files.
    async fn roll_numbered(&mut self) -> Result<(), TelemetryError> {
        self.close().await?;
        let base = &self.config.path;
        let max = self.config.max_files;

        let oldest = suffixed(base, &max.to_string());
        if fs::try_exists(&oldest).await? {
            fs::remove_file(&oldest).await?;
        }
        for n in (1..max).rev() {
            let from = suffixed(base, &n.to_string());
            if fs::try_exists(&from).await? {
                fs::rename(&from, suffixed(base, &(n + 1).to_string())).await?;
            }
        }
        if fs::try_exists(base).await? {
            fs::rename(base, suffixed(base, "1")).await?;
        }
        self.written = 0;
        debug!(path = %base.display(), "Rotated telemetry file");
        Ok(())
    }

    /// Switch to `path.YYYY-MM-DD` and prune old dated files.
    async fn roll_daily(&mut self, today: NaiveDate) -> Result<(), TelemetryError> {
        self.close().await?;
        self.current_day = Some(today);
        self.active_path = suffixed(&self.config.path, &today.format("%Y-%m-%d").to_string());
        self.written = 0;
        self.prune_dated(today).await?;
        Ok(())
    }

    async fn prune_dated(&self, today: NaiveDate) -> Result<(), TelemetryError> {
        let base = &self.config.path;
        let (Some(dir), Some(name)) = (base.parent(), base.file_name()) else {
            return Ok(());
        };
        let dir = if dir.as_os_str().is_empty() {
            Path::new(".")
        } else {
            dir
        };
        if !fs::try_exists(dir).await? {
            return Ok(());
        }
        let prefix = format!("{}.", name.to_string_lossy());

        let mut dated = Vec::new();
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let day = file_name
                .strip_prefix(&prefix)
                .and_then(|suffix| NaiveDate::parse_from_str(suffix, "%Y-%m-%d").ok());
            if let Some(day) = day.filter(|d| *d != today) {
                dated.push((day, entry.path()));
            }
        }
        dated.sort();
        let excess = dated.len().saturating_sub(self.config.max_files);
        for (_, path) in dated.into_iter().take(excess) {
            fs::remove_file(&path).await?;
            debug!(path = %path.display(), "Removed expired telemetry file");
        }
        Ok(())
    }
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// UDP datagrams of the form `"<topic> <json>"`.
#[derive(Debug)]
pub struct BroadcastSink {
    socket: UdpSocket,
    topic: String,
}

impl BroadcastSink {
    pub async fn connect(config: BroadcastSinkConfig) -> Result<Self, TelemetryError> {
        let target = tokio::net::lookup_host(&config.endpoint)
            .await?
            .next()
            .ok_or_else(|| {
                ConfigError::invalid(
                    "telemetry.broadcast.endpoint",
                    format!("'{}' did not resolve", config.endpoint),
                )
            })?;
        let bind = if target.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" };
        let socket = UdpSocket::bind(bind).await?;
        socket.connect(target).await?;
        info!(endpoint = %target, topic = %config.topic, "Telemetry broadcast sink ready");
        Ok(Self {
            socket,
            topic: config.topic,
        })
    }

    async fn deliver(&mut self, batch: &[UsageEvent]) -> Result<(), TelemetryError> {
        for event in batch {
            let mut datagram = Vec::with_capacity(self.topic.len() + 256);
            datagram.extend_from_slice(self.topic.as_bytes());
            datagram.push(b' ');
            serde_json::to_writer(&mut datagram, event)?;
            self.socket.send(&datagram).await?;
        }
        Ok(())
    }
}
