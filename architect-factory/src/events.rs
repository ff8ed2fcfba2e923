//! Observer stream for factory activity.
//!
//! The engine never renders anything itself. It pushes `LogEvent`s into a
//! caller-supplied `EventSink`; the binary mirrors them to tracing and, with
//! `--events`, streams them as JSON lines; tests record them.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Kind of a log event, used by observers for colouring and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Info,
    Agent,
    Success,
    Error,
    Warning,
    System,
}

impl std::fmt::Display for LogKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogKind::Info => write!(f, "info"),
            LogKind::Agent => write!(f, "agent"),
            LogKind::Success => write!(f, "success"),
            LogKind::Error => write!(f, "error"),
            LogKind::Warning => write!(f, "warning"),
            LogKind::System => write!(f, "system"),
        }
    }
}

/// One observation in the append-only event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub message: String,
    pub kind: LogKind,
    pub timestamp: DateTime<Utc>,
}

impl LogEvent {
    pub fn new(kind: LogKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            timestamp: Utc::now(),
        }
    }
}

/// Receiver side of the observer interface.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: LogEvent);
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn emit(&self, event: LogEvent) {
        (**self).emit(event);
    }
}

/// Cheap handle the engine and agents log through.
#[derive(Clone)]
pub struct Log {
    sink: Arc<dyn EventSink>,
}

impl Log {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    pub fn emit(&self, kind: LogKind, message: impl Into<String>) {
        self.sink.emit(LogEvent::new(kind, message));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(LogKind::Info, message);
    }

    pub fn agent(&self, message: impl Into<String>) {
        self.emit(LogKind::Agent, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.emit(LogKind::Success, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.emit(LogKind::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(LogKind::Error, message);
    }

    pub fn system(&self, message: impl Into<String>) {
        self.emit(LogKind::System, message);
    }
}

/// Renders events through `tracing` at a level derived from their kind.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: LogEvent) {
        match event.kind {
            LogKind::Error => tracing::error!(kind = %event.kind, "{}", event.message),
            LogKind::Warning => tracing::warn!(kind = %event.kind, "{}", event.message),
            _ => tracing::info!(kind = %event.kind, "{}", event.message),
        }
    }
}

/// Forwards events to an unbounded channel. Events sent after the receiver
/// is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<LogEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LogEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: LogEvent) {
        let _ = self.tx.send(event);
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct Recorder {
    events: Mutex<Vec<LogEvent>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events so far, oldest first.
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn of_kind(&self, kind: LogKind) -> Vec<LogEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }
}

impl EventSink for Recorder {
    fn emit(&self, event: LogEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Drain `rx` until every sender is gone, writing one JSON object per line.
///
/// Returns the number of events written.
pub async fn write_json_lines<W: std::io::Write>(
    mut rx: mpsc::UnboundedReceiver<LogEvent>,
    mut out: W,
) -> std::io::Result<u64> {
    let mut written = 0;
    while let Some(event) = rx.recv().await {
        serde_json::to_writer(&mut out, &event)?;
        out.write_all(b"\n")?;
        out.flush()?;
        written += 1;
    }
    Ok(written)
}

/// Duplicates every event into two sinks.
pub struct Tee<A, B> {
    first: A,
    second: B,
}

impl<A, B> Tee<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A: EventSink, B: EventSink> EventSink for Tee<A, B> {
    fn emit(&self, event: LogEvent) {
        self.first.emit(event.clone());
        self.second.emit(event);
    }
}
