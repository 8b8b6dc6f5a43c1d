use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::models::Transport;

pub type EventPayload = Map<String, Value>;

/// Advisory conditions the router reports without failing the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RouterEvent {
    /// Reference entries that were not valid image data URIs.
    ReferenceImagesDropped {
        transport: Transport,
        model_id: String,
        dropped: usize,
        kept: usize,
    },
    ReferenceImagesClamped {
        transport: Transport,
        model_id: String,
        supplied: usize,
        limit: u32,
    },
    TransportFallback {
        from: Transport,
        to: Transport,
        model_id: String,
        reason: String,
    },
    TransportRetry {
        transport: Transport,
        attempt: u32,
        max_retries: u32,
        status: u16,
    },
}

impl RouterEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            RouterEvent::ReferenceImagesDropped { .. } => "reference_images_dropped",
            RouterEvent::ReferenceImagesClamped { .. } => "reference_images_clamped",
            RouterEvent::TransportFallback { .. } => "transport_fallback",
            RouterEvent::TransportRetry { .. } => "transport_retry",
        }
    }

    pub fn payload(&self) -> EventPayload {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut map)) => {
                map.remove("type");
                map
            }
            _ => EventPayload::new(),
        }
    }
}

/// Receives router events. Implementations must not block for long.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &RouterEvent);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &RouterEvent) {}
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<RouterEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RouterEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &RouterEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Append-only writer for `events.jsonl`.
///
/// Every line carries `type`, `run_id` and `ts`; the caller payload is merged
/// last and may override them.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: PathBuf,
    run_id: String,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path: path.into(),
                run_id: run_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn with_generated_run_id(path: impl Into<PathBuf>) -> Self {
        Self::new(path, Uuid::new_v4().to_string())
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn run_id(&self) -> &str {
        &self.inner.run_id
    }

    pub fn append(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(event_type.to_string()));
        event.insert(
            "run_id".to_string(),
            Value::String(self.inner.run_id.clone()),
        );
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        for (key, value) in payload {
            event.insert(key, value);
        }

        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(&event)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(event))
    }
}

impl EventSink for EventWriter {
    fn emit(&self, event: &RouterEvent) {
        if let Err(err) = self.append(event.event_type(), event.payload()) {
            tracing::warn!(
                path = %self.inner.path.display(),
                event = event.event_type(),
                "failed to append event: {err:#}"
            );
        }
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
