//! Scripted change streams.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use checkpoint::ProgressMarker;
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use sync_core::{
    ChangeEvent, ChangeStream, ConnectorFactory, DataEvent, Document, EventKind, FullDataStream,
    Source, SourceConnector, SourceId,
};
use tokio::sync::Notify;

enum Entry {
    Event(ChangeEvent),
    Error(String),
}

#[derive(Default)]
struct LogInner {
    entries: Vec<Entry>,
    closed: bool,
    delivered: usize,
}

/// Append-only change log of one scripted source.
///
/// Entry `n` (1-based) carries the marker `{"seq": n}`, and a stream opened
/// at marker `{"seq": n}` resumes with entry `n + 1`.
#[derive(Default)]
pub struct ScriptedLog {
    inner: Mutex<LogInner>,
    notify: Notify,
}

impl ScriptedLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn marker(seq: u64) -> ProgressMarker {
        ProgressMarker::new(json!({ "seq": seq }))
    }

    /// Append a data event. `data` must be a JSON object.
    pub fn push(&self, table: &str, kind: EventKind, data: Value) -> ProgressMarker {
        let data: Document = match data {
            Value::Object(map) => map,
            other => {
                let mut map = Document::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        self.append(|progress| {
            Entry::Event(ChangeEvent::Data(DataEvent {
                table: table.to_string(),
                kind,
                data,
                progress,
            }))
        })
    }

    pub fn push_progress(&self) -> ProgressMarker {
        self.append(|progress| Entry::Event(ChangeEvent::Progress(progress)))
    }

    /// Append a connector failure.
    pub fn push_error(&self, message: &str) -> ProgressMarker {
        let message = message.to_string();
        self.append(|_| Entry::Error(message))
    }

    /// End the stream once every entry was read.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Highest entry position any stream has read so far.
    pub fn delivered(&self) -> usize {
        self.lock().delivered
    }

    fn append(&self, build: impl FnOnce(ProgressMarker) -> Entry) -> ProgressMarker {
        let marker = {
            let mut inner = self.lock();
            let marker = Self::marker(inner.entries.len() as u64 + 1);
            inner.entries.push(build(marker.clone()));
            marker
        };
        self.notify.notify_waiters();
        marker
    }

    fn lock(&self) -> MutexGuard<'_, LogInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read(&self, pos: usize) -> Option<Option<Result<ChangeEvent>>> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        match inner.entries.get(pos) {
            Some(entry) => {
                inner.delivered = inner.delivered.max(pos + 1);
                Some(Some(match entry {
                    Entry::Event(event) => Ok(event.clone()),
                    Entry::Error(message) => Err(anyhow!("{message}")),
                }))
            }
            None if inner.closed => Some(None),
            None => None,
        }
    }
}

struct ScriptedStream {
    log: Arc<ScriptedLog>,
    pos: usize,
}

#[async_trait]
impl ChangeStream for ScriptedStream {
    async fn next(&mut self) -> Option<Result<ChangeEvent>> {
        loop {
            let notified = self.log.notify.notified();
            if let Some(item) = self.log.read(self.pos) {
                if item.is_some() {
                    self.pos += 1;
                }
                return item;
            }
            notified.await;
        }
    }
}

struct ScriptedConnector {
    log: Arc<ScriptedLog>,
    start: usize,
    full_data: HashMap<String, Vec<Document>>,
}

#[async_trait]
impl SourceConnector for ScriptedConnector {
    fn full_data<'a>(&'a self, table: &'a str, chunk_size: usize) -> FullDataStream<'a> {
        let rows = self.full_data.get(table).cloned().unwrap_or_default();
        let chunks: Vec<Result<Vec<Document>>> = rows
            .chunks(chunk_size.max(1))
            .map(|chunk| Ok(chunk.to_vec()))
            .collect();
        stream::iter(chunks).boxed()
    }

    async fn changes(self: Box<Self>) -> Result<Box<dyn ChangeStream>> {
        Ok(Box::new(ScriptedStream {
            log: self.log,
            pos: self.start,
        }))
    }
}

/// A recorded `connect` call.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectCall {
    pub source: SourceId,
    pub progress: Option<ProgressMarker>,
    pub tables: Vec<String>,
}

#[derive(Default)]
struct FactoryInner {
    logs: HashMap<SourceId, Arc<ScriptedLog>>,
    full_data: HashMap<SourceId, HashMap<String, Vec<Document>>>,
    failing: HashMap<SourceId, String>,
    connects: Vec<ConnectCall>,
}

/// [`ConnectorFactory`] serving [`ScriptedLog`]s by source id.
#[derive(Default)]
pub struct ScriptedFactory {
    inner: Mutex<FactoryInner>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The change log of `source`, created on first use.
    pub fn log(&self, source: SourceId) -> Arc<ScriptedLog> {
        self.lock().logs.entry(source).or_default().clone()
    }

    /// Rows returned by full-data extraction of `table`.
    pub fn set_full_data(&self, source: SourceId, table: &str, rows: Vec<Value>) {
        let rows = rows
            .into_iter()
            .filter_map(|row| row.as_object().cloned())
            .collect();
        self.lock()
            .full_data
            .entry(source)
            .or_default()
            .insert(table.to_string(), rows);
    }

    /// Make every `connect` for `source` fail with `message`.
    pub fn fail_connect(&self, source: SourceId, message: &str) {
        self.lock().failing.insert(source, message.to_string());
    }

    pub fn connects(&self, source: SourceId) -> Vec<ConnectCall> {
        self.lock()
            .connects
            .iter()
            .filter(|call| call.source == source)
            .cloned()
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, FactoryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn seq_of(marker: &ProgressMarker) -> Result<usize> {
    marker
        .get("seq")
        .and_then(Value::as_u64)
        .map(|seq| seq as usize)
        .ok_or_else(|| anyhow!("Not a scripted progress marker: {marker}"))
}

#[async_trait]
impl ConnectorFactory for ScriptedFactory {
    async fn connect(
        &self,
        source: &Source,
        progress: Option<ProgressMarker>,
        tables: Vec<String>,
    ) -> Result<Box<dyn SourceConnector>> {
        let mut inner = self.lock();
        inner.connects.push(ConnectCall {
            source: source.id,
            progress: progress.clone(),
            tables,
        });
        if let Some(message) = inner.failing.get(&source.id) {
            return Err(anyhow!("{message}"));
        }

        let start = match &progress {
            Some(marker) => seq_of(marker)?,
            None => 0,
        };
        Ok(Box::new(ScriptedConnector {
            log: inner.logs.entry(source.id).or_default().clone(),
            start,
            full_data: inner.full_data.get(&source.id).cloned().unwrap_or_default(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stream_resumes_after_marker() {
        let log = Arc::new(ScriptedLog::new());
        log.push("users", EventKind::Create, json!({"id": 1}));
        let second = log.push("users", EventKind::Update, json!({"id": 1}));
        log.push_progress();
        log.close();

        let mut stream = ScriptedStream {
            log: log.clone(),
            pos: seq_of(&second).unwrap(),
        };
        let event = stream.next().await.unwrap().unwrap();
        assert!(matches!(event, ChangeEvent::Progress(_)));
        assert!(stream.next().await.is_none());
        assert_eq!(log.delivered(), 3);
    }

    #[tokio::test]
    async fn test_stream_waits_for_appends() {
        let log = Arc::new(ScriptedLog::new());
        let mut stream = ScriptedStream {
            log: log.clone(),
            pos: 0,
        };

        let reader = tokio::spawn(async move { stream.next().await.map(|r| r.is_ok()) });
        tokio::task::yield_now().await;
        log.push("users", EventKind::Delete, json!({"id": 9}));
        assert_eq!(reader.await.unwrap(), Some(true));
    }
}
