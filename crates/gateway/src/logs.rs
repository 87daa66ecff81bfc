//! In-memory log capture layer and live logs service.
//!
//! [`LogBroadcastLayer`] is a `tracing_subscriber::Layer` that captures every
//! tracing event into a bounded ring buffer and broadcasts new entries to a
//! `tokio::sync::broadcast` channel for real-time streaming to WebSocket
//! clients.
//!
//! When persistence is enabled via [`LogBuffer::enable_persistence`], entries
//! are appended to a JSONL file. Historical entries are read lazily from the
//! file only when the UI requests them — nothing is loaded into memory at
//! startup.

use std::{
    collections::VecDeque,
    fs::{File, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::PathBuf,
    sync::{
        Arc, Mutex, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    serde_json::Value,
    tokio::sync::broadcast,
    tracing::field::{Field, Visit},
    tracing_subscriber::{Layer, layer::Context},
};

use crate::services::{LogsService, ServiceResult};

// ── LogEntry ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub ts: u64,
    pub level: String,
    pub target: String,
    pub message: String,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    #[serde(default)]
    pub fields: serde_json::Map<String, Value>,
}

// ── LogBuffer ───────────────────────────────────────────────────────────────

const DEFAULT_CAPACITY: usize = 10_000;
const DEFAULT_BROADCAST_CAPACITY: usize = 512;

#[derive(Clone)]
pub struct LogBuffer {
    /// In-memory ring buffer for current-session entries.
    buf: Arc<RwLock<VecDeque<LogEntry>>>,
    capacity: usize,
    tx: broadcast::Sender<LogEntry>,
    /// Append-only file writer (set after `enable_persistence`).
    writer: Arc<Mutex<Option<File>>>,
    /// Path to the JSONL file for on-demand reads.
    file_path: Arc<RwLock<Option<PathBuf>>>,
    /// Path to a small file persisting visit state.
    visited_path: Arc<RwLock<Option<PathBuf>>>,
    /// Running totals of warn/error entries (all time, including file).
    total_warns: Arc<AtomicU64>,
    total_errors: Arc<AtomicU64>,
    /// Snapshot of totals at last ack (visit).
    acked_warns: Arc<AtomicU64>,
    acked_errors: Arc<AtomicU64>,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Self {
            buf: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            capacity,
            tx,
            writer: Arc::new(Mutex::new(None)),
            file_path: Arc::new(RwLock::new(None)),
            visited_path: Arc::new(RwLock::new(None)),
            total_warns: Arc::new(AtomicU64::new(0)),
            total_errors: Arc::new(AtomicU64::new(0)),
            acked_warns: Arc::new(AtomicU64::new(0)),
            acked_errors: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Enable file-backed persistence. New entries will be appended to `path`.
    /// Historical entries are **not** loaded into memory — they are read
    /// on-demand when [`Self::list_from_file`] is called.
    ///
    /// Scans the JSONL file once to seed warn/error counters, and loads acked
    /// counters from a sibling `.visited` file.
    pub fn enable_persistence(&self, path: PathBuf) {
        // Store path for on-demand reads.
        if let Ok(mut fp) = self.file_path.write() {
            *fp = Some(path.clone());
        }

        // Seed running totals by scanning existing log file.
        if let Ok(file) = File::open(&path) {
            let reader = BufReader::new(file);
            let (mut w, mut e) = (0u64, 0u64);
            for line in reader.lines() {
                let Ok(line) = line else {
                    continue;
                };
                // Fast path: check level without full deserialization.
                if line.contains("\"WARN\"") || line.contains("\"warn\"") {
                    w += 1;
                } else if line.contains("\"ERROR\"") || line.contains("\"error\"") {
                    e += 1;
                }
            }
            self.total_warns.store(w, Ordering::Relaxed);
            self.total_errors.store(e, Ordering::Relaxed);
        }

        // Open the file for appending.
        if let Ok(file) = OpenOptions::new().create(true).append(true).open(&path)
            && let Ok(mut w) = self.writer.lock()
        {
            *w = Some(file);
        }

        // Load acked counters from sibling file.
        // Format: "acked_warns acked_errors"
        let vpath = path.with_extension("visited");
        if let Ok(contents) = std::fs::read_to_string(&vpath) {
            let parts: Vec<&str> = contents.split_whitespace().collect();
            if parts.len() == 2
                && let (Ok(aw), Ok(ae)) = (parts[0].parse::<u64>(), parts[1].parse::<u64>())
            {
                self.acked_warns.store(aw, Ordering::Relaxed);
                self.acked_errors.store(ae, Ordering::Relaxed);
            }
        }
        if let Ok(mut vp) = self.visited_path.write() {
            *vp = Some(vpath);
        }
    }

    pub fn push(&self, entry: LogEntry) {
        // Update running counters.
        match entry.level.as_str() {
            "WARN" | "warn" => {
                self.total_warns.fetch_add(1, Ordering::Relaxed);
            },
            "ERROR" | "error" => {
                self.total_errors.fetch_add(1, Ordering::Relaxed);
            },
            _ => {},
        }

        // Best-effort broadcast — receivers may be behind.
        let _ = self.tx.send(entry.clone());

        // Persist to file if enabled.
        if let Ok(mut w) = self.writer.lock()
            && let Some(ref mut file) = *w
            && let Ok(json) = serde_json::to_string(&entry)
        {
            let _ = writeln!(file, "{json}");
        }

        if let Ok(mut buf) = self.buf.write() {
            if buf.len() >= self.capacity {
                buf.pop_front();
            }
            buf.push_back(entry);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.tx.subscribe()
    }

    /// Return the last `limit` entries from the in-memory ring buffer only.
    pub fn list(&self, filter: &LogFilter, limit: usize) -> Vec<LogEntry> {
        let buf = match self.buf.read() {
            Ok(b) => b,
            Err(_) => return vec![],
        };
        buf.iter()
            .rev()
            .filter(|e| filter.matches(e))
            .take(limit)
            .cloned()
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect()
    }

    /// Read the last `limit` matching entries from the persisted JSONL file.
    /// This scans the entire file but does not keep entries in memory beyond
    /// the returned vector.
    pub fn list_from_file(&self, filter: &LogFilter, limit: usize) -> Vec<LogEntry> {
        let path = match self.file_path.read() {
            Ok(fp) => match fp.as_ref() {
                Some(p) => p.clone(),
                None => return vec![],
            },
            Err(_) => return vec![],
        };

        let file = match File::open(&path) {
            Ok(f) => f,
            Err(_) => return vec![],
        };

        // Collect the last `limit` matching entries using a ring.
        let reader = BufReader::new(file);
        let mut ring = VecDeque::with_capacity(limit);
        for line in reader.lines() {
            let Ok(line) = line else {
                continue;
            };
            if line.is_empty() {
                continue;
            }
            let Ok(entry) = serde_json::from_str::<LogEntry>(&line) else {
                continue;
            };
            if !filter.matches(&entry) {
                continue;
            }
            if ring.len() >= limit {
                ring.pop_front();
            }
            ring.push_back(entry);
        }
        ring.into()
    }

    /// Return the path to the persisted JSONL file, if persistence is enabled.
    pub fn file_path(&self) -> Option<PathBuf> {
        self.file_path.read().ok().and_then(|fp| fp.clone())
    }

    /// O(1) count of unseen warn/error entries since the last ack.
    pub fn count_unseen(&self) -> (u64, u64) {
        let tw = self.total_warns.load(Ordering::Relaxed);
        let te = self.total_errors.load(Ordering::Relaxed);
        let aw = self.acked_warns.load(Ordering::Relaxed);
        let ae = self.acked_errors.load(Ordering::Relaxed);
        (tw.saturating_sub(aw), te.saturating_sub(ae))
    }

    /// Snapshot current totals as "seen" and persist to disk.
    pub fn ack_visit(&self) {
        let tw = self.total_warns.load(Ordering::Relaxed);
        let te = self.total_errors.load(Ordering::Relaxed);
        self.acked_warns.store(tw, Ordering::Relaxed);
        self.acked_errors.store(te, Ordering::Relaxed);

        if let Ok(vp) = self.visited_path.read()
            && let Some(ref path) = *vp
        {
            let _ = std::fs::write(path, format!("{tw} {te}"));
        }
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ── LogFilter ───────────────────────────────────────────────────────────────

pub struct LogFilter {
    pub level: Option<String>,
    pub target: Option<String>,
    pub search: Option<String>,
}

impl LogFilter {
    fn level_ord(l: &str) -> u8 {
        match l {
            "TRACE" | "trace" => 0,
            "DEBUG" | "debug" => 1,
            "INFO" | "info" => 2,
            "WARN" | "warn" => 3,
            "ERROR" | "error" => 4,
            _ => 2,
        }
    }

    fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(ref lvl) = self.level
            && Self::level_ord(&entry.level) < Self::level_ord(lvl)
        {
            return false;
        }
        if let Some(ref tgt) = self.target
            && !tgt.is_empty()
            && !entry.target.contains(tgt.as_str())
        {
            return false;
        }
        if let Some(ref q) = self.search
            && !q.is_empty()
        {
            let q_lower = q.to_lowercase();
            if !entry.message.to_lowercase().contains(&q_lower)
                && !entry.target.to_lowercase().contains(&q_lower)
            {
                return false;
            }
        }
        true
    }
}

// ── Visitor (extracts fields from tracing events) ───────────────────────────

struct FieldVisitor {
    message: String,
    fields: serde_json::Map<String, Value>,
}

impl FieldVisitor {
    fn new() -> Self {
        Self {
            message: String::new(),
            fields: serde_json::Map::new(),
        }
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields
                .insert(field.name().into(), Value::String(format!("{value:?}")));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.into();
        } else {
            self.fields
                .insert(field.name().into(), Value::String(value.into()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields
            .insert(field.name().into(), Value::Number(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields
            .insert(field.name().into(), Value::Number(value.into()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().into(), Value::Bool(value));
    }
}

// ── LogBroadcastLayer ───────────────────────────────────────────────────────

pub struct LogBroadcastLayer {
    buffer: LogBuffer,
}

impl LogBroadcastLayer {
    pub fn new(buffer: LogBuffer) -> Self {
        Self { buffer }
    }
}

impl<S: tracing::Subscriber> Layer<S> for LogBroadcastLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        let mut visitor = FieldVisitor::new();
        event.record(&mut visitor);

        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        let entry = LogEntry {
            ts,
            level: meta.level().to_string(),
            target: meta.target().into(),
            message: visitor.message,
            fields: visitor.fields,
        };

        self.buffer.push(entry);
    }
}

// ── LiveLogsService ─────────────────────────────────────────────────────────

pub struct LiveLogsService {
    buffer: LogBuffer,
}

impl LiveLogsService {
    pub fn new(buffer: LogBuffer) -> Self {
        Self { buffer }
    }
}

#[async_trait]
impl LogsService for LiveLogsService {
    async fn tail(&self, params: Value) -> ServiceResult {
        let limit = params.get("limit").and_then(|v| v.as_u64()).unwrap_or(200) as usize;
        let filter = LogFilter {
            level: None,
            target: None,
            search: None,
        };
        let entries = self.buffer.list(&filter, limit);
        Ok(serde_json::json!({ "entries": entries, "subscribed": true }))
    }

    async fn list(&self, params: Value) -> ServiceResult {
        let limit = params.get("limit").and_then(|v| v.as_u64()).unwrap_or(500) as usize;
        let filter = LogFilter {
            level: params
                .get("level")
                .and_then(|v| v.as_str())
                .map(String::from),
            target: params
                .get("target")
                .and_then(|v| v.as_str())
                .map(String::from),
            search: params
                .get("search")
                .and_then(|v| v.as_str())
                .map(String::from),
        };
        // Fast path: try in-memory ring buffer first (instant, covers current session).
        let entries = self.buffer.list(&filter, limit);
        if !entries.is_empty() {
            return Ok(serde_json::json!({ "entries": entries }));
        }
        // Slow path: fall back to file after restart when memory is empty.
        // Run on a blocking thread so we don't stall the async runtime.
        let buffer = self.buffer.clone();
        let entries = tokio::task::spawn_blocking(move || buffer.list_from_file(&filter, limit))
            .await
            .unwrap_or_default();
        Ok(serde_json::json!({ "entries": entries }))
    }

    async fn status(&self) -> ServiceResult {
        let (warns, errors) = self.buffer.count_unseen();
        Ok(serde_json::json!({ "unseen_warns": warns, "unseen_errors": errors }))
    }

    async fn ack(&self) -> ServiceResult {
        self.buffer.ack_visit();
        Ok(serde_json::json!({}))
    }

    fn log_file_path(&self) -> Option<PathBuf> {
        self.buffer.file_path()
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
